use std::io::{BufRead, Write};

use quotebot_core::{Config, Paths};
use quotebot_pipeline::Pipeline;

pub async fn run(channel: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load_or_default(&Paths::new())?;
    let profile = super::resolve_profile(&config, channel);
    let pipeline = Pipeline::with_defaults(&config)?;

    println!(
        "quotebot interactive mode ({} profile, exit/quit to leave)",
        profile.name
    );

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let message = pipeline.answer(input, &profile).await;
        for part in &message.parts {
            println!("{}", part);
            println!();
        }
    }

    Ok(())
}
