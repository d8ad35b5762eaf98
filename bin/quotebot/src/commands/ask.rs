use quotebot_core::{Config, Paths};
use quotebot_pipeline::Pipeline;

pub async fn run(query: &str, channel: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(&Paths::new())?;
    let pipeline = Pipeline::with_defaults(&config)?;

    if json {
        let (_, record) = pipeline.process(query).await;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let profile = super::resolve_profile(&config, channel);
    let message = pipeline.answer(query, &profile).await;
    for (i, part) in message.parts.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", part);
    }

    Ok(())
}
