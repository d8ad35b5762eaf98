use clap_complete::{generate, Shell};

/// Generate shell completion scripts.
///
/// Re-creates a minimal CLI definition here to generate completions
/// without a circular dependency on the main Cli struct.
pub async fn run(shell: &str) -> anyhow::Result<()> {
    let shell = match shell.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "powershell" | "ps" => Shell::PowerShell,
        "elvish" => Shell::Elvish,
        _ => {
            anyhow::bail!(
                "Unsupported shell: {}. Options: bash, zsh, fish, powershell, elvish",
                shell
            );
        }
    };

    let mut cmd = build_cli();
    generate(shell, &mut cmd, "quotebot", &mut std::io::stdout());

    Ok(())
}

/// Build a minimal CLI definition for completion generation.
fn build_cli() -> clap::Command {
    clap::Command::new("quotebot")
        .about("Free-text market queries in, chat-ready answers out")
        .subcommand(clap::Command::new("ask").about("Answer one query and print the rendered parts"))
        .subcommand(clap::Command::new("repl").about("Interactive query loop"))
        .subcommand(clap::Command::new("status").about("Show configuration and cache usage"))
        .subcommand(clap::Command::new("completions").about("Generate shell completions"))
}
