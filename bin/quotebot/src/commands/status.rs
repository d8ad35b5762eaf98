use quotebot_core::{Config, Paths};

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("quotebot status");
    println!("===============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (defaults)" }
    );

    let config = Config::load_or_default(&paths)?;
    println!(
        "Cache:     max {} entries | realtime {}s | ranking {}s",
        config.cache.max_entries, config.cache.realtime_ttl_secs, config.cache.ranking_ttl_secs
    );
    println!("Provider:  timeout {}s", config.provider.timeout_secs);
    println!(
        "Render:    {} chars × {} parts | {} lines | default channel {}",
        config.render.max_chars,
        config.render.max_parts,
        config.render.max_lines,
        config.render.default_channel
    );
    println!();

    println!(
        "Router:    {} aliases | {} intent rules",
        quotebot_router::alias_count(),
        quotebot_router::rule_count()
    );

    let stats = quotebot_market::cache::global().stats().await;
    println!("Cache use: {} / {} entries", stats.entries, stats.capacity);

    Ok(())
}
