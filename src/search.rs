//! Ranked search from the command line.

use anyhow::Result;

use crate::app::App;
use crate::config::Config;

pub const DEFAULT_PREVIEW_CHARS: usize = 200;

pub async fn run_search(
    config: &Config,
    query: &str,
    chapter: Option<String>,
    limit: Option<usize>,
    preview_chars: usize,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let app = App::open(config).await?;
    let limit = limit.unwrap_or(config.ranking.default_limit);
    let results = app.engine.search(query, chapter.as_deref(), limit).await;

    if results.is_empty() {
        println!("No results.");
        app.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} / {}",
            i + 1,
            result.score,
            result.chapter(),
            result.status()
        );
        println!("    author: {}", result.author());
        println!("    distance: {:.4}", result.distance);
        println!(
            "    preview: \"{}\"",
            result.preview(preview_chars).replace('\n', " ").trim()
        );
        println!("    id: {}", result.version_id);
        println!();
    }

    app.close().await;
    Ok(())
}
