//! Version retrieval by id.
//!
//! Used by the `folio get` CLI command; the HTTP server calls the version
//! store directly.

use anyhow::Result;

use folio_core::models::format_timestamp;

use crate::app::App;
use crate::config::Config;

/// CLI entry point. Prints the version, or exits 1 when it does not exist.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let app = App::open(config).await?;
    let found = app.store.get_version(id).await;
    app.close().await;

    let stored = match found {
        Ok(Some(v)) => v,
        Ok(None) => {
            eprintln!("Error: version not found: {}", id);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let v = &stored.version;
    println!("--- Version ---");
    println!("id:           {}", stored.version_id);
    println!("chapter:      {}", v.chapter_name);
    println!("version:      {}", v.version_label);
    println!("status:       {}", v.status);
    println!("author:       {}", v.author);
    if let Some(ts) = v.timestamp {
        println!("timestamp:    {}", format_timestamp(ts));
    }
    if !v.source_url.is_empty() {
        println!("source_url:   {}", v.source_url);
    }
    if !v.screenshot_path.is_empty() {
        println!("screenshot:   {}", v.screenshot_path);
    }
    if let Some(rating) = v.human_rating {
        println!("rating:       {:.2}", rating);
    }
    if !v.human_feedback.is_empty() {
        println!("feedback:     {}", v.human_feedback);
    }
    println!();

    println!("--- Content ---");
    println!("{}", stored.content);

    Ok(())
}
