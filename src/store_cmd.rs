//! `folio store`: record one chapter version.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use folio_core::models::{ChapterVersion, VersionStatus};

use crate::app::App;
use crate::config::Config;

/// Everything `folio store` accepts besides the content itself.
#[derive(Debug, Clone)]
pub struct StoreArgs {
    pub chapter: String,
    pub file: Option<PathBuf>,
    pub status: VersionStatus,
    pub author: Option<String>,
    pub version: Option<String>,
    pub source_url: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub feedback: Option<String>,
    pub rating: Option<u8>,
}

impl StoreArgs {
    pub fn into_version(self, content: String) -> ChapterVersion {
        let mut version = ChapterVersion::new(self.chapter, content, self.status);
        if let Some(author) = self.author {
            version = version.with_author(author);
        }
        if let Some(label) = self.version {
            version = version.with_version_label(label);
        }
        if let Some(url) = self.source_url {
            version = version.with_source_url(url);
        }
        if let Some(path) = self.screenshot {
            version = version.with_screenshot_path(path.display().to_string());
        }
        if let Some(feedback) = self.feedback {
            version = version.with_human_feedback(feedback);
        }
        if let Some(stars) = self.rating {
            version = version.with_star_rating(stars);
        }
        version
    }
}

fn read_content(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read content file: {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read content from stdin")?;
            Ok(buf)
        }
    }
}

pub async fn run_store(config: &Config, args: StoreArgs) -> Result<()> {
    if args.chapter.trim().is_empty() {
        bail!("chapter must not be empty");
    }
    let content = read_content(args.file.as_ref())?;
    if content.trim().is_empty() {
        bail!("content must not be empty");
    }

    let version = args.into_version(content);
    let app = App::open(config).await?;
    let result = app.store.store_version(&version).await;
    app.close().await;

    let id = result.context("Failed to store version")?;
    println!("{}", id);
    Ok(())
}
