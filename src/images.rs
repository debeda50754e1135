use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CrawlError, Result};
use crate::persist::path_component;

/// Saves product thumbnails as `<root>/<category>/<product id>.jpg`.
pub struct ImageDownloader {
    client: Client,
    root: PathBuf,
}

impl ImageDownloader {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Config(format!("image client: {}", e)))?;
        Ok(Self {
            client,
            root: root.into(),
        })
    }

    /// Always a file two levels below the root, whatever the id contains.
    pub fn image_path(&self, category: &str, product_id: &str) -> PathBuf {
        self.root
            .join(path_component(category))
            .join(format!("{}.jpg", path_component(product_id)))
    }

    pub async fn save(&self, category: &str, product_id: &str, url: &str) -> Result<PathBuf> {
        let download_err = |reason: String| CrawlError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_err(format!("status {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        let path = self.image_path(category, product_id);
        ensure_parent(&path).await?;
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved product image");
        Ok(path)
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
