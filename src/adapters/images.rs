//! Image lookup for article packages.
//!
//! Subjects map to a folder slug under the images base URL. When a local
//! mirror of the image repository is configured, a concrete file is picked
//! from the folder; otherwise the folder URL itself is used.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::domain::ImageRef;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Subject → image folder mapping
pub struct ImageCatalog {
    base_url: String,
    local_dir: Option<PathBuf>,
}

impl ImageCatalog {
    pub fn new(base_url: impl Into<String>, local_dir: Option<PathBuf>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            local_dir,
        }
    }

    /// Folder slug for a subject; unknown subjects use `general`
    pub fn slug(subject: &str) -> &'static str {
        match subject {
            "EUR/USD" => "eur-usd",
            "USD/JPY" => "usd-jpy",
            "GBP/USD" => "gbp-usd",
            "USD/CAD" => "usd-cad",
            "AUD/USD" => "aud",
            "Bitcoin" => "btc-usd",
            "Ethereum" => "ethereum",
            "XRP" => "xrp",
            "Gold" => "gold",
            "Silver" => "silver",
            "Oil" => "oil",
            "Copper" => "copper",
            _ => "general",
        }
    }

    /// Default alt text when SEO metadata has none
    pub fn alt_text(subject: &str, category: &str) -> String {
        match category {
            "forex" => format!("{} forex trading chart showing price movement and technical analysis indicators", subject),
            "crypto" => format!("{} cryptocurrency price chart with market trends and trading volume", subject),
            "commodities" => format!("{} commodity price chart showing market analysis and trading signals", subject),
            _ => format!("{} trading chart and market analysis", subject),
        }
    }

    /// Pick the image for a lane. `seed` (typically the run date) keeps the
    /// choice stable within a run while rotating images across days.
    pub fn image_for(&self, subject: &str, category: &str, alt: &str, seed: &str) -> ImageRef {
        let slug = Self::slug(subject);
        let alt = if alt.trim().is_empty() {
            Self::alt_text(subject, category)
        } else {
            alt.to_string()
        };

        let url = match self.local_dir.as_deref().and_then(|dir| pick_file(&dir.join(slug), subject, seed)) {
            Some(file) => format!("{}/{}/{}", self.base_url, slug, file),
            None => format!("{}/{}/", self.base_url, slug),
        };

        debug!(%subject, %url, "Selected image");
        ImageRef { url, alt }
    }
}

fn pick_file(folder: &Path, subject: &str, seed: &str) -> Option<String> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(folder = %folder.display(), error = %e, "Image folder unavailable");
            return None;
        }
    };

    let mut files: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();

    if files.is_empty() {
        return None;
    }
    files.sort();

    let digest = Sha256::digest(format!("{}:{}", subject, seed).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(prefix) % files.len() as u64) as usize;

    Some(files.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_slugs() {
        assert_eq!(ImageCatalog::slug("EUR/USD"), "eur-usd");
        assert_eq!(ImageCatalog::slug("Bitcoin"), "btc-usd");
        assert_eq!(ImageCatalog::slug("AUD/USD"), "aud");
        assert_eq!(ImageCatalog::slug("Platinum"), "general");
    }

    #[test]
    fn test_folder_url_without_local_mirror() {
        let catalog = ImageCatalog::new("https://img.example/trading/", None);
        let image = catalog.image_for("Gold", "commodities", "", "2025-10-20");
        assert_eq!(image.url, "https://img.example/trading/gold/");
        assert!(image.alt.starts_with("Gold commodity price chart"));
    }

    #[test]
    fn test_picks_stable_file_from_local_mirror() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("btc-usd");
        std::fs::create_dir_all(&folder).unwrap();
        for name in ["a.jpg", "b.png", "notes.txt"] {
            std::fs::write(folder.join(name), b"x").unwrap();
        }

        let catalog = ImageCatalog::new("https://img.example", Some(tmp.path().to_path_buf()));
        let first = catalog.image_for("Bitcoin", "crypto", "BTC chart", "2025-10-20");
        let again = catalog.image_for("Bitcoin", "crypto", "BTC chart", "2025-10-20");

        assert_eq!(first, again);
        assert!(first.url.ends_with(".jpg") || first.url.ends_with(".png"));
        assert_eq!(first.alt, "BTC chart");
    }
}
