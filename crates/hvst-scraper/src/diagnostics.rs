//! Best-effort page snapshots written when a target fails.

use std::path::{Path, PathBuf};

use chrono::Utc;
use hvst_core::DiagnosticSnapshot;
use tracing::{info, warn};

use crate::page::PageDriver;

const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct DiagnosticsWriter {
    dir: PathBuf,
}

impl DiagnosticsWriter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Captures URL, title, a text excerpt and a screenshot.
    ///
    /// Never fails: every piece that cannot be read or written is left
    /// out and logged.
    pub async fn capture(&self, page: &dyn PageDriver, label: &str) -> DiagnosticSnapshot {
        let captured_at = Utc::now();
        let stem = format!(
            "{}-{}",
            sanitize(label),
            captured_at.format("%Y%m%dT%H%M%S%.3fZ")
        );

        let url = page.current_url().await.ok();
        let title = page.title().await.ok().flatten();
        let text_excerpt = page
            .visible_text()
            .await
            .ok()
            .map(|text| text.chars().take(EXCERPT_CHARS).collect::<String>());

        let screenshot_path = match page.screenshot().await {
            Ok(png) => self.write(&format!("{stem}.png"), &png).await,
            Err(e) => {
                warn!(label, error = %e, "screenshot unavailable");
                None
            }
        };

        let snapshot = DiagnosticSnapshot {
            label: label.to_string(),
            captured_at,
            url,
            title,
            text_excerpt,
            screenshot_path,
        };

        match serde_json::to_vec_pretty(&snapshot) {
            Ok(json) => {
                if let Some(path) = self.write(&format!("{stem}.json"), &json).await {
                    info!(label, path = %path.display(), "diagnostic snapshot saved");
                }
            }
            Err(e) => warn!(label, error = %e, "snapshot serialization failed"),
        }
        snapshot
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "cannot create diagnostics dir");
            return None;
        }
        let path = self.dir.join(name);
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot write diagnostic file");
                None
            }
        }
    }
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "snapshot".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::ScriptedPage;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hvst-diag-{name}-{:08x}", rand::random::<u32>()))
    }

    #[tokio::test]
    async fn writes_png_and_json() {
        let dir = temp_dir("ok");
        let page = ScriptedPage::new("https://www.ifood.com.br/")
            .with_title("iFood")
            .with_body_text("x".repeat(900));
        let writer = DiagnosticsWriter::new(&dir);

        let snapshot = writer.capture(&page, "nav/confirm 1").await;
        assert_eq!(snapshot.url.as_deref(), Some("https://www.ifood.com.br/"));
        assert_eq!(snapshot.title.as_deref(), Some("iFood"));
        assert_eq!(snapshot.text_excerpt.as_ref().map(String::len), Some(500));

        let png = snapshot.screenshot_path.clone().unwrap();
        assert!(png.file_name().unwrap().to_string_lossy().starts_with("nav_confirm_1-"));
        assert!(png.exists());
        assert!(png.with_extension("json").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn closed_page_still_yields_snapshot() {
        let dir = temp_dir("closed");
        let page = ScriptedPage::new("https://www.ifood.com.br/");
        page.close().await.unwrap();
        let writer = DiagnosticsWriter::new(&dir);

        let snapshot = writer.capture(&page, "closed").await;
        assert_eq!(snapshot.url, None);
        assert_eq!(snapshot.screenshot_path, None);

        let _ = std::fs::remove_dir_all(dir);
    }
}
