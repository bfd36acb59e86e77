//! Optional chart artifact capability
//!
//! Produces a PNG of the current chart for the oracle request, or nothing.
//! Its absence must never block the cycle, so every failure path degrades
//! to `None` with a warning.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::types::Pair;

#[async_trait]
pub trait ChartSource: Send + Sync {
    /// Capture a chart image for the pair, or None if unavailable
    async fn capture(&self, pair: &Pair) -> Option<Vec<u8>>;
}

/// No-op source used when chart capture is not configured
pub struct NoChart;

#[async_trait]
impl ChartSource for NoChart {
    async fn capture(&self, _pair: &Pair) -> Option<Vec<u8>> {
        None
    }
}

/// Screenshots a chart page with a headless browser binary
pub struct HeadlessChart {
    bin: PathBuf,
    /// Page URL; `{pair}` is replaced with the market code
    url_template: String,
}

impl HeadlessChart {
    pub fn new(bin: &str, url_template: &str) -> Self {
        Self {
            bin: PathBuf::from(bin),
            url_template: url_template.to_string(),
        }
    }
}

#[async_trait]
impl ChartSource for HeadlessChart {
    async fn capture(&self, pair: &Pair) -> Option<Vec<u8>> {
        let url = self.url_template.replace("{pair}", &pair.code());
        let shot = std::env::temp_dir().join(format!("chart-{}.png", uuid::Uuid::new_v4()));

        let output = Command::new(&self.bin)
            .args([
                "--headless",
                "--disable-gpu",
                "--window-size=1920,1080",
                &format!("--screenshot={}", shot.display()),
                &url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("chart capture could not spawn {}: {}", self.bin.display(), e);
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                "chart capture exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let bytes = match tokio::fs::read(&shot).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("chart screenshot missing at {}: {}", shot.display(), e);
                return None;
            }
        };
        let _ = tokio::fs::remove_file(&shot).await;

        debug!("captured {} byte chart for {}", bytes.len(), pair.code());
        Some(bytes)
    }
}
