// src/stream/probe.rs
//
// Two-stage readiness probe for a pull address. Reachability alone is not
// enough: the hub answers on the URL before any segments exist, so manifest
// URLs get a bounded content check for playlist markers.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::settings::AppSettings;

#[async_trait]
pub trait StreamProber: Send + Sync {
    /// Ok(()) means the stream is genuinely playable right now.
    async fn probe(&self, pull_url: &str) -> Result<(), CoreError>;
}

/// Whether a bounded slice of a playlist body looks like a real manifest.
/// Segment lists reference `.ts` chunks; a bare header also counts because
/// the range fetch may cut the body short.
pub fn is_manifest_content(body: &str) -> bool {
    body.contains("#EXTM3U")
        || body.trim_start().starts_with("#EXT")
        || (body.contains(".ts") && body.contains("#EXTINF"))
}

/// Whether the address is a segmented-manifest stream needing stage two.
pub fn is_manifest_url(pull_url: &str) -> bool {
    pull_url
        .split(&['?', '#'][..])
        .next()
        .unwrap_or(pull_url)
        .ends_with(".m3u8")
}

pub struct HttpStreamProber {
    client: reqwest::Client,
    head_timeout: Duration,
    manifest_timeout: Duration,
}

impl HttpStreamProber {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            head_timeout: Duration::from_millis(settings.probe_head_timeout_ms),
            manifest_timeout: Duration::from_millis(settings.manifest_timeout_ms),
        }
    }
}

#[async_trait]
impl StreamProber for HttpStreamProber {
    async fn probe(&self, pull_url: &str) -> Result<(), CoreError> {
        let target = format!("probe({})", pull_url);

        // Stage 1: bounded existence check
        let head = self
            .client
            .head(pull_url)
            .timeout(self.head_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::timeout(&target, "Existence check timed out")
                } else {
                    CoreError::connection(&target, format!("Existence check failed: {}", e))
                }
            })?;

        if !head.status().is_success() {
            return Err(CoreError::protocol(
                &target,
                format!("Existence check returned {}", head.status()),
            ));
        }

        if !is_manifest_url(pull_url) {
            return Ok(());
        }

        // Stage 2: fetch the first KiB of the manifest and look for markers
        let resp = self
            .client
            .get(pull_url)
            .header(reqwest::header::RANGE, "bytes=0-1024")
            .timeout(self.manifest_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::timeout(&target, "Manifest fetch timed out")
                } else {
                    CoreError::connection(&target, format!("Manifest fetch failed: {}", e))
                }
            })?;

        if !resp.status().is_success() {
            return Err(CoreError::protocol(
                &target,
                format!("Manifest fetch returned {}", resp.status()),
            ));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| CoreError::protocol(&target, format!("Manifest body unreadable: {}", e)))?;

        if is_manifest_content(&body) {
            Ok(())
        } else {
            Err(CoreError::protocol(&target, "No manifest markers in response"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_markers() {
        assert!(is_manifest_content("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(is_manifest_content("  #EXT-X-TARGETDURATION:6"));
        assert!(is_manifest_content("garbage\n#EXTINF:6.0,\nseg-001.ts\n"));
        assert!(!is_manifest_content("<html><body>404</body></html>"));
        assert!(!is_manifest_content(""));
    }

    #[test]
    fn test_manifest_url_detection() {
        assert!(is_manifest_url("http://hub.local/live/tx-01.m3u8"));
        assert!(is_manifest_url("http://hub.local/live/tx-01.m3u8?token=abc"));
        assert!(!is_manifest_url("rtmp://hub.local/live/tx-01"));
        assert!(!is_manifest_url("http://hub.local/live/tx-01.flv"));
    }
}
