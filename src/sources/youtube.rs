use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{is_url, MediaResolver, ResolveError, StreamInfo, TrackMetadata};

const EXTRACTOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolver backed by the `yt-dlp` executable.
pub struct YtDlpResolver {
    binary: String,
    // Limit concurrent extractor processes to avoid rate limiting
    rate_limiter: Semaphore,
}

/// Fields read from `yt-dlp --dump-json`.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    webpage_url: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    /// Present when a single format was selected with `-f`.
    url: Option<String>,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Checks that the extractor is installed, returning its version.
    pub async fn verify(&self) -> Result<String, ResolveError> {
        let output = Command::new(&self.binary).arg("--version").output().await?;

        if !output.status.success() {
            return Err(ResolveError::Extractor(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn dump_json(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Extractor(e.to_string()))?;

        let run = Command::new(&self.binary)
            .args(["--no-playlist", "--dump-json", "--no-warnings"])
            .args(args)
            .output();

        let output = tokio::time::timeout(EXTRACTOR_TIMEOUT, run)
            .await
            .map_err(|_| ResolveError::Timeout(EXTRACTOR_TIMEOUT))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Extractor(extractor_message(&stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn lookup(&self, query: &str) -> Result<TrackMetadata, ResolveError> {
        let target = search_target(query);
        info!("🔍 Looking up: {}", target);

        let stdout = self.dump_json(&["--skip-download", &target]).await?;
        let info = first_entry(&stdout).ok_or_else(|| ResolveError::NoResults(query.to_string()))??;

        Ok(TrackMetadata {
            title: info.title,
            webpage_url: info.webpage_url,
            duration: info.duration.map(|secs| Duration::from_secs(secs.max(0.0) as u64)),
            thumbnail: info.thumbnail,
        })
    }

    async fn resolve_stream(&self, webpage_url: &str) -> Result<StreamInfo, ResolveError> {
        debug!("🎵 Resolving stream for: {}", webpage_url);

        let stdout = self.dump_json(&["-f", "bestaudio/best", webpage_url]).await?;
        let info = first_entry(&stdout)
            .ok_or_else(|| ResolveError::NoResults(webpage_url.to_string()))??;

        let stream_url = info
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ResolveError::Extractor("no playable format".to_string()))?;

        Ok(StreamInfo {
            title: info.title,
            webpage_url: info.webpage_url,
            stream_url,
        })
    }
}

fn search_target(query: &str) -> String {
    let query = query.trim();
    if is_url(query) {
        query.to_string()
    } else {
        format!("ytsearch1:{query}")
    }
}

fn first_entry(stdout: &str) -> Option<Result<YtDlpInfo, ResolveError>> {
    stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(ResolveError::from))
}

/// Keeps the `ERROR:` line of the extractor output when there is one.
fn extractor_message(stderr: &str) -> String {
    stderr
        .lines()
        .find(|line| line.starts_with("ERROR:"))
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| stderr.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn searches_unless_given_a_url() {
        assert_eq!(search_target("lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(
            search_target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn parses_first_json_line() {
        let stdout = concat!(
            "\n",
            r#"{"title":"Song","webpage_url":"https://youtu.be/x","duration":212.0,"thumbnail":null,"url":"https://cdn/x"}"#,
            "\n",
            r#"{"title":"Other","webpage_url":"https://youtu.be/y"}"#,
        );

        let info = first_entry(stdout).unwrap().unwrap();
        assert_eq!(info.title, "Song");
        assert_eq!(info.url.as_deref(), Some("https://cdn/x"));
        assert_eq!(info.duration, Some(212.0));
    }

    #[test]
    fn empty_output_has_no_entry() {
        assert!(first_entry("\n  \n").is_none());
    }

    #[test]
    fn extracts_error_line() {
        let stderr = "WARNING: something\nERROR: Video unavailable\n";
        assert_eq!(extractor_message(stderr), "Video unavailable");
        assert_eq!(extractor_message(" boom "), "boom");
    }
}
