pub mod youtube;

use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::Duration;
use thiserror::Error;

pub use youtube::YtDlpResolver;

/// Who asked for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
}

/// Metadata returned by a lookup, without a stream URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub webpage_url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

/// Direct stream location for a page URL.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub title: String,
    pub webpage_url: String,
    pub stream_url: String,
}

/// A track ready to be handed to the voice client.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableTrack {
    pub title: String,
    pub webpage_url: String,
    pub stream_url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub requester: Requester,
}

/// A track whose stream is resolved only when it reaches the head of the queue.
///
/// Stream URLs expire, so queued tracks keep only the page URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredTrack {
    pub title: String,
    pub webpage_url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub requester: Requester,
}

impl DeferredTrack {
    pub fn new(metadata: TrackMetadata, requester: Requester) -> Self {
        Self {
            title: metadata.title,
            webpage_url: metadata.webpage_url,
            duration: metadata.duration,
            thumbnail: metadata.thumbnail,
            requester,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackRequest {
    Resolved(PlayableTrack),
    Deferred(DeferredTrack),
}

impl TrackRequest {
    pub fn title(&self) -> &str {
        match self {
            Self::Resolved(track) => &track.title,
            Self::Deferred(track) => &track.title,
        }
    }

    pub fn webpage_url(&self) -> &str {
        match self {
            Self::Resolved(track) => &track.webpage_url,
            Self::Deferred(track) => &track.webpage_url,
        }
    }

    pub fn requester(&self) -> &Requester {
        match self {
            Self::Resolved(track) => &track.requester,
            Self::Deferred(track) => &track.requester,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::Resolved(track) => track.duration,
            Self::Deferred(track) => track.duration,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no results found for `{0}`")]
    NoResults(String),
    #[error("extractor failed: {0}")]
    Extractor(String),
    #[error("extractor timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not run extractor: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected extractor output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// External media-extraction service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Looks up a search string or URL and returns the first match.
    async fn lookup(&self, query: &str) -> Result<TrackMetadata, ResolveError>;

    /// Resolves a page URL into a direct audio stream.
    async fn resolve_stream(&self, webpage_url: &str) -> Result<StreamInfo, ResolveError>;
}

/// Turns a deferred request into a playable track.
pub async fn regather(
    resolver: &dyn MediaResolver,
    track: &DeferredTrack,
) -> Result<PlayableTrack, ResolveError> {
    let stream = resolver.resolve_stream(&track.webpage_url).await?;

    Ok(PlayableTrack {
        title: stream.title,
        webpage_url: stream.webpage_url,
        stream_url: stream.stream_url,
        duration: track.duration,
        thumbnail: track.thumbnail.clone(),
        requester: track.requester.clone(),
    })
}

/// Whether the query should be passed to the extractor verbatim instead of searched.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query.trim())
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}
