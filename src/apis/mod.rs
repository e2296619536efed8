//! Clients for the third-party HTTP APIs used by the fun commands.

pub mod meme;
pub mod twitch;

use thiserror::Error;

pub use meme::{Meme, MemeClient};
pub use twitch::{Broadcast, TwitchClient, TwitchLookup};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("{0} returned no usable data")]
    Empty(&'static str),
}
