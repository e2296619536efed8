//! Error taxonomy for command and event handling.
//!
//! Every failure a handler can produce is a [`BotError`]. Its [`ErrorKind`]
//! decides how it is reported: user mistakes and rejected operations are
//! answered inline, external-service and Discord permission failures get a
//! short explanation, anything else is logged and answered generically.

use std::time::Duration;
use thiserror::Error;

use crate::{
    apis::ApiError,
    audio::{MusicError, VoiceError},
    guild::{BlacklistError, ReactionRoleError},
    sources::ResolveError,
    storage::StoreError,
};

pub type BotResult<T> = std::result::Result<T, BotError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    External,
    Permission,
    Unexpected,
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("{0}")]
    UserInput(String),
    #[error("I couldn't understand that.\nUsage: `{0}`")]
    BadArguments(String),
    #[error("You need the **{0}** permission to use this command.")]
    MissingPermissions(String),
    #[error("This command is on cooldown, try again in {}.", wait_time(.0))]
    Cooldown(Duration),
    #[error("This command can't be used in private messages.")]
    NoPrivateMessage,
    #[error(transparent)]
    Music(#[from] MusicError),
    #[error(transparent)]
    Blacklist(#[from] BlacklistError),
    #[error(transparent)]
    ReactionRole(#[from] ReactionRoleError),
    #[error("I couldn't find that: {0}")]
    Resolve(#[from] ResolveError),
    #[error("The external service failed: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Discord(#[from] serenity::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<VoiceError> for BotError {
    fn from(err: VoiceError) -> Self {
        Self::Music(MusicError::Voice(err))
    }
}

impl BotError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::UserInput(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UserInput(_)
            | Self::BadArguments(_)
            | Self::MissingPermissions(_)
            | Self::Cooldown(_)
            | Self::NoPrivateMessage => ErrorKind::UserInput,
            Self::Music(MusicError::Voice(_)) => ErrorKind::External,
            Self::Music(_) => ErrorKind::UserInput,
            Self::Blacklist(BlacklistError::Store(_)) => ErrorKind::Unexpected,
            Self::Blacklist(_) => ErrorKind::UserInput,
            Self::ReactionRole(ReactionRoleError::Store(_)) => ErrorKind::Unexpected,
            Self::ReactionRole(_) => ErrorKind::UserInput,
            Self::Resolve(_) | Self::Api(_) => ErrorKind::External,
            Self::Discord(e) if is_forbidden(e) => ErrorKind::Permission,
            Self::Discord(_) | Self::Store(_) | Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Text shown to the member who triggered the failure.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::UserInput | ErrorKind::External => format!("❌ {self}"),
            ErrorKind::Permission => "❌ I don't have permission to do that. Check that my role has \
                the required permissions and sits above the roles I manage."
                .to_string(),
            ErrorKind::Unexpected => "❌ Something went wrong while running that command.".to_string(),
        }
    }
}

/// Whether Discord rejected the request with HTTP 403.
pub fn is_forbidden(err: &serenity::Error) -> bool {
    http_status(err) == Some(403)
}

/// Whether the target of the request does not exist (HTTP 404).
pub fn is_not_found(err: &serenity::Error) -> bool {
    http_status(err) == Some(404)
}

fn http_status(err: &serenity::Error) -> Option<u16> {
    match err {
        serenity::Error::Http(e) => e.status_code().map(|s| s.as_u16()),
        _ => None,
    }
}

fn wait_time(remaining: &Duration) -> String {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    humantime::format_duration(Duration::from_secs(secs.max(1))).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_rounds_up_to_whole_seconds() {
        let err = BotError::Cooldown(Duration::from_millis(14_200));
        assert_eq!(err.to_string(), "This command is on cooldown, try again in 15s.");
        assert_eq!(err.kind(), ErrorKind::UserInput);
    }

    #[test]
    fn argument_errors_show_usage() {
        let err = BotError::BadArguments("~volume <level>".to_string());
        assert_eq!(err.kind(), ErrorKind::UserInput);
        assert_eq!(
            err.user_message(),
            "❌ I couldn't understand that.\nUsage: `~volume <level>`"
        );
    }

    #[test]
    fn domain_rejections_are_user_errors() {
        let err = BotError::from(MusicError::VolumeOutOfRange);
        assert_eq!(err.kind(), ErrorKind::UserInput);
        assert_eq!(err.user_message(), "❌ Please enter a value between 1 and 100.");

        let err = BotError::from(BlacklistError::AllDuplicates);
        assert_eq!(err.kind(), ErrorKind::UserInput);
    }

    #[test]
    fn unexpected_errors_hide_details() {
        let err = BotError::from(anyhow::anyhow!("database exploded"));
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(!err.user_message().contains("exploded"));
    }

    #[test]
    fn resolver_failures_are_external() {
        let err = BotError::from(ResolveError::NoResults("zzz".to_string()));
        assert_eq!(err.kind(), ErrorKind::External);
        assert!(err.user_message().contains("zzz"));
    }
}
