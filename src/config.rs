use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,
    pub guild_id: Option<u64>, // For development slash registration

    // Music
    pub default_volume: f32,
    pub idle_timeout_secs: u64,

    // Moderation
    pub purge_all_limit: usize,

    // Background tasks
    pub reconcile_interval_secs: u64,
    pub presence_interval_secs: u64,

    // Paths
    pub data_dir: PathBuf,

    // APIs (optional)
    pub twitch_client_id: Option<String>,
    pub twitch_client_secret: Option<String>,
    pub meme_api_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "~".to_string()),
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            idle_timeout_secs: std::env::var("PLAYER_IDLE_TIMEOUT")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutes
                .parse()?,

            purge_all_limit: std::env::var("PURGE_ALL_LIMIT")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,

            reconcile_interval_secs: std::env::var("REACTION_ROLE_RECONCILE_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            presence_interval_secs: std::env::var("PRESENCE_INTERVAL")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "files".to_string())
                .into(),

            twitch_client_id: std::env::var("TWITCH_CLIENT_ID").ok().filter(|s| !s.is_empty()),
            twitch_client_secret: std::env::var("TWITCH_CLIENT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            meme_api_url: std::env::var("MEME_API_URL")
                .unwrap_or_else(|_| "https://meme-api.com/gimme".to_string()),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and prefix must not be empty
    /// - Default volume must be within (0.0, 1.0]
    /// - Timeouts and intervals must be greater than zero
    /// - Twitch credentials must be provided together
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.default_volume <= 0.0 || self.default_volume > 1.0 {
            anyhow::bail!(
                "Default volume must be within (0.0, 1.0], got: {}",
                self.default_volume
            );
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Player idle timeout must be greater than 0");
        }

        if self.reconcile_interval_secs == 0 || self.presence_interval_secs == 0 {
            anyhow::bail!("Background task intervals must be greater than 0");
        }

        if self.purge_all_limit == 0 {
            anyhow::bail!("Purge limit must be greater than 0");
        }

        if self.twitch_client_id.is_some() != self.twitch_client_secret.is_some() {
            anyhow::bail!("TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.presence_interval_secs)
    }

    pub fn twitch_enabled(&self) -> bool {
        self.twitch_client_id.is_some() && self.twitch_client_secret.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: prefix '{}' (slash scope: {})\n  \
            Music: {}% default vol, {}s idle timeout\n  \
            Tasks: reconcile every {}s, presence every {}s\n  \
            Data: {}\n  \
            Twitch: {}",
            self.command_prefix,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.idle_timeout_secs,
            self.reconcile_interval_secs,
            self.presence_interval_secs,
            self.data_dir.display(),
            if self.twitch_enabled() { "enabled" } else { "disabled" },
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (token has no default - must be provided)
            discord_token: String::new(),
            command_prefix: "~".to_string(),
            guild_id: None,

            default_volume: 0.5,
            idle_timeout_secs: 300,

            purge_all_limit: 500,

            reconcile_interval_secs: 60,
            presence_interval_secs: 30,

            data_dir: "files".into(),

            twitch_client_id: None,
            twitch_client_secret: None,
            meme_api_url: "https://meme-api.com/gimme".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            discord_token: "token".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn default_with_token_is_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn rejects_empty_token() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn rejects_volume_outside_range() {
        let mut config = valid();
        config.default_volume = 0.0;
        assert!(config.validate().is_err());
        config.default_volume = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn twitch_credentials_come_in_pairs() {
        let mut config = valid();
        config.twitch_client_id = Some("id".to_string());
        assert!(config.validate().is_err());

        config.twitch_client_secret = Some("secret".to_string());
        assert!(config.validate().is_ok());
        assert!(config.twitch_enabled());
    }

    #[test]
    fn summary_hides_token() {
        let config = valid();
        assert!(!config.summary().contains("token"));
    }
}
