use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info};

use super::ApiError;

const AUTH_URL: &str = "https://id.twitch.tv/oauth2/token";
const HELIX_URL: &str = "https://api.twitch.tv/helix";
/// Tokens are refreshed this long before Twitch says they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct HelixPage<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct HelixUser {
    id: String,
    login: String,
    display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct HelixStream {
    user_name: String,
    game_id: String,
    game_name: String,
    title: String,
    viewer_count: u64,
    started_at: DateTime<Utc>,
    thumbnail_url: String,
    #[serde(default)]
    is_mature: bool,
}

/// A live stream, ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub user_name: String,
    pub title: String,
    pub game_name: String,
    pub box_art_url: String,
    pub thumbnail_url: String,
    pub stream_url: String,
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
    pub is_mature: bool,
}

impl Broadcast {
    fn new(login: &str, stream: HelixStream) -> Self {
        Self {
            box_art_url: box_art_url(&stream.game_id),
            thumbnail_url: sized_thumbnail(&stream.thumbnail_url, 1280, 720),
            stream_url: format!("https://www.twitch.tv/{login}"),
            user_name: stream.user_name,
            title: stream.title,
            game_name: stream.game_name,
            viewer_count: stream.viewer_count,
            started_at: stream.started_at,
            is_mature: stream.is_mature,
        }
    }

    /// Time live, rounded down to whole minutes.
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        let secs = (now - self.started_at).num_seconds().max(0) as u64;
        Duration::from_secs(secs - secs % 60)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TwitchLookup {
    Live(Broadcast),
    Offline { display_name: String },
    NotFound,
}

struct AppToken {
    value: String,
    refresh_at: Instant,
}

/// Helix client using an app access token (client-credentials flow).
pub struct TwitchClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AppToken>>,
}

impl TwitchClient {
    pub fn new(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        }
    }

    /// Looks up `name` and its current stream.
    pub async fn lookup(&self, name: &str) -> Result<TwitchLookup, ApiError> {
        let login = normalize_login(name);
        let users: Vec<HelixUser> = self.helix("users", &[("login", &login)]).await?;

        let Some(user) = users.into_iter().next() else {
            return Ok(TwitchLookup::NotFound);
        };

        let streams: Vec<HelixStream> = self.helix("streams", &[("user_id", &user.id)]).await?;

        Ok(match streams.into_iter().next() {
            Some(stream) => TwitchLookup::Live(Broadcast::new(&user.login, stream)),
            None => TwitchLookup::Offline {
                display_name: user.display_name,
            },
        })
    }

    async fn helix<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ApiError> {
        let token = self.access_token().await?;

        let resp = self
            .http
            .get(format!("{HELIX_URL}/{endpoint}"))
            .query(query)
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
            .send()
            .await?;

        if resp.status().as_u16() == 401 {
            // Revoked or expired early; fetch a new one next time.
            self.token.lock().await.take();
        }

        if !resp.status().is_success() {
            return Err(ApiError::Status {
                service: "Twitch",
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json::<HelixPage<T>>().await?.data)
    }

    async fn access_token(&self) -> Result<String, ApiError> {
        let mut token = self.token.lock().await;

        if let Some(current) = token.as_ref() {
            if Instant::now() < current.refresh_at {
                return Ok(current.value.clone());
            }
        }

        debug!("Requesting a Twitch app access token");
        let resp = self
            .http
            .post(AUTH_URL)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ApiError::Status {
                service: "Twitch auth",
                status: resp.status().as_u16(),
            });
        }

        let fresh: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_MARGIN);
        info!("📺 Twitch token acquired, valid for {}", humantime::format_duration(lifetime));

        *token = Some(AppToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }
}

fn normalize_login(name: &str) -> String {
    name.trim()
        .trim_start_matches("https://www.twitch.tv/")
        .trim_start_matches('@')
        .to_lowercase()
}

fn box_art_url(game_id: &str) -> String {
    format!("https://static-cdn.jtvnw.net/ttv-boxart/{game_id}-285x380.jpg")
}

fn sized_thumbnail(template: &str, width: u32, height: u32) -> String {
    template
        .replace("{width}", &width.to_string())
        .replace("{height}", &height.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STREAMS: &str = r#"{
        "data": [{
            "id": "1",
            "user_id": "141981764",
            "user_login": "twitchdev",
            "user_name": "TwitchDev",
            "game_id": "509670",
            "game_name": "Science & Technology",
            "type": "live",
            "title": "Building bots",
            "viewer_count": 1234,
            "started_at": "2024-03-01T18:00:00Z",
            "language": "en",
            "thumbnail_url": "https://static-cdn.jtvnw.net/previews-ttv/live_user_twitchdev-{width}x{height}.jpg",
            "is_mature": false
        }],
        "pagination": {}
    }"#;

    #[test]
    fn builds_broadcast_from_helix_stream() {
        let page: HelixPage<HelixStream> = serde_json::from_str(STREAMS).unwrap();
        let stream = page.data.into_iter().next().unwrap();

        let broadcast = Broadcast::new("twitchdev", stream);

        assert_eq!(broadcast.stream_url, "https://www.twitch.tv/twitchdev");
        assert_eq!(
            broadcast.box_art_url,
            "https://static-cdn.jtvnw.net/ttv-boxart/509670-285x380.jpg"
        );
        assert_eq!(
            broadcast.thumbnail_url,
            "https://static-cdn.jtvnw.net/previews-ttv/live_user_twitchdev-1280x720.jpg"
        );
        assert_eq!(broadcast.viewer_count, 1234);
    }

    #[test]
    fn uptime_rounds_down_to_minutes() {
        let page: HelixPage<HelixStream> = serde_json::from_str(STREAMS).unwrap();
        let broadcast = Broadcast::new("twitchdev", page.data[0].clone());

        let now = broadcast.started_at + chrono::Duration::seconds(3 * 3600 + 5 * 60 + 42);
        assert_eq!(broadcast.uptime(now), Duration::from_secs(3 * 3600 + 5 * 60));
        assert_eq!(broadcast.uptime(broadcast.started_at - chrono::Duration::seconds(5)), Duration::ZERO);
    }

    #[test]
    fn login_is_normalized() {
        assert_eq!(normalize_login("  Shroud "), "shroud");
        assert_eq!(normalize_login("@Pokimane"), "pokimane");
        assert_eq!(normalize_login("https://www.twitch.tv/xQc"), "xqc");
    }
}
