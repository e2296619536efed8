use serde::Deserialize;
use tracing::debug;

use super::ApiError;

/// One post from the meme API.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Meme {
    pub title: String,
    pub url: String,
    #[serde(rename = "postLink", default)]
    pub post_link: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
}

pub struct MemeClient {
    http: reqwest::Client,
    endpoint: String,
}

impl MemeClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Fetches a random meme, retrying once when the first pick is NSFW.
    pub async fn random(&self) -> Result<Meme, ApiError> {
        let mut meme = self.fetch().await?;
        if meme.nsfw {
            debug!("Skipping NSFW meme {}", meme.title);
            meme = self.fetch().await?;
        }

        if meme.nsfw {
            return Err(ApiError::Empty("meme API"));
        }
        Ok(meme)
    }

    async fn fetch(&self) -> Result<Meme, ApiError> {
        let resp = self.http.get(&self.endpoint).send().await?;

        if !resp.status().is_success() {
            return Err(ApiError::Status {
                service: "meme API",
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json::<Meme>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gimme_payload() {
        let body = r#"{
            "postLink": "https://redd.it/abc",
            "subreddit": "memes",
            "title": "Monday",
            "url": "https://i.redd.it/abc.png",
            "nsfw": false,
            "spoiler": false,
            "author": "someone",
            "ups": 42
        }"#;

        let meme: Meme = serde_json::from_str(body).unwrap();
        assert_eq!(meme.title, "Monday");
        assert_eq!(meme.url, "https://i.redd.it/abc.png");
        assert_eq!(meme.post_link.as_deref(), Some("https://redd.it/abc"));
        assert!(!meme.nsfw);
    }

    #[test]
    fn missing_optional_fields_default() {
        let meme: Meme = serde_json::from_str(r#"{"title":"t","url":"u"}"#).unwrap();
        assert_eq!(meme.subreddit, None);
        assert!(!meme.nsfw);
    }
}
