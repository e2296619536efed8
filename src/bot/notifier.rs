use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;

use crate::{
    audio::PlayerNotifier,
    sources::PlayableTrack,
    ui::embeds::{error_embed, now_playing_embed},
};

/// Posts player messages to the text channel where music was first requested.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl PlayerNotifier for ChannelNotifier {
    async fn announce(&self, track: &PlayableTrack) -> anyhow::Result<MessageId> {
        let message = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(now_playing_embed(track)))
            .await?;
        Ok(message.id)
    }

    async fn report_failure(&self, title: &str, reason: &str) -> anyhow::Result<()> {
        let embed = error_embed(
            "Couldn't play track",
            &format!("There was an error processing **{title}**.\n```{reason}```"),
        );
        self.channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    async fn retract(&self, message: MessageId) -> anyhow::Result<()> {
        self.channel_id.delete_message(&self.http, message).await?;
        Ok(())
    }
}
