use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::sources::PlayableTrack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("could not join the voice channel: {0}")]
    Join(String),
    #[error("track control failed: {0}")]
    Control(String),
}

/// The voice connection of one guild.
///
/// Implementations signal `finished` exactly once per played track, whether
/// the track ended, errored or was stopped.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn is_connected(&self) -> bool;

    async fn state(&self) -> PlaybackState;

    /// Joins the player's voice channel unless already connected.
    async fn connect(&self) -> Result<(), VoiceError>;

    async fn play(
        &self,
        track: &PlayableTrack,
        volume: f32,
        finished: Arc<Notify>,
    ) -> Result<(), VoiceError>;

    async fn pause(&self) -> Result<(), VoiceError>;

    async fn resume(&self) -> Result<(), VoiceError>;

    /// Stops the current track, if any.
    async fn stop(&self) -> Result<(), VoiceError>;

    async fn set_volume(&self, volume: f32) -> Result<(), VoiceError>;

    /// Leaves the channel. Leaving twice is not an error.
    async fn disconnect(&self) -> Result<(), VoiceError>;
}

/// Whether songbird holds a live connection for `guild_id`.
pub async fn is_connected(manager: &Songbird, guild_id: GuildId) -> bool {
    match manager.get(guild_id) {
        Some(call) => call.lock().await.current_connection().is_some(),
        None => false,
    }
}

/// Joins `channel_id`, or moves the existing call there.
pub async fn join(
    manager: &Songbird,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> Result<(), VoiceError> {
    manager
        .join(guild_id, channel_id)
        .await
        .map_err(|e| VoiceError::Join(e.to_string()))?;

    info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
    Ok(())
}

/// [`VoiceSink`] backed by a songbird call.
///
/// `channel_id` is the voice channel the player was started for. The sink
/// rejoins it when the connection was lost between tracks.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
        http: reqwest::Client,
    ) -> Self {
        Self {
            manager,
            guild_id,
            channel_id,
            http,
            current: Mutex::new(None),
        }
    }

    fn handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn is_connected(&self) -> bool {
        is_connected(&self.manager, self.guild_id).await
    }

    async fn state(&self) -> PlaybackState {
        let Some(handle) = self.handle() else {
            return PlaybackState::Idle;
        };

        match handle.get_info().await {
            Ok(info) => match info.playing {
                PlayMode::Play => PlaybackState::Playing,
                PlayMode::Pause => PlaybackState::Paused,
                _ => PlaybackState::Idle,
            },
            // The driver drops finished tracks, after which queries fail.
            Err(_) => PlaybackState::Idle,
        }
    }

    async fn connect(&self) -> Result<(), VoiceError> {
        if self.is_connected().await {
            return Ok(());
        }

        debug!("Rejoining voice channel {} in guild {}", self.channel_id, self.guild_id);
        join(&self.manager, self.guild_id, self.channel_id).await
    }

    async fn play(
        &self,
        track: &PlayableTrack,
        volume: f32,
        finished: Arc<Notify>,
    ) -> Result<(), VoiceError> {
        let call = self
            .manager
            .get(self.guild_id)
            .ok_or(VoiceError::NotConnected)?;

        let input: Input = HttpRequest::new(self.http.clone(), track.stream_url.clone()).into();
        let handle = call.lock().await.play_only_input(input);

        handle
            .set_volume(volume)
            .map_err(|e| VoiceError::Control(e.to_string()))?;

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinished {
                        finished: Arc::clone(&finished),
                    },
                )
                .map_err(|e| VoiceError::Control(e.to_string()))?;
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), VoiceError> {
        match self.handle() {
            Some(handle) => handle.pause().map_err(|e| VoiceError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn resume(&self) -> Result<(), VoiceError> {
        match self.handle() {
            Some(handle) => handle.play().map_err(|e| VoiceError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        let handle = self.current.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.stop() {
                // Already finished; the driver has dropped the track.
                debug!("Stopping finished track in guild {}: {}", self.guild_id, e);
            }
        }
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), VoiceError> {
        match self.handle() {
            Some(handle) => handle
                .set_volume(volume)
                .map_err(|e| VoiceError::Control(e.to_string())),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.current.lock().take();

        if self.manager.get(self.guild_id).is_none() {
            return Ok(());
        }

        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("Leaving voice in guild {} failed: {}", self.guild_id, e);
            return Err(VoiceError::Control(e.to_string()));
        }

        info!("👋 Left voice in guild {}", self.guild_id);
        Ok(())
    }
}

/// Wakes the playback loop once the driver is done with a track.
struct TrackFinished {
    finished: Arc<Notify>,
}

#[async_trait]
impl VoiceEventHandler for TrackFinished {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.finished.notify_one();
        None
    }
}
