use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{GuildId, MessageId};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{QueueClosed, TrackQueue},
        voice::{PlaybackState, VoiceError, VoiceSink},
    },
    sources::{regather, MediaResolver, PlayableTrack, TrackRequest},
};

/// Entries shown by the `queue` command.
pub const QUEUE_PREVIEW_LEN: usize = 5;

#[derive(Debug, Error)]
pub enum MusicError {
    #[error("I'm not connected to a voice channel.")]
    NotConnected,
    #[error("I'm not currently playing anything.")]
    NothingPlaying,
    #[error("There are currently no more queued songs.")]
    QueueEmpty,
    #[error("Please enter a value between 1 and 100.")]
    VolumeOutOfRange,
    #[error("The player for this server just shut down, please try again.")]
    PlayerClosed,
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// Result of a pause or resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
}

/// Why a playback loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerExit {
    IdleTimeout,
    Stopped,
}

/// Where the player reports to its guild's text channel.
#[async_trait]
pub trait PlayerNotifier: Send + Sync {
    /// Posts the "now playing" message.
    async fn announce(&self, track: &PlayableTrack) -> anyhow::Result<MessageId>;

    /// Reports a queued track that could not be played.
    async fn report_failure(&self, title: &str, reason: &str) -> anyhow::Result<()>;

    /// Deletes a previously posted "now playing" message.
    async fn retract(&self, message: MessageId) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerSettings {
    pub idle_timeout: Duration,
    /// Volume scalar in `(0, 1]`.
    pub default_volume: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            default_volume: 0.5,
        }
    }
}

/// Music state of one guild, driven by [`GuildPlayer::run`].
pub struct GuildPlayer {
    guild_id: GuildId,
    queue: TrackQueue,
    current: RwLock<Option<PlayableTrack>>,
    volume: Mutex<f32>,
    now_playing: Mutex<Option<MessageId>>,
    voice: Arc<dyn VoiceSink>,
    notifier: Arc<dyn PlayerNotifier>,
    resolver: Arc<dyn MediaResolver>,
    shutdown: CancellationToken,
    /// Cancelled once the loop has left the voice channel.
    exited: CancellationToken,
    idle_timeout: Duration,
}

impl GuildPlayer {
    pub fn new(
        guild_id: GuildId,
        voice: Arc<dyn VoiceSink>,
        notifier: Arc<dyn PlayerNotifier>,
        resolver: Arc<dyn MediaResolver>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            guild_id,
            queue: TrackQueue::new(),
            current: RwLock::new(None),
            volume: Mutex::new(settings.default_volume.clamp(0.01, 1.0)),
            now_playing: Mutex::new(None),
            voice,
            notifier,
            resolver,
            shutdown: CancellationToken::new(),
            exited: CancellationToken::new(),
            idle_timeout: settings.idle_timeout,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Appends to the queue, returning the 1-based queue position.
    pub fn enqueue(&self, request: TrackRequest) -> Result<usize, QueueClosed> {
        self.queue.push(request)
    }

    /// Whether the loop has exited or is about to.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed() || self.shutdown.is_cancelled()
    }

    pub fn current(&self) -> Option<PlayableTrack> {
        self.current.read().clone()
    }

    /// Whether a track is on the voice connection right now.
    pub fn is_playing(&self) -> bool {
        self.current.read().is_some()
    }

    /// Resolves once [`GuildPlayer::run`] has torn down its voice connection.
    pub async fn wait_exited(&self) {
        self.exited.cancelled().await;
    }

    pub fn upcoming(&self) -> Result<Vec<TrackRequest>, MusicError> {
        let upcoming = self.queue.upcoming(QUEUE_PREVIEW_LEN);
        if upcoming.is_empty() {
            return Err(MusicError::QueueEmpty);
        }
        Ok(upcoming)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Current volume as a percentage.
    pub fn volume_percent(&self) -> u8 {
        (*self.volume.lock() * 100.0).round() as u8
    }

    pub async fn pause(&self) -> Result<Transition, MusicError> {
        self.ensure_connected().await?;

        match self.voice.state().await {
            PlaybackState::Idle => Err(MusicError::NothingPlaying),
            PlaybackState::Paused => Ok(Transition::Unchanged),
            PlaybackState::Playing => {
                self.voice.pause().await?;
                info!("⏸️ Paused playback in guild {}", self.guild_id);
                Ok(Transition::Changed)
            }
        }
    }

    pub async fn resume(&self) -> Result<Transition, MusicError> {
        self.ensure_connected().await?;

        match self.voice.state().await {
            PlaybackState::Paused => {
                self.voice.resume().await?;
                info!("▶️ Resumed playback in guild {}", self.guild_id);
                Ok(Transition::Changed)
            }
            PlaybackState::Idle | PlaybackState::Playing => Ok(Transition::Unchanged),
        }
    }

    /// Stops the current track so the loop moves to the next one.
    pub async fn skip(&self) -> Result<PlayableTrack, MusicError> {
        self.ensure_connected().await?;

        let current = match self.voice.state().await {
            PlaybackState::Idle => None,
            _ => self.current(),
        };
        let current = current.ok_or(MusicError::NothingPlaying)?;

        self.voice.stop().await?;
        info!("⏭️ Skipped {} in guild {}", current.title, self.guild_id);
        Ok(current)
    }

    /// Sets the volume from a percentage in `(0, 100]`.
    pub async fn set_volume(&self, percent: f32) -> Result<(), MusicError> {
        self.ensure_connected().await?;

        if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
            return Err(MusicError::VolumeOutOfRange);
        }

        let volume = percent / 100.0;
        *self.volume.lock() = volume;

        if self.current.read().is_some() {
            self.voice.set_volume(volume).await?;
        }

        debug!("🔊 Volume for guild {} set to {}%", self.guild_id, percent);
        Ok(())
    }

    /// The current track, for commands that require one.
    pub async fn now_playing(&self) -> Result<PlayableTrack, MusicError> {
        self.ensure_connected().await?;
        self.current().ok_or(MusicError::NothingPlaying)
    }

    /// Tracks `message` as the "now playing" message, deleting the previous one.
    pub async fn replace_now_playing(&self, message: MessageId) {
        let previous = self.now_playing.lock().replace(message);
        if let Some(previous) = previous {
            if let Err(e) = self.notifier.retract(previous).await {
                debug!("Now playing message {} not deleted: {}", previous, e);
            }
        }
    }

    /// Drops the queue and stops the loop; the loop leaves the voice channel.
    pub async fn stop(&self) {
        let dropped = self.queue.close();
        self.shutdown.cancel();

        if let Err(e) = self.voice.stop().await {
            debug!("Stopping track in guild {} failed: {}", self.guild_id, e);
        }

        info!(
            "⏹️ Stopped player in guild {} ({} queued tracks dropped)",
            self.guild_id, dropped
        );
    }

    /// Plays queued tracks until the queue idles out or [`GuildPlayer::stop`] is called.
    pub async fn run(&self) -> PlayerExit {
        info!("🎶 Player started for guild {}", self.guild_id);

        let exit = loop {
            let request = tokio::select! {
                _ = self.shutdown.cancelled() => break PlayerExit::Stopped,
                next = self.queue.pop(self.idle_timeout) => match next {
                    Some(request) => request,
                    None if self.shutdown.is_cancelled() => break PlayerExit::Stopped,
                    None => break PlayerExit::IdleTimeout,
                },
            };

            let track = match request {
                TrackRequest::Resolved(track) => track,
                TrackRequest::Deferred(deferred) => {
                    let resolved = tokio::select! {
                        _ = self.shutdown.cancelled() => break PlayerExit::Stopped,
                        resolved = regather(self.resolver.as_ref(), &deferred) => resolved,
                    };

                    match resolved {
                        Ok(track) => track,
                        Err(e) => {
                            warn!("❌ Could not resolve {}: {}", deferred.title, e);
                            self.report_failure(&deferred.title, &e.to_string()).await;
                            continue;
                        }
                    }
                }
            };

            if let Err(e) = self.play_to_end(track.clone()).await {
                warn!("❌ Could not play {}: {}", track.title, e);
                self.report_failure(&track.title, &e.to_string()).await;
            }
        };

        self.teardown(exit).await;
        exit
    }

    async fn play_to_end(&self, track: PlayableTrack) -> Result<(), VoiceError> {
        let finished = Arc::new(Notify::new());
        let volume = *self.volume.lock();

        self.voice.connect().await?;
        self.voice.play(&track, volume, Arc::clone(&finished)).await?;
        info!("🎵 Now playing in guild {}: {}", self.guild_id, track.title);

        *self.current.write() = Some(track.clone());

        match self.notifier.announce(&track).await {
            Ok(message) => *self.now_playing.lock() = Some(message),
            Err(e) => warn!("Could not announce {}: {}", track.title, e),
        }

        tokio::select! {
            _ = finished.notified() => {}
            _ = self.shutdown.cancelled() => {
                if let Err(e) = self.voice.stop().await {
                    debug!("Stopping track in guild {} failed: {}", self.guild_id, e);
                }
            }
        }

        *self.current.write() = None;
        self.retract_now_playing().await;
        Ok(())
    }

    async fn teardown(&self, exit: PlayerExit) {
        self.queue.close();
        *self.current.write() = None;
        self.retract_now_playing().await;

        if let Err(e) = self.voice.disconnect().await {
            error!("Could not leave voice in guild {}: {}", self.guild_id, e);
        }

        info!("👋 Player for guild {} exited: {:?}", self.guild_id, exit);
        self.exited.cancel();
    }

    async fn ensure_connected(&self) -> Result<(), MusicError> {
        if self.voice.is_connected().await {
            Ok(())
        } else {
            Err(MusicError::NotConnected)
        }
    }

    async fn retract_now_playing(&self) {
        let message = self.now_playing.lock().take();
        if let Some(message) = message {
            if let Err(e) = self.notifier.retract(message).await {
                debug!("Now playing message {} not deleted: {}", message, e);
            }
        }
    }

    async fn report_failure(&self, title: &str, reason: &str) {
        if let Err(e) = self.notifier.report_failure(title, reason).await {
            debug!("Failure report for {} not delivered: {}", title, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sources::{DeferredTrack, MockMediaResolver, Requester, ResolveError, StreamInfo};
    use serenity::model::id::UserId;
    use tokio::sync::mpsc;

    /// In-memory voice connection reporting each started track on a channel.
    pub(crate) struct FakeVoice {
        connected: Mutex<bool>,
        state: Mutex<PlaybackState>,
        finished: Mutex<Option<Arc<Notify>>>,
        pub volumes: Mutex<Vec<f32>>,
        pub disconnects: Mutex<usize>,
        /// Joins and leaves, in order.
        pub log: Mutex<Vec<&'static str>>,
        leave_delay: Mutex<Duration>,
        started: mpsc::UnboundedSender<String>,
    }

    impl FakeVoice {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
            let (started, rx) = mpsc::unbounded_channel();
            let voice = Arc::new(Self {
                connected: Mutex::new(true),
                state: Mutex::new(PlaybackState::Idle),
                finished: Mutex::new(None),
                volumes: Mutex::new(Vec::new()),
                disconnects: Mutex::new(0),
                log: Mutex::new(Vec::new()),
                leave_delay: Mutex::new(Duration::ZERO),
                started,
            });
            (voice, rx)
        }

        pub(crate) fn set_connected(&self, connected: bool) {
            *self.connected.lock() = connected;
        }

        /// Makes leaving the channel take `delay`, like a slow gateway.
        pub(crate) fn set_leave_delay(&self, delay: Duration) {
            *self.leave_delay.lock() = delay;
        }

        /// Simulates the driver reaching the end of the current track.
        pub(crate) fn finish_current(&self) {
            *self.state.lock() = PlaybackState::Idle;
            if let Some(finished) = self.finished.lock().take() {
                finished.notify_one();
            }
        }
    }

    #[async_trait]
    impl VoiceSink for FakeVoice {
        async fn is_connected(&self) -> bool {
            *self.connected.lock()
        }

        async fn state(&self) -> PlaybackState {
            *self.state.lock()
        }

        async fn connect(&self) -> Result<(), VoiceError> {
            let mut connected = self.connected.lock();
            if !*connected {
                *connected = true;
                self.log.lock().push("joined");
            }
            Ok(())
        }

        async fn play(
            &self,
            track: &PlayableTrack,
            volume: f32,
            finished: Arc<Notify>,
        ) -> Result<(), VoiceError> {
            if !*self.connected.lock() {
                return Err(VoiceError::NotConnected);
            }
            *self.state.lock() = PlaybackState::Playing;
            *self.finished.lock() = Some(finished);
            self.volumes.lock().push(volume);
            let _ = self.started.send(track.title.clone());
            Ok(())
        }

        async fn pause(&self) -> Result<(), VoiceError> {
            *self.state.lock() = PlaybackState::Paused;
            Ok(())
        }

        async fn resume(&self) -> Result<(), VoiceError> {
            *self.state.lock() = PlaybackState::Playing;
            Ok(())
        }

        async fn stop(&self) -> Result<(), VoiceError> {
            self.finish_current();
            Ok(())
        }

        async fn set_volume(&self, volume: f32) -> Result<(), VoiceError> {
            self.volumes.lock().push(volume);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), VoiceError> {
            let delay = *self.leave_delay.lock();
            tokio::time::sleep(delay).await;

            *self.connected.lock() = false;
            *self.disconnects.lock() += 1;
            self.log.lock().push("left");
            Ok(())
        }
    }

    /// Records what the player told the text channel.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub events: Mutex<Vec<String>>,
        next_id: Mutex<u64>,
    }

    #[async_trait]
    impl PlayerNotifier for RecordingNotifier {
        async fn announce(&self, track: &PlayableTrack) -> anyhow::Result<MessageId> {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            self.events.lock().push(format!("now playing {}", track.title));
            Ok(MessageId::new(*next_id))
        }

        async fn report_failure(&self, title: &str, _reason: &str) -> anyhow::Result<()> {
            self.events.lock().push(format!("failed {title}"));
            Ok(())
        }

        async fn retract(&self, message: MessageId) -> anyhow::Result<()> {
            self.events.lock().push(format!("deleted {message}"));
            Ok(())
        }
    }

    pub(crate) fn requester() -> Requester {
        Requester {
            id: UserId::new(7),
            name: "dj".to_string(),
        }
    }

    pub(crate) fn resolved(title: &str) -> TrackRequest {
        TrackRequest::Resolved(PlayableTrack {
            title: title.to_string(),
            webpage_url: format!("https://youtu.be/{title}"),
            stream_url: format!("https://cdn.example/{title}"),
            duration: Some(Duration::from_secs(180)),
            thumbnail: None,
            requester: requester(),
        })
    }

    fn deferred(title: &str) -> TrackRequest {
        TrackRequest::Deferred(DeferredTrack {
            title: title.to_string(),
            webpage_url: format!("https://youtu.be/{title}"),
            duration: None,
            thumbnail: None,
            requester: requester(),
        })
    }

    fn player(
        voice: Arc<FakeVoice>,
        notifier: Arc<RecordingNotifier>,
        resolver: MockMediaResolver,
    ) -> Arc<GuildPlayer> {
        Arc::new(GuildPlayer::new(
            GuildId::new(1),
            voice,
            notifier,
            Arc::new(resolver),
            PlayerSettings::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn second_track_waits_then_starts_when_first_ends() {
        let (voice, mut started) = FakeVoice::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let player = player(voice.clone(), notifier.clone(), MockMediaResolver::new());

        assert_eq!(player.enqueue(resolved("A")).unwrap(), 1);
        let looping = tokio::spawn({
            let player = Arc::clone(&player);
            async move { player.run().await }
        });

        assert_eq!(started.recv().await.unwrap(), "A");
        assert_eq!(player.enqueue(resolved("B")).unwrap(), 1);
        assert_eq!(player.upcoming().unwrap()[0].title(), "B");

        voice.finish_current();
        assert_eq!(started.recv().await.unwrap(), "B");
        assert_eq!(player.current().unwrap().title, "B");

        player.stop().await;
        assert_eq!(looping.await.unwrap(), PlayerExit::Stopped);
        assert_eq!(*voice.disconnects.lock(), 1);

        let events = notifier.events.lock().clone();
        assert_eq!(events[0], "now playing A");
        assert_eq!(events[1], "deleted 1");
        assert_eq!(events[2], "now playing B");
    }

    #[tokio::test(start_paused = true)]
    async fn idles_out_and_disconnects() {
        let (voice, _started) = FakeVoice::new();
        let player = player(
            voice.clone(),
            Arc::new(RecordingNotifier::default()),
            MockMediaResolver::new(),
        );

        assert_eq!(player.run().await, PlayerExit::IdleTimeout);
        assert!(player.is_closed());
        assert_eq!(*voice.disconnects.lock(), 1);
        assert!(player.enqueue(resolved("late")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resolution_is_reported_and_skipped() {
        let (voice, mut started) = FakeVoice::new();
        let notifier = Arc::new(RecordingNotifier::default());

        let mut resolver = MockMediaResolver::new();
        resolver.expect_resolve_stream().times(2).returning(|url| {
            if url.ends_with("broken") {
                Err(ResolveError::Extractor("Video unavailable".to_string()))
            } else {
                Ok(StreamInfo {
                    title: "good".to_string(),
                    webpage_url: url.to_string(),
                    stream_url: "https://cdn.example/good".to_string(),
                })
            }
        });

        let player = player(voice.clone(), notifier.clone(), resolver);
        player.enqueue(deferred("broken")).unwrap();
        player.enqueue(deferred("good")).unwrap();

        let looping = tokio::spawn({
            let player = Arc::clone(&player);
            async move { player.run().await }
        });

        assert_eq!(started.recv().await.unwrap(), "good");
        assert_eq!(notifier.events.lock()[0], "failed broken");

        player.stop().await;
        assert_eq!(looping.await.unwrap(), PlayerExit::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_are_idempotent() {
        let (voice, mut started) = FakeVoice::new();
        let player = player(
            voice.clone(),
            Arc::new(RecordingNotifier::default()),
            MockMediaResolver::new(),
        );

        assert!(matches!(player.pause().await, Err(MusicError::NothingPlaying)));

        player.enqueue(resolved("A")).unwrap();
        let looping = tokio::spawn({
            let player = Arc::clone(&player);
            async move { player.run().await }
        });
        started.recv().await.unwrap();

        assert_eq!(player.resume().await.unwrap(), Transition::Unchanged);
        assert_eq!(player.pause().await.unwrap(), Transition::Changed);
        assert_eq!(player.pause().await.unwrap(), Transition::Unchanged);
        assert_eq!(player.resume().await.unwrap(), Transition::Changed);

        player.stop().await;
        looping.await.unwrap();
    }

    #[tokio::test]
    async fn commands_require_a_voice_connection() {
        let (voice, _started) = FakeVoice::new();
        voice.set_connected(false);
        let player = player(
            voice,
            Arc::new(RecordingNotifier::default()),
            MockMediaResolver::new(),
        );

        assert!(matches!(player.pause().await, Err(MusicError::NotConnected)));
        assert!(matches!(player.resume().await, Err(MusicError::NotConnected)));
        assert!(matches!(player.skip().await, Err(MusicError::NotConnected)));
        assert!(matches!(player.set_volume(50.0).await, Err(MusicError::NotConnected)));
    }

    #[tokio::test]
    async fn volume_out_of_range_changes_nothing() {
        let (voice, _started) = FakeVoice::new();
        let player = player(
            voice.clone(),
            Arc::new(RecordingNotifier::default()),
            MockMediaResolver::new(),
        );

        for bad in [0.0, -5.0, 100.5, f32::NAN] {
            assert!(matches!(
                player.set_volume(bad).await,
                Err(MusicError::VolumeOutOfRange)
            ));
        }
        assert_eq!(player.volume_percent(), 50);

        player.set_volume(80.0).await.unwrap();
        assert_eq!(player.volume_percent(), 80);
        assert!(voice.volumes.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn volume_applies_to_current_and_later_tracks() {
        let (voice, mut started) = FakeVoice::new();
        let player = player(
            voice.clone(),
            Arc::new(RecordingNotifier::default()),
            MockMediaResolver::new(),
        );

        player.enqueue(resolved("A")).unwrap();
        player.enqueue(resolved("B")).unwrap();
        let looping = tokio::spawn({
            let player = Arc::clone(&player);
            async move { player.run().await }
        });

        started.recv().await.unwrap();
        player.set_volume(20.0).await.unwrap();

        let skipped = player.skip().await.unwrap();
        assert_eq!(skipped.title, "A");
        assert_eq!(started.recv().await.unwrap(), "B");

        assert_eq!(*voice.volumes.lock(), vec![0.5, 0.2, 0.2]);

        player.stop().await;
        looping.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reposting_now_playing_deletes_the_previous_message() {
        let (voice, mut started) = FakeVoice::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let player = player(voice, notifier.clone(), MockMediaResolver::new());

        assert!(matches!(player.now_playing().await, Err(MusicError::NothingPlaying)));

        player.enqueue(resolved("A")).unwrap();
        let looping = tokio::spawn({
            let player = Arc::clone(&player);
            async move { player.run().await }
        });
        started.recv().await.unwrap();

        assert_eq!(player.now_playing().await.unwrap().title, "A");
        player.replace_now_playing(MessageId::new(500)).await;

        player.stop().await;
        looping.await.unwrap();

        let events = notifier.events.lock().clone();
        assert_eq!(
            events,
            vec!["now playing A", "deleted 1", "deleted 500"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejoins_voice_before_playing_after_losing_the_connection() {
        let (voice, mut started) = FakeVoice::new();
        voice.set_connected(false);
        let player = player(
            voice.clone(),
            Arc::new(RecordingNotifier::default()),
            MockMediaResolver::new(),
        );

        player.enqueue(resolved("A")).unwrap();
        let looping = tokio::spawn({
            let player = Arc::clone(&player);
            async move { player.run().await }
        });

        assert_eq!(started.recv().await.unwrap(), "A");
        assert!(player.is_playing());
        assert_eq!(*voice.log.lock(), vec!["joined"]);

        player.stop().await;
        looping.await.unwrap();
        assert_eq!(*voice.log.lock(), vec!["joined", "left"]);
    }

    #[tokio::test]
    async fn empty_queue_listing_is_an_error() {
        let (voice, _started) = FakeVoice::new();
        let player = player(
            voice,
            Arc::new(RecordingNotifier::default()),
            MockMediaResolver::new(),
        );

        assert!(matches!(player.upcoming(), Err(MusicError::QueueEmpty)));
    }
}
