use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::{
        player::{GuildPlayer, MusicError, PlayerNotifier, PlayerSettings},
        queue::QueueClosed,
        voice::VoiceSink,
    },
    sources::{MediaResolver, TrackRequest},
};

/// Guild-specific collaborators of a new player.
pub struct PlayerOutputs {
    pub voice: Arc<dyn VoiceSink>,
    pub notifier: Arc<dyn PlayerNotifier>,
}

/// Owns every active [`GuildPlayer`] and its playback task.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    resolver: Arc<dyn MediaResolver>,
    settings: PlayerSettings,
}

impl PlayerRegistry {
    pub fn new(resolver: Arc<dyn MediaResolver>, settings: PlayerSettings) -> Self {
        Self {
            players: DashMap::new(),
            resolver,
            settings,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players
            .get(&guild_id)
            .filter(|player| !player.is_closed())
            .map(|player| Arc::clone(player.value()))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Returns the live player of `guild_id`, creating and starting one if needed.
    ///
    /// Check-then-create happens under the map's entry lock, so concurrent
    /// callers for one guild always share the same player.
    pub fn get_or_create<F>(self: &Arc<Self>, guild_id: GuildId, outputs: F) -> Arc<GuildPlayer>
    where
        F: FnOnce() -> PlayerOutputs,
    {
        let (player, previous) = match self.players.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_closed() => {
                return Arc::clone(entry.get());
            }
            Entry::Occupied(mut entry) => {
                let player = self.build(guild_id, outputs());
                let previous = entry.insert(Arc::clone(&player));
                (player, Some(previous))
            }
            Entry::Vacant(entry) => {
                let player = self.build(guild_id, outputs());
                entry.insert(Arc::clone(&player));
                (player, None)
            }
        };

        self.spawn(Arc::clone(&player), previous);
        player
    }

    /// Queues `request`, replacing the guild's player if it shut down meanwhile.
    pub fn enqueue<F>(
        self: &Arc<Self>,
        guild_id: GuildId,
        request: TrackRequest,
        outputs: F,
    ) -> Result<(Arc<GuildPlayer>, usize), MusicError>
    where
        F: Fn() -> PlayerOutputs,
    {
        let mut request = request;

        for _ in 0..2 {
            let player = self.get_or_create(guild_id, &outputs);
            match player.enqueue(request) {
                Ok(position) => return Ok((player, position)),
                Err(QueueClosed(rejected)) => {
                    debug!("Player for guild {} closed during enqueue, retrying", guild_id);
                    request = rejected;
                }
            }
        }

        Err(MusicError::PlayerClosed)
    }

    /// Stops the guild's player only while it has a track on the voice
    /// connection. A player between tracks is left alone.
    pub async fn stop_playing(&self, guild_id: GuildId) -> bool {
        match self
            .players
            .remove_if(&guild_id, |_, player| player.is_playing())
        {
            Some((_, player)) => {
                player.stop().await;
                true
            }
            None => false,
        }
    }

    /// Removes and stops the guild's player. Returns whether one existed.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        match self.players.remove(&guild_id) {
            Some((_, player)) => {
                player.stop().await;
                true
            }
            None => false,
        }
    }

    fn build(&self, guild_id: GuildId, outputs: PlayerOutputs) -> Arc<GuildPlayer> {
        Arc::new(GuildPlayer::new(
            guild_id,
            outputs.voice,
            outputs.notifier,
            Arc::clone(&self.resolver),
            self.settings,
        ))
    }

    /// Runs `player` once `previous`, the instance it replaced, has left voice.
    fn spawn(self: &Arc<Self>, player: Arc<GuildPlayer>, previous: Option<Arc<GuildPlayer>>) {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let guild_id = player.guild_id();
            if let Some(previous) = previous {
                debug!("Waiting for the previous player of guild {} to exit", guild_id);
                previous.wait_exited().await;
            }

            let exit = player.run().await;

            let removed = registry
                .players
                .remove_if(&guild_id, |_, current| Arc::ptr_eq(current, &player))
                .is_some();

            info!(
                "🗑️ Player task for guild {} finished ({:?}, removed: {})",
                guild_id, exit, removed
            );
        });
    }
}
