//! # Audio Module
//!
//! Per-guild music playback.
//!
//! ## Architecture
//!
//! ### [`queue`] - Track Queue
//! - Unbounded FIFO with a single consumer waiting under a deadline
//! - Closes itself when the deadline passes on an empty queue
//!
//! ### [`player`] - Guild Player
//! - One playback task per guild: dequeue, resolve deferred tracks, play, wait for the end
//! - Pause / resume / skip / volume / stop with connection checks
//! - Skip-and-continue when a queued track cannot be resolved
//!
//! ### [`registry`] - Player Registry
//! - Creates players lazily on the first `play`
//! - Removes a player when its task exits, unless it was already replaced
//!
//! ### [`voice`] - Voice Sink
//! - Seam between the player and songbird, so the loop can be driven without Discord
//!
//! ## State machine
//!
//! ```text
//! Idle ─play─▶ Connecting ─joined─▶ Playing ⇄ Paused
//!                                     │  ▲
//!                        resolve fail ▼  │ next item
//!                                     Error
//! Playing/Paused ─stop or 5 min idle─▶ Idle (voice left, player removed)
//! ```

pub mod player;
pub mod queue;
pub mod registry;
pub mod voice;

pub use player::{GuildPlayer, MusicError, PlayerExit, PlayerNotifier, PlayerSettings, Transition};
pub use registry::{PlayerOutputs, PlayerRegistry};
pub use voice::{PlaybackState, SongbirdSink, VoiceError, VoiceSink};
