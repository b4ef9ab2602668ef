//! # Audio Module
//!
//! Per-guild queues, voice connections and the driver that ties them together.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue State
//! - FIFO of pending songs plus the song currently playing
//! - Loop modes (off / queue / song) and the queue-loop rotation
//! - Pure state: no I/O, no locking
//!
//! ### [`voice`] - Voice Sessions
//! - At most one voice connection per guild
//! - Inactivity timer that leaves the channel after `IDLE_TIMEOUT`
//! - Leaves immediately when the bot is alone in its channel
//!
//! ### [`transport`] - Voice Transport
//! - `Transport` / `VoiceConnector` traits, implemented over songbird
//! - Track completion reported back as a [`transport::SessionEvent`]
//!
//! ### [`player`] - Session Driver
//! - [`player::MusicCoordinator`]: entry points used by the slash commands
//! - One session per guild; its mutex is held for the whole of every entry
//!   point and completion events are handled by a per-guild worker task
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let outcome = coordinator.play(guild_id, user_channel, user_id, "k-on fuwa fuwa time").await?;
//! coordinator.toggle_loop(guild_id, user_channel, LoopTarget::Queue).await?;
//! coordinator.skip(guild_id, user_channel).await?;
//! ```

pub mod player;
pub mod queue;
pub mod transport;
pub mod voice;
