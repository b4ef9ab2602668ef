//! # Cache Module
//!
//! Caching of external lookup results for Keion.
//!
//! Resolving a song means spawning `yt-dlp` (and, for Spotify links, two HTTP
//! calls), which takes seconds. Resolved songs are cached by URL so repeated
//! requests for the same link are answered instantly.
//!
//! ## Features
//!
//! - **TTL Support**: entries expire a fixed time after their last access
//! - **Bounded Size**: the least played entry is evicted when the cache is full
//! - **Thread Safety**: the only state shared across guilds, safe for
//!   concurrent reads and inserts from every guild's tasks
//!
//! ## Configuration
//!
//! ```env
//! CACHE_SIZE=50     # Maximum number of resolved songs
//! CACHE_TTL=3600    # Seconds an entry lives after its last access
//! ```

pub mod lru_cache;

use lru_cache::LRUCache;
use tracing::info;

use crate::sources::Song;

/// Cache de canciones resueltas, indexado por URL.
pub type SongCache = LRUCache<String, Song>;

impl SongCache {
    /// Mantenimiento periódico: elimina entradas expiradas.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }
}
