//! # Web Module
//!
//! Read-only status dashboard served with axum.
//!
//! Enabled only when `DASHBOARD_ADDR` is set. Every route reads snapshots from
//! the [`MusicCoordinator`]; nothing here can change a queue or a voice
//! connection.
//!
//! - `GET /api/stats`: active voice connections, songs queued and uptime
//! - `GET /api/players`: every guild with a session
//! - `GET /api/players/{guild_id}`: a single guild, 404 if it has no session

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serenity::model::id::GuildId;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::{
        player::{MusicCoordinator, PlayerStatus},
        queue::LoopMode,
    },
    cache::lru_cache::LRUCache,
    sources::Song,
};

/// Tiempo que se reutiliza una respuesta de `/api/stats`
const STATS_TTL: Duration = Duration::from_secs(30);
const STATS_KEY: &str = "stats";

pub struct DashboardState {
    coordinator: Arc<MusicCoordinator>,
    started_at: DateTime<Utc>,
    stats_cache: LRUCache<&'static str, StatsDto>,
}

impl DashboardState {
    pub fn new(coordinator: Arc<MusicCoordinator>) -> Self {
        Self {
            coordinator,
            started_at: Utc::now(),
            stats_cache: LRUCache::new(1, STATS_TTL),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsDto {
    pub active_connections: usize,
    pub active_players: usize,
    pub songs_queued: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SongDto {
    pub title: String,
    pub url: String,
    pub artist: Option<String>,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<String>,
    pub source: Option<String>,
    pub requested_by: Option<String>,
}

impl From<&Song> for SongDto {
    fn from(song: &Song) -> Self {
        Self {
            title: song.title().to_string(),
            url: song.page_url().to_string(),
            artist: song.display_artist(),
            duration_secs: song.metadata().duration.map(|d| d.as_secs()),
            thumbnail: song.display_thumbnail().map(str::to_string),
            source: song.metadata().source.clone(),
            requested_by: song.requested_by().map(|user| user.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerDto {
    /// Como texto: los snowflakes no caben en un número de JavaScript
    pub guild_id: String,
    pub connected: bool,
    pub playing: bool,
    pub paused: bool,
    pub loop_mode: LoopMode,
    pub current: Option<SongDto>,
    pub queue: Vec<SongDto>,
}

impl From<&PlayerStatus> for PlayerDto {
    fn from(status: &PlayerStatus) -> Self {
        Self {
            guild_id: status.guild_id.to_string(),
            connected: status.connected,
            playing: status.playing,
            paused: status.paused,
            loop_mode: status.queue.loop_mode,
            current: status.queue.current.as_ref().map(SongDto::from),
            queue: status.queue.pending.iter().map(SongDto::from).collect(),
        }
    }
}

pub fn router() -> Router<Arc<DashboardState>> {
    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/players", get(list_players))
        .route("/api/players/{guild_id}", get(get_player))
}

/// Levanta el dashboard en `addr` hasta que el proceso termine
pub async fn serve(addr: SocketAddr, coordinator: Arc<MusicCoordinator>) -> anyhow::Result<()> {
    let state = Arc::new(DashboardState::new(coordinator));
    let app = router().with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("📊 Dashboard escuchando en http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /api/stats
pub async fn get_stats(State(state): State<Arc<DashboardState>>) -> Json<StatsDto> {
    if let Some(stats) = state.stats_cache.get(&STATS_KEY) {
        return Json(stats);
    }

    let players = state.coordinator.snapshots().await;
    let now = Utc::now();
    let stats = StatsDto {
        active_connections: state.coordinator.voice().active_connections(),
        active_players: players.len(),
        songs_queued: players.iter().map(|p| p.queue.pending.len()).sum(),
        started_at: state.started_at,
        uptime_secs: (now - state.started_at).num_seconds(),
    };

    debug!("Estadísticas recalculadas: {:?}", stats);
    state.stats_cache.insert(STATS_KEY, stats.clone());
    Json(stats)
}

/// GET /api/players
pub async fn list_players(State(state): State<Arc<DashboardState>>) -> Json<Vec<PlayerDto>> {
    let players = state.coordinator.snapshots().await;
    Json(players.iter().map(PlayerDto::from).collect())
}

/// GET /api/players/{guild_id}
pub async fn get_player(
    Path(guild_id): Path<u64>,
    State(state): State<Arc<DashboardState>>,
) -> Result<Json<PlayerDto>, StatusCode> {
    // GuildId no admite 0
    if guild_id == 0 {
        return Err(StatusCode::NOT_FOUND);
    }

    state
        .coordinator
        .snapshot(GuildId::new(guild_id))
        .await
        .map(|status| Json(PlayerDto::from(&status)))
        .ok_or(StatusCode::NOT_FOUND)
}
