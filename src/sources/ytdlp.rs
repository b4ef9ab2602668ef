use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tokio::{process::Command, time::timeout};
use tracing::{debug, info, warn};

use super::{is_valid_url, Song, SongResolver, SpotifyClient};
use crate::{
    cache::SongCache,
    error::{MusicError, MusicResult},
};

/// Campos de `yt-dlp --dump-json` que nos interesan
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    artist: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    extractor: Option<String>,
}

impl YtDlpInfo {
    fn into_song(self) -> MusicResult<Song> {
        let locator = self
            .webpage_url
            .clone()
            .or(self.original_url.clone())
            .or(self.url.clone())
            .ok_or_else(|| MusicError::Resolution("yt-dlp no devolvió una URL".to_string()))?;

        let mut song = Song::new(
            self.title.unwrap_or_else(|| "Desconocido".to_string()),
            locator.clone(),
        )
        .with_webpage_url(locator);

        if let Some(artist) = self.artist.or(self.uploader) {
            song = song.with_artist(artist);
        }
        if let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            song = song.with_duration(Duration::from_secs_f64(duration));
        }
        if let Some(thumbnail) = self.thumbnail {
            song = song.with_thumbnail(thumbnail);
        }
        if let Some(stream_url) = self.url {
            song = song.with_stream_url(stream_url);
        }
        if let Some(extractor) = self.extractor {
            song = song.with_source(extractor);
        }

        Ok(song)
    }
}

/// Parsea la salida de `--dump-json`: una línea JSON por resultado
fn parse_dump(stdout: &str) -> MusicResult<Option<Song>> {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let info: YtDlpInfo = serde_json::from_str(line)
        .map_err(|e| MusicError::Resolution(format!("JSON de yt-dlp inválido: {e}")))?;
    info.into_song().map(Some)
}

/// Resolver basado en yt-dlp, con traducción de links de Spotify y cache por URL
pub struct YtDlpResolver {
    cache: Arc<SongCache>,
    spotify: Arc<SpotifyClient>,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(cache: Arc<SongCache>, spotify: Arc<SpotifyClient>, timeout: Duration) -> Self {
        Self {
            cache,
            spotify,
            timeout,
        }
    }

    /// Ejecuta yt-dlp sobre una URL o `ytsearch1:` y devuelve la primera entrada
    async fn extract(&self, target: &str, query: &str) -> MusicResult<Song> {
        debug!("🔍 yt-dlp: {}", target);

        let output = Command::new("yt-dlp")
            .args([
                "--dump-json",
                "--no-playlist",
                "--no-warnings",
                "--quiet",
                "--format",
                "bestaudio[abr<=96]/bestaudio/best",
                target,
            ])
            .kill_on_drop(true)
            .output();

        let output = timeout(self.timeout, output)
            .await
            .map_err(|_| MusicError::Resolution("yt-dlp tardó demasiado".to_string()))?
            .map_err(|e| MusicError::Resolution(format!("No se pudo ejecutar yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló para {}: {}", target, stderr.trim());
            return Err(MusicError::Resolution(
                stderr.lines().last().unwrap_or("yt-dlp falló").trim().to_string(),
            ));
        }

        parse_dump(&String::from_utf8_lossy(&output.stdout))?
            .ok_or_else(|| MusicError::NotFound(query.to_string()))
    }
}

#[async_trait]
impl SongResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> MusicResult<Song> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::NotFound(String::new()));
        }

        if let Some(track_id) = SpotifyClient::extract_track_id(query) {
            let track = self.spotify.get_track(&track_id).await?;
            let search = SpotifyClient::search_query(&track);
            info!("🎧 Link de Spotify traducido a búsqueda: {}", search);

            let song = self.extract(&format!("ytsearch1:{search}"), query).await?;
            return Ok(song.with_spotify(track).with_requested_by(requested_by));
        }

        let is_url = is_valid_url(query);
        if is_url {
            if let Some(cached) = self.cache.get(&query.to_string()) {
                debug!("📦 Canción en cache: {}", cached.title());
                return Ok(cached.with_requested_by(requested_by));
            }
        }

        let target = if is_url {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        };
        let song = self.extract(&target, query).await?;

        self.cache.insert(song.page_url().to_string(), song.clone());
        if is_url && song.page_url() != query {
            self.cache.insert(query.to_string(), song.clone());
        }

        Ok(song.with_requested_by(requested_by))
    }
}
