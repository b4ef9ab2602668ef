use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::SpotifyMetadata;
use crate::error::{MusicError, MusicResult};

const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
const TRACKS_ENDPOINT: &str = "https://api.spotify.com/v1/tracks";

static TRACK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:spotify:track:|https://open\.spotify\.com/(?:intl-[a-z]{2}/)?track/)([a-zA-Z0-9]+)",
    )
    .expect("regex de Spotify válida")
});

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    id: String,
    name: String,
    artists: Vec<ArtistResponse>,
    album: Option<AlbumResponse>,
}

#[derive(Debug, Deserialize)]
struct ArtistResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumResponse {
    name: String,
    #[serde(default)]
    images: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    url: String,
}

impl From<TrackResponse> for SpotifyMetadata {
    fn from(track: TrackResponse) -> Self {
        let (album, album_art) = match track.album {
            Some(album) => {
                let art = album.images.into_iter().next().map(|image| image.url);
                (Some(album.name), art)
            }
            None => (None, None),
        };

        Self {
            track_id: track.id,
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            album,
            album_art,
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente mínimo de la Web API de Spotify (flujo client credentials).
///
/// Solo traduce links de tracks a metadatos; el audio siempre sale de la
/// búsqueda equivalente en YouTube.
pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(
        http: reqwest::Client,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        let credentials = client_id.zip(client_secret);
        if credentials.is_none() {
            info!("🎧 Spotify sin credenciales, los links de Spotify no estarán disponibles");
        }

        Self {
            http,
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Extrae el ID de track de un link `open.spotify.com` o URI `spotify:track:`
    pub fn extract_track_id(query: &str) -> Option<String> {
        TRACK_PATTERN
            .captures(query)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Consulta de búsqueda equivalente: "nombre artista1 artista2"
    pub fn search_query(track: &SpotifyMetadata) -> String {
        std::iter::once(track.name.as_str())
            .chain(track.artists.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Obtiene los metadatos de un track, renovando el token si expiró
    pub async fn get_track(&self, track_id: &str) -> MusicResult<SpotifyMetadata> {
        let token = self.access_token(false).await?;
        let response = self.fetch_track(track_id, &token).await?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            warn!("🔑 Token de Spotify rechazado, renovando...");
            let token = self.access_token(true).await?;
            self.fetch_track(track_id, &token).await?
        } else {
            response
        };

        match response.status() {
            StatusCode::NOT_FOUND => Err(MusicError::NotFound(format!("spotify:track:{track_id}"))),
            status if !status.is_success() => Err(MusicError::Resolution(format!(
                "Spotify respondió {status}"
            ))),
            _ => {
                let track: TrackResponse = response.json().await.map_err(|e| {
                    MusicError::Resolution(format!("Respuesta de Spotify inválida: {e}"))
                })?;
                debug!("🎧 Track de Spotify: {}", track.name);
                Ok(track.into())
            }
        }
    }

    async fn fetch_track(&self, track_id: &str, token: &str) -> MusicResult<reqwest::Response> {
        self.http
            .get(format!("{TRACKS_ENDPOINT}/{track_id}"))
            .query(&[("market", "US")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MusicError::Resolution(format!("Spotify no disponible: {e}")))
    }

    async fn access_token(&self, force_refresh: bool) -> MusicResult<String> {
        let (client_id, client_secret) = self
            .credentials
            .as_ref()
            .ok_or_else(|| MusicError::Resolution("Spotify no está configurado".to_string()))?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if !force_refresh && token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| MusicError::Resolution(format!("Spotify no disponible: {e}")))?;

        if !response.status().is_success() {
            return Err(MusicError::Resolution(
                "No se pudo autenticar con Spotify".to_string(),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MusicError::Resolution(format!("Token de Spotify inválido: {e}")))?;

        // Margen para no usar un token a punto de expirar
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(30));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        info!("🔑 Token de Spotify renovado");
        Ok(token.access_token)
    }
}
