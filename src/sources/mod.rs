pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::Duration;

use crate::error::MusicResult;

pub use spotify::SpotifyClient;
pub use ytdlp::YtDlpResolver;

/// Trait común para resolver una consulta de usuario a una canción reproducible
#[async_trait]
pub trait SongResolver: Send + Sync {
    /// Resuelve una URL o texto de búsqueda. Falla con `NotFound` o `Resolution`.
    async fn resolve(&self, query: &str, requested_by: UserId) -> MusicResult<Song>;
}

/// Una canción lista para encolar.
///
/// `title` y `locator` son obligatorios; el resto de datos va en [`SongMetadata`].
/// La igualdad compara solo identidad (título + locator), no quién la pidió.
#[derive(Debug, Clone)]
pub struct Song {
    title: String,
    locator: String,
    stream_url: Option<String>,
    metadata: SongMetadata,
    requested_by: Option<UserId>,
}

/// Metadatos opcionales de una canción
#[derive(Debug, Clone, Default)]
pub struct SongMetadata {
    pub artist: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    pub source: Option<String>,
    pub spotify: Option<SpotifyMetadata>,
}

/// Datos del track de Spotify cuando la canción vino de un link de Spotify
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyMetadata {
    pub track_id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_art: Option<String>,
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator && self.title == other.title
    }
}

impl Eq for Song {}

impl Song {
    pub fn new(title: String, locator: String) -> Self {
        Self {
            title,
            locator,
            stream_url: None,
            metadata: SongMetadata::default(),
            requested_by: None,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn locator(&self) -> &str {
        &self.locator
    }
    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }
    pub fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }
    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    /// Artista a mostrar: Spotify tiene prioridad sobre el uploader
    pub fn display_artist(&self) -> Option<String> {
        match &self.metadata.spotify {
            Some(spotify) if !spotify.artists.is_empty() => Some(spotify.artists.join(", ")),
            _ => self.metadata.artist.clone(),
        }
    }

    /// Miniatura a mostrar: portada de Spotify o thumbnail del video
    pub fn display_thumbnail(&self) -> Option<&str> {
        self.metadata
            .spotify
            .as_ref()
            .and_then(|s| s.album_art.as_deref())
            .or(self.metadata.thumbnail.as_deref())
    }

    /// URL pública para enlazar en los mensajes
    pub fn page_url(&self) -> &str {
        self.metadata.webpage_url.as_deref().unwrap_or(&self.locator)
    }

    // Setters
    pub fn with_artist(mut self, artist: String) -> Self {
        self.metadata.artist = Some(artist);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.metadata.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.metadata.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_webpage_url(mut self, url: String) -> Self {
        self.metadata.webpage_url = Some(url);
        self
    }

    pub fn with_source(mut self, source: String) -> Self {
        self.metadata.source = Some(source);
        self
    }

    pub fn with_stream_url(mut self, stream_url: String) -> Self {
        self.stream_url = Some(stream_url);
        self
    }

    pub fn with_spotify(mut self, spotify: SpotifyMetadata) -> Self {
        self.metadata.spotify = Some(spotify);
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }
}

/// Verifica si el texto es una URL absoluta (con esquema y host)
pub fn is_valid_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|url| url.has_host())
        .unwrap_or(false)
}
