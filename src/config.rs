use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub idle_timeout: u64, // En segundos
    pub max_queue_display: usize,

    // Resolución de canciones
    pub cache_size: usize,
    pub cache_ttl: u64,       // En segundos
    pub resolve_timeout: u64, // En segundos

    // APIs (Opcionales)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Dashboard de solo lectura, deshabilitado si no hay dirección
    pub dashboard_addr: Option<SocketAddr>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: parse_or(
                var("DEFAULT_VOLUME"),
                defaults.default_volume,
                "DEFAULT_VOLUME",
            )?,
            idle_timeout: parse_or(var("IDLE_TIMEOUT"), defaults.idle_timeout, "IDLE_TIMEOUT")?,
            max_queue_display: parse_or(
                var("MAX_QUEUE_DISPLAY"),
                defaults.max_queue_display,
                "MAX_QUEUE_DISPLAY",
            )?,

            // Resolución
            cache_size: parse_or(var("CACHE_SIZE"), defaults.cache_size, "CACHE_SIZE")?,
            cache_ttl: parse_or(var("CACHE_TTL"), defaults.cache_ttl, "CACHE_TTL")?,
            resolve_timeout: parse_or(
                var("RESOLVE_TIMEOUT"),
                defaults.resolve_timeout,
                "RESOLVE_TIMEOUT",
            )?,

            // APIs
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),

            dashboard_addr: var("DASHBOARD_ADDR")
                .map(|addr| addr.parse::<SocketAddr>().context("DASHBOARD_ADDR inválido"))
                .transpose()?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Idle timeout, cache size, cache TTL and resolve timeout must be > 0
    /// - The queue view must show at least one song
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.idle_timeout == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.cache_ttl == 0 {
            anyhow::bail!("Cache TTL must be greater than 0");
        }

        if self.resolve_timeout == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.max_queue_display == 0 {
            anyhow::bail!("Max queue display must be greater than 0");
        }

        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout)
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token and the Spotify secret.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {}s idle timeout, {} songs per queue page\n  \
            Cache: {} songs, {}s TTL, {}s resolve timeout\n  \
            Features: Spotify={}, Dashboard={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.idle_timeout,
            self.max_queue_display,
            self.cache_size,
            self.cache_ttl,
            self.resolve_timeout,
            self.spotify_enabled(),
            self.dashboard_addr
                .map_or("disabled".to_string(), |addr| addr.to_string()),
        )
    }
}

fn parse_or<T>(value: Option<String>, default: T, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} inválido: {raw}")),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 0.5,
            idle_timeout: 120,
            max_queue_display: 10,

            // Resolver defaults
            cache_size: 50,
            cache_ttl: 3600,
            resolve_timeout: 30,

            spotify_client_id: None,
            spotify_client_secret: None,
            dashboard_addr: None,
        }
    }
}
