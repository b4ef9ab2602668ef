use thiserror::Error;

/// Errores del dominio de música.
///
/// Todos son locales a un guild: se reportan al usuario que lanzó el comando
/// (o se registran en el log si vienen del transporte) y nunca afectan a las
/// sesiones de otros servidores.
#[derive(Debug, Clone, Error)]
pub enum MusicError {
    /// El usuario invocó un comando de voz sin estar en un canal.
    #[error("Debes estar en un canal de voz")]
    VoiceRequired,

    /// El usuario está en un canal distinto al de la sesión activa.
    #[error("Debes estar en el mismo canal de voz que el bot")]
    ChannelMismatch,

    /// La búsqueda no devolvió resultados.
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),

    /// Falló la resolución externa (yt-dlp, Spotify, ...).
    #[error("Error al resolver la canción: {0}")]
    Resolution(String),

    /// Falló el stream durante la reproducción.
    #[error("Error de transporte: {0}")]
    Transport(String),

    /// No se pudo entrar al canal de voz.
    #[error("No se pudo conectar al canal de voz: {0}")]
    Join(String),

    /// Discord rechazó un mensaje del bot.
    #[error("No se pudo enviar el mensaje: {0}")]
    Discord(String),

    #[error("El bot no está conectado a un canal de voz")]
    NotConnected,

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("No hay nada pausado")]
    NothingPaused,
}

pub type MusicResult<T> = Result<T, MusicError>;

impl MusicError {
    /// Indica si el error es culpa del usuario (se responde sin loguear como fallo).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MusicError::VoiceRequired
                | MusicError::ChannelMismatch
                | MusicError::NotFound(_)
                | MusicError::NothingPlaying
                | MusicError::NothingPaused
                | MusicError::NotConnected
        )
    }
}
