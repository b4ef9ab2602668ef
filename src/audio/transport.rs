use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    error::{MusicError, MusicResult},
    sources::Song,
};

/// Eventos que se serializan en la cola de tareas de cada guild
#[derive(Debug)]
pub enum SessionEvent {
    /// La pista `playback` terminó sola (o falló el stream)
    PlaybackEnded {
        playback: u64,
        outcome: MusicResult<()>,
    },
    /// Venció el timer de inactividad `timer`
    IdleTimeout { timer: u64 },
}

/// Aviso de fin de reproducción, de un solo uso.
///
/// El transporte no ejecuta lógica del driver: solo publica el evento en el
/// canal del guild, donde lo procesa su worker.
#[derive(Debug)]
pub struct PlaybackNotifier {
    guild_id: GuildId,
    playback: u64,
    sender: flume::Sender<SessionEvent>,
}

impl PlaybackNotifier {
    pub fn new(guild_id: GuildId, playback: u64, sender: flume::Sender<SessionEvent>) -> Self {
        Self {
            guild_id,
            playback,
            sender,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn finished(self, outcome: MusicResult<()>) {
        let event = SessionEvent::PlaybackEnded {
            playback: self.playback,
            outcome,
        };
        if self.sender.send(event).is_err() {
            debug!("Sesión de guild {} ya no existe, fin de pista ignorado", self.guild_id);
        }
    }
}

/// Conexión de voz viva de un guild
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Empieza a reproducir `song`. `notifier` se consume como mucho una vez,
    /// solo si la pista termina sola o falla; nunca tras `stop`.
    async fn start(&self, song: Song, notifier: PlaybackNotifier) -> MusicResult<()>;
    async fn stop(&self);
    async fn pause(&self) -> MusicResult<()>;
    async fn resume(&self) -> MusicResult<()>;
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
    async fn is_connected(&self) -> bool;
    async fn disconnect(&self) -> MusicResult<()>;
}

/// Fábrica de conexiones de voz
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn Transport>>;
}

/// Conector real sobre songbird
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            manager,
            http,
            volume,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn Transport>> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            MusicError::Join(e.to_string())
        })?;

        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdTransport {
            guild_id,
            call,
            manager: self.manager.clone(),
            http: self.http.clone(),
            volume: self.volume,
            track: SyncMutex::new(None),
            active: Arc::new(AtomicU64::new(0)),
            generation: AtomicU64::new(0),
        }))
    }
}

/// Transporte sobre una `Call` de songbird.
///
/// Cada `start` abre una generación nueva; los eventos de fin solo se
/// reportan si su generación sigue activa, así un `stop` explícito (que
/// songbird también reporta como `End`) nunca avanza la cola.
pub struct SongbirdTransport {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
    track: SyncMutex<Option<TrackHandle>>,
    active: Arc<AtomicU64>,
    generation: AtomicU64,
}

impl SongbirdTransport {
    fn input_for(&self, song: &Song) -> Input {
        match (song.metadata().source.as_deref(), song.stream_url()) {
            // Archivos directos: no hace falta pasar por yt-dlp otra vez
            (Some("generic"), Some(stream_url)) => {
                HttpRequest::new(self.http.clone(), stream_url.to_string()).into()
            }
            _ => YoutubeDl::new(self.http.clone(), song.locator().to_string()).into(),
        }
    }

    fn current_track(&self) -> Option<TrackHandle> {
        self.track.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let track = self.current_track()?;
        track.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn start(&self, song: Song, notifier: PlaybackNotifier) -> MusicResult<()> {
        self.stop().await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(generation, Ordering::SeqCst);

        let input = self.input_for(&song);
        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        if let Err(e) = handle.set_volume(self.volume) {
            warn!("⚠️ No se pudo ajustar el volumen en guild {}: {:?}", self.guild_id, e);
        }

        let notifier = Arc::new(SyncMutex::new(Some(notifier)));
        for event in [TrackEvent::End, TrackEvent::Error] {
            let registered = handle.add_event(
                Event::Track(event),
                TrackEndNotifier {
                    generation,
                    active: self.active.clone(),
                    notifier: notifier.clone(),
                },
            );

            if let Err(e) = registered {
                self.active.store(0, Ordering::SeqCst);
                if let Err(e) = handle.stop() {
                    warn!("⚠️ Error al detener pista en guild {}: {:?}", self.guild_id, e);
                }
                return Err(MusicError::Transport(format!(
                    "Error al agregar event handler: {e}"
                )));
            }
        }

        *self.track.lock() = Some(handle);
        info!("🎵 Reproduciendo: {} en guild {}", song.title(), self.guild_id);
        Ok(())
    }

    async fn stop(&self) {
        self.active.store(0, Ordering::SeqCst);
        if let Some(track) = self.track.lock().take() {
            if let Err(e) = track.stop() {
                warn!("⚠️ Error al detener pista en guild {}: {:?}", self.guild_id, e);
            }
        }
    }

    async fn pause(&self) -> MusicResult<()> {
        let track = self.current_track().ok_or(MusicError::NothingPlaying)?;
        track
            .pause()
            .map_err(|e| MusicError::Transport(e.to_string()))?;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(())
    }

    async fn resume(&self) -> MusicResult<()> {
        let track = self.current_track().ok_or(MusicError::NothingPaused)?;
        track.play().map_err(|e| MusicError::Transport(e.to_string()))?;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn disconnect(&self) -> MusicResult<()> {
        self.stop().await;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| MusicError::Transport(e.to_string()))
    }
}

/// Handler para cuando termina (o falla) una pista
struct TrackEndNotifier {
    generation: u64,
    active: Arc<AtomicU64>,
    notifier: Arc<SyncMutex<Option<PlaybackNotifier>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        // Solo la generación activa reporta, y solo una vez (End y Error comparten aviso)
        if self
            .active
            .compare_exchange(self.generation, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let notifier = self.notifier.lock().take()?;

        let failure = match ctx {
            EventContext::Track(tracks) => {
                tracks.iter().find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(format!("{e:?}")),
                    _ => None,
                })
            }
            _ => None,
        };

        match failure {
            Some(reason) => {
                warn!("❌ Error en pista para guild {}: {}", notifier.guild_id(), reason);
                notifier.finished(Err(MusicError::Transport(reason)));
            }
            None => {
                debug!("Pista terminada en guild {}", notifier.guild_id());
                notifier.finished(Ok(()));
            }
        }

        None
    }
}
