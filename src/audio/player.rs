use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    queue::{LoopMode, QueueSnapshot, QueueState},
    transport::{PlaybackNotifier, SessionEvent},
    voice::VoiceManager,
};
use crate::{
    error::{MusicError, MusicResult},
    sources::{Song, SongResolver},
};

/// Qué repetir en `/loop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopTarget {
    Queue,
    Song,
}

/// Resultado de `/play`
#[derive(Debug, Clone)]
pub enum PlayOutcome {
    Started(Song),
    Queued { song: Song, position: usize },
}

/// Estado de reproducción de la canción actual
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub song: Song,
    pub paused: bool,
    pub loop_mode: LoopMode,
}

/// Foto de un guild para el dashboard
#[derive(Debug, Clone)]
pub struct PlayerStatus {
    pub guild_id: GuildId,
    pub connected: bool,
    pub playing: bool,
    pub paused: bool,
    pub queue: QueueSnapshot,
}

/// Publica la canción que empieza a sonar sola (avance automático o loop)
#[async_trait]
pub trait NowPlayingAnnouncer: Send + Sync {
    async fn announce(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        song: &Song,
    ) -> MusicResult<()>;
}

/// Estado protegido por el mutex de la sesión
#[derive(Debug, Default)]
struct SessionState {
    queue: QueueState,
    /// Ticket de la reproducción vigente; los avisos con otro ticket son viejos
    playback: u64,
    /// Canal de texto del último comando, donde se anuncia cada canción
    text_channel: Option<ChannelId>,
}

/// Sesión de un guild: su cola y el canal de eventos que drena su worker
pub struct GuildSession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    events: flume::Sender<SessionEvent>,
    shutdown: CancellationToken,
}

impl GuildSession {
    fn spawn(
        guild_id: GuildId,
        voice: Arc<VoiceManager>,
        announcer: Option<Arc<dyn NowPlayingAnnouncer>>,
    ) -> Arc<Self> {
        let (events, receiver) = flume::unbounded();
        let session = Arc::new(Self {
            guild_id,
            state: Mutex::new(SessionState::default()),
            events,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(run_worker(
            Arc::downgrade(&session),
            receiver,
            voice,
            announcer,
            session.shutdown.clone(),
        ));
        debug!("🆕 Sesión creada para guild {}", guild_id);

        session
    }

    /// Arranca `next`; si falla prueba con las siguientes de la cola. Cuando
    /// no queda nada que sonar arma el timer de inactividad.
    async fn start_next(
        &self,
        voice: &VoiceManager,
        state: &mut SessionState,
        next: Option<Song>,
    ) -> Option<Song> {
        // Con loop de cola la rotación se repone sola: como mucho una vuelta
        let mut attempts = state.queue.rotation_len();
        let mut next = next;

        while let Some(song) = next {
            state.playback += 1;
            let notifier =
                PlaybackNotifier::new(self.guild_id, state.playback, self.events.clone());

            match voice
                .start_playback(self.guild_id, song.clone(), notifier)
                .await
            {
                Ok(()) => return Some(song),
                Err(MusicError::NotConnected) => {
                    warn!(
                        "🔌 Guild {} sin conexión de voz, no se reproduce {}",
                        self.guild_id,
                        song.title()
                    );
                    return None;
                }
                Err(e) => {
                    error!(
                        "❌ No se pudo reproducir {} en guild {}: {}",
                        song.title(),
                        self.guild_id,
                        e
                    );
                    attempts = attempts.saturating_sub(1);
                    if attempts == 0 {
                        warn!(
                            "⚠️ Ninguna canción de la cola de guild {} se pudo reproducir",
                            self.guild_id
                        );
                        break;
                    }
                    next = state.queue.get_next_song();
                }
            }
        }

        state.playback += 1;
        voice.start_inactivity_timer(self.guild_id, self.events.clone());
        None
    }

    /// Une al bot al canal si hace falta. Una conexión nueva empieza sin nada
    /// sonando, así que arranca con el timer de inactividad armado.
    async fn ensure_voice(
        &self,
        voice: &VoiceManager,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<()> {
        let joining = !voice.is_connected(self.guild_id);
        voice.ensure_voice(self.guild_id, user_channel).await?;

        if joining {
            voice.start_inactivity_timer(self.guild_id, self.events.clone());
        }
        Ok(())
    }
}

async fn run_worker(
    session: Weak<GuildSession>,
    events: flume::Receiver<SessionEvent>,
    voice: Arc<VoiceManager>,
    announcer: Option<Arc<dyn NowPlayingAnnouncer>>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv_async() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        let Some(session) = session.upgrade() else {
            break;
        };

        match event {
            SessionEvent::PlaybackEnded { playback, outcome } => {
                let (started, channel) = {
                    let mut state = session.state.lock().await;
                    if playback != state.playback {
                        debug!("Aviso de fin viejo en guild {}, ignorado", session.guild_id);
                        continue;
                    }

                    if let Err(e) = outcome {
                        error!("❌ Error de streaming en guild {}: {}", session.guild_id, e);
                    }

                    let next = state.queue.song_finished();
                    let started = session.start_next(&voice, &mut state, next).await;
                    (started, state.text_channel)
                };

                // Fuera del mutex: un mensaje a Discord no bloquea los comandos
                if let (Some(song), Some(channel), Some(announcer)) =
                    (started, channel, &announcer)
                {
                    if let Err(e) = announcer.announce(session.guild_id, channel, &song).await {
                        warn!(
                            "⚠️ No se pudo anunciar {} en guild {}: {}",
                            song.title(),
                            session.guild_id,
                            e
                        );
                    }
                }
            }
            SessionEvent::IdleTimeout { timer } => {
                let mut state = session.state.lock().await;
                if voice.on_idle_timeout(session.guild_id, timer).await {
                    state.playback += 1;
                }
            }
        }
    }

    debug!("Worker de sesión terminado");
}

/// Coordina colas, voz y resolución de canciones para todos los guilds.
///
/// Cada punto de entrada toma el mutex de la sesión del guild durante toda la
/// operación, así que las operaciones de un mismo guild nunca se intercalan.
/// El worker de la sesión (fin de pista, timer de inactividad) toma el mismo
/// mutex.
pub struct MusicCoordinator {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    voice: Arc<VoiceManager>,
    resolver: Arc<dyn SongResolver>,
    announcer: Option<Arc<dyn NowPlayingAnnouncer>>,
}

impl MusicCoordinator {
    pub fn new(voice: Arc<VoiceManager>, resolver: Arc<dyn SongResolver>) -> Self {
        Self {
            sessions: DashMap::new(),
            voice,
            resolver,
            announcer: None,
        }
    }

    pub fn with_announcer(mut self, announcer: Arc<dyn NowPlayingAnnouncer>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    pub fn voice(&self) -> &Arc<VoiceManager> {
        &self.voice
    }

    fn session(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                GuildSession::spawn(guild_id, self.voice.clone(), self.announcer.clone())
            })
            .clone()
    }

    fn existing_session(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.value().clone())
    }

    /// Recuerda el canal de texto donde se anuncian las canciones del guild
    pub async fn set_text_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        let session = self.session(guild_id);
        session.state.lock().await.text_channel = Some(channel_id);
    }

    /// Resuelve `query` y la encola; si no suena nada, empieza a reproducir
    pub async fn play(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
        requested_by: UserId,
        query: &str,
    ) -> MusicResult<PlayOutcome> {
        let session = self.session(guild_id);

        {
            let _state = session.state.lock().await;
            session.ensure_voice(&self.voice, user_channel).await?;
        }

        // La resolución puede tardar segundos: fuera del mutex
        let song = self.resolver.resolve(query, requested_by).await?;

        let mut state = session.state.lock().await;
        // Pudo haberse desconectado mientras resolvíamos
        session.ensure_voice(&self.voice, user_channel).await?;

        state.queue.add_to_queue(song.clone());

        if self.voice.is_playing(guild_id).await || self.voice.is_paused(guild_id).await {
            return Ok(PlayOutcome::Queued {
                position: state.queue.len(),
                song,
            });
        }

        let next = state.queue.get_next_song();
        match session.start_next(&self.voice, &mut state, next).await {
            Some(started) => Ok(PlayOutcome::Started(started)),
            None => Err(MusicError::Transport(format!(
                "no se pudo reproducir {}",
                song.title()
            ))),
        }
    }

    /// Salta la canción actual. Devuelve la que empieza a sonar, si hay.
    pub async fn skip(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<Option<Song>> {
        let session = self.session(guild_id);
        let mut state = session.state.lock().await;
        session.ensure_voice(&self.voice, user_channel).await?;

        if !self.voice.is_playing(guild_id).await && !self.voice.is_paused(guild_id).await {
            return Err(MusicError::NothingPlaying);
        }

        self.voice.stop_track(guild_id).await;
        let next = state.queue.skip_current();
        info!("⏭️ Canción saltada en guild {}", guild_id);

        Ok(session.start_next(&self.voice, &mut state, next).await)
    }

    pub async fn pause(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<()> {
        let session = self.session(guild_id);
        let _state = session.state.lock().await;
        session.ensure_voice(&self.voice, user_channel).await?;
        self.voice.pause(guild_id).await
    }

    pub async fn resume(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<()> {
        let session = self.session(guild_id);
        let _state = session.state.lock().await;
        session.ensure_voice(&self.voice, user_channel).await?;
        self.voice.resume(guild_id).await
    }

    /// Vacía la cola y sale del canal de voz
    pub async fn stop(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<()> {
        let session = self.session(guild_id);
        let mut state = session.state.lock().await;
        session.ensure_voice(&self.voice, user_channel).await?;

        state.queue.clear_queue();
        state.playback += 1;
        self.voice.disconnect(guild_id).await;

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok(())
    }

    pub async fn queue(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<QueueSnapshot> {
        let session = self.session(guild_id);
        let state = session.state.lock().await;
        session.ensure_voice(&self.voice, user_channel).await?;
        Ok(state.queue.info())
    }

    /// Alterna el modo de repetición pedido y devuelve el modo resultante
    pub async fn toggle_loop(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
        target: LoopTarget,
    ) -> MusicResult<LoopMode> {
        let session = self.session(guild_id);
        let mut state = session.state.lock().await;
        session.ensure_voice(&self.voice, user_channel).await?;

        match target {
            LoopTarget::Queue => state.queue.toggle_loop_queue(),
            LoopTarget::Song => state.queue.toggle_loop_song(),
        };

        Ok(state.queue.loop_mode())
    }

    pub async fn now_playing(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<NowPlaying> {
        let session = self.session(guild_id);
        let state = session.state.lock().await;
        session.ensure_voice(&self.voice, user_channel).await?;

        let song = state.queue.current().cloned().ok_or(MusicError::NothingPlaying)?;
        Ok(NowPlaying {
            song,
            paused: self.voice.is_paused(guild_id).await,
            loop_mode: state.queue.loop_mode(),
        })
    }

    /// Reenvía un cambio de estado de voz de un miembro al detector de "bot solo"
    pub async fn on_member_voice_state_changed(
        &self,
        guild_id: GuildId,
        member_is_bot: bool,
        members_in: impl FnOnce(ChannelId) -> usize,
    ) {
        let Some(session) = self.existing_session(guild_id) else {
            self.voice
                .on_member_voice_state_changed(guild_id, member_is_bot, members_in)
                .await;
            return;
        };

        let mut state = session.state.lock().await;
        if self
            .voice
            .on_member_voice_state_changed(guild_id, member_is_bot, members_in)
            .await
        {
            state.playback += 1;
        }
    }

    /// El bot fue sacado del canal desde fuera (kick, move a nada, etc.)
    pub async fn on_bot_disconnected(&self, guild_id: GuildId) {
        if !self.voice.is_connected(guild_id) {
            return;
        }

        warn!("🔌 Bot desconectado externamente de guild {}", guild_id);
        if let Some(session) = self.existing_session(guild_id) {
            let mut state = session.state.lock().await;
            state.playback += 1;
            self.voice.disconnect(guild_id).await;
        } else {
            self.voice.disconnect(guild_id).await;
        }
    }

    /// El bot fue movido a otro canal de voz desde fuera
    pub async fn on_bot_moved(&self, guild_id: GuildId, channel_id: ChannelId) {
        match self.existing_session(guild_id) {
            Some(session) => {
                let _state = session.state.lock().await;
                self.voice.on_bot_moved(guild_id, channel_id);
            }
            None => {
                self.voice.on_bot_moved(guild_id, channel_id);
            }
        }
    }

    /// Foto de solo lectura de todos los guilds con sesión
    pub async fn snapshots(&self) -> Vec<PlayerStatus> {
        let sessions: Vec<Arc<GuildSession>> =
            self.sessions.iter().map(|s| s.value().clone()).collect();

        let mut statuses = Vec::with_capacity(sessions.len());
        for session in sessions {
            let queue = session.state.lock().await.queue.info();
            let guild_id = session.guild_id;
            statuses.push(PlayerStatus {
                guild_id,
                connected: self.voice.is_connected(guild_id),
                playing: self.voice.is_playing(guild_id).await,
                paused: self.voice.is_paused(guild_id).await,
                queue,
            });
        }

        statuses
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> Option<PlayerStatus> {
        let session = self.existing_session(guild_id)?;
        let queue = session.state.lock().await.queue.info();
        Some(PlayerStatus {
            guild_id,
            connected: self.voice.is_connected(guild_id),
            playing: self.voice.is_playing(guild_id).await,
            paused: self.voice.is_paused(guild_id).await,
            queue,
        })
    }

    /// Desmonta la sesión de un guild (el bot salió del servidor)
    pub async fn remove_guild(&self, guild_id: GuildId) {
        if let Some((_, session)) = self.sessions.remove(&guild_id) {
            session.shutdown.cancel();
            session.state.lock().await.queue.clear_queue();
        }
        self.voice.disconnect(guild_id).await;
        info!("🗑️ Sesión eliminada para guild {}", guild_id);
    }

    /// Cierra todas las sesiones y conexiones de voz
    pub async fn shutdown(&self) {
        info!("⚠️ Cerrando {} sesiones...", self.sessions.len());
        self.sessions.retain(|_, session| {
            session.shutdown.cancel();
            false
        });
        self.voice.cleanup().await;
    }
}
