use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{PlaybackNotifier, SessionEvent, Transport, VoiceConnector};
use crate::{
    error::{MusicError, MusicResult},
    sources::Song,
};

#[derive(Clone)]
struct VoiceConnection {
    channel_id: ChannelId,
    transport: Arc<dyn Transport>,
}

struct IdleTimer {
    id: u64,
    token: CancellationToken,
}

/// Conexiones de voz por guild y sus timers de inactividad.
///
/// Por guild: `DESCONECTADO -> CONECTADO -> DESCONECTADO`, con un timer de
/// inactividad opcional mientras está conectado.
pub struct VoiceManager {
    connector: Arc<dyn VoiceConnector>,
    connections: DashMap<GuildId, VoiceConnection>,
    idle_timers: DashMap<GuildId, IdleTimer>,
    timer_ids: AtomicU64,
    idle_timeout: Duration,
}

impl VoiceManager {
    pub fn new(connector: Arc<dyn VoiceConnector>, idle_timeout: Duration) -> Self {
        Self {
            connector,
            connections: DashMap::new(),
            idle_timers: DashMap::new(),
            timer_ids: AtomicU64::new(0),
            idle_timeout,
        }
    }

    /// Garantiza que el bot esté en el canal del usuario.
    ///
    /// Sin conexión previa se une al canal del usuario; con conexión previa el
    /// usuario tiene que estar en ese mismo canal.
    pub async fn ensure_voice(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> MusicResult<Arc<dyn Transport>> {
        let existing = self
            .connections
            .get(&guild_id)
            .map(|conn| conn.value().clone());

        if let Some(conn) = existing {
            if user_channel != Some(conn.channel_id) {
                return Err(MusicError::ChannelMismatch);
            }
            return Ok(conn.transport);
        }

        let channel_id = user_channel.ok_or(MusicError::VoiceRequired)?;
        let transport = self.connector.connect(guild_id, channel_id).await?;

        self.connections.insert(
            guild_id,
            VoiceConnection {
                channel_id,
                transport: transport.clone(),
            },
        );

        Ok(transport)
    }

    pub fn transport(&self, guild_id: GuildId) -> Option<Arc<dyn Transport>> {
        self.connections
            .get(&guild_id)
            .map(|conn| conn.transport.clone())
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.connections.get(&guild_id).map(|conn| conn.channel_id)
    }

    /// Empieza a reproducir; el timer de inactividad se cancela antes del stream
    pub async fn start_playback(
        &self,
        guild_id: GuildId,
        song: Song,
        notifier: PlaybackNotifier,
    ) -> MusicResult<()> {
        self.cancel_inactivity_timer(guild_id);
        let transport = self.transport(guild_id).ok_or(MusicError::NotConnected)?;
        transport.start(song, notifier).await
    }

    /// Corta la pista actual sin avanzar la cola
    pub async fn stop_track(&self, guild_id: GuildId) {
        if let Some(transport) = self.transport(guild_id) {
            transport.stop().await;
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        let transport = self.transport(guild_id).ok_or(MusicError::NotConnected)?;
        if !transport.is_playing().await {
            return Err(MusicError::NothingPlaying);
        }
        transport.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        let transport = self.transport(guild_id).ok_or(MusicError::NotConnected)?;
        if !transport.is_paused().await {
            return Err(MusicError::NothingPaused);
        }
        transport.resume().await
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connections.contains_key(&guild_id)
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        match self.transport(guild_id) {
            Some(transport) => transport.is_playing().await,
            None => false,
        }
    }

    pub async fn is_paused(&self, guild_id: GuildId) -> bool {
        match self.transport(guild_id) {
            Some(transport) => transport.is_paused().await,
            None => false,
        }
    }

    /// Sale del canal de voz. Llamarlo sin conexión no hace nada.
    pub async fn disconnect(&self, guild_id: GuildId) {
        self.cancel_inactivity_timer(guild_id);

        if let Some((_, conn)) = self.connections.remove(&guild_id) {
            if let Err(e) = conn.transport.disconnect().await {
                warn!("⚠️ Error al desconectar de guild {}: {}", guild_id, e);
            }
            info!("👋 Desconectado del canal {} en guild {}", conn.channel_id, guild_id);
        }
    }

    /// Arma el timer de inactividad, reemplazando el anterior si existía.
    ///
    /// Al vencer solo publica `SessionEvent::IdleTimeout` en `expired`; quien
    /// drena ese canal decide con [`VoiceManager::on_idle_timeout`]. Devuelve
    /// el id del timer.
    pub fn start_inactivity_timer(
        &self,
        guild_id: GuildId,
        expired: flume::Sender<SessionEvent>,
    ) -> u64 {
        let id = self.timer_ids.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        if let Some(previous) = self.idle_timers.insert(
            guild_id,
            IdleTimer {
                id,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        let timeout = self.idle_timeout;
        debug!("⏳ Timer de inactividad armado para guild {} ({:?})", guild_id, timeout);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Timer de inactividad cancelado para guild {}", guild_id);
                }
                _ = tokio::time::sleep(timeout) => {
                    if expired.send(SessionEvent::IdleTimeout { timer: id }).is_err() {
                        debug!("Sesión de guild {} ya no existe, timer ignorado", guild_id);
                    }
                }
            }
        });

        id
    }

    /// Cancela el timer pendiente. Devuelve si había uno.
    pub fn cancel_inactivity_timer(&self, guild_id: GuildId) -> bool {
        match self.idle_timers.remove(&guild_id) {
            Some((_, timer)) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn has_idle_timer(&self, guild_id: GuildId) -> bool {
        self.idle_timers.contains_key(&guild_id)
    }

    /// Procesa el vencimiento del timer `timer`. Devuelve si se desconectó.
    ///
    /// Un timer reemplazado o cancelado (por ejemplo, porque empezó otra
    /// canción después de que venciera) ya no es el vigente y no hace nada.
    pub async fn on_idle_timeout(&self, guild_id: GuildId, timer: u64) -> bool {
        if self
            .idle_timers
            .remove_if(&guild_id, |_, armed| armed.id == timer)
            .is_none()
        {
            debug!("Timer {} de guild {} ya no está vigente", timer, guild_id);
            return false;
        }

        let Some(transport) = self.transport(guild_id) else {
            return false;
        };

        if transport.is_playing().await {
            debug!("Guild {} volvió a reproducir, timer ignorado", guild_id);
            return false;
        }

        info!("⏰ Inactividad en guild {}, desconectando", guild_id);
        self.disconnect(guild_id).await;
        true
    }

    /// El bot fue movido a otro canal desde fuera. Devuelve si cambió el canal.
    pub fn on_bot_moved(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(mut conn) = self.connections.get_mut(&guild_id) else {
            return false;
        };

        if conn.channel_id == channel_id {
            return false;
        }

        info!(
            "🔀 Bot movido del canal {} al {} en guild {}",
            conn.channel_id, channel_id, guild_id
        );
        conn.channel_id = channel_id;
        true
    }

    /// Reacciona a un cambio de estado de voz de otro miembro.
    ///
    /// `members_in` cuenta los miembros del canal (incluido el bot). Si el bot
    /// quedó solo se desconecta de inmediato. Devuelve si se desconectó.
    pub async fn on_member_voice_state_changed(
        &self,
        guild_id: GuildId,
        member_is_bot: bool,
        members_in: impl FnOnce(ChannelId) -> usize,
    ) -> bool {
        if member_is_bot {
            return false;
        }

        let Some(channel_id) = self.channel(guild_id) else {
            return false;
        };

        if members_in(channel_id) != 1 {
            return false;
        }

        info!("👤 Bot solo en el canal {} de guild {}, desconectando", channel_id, guild_id);
        self.disconnect(guild_id).await;
        true
    }

    /// Cancela todos los timers y cierra todas las conexiones
    pub async fn cleanup(&self) {
        self.idle_timers.retain(|_, timer| {
            timer.token.cancel();
            false
        });

        let guilds = self.connected_guilds();
        let closing = guilds.into_iter().filter_map(|guild_id| {
            let (_, conn) = self.connections.remove(&guild_id)?;
            Some(async move {
                if conn.transport.is_connected().await {
                    if let Err(e) = conn.transport.disconnect().await {
                        warn!("⚠️ Error al desconectar de guild {}: {}", guild_id, e);
                    }
                }
            })
        });

        let closed = join_all(closing).await.len();
        info!("🧹 Limpieza de voz completada ({} conexiones cerradas)", closed);
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_guilds(&self) -> Vec<GuildId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transport::{MockTransport, MockVoiceConnector};
    use std::sync::atomic::AtomicUsize;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(10);
    const TIMEOUT: Duration = Duration::from_secs(120);

    fn mock_transport(disconnects: Arc<AtomicUsize>, playing: bool) -> Arc<dyn Transport> {
        let mut mock = MockTransport::new();
        mock.expect_is_playing().returning(move || playing);
        mock.expect_is_connected().returning(|| true);
        mock.expect_start().returning(|_, _| Ok(()));
        mock.expect_stop().returning(|| ());
        mock.expect_disconnect().returning(move || {
            disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Arc::new(mock)
    }

    fn manager_with(transport: Arc<dyn Transport>) -> Arc<VoiceManager> {
        let mut connector = MockVoiceConnector::new();
        connector
            .expect_connect()
            .returning(move |_, _| Ok(transport.clone()));
        Arc::new(VoiceManager::new(Arc::new(connector), TIMEOUT))
    }

    fn notifier() -> PlaybackNotifier {
        let (tx, _rx) = flume::unbounded();
        PlaybackNotifier::new(GUILD, 1, tx)
    }

    fn song() -> Song {
        Song::new("a".into(), "https://youtu.be/a".into())
    }

    /// Procesa los timers vencidos como lo hace el worker de la sesión
    async fn drain_expired(
        manager: &VoiceManager,
        expired: &flume::Receiver<SessionEvent>,
    ) -> usize {
        let mut disconnected = 0;
        while let Ok(event) = expired.try_recv() {
            if let SessionEvent::IdleTimeout { timer } = event {
                if manager.on_idle_timeout(GUILD, timer).await {
                    disconnected += 1;
                }
            }
        }
        disconnected
    }

    #[tokio::test]
    async fn ensure_voice_requires_user_in_channel() {
        let mut connector = MockVoiceConnector::new();
        connector.expect_connect().never();
        let manager = VoiceManager::new(Arc::new(connector), TIMEOUT);

        let err = manager.ensure_voice(GUILD, None).await.err();
        assert!(matches!(err, Some(MusicError::VoiceRequired)));
        assert!(!manager.is_connected(GUILD));
    }

    #[tokio::test]
    async fn ensure_voice_connects_once_and_checks_channel() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let mut connector = MockVoiceConnector::new();
        let transport = mock_transport(disconnects, false);
        connector
            .expect_connect()
            .times(1)
            .returning(move |_, _| Ok(transport.clone()));
        let manager = VoiceManager::new(Arc::new(connector), TIMEOUT);

        assert!(manager.ensure_voice(GUILD, Some(CHANNEL)).await.is_ok());
        assert!(manager.ensure_voice(GUILD, Some(CHANNEL)).await.is_ok());
        assert_eq!(manager.channel(GUILD), Some(CHANNEL));

        let other = manager.ensure_voice(GUILD, Some(ChannelId::new(11))).await.err();
        assert!(matches!(other, Some(MusicError::ChannelMismatch)));

        let absent = manager.ensure_voice(GUILD, None).await.err();
        assert!(matches!(absent, Some(MusicError::ChannelMismatch)));
    }

    #[tokio::test]
    async fn failed_join_leaves_guild_disconnected() {
        let mut connector = MockVoiceConnector::new();
        connector
            .expect_connect()
            .returning(|_, _| Err(MusicError::Join("timeout".into())));
        let manager = VoiceManager::new(Arc::new(connector), TIMEOUT);

        let err = manager.ensure_voice(GUILD, Some(CHANNEL)).await.err();
        assert!(matches!(err, Some(MusicError::Join(_))));
        assert_eq!(manager.active_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn playback_cancels_idle_timer() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        let (tx, expired) = flume::unbounded();

        manager.start_inactivity_timer(GUILD, tx);
        tokio::time::sleep(Duration::from_secs(60)).await;

        manager.start_playback(GUILD, song(), notifier()).await.unwrap();
        assert!(!manager.has_idle_timer(GUILD));

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(expired.is_empty());
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
        assert!(manager.is_connected(GUILD));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_fires_exactly_one_disconnect() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        let (tx, expired) = flume::unbounded();

        let timer = manager.start_inactivity_timer(GUILD, tx);
        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;

        assert!(matches!(
            expired.try_recv(),
            Ok(SessionEvent::IdleTimeout { timer: fired }) if fired == timer
        ));
        assert!(manager.on_idle_timeout(GUILD, timer).await);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(!manager.is_connected(GUILD));
        assert!(!manager.has_idle_timer(GUILD));

        // Un segundo aviso del mismo timer no hace nada
        assert!(!manager.on_idle_timeout(GUILD, timer).await);
        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(expired.is_empty());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_timer_is_stale_once_playback_restarts() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        let (tx, _expired) = flume::unbounded();

        // El timer vence, pero otra canción arranca antes de procesar el aviso
        let timer = manager.start_inactivity_timer(GUILD, tx);
        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
        manager.start_playback(GUILD, song(), notifier()).await.unwrap();

        assert!(!manager.on_idle_timeout(GUILD, timer).await);
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
        assert!(manager.is_connected(GUILD));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_timer() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        let (tx, expired) = flume::unbounded();

        let first = manager.start_inactivity_timer(GUILD, tx.clone());
        tokio::time::sleep(Duration::from_secs(100)).await;
        let second = manager.start_inactivity_timer(GUILD, tx);
        assert_ne!(first, second);

        // El primer timer habría vencido a los 120 s
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(expired.is_empty());
        assert!(!manager.on_idle_timeout(GUILD, first).await);

        tokio::time::sleep(Duration::from_secs(80)).await;
        assert_eq!(drain_expired(&manager, &expired).await, 1);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_spares_a_playing_connection() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), true));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        let (tx, expired) = flume::unbounded();

        manager.start_inactivity_timer(GUILD, tx);
        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;

        assert_eq!(drain_expired(&manager, &expired).await, 0);
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
        assert!(manager.is_connected(GUILD));
    }

    #[tokio::test(start_paused = true)]
    async fn alone_detection_preempts_pending_timer() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        let (tx, expired) = flume::unbounded();
        manager.start_inactivity_timer(GUILD, tx);

        let disconnected = manager
            .on_member_voice_state_changed(GUILD, false, |channel| {
                assert_eq!(channel, CHANNEL);
                1
            })
            .await;

        assert!(disconnected);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(expired.is_empty());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn moved_bot_tracks_its_new_channel() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        let moved_to = ChannelId::new(11);
        assert!(!manager.on_bot_moved(GUILD, moved_to));

        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        assert!(manager.on_bot_moved(GUILD, moved_to));
        assert!(!manager.on_bot_moved(GUILD, moved_to));

        assert_eq!(manager.channel(GUILD), Some(moved_to));
        assert!(manager.ensure_voice(GUILD, Some(moved_to)).await.is_ok());
        assert!(matches!(
            manager.ensure_voice(GUILD, Some(CHANNEL)).await,
            Err(MusicError::ChannelMismatch)
        ));

        // El watchdog cuenta miembros del canal nuevo
        let disconnected = manager
            .on_member_voice_state_changed(GUILD, false, |channel| {
                assert_eq!(channel, moved_to);
                2
            })
            .await;
        assert!(!disconnected);
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn voice_events_from_bots_or_busy_channels_are_ignored() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();

        assert!(!manager.on_member_voice_state_changed(GUILD, true, |_| 1).await);
        assert!(!manager.on_member_voice_state_changed(GUILD, false, |_| 3).await);
        assert!(
            !manager
                .on_member_voice_state_changed(GuildId::new(2), false, |_| 1)
                .await
        );
        assert_eq!(disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();

        manager.disconnect(GUILD).await;
        manager.disconnect(GUILD).await;

        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_check_state() {
        let mut mock = MockTransport::new();
        mock.expect_is_playing().returning(|| false);
        mock.expect_is_paused().returning(|| false);
        let transport: Arc<dyn Transport> = Arc::new(mock);
        let manager = manager_with(transport);

        assert!(matches!(
            manager.pause(GUILD).await,
            Err(MusicError::NotConnected)
        ));

        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        assert!(matches!(
            manager.pause(GUILD).await,
            Err(MusicError::NothingPlaying)
        ));
        assert!(matches!(
            manager.resume(GUILD).await,
            Err(MusicError::NothingPaused)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_closes_everything() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let manager = manager_with(mock_transport(disconnects.clone(), false));
        manager.ensure_voice(GUILD, Some(CHANNEL)).await.unwrap();
        manager
            .ensure_voice(GuildId::new(2), Some(ChannelId::new(20)))
            .await
            .unwrap();
        let (tx, expired) = flume::unbounded();
        manager.start_inactivity_timer(GUILD, tx);

        manager.cleanup().await;

        assert_eq!(manager.active_connections(), 0);
        assert!(!manager.has_idle_timer(GUILD));
        assert_eq!(disconnects.load(Ordering::SeqCst), 2);

        tokio::time::sleep(TIMEOUT * 2).await;
        assert!(expired.is_empty());
        assert_eq!(disconnects.load(Ordering::SeqCst), 2);
    }
}
