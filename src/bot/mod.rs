//! # Bot Module
//!
//! Discord surface of Keion.
//!
//! [`KeionBot`] implements Serenity's [`EventHandler`] and translates gateway
//! events into calls on the [`MusicCoordinator`]:
//!
//! - `ready`: registers the slash commands and starts the maintenance loop
//! - `interaction_create`: slash commands and player buttons
//! - `voice_state_update`: "bot alone" detection, external disconnects and moves
//! - `guild_delete`: tears down the session of a guild the bot left
//!
//! All music state lives in the coordinator; this module only reads the
//! Serenity cache (voice channels of users) and renders responses.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;

use crate::{audio::player::MusicCoordinator, cache::SongCache, config::Config};

/// Intervalo entre rondas de mantenimiento
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Handler de eventos de Discord.
///
/// Comparte el [`MusicCoordinator`] con el dashboard; el caché de canciones
/// se guarda aquí solo para su limpieza periódica.
pub struct KeionBot {
    config: Arc<Config>,
    cache: Arc<SongCache>,
    coordinator: Arc<MusicCoordinator>,
    maintenance_started: AtomicBool,
}

impl KeionBot {
    pub fn new(
        config: Arc<Config>,
        cache: Arc<SongCache>,
        coordinator: Arc<MusicCoordinator>,
    ) -> Self {
        Self {
            config,
            cache,
            coordinator,
            maintenance_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash.
    ///
    /// Con `GUILD_ID` se registran solo en ese servidor (propagación inmediata,
    /// útil en desarrollo); sin él, globalmente (hasta una hora en propagarse).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for KeionBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión del gateway
        if self.maintenance_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let cache = self.cache.clone();
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            maintenance_tasks(cache, coordinator).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id {
            match new.channel_id {
                Some(channel_id) => self.coordinator.on_bot_moved(guild_id, channel_id).await,
                None => self.coordinator.on_bot_disconnected(guild_id).await,
            }
            return;
        }

        let member_is_bot = new
            .member
            .as_ref()
            .map(|member| member.user.bot)
            .or_else(|| ctx.cache.user(new.user_id).map(|user| user.bot))
            .unwrap_or(false);

        let cache = ctx.cache.clone();
        let members_in = move |channel_id| {
            cache
                .guild(guild_id)
                .map(|guild| {
                    guild
                        .voice_states
                        .values()
                        .filter(|state| state.channel_id == Some(channel_id))
                        .count()
                })
                .unwrap_or(0)
        };

        self.coordinator
            .on_member_voice_state_changed(guild_id, member_is_bot, members_in)
            .await;
    }

    async fn guild_delete(
        &self,
        _ctx: Context,
        incomplete: UnavailableGuild,
        _full: Option<Guild>,
    ) {
        // Una caída de Discord no significa que el bot haya salido del servidor
        if incomplete.unavailable {
            debug!("Guild {} no disponible temporalmente", incomplete.id);
            return;
        }

        info!("👋 El bot salió de la guild {}", incomplete.id);
        self.coordinator.remove_guild(incomplete.id).await;
    }
}

/// Mantenimiento periódico en segundo plano: limpia el caché de canciones
/// y deja constancia de las conexiones activas.
async fn maintenance_tasks(cache: Arc<SongCache>, coordinator: Arc<MusicCoordinator>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        cache.cleanup_old_entries();

        info!(
            "🧹 Tareas de mantenimiento completadas ({} conexiones de voz, {} canciones en caché)",
            coordinator.voice().active_connections(),
            cache.len()
        );
    }
}
