use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info, warn};

use super::KeionBot;
use crate::{
    audio::player::{LoopTarget, PlayOutcome},
    error::{MusicError, MusicResult},
    ui::{
        buttons::{self, ButtonAction},
        embeds,
    },
};

/// Respuesta de un comando: un embed y, opcionalmente, los controles del reproductor
struct Reply {
    embed: CreateEmbed,
    components: Vec<CreateActionRow>,
}

impl Reply {
    fn new(embed: CreateEmbed) -> Self {
        Self {
            embed,
            components: Vec::new(),
        }
    }

    fn with_controls(mut self, paused: bool) -> Self {
        self.components = buttons::create_player_buttons(paused);
        self
    }

    fn into_message(self) -> CreateInteractionResponseMessage {
        CreateInteractionResponseMessage::new()
            .embed(self.embed)
            .components(self.components)
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &KeionBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                ephemeral(embeds::create_error_embed(
                    "Solo en servidores",
                    "Los comandos de música solo funcionan dentro de un servidor",
                )),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let user_channel = user_voice_channel(ctx, guild_id, command.user.id);
    bot.coordinator
        .set_text_channel(guild_id, command.channel_id)
        .await;

    // /play difiere la respuesta: resolver la canción puede tardar segundos
    if command.data.name == "play" {
        return handle_play(ctx, &command, bot, guild_id, user_channel).await;
    }

    let result = match command.data.name.as_str() {
        "skip" => skip(bot, guild_id, user_channel).await,
        "pause" => pause(bot, guild_id, user_channel).await,
        "resume" => resume(bot, guild_id, user_channel).await,
        "stop" => stop(bot, guild_id, user_channel).await,
        "queue" => queue(bot, guild_id, user_channel).await,
        "nowplaying" => now_playing(bot, guild_id, user_channel).await,
        "loop" => {
            let target = match option_str(&command, "mode") {
                Some("song") => LoopTarget::Song,
                _ => LoopTarget::Queue,
            };
            toggle_loop(bot, guild_id, user_channel, target).await
        }
        other => {
            warn!("Comando desconocido: {}", other);
            command
                .create_response(
                    &ctx.http,
                    ephemeral(embeds::create_error_embed(
                        "Comando no reconocido",
                        &format!("`/{other}` no existe"),
                    )),
                )
                .await?;
            return Ok(());
        }
    };

    let response = match result {
        Ok(reply) => CreateInteractionResponse::Message(reply.into_message()),
        Err(e) => ephemeral(error_embed(&e, guild_id)),
    };

    command.create_response(&ctx.http, response).await?;
    Ok(())
}

/// Maneja los botones del reproductor
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &KeionBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ButtonAction::from_custom_id(&component.data.custom_id) else {
        component
            .create_response(
                &ctx.http,
                ephemeral(embeds::create_error_embed(
                    "Acción no reconocida",
                    "Este botón ya no está disponible",
                )),
            )
            .await?;
        return Ok(());
    };

    let user_channel = user_voice_channel(ctx, guild_id, component.user.id);
    bot.coordinator
        .set_text_channel(guild_id, component.channel_id)
        .await;

    let response = match action {
        ButtonAction::PlayPause => {
            let paused = bot.coordinator.voice().is_paused(guild_id).await;
            let result = if paused {
                bot.coordinator.resume(guild_id, user_channel).await
            } else {
                bot.coordinator.pause(guild_id, user_channel).await
            };

            match result {
                // Solo cambia el botón; el embed queda como estaba
                Ok(()) => CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .components(buttons::create_player_buttons(!paused)),
                ),
                Err(e) => ephemeral(error_embed(&e, guild_id)),
            }
        }
        ButtonAction::Skip => reply_or_error(skip(bot, guild_id, user_channel).await, guild_id),
        ButtonAction::Stop => reply_or_error(stop(bot, guild_id, user_channel).await, guild_id),
        ButtonAction::Queue => reply_or_error(queue(bot, guild_id, user_channel).await, guild_id),
    };

    component.create_response(&ctx.http, response).await?;
    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> Result<()> {
    let query = option_str(command, "query").unwrap_or_default();

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let reply = match bot
        .coordinator
        .play(guild_id, user_channel, command.user.id, query)
        .await
    {
        Ok(PlayOutcome::Started(song)) => {
            Reply::new(embeds::create_started_embed(&song)).with_controls(false)
        }
        Ok(PlayOutcome::Queued { song, position }) => {
            Reply::new(embeds::create_track_added_embed(&song, position))
        }
        Err(e) => {
            // El defer es público; el error va como followup efímero
            command.delete_response(&ctx.http).await?;
            command
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new()
                        .embed(error_embed(&e, guild_id))
                        .ephemeral(true),
                )
                .await?;
            return Ok(());
        }
    };

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(reply.embed)
                .components(reply.components),
        )
        .await?;

    Ok(())
}

// Acciones compartidas entre comandos y botones

async fn skip(
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> MusicResult<Reply> {
    let reply = match bot.coordinator.skip(guild_id, user_channel).await? {
        Some(next) => Reply::new(embeds::create_started_embed(&next)).with_controls(false),
        None => Reply::new(embeds::create_success_embed(
            "Canción saltada",
            "No hay más canciones en la cola",
        )),
    };
    Ok(reply)
}

async fn pause(
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> MusicResult<Reply> {
    bot.coordinator.pause(guild_id, user_channel).await?;
    let embed = embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada");
    Ok(Reply::new(embed).with_controls(true))
}

async fn resume(
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> MusicResult<Reply> {
    bot.coordinator.resume(guild_id, user_channel).await?;
    let embed = embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada");
    Ok(Reply::new(embed).with_controls(false))
}

async fn stop(
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> MusicResult<Reply> {
    bot.coordinator.stop(guild_id, user_channel).await?;
    Ok(Reply::new(embeds::create_success_embed(
        "Detenido",
        "⏹️ Cola limpiada, hasta la próxima 👋",
    )))
}

async fn queue(
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> MusicResult<Reply> {
    let snapshot = bot.coordinator.queue(guild_id, user_channel).await?;
    Ok(Reply::new(embeds::create_queue_embed(
        &snapshot,
        bot.config.max_queue_display,
    )))
}

async fn now_playing(
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
) -> MusicResult<Reply> {
    let now = bot.coordinator.now_playing(guild_id, user_channel).await?;
    Ok(Reply::new(embeds::create_now_playing_embed(&now)).with_controls(now.paused))
}

async fn toggle_loop(
    bot: &KeionBot,
    guild_id: GuildId,
    user_channel: Option<ChannelId>,
    target: LoopTarget,
) -> MusicResult<Reply> {
    let mode = bot
        .coordinator
        .toggle_loop(guild_id, user_channel, target)
        .await?;
    Ok(Reply::new(embeds::create_loop_embed(mode)))
}

fn reply_or_error(result: MusicResult<Reply>, guild_id: GuildId) -> CreateInteractionResponse {
    match result {
        Ok(reply) => CreateInteractionResponse::Message(reply.into_message()),
        Err(e) => ephemeral(error_embed(&e, guild_id)),
    }
}

fn ephemeral(embed: CreateEmbed) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .embed(embed)
            .ephemeral(true),
    )
}

/// Convierte un error del dominio en el embed que ve el usuario
fn error_embed(err: &MusicError, guild_id: GuildId) -> CreateEmbed {
    if err.is_user_error() {
        return embeds::create_warning_embed("No se pudo completar", &err.to_string());
    }

    error!("❌ Error en guild {}: {}", guild_id, err);
    embeds::create_error_embed(
        "Algo salió mal",
        &format!("{err}\n\nIntenta de nuevo en unos segundos."),
    )
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Canal de voz del usuario según el caché de serenity
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
