use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        player::NowPlaying,
        queue::{LoopMode, QueueSnapshot},
    },
    sources::Song,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Keion";

fn with_song_fields(mut embed: CreateEmbed, song: &Song) -> CreateEmbed {
    embed = embed.field(
        "🎤 Artista",
        song.display_artist().unwrap_or_else(|| "Desconocido".to_string()),
        true,
    );

    embed = match song.metadata().duration {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    if let Some(user) = song.requested_by() {
        embed = embed.field("👤 Solicitado por", format!("<@{user}>"), true);
    }

    if let Some(spotify) = &song.metadata().spotify {
        if let Some(album) = &spotify.album {
            embed = embed.field("💿 Álbum", album, true);
        }
    }

    if let Some(thumbnail) = song.display_thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed.url(song.page_url())
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(now: &NowPlaying) -> CreateEmbed {
    let title = if now.paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", now.song.title()))
        .color(colors::SUCCESS_GREEN);

    with_song_fields(embed, &now.song)
        .field("🔁 Repetición", now.loop_mode.label(), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de "empezó a sonar" tras un `/play` o un skip
pub fn create_started_embed(song: &Song) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", song.title()))
        .color(colors::SUCCESS_GREEN);

    with_song_fields(embed, song)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(song: &Song, position: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            song.title()
        ))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true);

    with_song_fields(embed, song)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando termine la actual",
        ))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue: &QueueSnapshot, limit: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue.current.is_none() && queue.pending.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let info = format!(
        "**Total:** {} canciones • **Repetición:** {}",
        queue.pending.len(),
        queue.loop_mode.label()
    );

    embed
        .description(queue_listing(queue, limit))
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Texto de la cola: canción actual, las primeras `limit` pendientes y cuántas faltan
pub fn queue_listing(queue: &QueueSnapshot, limit: usize) -> String {
    let mut text = String::new();

    if let Some(current) = &queue.current {
        let status = match queue.loop_mode {
            LoopMode::Song => "🔂",
            LoopMode::Queue => "🔁",
            LoopMode::Off => "▶️",
        };
        text.push_str(&format!("{} **Sonando:** {}\n", status, song_line(current)));
    }

    let (shown, remaining) = queue.truncated(limit);
    if shown.is_empty() {
        text.push_str("\n📭 No hay más canciones en la cola");
        return text;
    }

    text.push_str("\n**Próximas canciones**\n");
    for (i, song) in shown.iter().enumerate() {
        text.push_str(&format!("**{}**. {}\n", i + 1, song_line(song)));
    }

    if remaining > 0 {
        text.push_str(&format!("...y {remaining} más"));
    }

    text
}

fn song_line(song: &Song) -> String {
    let mut line = song.title().to_string();
    if let Some(artist) = song.display_artist() {
        line.push_str(&format!(" - {artist}"));
    }
    if let Some(duration) = song.metadata().duration {
        line.push_str(&format!(" `[{}]`", format_duration(duration)));
    }
    line
}

/// Embed con el modo de repetición resultante de `/loop`
pub fn create_loop_embed(mode: LoopMode) -> CreateEmbed {
    let description = match mode {
        LoopMode::Off => "La repetición está desactivada",
        LoopMode::Queue => "Se repetirá toda la cola",
        LoopMode::Song => "Se repetirá la canción actual",
    };

    CreateEmbed::default()
        .title(format!("Repetición: {}", mode.label()))
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de aviso
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
