use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::player::NowPlayingAnnouncer,
    error::{MusicError, MusicResult},
    sources::Song,
    ui::{buttons, embeds},
};

/// Anuncia en el canal de texto del guild cada canción que empieza sola
pub struct DiscordAnnouncer {
    http: Arc<Http>,
}

impl DiscordAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NowPlayingAnnouncer for DiscordAnnouncer {
    async fn announce(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        song: &Song,
    ) -> MusicResult<()> {
        channel_id
            .send_message(
                &self.http,
                CreateMessage::new()
                    .embed(embeds::create_started_embed(song))
                    .components(buttons::create_player_buttons(false)),
            )
            .await
            .map_err(|e| MusicError::Discord(e.to_string()))?;

        debug!("📢 Anunciada {} en guild {}", song.title(), guild_id);
        Ok(())
    }
}
