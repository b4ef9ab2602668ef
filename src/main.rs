use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod ui;
mod web;

use crate::audio::{player::MusicCoordinator, transport::SongbirdConnector, voice::VoiceManager};
use crate::bot::{announcer::DiscordAnnouncer, KeionBot};
use crate::cache::SongCache;
use crate::config::Config;
use crate::sources::{SpotifyClient, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keion=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // El health check no necesita token
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("🎵 Iniciando Keion v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Resolución de canciones
    let cache = Arc::new(SongCache::new(config.cache_size, config.cache_ttl()));
    let http = reqwest::Client::new();
    let spotify = Arc::new(SpotifyClient::new(
        http.clone(),
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
    ));
    if !config.spotify_enabled() {
        warn!("⚠️ Spotify deshabilitado: faltan SPOTIFY_CLIENT_ID/SPOTIFY_CLIENT_SECRET");
    }
    let resolver = Arc::new(YtDlpResolver::new(
        cache.clone(),
        spotify,
        config.resolve_timeout(),
    ));

    // Voz y sesiones por guild
    let songbird = Songbird::serenity();
    let connector = Arc::new(SongbirdConnector::new(
        songbird.clone(),
        http,
        config.default_volume,
    ));
    let voice = Arc::new(VoiceManager::new(connector, config.idle_timeout()));
    let announcer = Arc::new(DiscordAnnouncer::new(Arc::new(Http::new(&config.discord_token))));
    let coordinator =
        Arc::new(MusicCoordinator::new(voice, resolver).with_announcer(announcer));

    // Dashboard opcional
    if let Some(addr) = config.dashboard_addr {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = web::serve(addr, coordinator).await {
                error!("❌ Error en el dashboard: {:?}", e);
            }
        });
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = KeionBot::new(config.clone(), cache, coordinator.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        coordinator.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    info!("👋 Keion detenido");
    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
