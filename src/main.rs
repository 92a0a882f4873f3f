use dotenv::dotenv;
use serenity::all::{ClientBuilder, GatewayIntents};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use quaver::commands::music::utils::music_manager::SongbirdSink;
use quaver::commands::music::utils::video_resolver::YtDlSearch;
use quaver::events::Handler;
use quaver::state::BotState;
use quaver::utils::datastore::DataStore;
use quaver::{Error, HTTP_CLIENT};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "quaver=debug,warn".into()),
        )
        .init();
    dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").expect("Expected DISCORD_TOKEN in the environment");

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let sink = Arc::new(SongbirdSink::new(Arc::clone(&songbird), HTTP_CLIENT.clone()));
    let state = Arc::new(BotState::new(
        sink,
        Arc::new(YtDlSearch),
        DataStore::new("data.json"),
    ));

    let mut client = ClientBuilder::new(&token, intents)
        .event_handler(Handler::new(state))
        .register_songbird_with(songbird)
        .await?;

    if let Err(e) = client.start().await {
        error!(error = %e, "client stopped");
    }
    Ok(())
}
