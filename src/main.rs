use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use teloxide::net;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio::sync::mpsc;

use crate::commands::Command;
use crate::dispatcher::Dispatcher;
use crate::handlers::Handler;
use crate::lightsail_client::LightsailClient;
use crate::settings::load_settings;
use crate::weather_client::WeatherClient;

mod commands;
mod dispatcher;
mod handlers;
mod lightsail_client;
mod services;
mod settings;
mod transport;
mod weather_client;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = load_settings()?;
    let credentials = &settings.credentials;

    // Must outlive the long poll timeout.
    let client = net::default_reqwest_settings()
        .timeout(Duration::from_secs(settings.poll_timeout as u64 + 30))
        .build()
        .context("failed to build telegram client")?;
    let bot = Bot::with_client(&credentials.bot_token, client);

    let me = bot.get_me().await.context("failed to get bot identity")?;
    tracing::info!(username = %me.username(), "authorized");

    tracing::info!("updating menu button");
    bot.set_my_commands(Command::bot_commands()).await?;
    tracing::info!("updated menu button");

    let usage = LightsailClient::new(
        &credentials.cloud_access_key_id,
        &credentials.cloud_secret_key,
    );
    let weather = WeatherClient::new(
        &credentials.weather_api_key,
        &settings.geo_url,
        &settings.api_url,
    )?;
    let handler = Arc::new(Handler::new(Arc::new(usage), Arc::new(weather)));

    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let receiver = tokio::spawn(transport::receive_updates(
        bot.clone(),
        settings.poll_timeout,
        updates_tx,
    ));

    let receiver_handle = receiver.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            receiver_handle.abort();
        }
    });

    tracing::info!("bot started");

    Dispatcher::new(settings.workers, handler, Arc::new(bot))
        .run(updates_rx)
        .await;

    Ok(())
}
