//! Bot layer - Discord-specific interface and command handlers
//!
//! This module wires the persistence layer into a poise framework: shared
//! bot data holding the entity caches, the per-guild dynamic prefix, and the
//! framework error handler.

/// Discord command implementations (general, guild settings, developer)
pub mod commands;

use crate::config::Settings;
use crate::db::Storage;
use crate::entities::{GuildCache, guild};
use crate::errors::{Error, Result};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Poise context used by every command.
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// Shared data available to all bot commands.
/// Holds one cache per entity type and the settings loaded at startup.
pub struct BotData {
    /// Guild settings, keyed by guild ID
    pub guilds: GuildCache,
    /// Application settings
    pub settings: Settings,
}

impl BotData {
    /// Creates the shared bot data and the entity caches over `storage`.
    ///
    /// # Errors
    /// Returns a schema error when an entity type declares an invalid schema.
    pub fn new(storage: Arc<Storage>, settings: Settings) -> Result<Self> {
        let guilds = GuildCache::new(&storage, guild::TABLE_KEY)?;
        Ok(Self { guilds, settings })
    }

    /// Drops every cached entity so the next lookup reads storage again.
    pub async fn clear_cached_data(&self) {
        self.guilds.invalidate_all().await;
    }
}

/// Prefix for prefix commands: the guild's own prefix when one is stored,
/// the configured default otherwise (and in DMs).
async fn dynamic_prefix(ctx: poise::PartialContext<'_, BotData, Error>) -> Result<Option<String>> {
    let data = ctx.data;
    let default = &data.settings.default_prefix;
    let Some(guild_id) = ctx.guild_id else {
        return Ok(Some(default.clone()));
    };

    let prefix = match data.guilds.get(guild_id.get()).await {
        Ok(Some(guild)) => guild.read().await.prefix_or(default).to_string(),
        Ok(None) => default.clone(),
        Err(e) => {
            warn!(guild = guild_id.get(), "Failed to load guild prefix: {}", e);
            default.clone()
        }
    };
    Ok(Some(prefix))
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {:?}", ctx.command().name, error);
            if let Err(e) = ctx
                .say("Something went wrong while handling that command. Please try again later.")
                .await
            {
                error!("Failed to send error message: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Builds the poise framework and runs the client until it stops.
///
/// # Errors
/// Returns a framework error when the client cannot be created or the
/// gateway connection fails.
#[instrument(skip_all)]
pub async fn run_bot(token: String, data: BotData) -> Result<()> {
    let owners = data
        .settings
        .owners
        .iter()
        .copied()
        .map(serenity::UserId::new)
        .collect();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::help(),
                commands::prefix(),
                commands::category(),
                commands::clearcache(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                dynamic_prefix: Some(|ctx| Box::pin(dynamic_prefix(ctx))),
                ..Default::default()
            },
            owners,
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;

    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {:?}", e))?;
    Ok(())
}
