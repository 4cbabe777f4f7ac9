//! Guild settings commands - command prefix and game category.
//!
//! Both commands read the guild through the guild cache and write changes
//! back with an upsert. A guild without a stored row is created on the first
//! change.

use crate::bot::BotData;
use crate::db::Shared;
use crate::entities::Guild;
use crate::errors::Result;
use poise::serenity_prelude as serenity;

/// Longest prefix a guild may set.
pub const MAX_PREFIX_LEN: usize = 5;

/// Trims a requested prefix; `None` when it is blank, too long or contains
/// whitespace.
#[must_use]
pub fn normalize_prefix(input: &str) -> Option<String> {
    let prefix = input.trim();
    if prefix.is_empty()
        || prefix.chars().count() > MAX_PREFIX_LEN
        || prefix.chars().any(char::is_whitespace)
    {
        return None;
    }
    Some(prefix.to_string())
}

/// Applies `change` to the guild and saves it. Uses the cached instance when
/// the guild has a row, a fresh one otherwise.
async fn update_guild(
    data: &BotData,
    guild_id: u64,
    cached: Option<Shared<Guild>>,
    change: impl FnOnce(&mut Guild),
) -> Result<()> {
    if let Some(shared) = cached {
        let mut guild = shared.write().await;
        change(&mut *guild);
        data.guilds.save(&mut *guild).await
    } else {
        let mut guild = Guild::new(guild_id);
        change(&mut guild);
        data.guilds.save(&mut guild).await
    }
}

/// What the guild cache says about a stored game category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryState {
    /// The channel exists and is a category
    Valid,
    /// The channel was deleted or is no longer a category
    Stale,
    /// The guild is not cached, so nothing is known
    Unknown,
}

/// Classifies a stored category from a cache lookup. `lookup` is `None` when
/// the guild itself is not cached, and `Some(kind)` with the kind of the
/// channel otherwise (`None` for a missing channel).
#[must_use]
pub fn category_state(lookup: Option<Option<serenity::ChannelType>>) -> CategoryState {
    match lookup {
        None => CategoryState::Unknown,
        Some(Some(serenity::ChannelType::Category)) => CategoryState::Valid,
        Some(_) => CategoryState::Stale,
    }
}

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use super::{
        CategoryState, MAX_PREFIX_LEN, category_state, normalize_prefix, update_guild,
    };
    use crate::{bot::Context, errors::Result};
    use poise::serenity_prelude as serenity;
    use tracing::{info, warn};

    const NOT_CONFIGURED: &str = "Server settings storage is not configured for this bot.";

    fn cached_category_kind(
        ctx: Context<'_>,
        guild_id: serenity::GuildId,
        id: u64,
    ) -> Option<Option<serenity::ChannelType>> {
        let guild = guild_id.to_guild_cached(ctx.serenity_context())?;
        Some(
            guild
                .channels
                .get(&serenity::ChannelId::new(id))
                .map(|channel| channel.kind),
        )
    }

    /// Shows or changes the command prefix for this server.
    #[poise::command(slash_command, prefix_command, guild_only)]
    pub async fn prefix(
        ctx: Context<'_>,
        #[description = "New prefix (up to 5 characters)"] new_prefix: Option<String>,
    ) -> Result<()> {
        let Some(guild_id) = ctx.guild_id() else {
            return Ok(());
        };
        let data = ctx.data();
        if !data.guilds.is_enabled() {
            ctx.say(NOT_CONFIGURED).await?;
            return Ok(());
        }
        let cached = data.guilds.get(guild_id.get()).await?;

        let Some(requested) = new_prefix else {
            let current = match &cached {
                Some(guild) => guild
                    .read()
                    .await
                    .prefix_or(&data.settings.default_prefix)
                    .to_string(),
                None => data.settings.default_prefix.clone(),
            };
            ctx.say(format!("The prefix for this server is `{current}`."))
                .await?;
            return Ok(());
        };

        let Some(prefix) = normalize_prefix(&requested) else {
            ctx.say(format!(
                "A prefix must be 1 to {MAX_PREFIX_LEN} characters without spaces."
            ))
            .await?;
            return Ok(());
        };

        let reply = format!("Prefix changed to `{prefix}`.");
        update_guild(data, guild_id.get(), cached, |guild| {
            guild.set_prefix(Some(prefix));
        })
        .await?;
        info!(guild = guild_id.get(), "Guild prefix changed");
        ctx.say(reply).await?;
        Ok(())
    }

    /// Shows or changes the category that game channels are created under.
    #[poise::command(slash_command, prefix_command, guild_only)]
    pub async fn category(
        ctx: Context<'_>,
        #[description = "Category channel for game channels"]
        #[channel_types("Category")]
        channel: Option<serenity::GuildChannel>,
    ) -> Result<()> {
        let Some(guild_id) = ctx.guild_id() else {
            return Ok(());
        };
        let data = ctx.data();
        if !data.guilds.is_enabled() {
            ctx.say(NOT_CONFIGURED).await?;
            return Ok(());
        }
        let cached = data.guilds.get(guild_id.get()).await?;

        if let Some(channel) = channel {
            if channel.kind != serenity::ChannelType::Category || channel.guild_id != guild_id {
                ctx.say("Please pick a category channel from this server.")
                    .await?;
                return Ok(());
            }
            let id = channel.id.get();
            update_guild(data, guild_id.get(), cached, |guild| {
                guild.set_game_category_id(id);
            })
            .await?;
            info!(guild = guild_id.get(), category = id, "Game category changed");
            ctx.say(format!("Game channels will be created under <#{id}>."))
                .await?;
            return Ok(());
        }

        let Some(shared) = cached else {
            ctx.say("No game category is set for this server.").await?;
            return Ok(());
        };
        let current = shared.read().await.game_category_id();
        if current == 0 {
            ctx.say("No game category is set for this server.").await?;
            return Ok(());
        }
        match category_state(cached_category_kind(ctx, guild_id, current)) {
            state @ (CategoryState::Valid | CategoryState::Unknown) => {
                if state == CategoryState::Unknown {
                    warn!(
                        guild = guild_id.get(),
                        category = current,
                        "Guild not cached, game category left unchecked"
                    );
                }
                ctx.say(format!("Game channels are created under <#{current}>."))
                    .await?;
            }
            CategoryState::Stale => {
                update_guild(data, guild_id.get(), Some(shared), |guild| {
                    guild.set_game_category_id(0);
                })
                .await?;
                info!(guild = guild_id.get(), category = current, "Stale game category reset");
                ctx.say("The configured game category no longer exists, so it has been cleared.")
                    .await?;
            }
        }
        Ok(())
    }
}

pub use inner::*;
