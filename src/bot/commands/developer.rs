//! Owner-only maintenance commands.

mod inner {
    #![allow(missing_docs)]

    use crate::{bot::Context, errors::Result};
    use tracing::info;

    /// Drops every cached entity so settings are re-read from the database.
    #[poise::command(slash_command, prefix_command, owners_only, hide_in_help)]
    pub async fn clearcache(ctx: Context<'_>) -> Result<()> {
        info!(user = %ctx.author().name, "Clearing cached data");
        ctx.data().clear_cached_data().await;
        ctx.say("Cached data cleared.").await?;
        Ok(())
    }
}

pub use inner::*;
