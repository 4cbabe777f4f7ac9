//! General Discord commands - ping and help.
//! These commands don't touch storage.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{bot::Context, errors::Result};

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: Context<'_>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: Context<'_>) -> Result<()> {
        let help_text = format!(
            "**Mafia Bot Help**\n\
            Prefix commands use `{}` unless this server set its own prefix.\n\n\
            **Server Settings**\n\
            • `/prefix [new]` - Shows or changes the command prefix for this server.\n\
            • `/category [channel]` - Shows or changes the category game channels are created under.\n\n\
            **Utility Commands**\n\
            • `/ping` - Checks if the bot is responsive.\n\
            • `/help` - Shows this help message.",
            ctx.data().settings.default_prefix
        );

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
