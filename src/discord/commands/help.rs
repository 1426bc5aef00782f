use crate::discord::commands::{Context, Error};
use poise::serenity_prelude as serenity;

const ABOUT: &str = "I scan files, links, photos and videos posted here. \
Files and links go through a malware check; images are checked for explicit content.";

const UNDO_FLOW: &str = "When I remove a message I post a notice in its place. \
A moderator can press **Undo** to bring the content back, or **Delete** to drop it for good. \
Undo stays available for a limited time; after that the removal is final.";

const SETUP: &str = "I need the **Manage Messages** permission in each channel I should guard. \
Without it I only post a reminder and skip scanning.";

/// Explain what the bot does and how to undo a removal.
#[poise::command(slash_command, prefix_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let commands = ctx
        .framework()
        .options()
        .commands
        .iter()
        .filter(|c| !c.hide_in_help && c.name != "help")
        .map(|c| {
            format!(
                "• **/{}**: {}",
                c.name,
                c.description.as_deref().unwrap_or("No description provided.")
            )
        })
        .collect::<Vec<_>>();

    let mut embed = serenity::CreateEmbed::new()
        .title("Group Defender")
        .description(ABOUT)
        .field("Undo a removal", UNDO_FLOW, false)
        .field("Setup", SETUP, false)
        .color(serenity::Colour::from_rgb(88, 101, 242))
        .timestamp(serenity::Timestamp::now());

    if !commands.is_empty() {
        embed = embed.field("Commands", commands.join("\n"), false);
    }

    if let Ok(user) = ctx.framework().bot_id.to_user(&ctx).await {
        embed = embed.thumbnail(user.face());
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
