// Content-safety quota status.

use chrono::Utc;
use poise::serenity_prelude as serenity;

use crate::core::moderation::QuotaUsage;
use crate::discord::commands::{Context, Error};

fn usage_line(usage: &QuotaUsage) -> String {
    let remaining = usage.limit.saturating_sub(usage.count);
    format!(
        "**{}**: {} / {} calls ({} left)",
        usage.provider, usage.count, usage.limit, remaining
    )
}

/// Show this month's content-safety usage per provider.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES",
    default_member_permissions = "MANAGE_MESSAGES"
)]
pub async fn quota(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let usage = data
        .ledger()
        .usage(&data.orchestrator().config().content_safety, Utc::now())
        .await?;

    let Some(period) = usage.first().map(|u| u.period) else {
        ctx.say("No content-safety providers are configured.").await?;
        return Ok(());
    };

    let lines: Vec<String> = usage.iter().map(usage_line).collect();
    let embed = serenity::CreateEmbed::new()
        .title(format!("Content-safety quota for {}", period))
        .description(lines.join("\n"))
        .color(serenity::Colour::from_rgb(88, 101, 242));

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}
