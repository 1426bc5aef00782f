// Discord event glue for moderation.
//
// Each inbound message and each button press runs as its own task so a slow
// scan never holds up the gateway.

use poise::serenity_prelude as serenity;
use std::sync::Arc;

use crate::core::moderation::notice;
use crate::core::moderation::{CallbackEvent, CallbackOutcome, Conversation};
use crate::discord::moderation::artifact_events::artifact_event;
use crate::discord::{Data, Error};

pub async fn handle_message(
    _ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if msg.author.bot {
        return Ok(());
    }
    let Some(event) = artifact_event(msg) else {
        return Ok(());
    };

    let pipeline = Arc::clone(&data.pipeline);
    tokio::spawn(async move {
        let report = pipeline.handle_artifact_event(&event).await;
        tracing::debug!(
            chat_id = event.conversation.id,
            message_id = event.message_id,
            artifacts = event.artifacts.len(),
            taken_down = report.taken_down(),
            advisory = report.advisory_sent,
            "Handled artifact event"
        );
    });
    Ok(())
}

pub async fn handle_component(
    ctx: &serenity::Context,
    interaction: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    // Acknowledge first so the button never shows "interaction failed".
    if let Err(e) = interaction
        .create_response(&ctx.http, serenity::CreateInteractionResponse::Acknowledge)
        .await
    {
        tracing::warn!("Failed to acknowledge button press: {}", e);
    }

    let chat_id = interaction.channel_id.get();
    let event = CallbackEvent {
        conversation: if interaction.guild_id.is_some() {
            Conversation::group(chat_id)
        } else {
            Conversation::private(chat_id)
        },
        actor_id: interaction.user.id.get(),
        source_message_id: interaction.message.id.get(),
        data: interaction.data.custom_id.clone(),
    };

    let reaper = Arc::clone(&data.reaper);
    tokio::spawn(async move {
        match reaper.handle_callback(&event).await {
            Ok(CallbackOutcome::Ignored) => {}
            Ok(outcome) => tracing::debug!(chat_id, ?outcome, "Handled control press"),
            Err(e) => tracing::warn!(chat_id, "Control press failed: {}", e),
        }
    });
    Ok(())
}

/// Greet a guild the bot was just added to.
pub async fn handle_guild_join(ctx: &serenity::Context, guild: &serenity::Guild) -> Result<(), Error> {
    let channel = guild.system_channel_id.or_else(|| {
        guild
            .channels
            .values()
            .filter(|c| c.kind == serenity::ChannelType::Text)
            .min_by_key(|c| c.position)
            .map(|c| c.id)
    });

    let Some(channel) = channel else {
        tracing::debug!(guild_id = guild.id.get(), "No channel to greet in");
        return Ok(());
    };

    channel.say(&ctx.http, notice::GREETING).await?;
    tracing::info!(guild_id = guild.id.get(), "Joined guild");
    Ok(())
}
