use super::{require_user_id, resolve_member};
use crate::watch::Outcome;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Forward everything a user says to the guild's subscription channel
#[poise::command(
    slash_command,
    subcommands("start", "stop", "set"),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn subscription(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Subscribe to a user's messages
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD", guild_only)]
pub async fn start(
    ctx: Context<'_>,
    #[description = "ID or @mention of the user to subscribe to"] user: String,
) -> Result<(), Error> {
    let Some(member) = resolve_member(ctx, &user).await? else {
        return Ok(());
    };
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let target = member.user.id;

    let watch = &ctx.data().watch;
    let outcome = watch.add_subscription(target, guild_id).await?;
    let channel = watch.get_guild_subscription_channel(guild_id).await;

    let reply = match outcome {
        Outcome::Updated(()) => format!("You are already subscribed to messages from <@{}>.", target),
        _ => {
            info!("Subscribed to {} in guild {}", target, guild_id);
            format!(
                "Alright, I will now forward messages from <@{}> to {}.",
                target,
                destination(channel)
            )
        }
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Unsubscribe from a user's messages
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD", guild_only)]
pub async fn stop(
    ctx: Context<'_>,
    #[description = "ID or @mention of the user to unsubscribe from"] user: String,
) -> Result<(), Error> {
    let Some(target) = require_user_id(ctx, &user).await? else {
        return Ok(());
    };
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let reply = match ctx.data().watch.remove_subscription(target, guild_id).await? {
        Outcome::NotFound => "I am not currently forwarding messages from that user.".to_string(),
        _ => {
            info!("Unsubscribed from {} in guild {}", target, guild_id);
            format!("Alright, I will no longer forward messages from <@{}>.", target)
        }
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Set a channel to forward subscriptions to
#[poise::command(slash_command, required_permissions = "MANAGE_GUILD", guild_only)]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Channel to forward subscriptions to"]
    #[channel_types("Text")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let outcome = ctx
        .data()
        .watch
        .set_guild_subscription_channel(guild_id, channel.id)
        .await?;
    info!(
        "Subscription channel for guild {} set to {}: {:?}",
        guild_id, channel.id, outcome
    );

    ctx.say(set_reply(channel.id, outcome)).await?;
    Ok(())
}

fn destination(channel: Option<serenity::ChannelId>) -> String {
    match channel {
        Some(id) => format!("<#{}>", id),
        None => "the ether, or at least until a subscription channel is set up".to_string(),
    }
}

fn set_reply(channel_id: serenity::ChannelId, outcome: Outcome<serenity::ChannelId>) -> String {
    match outcome {
        Outcome::Updated(previous) if previous == channel_id => {
            "I am already forwarding messages from subscribed users there.".to_string()
        }
        Outcome::Updated(previous) => format!(
            "Alright, I will now forward messages from subscribed users to <#{}> (instead of <#{}>).",
            channel_id, previous
        ),
        _ => format!(
            "Alright, I will now forward messages from subscribed users to <#{}>.",
            channel_id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude::ChannelId;

    #[test]
    fn test_destination() {
        assert_eq!(destination(Some(ChannelId::new(9))), "<#9>");
        assert!(destination(None).starts_with("the ether"));
    }

    #[test]
    fn test_set_reply_variants() {
        let (here, before) = (ChannelId::new(9), ChannelId::new(8));
        assert_eq!(
            set_reply(here, Outcome::Inserted),
            "Alright, I will now forward messages from subscribed users to <#9>."
        );
        assert_eq!(
            set_reply(here, Outcome::Updated(here)),
            "I am already forwarding messages from subscribed users there."
        );
        assert!(set_reply(here, Outcome::Updated(before)).ends_with("<#9> (instead of <#8>)."));
    }
}
