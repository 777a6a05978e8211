use super::{require_user_id, resolve_member};
use crate::watch::Outcome;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// One-shot alerts for when a user next speaks
#[poise::command(
    slash_command,
    subcommands("add", "cancel"),
    required_permissions = "MANAGE_ROLES",
    guild_only
)]
pub async fn alert(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Request to be alerted when a specified user speaks
#[poise::command(slash_command, required_permissions = "MANAGE_ROLES", guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "ID or @mention of the user to track"] user: String,
) -> Result<(), Error> {
    let Some(member) = resolve_member(ctx, &user).await? else {
        return Ok(());
    };
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = ctx.channel_id();
    let requester = ctx.author().id;
    let target = member.user.id;

    let outcome = ctx
        .data()
        .watch
        .add_alert_request(target, guild_id, requester, channel_id)
        .await?;
    info!(
        "Alert on {} in guild {} for {} -> channel {}: {:?}",
        target, guild_id, requester, channel_id, outcome
    );

    ctx.say(add_reply(target, channel_id, outcome)).await?;
    Ok(())
}

/// Cancel a previous alert request
#[poise::command(slash_command, required_permissions = "MANAGE_ROLES", guild_only)]
pub async fn cancel(
    ctx: Context<'_>,
    #[description = "ID or @mention of the user to stop tracking"] user: String,
) -> Result<(), Error> {
    let Some(target) = require_user_id(ctx, &user).await? else {
        return Ok(());
    };
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let outcome = ctx
        .data()
        .watch
        .remove_alert_request(target, guild_id, ctx.author().id)
        .await?;

    let reply = match outcome {
        Outcome::Success => format!("Alright, I will stop monitoring <@{}> for you.", target),
        _ => "I am not currently monitoring that user for you.".to_string(),
    };
    ctx.say(reply).await?;
    Ok(())
}

fn add_reply(
    target: serenity::UserId,
    channel_id: serenity::ChannelId,
    outcome: Outcome<serenity::ChannelId>,
) -> String {
    match outcome {
        Outcome::Updated(previous) if previous == channel_id => {
            format!("I am already monitoring <@{}> for you here.", target)
        }
        Outcome::Updated(previous) => format!(
            "Alright, I will notify you here (instead of <#{}>) the next time I see <@{}> say something.",
            previous, target
        ),
        _ => format!(
            "Alright, I will notify you here the next time I see <@{}> say something.",
            target
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude::{ChannelId, UserId};

    #[test]
    fn test_add_reply_variants() {
        let (user, here, elsewhere) = (UserId::new(5), ChannelId::new(10), ChannelId::new(11));

        assert_eq!(
            add_reply(user, here, Outcome::Inserted),
            "Alright, I will notify you here the next time I see <@5> say something."
        );
        assert_eq!(
            add_reply(user, here, Outcome::Updated(here)),
            "I am already monitoring <@5> for you here."
        );
        assert!(add_reply(user, here, Outcome::Updated(elsewhere)).contains("(instead of <#11>)"));
    }
}
