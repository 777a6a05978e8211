pub mod alert;
pub mod subscription;

use crate::{Context, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::error;

/// Parses `123`, `<@123>` or `<@!123>`.
pub fn parse_user_id(input: &str) -> Option<serenity::UserId> {
    let raw = input
        .trim()
        .trim_start_matches("<@")
        .trim_start_matches('!')
        .trim_end_matches('>');
    raw.parse::<u64>()
        .ok()
        .and_then(std::num::NonZeroU64::new)
        .map(serenity::UserId::from)
}

/// Looks the user up in the invoking guild. On failure the reply has
/// already been sent and `None` is returned.
pub(crate) async fn resolve_member(
    ctx: Context<'_>,
    input: &str,
) -> Result<Option<serenity::Member>, Error> {
    let Some(user_id) = parse_user_id(input) else {
        ctx.say("Error: Invalid user.").await?;
        return Ok(None);
    };
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let member = match guild_id.member(ctx.serenity_context(), user_id).await {
        Ok(member) => member,
        Err(_) => {
            ctx.say("Error: No user with that ID in the server.").await?;
            return Ok(None);
        }
    };
    if member.user.bot {
        ctx.say("Error: Please specify a Human instead of a robot.")
            .await?;
        return Ok(None);
    }
    Ok(Some(member))
}

/// Parses a user argument without resolving it. Replies on failure.
pub(crate) async fn require_user_id(
    ctx: Context<'_>,
    input: &str,
) -> Result<Option<serenity::UserId>, Error> {
    let user_id = parse_user_id(input);
    if user_id.is_none() {
        ctx.say("Error: Invalid user.").await?;
    }
    Ok(user_id)
}

pub async fn on_error(err: poise::FrameworkError<'_, Data, Error>) {
    match err {
        poise::FrameworkError::MissingUserPermissions { ctx, .. } => {
            let reply = poise::CreateReply::default()
                .content("Error: Insufficient permissions.")
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                error!("Failed to send permission error: {}", e);
            }
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Command /{} failed: {}", ctx.command().qualified_name, error);
            if let Err(e) = ctx
                .say("An error occurred. Please alert the maintainer.")
                .await
            {
                error!("Failed to send error reply: {}", e);
            }
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        let id = Some(serenity::UserId::new(80351110224678912));
        assert_eq!(parse_user_id("80351110224678912"), id);
        assert_eq!(parse_user_id("<@80351110224678912>"), id);
        assert_eq!(parse_user_id("<@!80351110224678912>"), id);
        assert_eq!(parse_user_id("  <@80351110224678912> "), id);

        assert_eq!(parse_user_id(""), None);
        assert_eq!(parse_user_id("0"), None);
        assert_eq!(parse_user_id("<#123>"), None);
        assert_eq!(parse_user_id("someone"), None);
        assert_eq!(parse_user_id("-5"), None);
    }
}
