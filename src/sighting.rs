use crate::dispatch::{CachedGuild, NotificationDispatcher};
use crate::render::SightingCard;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

/// Handle a guild message from a possibly watched user.
pub async fn handle_sighting(
    ctx: &serenity::Context,
    new_message: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if new_message.author.bot {
        return Ok(());
    }
    let Some(guild_id) = new_message.guild_id else {
        return Ok(());
    };
    let author = new_message.author.id;

    // Most messages stop here, before the guild is cloned.
    if !data.watch.is_watched(author, guild_id).await {
        return Ok(());
    }

    let Some(mut scope) = CachedGuild::from_cache(&ctx.cache, guild_id, data.bot_id) else {
        warn!("Guild {} not in cache, skipping sighting of {}", guild_id, author);
        return Ok(());
    };

    // Requesters must resolve as members before their alerts are consumed.
    let mut wanted = data.watch.alert_requesters(author, guild_id).await;
    wanted.push(author);
    wanted.push(data.bot_id);
    scope.resolve_members(ctx, &wanted).await;

    let sighting = data
        .watch
        .handle_sighting(author, guild_id, &scope, || {
            SightingCard::from_message(
                new_message,
                scope.channel_name(new_message.channel_id),
                scope.member_colour(author),
            )
            .to_embed()
        })
        .await;

    for (requester, e) in &sighting.failed_expiries {
        error!("Failed to expire alert for {} on {}: {}", requester, author, e);
    }
    if !sighting.expired.is_empty() {
        debug!(
            "Expired {} alert(s) on {} in guild {}",
            sighting.expired.len(),
            author,
            guild_id
        );
    }

    if let Some(fanout) = sighting.fanout {
        let planned = fanout.deliveries.len();
        let sent = NotificationDispatcher::new(ctx.http.clone())
            .deliver(fanout)
            .await;
        info!(
            "Sighting of {} in guild {}: {}/{} notification(s) delivered",
            author, guild_id, sent, planned
        );
    }

    Ok(())
}
