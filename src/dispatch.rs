use crate::watch::{FanOut, GuildScope};
use poise::serenity_prelude as serenity;
use serenity::{CreateAllowedMentions, CreateEmbed, CreateMessage, GuildChannel, Http, Member, UserId};
use std::sync::Arc;
use tracing::{debug, error};

/// Owned copy of a cached guild, taken once per sighting.
pub struct CachedGuild {
    guild: serenity::Guild,
    bot_id: UserId,
}

impl CachedGuild {
    pub fn new(guild: serenity::Guild, bot_id: UserId) -> Self {
        Self { guild, bot_id }
    }

    pub fn from_cache(
        cache: &serenity::Cache,
        guild_id: serenity::GuildId,
        bot_id: UserId,
    ) -> Option<Self> {
        let guild = cache
            .guild(guild_id)
            .map(|guild| serenity::Guild::clone(&guild))?;
        Some(Self::new(guild, bot_id))
    }

    /// Ids from `ids` with no member entry in this snapshot.
    pub fn missing_members(&self, ids: &[UserId]) -> Vec<UserId> {
        let mut missing: Vec<UserId> = ids
            .iter()
            .copied()
            .filter(|id| !self.guild.members.contains_key(id))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    pub fn insert_member(&mut self, member: Member) {
        self.guild.members.insert(member.user.id, member);
    }

    /// Fetches members the cache does not hold. The gateway only sends a partial
    /// member list, so requesters are usually missing until fetched. Users who
    /// have left the guild stay absent.
    pub async fn resolve_members(&mut self, ctx: &serenity::Context, ids: &[UserId]) {
        for id in self.missing_members(ids) {
            match self.guild.id.member(ctx, id).await {
                Ok(member) => self.insert_member(member),
                Err(e) => debug!("Member {} not resolved in guild {}: {}", id, self.guild.id, e),
            }
        }
    }

    pub fn channel_name(&self, channel_id: serenity::ChannelId) -> Option<&str> {
        self.guild
            .channels
            .get(&channel_id)
            .map(|channel| channel.name.as_str())
    }

    /// Colour of the member's highest coloured role.
    pub fn member_colour(&self, user_id: UserId) -> Option<serenity::Colour> {
        let member = self.guild.members.get(&user_id)?;
        member
            .roles
            .iter()
            .filter_map(|role_id| self.guild.roles.get(role_id))
            .filter(|role| role.colour.0 != 0)
            .max_by_key(|role| role.position)
            .map(|role| role.colour)
    }
}

impl GuildScope for CachedGuild {
    type Channel = GuildChannel;
    type Member = Member;

    fn channel(&self, id: serenity::ChannelId) -> Option<GuildChannel> {
        self.guild.channels.get(&id).cloned()
    }

    fn member(&self, id: UserId) -> Option<Member> {
        self.guild.members.get(&id).cloned()
    }

    fn is_usable(&self, channel: &GuildChannel) -> bool {
        let Some(me) = self.guild.members.get(&self.bot_id) else {
            return false;
        };
        let permissions = self.guild.user_permissions_in(channel, me);
        permissions.send_messages() && permissions.embed_links()
    }

    fn can_read(&self, member: &Member, channel: &GuildChannel) -> bool {
        self.guild
            .user_permissions_in(channel, member)
            .view_channel()
    }
}

pub struct NotificationDispatcher {
    http: Arc<Http>,
}

impl NotificationDispatcher {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Sends every delivery, best effort. Returns how many went out.
    pub async fn deliver(&self, fanout: FanOut<GuildChannel, Member, CreateEmbed>) -> usize {
        let mut sent = 0;
        for delivery in &fanout.deliveries {
            let recipients: Option<Vec<UserId>> = delivery
                .recipients
                .as_ref()
                .map(|members| members.iter().map(|m| m.user.id).collect());

            match self
                .send(&delivery.channel, recipients.as_deref(), fanout.payload.clone())
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => error!(
                    "Failed to deliver notification to channel {}: {}",
                    delivery.channel.id, e
                ),
            }
        }
        sent
    }

    async fn send(
        &self,
        channel: &GuildChannel,
        recipients: Option<&[UserId]>,
        embed: CreateEmbed,
    ) -> anyhow::Result<()> {
        let mut builder = CreateMessage::new().embed(embed);
        match recipients {
            Some(users) => {
                debug!(
                    "Dispatching alert to channel {} for {} recipient(s)",
                    channel.id,
                    users.len()
                );
                builder = builder
                    .content(mention_line(users))
                    .allowed_mentions(CreateAllowedMentions::new().users(users.to_vec()));
            }
            None => {
                debug!("Dispatching subscription forward to channel {}", channel.id);
                builder = builder.allowed_mentions(CreateAllowedMentions::new());
            }
        }

        channel.id.send_message(&self.http, builder).await?;
        Ok(())
    }
}

fn mention_line(users: &[UserId]) -> String {
    users
        .iter()
        .map(|id| format!("<@{}>", id))
        .collect::<Vec<_>>()
        .join(" ")
}
