use super::{AlertRequest, Subscription, WatchSnapshot};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// The three in-memory projections. Synchronous and store-agnostic; callers
/// are responsible for keeping it in step with the durable store.
#[derive(Debug, Default)]
pub struct WatchIndex {
    /// (watched user, guild) -> requester -> destination channel
    alerts: HashMap<(UserId, GuildId), HashMap<UserId, ChannelId>>,
    subscriptions: HashSet<(UserId, GuildId)>,
    guild_channels: HashMap<GuildId, ChannelId>,
}

impl WatchIndex {
    pub fn from_snapshot(snapshot: WatchSnapshot) -> Self {
        let mut index = Self::default();
        for request in snapshot.alert_requests {
            index.insert_alert(request);
        }
        for subscription in snapshot.subscriptions {
            index.insert_subscription(subscription);
        }
        for config in snapshot.guild_configs {
            index.set_guild_channel(config.guild_id, config.channel_id);
        }
        index
    }

    // --- Alerts ---

    pub fn alert_channel(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        requester_id: UserId,
    ) -> Option<ChannelId> {
        self.alerts
            .get(&(user_id, guild_id))
            .and_then(|bucket| bucket.get(&requester_id))
            .copied()
    }

    /// Returns the channel previously registered for this requester, if any.
    pub fn insert_alert(&mut self, request: AlertRequest) -> Option<ChannelId> {
        self.alerts
            .entry((request.user_id, request.guild_id))
            .or_default()
            .insert(request.requester_id, request.channel_id)
    }

    /// Removes one requester's alert and drops the bucket once it is empty.
    pub fn remove_alert(
        &mut self,
        user_id: UserId,
        guild_id: GuildId,
        requester_id: UserId,
    ) -> Option<ChannelId> {
        let pair = (user_id, guild_id);
        let bucket = self.alerts.get_mut(&pair)?;
        let removed = bucket.remove(&requester_id);
        if bucket.is_empty() {
            self.alerts.remove(&pair);
        }
        removed
    }

    /// Requesters watching `user_id` in `guild_id`, grouped by destination channel.
    /// Both levels are ordered by id.
    pub fn alert_groups(&self, user_id: UserId, guild_id: GuildId) -> BTreeMap<ChannelId, Vec<UserId>> {
        let mut groups: BTreeMap<ChannelId, Vec<UserId>> = BTreeMap::new();
        if let Some(bucket) = self.alerts.get(&(user_id, guild_id)) {
            for (requester, channel) in bucket {
                groups.entry(*channel).or_default().push(*requester);
            }
        }
        for requesters in groups.values_mut() {
            requesters.sort();
        }
        groups
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.values().map(HashMap::len).sum()
    }

    pub fn has_alert_bucket(&self, user_id: UserId, guild_id: GuildId) -> bool {
        self.alerts.contains_key(&(user_id, guild_id))
    }

    // --- Subscriptions ---

    pub fn is_subscribed(&self, user_id: UserId, guild_id: GuildId) -> bool {
        self.subscriptions.contains(&(user_id, guild_id))
    }

    /// Returns false if the pair was already present.
    pub fn insert_subscription(&mut self, subscription: Subscription) -> bool {
        self.subscriptions
            .insert((subscription.user_id, subscription.guild_id))
    }

    pub fn remove_subscription(&mut self, subscription: Subscription) -> bool {
        self.subscriptions
            .remove(&(subscription.user_id, subscription.guild_id))
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    // --- Guild subscription channels ---

    pub fn guild_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.guild_channels.get(&guild_id).copied()
    }

    pub fn set_guild_channel(&mut self, guild_id: GuildId, channel_id: ChannelId) -> Option<ChannelId> {
        self.guild_channels.insert(guild_id, channel_id)
    }

    pub fn guild_channel_count(&self) -> usize {
        self.guild_channels.len()
    }

    pub fn is_watched(&self, user_id: UserId, guild_id: GuildId) -> bool {
        self.has_alert_bucket(user_id, guild_id) || self.is_subscribed(user_id, guild_id)
    }

    #[cfg(test)]
    pub(crate) fn bucket_count(&self) -> usize {
        self.alerts.len()
    }
}
