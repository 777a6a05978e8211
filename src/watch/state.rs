use super::{
    AlertRequest, GuildSubscriptionConfig, Outcome, Subscription, WatchError, WatchIndex,
    WatchStore,
};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// What the engine needs to know about a guild at the moment of a sighting.
///
/// Implemented by the dispatcher over the platform cache, and by fakes in tests.
pub trait GuildScope {
    type Channel;
    type Member;

    fn channel(&self, id: ChannelId) -> Option<Self::Channel>;
    fn member(&self, id: UserId) -> Option<Self::Member>;
    /// The bot can post (with embeds) in this channel.
    fn is_usable(&self, channel: &Self::Channel) -> bool;
    fn can_read(&self, member: &Self::Member, channel: &Self::Channel) -> bool;
}

/// One message to send. `recipients` is `None` for a subscription broadcast,
/// `Some` for an alert that mentions each recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<C, M> {
    pub channel: C,
    pub recipients: Option<Vec<M>>,
}

/// Deliveries for one sighting, all sharing a single rendered payload.
#[derive(Debug)]
pub struct FanOut<C, M, P> {
    pub payload: P,
    pub deliveries: Vec<Delivery<C, M>>,
}

#[derive(Debug)]
pub struct Sighting<C, M, P> {
    pub fanout: Option<FanOut<C, M, P>>,
    /// Requesters whose one-shot alert was consumed by this sighting.
    pub expired: Vec<UserId>,
    /// Alerts that matched but could not be deleted from the store. They stay registered.
    pub failed_expiries: Vec<(UserId, WatchError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchStats {
    pub alert_requests: usize,
    pub subscriptions: usize,
    pub guild_configs: usize,
}

/// Watch state engine. The index lock is held across each store write and the
/// memory commit that follows it, so mutations never interleave.
pub struct WatchState<S> {
    store: S,
    index: Mutex<WatchIndex>,
}

impl<S: WatchStore> WatchState<S> {
    pub async fn load(store: S) -> Result<Self, WatchError> {
        let snapshot = store.load_all().await.map_err(WatchError::Load)?;
        let index = WatchIndex::from_snapshot(snapshot);

        info!(
            "Watch state initialized: {} alert requests, {} subscriptions and {} guild configs",
            index.alert_count(),
            index.subscription_count(),
            index.guild_channel_count()
        );

        Ok(Self {
            store,
            index: Mutex::new(index),
        })
    }

    pub async fn stats(&self) -> WatchStats {
        let index = self.index.lock().await;
        WatchStats {
            alert_requests: index.alert_count(),
            subscriptions: index.subscription_count(),
            guild_configs: index.guild_channel_count(),
        }
    }

    pub async fn is_watched(&self, user_id: UserId, guild_id: GuildId) -> bool {
        self.index.lock().await.is_watched(user_id, guild_id)
    }

    /// Everyone holding an alert on `user_id` in `guild_id`, in id order.
    pub async fn alert_requesters(&self, user_id: UserId, guild_id: GuildId) -> Vec<UserId> {
        let mut requesters: Vec<UserId> = self
            .index
            .lock()
            .await
            .alert_groups(user_id, guild_id)
            .into_values()
            .flatten()
            .collect();
        requesters.sort();
        requesters
    }

    // --- Alert requests ---

    /// `Updated` carries the channel the alert pointed at before this call.
    pub async fn add_alert_request(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        requester_id: UserId,
        channel_id: ChannelId,
    ) -> Result<Outcome<ChannelId>, WatchError> {
        let request = AlertRequest {
            user_id,
            guild_id,
            requester_id,
            channel_id,
        };
        let mut index = self.index.lock().await;

        match index.alert_channel(user_id, guild_id, requester_id) {
            Some(previous) => {
                self.store
                    .update_alert_request(request)
                    .await
                    .map_err(|e| WatchError::store("update alert request", request.key(), e))?;
                index.insert_alert(request);
                Ok(Outcome::Updated(previous))
            }
            None => {
                self.store
                    .insert_alert_request(request)
                    .await
                    .map_err(|e| WatchError::store("insert alert request", request.key(), e))?;
                index.insert_alert(request);
                Ok(Outcome::Inserted)
            }
        }
    }

    pub async fn remove_alert_request(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        requester_id: UserId,
    ) -> Result<Outcome, WatchError> {
        let mut index = self.index.lock().await;
        self.remove_alert_locked(&mut index, user_id, guild_id, requester_id)
            .await
    }

    async fn remove_alert_locked(
        &self,
        index: &mut WatchIndex,
        user_id: UserId,
        guild_id: GuildId,
        requester_id: UserId,
    ) -> Result<Outcome, WatchError> {
        if index.alert_channel(user_id, guild_id, requester_id).is_none() {
            return Ok(Outcome::NotFound);
        }

        let key = super::AlertKey {
            user_id,
            guild_id,
            requester_id,
        };
        self.store
            .delete_alert_request(key)
            .await
            .map_err(|e| WatchError::store("delete alert request", key, e))?;
        index.remove_alert(user_id, guild_id, requester_id);
        Ok(Outcome::Success)
    }

    // --- Subscriptions ---

    pub async fn add_subscription(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Outcome, WatchError> {
        let subscription = Subscription { user_id, guild_id };
        let mut index = self.index.lock().await;

        if index.is_subscribed(user_id, guild_id) {
            return Ok(Outcome::Updated(()));
        }

        self.store
            .insert_subscription(subscription)
            .await
            .map_err(|e| WatchError::store("insert subscription", subscription, e))?;
        index.insert_subscription(subscription);
        Ok(Outcome::Inserted)
    }

    pub async fn remove_subscription(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Outcome, WatchError> {
        let subscription = Subscription { user_id, guild_id };
        let mut index = self.index.lock().await;

        if !index.is_subscribed(user_id, guild_id) {
            return Ok(Outcome::NotFound);
        }

        self.store
            .delete_subscription(subscription)
            .await
            .map_err(|e| WatchError::store("delete subscription", subscription, e))?;
        index.remove_subscription(subscription);
        Ok(Outcome::Success)
    }

    // --- Guild subscription channel ---

    /// `Updated` carries the previously configured channel.
    pub async fn set_guild_subscription_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Outcome<ChannelId>, WatchError> {
        let config = GuildSubscriptionConfig {
            guild_id,
            channel_id,
        };
        let mut index = self.index.lock().await;
        let previous = index.guild_channel(guild_id);

        let written = match previous {
            Some(_) => self.store.update_guild_config(config).await,
            None => self.store.insert_guild_config(config).await,
        };
        written.map_err(|e| {
            WatchError::store(
                "set guild subscription channel",
                format_args!("guild {}", guild_id),
                e,
            )
        })?;
        index.set_guild_channel(guild_id, channel_id);

        Ok(match previous {
            Some(previous) => Outcome::Updated(previous),
            None => Outcome::Inserted,
        })
    }

    pub async fn get_guild_subscription_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.index.lock().await.guild_channel(guild_id)
    }

    // --- Fan-out ---

    /// Works out who to notify about `speaker` talking in `guild_id`, then
    /// consumes every matching one-shot alert.
    ///
    /// Alerts are consumed whether or not their channel or requesters passed
    /// the scope checks: each registration fires at most once. `render` runs
    /// only if at least one delivery survived filtering.
    pub async fn handle_sighting<G, P, F>(
        &self,
        speaker: UserId,
        guild_id: GuildId,
        scope: &G,
        render: F,
    ) -> Sighting<G::Channel, G::Member, P>
    where
        G: GuildScope + Sync,
        G::Channel: Send,
        G::Member: Send,
        F: FnOnce() -> P + Send,
        P: Send,
    {
        let mut index = self.index.lock().await;

        let groups = index.alert_groups(speaker, guild_id);
        let mut deliveries = Vec::new();

        if index.is_subscribed(speaker, guild_id) {
            let channel = index
                .guild_channel(guild_id)
                .and_then(|id| scope.channel(id))
                .filter(|channel| scope.is_usable(channel));
            match channel {
                Some(channel) => deliveries.push(Delivery {
                    channel,
                    recipients: None,
                }),
                None => warn!(
                    "No usable subscription channel in guild {} for user {}",
                    guild_id, speaker
                ),
            }
        }

        for (channel_id, requesters) in &groups {
            let Some(channel) = scope.channel(*channel_id).filter(|c| scope.is_usable(c)) else {
                warn!("Alert channel {} in guild {} is not usable", channel_id, guild_id);
                continue;
            };
            let recipients: Vec<_> = requesters
                .iter()
                .filter_map(|id| scope.member(*id))
                .filter(|member| scope.can_read(member, &channel))
                .collect();
            if recipients.is_empty() {
                continue;
            }
            deliveries.push(Delivery {
                channel,
                recipients: Some(recipients),
            });
        }

        let fanout = if deliveries.is_empty() {
            None
        } else {
            Some(FanOut {
                payload: render(),
                deliveries,
            })
        };

        let mut expired = Vec::new();
        let mut failed_expiries = Vec::new();
        for requester in groups.into_values().flatten() {
            match self
                .remove_alert_locked(&mut index, speaker, guild_id, requester)
                .await
            {
                Ok(_) => expired.push(requester),
                Err(e) => failed_expiries.push((requester, e)),
            }
        }

        Sighting {
            fanout,
            expired,
            failed_expiries,
        }
    }

    #[cfg(test)]
    pub(crate) async fn with_index<T>(&self, f: impl FnOnce(&WatchIndex) -> T) -> T {
        f(&*self.index.lock().await)
    }
}
