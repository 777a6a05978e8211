//! In-memory watch state mirroring the durable store.
//!
//! [`WatchState`] owns three projections (alert index, subscription set and
//! guild channel map), loads them once from a [`WatchStore`] and keeps them in
//! step with it: every mutation writes the store first and commits to memory
//! only once that write succeeded.

use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::fmt;
use thiserror::Error;

pub mod index;
pub mod state;
pub mod store;

pub use index::WatchIndex;
pub use state::{Delivery, FanOut, GuildScope, Sighting, WatchState, WatchStats};
pub use store::WatchStore;

/// Result of a watch mutation. Callers only use it to phrase their reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T = ()> {
    Inserted,
    /// The record already existed. Carries the previous value where one exists.
    Updated(T),
    Success,
    NotFound,
}

/// `requester` wants a ping in `channel_id` the next time `user_id` speaks in `guild_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlertRequest {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub requester_id: UserId,
    pub channel_id: ChannelId,
}

impl AlertRequest {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            user_id: self.user_id,
            guild_id: self.guild_id,
            requester_id: self.requester_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub requester_id: UserId,
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alert on user {} in guild {} for {}",
            self.user_id, self.guild_id, self.requester_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub user_id: UserId,
    pub guild_id: GuildId,
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subscription to user {} in guild {}",
            self.user_id, self.guild_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildSubscriptionConfig {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Everything the store holds, as read once at startup.
#[derive(Debug, Clone, Default)]
pub struct WatchSnapshot {
    pub alert_requests: Vec<AlertRequest>,
    pub subscriptions: Vec<Subscription>,
    pub guild_configs: Vec<GuildSubscriptionConfig>,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to load watch state: {0}")]
    Load(#[source] anyhow::Error),

    /// The store rejected a write. In-memory state was left untouched.
    #[error("store failed to {op} ({key}): {source}")]
    Store {
        op: &'static str,
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl WatchError {
    pub(crate) fn store(op: &'static str, key: impl fmt::Display, source: anyhow::Error) -> Self {
        WatchError::Store {
            op,
            key: key.to_string(),
            source,
        }
    }
}
