use super::{AlertKey, AlertRequest, GuildSubscriptionConfig, Subscription, WatchSnapshot};
use crate::db::{AlertRequestRow, Database};
use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use std::num::NonZeroU64;

/// Durable storage behind [`WatchState`](super::WatchState).
///
/// Each call is a single-row write that either commits or fails; there is no
/// batching or transaction spanning calls.
#[async_trait]
pub trait WatchStore: Send + Sync + 'static {
    async fn load_all(&self) -> anyhow::Result<WatchSnapshot>;

    async fn insert_alert_request(&self, request: AlertRequest) -> anyhow::Result<()>;
    async fn update_alert_request(&self, request: AlertRequest) -> anyhow::Result<()>;
    async fn delete_alert_request(&self, key: AlertKey) -> anyhow::Result<()>;

    async fn insert_subscription(&self, subscription: Subscription) -> anyhow::Result<()>;
    async fn delete_subscription(&self, subscription: Subscription) -> anyhow::Result<()>;

    async fn insert_guild_config(&self, config: GuildSubscriptionConfig) -> anyhow::Result<()>;
    async fn update_guild_config(&self, config: GuildSubscriptionConfig) -> anyhow::Result<()>;
}

fn snowflake<T: From<NonZeroU64>>(raw: u64, column: &str) -> anyhow::Result<T> {
    NonZeroU64::new(raw)
        .map(T::from)
        .ok_or_else(|| anyhow::anyhow!("stored {} is zero", column))
}

fn to_row(request: &AlertRequest) -> AlertRequestRow {
    AlertRequestRow {
        user_id: request.user_id.get(),
        guild_id: request.guild_id.get(),
        requester_id: request.requester_id.get(),
        channel_id: request.channel_id.get(),
    }
}

#[async_trait]
impl WatchStore for Database {
    async fn load_all(&self) -> anyhow::Result<WatchSnapshot> {
        self.run_blocking(|db| {
            db.execute_init()?;

            let mut snapshot = WatchSnapshot::default();
            for row in db.list_alert_requests()? {
                snapshot.alert_requests.push(AlertRequest {
                    user_id: snowflake::<UserId>(row.user_id, "alert user_id")?,
                    guild_id: snowflake::<GuildId>(row.guild_id, "alert guild_id")?,
                    requester_id: snowflake::<UserId>(row.requester_id, "alert requester_id")?,
                    channel_id: snowflake::<ChannelId>(row.channel_id, "alert channel_id")?,
                });
            }
            for row in db.list_subscriptions()? {
                snapshot.subscriptions.push(Subscription {
                    user_id: snowflake::<UserId>(row.user_id, "subscription user_id")?,
                    guild_id: snowflake::<GuildId>(row.guild_id, "subscription guild_id")?,
                });
            }
            for row in db.list_guild_subscription_configs()? {
                snapshot.guild_configs.push(GuildSubscriptionConfig {
                    guild_id: snowflake::<GuildId>(row.guild_id, "config guild_id")?,
                    channel_id: snowflake::<ChannelId>(
                        row.subscription_channel_id,
                        "config subscription_channel_id",
                    )?,
                });
            }
            Ok(snapshot)
        })
        .await
    }

    async fn insert_alert_request(&self, request: AlertRequest) -> anyhow::Result<()> {
        let row = to_row(&request);
        self.run_blocking(move |db| db.insert_alert_request(&row)).await
    }

    async fn update_alert_request(&self, request: AlertRequest) -> anyhow::Result<()> {
        let row = to_row(&request);
        let changed = self
            .run_blocking(move |db| db.update_alert_request(&row))
            .await?;
        if changed == 0 {
            anyhow::bail!("no stored row to update");
        }
        Ok(())
    }

    async fn delete_alert_request(&self, key: AlertKey) -> anyhow::Result<()> {
        self.run_blocking(move |db| {
            db.delete_alert_request(key.user_id.get(), key.guild_id.get(), key.requester_id.get())
        })
        .await?;
        Ok(())
    }

    async fn insert_subscription(&self, subscription: Subscription) -> anyhow::Result<()> {
        self.run_blocking(move |db| {
            db.insert_subscription(subscription.user_id.get(), subscription.guild_id.get())
        })
        .await
    }

    async fn delete_subscription(&self, subscription: Subscription) -> anyhow::Result<()> {
        self.run_blocking(move |db| {
            db.delete_subscription(subscription.user_id.get(), subscription.guild_id.get())
        })
        .await?;
        Ok(())
    }

    async fn insert_guild_config(&self, config: GuildSubscriptionConfig) -> anyhow::Result<()> {
        self.run_blocking(move |db| {
            db.insert_guild_subscription_config(config.guild_id.get(), config.channel_id.get())
        })
        .await
    }

    async fn update_guild_config(&self, config: GuildSubscriptionConfig) -> anyhow::Result<()> {
        let changed = self
            .run_blocking(move |db| {
                db.update_guild_subscription_config(config.guild_id.get(), config.channel_id.get())
            })
            .await?;
        if changed == 0 {
            anyhow::bail!("no stored row to update");
        }
        Ok(())
    }
}

/// In-memory store for engine tests.
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct Rows {
        pub alerts: HashMap<AlertKey, ChannelId>,
        pub subscriptions: HashSet<Subscription>,
        pub guild_configs: HashMap<GuildId, ChannelId>,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub rows: Mutex<Rows>,
        pub fail_writes: AtomicBool,
        pub writes: AtomicUsize,
    }

    impl MemoryStore {
        pub fn with_snapshot(snapshot: &WatchSnapshot) -> Self {
            let store = Self::default();
            {
                let mut rows = store.rows.lock().unwrap();
                for r in &snapshot.alert_requests {
                    rows.alerts.insert(r.key(), r.channel_id);
                }
                rows.subscriptions.extend(snapshot.subscriptions.iter().copied());
                for c in &snapshot.guild_configs {
                    rows.guild_configs.insert(c.guild_id, c.channel_id);
                }
            }
            store
        }

        pub fn set_failing(&self, failing: bool) {
            self.fail_writes.store(failing, Ordering::SeqCst);
        }

        pub fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        /// Yields first so concurrent callers get a chance to interleave.
        async fn write<T>(&self, f: impl FnOnce(&mut Rows) -> anyhow::Result<T>) -> anyhow::Result<T> {
            tokio::task::yield_now().await;
            if self.fail_writes.load(Ordering::SeqCst) {
                anyhow::bail!("store unavailable");
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap();
            f(&mut rows)
        }
    }

    #[async_trait]
    impl WatchStore for MemoryStore {
        async fn load_all(&self) -> anyhow::Result<WatchSnapshot> {
            let rows = self.rows.lock().unwrap();
            Ok(WatchSnapshot {
                alert_requests: rows
                    .alerts
                    .iter()
                    .map(|(key, channel_id)| AlertRequest {
                        user_id: key.user_id,
                        guild_id: key.guild_id,
                        requester_id: key.requester_id,
                        channel_id: *channel_id,
                    })
                    .collect(),
                subscriptions: rows.subscriptions.iter().copied().collect(),
                guild_configs: rows
                    .guild_configs
                    .iter()
                    .map(|(guild_id, channel_id)| GuildSubscriptionConfig {
                        guild_id: *guild_id,
                        channel_id: *channel_id,
                    })
                    .collect(),
            })
        }

        async fn insert_alert_request(&self, request: AlertRequest) -> anyhow::Result<()> {
            self.write(|rows| {
                if rows.alerts.insert(request.key(), request.channel_id).is_some() {
                    anyhow::bail!("duplicate alert row");
                }
                Ok(())
            })
            .await
        }

        async fn update_alert_request(&self, request: AlertRequest) -> anyhow::Result<()> {
            self.write(|rows| match rows.alerts.get_mut(&request.key()) {
                Some(channel) => {
                    *channel = request.channel_id;
                    Ok(())
                }
                None => anyhow::bail!("no alert row to update"),
            })
            .await
        }

        async fn delete_alert_request(&self, key: AlertKey) -> anyhow::Result<()> {
            self.write(|rows| {
                rows.alerts.remove(&key);
                Ok(())
            })
            .await
        }

        async fn insert_subscription(&self, subscription: Subscription) -> anyhow::Result<()> {
            self.write(|rows| {
                if !rows.subscriptions.insert(subscription) {
                    anyhow::bail!("duplicate subscription row");
                }
                Ok(())
            })
            .await
        }

        async fn delete_subscription(&self, subscription: Subscription) -> anyhow::Result<()> {
            self.write(|rows| {
                rows.subscriptions.remove(&subscription);
                Ok(())
            })
            .await
        }

        async fn insert_guild_config(&self, config: GuildSubscriptionConfig) -> anyhow::Result<()> {
            self.write(|rows| {
                if rows.guild_configs.insert(config.guild_id, config.channel_id).is_some() {
                    anyhow::bail!("duplicate guild config row");
                }
                Ok(())
            })
            .await
        }

        async fn update_guild_config(&self, config: GuildSubscriptionConfig) -> anyhow::Result<()> {
            self.write(|rows| match rows.guild_configs.get_mut(&config.guild_id) {
                Some(channel) => {
                    *channel = config.channel_id;
                    Ok(())
                }
                None => anyhow::bail!("no guild config row to update"),
            })
            .await
        }
    }
}
