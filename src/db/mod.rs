use crate::config::Config;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

pub mod schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertRequestRow {
    pub user_id: u64,
    pub guild_id: u64,
    pub requester_id: u64,
    pub channel_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionRow {
    pub user_id: u64,
    pub guild_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildSubscriptionConfigRow {
    pub guild_id: u64,
    pub subscription_channel_id: u64,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))
    }

    /// Run a synchronous database call on the blocking pool.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    // --- Alert requests ---

    pub fn list_alert_requests(&self) -> anyhow::Result<Vec<AlertRequestRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, guild_id, requester_id, channel_id FROM alert_requests",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AlertRequestRow {
                user_id: row.get(0)?,
                guild_id: row.get(1)?,
                requester_id: row.get(2)?,
                channel_id: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn insert_alert_request(&self, row: &AlertRequestRow) -> anyhow::Result<()> {
        debug!(
            "Database: Inserting alert request on user {} in guild {} for {}",
            row.user_id, row.guild_id, row.requester_id
        );
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alert_requests (user_id, guild_id, requester_id, channel_id)
             VALUES (?1, ?2, ?3, ?4)",
            (row.user_id, row.guild_id, row.requester_id, row.channel_id),
        )?;
        Ok(())
    }

    /// Returns the number of rows changed (0 when the key is absent).
    pub fn update_alert_request(&self, row: &AlertRequestRow) -> anyhow::Result<usize> {
        debug!(
            "Database: Moving alert request on user {} in guild {} for {} to channel {}",
            row.user_id, row.guild_id, row.requester_id, row.channel_id
        );
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE alert_requests SET channel_id = ?1
             WHERE user_id = ?2 AND guild_id = ?3 AND requester_id = ?4",
            (row.channel_id, row.user_id, row.guild_id, row.requester_id),
        )?;
        Ok(count)
    }

    pub fn delete_alert_request(
        &self,
        user_id: u64,
        guild_id: u64,
        requester_id: u64,
    ) -> anyhow::Result<usize> {
        debug!(
            "Database: Deleting alert request on user {} in guild {} for {}",
            user_id, guild_id, requester_id
        );
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM alert_requests
             WHERE user_id = ?1 AND guild_id = ?2 AND requester_id = ?3",
            (user_id, guild_id, requester_id),
        )?;
        Ok(count)
    }

    // --- Subscriptions ---

    pub fn list_subscriptions(&self) -> anyhow::Result<Vec<SubscriptionRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id, guild_id FROM subscriptions")?;
        let rows = stmt.query_map([], |row| {
            Ok(SubscriptionRow {
                user_id: row.get(0)?,
                guild_id: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn insert_subscription(&self, user_id: u64, guild_id: u64) -> anyhow::Result<()> {
        debug!("Database: Subscribing to user {} in guild {}", user_id, guild_id);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO subscriptions (user_id, guild_id) VALUES (?1, ?2)",
            (user_id, guild_id),
        )?;
        Ok(())
    }

    pub fn delete_subscription(&self, user_id: u64, guild_id: u64) -> anyhow::Result<usize> {
        debug!("Database: Unsubscribing from user {} in guild {}", user_id, guild_id);
        let conn = self.conn()?;
        let count = conn.execute(
            "DELETE FROM subscriptions WHERE user_id = ?1 AND guild_id = ?2",
            (user_id, guild_id),
        )?;
        Ok(count)
    }

    // --- Guild subscription configs ---

    pub fn list_guild_subscription_configs(
        &self,
    ) -> anyhow::Result<Vec<GuildSubscriptionConfigRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT guild_id, subscription_channel_id FROM guild_subscription_configs",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(GuildSubscriptionConfigRow {
                guild_id: row.get(0)?,
                subscription_channel_id: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn insert_guild_subscription_config(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> anyhow::Result<()> {
        debug!(
            "Database: Setting subscription channel {} for guild {}",
            channel_id, guild_id
        );
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO guild_subscription_configs (guild_id, subscription_channel_id)
             VALUES (?1, ?2)",
            (guild_id, channel_id),
        )?;
        Ok(())
    }

    pub fn update_guild_subscription_config(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> anyhow::Result<usize> {
        debug!(
            "Database: Moving subscription channel for guild {} to {}",
            guild_id, channel_id
        );
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE guild_subscription_configs SET subscription_channel_id = ?1
             WHERE guild_id = ?2",
            (channel_id, guild_id),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        Config {
            discord_token: "test".to_string(),
            database_url: ":memory:".to_string(),
            status_message: "test".to_string(),
            dev_guild_id: None,
        }
    }

    fn test_db() -> Database {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_db_init_is_idempotent() {
        let db = test_db();
        db.execute_init().unwrap();

        assert!(db.list_alert_requests().unwrap().is_empty());
        assert!(db.list_subscriptions().unwrap().is_empty());
        assert!(db.list_guild_subscription_configs().unwrap().is_empty());
    }

    #[test]
    fn test_alert_request_crud() {
        let db = test_db();
        let row = AlertRequestRow {
            user_id: 10,
            guild_id: 20,
            requester_id: 30,
            channel_id: 40,
        };

        db.insert_alert_request(&row).unwrap();
        assert_eq!(db.list_alert_requests().unwrap(), vec![row]);

        // Duplicate key is rejected by the primary key
        assert!(db.insert_alert_request(&row).is_err());

        // Update only moves the channel, keyed by (user, guild, requester)
        let moved = AlertRequestRow { channel_id: 41, ..row };
        assert_eq!(db.update_alert_request(&moved).unwrap(), 1);
        assert_eq!(db.list_alert_requests().unwrap(), vec![moved]);

        assert_eq!(db.delete_alert_request(10, 20, 30).unwrap(), 1);
        assert_eq!(db.delete_alert_request(10, 20, 30).unwrap(), 0);
        assert!(db.list_alert_requests().unwrap().is_empty());
    }

    #[test]
    fn test_update_does_not_touch_other_requesters() {
        let db = test_db();
        let a = AlertRequestRow {
            user_id: 1,
            guild_id: 2,
            requester_id: 3,
            channel_id: 4,
        };
        let b = AlertRequestRow { requester_id: 5, ..a };
        db.insert_alert_request(&a).unwrap();
        db.insert_alert_request(&b).unwrap();

        db.update_alert_request(&AlertRequestRow { channel_id: 9, ..a })
            .unwrap();

        let rows = db.list_alert_requests().unwrap();
        let b_row = rows.iter().find(|r| r.requester_id == 5).unwrap();
        assert_eq!(b_row.channel_id, 4);
    }

    #[test]
    fn test_subscription_crud() {
        let db = test_db();
        db.insert_subscription(7, 8).unwrap();
        assert!(db.insert_subscription(7, 8).is_err());
        assert_eq!(
            db.list_subscriptions().unwrap(),
            vec![SubscriptionRow {
                user_id: 7,
                guild_id: 8
            }]
        );

        assert_eq!(db.delete_subscription(7, 8).unwrap(), 1);
        assert_eq!(db.delete_subscription(7, 8).unwrap(), 0);
    }

    #[test]
    fn test_guild_config_crud() {
        let db = test_db();
        db.insert_guild_subscription_config(100, 200).unwrap();
        assert_eq!(db.update_guild_subscription_config(100, 201).unwrap(), 1);
        assert_eq!(db.update_guild_subscription_config(999, 1).unwrap(), 0);

        let configs = db.list_guild_subscription_configs().unwrap();
        assert_eq!(
            configs,
            vec![GuildSubscriptionConfigRow {
                guild_id: 100,
                subscription_channel_id: 201
            }]
        );
    }

    #[test]
    fn test_large_snowflakes_survive() {
        let db = test_db();
        let snowflake = 1_234_567_890_123_456_789u64;
        db.insert_subscription(snowflake, snowflake + 1).unwrap();

        let rows = db.list_subscriptions().unwrap();
        assert_eq!(rows[0].user_id, snowflake);
        assert_eq!(rows[0].guild_id, snowflake + 1);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_db();
        db.run_blocking(|db| db.insert_subscription(1, 2)).await.unwrap();
        let rows = db.run_blocking(|db| db.list_subscriptions()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
