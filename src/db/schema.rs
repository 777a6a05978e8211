/// Durable watch tables. Keys mirror the in-memory indexes one to one.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS alert_requests (
        user_id INTEGER NOT NULL,
        guild_id INTEGER NOT NULL,
        requester_id INTEGER NOT NULL,
        channel_id INTEGER NOT NULL,
        PRIMARY KEY (user_id, guild_id, requester_id)
    );

    CREATE TABLE IF NOT EXISTS subscriptions (
        user_id INTEGER NOT NULL,
        guild_id INTEGER NOT NULL,
        PRIMARY KEY (user_id, guild_id)
    );

    CREATE TABLE IF NOT EXISTS guild_subscription_configs (
        guild_id INTEGER PRIMARY KEY,
        subscription_channel_id INTEGER NOT NULL
    );
";
