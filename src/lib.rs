pub mod commands;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod render;
pub mod sighting;
pub mod watch;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub watch: Arc<watch::WatchState<db::Database>>,
    /// Bot's own user ID, used for channel permission checks
    pub bot_id: poise::serenity_prelude::UserId,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
