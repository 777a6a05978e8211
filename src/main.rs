use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};
use userwatch::commands::{self, alert, subscription};
use userwatch::db::Database;
use userwatch::watch::WatchState;
use userwatch::{config::Config, sighting, Data};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![alert::alert(), subscription::subscription()],
            on_error: |err| Box::pin(commands::on_error(err)),
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    match event {
                        serenity::FullEvent::GuildCreate { guild, .. } => {
                            // Fill the member cache so alert requesters resolve locally
                            ctx.shard.chunk_guild(
                                guild.id,
                                None,
                                false,
                                serenity::ChunkGuildFilter::None,
                                None,
                            );
                            info!("Requested member chunks for guild {}", guild.id);
                        }
                        serenity::FullEvent::Message { new_message } => {
                            if let Err(e) = sighting::handle_sighting(ctx, new_message, data).await {
                                error!("Failed to handle message {}: {}", new_message.id, e);
                            }
                        }
                        _ => {}
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);

                let commands = &framework.options().commands;
                match config.dev_guild_id {
                    Some(guild_id) => {
                        let guild_id = serenity::GuildId::new(guild_id);
                        poise::builtins::register_in_guild(ctx, commands, guild_id).await?;
                        info!("Registered commands in guild {}", guild_id);
                    }
                    None => poise::builtins::register_globally(ctx, commands).await?,
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let db = Database::new(&config)?;
                let watch = WatchState::load(db).await?;

                Ok(Data {
                    config,
                    watch: Arc::new(watch),
                    bot_id: ready.user.id,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
