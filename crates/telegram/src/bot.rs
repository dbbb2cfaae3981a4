//! Bot startup and the long-polling update loop.

use std::sync::Arc;

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use batchlink_core::{BundleStore, ChannelStore, SessionStore};

use crate::{
    config::BotConfig,
    delivery::{DeliveryEngine, DeliveryPolicy},
    handlers::{self, HandlerContext},
    outbound::TelegramOutbound,
};

/// Start polling for updates.
///
/// Spawns a background task that processes updates until the returned
/// `CancellationToken` is cancelled.
pub async fn start_polling(
    config: BotConfig,
    sessions: Arc<dyn SessionStore>,
    bundles: Arc<dyn BundleStore>,
    channels: Arc<dyn ChannelStore>,
) -> anyhow::Result<CancellationToken> {
    // Build bot with a client timeout longer than the long-polling
    // timeout (30s) so the HTTP client doesn't abort the request before
    // Telegram responds.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(std::time::Duration::from_secs(45))
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    // Verify credentials; the username goes into share links.
    let me = bot.get_me().await?;
    let bot_user_id = me.id;
    let bot_username = me.username.clone().unwrap_or_else(|| {
        warn!("bot account has no username; share links will be incomplete");
        String::new()
    });

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    // Register slash commands for autocomplete in Telegram clients.
    let commands = vec![
        BotCommand::new("start", "Redeem a share link"),
        BotCommand::new("connect", "Connect a channel you administer"),
        BotCommand::new("set", "Start a new video batch"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = %bot_username, "telegram bot connected (webhook cleared)");

    let cancel = CancellationToken::new();
    let outbound = Arc::new(TelegramOutbound::new(bot.clone()));
    let delivery = DeliveryEngine::new(Arc::clone(&bundles), DeliveryPolicy {
        pause: std::time::Duration::from_secs(config.video_pause_secs),
    });

    let ctx = Arc::new(HandlerContext {
        bot: bot.clone(),
        bot_user_id,
        bot_username,
        sessions,
        bundles,
        channels,
        outbound,
        delivery,
    });

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            if cancel_clone.is_cancelled() {
                info!("telegram polling stopped");
                break;
            }

            let result = bot
                .get_updates()
                .offset(offset)
                .timeout(30)
                .allowed_updates(vec![AllowedUpdate::Message])
                .await;

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                debug!(chat_id = msg.chat.id.0, "received telegram message");
                                if let Err(e) = handlers::handle_message(&msg, &ctx).await {
                                    error!(error = %e, "error handling telegram message");
                                }
                            },
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                            },
                        }
                    }
                },
                Err(e) => {
                    // Another instance is polling with the same token.
                    let is_conflict =
                        matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates));
                    if is_conflict {
                        warn!(
                            "telegram polling stopped: another instance is already running with this token"
                        );
                        cancel_clone.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                },
            }
        }
    });

    Ok(cancel)
}
