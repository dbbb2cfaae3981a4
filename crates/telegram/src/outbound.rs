use std::{future::Future, time::Duration};

use {
    anyhow::Result,
    async_trait::async_trait,
    teloxide::{
        RequestError,
        prelude::*,
        types::{ChatId, InputFile},
    },
    tracing::warn,
};

/// Outbound message sender, behind a trait so the delivery engine and
/// handlers can be tested without the Telegram API.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
    async fn send_video(&self, chat_id: i64, file_id: &str) -> Result<()>;
}

const RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Teloxide-backed sender honoring Telegram rate limiting.
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn run_with_retry<T, F, Fut>(
        &self,
        chat_id: i64,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id,
                            operation,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id,
                        operation,
                        retries,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let chat = ChatId(chat_id);
        self.run_with_retry(chat_id, "send message", || {
            let req = self.bot.send_message(chat, text);
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    async fn send_video(&self, chat_id: i64, file_id: &str) -> Result<()> {
        let chat = ChatId(chat_id);
        self.run_with_retry(chat_id, "send video", || {
            let req = self
                .bot
                .send_video(chat, InputFile::file_id(file_id.to_owned()));
            async move { req.await }
        })
        .await?;
        Ok(())
    }
}
