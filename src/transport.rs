use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, MessageEntityKind, UpdateKind};
use tokio::sync::mpsc;

use crate::dispatcher::{Transport, Update};

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[async_trait]
impl Transport for Bot {
    async fn send_reply(&self, chat_id: ChatId, text: String) -> Result<()> {
        self.send_message(chat_id, text).await?;
        Ok(())
    }
}

/// Long-polls Telegram and feeds every received update into `updates`.
///
/// Returns once the receiving side of the queue is gone.
pub async fn receive_updates(bot: Bot, timeout: u32, updates: mpsc::UnboundedSender<Update>) {
    let mut offset = 0;
    loop {
        let batch = bot
            .get_updates()
            .offset(offset)
            .timeout(timeout)
            .allowed_updates([AllowedUpdate::Message])
            .await;

        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("failed to receive updates: {e}");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in batch {
            offset = update.id.as_offset();
            if updates.send(Update::from(update)).is_err() {
                tracing::info!("update queue closed");
                return;
            }
        }
    }
}

impl From<teloxide::types::Update> for Update {
    fn from(update: teloxide::types::Update) -> Self {
        match update.kind {
            UpdateKind::Message(message) => Self::from(&message),
            _ => Self {
                chat_id: None,
                text: None,
                is_command: false,
            },
        }
    }
}

impl From<&Message> for Update {
    fn from(message: &Message) -> Self {
        let is_command = message.entities().is_some_and(|entities| {
            entities
                .iter()
                .any(|e| e.offset == 0 && matches!(e.kind, MessageEntityKind::BotCommand))
        });

        Self {
            chat_id: Some(message.chat.id),
            text: message.text().map(str::to_owned),
            is_command,
        }
    }
}
