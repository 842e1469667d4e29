use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::ChatId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::commands::parse_command;
use crate::handlers::Handler;

/// One inbound event as seen by the workers.
///
/// `chat_id` and `text` are `None` for updates that carry no text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub chat_id: Option<ChatId>,
    pub text: Option<String>,
    pub is_command: bool,
}

pub type UpdateReceiver = mpsc::UnboundedReceiver<Update>;

/// Outbound side of the messaging transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_reply(&self, chat_id: ChatId, text: String) -> Result<()>;
}

pub struct Dispatcher<T> {
    workers: usize,
    handler: Arc<Handler>,
    transport: Arc<T>,
}

impl<T: Transport + 'static> Dispatcher<T> {
    pub fn new(workers: usize, handler: Arc<Handler>, transport: Arc<T>) -> Self {
        Self {
            workers,
            handler,
            transport,
        }
    }

    /// Runs the worker pool until `updates` is closed and drained.
    pub async fn run(self, updates: UpdateReceiver) {
        let updates = Arc::new(Mutex::new(updates));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            workers.spawn(worker(
                worker_id,
                updates.clone(),
                self.handler.clone(),
                self.transport.clone(),
            ));
        }
        tracing::info!(workers = self.workers, "dispatcher started");

        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                tracing::error!("worker failed: {e}");
            }
        }
        tracing::info!("dispatcher stopped");
    }
}

async fn worker<T: Transport>(
    worker_id: usize,
    updates: Arc<Mutex<UpdateReceiver>>,
    handler: Arc<Handler>,
    transport: Arc<T>,
) {
    loop {
        let update = updates.lock().await.recv().await;
        let Some(update) = update else {
            break;
        };

        let (Some(chat_id), Some(text)) = (update.chat_id, update.text) else {
            tracing::debug!(worker_id, "skipping update without a text message");
            continue;
        };
        if !update.is_command {
            tracing::debug!(worker_id, %chat_id, "skipping non-command message");
            continue;
        }

        let reply = handler.handle_command(&text).await;
        let (command, _) = parse_command(&text);
        tracing::info!(worker_id, %chat_id, command, "handled command");

        if let Err(e) = transport.send_reply(chat_id, reply.to_string()).await {
            tracing::error!(worker_id, %chat_id, "failed to send reply: {e:?}");
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::handlers::tests::make_handler;

    fn command(chat_id: i64, text: &str) -> Update {
        Update {
            chat_id: Some(ChatId(chat_id)),
            text: Some(text.to_owned()),
            is_command: true,
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        sent: std::sync::Mutex<Vec<(ChatId, String)>>,
        fail_for: Option<ChatId>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send_reply(&self, chat_id: ChatId, text: String) -> Result<()> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_for == Some(chat_id) {
                anyhow::bail!("chat not found");
            }
            self.sent.lock().unwrap().push((chat_id, text));
            Ok(())
        }
    }

    async fn dispatch(transport: Arc<FakeTransport>, workers: usize, updates: Vec<Update>) {
        let (handler, _, _) = make_handler();
        let (tx, rx) = mpsc::unbounded_channel();
        for update in updates {
            tx.send(update).unwrap();
        }
        drop(tx);

        Dispatcher::new(workers, Arc::new(handler), transport)
            .run(rx)
            .await;
    }

    #[tokio::test]
    async fn drops_non_commands() {
        let transport = Arc::new(FakeTransport::default());
        let updates = vec![
            Update {
                chat_id: None,
                text: None,
                is_command: false,
            },
            Update {
                chat_id: Some(ChatId(1)),
                text: None,
                is_command: false,
            },
            Update {
                chat_id: Some(ChatId(1)),
                text: Some("hello there".to_owned()),
                is_command: false,
            },
            command(2, "/sayhi"),
        ];

        dispatch(transport.clone(), 4, updates).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![(ChatId(2), "Hi :) Nice to meet you!".to_owned())]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handles_every_update_once() {
        const UPDATES: i64 = 100;

        let transport = Arc::new(FakeTransport {
            delay: Some(Duration::from_millis(1)),
            ..Default::default()
        });
        let updates = (0..UPDATES)
            .map(|i| command(i, "/usage"))
            .collect();

        dispatch(transport.clone(), 4, updates).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), UPDATES as usize);

        let mut per_chat = HashMap::new();
        for (chat_id, text) in sent.iter() {
            assert!(text.ends_with("Total: 1.0G"));
            *per_chat.entry(*chat_id).or_insert(0) += 1;
        }
        assert_eq!(per_chat.len(), UPDATES as usize);
        assert!(per_chat.values().all(|&count| count == 1));
    }

    #[tokio::test]
    async fn send_failure_keeps_worker_alive() {
        let transport = Arc::new(FakeTransport {
            fail_for: Some(ChatId(1)),
            ..Default::default()
        });
        let updates = vec![
            command(1, "/help"),
            command(2, "/unknown"),
            command(1, "/sayhi"),
            command(3, "/sayhi extra arg"),
        ];

        dispatch(transport.clone(), 1, updates).await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                (ChatId(2), "I don't know that command".to_owned()),
                (ChatId(3), "I don't know that command with args".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn weather_end_to_end() {
        let transport = Arc::new(FakeTransport::default());

        dispatch(
            transport.clone(),
            4,
            vec![command(42, "/weather shenzhen")],
        )
        .await;

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (chat_id, text) = &sent[0];
        assert_eq!(*chat_id, ChatId(42));
        assert!(text.contains("Shenzhen"));
        assert!(text.contains("28"));
        assert!(text.contains("2024-05-01 10:00"));
    }

    #[tokio::test]
    async fn stops_when_stream_closes() {
        let transport = Arc::new(FakeTransport::default());
        let (handler, _, _) = make_handler();
        let (tx, rx) = mpsc::unbounded_channel::<Update>();

        let run = tokio::spawn(Dispatcher::new(4, Arc::new(handler), transport).run(rx));
        tx.send(command(1, "/help")).unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("dispatcher must stop once the stream is closed")
            .unwrap();
    }
}
