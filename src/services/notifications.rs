// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fire-and-forget side channels: user notifications and pipeline events.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::Notification;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events buffered per subscriber before old ones are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Stores notifications for the web app to display.
pub struct StoreNotifier {
    users: Arc<dyn UserStore>,
}

impl StoreNotifier {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        self.users.add_notification(notification).await?;
        tracing::info!(
            athlete_id = notification.user_id,
            notification_id = %notification.id,
            title = %notification.title,
            "Notification created"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    ActivityProcessed {
        athlete_id: u64,
        activity_id: u64,
        recipes: usize,
        updated_fields: usize,
        error: Option<String>,
    },
    FtpUpdated {
        athlete_id: u64,
        ftp: u32,
    },
}

/// Broadcast channel for pipeline events. Emitting never fails.
#[derive(Clone)]
pub struct Events {
    tx: broadcast::Sender<PipelineEvent>,
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl Events {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, event: PipelineEvent) {
        // Err only means there are no subscribers right now.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

/// Log every pipeline event at debug level until the channel closes.
pub fn spawn_event_logger(events: &Events) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::debug!(?event, "Pipeline event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let events = Events::new();
        events.emit(PipelineEvent::FtpUpdated {
            athlete_id: 1,
            ftp: 250,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let events = Events::new();
        let mut rx = events.subscribe();
        events.emit(PipelineEvent::FtpUpdated {
            athlete_id: 1,
            ftp: 250,
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            PipelineEvent::FtpUpdated {
                athlete_id: 1,
                ftp: 250
            }
        );
    }
}
