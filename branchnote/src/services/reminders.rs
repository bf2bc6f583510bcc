//! Reminders service
//!
//! Polls the engine's collection on a fixed interval and fires a
//! notification for every note whose reminder is due. The poller runs as a
//! background task that can be cancelled at any time.

use crate::database::Entity;
use crate::error::Result;
use crate::services::notes::NotesService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Delivers a due reminder to the user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, note: &Entity) -> Result<()>;
}

/// Notifier that writes reminders to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, note: &Entity) -> Result<()> {
        tracing::info!("Reminder: {} ({})", note.title, note.id);
        Ok(())
    }
}

/// Reminders service with background poller
#[derive(Clone)]
pub struct RemindersService {
    notes: NotesService,
    notifier: Arc<dyn Notifier>,
}

impl RemindersService {
    pub fn new(notes: NotesService, notifier: Arc<dyn Notifier>) -> Self {
        Self { notes, notifier }
    }

    /// Notes whose reminder is at or before `now` and not yet sent
    pub async fn due_reminders(&self, now: DateTime<Utc>) -> Vec<Entity> {
        self.notes
            .entities()
            .await
            .into_iter()
            .filter(|e| {
                e.is_file()
                    && !e.notification_sent
                    && e.reminder_date.is_some_and(|due| due <= now)
            })
            .collect()
    }

    /// Notify and mark every due reminder. Returns how many fired.
    pub async fn check_due(&self) -> Result<usize> {
        let due = self.due_reminders(Utc::now()).await;
        let mut fired = 0;

        for note in due {
            tracing::info!("Triggering reminder for note {}", note.id);

            if let Err(e) = self.notifier.notify(&note).await {
                tracing::error!("Failed to send notification for {}: {}", note.id, e);
                continue;
            }

            if let Err(e) = self.notes.mark_notification_sent(&note.id).await {
                tracing::warn!("Failed to mark reminder sent for {}: {}", note.id, e);
                continue;
            }
            fired += 1;
        }

        Ok(fired)
    }

    /// Start polling every `interval` until the returned task is stopped
    pub fn start(self, interval: Duration) -> ReminderTask {
        let cancel = CancellationToken::new();
        let stopped = cancel.clone();

        let handle = tokio::spawn(async move {
            tracing::info!("Starting reminders poller ({:?} interval)", interval);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.check_due().await {
                            tracing::error!("Error checking reminders: {}", e);
                        }
                    }
                }
            }

            tracing::info!("Reminders poller stopped");
        });

        ReminderTask {
            cancel,
            handle: Some(handle),
        }
    }
}

/// Handle to a running poller. Dropping it cancels the poller.
pub struct ReminderTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ReminderTask {
    /// Cancel the poller and wait for it to finish
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Reminders poller ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ReminderTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
