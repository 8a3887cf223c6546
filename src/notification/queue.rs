use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{error, info, warn};
use rocket::tokio::{
    self,
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    task::JoinHandle,
};

use super::{ConfirmationEmail, Mailer, NotificationError};
use crate::scheduled_task::ScheduledTask;

/// How failed deliveries are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before each retry.
    pub interval: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

/// A delivery and how many times it has been tried so far, plus one.
struct Job {
    email: ConfirmationEmail,
    attempt: u32,
}

/// Delivers confirmation emails in the background.
///
/// Enqueueing never waits on the mailer. A single worker sends in order;
/// failed sends are re-queued after the retry interval until attempts run out.
pub struct NotificationQueue {
    sender: UnboundedSender<Job>,
    retries: Arc<Mutex<Vec<ScheduledTask<()>>>>,
    worker: JoinHandle<()>,
}

impl NotificationQueue {
    /// Spawn the worker. Must be called from within the runtime.
    pub fn start(mailer: Arc<dyn Mailer>, policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let retries = Arc::new(Mutex::new(Vec::new()));
        let worker = tokio::spawn(work(
            mailer,
            policy,
            receiver,
            sender.clone(),
            retries.clone(),
        ));
        Self {
            sender,
            retries,
            worker,
        }
    }

    /// Queue a confirmation email for delivery.
    pub fn enqueue(&self, email: ConfirmationEmail) -> Result<(), NotificationError> {
        self.sender
            .send(Job { email, attempt: 1 })
            .map_err(|_| NotificationError::QueueClosed)
    }

    /// Stop the worker and cancel any scheduled retries.
    ///
    /// Returns how many retries were dropped.
    pub async fn shutdown(&self) -> usize {
        let pending = std::mem::take(&mut *self.retries.lock().await);
        let mut dropped = 0;
        for retry in pending {
            if !retry.cancel().await {
                dropped += 1;
            }
        }
        self.worker.abort();
        dropped
    }
}

async fn work(
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    mut receiver: UnboundedReceiver<Job>,
    sender: UnboundedSender<Job>,
    retries: Arc<Mutex<Vec<ScheduledTask<()>>>>,
) {
    while let Some(job) = receiver.recv().await {
        match mailer.send(&job.email).await {
            Ok(()) => info!("Sent confirmation email on attempt {}", job.attempt),
            Err(e) if job.attempt < policy.max_attempts => {
                warn!(
                    "Confirmation email attempt {} failed, retrying in {}s: {e}",
                    job.attempt,
                    policy.interval.num_seconds()
                );
                let retry = Job {
                    email: job.email,
                    attempt: job.attempt + 1,
                };
                let sender = sender.clone();
                let task = ScheduledTask::new(
                    async move {
                        // Only fails if the queue has shut down.
                        let _ = sender.send(retry);
                    },
                    Utc::now() + policy.interval,
                );
                let mut pending = retries.lock().await;
                pending.retain(|retry| !retry.is_finished());
                pending.push(task);
            }
            Err(e) => error!(
                "Giving up on confirmation email after {} attempts: {e}",
                job.attempt
            ),
        }
    }
}
