//! Outbound email.

mod mailer;
mod queue;

use aws_sdk_sesv2::error::BuildError;
use thiserror::Error;

#[cfg(test)]
pub use mailer::Mailbox;
pub use mailer::{ConfirmationEmail, Mailer, SesMailer};
pub use queue::{NotificationQueue, RetryPolicy};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Failed to build email: {0}")]
    Build(#[from] BuildError),
    #[error("Failed to send email: {0}")]
    Transport(String),
    #[error("Notification queue is closed")]
    QueueClosed,
}
