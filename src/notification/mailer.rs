use aws_sdk_sesv2::{
    error::DisplayErrorContext,
    types::{Body, Content, Destination, EmailContent, Message},
    Client as SesClient,
};

use super::NotificationError;
use crate::{config::Config, model::api::Email, model::common::CorrelationToken};

/// The email sent to a voter so they can confirm their address and start voting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationEmail {
    pub to: Email,
    pub link: String,
    pub election_name: String,
}

impl ConfirmationEmail {
    pub fn new(to: Email, token: CorrelationToken, config: &Config) -> Self {
        Self {
            to,
            link: config.confirmation_link(token),
            election_name: config.election_name().to_string(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Confirm your email to vote in the {}", self.election_name)
    }

    pub fn text_body(&self) -> String {
        format!(
            "You registered to vote in the {}.\n\n\
             Follow this link to confirm your email and cast your votes:\n{}\n\n\
             If you did not register, you can ignore this email.",
            self.election_name, self.link
        )
    }

    pub fn html_body(&self) -> String {
        format!(
            "<p>You registered to vote in the {name}.</p>\
             <p><a href=\"{link}\">Confirm your email and cast your votes</a></p>\
             <p>If you did not register, you can ignore this email.</p>",
            name = self.election_name,
            link = self.link
        )
    }
}

/// Something that can deliver confirmation emails.
#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ConfirmationEmail) -> Result<(), NotificationError>;
}

/// Sends mail through Amazon SES.
pub struct SesMailer {
    client: SesClient,
    sender: String,
}

impl SesMailer {
    pub fn new(client: SesClient, sender: impl Into<String>) -> Self {
        Self {
            client,
            sender: sender.into(),
        }
    }
}

#[rocket::async_trait]
impl Mailer for SesMailer {
    async fn send(&self, email: &ConfirmationEmail) -> Result<(), NotificationError> {
        let message = Message::builder()
            .subject(Content::builder().data(email.subject()).charset("UTF-8").build()?)
            .body(
                Body::builder()
                    .text(Content::builder().data(email.text_body()).charset("UTF-8").build()?)
                    .html(Content::builder().data(email.html_body()).charset("UTF-8").build()?)
                    .build(),
            )
            .build();

        self.client
            .send_email()
            .from_email_address(&self.sender)
            .destination(Destination::builder().to_addresses(email.to.as_str()).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| NotificationError::Transport(DisplayErrorContext(e).to_string()))?;
        Ok(())
    }
}

/// A mailer that keeps everything it is asked to send.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct Mailbox {
    sent: std::sync::Arc<std::sync::Mutex<Vec<ConfirmationEmail>>>,
}

#[cfg(test)]
impl Mailbox {
    pub fn sent(&self) -> Vec<ConfirmationEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[rocket::async_trait]
impl Mailer for Mailbox {
    async fn send(&self, email: &ConfirmationEmail) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_email_links_to_token() {
        let config = Config::example();
        let token = CorrelationToken::generate();
        let email = ConfirmationEmail::new(Email::example(), token, &config);

        assert_eq!(email.link, format!("{}/confirmEmail/{token}", config.base_url()));
        assert!(email.subject().contains(config.election_name()));
        assert!(email.text_body().contains(&email.link));
        assert!(email.html_body().contains(&email.link));
    }
}
