//! SMTP sender backed by `lettre`.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use cyberops_application::EmailService;
use cyberops_core::{AppError, AppResult};

/// SMTP relay settings.
#[derive(Clone)]
pub struct SmtpEmailConfig {
    /// Relay hostname.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Relay username.
    pub username: String,
    /// Relay password.
    pub password: String,
    /// Sender address used on every notice.
    pub from_address: String,
}

impl std::fmt::Debug for SmtpEmailConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SmtpEmailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Production sender relaying through an SMTP server over TLS.
#[derive(Clone)]
pub struct SmtpEmailService {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailService {
    /// Validates the sender address and builds a pooled relay transport.
    pub fn new(config: SmtpEmailConfig) -> AppResult<Self> {
        let from = config.from_address.parse::<Mailbox>().map_err(|error| {
            AppError::Validation(format!(
                "invalid SMTP from address '{}': {error}",
                config.from_address
            ))
        })?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|error| {
                AppError::Validation(format!(
                    "failed to configure SMTP relay '{}': {error}",
                    config.host
                ))
            })?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        Ok(Self { from, mailer })
    }

    fn build_message(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<Message> {
        let recipient = to.parse::<Mailbox>().map_err(|error| {
            AppError::Validation(format!("invalid recipient address '{to}': {error}"))
        })?;

        let builder = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject);

        let message = match html_body {
            Some(html_body) => builder.multipart(MultiPart::alternative_plain_html(
                text_body.to_owned(),
                html_body.to_owned(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text_body.to_owned()),
        };

        message.map_err(|error| AppError::Internal(format!("failed to build email: {error}")))
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()> {
        let message = self.build_message(to, subject, text_body, html_body)?;

        let response = self
            .mailer
            .send(message)
            .await
            .map_err(|error| AppError::Internal(format!("SMTP delivery to '{to}' failed: {error}")))?;
        debug!(to, code = %response.code(), "smtp relay accepted notice");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{SmtpEmailConfig, SmtpEmailService};
    use cyberops_core::AppError;

    fn config(from_address: &str) -> SmtpEmailConfig {
        SmtpEmailConfig {
            host: "smtp.cyberops.example".to_owned(),
            port: 465,
            username: "mailer".to_owned(),
            password: "secret".to_owned(),
            from_address: from_address.to_owned(),
        }
    }

    #[tokio::test]
    async fn rejects_invalid_sender_address() {
        let result = SmtpEmailService::new(config("not an address"));
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn builds_plain_and_alternative_messages() {
        let service = SmtpEmailService::new(config("CyberOps <noreply@cyberops.example>"))
            .unwrap_or_else(|error| panic!("service should build: {error}"));

        let plain = service.build_message("ada@cyberops.example", "Subject", "body", None);
        assert!(plain.is_ok());

        let html = service.build_message(
            "ada@cyberops.example",
            "Subject",
            "body",
            Some("<p>body</p>"),
        );
        assert!(html.is_ok());

        let invalid = service.build_message("nobody", "Subject", "body", None);
        assert!(matches!(invalid, Err(AppError::Validation(_))));
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", config("noreply@cyberops.example"));
        assert!(!rendered.contains("secret"));
    }
}
