//! Email sender that writes governance notices to the log.

use async_trait::async_trait;
use cyberops_application::EmailService;
use cyberops_core::AppResult;
use tracing::info;

/// Development sender; every message is logged at `info` and reported delivered.
#[derive(Debug, Clone, Default)]
pub struct ConsoleEmailService;

impl ConsoleEmailService {
    /// Creates a console sender.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailService for ConsoleEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()> {
        info!(
            to,
            subject,
            has_html = html_body.is_some(),
            "governance notice (console)\n{text_body}"
        );

        Ok(())
    }
}
