use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::Settings;
use crate::notify::{MailMessage, Mailer};

/// Implicit-TLS submission port; anything else negotiates STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Sends through an authenticated SMTP relay (Gmail by default).
#[derive(Clone)]
pub struct SmtpMailer {
    from: String,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let user = settings.require_email_user()?.to_string();
        let password = settings.require_email_app_password()?.to_string();

        let builder = if settings.smtp_port == SMTPS_PORT {
            SmtpTransport::relay(&settings.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&settings.smtp_host)
        }
        .with_context(|| format!("invalid SMTP relay {}", settings.smtp_host))?;

        let transport = builder
            .port(settings.smtp_port)
            .credentials(Credentials::new(user.clone(), password))
            .build();

        Ok(Self {
            from: user,
            transport,
        })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: MailMessage) -> Result<()> {
        let email = Message::builder()
            .from(self.from.parse().context("invalid sender address")?)
            .to(message
                .to
                .parse()
                .with_context(|| format!("invalid recipient address: {}", message.to))?)
            .subject(message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html)
            .context("failed to build email")?;

        // lettre's SmtpTransport is blocking.
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .context("smtp send task failed")?
            .context("SMTP send failed")?;
        Ok(())
    }
}
