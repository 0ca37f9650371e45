//! SMTP email provider implementation using lettre.
//!
//! Without TLS and credentials this targets local development servers
//! (Mailpit/MailHog); with them it works against institutional SMTP relays.

use super::{EmailContent, EmailProvider, SentEmail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use core_config::{env_or_default, env_parse_or};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, error, info};

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Sender email address.
    pub from_email: String,
    /// Sender name.
    pub from_name: String,
    /// SMTP username (optional for dev servers like Mailpit).
    pub username: Option<String>,
    /// SMTP password (optional for dev servers like Mailpit).
    pub password: Option<String>,
    /// Whether to use TLS (false for local dev servers).
    pub use_tls: bool,
}

impl SmtpConfig {
    /// Create a new SMTP configuration without TLS or credentials.
    pub fn new(host: String, port: u16, from_email: String, from_name: String) -> Self {
        Self {
            host,
            port,
            from_email,
            from_name,
            username: None,
            password: None,
            use_tls: false,
        }
    }

    /// Load configuration from `SMTP_*` environment variables. The defaults
    /// target a local Mailpit instance.
    pub fn from_env() -> NotificationResult<Self> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse_or("SMTP_PORT", 1025)?,
            from_email: env_or_default("SMTP_FROM_EMAIL", "noreply@aula.localhost"),
            from_name: env_or_default("SMTP_FROM_NAME", "Aula"),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: env_parse_or("SMTP_USE_TLS", false)?,
        })
    }

    /// Builder method to set TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }
}

/// SMTP email provider.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpProvider {
    /// Create a new SMTP provider.
    pub fn new(config: SmtpConfig) -> NotificationResult<Self> {
        let transport = Self::build_transport(&config)?;
        Ok(Self { transport, config })
    }

    /// Create a provider from `SMTP_*` environment variables.
    pub fn from_env() -> NotificationResult<Self> {
        Self::new(SmtpConfig::from_env()?)
    }

    fn build_transport(
        config: &SmtpConfig,
    ) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| {
                    NotificationError::ProviderError(format!("Failed to create SMTP relay: {}", e))
                })?
                .port(config.port)
        } else {
            // Cleartext transport for local dev servers.
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    fn parse_mailbox(addr: &str, role: &str) -> NotificationResult<Mailbox> {
        addr.parse().map_err(|e| {
            NotificationError::ProviderError(format!("Invalid {} address '{}': {}", role, addr, e))
        })
    }

    /// Build a lettre Message from EmailContent.
    fn build_message(&self, email: &EmailContent) -> NotificationResult<Message> {
        let from = Self::parse_mailbox(
            &format!("{} <{}>", self.config.from_name, self.config.from_email),
            "from",
        )?;

        let to = if email.to_name.is_empty() {
            Self::parse_mailbox(&email.to_email, "to")?
        } else {
            Self::parse_mailbox(&format!("{} <{}>", email.to_name, email.to_email), "to")?
        };

        let mut builder = Message::builder().from(from).to(to).subject(&email.subject);

        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(Self::parse_mailbox(reply_to, "reply-to")?);
        }
        for cc in &email.cc {
            builder = builder.cc(Self::parse_mailbox(cc, "CC")?);
        }
        for bcc in &email.bcc {
            builder = builder.bcc(Self::parse_mailbox(bcc, "BCC")?);
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| {
                NotificationError::ProviderError(format!("Failed to build email message: {}", e))
            })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail> {
        debug!(
            to = %email.to_email,
            subject = %email.subject,
            host = %self.config.host,
            port = %self.config.port,
            cc_count = email.cc.len(),
            "Sending email via SMTP"
        );

        let message = self.build_message(email)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(to = %email.to_email, error = %e, "Failed to send email via SMTP");
            NotificationError::ProviderError(format!("SMTP send failed: {}", e))
        })?;

        let message_id = response.message().next().map(|s| s.to_string());

        info!(
            to = %email.to_email,
            message_id = ?message_id,
            "Email sent successfully via SMTP"
        );

        Ok(SentEmail {
            message_id,
            accepted: true,
        })
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        self.transport.test_connection().await.map_err(|e| {
            NotificationError::ProviderError(format!("SMTP health check failed: {}", e))
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_config_from_env_defaults() {
        temp_env::with_vars_unset(
            ["SMTP_HOST", "SMTP_PORT", "SMTP_FROM_EMAIL", "SMTP_USE_TLS"],
            || {
                let config = SmtpConfig::from_env().unwrap();
                assert_eq!(config.host, "localhost");
                assert_eq!(config.port, 1025);
                assert!(!config.use_tls);
                assert!(config.username.is_none());
            },
        );
    }

    #[test]
    fn test_smtp_config_builders() {
        let config = SmtpConfig::new(
            "smtp.university.edu".to_string(),
            587,
            "noreply@university.edu".to_string(),
            "Aula".to_string(),
        )
        .with_tls(true)
        .with_credentials("mailer".to_string(), "secret".to_string());

        assert!(config.use_tls);
        assert_eq!(config.username.as_deref(), Some("mailer"));
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let provider = SmtpProvider::new(SmtpConfig::new(
            "localhost".to_string(),
            1025,
            "noreply@aula.localhost".to_string(),
            "Aula".to_string(),
        ))
        .unwrap();

        let email = EmailContent {
            to_email: "not an address".to_string(),
            subject: "s".to_string(),
            ..Default::default()
        };
        let err = provider.build_message(&email).unwrap_err();
        assert!(err.to_string().contains("to"));
    }
}
