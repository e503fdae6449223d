use crate::domain_model::OtpPurpose;
use crate::domain_port::*;
use crate::logger::*;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::Error as SmtpError;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// SMTP reply codes meaning our credentials were refused.
const AUTH_REPLY_CODES: [&str; 4] = ["530", "534", "535", "538"];
/// SMTP reply codes meaning the mailbox cannot receive mail.
const RECIPIENT_REPLY_CODES: [&str; 5] = ["501", "550", "551", "553", "554"];

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub timeout: Duration,
    pub platform_name: String,
    pub code_ttl_minutes: i64,
}

pub struct SmtpOtpSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    timeout: Duration,
    platform_name: String,
    code_ttl_minutes: i64,
}

impl SmtpOtpSender {
    pub fn try_new(config: SmtpConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::new(config.username, config.password);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(config.timeout))
            .build();

        Ok(Self::with_transport(
            mailer,
            config.from.parse()?,
            config.timeout,
            config.platform_name,
            config.code_ttl_minutes,
        ))
    }

    pub fn with_transport(
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
        timeout: Duration,
        platform_name: String,
        code_ttl_minutes: i64,
    ) -> Self {
        Self {
            mailer,
            from,
            timeout,
            platform_name,
            code_ttl_minutes,
        }
    }

    fn compose(&self, purpose: OtpPurpose, code: &str) -> (String, String) {
        let minutes = self.code_ttl_minutes;
        match purpose {
            OtpPurpose::Registration => (
                format!("Your {} verification code", self.platform_name),
                format!(
                    "Welcome to {}!\n\nYour verification code is {code}.\nIt expires in {minutes} minutes.\n",
                    self.platform_name
                ),
            ),
            OtpPurpose::PasswordReset => (
                format!("Reset your {} password", self.platform_name),
                format!(
                    "Use code {code} to reset your {} password.\nIt expires in {minutes} minutes. If you did not ask for a reset, ignore this email.\n",
                    self.platform_name
                ),
            ),
        }
    }

    fn build_message(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Message, DeliveryFailure> {
        let to: Mailbox = identifier
            .parse()
            .map_err(|e| DeliveryFailure::InvalidRecipient(format!("{identifier}: {e}")))?;
        let (subject, body) = self.compose(purpose, code);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| DeliveryFailure::InvalidRecipient(e.to_string()))
    }
}

fn classify(err: &SmtpError) -> DeliveryFailure {
    let code = err.status().map(|code| code.to_string());
    match code.as_deref() {
        Some(code) if AUTH_REPLY_CODES.contains(&code) => DeliveryFailure::Auth(err.to_string()),
        Some(code) if RECIPIENT_REPLY_CODES.contains(&code) => {
            DeliveryFailure::InvalidRecipient(err.to_string())
        }
        _ => DeliveryFailure::Connection(err.to_string()),
    }
}

#[async_trait::async_trait]
impl OtpSender for SmtpOtpSender {
    async fn send(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<(), DeliveryFailure> {
        let message = self.build_message(identifier, purpose, code)?;

        match tokio::time::timeout(self.timeout, self.mailer.send(message)).await {
            Ok(Ok(_)) => {
                debug!(identifier, %purpose, "otp mail sent");
                Ok(())
            }
            Ok(Err(e)) => {
                let failure = classify(&e);
                warn!(identifier, %purpose, error = %e, "otp mail failed");
                Err(failure)
            }
            Err(_) => Err(DeliveryFailure::Connection(format!(
                "smtp send timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> SmtpOtpSender {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1")
            .port(1)
            .timeout(Some(Duration::from_millis(200)))
            .build();
        SmtpOtpSender::with_transport(
            mailer,
            "Dream Society <no-reply@dream.example>".parse().unwrap(),
            Duration::from_millis(500),
            "Dream Society".to_string(),
            10,
        )
    }

    #[tokio::test]
    async fn malformed_recipient_is_rejected_before_sending() {
        let err = sender()
            .send("not an address", OtpPurpose::Registration, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryFailure::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_connection_failure() {
        let err = sender()
            .send("a@x.com", OtpPurpose::Registration, "123456")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryFailure::Connection(_)));
    }

    #[tokio::test]
    async fn message_carries_code_and_purpose() {
        let s = sender();
        let (subject, body) = s.compose(OtpPurpose::PasswordReset, "012345");
        assert!(subject.contains("Reset"));
        assert!(body.contains("012345"));

        let message = s
            .build_message("a@x.com", OtpPurpose::Registration, "012345")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: a@x.com"));
    }
}
