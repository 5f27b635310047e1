use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from: Mailbox = config.smtp_from.as_deref()?.parse().ok()?;

        let creds = Credentials::new(username, password);
        let transport = if config.smtp_port == Some(465) {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host).ok()?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).ok()?
        }
        .credentials(creds)
        .build();

        Some(Self { transport, from })
    }

    pub async fn send_password_reset(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        reset_url: &str,
    ) -> anyhow::Result<()> {
        let to = Mailbox::new(
            to_name.map(str::to_string),
            to_email.parse().context("Invalid recipient address")?,
        );
        let greeting = to_name.unwrap_or("Olá");

        let text = format!(
            "{greeting},\n\n\
            Recebemos um pedido para redefinir sua senha.\n\n\
            Use o link abaixo para criar uma nova senha (válido por 1 hora):\n\
            {reset_url}\n\n\
            Se você não fez este pedido, ignore este email."
        );
        let html = format!(
            r#"<p>{greeting},</p>
<p>Recebemos um pedido para redefinir sua senha.</p>
<p><a href="{reset_url}">Redefinir senha</a></p>
<p style="color:#64748b;font-size:13px">O link expira em 1 hora. Se você não fez este pedido, ignore este email.</p>"#
        );

        self.send_email(to, "Redefinição de senha", &text, &html).await
    }

    async fn send_email(&self, to: Mailbox, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .message_id(Some(format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())))
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;
        Ok(())
    }
}

/// Link the front end opens to choose a new password.
pub fn reset_url(base_url: &str, token: &str) -> String {
    format!("{}/reset-password?token={token}", base_url.trim_end_matches('/'))
}
