// SMTP delivery for email deployment actions

use crate::error::EngineError;
use crate::model::action::SmtpSettings;
use crate::vault::cipher::VaultCipher;
use crate::Result;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// One attachment for an outgoing mail
pub struct MailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Send a mail through the configured relay. lettre's SMTP transport is
/// blocking, so this runs on the blocking pool.
pub async fn send_mail(
    settings: &SmtpSettings,
    cipher: Option<&VaultCipher>,
    to: &[String],
    subject: &str,
    body: &str,
    attachment: Option<MailAttachment>,
) -> Result<()> {
    let from: Mailbox = settings
        .from_address
        .parse()
        .map_err(|e| EngineError::invalid(format!("Invalid from address: {}", e)))?;

    let mut builder = Message::builder().from(from).subject(subject);
    for recipient in to {
        let mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| EngineError::invalid(format!("Invalid recipient '{}': {}", recipient, e)))?;
        builder = builder.to(mailbox);
    }

    let message = match attachment {
        Some(att) => {
            let content_type = att
                .content_type
                .parse()
                .map_err(|e| EngineError::invalid(format!("Invalid content type: {}", e)))?;
            builder
                .multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(body.to_string()))
                        .singlepart(
                            Attachment::new(att.file_name).body(att.bytes, content_type),
                        ),
                )
                .map_err(|e| EngineError::invalid(format!("Mail build failed: {}", e)))?
        }
        None => builder
            .body(body.to_string())
            .map_err(|e| EngineError::invalid(format!("Mail build failed: {}", e)))?,
    };

    let password = settings.password.reveal(cipher)?;
    let credentials = Credentials::new(settings.username.clone(), password);

    let transport = if settings.use_tls {
        SmtpTransport::relay(&settings.server)
    } else {
        SmtpTransport::starttls_relay(&settings.server)
    }
    .map_err(|e| EngineError::AdapterUnreachable {
        adapter: "smtp".to_string(),
        details: e.to_string(),
    })?
    .port(settings.port)
    .credentials(credentials)
    .build();

    let server = settings.server.clone();
    tokio::task::spawn_blocking(move || transport.send(&message))
        .await?
        .map_err(|e| classify_smtp_error(&server, e))?;

    Ok(())
}

/// Connectivity check for simulate mode: open the connection and say EHLO
pub async fn check_relay(settings: &SmtpSettings) -> Result<()> {
    let transport = if settings.use_tls {
        SmtpTransport::relay(&settings.server)
    } else {
        SmtpTransport::starttls_relay(&settings.server)
    }
    .map_err(|e| EngineError::AdapterUnreachable {
        adapter: "smtp".to_string(),
        details: e.to_string(),
    })?
    .port(settings.port)
    .build();

    let server = settings.server.clone();
    let connected = tokio::task::spawn_blocking(move || transport.test_connection())
        .await?
        .map_err(|e| classify_smtp_error(&server, e))?;

    if connected {
        Ok(())
    } else {
        Err(EngineError::AdapterUnreachable {
            adapter: "smtp".to_string(),
            details: format!("{} did not answer EHLO", settings.server),
        })
    }
}

fn classify_smtp_error(server: &str, err: lettre::transport::smtp::Error) -> EngineError {
    if err.is_permanent() {
        // 5xx covering auth rejections and policy failures
        EngineError::AdapterAuth {
            adapter: "smtp".to_string(),
            details: format!("{}: {}", server, err),
        }
    } else if err.is_transient() {
        EngineError::AdapterRemote {
            adapter: "smtp".to_string(),
            details: format!("{}: {}", server, err),
        }
    } else {
        EngineError::AdapterUnreachable {
            adapter: "smtp".to_string(),
            details: format!("{}: {}", server, err),
        }
    }
}
