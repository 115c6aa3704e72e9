// email: send a renewal notification, optionally with an artifact attached

use crate::adapters::smtp::{self, MailAttachment};
use crate::dispatch::ActionContext;
use crate::model::action::SmtpSettings;
use crate::model::{ArtifactForm, DispatchMode};
use crate::Result;

pub async fn run(
    ctx: &ActionContext<'_>,
    mode: DispatchMode,
    to: &[String],
    subject: &str,
    body: &str,
    attach: Option<ArtifactForm>,
    settings: &SmtpSettings,
) -> Result<String> {
    if mode == DispatchMode::Simulate {
        if let Some(form) = attach {
            ctx.artifact(form).await?;
        }
        smtp::check_relay(settings).await?;
        return Ok(format!(
            "Would mail {} recipient(s) via {}",
            to.len(),
            settings.server
        ));
    }

    let attachment = match attach {
        Some(form) => Some(MailAttachment {
            file_name: form.file_name(),
            content_type: content_type_for(form).to_string(),
            bytes: ctx.artifact(form).await?,
        }),
        None => None,
    };

    smtp::send_mail(
        settings,
        ctx.cipher,
        to,
        &ctx.expand(subject),
        &ctx.expand(body),
        attachment,
    )
    .await?;

    Ok(format!("Mailed {} recipient(s)", to.len()))
}

fn content_type_for(form: ArtifactForm) -> &'static str {
    match form {
        ArtifactForm::P12 | ArtifactForm::Pfx => "application/x-pkcs12",
        ArtifactForm::Der | ArtifactForm::Cer => "application/pkix-cert",
        ArtifactForm::P7b => "application/pkcs7-mime",
        _ => "application/x-pem-file",
    }
}
