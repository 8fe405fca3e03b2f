// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 邮件通知 - 片段录制完成后以附件形式发送给固定收件人
//!
//! SMTP + STARTTLS + 登录, 每个片段一封邮件.

use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::Config;

pub const EMAIL_SUBJECT: &str = "Video Clip From Home Camera";
pub const EMAIL_BODY: &str = "Eine Aufnahme wurde genommen";

/// 通知错误
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("未配置收件人")]
    NoRecipients,

    #[error("邮箱地址无效: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("读取片段失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("附件类型无效: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),

    #[error("构建邮件失败: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP发送失败: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// 通知接口
pub trait Notifier: Send {
    fn notify(&self, clip: &Path) -> Result<(), NotifyError>;
}

/// SMTP 邮件通知
#[derive(Clone)]
pub struct MailNotifier {
    sender: String,
    password: String,
    recipients: Vec<String>,
    host: String,
    port: u16,
}

impl std::fmt::Debug for MailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailNotifier")
            .field("sender", &self.sender)
            .field("recipients", &self.recipients)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl MailNotifier {
    pub fn new(
        sender: String,
        password: String,
        recipients: Vec<String>,
        host: String,
        port: u16,
    ) -> Self {
        Self {
            sender,
            password,
            recipients,
            host,
            port,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.sender_email.clone(),
            config.sender_password.clone(),
            config.recipients(),
            config.smtp_host.clone(),
            config.smtp_port,
        )
    }

    /// 构建邮件: 纯文本正文 + video/mp4 附件
    pub fn build_message(&self, clip: &Path) -> Result<Message, NotifyError> {
        if self.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.sender.parse::<Mailbox>()?)
            .subject(EMAIL_SUBJECT);
        for recipient in &self.recipients {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let filename = clip
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip.mp4".to_string());
        let body = std::fs::read(clip)?;
        let attachment = Attachment::new(filename).body(body, ContentType::parse("video/mp4")?);

        let message = builder.multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(EMAIL_BODY.to_string()))
                .singlepart(attachment),
        )?;
        Ok(message)
    }
}

impl Notifier for MailNotifier {
    fn notify(&self, clip: &Path) -> Result<(), NotifyError> {
        let message = self.build_message(clip)?;

        let mailer = SmtpTransport::starttls_relay(&self.host)?
            .port(self.port)
            .credentials(Credentials::new(
                self.sender.clone(),
                self.password.clone(),
            ))
            .build();
        mailer.send(&message)?;

        info!("📧 邮件已发送: {}", self.recipients.join(", "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn notifier(recipients: &[&str]) -> MailNotifier {
        MailNotifier::new(
            "cam@example.com".to_string(),
            "secret".to_string(),
            recipients.iter().map(|r| r.to_string()).collect(),
            "smtp.example.com".to_string(),
            587,
        )
    }

    #[test]
    fn test_build_message_with_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("snippet_1700000000.mp4");
        std::fs::File::create(&clip)
            .unwrap()
            .write_all(b"fake mp4 bytes")
            .unwrap();

        let message = notifier(&["a@example.com", "b@example.com"])
            .build_message(&clip)
            .unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(raw.contains("Subject: Video Clip From Home Camera"));
        assert!(raw.contains("a@example.com"));
        assert!(raw.contains("b@example.com"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("video/mp4"));
        assert!(raw.contains("snippet_1700000000.mp4"));
        assert!(raw.contains(EMAIL_BODY));
    }

    #[test]
    fn test_no_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"x").unwrap();
        let err = notifier(&[]).notify(&clip).unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipients));
    }

    #[test]
    fn test_invalid_address() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"x").unwrap();
        let err = notifier(&["not-an-address"]).build_message(&clip).unwrap_err();
        assert!(matches!(err, NotifyError::Address(_)));
    }

    #[test]
    fn test_missing_clip() {
        let err = notifier(&["a@example.com"])
            .build_message(Path::new("/nonexistent/clip.mp4"))
            .unwrap_err();
        assert!(matches!(err, NotifyError::Io(_)));
    }
}
