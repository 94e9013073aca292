use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;
use uuid::Uuid;

use crate::activity::{ACTION_CREATE, ACTION_DELETE, ACTION_UPDATE};
use crate::changes::truncate_chars;
use crate::models::{NewEmailLog, CT_PROJECT, CT_SUBTASK, CT_TASK};

pub const EMAIL_STATUS_FAIL: i16 = 0;
pub const EMAIL_STATUS_SUCCESS: i16 = 1;

const EMAIL_FIELD_MAX_CHARS: usize = 100;
const LOG_DESCRIPTION_MAX_CHARS: usize = 128;

/// A fully rendered message ready for a transport. Both a plain-text and an
/// HTML body are always produced.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub body_html: String,
}

/// Delivery provider seam. The production implementation talks to SES; tests
/// substitute a recording fake.
#[async_trait]
pub trait EmailTransport: Send + Sync + 'static {
    /// Send one message and return the provider's message id.
    async fn send(&self, from: &str, message: &OutgoingEmail) -> Result<String>;
}

pub struct SesTransport {
    client: SesClient,
}

impl SesTransport {
    pub fn new(client: SesClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EmailTransport for SesTransport {
    async fn send(&self, from: &str, message: &OutgoingEmail) -> Result<String> {
        let subject = Content::builder()
            .data(&message.subject)
            .charset("UTF-8")
            .build()
            .context("failed to build email subject")?;
        let text = Content::builder()
            .data(&message.body)
            .charset("UTF-8")
            .build()
            .context("failed to build email text body")?;
        let html = Content::builder()
            .data(&message.body_html)
            .charset("UTF-8")
            .build()
            .context("failed to build email html body")?;

        let content = EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(subject)
                    .body(Body::builder().text(text).html(html).build())
                    .build(),
            )
            .build();

        let response = self
            .client
            .send_email()
            .from_email_address(from)
            .destination(Destination::builder().to_addresses(&message.to).build())
            .content(content)
            .send()
            .await
            .context("failed to send email through SES")?;

        Ok(response.message_id().unwrap_or_default().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
    pub body_html: String,
}

impl RenderedEmail {
    pub fn to(self, recipient: impl Into<String>) -> OutgoingEmail {
        OutgoingEmail {
            to: recipient.into(),
            subject: self.subject,
            body: self.body,
            body_html: self.body_html,
        }
    }
}

/// Render the notification email for an activity, keyed on its action and
/// the kind of entity it touched. Anything unrecognized falls back to the
/// generic noun so rendering never fails.
pub fn render_activity_email(action: &str, content_type: &str) -> RenderedEmail {
    let item = entity_noun(content_type);
    let heading = title_case(item);

    match action {
        ACTION_CREATE => RenderedEmail {
            subject: format!("Notification: New {heading}"),
            body: format!("A new {item} has been added."),
            body_html: format!("<p>A new {item} has been added.</p>"),
        },
        ACTION_UPDATE => RenderedEmail {
            subject: format!("Notification: {heading} Updated"),
            body: format!("Your {item} has been updated."),
            body_html: format!("<p>Your {item} has been updated.</p>"),
        },
        ACTION_DELETE => RenderedEmail {
            subject: format!("Notification: {heading} Deleted"),
            body: format!("Your {item} has been deleted."),
            body_html: format!("<p>Your {item} has been deleted.</p>"),
        },
        _ => render_fallback_email(),
    }
}

/// Email carrying a freshly issued login code. Bypasses the recipient's
/// notification opt-out; the caller enforces that.
pub fn render_single_use_code_email(code: Uuid, expiry_minutes: i64) -> RenderedEmail {
    RenderedEmail {
        subject: "Notification: Your Single-Use Code".to_string(),
        body: format!(
            "Your single-use code is {code}. It expires in {expiry_minutes} minutes."
        ),
        body_html: format!(
            "<p>Your single-use code is <strong>{code}</strong>. It expires in {expiry_minutes} minutes.</p>"
        ),
    }
}

/// Used when a notification points at a subject type no renderer knows.
pub fn render_fallback_email() -> RenderedEmail {
    RenderedEmail {
        subject: "Notification".to_string(),
        body: "You have a new notification.".to_string(),
        body_html: "<p>You have a new notification.</p>".to_string(),
    }
}

/// One audit row per recipient. Success stores the provider message id,
/// failure the error detail; both are clipped to the column widths.
pub fn email_log_entry(email: &str, subject: &str, success: bool, description: &str) -> NewEmailLog {
    NewEmailLog {
        id: Uuid::new_v4(),
        email: clip_chars(email, EMAIL_FIELD_MAX_CHARS),
        subject: Some(clip_chars(subject, EMAIL_FIELD_MAX_CHARS)),
        status: if success {
            EMAIL_STATUS_SUCCESS
        } else {
            EMAIL_STATUS_FAIL
        },
        description: truncate_chars(description, LOG_DESCRIPTION_MAX_CHARS),
    }
}

fn entity_noun(content_type: &str) -> &'static str {
    match content_type {
        CT_PROJECT => "project",
        CT_TASK => "task",
        CT_SUBTASK => "subtask",
        _ => "item",
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn clip_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
