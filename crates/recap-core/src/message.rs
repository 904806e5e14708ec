use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// One chat message as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub sender: String,
    /// Empty or absent for attachment-only messages. For images this is the caption.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub has_image: bool,
    /// Fetchable location of the attached image, when the transport provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    pub fn text(id: i64, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: MessageId(id),
            sender: sender.into(),
            text: Some(text.into()),
            has_image: false,
            image_url: None,
            reply_to_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn image(id: i64, sender: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            id: MessageId(id),
            sender: sender.into(),
            text: caption,
            has_image: true,
            image_url: None,
            reply_to_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn replying_to(mut self, id: i64) -> Self {
        self.reply_to_id = Some(MessageId(id));
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.has_image = true;
        self.image_url = Some(url.into());
        self
    }

    /// Message text, or `""` when there is none.
    pub fn body(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}
