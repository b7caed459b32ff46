use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub label_type: String, // 'system' or 'user'
}

/// Label names Gmail creates on its own, including the ones imported
/// from IMAP clients that do not report a `system` type.
const SYSTEM_LABELS: &[&str] = &[
    "CATEGORY_PERSONAL",
    "CATEGORY_FORUMS",
    "CATEGORY_SOCIAL",
    "CATEGORY_UPDATES",
    "CATEGORY_PROMOTIONS",
    "IMPORTANT",
    "CHAT",
    "SENT",
    "INBOX",
    "TRASH",
    "DRAFT",
    "SPAM",
    "STARRED",
    "UNREAD",
    "[Imap]/Drafts",
    "[Imap]/Archive",
    "Deleted Messages",
];

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            label_type: String::new(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.label_type == "system" || SYSTEM_LABELS.contains(&self.name.as_str())
    }
}

/// A fetched message, decoded and ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub url: String,
    /// `None` only on partial records.
    pub date: Option<DateTime<Utc>>,
    pub to: String,
    pub cc: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub snippet: String,
    pub label_ids: Vec<String>,
    /// The message resource as the remote returned it.
    pub source: String,
    /// Same value for every message of one download run.
    pub download_started_at: DateTime<Utc>,
}

impl Message {
    /// Record for a message whose fetch failed; `subject` carries the error.
    pub fn partial(
        id: impl Into<String>,
        download_started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: String::new(),
            url: String::new(),
            date: None,
            to: String::new(),
            cc: String::new(),
            from: String::new(),
            subject: error.into(),
            body: String::new(),
            snippet: String::new(),
            label_ids: Vec::new(),
            source: String::new(),
            download_started_at,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.date.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_record_keeps_only_identity_and_error() {
        let started = Utc::now();
        let msg = Message::partial("abc", started, "Error retrieving abc");
        assert!(msg.is_partial());
        assert_eq!(msg.id, "abc");
        assert_eq!(msg.download_started_at, started);
        assert_eq!(msg.subject, "Error retrieving abc");
        assert!(msg.thread_id.is_empty());
        assert!(msg.source.is_empty());
    }

    #[test]
    fn system_labels_by_type_or_name() {
        let mut user = Label::new("Label_1", "receipts");
        user.label_type = "user".to_string();
        assert!(!user.is_system());

        assert!(Label::new("INBOX", "INBOX").is_system());
        assert!(Label::new("Label_9", "[Imap]/Archive").is_system());

        let mut typed = Label::new("CHAT", "Chats");
        typed.label_type = "system".to_string();
        assert!(typed.is_system());
    }
}
