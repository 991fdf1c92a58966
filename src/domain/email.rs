use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Format used for `received_date` in the store and on the page.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A message as it comes off the wire, before classification.
#[derive(Debug, Clone)]
pub struct EmailRecord {
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub received_date: DateTime<Local>,
    pub content_hash: String,
}

impl EmailRecord {
    pub fn new(
        subject: String,
        sender: String,
        body: String,
        received_date: DateTime<Local>,
    ) -> Self {
        let content_hash = content_hash(&subject, &sender, &body);
        Self {
            subject,
            sender,
            body,
            received_date,
            content_hash,
        }
    }
}

/// Fingerprint of subject + sender + the first 100 characters of the body.
pub fn content_hash(subject: &str, sender: &str, body: &str) -> String {
    let head: String = body.chars().take(100).collect();
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(sender.as_bytes());
    hasher.update(head.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    #[serde(rename = "Work Progress")]
    WorkProgress,
    #[serde(rename = "Security Alerts")]
    SecurityAlerts,
    #[serde(rename = "Account Management")]
    AccountManagement,
    #[serde(rename = "Educational Notifications")]
    EducationalNotifications,
    #[serde(rename = "Job Opportunities")]
    JobOpportunities,
    Promotions,
    #[serde(rename = "Payment Notifications")]
    PaymentNotifications,
    #[serde(rename = "Personal Communications")]
    PersonalCommunications,
    #[serde(rename = "Technical Support")]
    TechnicalSupport,
    Compliance,
    Others,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::WorkProgress,
        Category::SecurityAlerts,
        Category::AccountManagement,
        Category::EducationalNotifications,
        Category::JobOpportunities,
        Category::Promotions,
        Category::PaymentNotifications,
        Category::PersonalCommunications,
        Category::TechnicalSupport,
        Category::Compliance,
        Category::Others,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::WorkProgress => "Work Progress",
            Category::SecurityAlerts => "Security Alerts",
            Category::AccountManagement => "Account Management",
            Category::EducationalNotifications => "Educational Notifications",
            Category::JobOpportunities => "Job Opportunities",
            Category::Promotions => "Promotions",
            Category::PaymentNotifications => "Payment Notifications",
            Category::PersonalCommunications => "Personal Communications",
            Category::TechnicalSupport => "Technical Support",
            Category::Compliance => "Compliance",
            Category::Others => "Others",
        }
    }

    /// Case-insensitive lookup; anything outside the set lands in `Others`.
    pub fn from_label(raw: &str) -> Self {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(wanted))
            .unwrap_or(Category::Others)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(Category::from_label(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Urgency {
    High,
    Medium,
    Low,
    /// Whatever the classifier or an older row said; ranks after `Low`.
    Other(String),
}

impl Urgency {
    pub fn as_str(&self) -> &str {
        match self {
            Urgency::High => "high",
            Urgency::Medium => "medium",
            Urgency::Low => "low",
            Urgency::Other(s) => s,
        }
    }

    /// Display rank: high=1, medium=2, low=3, anything else=4.
    pub fn rank(&self) -> u8 {
        match self {
            Urgency::High => 1,
            Urgency::Medium => 2,
            Urgency::Low => 3,
            Urgency::Other(_) => 4,
        }
    }
}

impl From<String> for Urgency {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Urgency::High,
            "medium" => Urgency::Medium,
            "low" => Urgency::Low,
            _ => Urgency::Other(raw),
        }
    }
}

impl From<Urgency> for String {
    fn from(u: Urgency) -> Self {
        u.as_str().to_string()
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the classifier says about one body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub summary: String,
    pub category: Category,
    pub from_: String,
    pub urgency: Urgency,
}

/// A fetched record merged with its classification, ready for insert.
#[derive(Debug, Clone)]
pub struct ClassifiedEmail {
    pub content_hash: String,
    pub subject: String,
    /// The classifier's reading of the sender, not the raw header.
    pub sender: String,
    pub body: String,
    pub summary: String,
    pub category: Category,
    pub urgency: Urgency,
    pub received_date: DateTime<Local>,
}

impl ClassifiedEmail {
    pub fn merge(record: EmailRecord, result: ClassificationResult) -> Self {
        Self {
            content_hash: record.content_hash,
            subject: record.subject,
            sender: result.from_,
            body: record.body,
            summary: result.summary,
            category: result.category,
            urgency: result.urgency,
            received_date: record.received_date,
        }
    }
}

/// A persisted row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEmail {
    pub id: i64,
    pub content_hash: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub summary: String,
    pub category: Category,
    pub urgency: Urgency,
    pub received_date: String,
    pub created_at: String,
}
