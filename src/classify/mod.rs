pub mod gemini;

use anyhow::{Context, Result};

use crate::domain::email::ClassificationResult;

/// Classification prompt; `{email}` is replaced with the body text.
pub const ANALYSIS_PROMPT: &str = r#"You're assisting a professional by analyzing incoming emails. Extract the most relevant insights and assign a priority level.
Instructions:
- Summarize the main topic or request described in the email in a clear and concise manner.
- Classify the email into one of the following categories based on its primary purpose:
  - Work Progress
  - Security Alerts
  - Account Management
  - Educational Notifications
  - Job Opportunities
  - Promotions
  - Payment Notifications
  - Personal Communications
  - Technical Support
  - Compliance
  - Others
- Identify the sender (person or organization) from whom the email was received.
- Determine the urgency of the email based on its content:
  - Use 'high' if the message includes complaints, system failures, urgent requests, or time-sensitive issues.
  - Use 'medium' if the email contains important but non-urgent inquiries, business updates, or general feedback.
  - Use 'low' if the email is routine, contains general praise, or does not require immediate action.

Email:
{email}

Output Format:
```json
{
  "summary": "Brief summary of the email",
  "category": "Email category (Work Progress, Security Alerts, Account Management, Educational Notifications, Job Opportunities, Promotions, Payment Notifications, Personal Communications, Technical Support, Compliance, or Others)",
  "from_": "Name or email of the sender",
  "urgency": "high | medium | low"
}
```"#;

pub fn build_prompt(body: &str) -> String {
    ANALYSIS_PROMPT.replace("{email}", body)
}

/// Batch classifier. Output has the same length and order as `bodies`;
/// any failure fails the whole batch.
pub trait Classifier {
    fn classify(&self, bodies: &[String]) -> Result<Vec<ClassificationResult>>;
}

/// Parse a model reply, tolerating a surrounding Markdown code fence.
pub fn parse_reply(text: &str) -> Result<ClassificationResult> {
    let json = strip_code_fence(text);
    serde_json::from_str(json)
        .with_context(|| format!("classifier reply is not the expected JSON: {text:?}"))
}

fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // info string ("json"), with or without a newline after it
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}
