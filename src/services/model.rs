use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One scraping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub name: String,
    /// Page the scraper was pointed at
    pub target_url: String,
    pub status: RunStatus,
    pub items_scraped: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
    pub name: String,
    pub target_url: String,
}

impl NewRun {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Run name is required".into());
        }
        if !(self.target_url.starts_with("http://") || self.target_url.starts_with("https://")) {
            return Err("Target URL must start with http:// or https://".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Bug,
    Feature,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub kind: FeedbackKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFeedback {
    pub kind: FeedbackKind,
    pub message: String,
}

impl NewFeedback {
    pub const MAX_LEN: usize = 2000;

    pub fn validate(&self) -> Result<(), String> {
        let len = self.message.trim().chars().count();
        if len == 0 {
            return Err("Feedback message is required".into());
        }
        if len > Self::MAX_LEN {
            return Err(format!(
                "Feedback message must be at most {} characters",
                Self::MAX_LEN
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Profile {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            display_name: user_id.to_string(),
            email: None,
            bio: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let len = self.display_name.trim().chars().count();
        if len == 0 || len > 64 {
            return Err("Display name must be 1 to 64 characters".into());
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err("Email address is invalid".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub email_on_completion: bool,
    pub email_on_failure: bool,
    pub weekly_digest: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_on_completion: false,
            email_on_failure: true,
            weekly_digest: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceSettings {
    pub theme: Theme,
    pub font_size: FontSize,
}

/// Model settings used when extracting structured data from scraped pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub extraction_prompt: Option<String>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            extraction_prompt: None,
        }
    }
}

impl AiSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model is required".into());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("Temperature must be between 0 and 2".into());
        }
        if !(1..=32_000).contains(&self.max_tokens) {
            return Err("Max tokens must be between 1 and 32000".into());
        }
        Ok(())
    }
}

/// Counts returned by the "delete my data" flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub runs: usize,
    pub feedback: usize,
}
