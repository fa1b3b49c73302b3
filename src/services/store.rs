//! In-memory record store.
//!
//! Every record is owned by one user id and nothing crosses between users:
//! asking for another user's run answers exactly like asking for a run that
//! never existed.

use crate::cache::PageInfo;
use crate::services::model::{
    AiSettings, AppearanceSettings, DeletionSummary, Feedback, FeedbackKind, NewFeedback, NewRun,
    NotificationSettings, Profile, Run, RunStatus,
};
use chrono::{Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Query string accepted by the run listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunQuery {
    pub status: Option<RunStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunPage {
    pub runs: Vec<Run>,
    pub pagination: PageInfo,
}

#[derive(Debug, Default)]
struct UserData {
    runs: Vec<Run>,
    feedback: Vec<Feedback>,
    profile: Option<Profile>,
    notifications: Option<NotificationSettings>,
    appearance: Option<AppearanceSettings>,
    ai_settings: Option<AiSettings>,
}

#[derive(Clone, Default)]
pub struct Store {
    users: Arc<DashMap<String, UserData>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with a handful of runs and one feedback entry per user.
    pub fn with_demo_data(user_ids: &[String]) -> Self {
        let store = Self::new();
        let now = Utc::now();
        let samples = [
            ("Product catalogue", "https://shop.example.com/catalogue", RunStatus::Completed, 1240),
            ("Job board", "https://jobs.example.com/listings", RunStatus::Completed, 318),
            ("Price watch", "https://prices.example.com/daily", RunStatus::Failed, 12),
            ("News digest", "https://news.example.com/", RunStatus::Running, 57),
        ];

        for user_id in user_ids {
            let mut data = store.users.entry(user_id.clone()).or_default();
            for (offset, (name, url, status, items)) in samples.iter().enumerate() {
                let created_at = now - Duration::days(offset as i64 * 3 + 1);
                data.runs.push(Run {
                    id: new_id(),
                    name: name.to_string(),
                    target_url: url.to_string(),
                    status: *status,
                    items_scraped: *items,
                    created_at,
                    finished_at: match status {
                        RunStatus::Completed | RunStatus::Failed => {
                            Some(created_at + Duration::minutes(14))
                        }
                        _ => None,
                    },
                });
            }
            data.feedback.push(Feedback {
                id: new_id(),
                kind: FeedbackKind::Feature,
                message: "Export runs as CSV".to_string(),
                created_at: now - Duration::days(2),
            });
        }

        info!(users = user_ids.len(), "Demo data loaded");
        store
    }

    /// Runs of one user, newest first, filtered and paginated.
    pub fn list_runs(&self, user_id: &str, query: &RunQuery) -> RunPage {
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);

        let mut matching: Vec<Run> = self
            .users
            .get(user_id)
            .map(|data| {
                data.runs
                    .iter()
                    .filter(|run| query.status.map_or(true, |s| run.status == s))
                    .filter(|run| {
                        let day = run.created_at.date_naive();
                        query.from.map_or(true, |from| day >= from)
                            && query.to.map_or(true, |to| day <= to)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let total_pages = total.div_ceil(per_page as u64) as u32;
        let offset = (page as u64 - 1).saturating_mul(per_page as u64);
        let runs = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(per_page as usize)
            .collect();

        RunPage {
            runs,
            pagination: PageInfo {
                page: Some(page),
                per_page: Some(per_page),
                total: Some(total),
                total_pages: Some(total_pages),
            },
        }
    }

    pub fn get_run(&self, user_id: &str, run_id: &str) -> Option<Run> {
        self.users
            .get(user_id)?
            .runs
            .iter()
            .find(|run| run.id == run_id)
            .cloned()
    }

    pub fn create_run(&self, user_id: &str, new_run: NewRun) -> Run {
        let run = Run {
            id: new_id(),
            name: new_run.name.trim().to_string(),
            target_url: new_run.target_url,
            status: RunStatus::Pending,
            items_scraped: 0,
            created_at: Utc::now(),
            finished_at: None,
        };
        self.users
            .entry(user_id.to_string())
            .or_default()
            .runs
            .push(run.clone());
        debug!(user = user_id, run = %run.id, "Run created");
        run
    }

    /// Returns false when the user owns no run with this id.
    pub fn delete_run(&self, user_id: &str, run_id: &str) -> bool {
        let Some(mut data) = self.users.get_mut(user_id) else {
            return false;
        };
        let before = data.runs.len();
        data.runs.retain(|run| run.id != run_id);
        before != data.runs.len()
    }

    pub fn list_feedback(&self, user_id: &str) -> Vec<Feedback> {
        let mut feedback = self
            .users
            .get(user_id)
            .map(|data| data.feedback.clone())
            .unwrap_or_default();
        feedback.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        feedback
    }

    pub fn submit_feedback(&self, user_id: &str, new_feedback: NewFeedback) -> Feedback {
        let feedback = Feedback {
            id: new_id(),
            kind: new_feedback.kind,
            message: new_feedback.message.trim().to_string(),
            created_at: Utc::now(),
        };
        self.users
            .entry(user_id.to_string())
            .or_default()
            .feedback
            .push(feedback.clone());
        feedback
    }

    pub fn profile(&self, user_id: &str) -> Profile {
        self.users
            .get(user_id)
            .and_then(|data| data.profile.clone())
            .unwrap_or_else(|| Profile::for_user(user_id))
    }

    pub fn update_profile(&self, user_id: &str, profile: Profile) -> Profile {
        self.users.entry(user_id.to_string()).or_default().profile = Some(profile.clone());
        profile
    }

    pub fn notifications(&self, user_id: &str) -> NotificationSettings {
        self.users
            .get(user_id)
            .and_then(|data| data.notifications.clone())
            .unwrap_or_default()
    }

    pub fn update_notifications(
        &self,
        user_id: &str,
        settings: NotificationSettings,
    ) -> NotificationSettings {
        self.users.entry(user_id.to_string()).or_default().notifications = Some(settings.clone());
        settings
    }

    pub fn appearance(&self, user_id: &str) -> AppearanceSettings {
        self.users
            .get(user_id)
            .and_then(|data| data.appearance.clone())
            .unwrap_or_default()
    }

    pub fn update_appearance(
        &self,
        user_id: &str,
        settings: AppearanceSettings,
    ) -> AppearanceSettings {
        self.users.entry(user_id.to_string()).or_default().appearance = Some(settings.clone());
        settings
    }

    pub fn ai_settings(&self, user_id: &str) -> AiSettings {
        self.users
            .get(user_id)
            .and_then(|data| data.ai_settings.clone())
            .unwrap_or_default()
    }

    pub fn update_ai_settings(&self, user_id: &str, settings: AiSettings) -> AiSettings {
        self.users.entry(user_id.to_string()).or_default().ai_settings = Some(settings.clone());
        settings
    }

    /// Drops every record the user owns, account settings included.
    pub fn delete_user_data(&self, user_id: &str) -> DeletionSummary {
        let summary = self
            .users
            .remove(user_id)
            .map(|(_, data)| DeletionSummary {
                runs: data.runs.len(),
                feedback: data.feedback.len(),
            })
            .unwrap_or_default();
        info!(
            user = user_id,
            runs = summary.runs,
            feedback = summary.feedback,
            "User data deleted"
        );
        summary
    }
}

fn new_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
