//! Writes issued by the client.
//!
//! Each action performs one request and then invalidates every cached key of
//! the resource kinds the write touched, so subscribers converge on the
//! server's new state.

use crate::cache::{CacheController, CacheKey, PendingFetch, ResourceKind};
use crate::client::api::ApiClient;
use crate::error::TrawlError;
use crate::services::model::{
    AiSettings, AppearanceSettings, NewFeedback, NewRun, NotificationSettings, Profile,
};
use futures::future::join_all;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Result of a write plus the refetches it started.
pub struct MutationOutcome {
    pub value: Value,
    pub refreshes: Vec<PendingFetch>,
}

impl MutationOutcome {
    /// Wait for every refetch. Refetch failures land on their cache entries
    /// and are only logged here.
    pub async fn wait_refreshed(self) -> Value {
        let results = join_all(self.refreshes.into_iter().map(|pending| async move {
            let key = pending.key().clone();
            (key, pending.wait().await)
        }))
        .await;

        for (key, result) in results {
            if let Err(e) = result {
                warn!(cache_key = %key, error = %e, "Refetch after write failed");
            }
        }
        self.value
    }
}

#[derive(Clone)]
pub struct MutationActions {
    api: ApiClient,
    cache: CacheController,
}

impl MutationActions {
    pub fn new(api: ApiClient, cache: CacheController) -> Self {
        Self { api, cache }
    }

    pub async fn create_run(&self, run: &NewRun) -> Result<MutationOutcome, TrawlError> {
        self.write(Method::POST, ResourceKind::Runs.base_path(), Some(run), &[ResourceKind::Runs])
            .await
    }

    pub async fn delete_run(&self, id: &str) -> Result<MutationOutcome, TrawlError> {
        let key = CacheKey::detail(ResourceKind::Runs, id);
        self.write::<()>(Method::DELETE, key.as_str(), None, &[ResourceKind::Runs])
            .await
    }

    pub async fn submit_feedback(&self, feedback: &NewFeedback) -> Result<MutationOutcome, TrawlError> {
        self.write(
            Method::POST,
            ResourceKind::Feedback.base_path(),
            Some(feedback),
            &[ResourceKind::Feedback],
        )
        .await
    }

    pub async fn update_profile(&self, profile: &Profile) -> Result<MutationOutcome, TrawlError> {
        self.put(ResourceKind::Profile, profile).await
    }

    pub async fn update_notifications(
        &self,
        settings: &NotificationSettings,
    ) -> Result<MutationOutcome, TrawlError> {
        self.put(ResourceKind::Notifications, settings).await
    }

    pub async fn update_appearance(
        &self,
        settings: &AppearanceSettings,
    ) -> Result<MutationOutcome, TrawlError> {
        self.put(ResourceKind::Appearance, settings).await
    }

    pub async fn update_ai_settings(&self, settings: &AiSettings) -> Result<MutationOutcome, TrawlError> {
        self.put(ResourceKind::AiSettings, settings).await
    }

    /// Delete everything the signed-in user owns. Every resource kind is
    /// invalidated afterwards.
    pub async fn delete_my_data(&self) -> Result<MutationOutcome, TrawlError> {
        self.write::<()>(Method::DELETE, "/api/account/data", None, &ResourceKind::ALL)
            .await
    }

    async fn put<T: Serialize>(&self, kind: ResourceKind, body: &T) -> Result<MutationOutcome, TrawlError> {
        self.write(Method::PUT, kind.base_path(), Some(body), &[kind]).await
    }

    async fn write<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
        affected: &[ResourceKind],
    ) -> Result<MutationOutcome, TrawlError> {
        let body = body.map(serde_json::to_value).transpose()?;
        let value = self.api.send(method, path, body.as_ref()).await?;

        let mut refreshes = Vec::new();
        for kind in affected {
            refreshes.extend(self.cache.invalidate_resource(*kind).await);
        }
        debug!(path = path, refreshes = refreshes.len(), "Write applied");

        Ok(MutationOutcome { value, refreshes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{spawn_server, ALICE};
    use crate::cache::{ControllerConfig, EntryState};
    use crate::client::seed::prefetch_seeds;
    use crate::metrics::create_metrics;
    use crate::services::model::{FeedbackKind, Theme};
    use crate::services::Store;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn session(store: Store) -> (MutationActions, CacheController) {
        let base = spawn_server(store).await;
        let api = ApiClient::new(&base, Some(ALICE.to_string()), Duration::from_secs(5)).unwrap();
        let cache = CacheController::new(
            Arc::new(api.clone()),
            ControllerConfig::default(),
            create_metrics().unwrap(),
        );
        (MutationActions::new(api, cache.clone()), cache)
    }

    fn run_count(value: &Value) -> usize {
        value.as_array().map(Vec::len).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_create_run_refreshes_seeded_list() {
        let (actions, cache) = session(Store::with_demo_data(&["alice".to_string()])).await;
        let runs = CacheKey::collection(ResourceKind::Runs);

        let seeds = prefetch_seeds(&actions.api, vec![runs.clone()]).await;
        cache.seed_many(seeds).await;
        let mut sub = cache.subscribe(runs.clone()).await;
        assert_eq!(sub.current().state, EntryState::Seeded);
        cache.mark_first_commit();

        let outcome = actions
            .create_run(&NewRun {
                name: "prices".into(),
                target_url: "https://example.com".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.refreshes.len(), 1);
        let created = outcome.wait_refreshed().await;
        assert_eq!(created["status"], json!("pending"));

        let view = sub.settled().await;
        assert_eq!(view.state, EntryState::Fresh);
        let list = view.value.unwrap();
        assert_eq!(run_count(&list), 5);
        assert_eq!(list[0]["id"], created["id"]);
    }

    #[tokio::test]
    async fn test_write_while_paused_does_not_refetch() {
        let (actions, cache) = session(Store::new()).await;
        cache
            .seed(CacheKey::collection(ResourceKind::Feedback), json!([]))
            .await;

        let outcome = actions
            .submit_feedback(&NewFeedback {
                kind: FeedbackKind::Bug,
                message: "Export stalls".into(),
            })
            .await
            .unwrap();

        assert!(outcome.refreshes.is_empty());
        let view = cache
            .read(&CacheKey::collection(ResourceKind::Feedback))
            .await
            .unwrap();
        assert_eq!(view.value, Some(json!([])));
    }

    #[tokio::test]
    async fn test_delete_my_data_invalidates_every_kind() {
        let (actions, cache) = session(Store::with_demo_data(&["alice".to_string()])).await;
        let runs = CacheKey::collection(ResourceKind::Runs);
        let appearance = CacheKey::collection(ResourceKind::Appearance);

        actions
            .update_appearance(&AppearanceSettings {
                theme: Theme::Dark,
                ..AppearanceSettings::default()
            })
            .await
            .unwrap();

        let seeds = prefetch_seeds(&actions.api, vec![runs.clone(), appearance.clone()]).await;
        assert_eq!(seeds.len(), 2);
        cache.seed_many(seeds).await;
        cache.mark_first_commit();

        let outcome = actions.delete_my_data().await.unwrap();
        assert_eq!(outcome.value, json!({"runs": 4, "feedback": 1}));
        assert_eq!(outcome.refreshes.len(), 2);
        outcome.wait_refreshed().await;

        let runs_view = cache.read(&runs).await.unwrap();
        assert_eq!(runs_view.value, Some(json!([])));
        let appearance_view = cache.read(&appearance).await.unwrap();
        assert_eq!(appearance_view.value.unwrap()["theme"], json!("system"));
    }

    #[tokio::test]
    async fn test_settings_writes_refresh_their_own_kind() {
        let (actions, cache) = session(Store::new()).await;
        let profile = CacheKey::collection(ResourceKind::Profile);
        let ai = CacheKey::collection(ResourceKind::AiSettings);
        let notifications = CacheKey::collection(ResourceKind::Notifications);

        let seeds = prefetch_seeds(
            &actions.api,
            vec![profile.clone(), ai.clone(), notifications.clone()],
        )
        .await;
        cache.seed_many(seeds).await;
        cache.mark_first_commit();

        let outcome = actions
            .update_ai_settings(&AiSettings {
                temperature: 1.1,
                ..AiSettings::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.refreshes.len(), 1);
        assert_eq!(outcome.refreshes[0].key(), &ai);
        outcome.wait_refreshed().await;
        let ai_view = cache.read(&ai).await.unwrap();
        assert_eq!(ai_view.value.unwrap()["temperature"], json!(1.1));
        assert_eq!(cache.read(&profile).await.unwrap().state, EntryState::Seeded);

        let outcome = actions
            .update_notifications(&NotificationSettings {
                weekly_digest: true,
                ..NotificationSettings::default()
            })
            .await
            .unwrap();
        outcome.wait_refreshed().await;
        assert_eq!(
            cache.read(&notifications).await.unwrap().value.unwrap()["weekly_digest"],
            json!(true)
        );

        let invalid = actions
            .update_profile(&Profile {
                display_name: String::new(),
                email: None,
                bio: None,
            })
            .await;
        assert!(matches!(
            invalid,
            Err(TrawlError::Transport {
                status: Some(400),
                ..
            })
        ));
        assert_eq!(cache.read(&profile).await.unwrap().state, EntryState::Seeded);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_alone() {
        let (actions, cache) = session(Store::new()).await;
        let runs = CacheKey::collection(ResourceKind::Runs);
        cache.seed(runs.clone(), json!([])).await;
        cache.mark_first_commit();

        let result = actions.delete_run("0123456789abcdef").await;
        assert!(matches!(result, Err(TrawlError::NotFound(_))));
        assert!(cache.pending(&runs).await.is_none());
    }
}
