//! Key space for the client cache.
//!
//! A [`CacheKey`] is derived from a resource kind plus its path and query
//! parameters. The key is also the request path the fetcher calls, so the
//! builders percent-encode every parameter and emit query parameters in a
//! fixed order. Two equal inputs always give the same key, and no separator
//! inside a parameter can make two different inputs meet.

use chrono::NaiveDate;
use std::fmt;

/// Resource families served by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Runs,
    Feedback,
    Profile,
    Notifications,
    Appearance,
    AiSettings,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Runs,
        ResourceKind::Feedback,
        ResourceKind::Profile,
        ResourceKind::Notifications,
        ResourceKind::Appearance,
        ResourceKind::AiSettings,
    ];

    pub fn base_path(&self) -> &'static str {
        match self {
            ResourceKind::Runs => "/api/runs",
            ResourceKind::Feedback => "/api/feedback",
            ResourceKind::Profile => "/api/account/profile",
            ResourceKind::Notifications => "/api/account/notifications",
            ResourceKind::Appearance => "/api/account/appearance",
            ResourceKind::AiSettings => "/api/account/ai-settings",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Runs => "runs",
            ResourceKind::Feedback => "feedback",
            ResourceKind::Profile => "profile",
            ResourceKind::Notifications => "notifications",
            ResourceKind::Appearance => "appearance",
            ResourceKind::AiSettings => "ai-settings",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Query constraints for filtered list views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = &self.status {
            pairs.push(("status", status.clone()));
        }
        if let Some(from) = self.from {
            pairs.push(("from", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.format("%Y-%m-%d").to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        pairs
    }
}

/// Stable identifier of one logical resource query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Flat list key for a collection, or the key of a singleton resource.
    pub fn collection(kind: ResourceKind) -> Self {
        Self(kind.base_path().to_string())
    }

    pub fn detail(kind: ResourceKind, id: &str) -> Self {
        Self(format!("{}/{}", kind.base_path(), urlencoding::encode(id)))
    }

    /// A filter without constraints is the collection itself.
    pub fn filtered(kind: ResourceKind, filter: &ListFilter) -> Self {
        let pairs = filter.query_pairs();
        if pairs.is_empty() {
            return Self::collection(kind);
        }

        let query = pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        Self(format!("{}?{}", kind.base_path(), query))
    }

    /// Opaque key for a path that no builder covers.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn belongs_to(&self, kind: ResourceKind) -> bool {
        let base = kind.base_path();
        match self.0.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
