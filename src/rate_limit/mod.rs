//! # Rate Limiting
//!
//! Identifier- and action-scoped fixed-window quotas. Counters live in an
//! externally shared, durable store so limits hold across stateless
//! instances; admission control rides on the store's atomic
//! increment-and-check primitive rather than any in-process lock (which
//! would not help across instances anyway).
//!
//! A denial is a [`RateLimitDecision`] with `allowed: false` and a
//! retry-after for the caller to surface — it is not an error. Only the
//! backing store failing produces a [`RateLimitError`].

pub mod store;

pub use store::{InMemoryRateLimitStore, IncrementOutcome, PostgresRateLimitStore, RateLimitStore};

use crate::config::RateLimitSettings;
use crate::error::RateLimitError;
use crate::logging::log_rate_limit_decision;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Who is being limited: a user id, a device fingerprint, or an IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    User,
    Device,
    Ip,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Device => write!(f, "device"),
            Self::Ip => write!(f, "ip"),
        }
    }
}

/// A rate-limited caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl Identifier {
    pub fn user(value: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::User,
            value: value.into(),
        }
    }

    pub fn device(value: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::Device,
            value: value.into(),
        }
    }

    pub fn ip(value: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::Ip,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Endpoint category being limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Generate,
    Favorites,
    Analyze,
    Waitlist,
    Hooks,
}

impl Action {
    /// Tier assumed when the caller supplies none.
    ///
    /// Favorites requires an authenticated session upstream, so its default
    /// is the free tier; everything else defaults to anonymous.
    pub fn default_tier(self) -> Tier {
        match self {
            Action::Favorites => Tier::Free,
            _ => Tier::Anonymous,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Favorites => write!(f, "favorites"),
            Self::Analyze => write!(f, "analyze"),
            Self::Waitlist => write!(f, "waitlist"),
            Self::Hooks => write!(f, "hooks"),
        }
    }
}

/// Caller classification selecting which quota applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Anonymous,
    Free,
    Pro,
    Admin,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anon"),
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Storage key for one counter: `(identifier, action, window_start)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub identifier: String,
    pub action: String,
    pub window_start: DateTime<Utc>,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Seconds until the window rolls over; present only on denial
    pub retry_after_secs: Option<u64>,
    /// Requests left in the current window after this one
    pub remaining: u32,
    pub limit: u32,
}

/// Check and consume one request against the `(identifier, action)` quota
/// for the current fixed window.
///
/// The admission decision is made atomically by the store: concurrent
/// requests for the same identifier, action, and window can never admit
/// more than `limit` requests between them. A rejected request does not
/// bump the counter.
pub async fn check_rate_limit<S: RateLimitStore + ?Sized>(
    store: &S,
    settings: &RateLimitSettings,
    identifier: &Identifier,
    action: Action,
    tier: Option<Tier>,
) -> Result<RateLimitDecision, RateLimitError> {
    let tier = tier.unwrap_or_else(|| action.default_tier());
    let limit = settings.limit_for(action, tier);
    let window_secs = settings.window_seconds as i64;

    let now = Utc::now().timestamp();
    let window_start_ts = now - now.rem_euclid(window_secs);
    let window_start = Utc
        .timestamp_opt(window_start_ts, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let retry_after = (window_start_ts + window_secs - now).max(0) as u64;

    let key = WindowKey {
        identifier: identifier.to_string(),
        action: action.to_string(),
        window_start,
    };

    let decision = if limit == 0 {
        RateLimitDecision {
            allowed: false,
            retry_after_secs: Some(retry_after),
            remaining: 0,
            limit,
        }
    } else {
        match store.increment_if_below(&key, limit).await? {
            IncrementOutcome::Admitted { count } => RateLimitDecision {
                allowed: true,
                retry_after_secs: None,
                remaining: limit.saturating_sub(count),
                limit,
            },
            IncrementOutcome::Rejected => RateLimitDecision {
                allowed: false,
                retry_after_secs: Some(retry_after),
                remaining: 0,
                limit,
            },
        }
    };

    log_rate_limit_decision(
        &key.identifier,
        &key.action,
        decision.allowed,
        Some(limit.saturating_sub(decision.remaining)),
        decision.retry_after_secs,
    );

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitSettings;
    use futures::future::join_all;
    use std::sync::Arc;

    fn settings_with_limit(action: Action, tier: Tier, limit: u32) -> RateLimitSettings {
        let mut settings = RateLimitSettings::default();
        settings
            .limit_overrides
            .insert(format!("{action}:{tier}"), limit);
        settings
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_denies_with_retry_after() {
        let store = InMemoryRateLimitStore::new();
        let settings = settings_with_limit(Action::Generate, Tier::Free, 10);
        let id = Identifier::user("u1");

        for n in 1..=10 {
            let decision =
                check_rate_limit(&store, &settings, &id, Action::Generate, Some(Tier::Free))
                    .await
                    .unwrap();
            assert!(decision.allowed, "request {n} should be admitted");
            assert_eq!(decision.remaining, 10 - n);
        }

        let denied = check_rate_limit(&store, &settings, &id, Action::Generate, Some(Tier::Free))
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs.unwrap() > 0);
    }

    #[tokio::test]
    async fn different_identifier_is_unaffected() {
        let store = InMemoryRateLimitStore::new();
        let settings = settings_with_limit(Action::Generate, Tier::Free, 1);

        let first = Identifier::user("u1");
        let second = Identifier::user("u2");

        let _ = check_rate_limit(&store, &settings, &first, Action::Generate, Some(Tier::Free))
            .await
            .unwrap();
        let denied =
            check_rate_limit(&store, &settings, &first, Action::Generate, Some(Tier::Free))
                .await
                .unwrap();
        assert!(!denied.allowed);

        let other =
            check_rate_limit(&store, &settings, &second, Action::Generate, Some(Tier::Free))
                .await
                .unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn different_action_is_unaffected() {
        let store = InMemoryRateLimitStore::new();
        let mut settings = settings_with_limit(Action::Generate, Tier::Free, 1);
        settings
            .limit_overrides
            .insert("favorites:free".to_string(), 5);
        let id = Identifier::user("u1");

        let _ = check_rate_limit(&store, &settings, &id, Action::Generate, Some(Tier::Free))
            .await
            .unwrap();
        let denied = check_rate_limit(&store, &settings, &id, Action::Generate, Some(Tier::Free))
            .await
            .unwrap();
        assert!(!denied.allowed);

        let favorites =
            check_rate_limit(&store, &settings, &id, Action::Favorites, Some(Tier::Free))
                .await
                .unwrap();
        assert!(favorites.allowed);
    }

    #[tokio::test]
    async fn burst_of_concurrent_requests_never_over_admits() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let settings = Arc::new(settings_with_limit(Action::Generate, Tier::Free, 10));
        let id = Identifier::user("u1");

        let tasks: Vec<_> = (0..25)
            .map(|_| {
                let store = store.clone();
                let settings = settings.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    check_rate_limit(&*store, &settings, &id, Action::Generate, Some(Tier::Free))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let decisions: Vec<RateLimitDecision> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let admitted = decisions.iter().filter(|d| d.allowed).count();
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn window_rollover_resets_the_quota() {
        let store = InMemoryRateLimitStore::new();
        let mut settings = settings_with_limit(Action::Waitlist, Tier::Anonymous, 1);
        settings.window_seconds = 1;
        let id = Identifier::ip("203.0.113.9");

        let first = check_rate_limit(&store, &settings, &id, Action::Waitlist, None)
            .await
            .unwrap();
        assert!(first.allowed);

        let denied = check_rate_limit(&store, &settings, &id, Action::Waitlist, None)
            .await
            .unwrap();
        assert!(!denied.allowed);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let after_rollover = check_rate_limit(&store, &settings, &id, Action::Waitlist, None)
            .await
            .unwrap();
        assert!(after_rollover.allowed);
    }

    #[tokio::test]
    async fn zero_limit_denies_without_touching_the_store() {
        let store = InMemoryRateLimitStore::new();
        let settings = settings_with_limit(Action::Generate, Tier::Anonymous, 0);
        let id = Identifier::ip("203.0.113.9");

        let denied = check_rate_limit(&store, &settings, &id, Action::Generate, None)
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(store.window_count(), 0);
    }

    #[test]
    fn identifier_formats_as_kind_colon_value() {
        assert_eq!(Identifier::user("42").to_string(), "user:42");
        assert_eq!(Identifier::device("abc").to_string(), "device:abc");
        assert_eq!(Identifier::ip("10.0.0.1").to_string(), "ip:10.0.0.1");
    }
}
