//! Request-scoped correlation context.
//!
//! `CorrelationScope` holds the correlation identifier, request path and user
//! id of the inbound request being served. It lives in task-local storage so
//! loggers and outbound clients can read it without the values being threaded
//! through every call signature.
//!
//! Tokio task-local variables are not inherited across spawned tasks. Wrap the
//! spawned future with [`CorrelationScope::propagate`] so the child task shares
//! the caller's scope.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::Either;
use tokio::task_local;
use uuid::Uuid;

/// Header carrying the correlation identifier across service boundaries.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
/// Scope key for the correlation identifier.
pub const CORRELATION_ID_KEY: &str = "correlationId";
/// Scope key for the authenticated user id.
pub const USER_ID_KEY: &str = "userId";
/// Scope key for the inbound request path.
pub const REQUEST_PATH_KEY: &str = "requestPath";

const CORRELATION_ID_MAX_LEN: usize = 128;

task_local! {
    static SCOPE: CorrelationScope;
}

/// Validation failures for inbound correlation identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationIdError {
    /// The identifier was blank.
    #[error("correlation id must not be empty")]
    Empty,
    /// The identifier exceeded the accepted length.
    #[error("correlation id must be at most {max} characters")]
    TooLong { max: usize },
    /// The identifier contained characters that cannot travel in a header.
    #[error("correlation id must contain visible ASCII characters only")]
    InvalidCharacters,
}

/// Opaque identifier tying together every log line and downstream call made
/// while handling one inbound request.
///
/// # Examples
/// ```
/// use backend_core::domain::CorrelationId;
///
/// let id = CorrelationId::parse("req-42").expect("valid id");
/// assert_eq!(id.as_str(), "req-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationIdError`] when the value is blank, too long, or not
    /// safe to echo back in a response header.
    pub fn parse(raw: &str) -> Result<Self, CorrelationIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CorrelationIdError::Empty);
        }
        if trimmed.len() > CORRELATION_ID_MAX_LEN {
            return Err(CorrelationIdError::TooLong {
                max: CORRELATION_ID_MAX_LEN,
            });
        }
        if !trimmed.bytes().all(|byte| byte.is_ascii_graphic()) {
            return Err(CorrelationIdError::InvalidCharacters);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Reuse the inbound header value when it is usable, otherwise mint a new id.
    #[must_use]
    pub fn from_header_or_generate(raw: Option<&str>) -> Self {
        raw.and_then(|value| Self::parse(value).ok())
            .unwrap_or_else(Self::generate)
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CorrelationId {
    type Err = CorrelationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Values held by one correlation scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeValues {
    /// Correlation identifier of the request.
    pub correlation_id: CorrelationId,
    /// Path (and query) of the inbound request.
    pub request_path: String,
    /// Authenticated user, when the request carried one.
    pub user_id: Option<String>,
    extra: BTreeMap<String, String>,
}

impl ScopeValues {
    /// Seed a scope with the two values every request has.
    #[must_use]
    pub fn new(correlation_id: CorrelationId, request_path: impl Into<String>) -> Self {
        Self {
            correlation_id,
            request_path: request_path.into(),
            user_id: None,
            extra: BTreeMap::new(),
        }
    }

    /// Attach the authenticated user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Read a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            CORRELATION_ID_KEY => Some(self.correlation_id.to_string()),
            REQUEST_PATH_KEY => Some(self.request_path.clone()),
            USER_ID_KEY => self.user_id.clone(),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Write a value by key.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationIdError`] when replacing the correlation id with an
    /// invalid value; the previous id is kept.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), CorrelationIdError> {
        let value = value.into();
        match key {
            CORRELATION_ID_KEY => self.correlation_id = CorrelationId::parse(&value)?,
            REQUEST_PATH_KEY => self.request_path = value,
            USER_ID_KEY => self.user_id = Some(value),
            other => {
                self.extra.insert(other.to_owned(), value);
            }
        }
        Ok(())
    }
}

/// Handle to the correlation scope of the request currently being served.
///
/// Clones share the same values, so a mutation made through one handle is
/// visible to every continuation of the request.
///
/// # Examples
/// ```
/// use backend_core::domain::{CorrelationId, CorrelationScope, ScopeValues};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let id = CorrelationId::parse("abc").expect("valid id");
/// let seen = CorrelationScope::run(ScopeValues::new(id.clone(), "/users"), async {
///     CorrelationScope::correlation_id()
/// })
/// .await;
/// assert_eq!(seen, Some(id));
/// assert!(CorrelationScope::correlation_id().is_none());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CorrelationScope {
    values: Arc<RwLock<ScopeValues>>,
}

impl CorrelationScope {
    fn new(values: ScopeValues) -> Self {
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// Execute `fut` with a fresh scope seeded from `values`.
    ///
    /// A scope opened while another is active shadows it for the duration of
    /// `fut`; the two never share values.
    pub async fn run<Fut>(values: ScopeValues, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        SCOPE.scope(Self::new(values), fut).await
    }

    /// Synchronous counterpart of [`CorrelationScope::run`].
    pub fn run_sync<R>(values: ScopeValues, f: impl FnOnce() -> R) -> R {
        SCOPE.sync_scope(Self::new(values), f)
    }

    /// Wrap `fut` so it runs inside the caller's scope, if any.
    ///
    /// Use this when handing work to `tokio::spawn`.
    pub fn propagate<Fut>(fut: Fut) -> impl Future<Output = Fut::Output>
    where
        Fut: Future,
    {
        match Self::current() {
            Some(scope) => Either::Left(SCOPE.scope(scope, fut)),
            None => Either::Right(fut),
        }
    }

    /// Handle to the active scope.
    #[must_use]
    pub fn current() -> Option<Self> {
        SCOPE.try_with(Clone::clone).ok()
    }

    /// Copy of the active scope's values.
    #[must_use]
    pub fn snapshot() -> Option<ScopeValues> {
        SCOPE.try_with(Self::read).ok()
    }

    /// Correlation id of the active scope.
    #[must_use]
    pub fn correlation_id() -> Option<CorrelationId> {
        SCOPE
            .try_with(|scope| scope.read_with(|values| values.correlation_id.clone()))
            .ok()
    }

    /// Read a key from the active scope.
    #[must_use]
    pub fn get(key: &str) -> Option<String> {
        SCOPE
            .try_with(|scope| scope.read_with(|values| values.get(key)))
            .ok()
            .flatten()
    }

    /// Write a key into the active scope.
    ///
    /// Returns `false` when no scope is active or the value was rejected.
    pub fn set(key: &str, value: impl Into<String>) -> bool {
        let value = value.into();
        SCOPE
            .try_with(|scope| {
                let mut values = scope
                    .values
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                values.set(key, value).is_ok()
            })
            .unwrap_or(false)
    }

    fn read(&self) -> ScopeValues {
        self.read_with(Clone::clone)
    }

    fn read_with<R>(&self, f: impl FnOnce(&ScopeValues) -> R) -> R {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        f(&values)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    fn values(id: &str) -> ScopeValues {
        ScopeValues::new(CorrelationId::parse(id).expect("valid id"), "/api/v1/users")
    }

    #[rstest]
    #[case::blank("   ", CorrelationIdError::Empty)]
    #[case::space_inside("a b", CorrelationIdError::InvalidCharacters)]
    #[case::newline("a\nb", CorrelationIdError::InvalidCharacters)]
    fn parse_rejects_unusable_ids(#[case] raw: &str, #[case] expected: CorrelationIdError) {
        assert_eq!(CorrelationId::parse(raw), Err(expected));
    }

    #[test]
    fn parse_rejects_oversized_ids() {
        let raw = "x".repeat(CORRELATION_ID_MAX_LEN + 1);
        assert_eq!(
            CorrelationId::parse(&raw),
            Err(CorrelationIdError::TooLong {
                max: CORRELATION_ID_MAX_LEN
            })
        );
    }

    #[test]
    fn header_value_is_reused_when_valid() {
        let id = CorrelationId::from_header_or_generate(Some("trace-123"));
        assert_eq!(id.as_str(), "trace-123");
    }

    #[rstest]
    #[case::missing(None)]
    #[case::blank(Some(""))]
    fn header_value_falls_back_to_generated_uuid(#[case] raw: Option<&str>) {
        let id = CorrelationId::from_header_or_generate(raw);
        assert!(Uuid::parse_str(id.as_str()).is_ok(), "expected a UUID, got {id}");
    }

    #[tokio::test]
    async fn scope_is_visible_after_await_points() {
        let observed = CorrelationScope::run(values("req-1"), async {
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            CorrelationScope::get(CORRELATION_ID_KEY)
        })
        .await;
        assert_eq!(observed.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn nothing_is_visible_outside_a_scope() {
        assert!(CorrelationScope::current().is_none());
        assert!(CorrelationScope::get(REQUEST_PATH_KEY).is_none());
        assert!(!CorrelationScope::set(USER_ID_KEY, "u-1"));
    }

    #[tokio::test]
    async fn mutations_are_seen_by_later_continuations() {
        let observed = CorrelationScope::run(values("req-2"), async {
            assert!(CorrelationScope::set(USER_ID_KEY, "user-9"));
            assert!(CorrelationScope::set("tenant", "acme"));
            tokio::task::yield_now().await;
            (
                CorrelationScope::get(USER_ID_KEY),
                CorrelationScope::get("tenant"),
            )
        })
        .await;
        assert_eq!(observed.0.as_deref(), Some("user-9"));
        assert_eq!(observed.1.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn invalid_correlation_id_mutation_is_rejected() {
        let observed = CorrelationScope::run(values("req-3"), async {
            let accepted = CorrelationScope::set(CORRELATION_ID_KEY, "has space");
            (accepted, CorrelationScope::correlation_id())
        })
        .await;
        assert!(!observed.0);
        assert_eq!(observed.1.map(|id| id.to_string()).as_deref(), Some("req-3"));
    }

    #[tokio::test]
    async fn concurrent_scopes_stay_isolated() {
        let first = CorrelationScope::run(values("first"), async {
            tokio::task::yield_now().await;
            CorrelationScope::get(CORRELATION_ID_KEY)
        });
        let second = CorrelationScope::run(values("second"), async {
            tokio::task::yield_now().await;
            CorrelationScope::get(CORRELATION_ID_KEY)
        });
        let (first, second) = tokio::join!(first, second);
        assert_eq!(first.as_deref(), Some("first"));
        assert_eq!(second.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn propagated_tasks_share_the_scope() {
        let observed = CorrelationScope::run(values("parent"), async {
            let child = tokio::spawn(CorrelationScope::propagate(async {
                CorrelationScope::set("child", "ran");
                CorrelationScope::get(CORRELATION_ID_KEY)
            }));
            let child_id = child.await.expect("child task joins");
            (child_id, CorrelationScope::get("child"))
        })
        .await;
        assert_eq!(observed.0.as_deref(), Some("parent"));
        assert_eq!(observed.1.as_deref(), Some("ran"));
    }

    #[tokio::test]
    async fn spawned_tasks_without_propagation_see_no_scope() {
        let observed = CorrelationScope::run(values("parent"), async {
            tokio::spawn(async { CorrelationScope::correlation_id() })
                .await
                .expect("task joins")
        })
        .await;
        assert!(observed.is_none());
    }

    #[test]
    fn sync_scope_exposes_values() {
        let observed = CorrelationScope::run_sync(values("sync"), || {
            CorrelationScope::snapshot().map(|values| values.request_path)
        });
        assert_eq!(observed.as_deref(), Some("/api/v1/users"));
    }
}
