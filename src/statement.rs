//! Immutable query statements and their builder.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::callback::QueryCallback;
use crate::config::ClientConfig;

/// Reserved prefix for subscription identifiers.
///
/// Identifiers minted for subscription-style statements carry this prefix
/// so that provenance stays visible even when the id is all a collaborator
/// has. The prefix is about the shape of the id, not the semantics of the
/// query text; see [`QueryHandle::is_subscribe_id`] vs
/// [`QueryHandle::is_subscribe_query`].
///
/// [`QueryHandle::is_subscribe_id`]: crate::QueryHandle::is_subscribe_id
/// [`QueryHandle::is_subscribe_query`]: crate::QueryHandle::is_subscribe_query
pub const SUB_ID_PREFIX: &str = "$sub/";

/// Returns true if `query` reads as a subscription-style query.
///
/// Classification happens once, when a statement is built; everything else
/// is treated as a one-shot query. The query language itself is not parsed
/// here; only the leading keyword is inspected.
pub fn is_subscribe_text(query: &str) -> bool {
    let trimmed = query.trim_start();
    match trimmed.get(..9) {
        Some(head) if head.eq_ignore_ascii_case("subscribe") => trimmed[9..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace),
        _ => false,
    }
}

/// Immutable description of one asynchronous query request.
///
/// A statement is built once, handed to the dispatcher, and never mutated
/// for the lifetime of the handle that wraps it. Its `id` is the sole
/// equality key for the handle and the registry.
pub struct Statement {
    id: String,
    query: String,
    time_zone: Option<String>,
    date_range: String,
    repo_id: String,
    referrer: Option<String>,
    max_rows: u32,
    trace: bool,
    callback: Arc<dyn QueryCallback>,
}

impl Statement {
    /// Starts a builder for `query`, delivering into `callback`.
    pub fn builder(query: impl Into<String>, callback: Arc<dyn QueryCallback>) -> StatementBuilder {
        StatementBuilder {
            id: None,
            query: query.into(),
            time_zone: None,
            date_range: None,
            repo_id: None,
            referrer: None,
            max_rows: None,
            trace: None,
            callback,
        }
    }

    /// Stable identifier, unique per logical subscription.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Time zone for date interpretation, when set.
    pub fn time_zone(&self) -> Option<&str> {
        self.time_zone.as_deref()
    }

    /// Date range the query applies to.
    pub fn date_range(&self) -> &str {
        &self.date_range
    }

    /// Repository id; empty selects the token's home repository.
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Name of the query referrer, when set.
    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    /// Maximum rows per response.
    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    /// Whether server-side tracing was requested.
    pub fn is_trace(&self) -> bool {
        self.trace
    }

    /// Callback receiving this statement's results and completion.
    pub fn callback(&self) -> &Arc<dyn QueryCallback> {
        &self.callback
    }

    fn next_id(query: &str) -> String {
        let uuid = Uuid::new_v4();
        if is_subscribe_text(query) {
            format!("{SUB_ID_PREFIX}{uuid}")
        } else {
            uuid.to_string()
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("time_zone", &self.time_zone)
            .field("date_range", &self.date_range)
            .field("repo_id", &self.repo_id)
            .field("referrer", &self.referrer)
            .field("max_rows", &self.max_rows)
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Statement`]; unset fields fall back to [`ClientConfig`]
/// defaults at build time.
pub struct StatementBuilder {
    id: Option<String>,
    query: String,
    time_zone: Option<String>,
    date_range: Option<String>,
    repo_id: Option<String>,
    referrer: Option<String>,
    max_rows: Option<u32>,
    trace: Option<bool>,
    callback: Arc<dyn QueryCallback>,
}

impl StatementBuilder {
    /// Overrides the generated identifier.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Time zone for date interpretation.
    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }

    /// Date range the query applies to.
    pub fn date_range(mut self, date_range: impl Into<String>) -> Self {
        self.date_range = Some(date_range.into());
        self
    }

    /// Repository id to run against.
    pub fn repo_id(mut self, repo_id: impl Into<String>) -> Self {
        self.repo_id = Some(repo_id.into());
        self
    }

    /// Referrer name recorded with the query.
    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Maximum rows per response.
    pub fn max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Request server-side tracing for this statement.
    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Builds with [`ClientConfig::default`] for unset fields.
    pub fn build(self) -> Statement {
        self.build_with(&ClientConfig::default())
    }

    /// Builds, filling unset fields from `config`.
    pub fn build_with(self, config: &ClientConfig) -> Statement {
        let id = self
            .id
            .unwrap_or_else(|| Statement::next_id(&self.query));
        Statement {
            id,
            query: self.query,
            time_zone: self.time_zone.or_else(|| config.time_zone.clone()),
            date_range: self.date_range.unwrap_or_else(|| config.date_range.clone()),
            repo_id: self.repo_id.unwrap_or_else(|| config.repo_id.clone()),
            referrer: self.referrer,
            max_rows: self.max_rows.unwrap_or(config.max_rows),
            trace: self.trace.unwrap_or(config.trace),
            callback: self.callback,
        }
    }
}
