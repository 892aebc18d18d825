#![allow(missing_docs)]

/// Default date range applied to statements that do not set one.
pub const DEFAULT_DATE_RANGE: &str = "today";
/// Default repository id; empty selects the token's home repository.
pub const DEFAULT_REPO: &str = "";
/// Default row cap for query responses.
pub const DEFAULT_MAX_ROWS: u32 = 100;

/// Client-side defaults seeded into statement builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub time_zone: Option<String>,
    pub date_range: String,
    pub repo_id: String,
    pub max_rows: u32,
    pub trace: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            time_zone: None,
            date_range: DEFAULT_DATE_RANGE.to_owned(),
            repo_id: DEFAULT_REPO.to_owned(),
            max_rows: DEFAULT_MAX_ROWS,
            trace: false,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with server-side tracing enabled on every statement.
    pub fn traced() -> Self {
        Self {
            trace: true,
            ..Self::default()
        }
    }
}
