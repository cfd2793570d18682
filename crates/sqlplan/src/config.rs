//! Per-table execution settings.

/// What `upsert` does when the dialect has no native ON CONFLICT clause.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpsertFallback {
    /// Run UPDATE, then INSERT if nothing matched. Not atomic: callers that
    /// need atomicity pass a transaction as the executor.
    #[default]
    Emulate,
    /// Fail with `RenderError::Unsupported` instead of emulating.
    Reject,
}

/// Settings shared by every builder created from one [`Table`](crate::Table).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableConfig {
    pub upsert_fallback: UpsertFallback,
    /// LIMIT applied by `fetch_all`/`fetch_records` when the plan sets none.
    pub default_limit: Option<u64>,
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upsert_fallback(mut self, fallback: UpsertFallback) -> Self {
        self.upsert_fallback = fallback;
        self
    }

    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = Some(limit);
        self
    }
}
