//! Per-execution query context.
//!
//! One [`QueryContext`] is created per top-level invocation and shared by `Arc`
//! with every cursor in the tree. It carries the cancellation flag, the store
//! adapter (and its locking hooks), the cast registry, configuration, and
//! diagnostics (warnings and timing taps).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ExecutionConfig;
use crate::error::{CastError, QueryError, Result};
use crate::row::SharedRow;
use crate::store::StoreAdapter;
use crate::tap::{TapGuard, TapRecorder, TapStats};
use crate::types::{CastRegistry, TypeClass, Value};

/// Cooperative cancellation signal. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// State shared by all cursors of one execution.
pub struct QueryContext {
    store: Arc<dyn StoreAdapter>,
    registry: Arc<CastRegistry>,
    config: ExecutionConfig,
    cancel: CancelHandle,
    warnings: Mutex<Vec<String>>,
    taps: Arc<TapRecorder>,
}

impl QueryContext {
    /// Context with default configuration and the shared standard cast registry.
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self {
            store,
            registry: CastRegistry::shared(),
            config: ExecutionConfig::default(),
            cancel: CancelHandle::new(),
            warnings: Mutex::new(Vec::new()),
            taps: Arc::new(TapRecorder::new()),
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<CastRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Uses an externally owned cancel handle, e.g. one held by a session.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<dyn StoreAdapter> {
        &self.store
    }

    pub fn registry(&self) -> &CastRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with [`QueryError::Cancelled`] once the context has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Locking hook run before a write operator modifies `row`.
    pub fn lock_row(&self, table: &str, row: &SharedRow) -> Result<()> {
        self.store.lock_row(table, row)
    }

    /// Converts `value` to `target`, applying the context's cast error mode.
    ///
    /// In the default mode a failed conversion is recorded as a warning and
    /// yields NULL; with `cast_errors_fatal` it fails the evaluation.
    pub fn cast(&self, value: &Value, target: TypeClass) -> Result<Value> {
        match self.registry.convert(value, target) {
            Ok(converted) => Ok(converted),
            Err(e) => {
                self.recover_cast(e)?;
                Ok(Value::Null)
            }
        }
    }

    /// Returns the error if cast failures are fatal, otherwise records a warning.
    pub fn recover_cast(&self, error: CastError) -> Result<()> {
        if self.config.cast_errors_fatal {
            return Err(QueryError::Cast(error));
        }
        self.warn(error.to_string());
        Ok(())
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "query warning");
        let mut warnings = self.warnings.lock();
        if warnings.len() < self.config.max_warnings {
            warnings.push(message);
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    /// Starts a timing tap; recorded when the guard drops.
    pub fn tap(&self, name: &'static str) -> TapGuard {
        if self.config.taps_enabled {
            TapGuard::start(&self.taps, name)
        } else {
            TapGuard::disabled()
        }
    }

    pub fn tap_stats(&self, name: &str) -> TapStats {
        self.taps.stats(name)
    }

    pub fn taps(&self) -> &TapRecorder {
        &self.taps
    }
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("config", &self.config)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn context(config: ExecutionConfig) -> QueryContext {
        QueryContext::new(Arc::new(MemoryStore::new())).with_config(config)
    }

    #[test]
    fn test_cancel_handle_shared() {
        let ctx = context(ExecutionConfig::default());
        let handle = ctx.cancel_handle();
        assert!(ctx.check_cancelled().is_ok());
        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.check_cancelled().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_cast_failure_recorded_as_warning() {
        let ctx = context(ExecutionConfig::default());
        let value = ctx
            .cast(&Value::Text("nope".into()), TypeClass::Integer)
            .unwrap();
        assert_eq!(value, Value::Null);
        assert_eq!(ctx.warnings().len(), 1);
    }

    #[test]
    fn test_cast_failure_fatal() {
        let ctx = context(ExecutionConfig::default().with_cast_errors_fatal(true));
        let err = ctx
            .cast(&Value::Text("nope".into()), TypeClass::Integer)
            .unwrap_err();
        assert!(matches!(err, QueryError::Cast(CastError::Malformed { .. })));
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn test_warnings_capped() {
        let ctx = context(ExecutionConfig {
            max_warnings: 2,
            ..ExecutionConfig::default()
        });
        for i in 0..5 {
            ctx.warn(format!("warning {}", i));
        }
        assert_eq!(ctx.warnings(), vec!["warning 0", "warning 1"]);
    }

    #[test]
    fn test_taps_only_when_enabled() {
        let ctx = context(ExecutionConfig::default());
        drop(ctx.tap("x"));
        assert_eq!(ctx.tap_stats("x").count, 0);

        let ctx = context(ExecutionConfig::default().with_taps(true));
        drop(ctx.tap("x"));
        assert_eq!(ctx.tap_stats("x").count, 1);
    }
}
