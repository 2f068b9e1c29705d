//! Ordered, run-once execution of versioned upgrade steps.
//!
//! Each successful step is recorded in the upgrade history table. A step whose
//! version is already recorded is skipped, which is what keeps one-shot
//! migrations such as the unique-flag reconciliation from running twice.
//! A step that commits but whose history row cannot be written is reported as
//! [`UpgradeError::RecordFailed`], distinct from a step that failed.
//! Concurrent runners are not coordinated here.

use async_trait::async_trait;
use cmdb_core::constants::TABLE_UPGRADE_HISTORY;
use cmdb_core::{
    now, CmdbResult, RunId, Timestamp, UpgradeConfig, UpgradeContext, UpgradeError,
};
use cmdb_storage::{Filter, Rdb};
use serde::{Deserialize, Serialize};

use crate::reconcile::ReconcileUnique;

/// A single versioned migration.
#[async_trait]
pub trait UpgradeStep<R: Rdb>: Send + Sync {
    /// Version label; steps run in ascending order of this label.
    fn version(&self) -> &str;

    async fn run(&self, ctx: &UpgradeContext, db: &R, config: &UpgradeConfig) -> CmdbResult<()>;
}

/// History row written after a step succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeRecord {
    pub version: String,
    pub run_id: RunId,
    pub applied_at: Timestamp,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Registry and runner of upgrade steps.
pub struct Upgrader<R: Rdb> {
    steps: Vec<Box<dyn UpgradeStep<R>>>,
}

impl<R: Rdb> std::fmt::Debug for Upgrader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgrader")
            .field("steps", &self.versions())
            .finish()
    }
}

impl<R: Rdb> Default for Upgrader<R> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<R: Rdb + 'static> Upgrader<R> {
    /// Upgrader with every step shipped in this crate.
    pub fn with_default_steps() -> Self {
        let reconcile: Box<dyn UpgradeStep<R>> = Box::new(ReconcileUnique);
        Self {
            steps: vec![reconcile],
        }
    }
}

impl<R: Rdb> Upgrader<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, keeping steps ordered by version.
    pub fn register(mut self, step: Box<dyn UpgradeStep<R>>) -> CmdbResult<Self> {
        if self.steps.iter().any(|s| s.version() == step.version()) {
            return Err(UpgradeError::DuplicateStep {
                version: step.version().to_string(),
            }
            .into());
        }
        let at = self
            .steps
            .partition_point(|s| s.version() < step.version());
        self.steps.insert(at, step);
        Ok(self)
    }

    /// Registered versions in execution order.
    pub fn versions(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.version()).collect()
    }

    /// Whether `version` has a history row.
    pub async fn is_applied(&self, ctx: &UpgradeContext, db: &R, version: &str) -> CmdbResult<bool> {
        let filter = Filter::new().eq("version", version);
        let records: Vec<UpgradeRecord> = db
            .find_all(ctx, TABLE_UPGRADE_HISTORY, Some(&filter))
            .await?;
        Ok(!records.is_empty())
    }

    /// Run every pending step in order, stopping at the first failure.
    pub async fn run(
        &self,
        ctx: &UpgradeContext,
        db: &R,
        config: &UpgradeConfig,
    ) -> CmdbResult<UpgradeReport> {
        config.validate()?;

        let mut report = UpgradeReport::default();
        for step in &self.steps {
            let version = step.version();
            if self.is_applied(ctx, db, version).await? {
                tracing::debug!(version, "Upgrade step already applied, skipping");
                report.skipped.push(version.to_string());
                continue;
            }

            tracing::info!(version, run_id = %ctx.run_id(), "Running upgrade step");
            if let Err(e) = step.run(ctx, db, config).await {
                tracing::error!(version, error = %e, "Upgrade step failed");
                return Err(UpgradeError::StepFailed {
                    version: version.to_string(),
                    source: Box::new(e),
                }
                .into());
            }

            let record = UpgradeRecord {
                version: version.to_string(),
                run_id: ctx.run_id(),
                applied_at: now(),
            };
            if let Err(e) = db.insert(ctx, TABLE_UPGRADE_HISTORY, &record).await {
                tracing::error!(
                    version,
                    run_id = %ctx.run_id(),
                    error = %e,
                    "Upgrade step applied but history record failed, it will run again"
                );
                return Err(UpgradeError::RecordFailed {
                    version: version.to_string(),
                    source: Box::new(e),
                }
                .into());
            }
            report.applied.push(version.to_string());
        }

        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Upgrade run completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdb_core::{CmdbError, StorageError};
    use cmdb_storage::MemoryRdb;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStep {
        version: &'static str,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingStep {
        fn boxed(version: &'static str, runs: &Arc<AtomicUsize>) -> Box<Self> {
            Box::new(Self {
                version,
                runs: Arc::clone(runs),
                fail: false,
            })
        }
    }

    #[async_trait]
    impl UpgradeStep<MemoryRdb> for CountingStep {
        fn version(&self) -> &str {
            self.version
        }

        async fn run(
            &self,
            _ctx: &UpgradeContext,
            _db: &MemoryRdb,
            _config: &UpgradeConfig,
        ) -> CmdbResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StorageError::Backend {
                    reason: "boom".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_register_orders_by_version() {
        let runs = Arc::new(AtomicUsize::new(0));
        let upgrader = Upgrader::<MemoryRdb>::new()
            .register(CountingStep::boxed("x19.01.01.01", &runs))
            .unwrap()
            .register(CountingStep::boxed("x18.11.19.01", &runs))
            .unwrap()
            .register(CountingStep::boxed("x18.12.01.01", &runs))
            .unwrap();

        assert_eq!(
            upgrader.versions(),
            vec!["x18.11.19.01", "x18.12.01.01", "x19.01.01.01"]
        );
    }

    #[test]
    fn test_register_rejects_duplicate_version() {
        let runs = Arc::new(AtomicUsize::new(0));
        let err = Upgrader::<MemoryRdb>::new()
            .register(CountingStep::boxed("x1", &runs))
            .unwrap()
            .register(CountingStep::boxed("x1", &runs))
            .unwrap_err();

        assert_eq!(
            err,
            CmdbError::Upgrade(UpgradeError::DuplicateStep {
                version: "x1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_second_run_skips_applied_steps() {
        let runs = Arc::new(AtomicUsize::new(0));
        let upgrader = Upgrader::<MemoryRdb>::new()
            .register(CountingStep::boxed("x1", &runs))
            .unwrap();
        let db = MemoryRdb::new();
        let ctx = UpgradeContext::background();
        let config = UpgradeConfig::default();

        let first = upgrader.run(&ctx, &db, &config).await.unwrap();
        let second = upgrader.run(&ctx, &db, &config).await.unwrap();

        assert_eq!(first.applied, vec!["x1".to_string()]);
        assert_eq!(second.skipped, vec!["x1".to_string()]);
        assert!(second.applied.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let history: Vec<UpgradeRecord> = db
            .find_all(&ctx, TABLE_UPGRADE_HISTORY, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, ctx.run_id());
    }

    #[tokio::test]
    async fn test_failure_stops_run_and_is_not_recorded() {
        let runs = Arc::new(AtomicUsize::new(0));
        let failing = Box::new(CountingStep {
            version: "x2",
            runs: Arc::clone(&runs),
            fail: true,
        });
        let upgrader = Upgrader::<MemoryRdb>::new()
            .register(CountingStep::boxed("x1", &runs))
            .unwrap()
            .register(failing)
            .unwrap()
            .register(CountingStep::boxed("x3", &runs))
            .unwrap();
        let db = MemoryRdb::new();
        let ctx = UpgradeContext::background();

        let err = upgrader
            .run(&ctx, &db, &UpgradeConfig::default())
            .await
            .unwrap_err();

        match err {
            CmdbError::Upgrade(UpgradeError::StepFailed { version, source }) => {
                assert_eq!(version, "x2");
                assert!(matches!(*source, CmdbError::Storage(StorageError::Backend { .. })));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(upgrader.is_applied(&ctx, &db, "x1").await.unwrap());
        assert!(!upgrader.is_applied(&ctx, &db, "x2").await.unwrap());
        assert!(!upgrader.is_applied(&ctx, &db, "x3").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_any_step() {
        let runs = Arc::new(AtomicUsize::new(0));
        let upgrader = Upgrader::<MemoryRdb>::new()
            .register(CountingStep::boxed("x1", &runs))
            .unwrap();
        let config = UpgradeConfig {
            owner_id: String::new(),
            ..Default::default()
        };

        let err = upgrader
            .run(&UpgradeContext::background(), &MemoryRdb::new(), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, CmdbError::Config(_)));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_steps_include_reconcile() {
        let upgrader = Upgrader::<MemoryRdb>::with_default_steps();
        assert_eq!(upgrader.versions(), vec![crate::reconcile::RECONCILE_UNIQUE_VERSION]);
    }
}
