//! Resumable batched application of an external operation.
//!
//! Progress is the number of fully completed batches for a `BatchKind`. It is
//! advanced and persisted only after the batch call returned success, so a
//! re-run starts at the first batch that did not complete.

use crate::checkpoint::{BatchKind, BatchProgress, SingletonRecord};
use crate::models::{ConfigError, Result};
use std::future::Future;
use std::ops::Range;
use tracing::{debug, info};

/// Splits `[start, end)` into batches and applies them in order.
#[derive(Debug, Clone, Copy)]
pub struct BatchRunner {
    start: usize,
    end: usize,
    batch_size: usize,
    dry_run: bool,
}

impl BatchRunner {
    pub fn new(range: Range<usize>, batch_size: usize, dry_run: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "instance.batchSize".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(Self {
            start: range.start,
            end: range.end.max(range.start),
            batch_size,
            dry_run,
        })
    }

    /// The `index`-th batch, or `None` once past the end.
    pub fn batch(&self, index: usize) -> Option<Range<usize>> {
        let batch_start = self
            .start
            .saturating_add(index.saturating_mul(self.batch_size));
        if batch_start >= self.end {
            return None;
        }
        Some(batch_start..batch_start.saturating_add(self.batch_size).min(self.end))
    }

    /// Total number of batches over the range.
    pub fn batch_count(&self) -> usize {
        (self.end - self.start).div_ceil(self.batch_size)
    }

    /// Batches still to run given `completed` finished ones.
    pub fn remaining(&self, completed: usize) -> Vec<Range<usize>> {
        (completed..)
            .map_while(|index| self.batch(index))
            .collect()
    }

    /// Apply every batch not yet recorded in `progress` for `kind`.
    ///
    /// After each successful batch the counter is incremented and, outside
    /// dry-run, `progress` is checkpointed before the next batch starts. A
    /// failing batch leaves the counter untouched and its error is returned.
    /// Returns the number of batches applied by this call.
    pub async fn run<F, Fut>(
        &self,
        kind: BatchKind,
        progress: &mut SingletonRecord<BatchProgress>,
        mut apply: F,
    ) -> Result<usize>
    where
        F: FnMut(Range<usize>, bool) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let total = self.batch_count();
        let resumed_at = progress.get(kind);
        if resumed_at > 0 && resumed_at < total {
            info!(%kind, completed = resumed_at, total, "Resuming batches");
        }

        let mut applied = 0;
        while let Some(range) = self.batch(progress.get(kind)) {
            let index = progress.get(kind);
            debug!(
                %kind,
                batch = index + 1,
                total,
                start = range.start,
                end = range.end,
                dry_run = self.dry_run,
                "Applying batch"
            );

            apply(range, self.dry_run).await?;

            *progress.counter_mut(kind) += 1;
            if !self.dry_run {
                progress.checkpoint()?;
            }
            applied += 1;
            info!(%kind, completed = index + 1, total, "Batch complete");
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GiftdropError;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[test]
    fn test_batch_boundaries() {
        let runner = BatchRunner::new(0..250, 100, false).unwrap();
        assert_eq!(runner.batch_count(), 3);
        assert_eq!(runner.remaining(0), vec![0..100, 100..200, 200..250]);
        assert_eq!(runner.remaining(2), vec![200..250]);
        assert!(runner.remaining(3).is_empty());

        let offset = BatchRunner::new(10..15, 2, false).unwrap();
        assert_eq!(offset.remaining(0), vec![10..12, 12..14, 14..15]);

        let empty = BatchRunner::new(5..5, 10, false).unwrap();
        assert_eq!(empty.batch_count(), 0);
        assert!(empty.remaining(0).is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_config_error() {
        assert!(matches!(
            BatchRunner::new(0..10, 0, false),
            Err(GiftdropError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_then_resume_never_replays_completed_batches() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("batch.csv");
        let runner = BatchRunner::new(0..250, 100, false).unwrap();
        let calls = RefCell::new(Vec::new());

        let mut progress = SingletonRecord::<BatchProgress>::load(&path).unwrap();
        let err = runner
            .run(BatchKind::Mint, &mut progress, |range, _| {
                calls.borrow_mut().push(range.clone());
                let fail = range.start == 200;
                async move {
                    if fail {
                        Err(GiftdropError::external("Submitting mint batch", "connection reset"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GiftdropError::External { .. }));
        assert_eq!(progress.get(BatchKind::Mint), 2);

        // Restart from what is on disk.
        let mut progress = SingletonRecord::<BatchProgress>::load(&path).unwrap();
        assert_eq!(progress.get(BatchKind::Mint), 2);
        let applied = runner
            .run(BatchKind::Mint, &mut progress, |range, _| {
                calls.borrow_mut().push(range);
                async { Ok(()) }
            })
            .await
            .unwrap();

        assert_eq!(applied, 1);
        assert_eq!(
            calls.into_inner(),
            vec![0..100, 100..200, 200..250, 200..250]
        );
        let reloaded = SingletonRecord::<BatchProgress>::load(&path).unwrap();
        assert_eq!(reloaded.get(BatchKind::Mint), 3);
        assert_eq!(reloaded.get(BatchKind::Funds), 0);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_persist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("batch.csv");
        let runner = BatchRunner::new(0..30, 10, true).unwrap();

        let mut progress = SingletonRecord::<BatchProgress>::load(&path).unwrap();
        let applied = runner
            .run(BatchKind::Funds, &mut progress, |_, dry_run| async move {
                assert!(dry_run);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(progress.get(BatchKind::Funds), 3);
        assert!(!path.exists());
    }
}
