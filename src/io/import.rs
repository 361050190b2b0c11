use anyhow::{Context, Result};
use std::io::Read;

use crate::application::{AppError, LedgerService};
use crate::domain::{ErrorKind, Submission};

/// Result of applying a batch
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub applied: usize,
    pub rejected: Vec<BatchRejection>,
    /// True if processing stopped at the first rejection.
    pub stopped_early: bool,
}

/// A submission the ledger refused
#[derive(Debug, Clone)]
pub struct BatchRejection {
    /// Zero-based position in the batch.
    pub index: usize,
    pub operation: &'static str,
    /// Owner-only operation, so a non-owner caller is the usual cause.
    pub administrative: bool,
    pub kind: Option<ErrorKind>,
    pub error: String,
}

/// Options for batch submission
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Validate against a scratch copy; commit nothing.
    pub dry_run: bool,
    /// Carry on after a rejection instead of stopping.
    pub keep_going: bool,
}

/// Parse a JSON array of `{ "caller": ..., "op": ..., ... }` entries.
pub fn read_batch<R: Read>(reader: R) -> Result<Vec<Submission>> {
    serde_json::from_reader(reader).context("Invalid batch file")
}

/// Submits a batch of operations in file order
pub struct BatchImporter<'a> {
    service: &'a LedgerService,
}

impl<'a> BatchImporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    pub async fn apply(
        &self,
        submissions: &[Submission],
        options: &BatchOptions,
    ) -> Result<BatchResult> {
        if options.dry_run {
            // Validate against what is stored now, not a stale cache.
            self.service.refresh().await?;
            return Ok(self.preview(submissions, options).await);
        }

        let mut result = BatchResult::default();

        for (index, submission) in submissions.iter().enumerate() {
            match self
                .service
                .submit(submission.caller, submission.operation.clone())
                .await
            {
                Ok(_) => result.applied += 1,
                Err(err @ AppError::Ledger(_)) => {
                    result.rejected.push(BatchRejection {
                        index,
                        operation: submission.operation.name(),
                        administrative: submission.operation.is_administrative(),
                        kind: err.ledger_kind(),
                        error: err.to_string(),
                    });
                    if !options.keep_going {
                        result.stopped_early = index + 1 < submissions.len();
                        break;
                    }
                }
                // Storage failures abort the batch outright.
                Err(err) => return Err(err.into()),
            }
        }

        Ok(result)
    }

    async fn preview(&self, submissions: &[Submission], options: &BatchOptions) -> BatchResult {
        let outcomes = self.service.preview(submissions, options.keep_going).await;
        let mut result = BatchResult::default();

        for (index, (submission, outcome)) in submissions.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(_) => result.applied += 1,
                Err(err) => {
                    result.rejected.push(BatchRejection {
                        index,
                        operation: submission.operation.name(),
                        administrative: submission.operation.is_administrative(),
                        kind: Some(err.kind()),
                        error: err.to_string(),
                    });
                    if !options.keep_going {
                        result.stopped_early = index + 1 < submissions.len();
                        break;
                    }
                }
            }
        }

        result
    }
}
