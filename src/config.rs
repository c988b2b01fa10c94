//! Configuration for the OCR pipeline.
//!
//! All tuning lives in one [`PipelineConfig`] built via its
//! [`PipelineConfigBuilder`], so a run can be logged, diffed, and shared
//! across tasks as a single value. Defaults follow the service the pipeline
//! talks to: a rate-limited OCR endpoint rewards low concurrency and small
//! batches far more than raw parallelism.

use crate::error::PipelineError;
use crate::progress::PipelineProgress;
use std::fmt;
use std::sync::Arc;

/// Configuration for a document OCR run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pagetext::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(2)
///     .batch_size(5)
///     .early_answer_pages(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Number of page tasks in flight at once. Default: 2.
    ///
    /// The OCR service is the limiting resource: it is rate-limited, and
    /// rendering pages nobody is waiting for wastes client CPU. Two in
    /// flight keeps the service busy without tripping its limiter.
    pub concurrency: usize,

    /// Total OCR attempts per page (first try included). Default: 3.
    pub max_attempts: u32,

    /// Initial retry delay in milliseconds. Default: 500.
    ///
    /// Doubles per attempt with jitter; see `retry_backoff_cap_ms`.
    pub retry_backoff_ms: u64,

    /// Ceiling for a single backoff delay in milliseconds. Default: 4000.
    pub retry_backoff_cap_ms: u64,

    /// Completed pages accumulated before a finalize flush. Default: 5.
    ///
    /// Small batches bound the work lost if the process is interrupted
    /// mid-range; each flush is one persist round-trip.
    pub batch_size: usize,

    /// Pages that must reach a terminal outcome before the caller gets an
    /// early answer. Default: 3 (or the whole range when it is smaller).
    pub early_answer_pages: usize,

    /// Optional per-page progress events.
    pub progress: Option<Arc<dyn PipelineProgress>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            concurrency: 2,
            max_attempts: 3,
            retry_backoff_ms: 500,
            retry_backoff_cap_ms: 4_000,
            batch_size: 5,
            early_answer_pages: 3,
            progress: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("retry_backoff_cap_ms", &self.retry_backoff_cap_ms)
            .field("batch_size", &self.batch_size)
            .field("early_answer_pages", &self.early_answer_pages)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn PipelineProgress>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn retry_backoff_cap_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_cap_ms = ms;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn early_answer_pages(mut self, n: usize) -> Self {
        self.config.early_answer_pages = n.max(1);
        self
    }

    pub fn progress(mut self, progress: Arc<dyn PipelineProgress>) -> Self {
        self.config.progress = Some(progress);
        self
    }

    /// Build the configuration, validating cross-field constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig("concurrency must be >= 1".into()));
        }
        if c.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig("max_attempts must be >= 1".into()));
        }
        if c.retry_backoff_cap_ms < c.retry_backoff_ms {
            return Err(PipelineError::InvalidConfig(format!(
                "retry_backoff_cap_ms ({}) must be >= retry_backoff_ms ({})",
                c.retry_backoff_cap_ms, c.retry_backoff_ms
            )));
        }
        Ok(self.config)
    }
}
