// Flat reconstruction options passed from the entry point down to the
// executor. Parsing is strict: unknown option names fail at construction.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// events routed to the caller-supplied progress callback
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    SliceDone { completed: usize, total: usize },
    MedianScale(f32),
    /// operator norm came out zero; scaling was skipped instead of dividing
    ZeroNorm,
    /// data scale came out zero; scaling was skipped
    ZeroScale,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "snake_case")]
pub struct ReconConfig {
    /// iteration cap handed to the solver
    pub max_iter: usize,
    /// solver tolerance
    pub tolerance: f32,
    /// master switch for worker pools and operator-internal parallelism
    pub multithread: bool,
    /// explicit worker budget; unset means the rayon pool size
    pub threads: Option<usize>,
    /// drive the power iteration to convergence instead of a fixed count
    pub exact_operator_norm: bool,
    pub execution: ExecutionStrategy,
    pub rescale_output: bool,
    #[serde(skip)]
    pub progress: Option<ProgressFn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// pick a worker pool when it pays off, sequential otherwise
    Auto,
    Sequential,
    Parallel,
}

impl Default for ReconConfig {
    fn default() -> Self {
        ReconConfig {
            max_iter: 10,
            tolerance: 1e-4,
            multithread: true,
            threads: None,
            exact_operator_norm: false,
            execution: ExecutionStrategy::Auto,
            rescale_output: true,
            progress: None,
        }
    }
}

impl fmt::Debug for ReconConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconConfig")
            .field("max_iter", &self.max_iter)
            .field("tolerance", &self.tolerance)
            .field("multithread", &self.multithread)
            .field("threads", &self.threads)
            .field("exact_operator_norm", &self.exact_operator_norm)
            .field("execution", &self.execution)
            .field("rescale_output", &self.rescale_output)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ReconConfig {
    /// parse options from a toml string; unknown keys are rejected
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Options(e.to_string()))
    }

    pub fn to_toml(&self) -> String {
        let mut s = toml::to_string(self).expect("config serialization cannot fail");
        s.push('\n');
        s
    }

    /// effective worker count for pools and operator internals
    pub fn worker_count(&self) -> usize {
        if !self.multithread {
            return 1;
        }
        self.threads.unwrap_or_else(rayon::current_num_threads).max(1)
    }

    pub fn report(&self, event: ProgressEvent) {
        if let Some(cb) = self.progress.as_ref() {
            cb(event);
        }
    }

    /// the per-slice configuration handed to solvers inside a worker pool:
    /// inner parallelism is suppressed so slices do not oversubscribe
    pub fn for_inner_slice(&self) -> Self {
        let mut cfg = self.clone();
        cfg.multithread = false;
        cfg.threads = Some(1);
        cfg.progress = None;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let cfg = ReconConfig::default();
        let s = cfg.to_toml();
        let parsed = ReconConfig::from_toml(&s).unwrap();
        assert_eq!(parsed.max_iter, cfg.max_iter);
        assert_eq!(parsed.execution, ExecutionStrategy::Auto);
        assert_eq!(parsed.rescale_output, cfg.rescale_output);
    }

    #[test]
    fn partial_files_fill_defaults() {
        let cfg = ReconConfig::from_toml("max_iter = 50\nexecution = \"sequential\"\n").unwrap();
        assert_eq!(cfg.max_iter, 50);
        assert_eq!(cfg.execution, ExecutionStrategy::Sequential);
        assert!(cfg.rescale_output);
    }

    #[test]
    fn unknown_options_are_rejected() {
        let err = ReconConfig::from_toml("iterations = 3\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("iterations"), "the offending key must be named: {msg}");
    }

    #[test]
    fn worker_budget_honors_the_master_switch() {
        let mut cfg = ReconConfig::default();
        cfg.multithread = false;
        cfg.threads = Some(8);
        assert_eq!(cfg.worker_count(), 1);

        cfg.multithread = true;
        assert_eq!(cfg.worker_count(), 8);

        let inner = cfg.for_inner_slice();
        assert_eq!(inner.worker_count(), 1);
    }
}
