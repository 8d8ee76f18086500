//! Settings shared by the plan builder and the solver.

use std::env;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SparseNetError};

pub const DEFAULT_DEVICE_MAX_MEGABYTES: f64 = 2048.0;

// Get the thread count from the environment or use the available parallelism
pub static MAX_SOLVE_THREADS: Lazy<usize> = Lazy::new(|| {
    env::var("SPARSE_NET_MAX_SOLVE_THREADS")
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .filter(|threads| *threads > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|threads| threads.get())
                .unwrap_or(1)
        })
});

pub static DEVICE_MAX_MEGABYTES: Lazy<f64> = Lazy::new(|| {
    env::var("SPARSE_NET_DEVICE_MAX_MEGABYTES")
        .ok()
        .and_then(|val| val.parse::<f64>().ok())
        .filter(|megabytes| *megabytes > 0.0)
        .unwrap_or(DEFAULT_DEVICE_MAX_MEGABYTES)
});

/// Thread count and memory available to build and solve a net.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceContext {
    pub max_solve_threads: usize,
    pub device_max_megabytes: f64,
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self {
            max_solve_threads: *MAX_SOLVE_THREADS,
            device_max_megabytes: *DEVICE_MAX_MEGABYTES,
        }
    }
}

impl ServiceContext {
    pub fn with_max_solve_threads(mut self, threads: usize) -> Self {
        self.max_solve_threads = threads;
        self
    }

    pub fn with_device_max_megabytes(mut self, megabytes: f64) -> Self {
        self.device_max_megabytes = megabytes;
        self
    }

    pub fn device_max_bytes(&self) -> usize {
        utils::megabytes_to_bytes(self.device_max_megabytes)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_solve_threads == 0 {
            return Err(SparseNetError::InvalidState(
                "max_solve_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults() {
        let context = ServiceContext::default();
        assert!(context.max_solve_threads > 0);
        assert!(context.device_max_megabytes > 0.0);
        assert!(context.validate().is_ok());
    }

    #[test]
    fn test_context_from_json() {
        let context: ServiceContext =
            serde_json::from_str(r#"{ "max_solve_threads": 3, "device_max_megabytes": 1.5 }"#)
                .unwrap();
        assert_eq!(context.max_solve_threads, 3);
        assert_eq!(context.device_max_bytes(), 3 * utils::BYTES_PER_MEGABYTE / 2);

        let partial: ServiceContext = serde_json::from_str(r#"{ "max_solve_threads": 2 }"#).unwrap();
        assert_eq!(partial.device_max_megabytes, *DEVICE_MAX_MEGABYTES);
        assert!(ServiceContext::default()
            .with_max_solve_threads(0)
            .validate()
            .is_err());
    }
}
