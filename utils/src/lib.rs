//! Small helpers shared by the workspace: byte budget conversions and memory reporting.

use bytesize::ByteSize;
use thousands::Separable;
use tracing::debug;

pub const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

/// Converts a megabyte budget into bytes. Negative and NaN budgets map to zero,
/// budgets beyond `usize::MAX` saturate.
pub fn megabytes_to_bytes(megabytes: f64) -> usize {
    if megabytes.is_nan() || megabytes <= 0.0 {
        return 0;
    }
    let bytes = megabytes * BYTES_PER_MEGABYTE as f64;
    if bytes >= usize::MAX as f64 {
        usize::MAX
    } else {
        bytes as usize
    }
}

/// Human readable representation of a byte count, e.g. `1.5 MiB`.
pub fn human_bytes(bytes: usize) -> String {
    ByteSize::b(bytes as u64).to_string()
}

/// Integer with thousands separators, used in summaries.
pub fn separated(value: usize) -> String {
    value.separate_with_commas()
}

/// Emits the current process memory usage at debug level, tagged with `stage`.
pub fn log_memory_usage(stage: &str) {
    match memory_stats::memory_stats() {
        Some(usage) => debug!(
            stage,
            physical = %human_bytes(usage.physical_mem),
            virtual_mem = %human_bytes(usage.virtual_mem),
            "memory usage"
        ),
        None => debug!(stage, "memory usage unavailable on this platform"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_megabytes_to_bytes() {
        assert_eq!(megabytes_to_bytes(1.0), BYTES_PER_MEGABYTE);
        assert_eq!(megabytes_to_bytes(0.5), BYTES_PER_MEGABYTE / 2);
        assert_eq!(megabytes_to_bytes(-3.0), 0);
        assert_eq!(megabytes_to_bytes(f64::NAN), 0);
        assert_eq!(megabytes_to_bytes(f64::INFINITY), usize::MAX);
    }

    #[test]
    fn test_separated() {
        assert_eq!(separated(1234567), "1,234,567");
        assert_eq!(separated(12), "12");
    }
}
