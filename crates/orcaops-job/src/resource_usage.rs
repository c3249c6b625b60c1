//! Maps the Runtime Adapter's raw `Stats` onto the persisted `ResourceUsage`
//! shape (§3 RunRecord).

use orcaops_base::ResourceUsage;
use orcaops_runtime::Stats;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn from_stats(stats: &Stats) -> ResourceUsage {
    ResourceUsage {
        cpu_seconds: stats.cpu_usage_ns as f64 / NANOS_PER_SECOND,
        memory_peak_mb: stats.memory_max_bytes as f64 / BYTES_PER_MB,
        net_rx_bytes: stats.net_rx_bytes,
        net_tx_bytes: stats.net_tx_bytes,
        blkio_read_bytes: stats.blkio_read_bytes,
        blkio_write_bytes: stats.blkio_write_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_ns_and_bytes_to_seconds_and_mb() {
        let stats = Stats { cpu_usage_ns: 2_000_000_000, memory_max_bytes: 128 * 1024 * 1024, ..Default::default() };
        let usage = from_stats(&stats);
        assert_eq!(usage.cpu_seconds, 2.0);
        assert_eq!(usage.memory_peak_mb, 128.0);
    }
}
