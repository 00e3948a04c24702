//! Builder configuration
//!
//! Every tuned constant of the build lives here. The defaults match the
//! memory target of a ~16 GB workstation; none of them are correctness
//! invariants and tests override them freely.

/// Tuning knobs for an octree build.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Nodes with at most this many points become leaves.
    pub max_node_size: u32,
    /// Target point count for the sample kept at internal nodes.
    pub sampled_node_size: u32,
    /// Nodes up to this size may be split entirely in memory.
    pub in_core_node_threshold: u64,
    /// Nodes above this size are handed to the worker pool when the
    /// caller is not already running inside a pool job.
    pub deferred_split_threshold: u64,
    /// Ceiling on points resident in memory across all concurrent
    /// in-core splits.
    pub in_core_point_budget: u64,
    /// Worker threads for split jobs.
    pub worker_threads: usize,
    /// Points per batch handed over by a prefetching point stream.
    pub stream_batch_points: usize,
    /// Points buffered by a sink before flushing to disk.
    pub sink_batch_points: usize,
    /// Ceiling on simultaneously open intermediate files.
    pub max_open_files: usize,
    /// Nodes at this depth are finalized as oversized leaves. Guards
    /// against coincident-point inputs that would never partition.
    pub max_depth: usize,
    /// Seed for the post-hoc random sampler.
    pub sample_seed: u64,
    /// Seconds between progress reports.
    pub progress_interval_secs: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_node_size: 4096,
            sampled_node_size: 4096,
            in_core_node_threshold: 2_000_000,
            deferred_split_threshold: 5_000_000,
            in_core_point_budget: 75_000_000,
            worker_threads: 16,
            stream_batch_points: 200_000,
            sink_batch_points: 20_000,
            max_open_files: 64,
            max_depth: 24,
            sample_seed: 0x0c70_43f5,
            progress_interval_secs: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_consistent() {
        let config = BuilderConfig::default();
        assert!(config.max_node_size > 0);
        assert!(config.in_core_node_threshold > config.max_node_size as u64);
        assert!(config.deferred_split_threshold >= config.in_core_node_threshold);
        assert!(config.in_core_point_budget >= config.in_core_node_threshold);
        assert!(config.worker_threads > 0);
        assert!(config.max_depth > 0);
    }
}
