// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! Typed home for the options table the core consumes. Parsing these out of
//! a config file, an environment, or a secrets store is the caller's job;
//! this crate only ever sees the already-validated struct below.

use crate::endpoint::Endpoint;
use std::time::Duration;

/// Which vendor-specific shard-discovery strategy a source speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanSpecialCloud {
    /// A single logical keyspace: standalone server, or any source that
    /// does not require special shard discovery.
    #[default]
    Standalone,
    /// A managed-cluster proxy that exposes N logical shards through one
    /// front door, discovered via `INFO Cluster`'s `nodecount` field.
    AliyunCluster,
    /// A managed-cluster proxy discovered by enumerating backend masters
    /// via `CLUSTER NODES`.
    TencentCluster,
}

/// How the target endpoint pool should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    #[default]
    Standalone,
    Cluster,
}

/// The full set of knobs the engine's core reads. Built and owned by the
/// caller; the Driver borrows it for the duration of a run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub source_addresses: Vec<Endpoint>,
    pub target_addresses: Vec<Endpoint>,
    pub target_type: TargetType,
    pub scan_special_cloud: ScanSpecialCloud,
    /// Batch size for scan/dump/pttl pipelining on the source, and the
    /// flush granularity for restore on the target. Channel capacities are
    /// `2 * scan_key_number`.
    pub scan_key_number: u32,
    /// If true, every `RESTORE` carries `REPLACE`.
    pub rewrite: bool,
    /// Per-key pacing in the Writer. Defaults to zero; set it to throttle
    /// a migration that would otherwise saturate the target.
    pub inter_command_delay: Duration,
    /// Timeout applied to connection attempts and individual requests.
    pub request_timeout: Duration,
}

impl EngineOptions {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new(source_addresses: Vec<Endpoint>, target_addresses: Vec<Endpoint>) -> Self {
        Self {
            source_addresses,
            target_addresses,
            target_type: TargetType::default(),
            scan_special_cloud: ScanSpecialCloud::default(),
            scan_key_number: 100,
            rewrite: false,
            inter_command_delay: Duration::ZERO,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn channel_capacity(&self) -> usize {
        (self.scan_key_number as usize).saturating_mul(2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    #[test]
    fn channel_capacity_is_double_batch_size() {
        let mut opts = EngineOptions::new(vec![Endpoint::standalone("a", 6379)], vec![]);
        opts.scan_key_number = 50;
        assert_eq!(opts.channel_capacity(), 100);
    }

    #[test]
    fn channel_capacity_never_zero() {
        let mut opts = EngineOptions::new(vec![], vec![]);
        opts.scan_key_number = 0;
        assert_eq!(opts.channel_capacity(), 1);
    }
}
