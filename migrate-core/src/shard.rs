// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! The shard-addressing strategies a Rumper hands its Executors, and the
//! target pool binding every Executor restores into. These two are kept
//! separate from [`crate::scanner::Scanner`]: a shard names *which* node an
//! Executor owns, a `Scanner` is just the cursor that walks it.

use crate::endpoint::Endpoint;

/// Which source shard one Executor is responsible for.
#[derive(Debug, Clone)]
pub enum SourceShard {
    /// No shard discovery: the Executor owns the whole source.
    Standalone,
    /// An Aliyun-style proxy shard, selected by ordinal on every `SCAN`.
    ClusterShard(u64),
    /// A Tencent-style node-enumeration master, reached over its own
    /// connection and fixed to logical db 0.
    ClusterNode { id: String, endpoint: Endpoint },
}

/// Which target pool an Executor restores into.
#[derive(Debug, Clone)]
pub enum TargetBinding {
    Cluster(Vec<Endpoint>),
    Single(Endpoint),
}

/// Everything an Executor needs to know about its place in the topology.
#[derive(Debug, Clone)]
pub struct ShardBinding {
    pub source: SourceShard,
    /// The endpoint this Executor opens its *source* connection to. For
    /// `SourceShard::ClusterNode` this is the discovered master address,
    /// which may differ from the Rumper's original entry-point address.
    pub source_endpoint: Endpoint,
    pub target: TargetBinding,
}

impl ShardBinding {
    pub fn standalone(source_endpoint: Endpoint, target: TargetBinding) -> Self {
        Self {
            source: SourceShard::Standalone,
            source_endpoint,
            target,
        }
    }

    pub fn aliyun_shard(ordinal: u64, source_endpoint: Endpoint, target: TargetBinding) -> Self {
        Self {
            source: SourceShard::ClusterShard(ordinal),
            source_endpoint,
            target,
        }
    }

    pub fn cluster_node(id: String, node_endpoint: Endpoint, target: TargetBinding) -> Self {
        Self {
            source: SourceShard::ClusterNode {
                id,
                endpoint: node_endpoint.clone(),
            },
            source_endpoint: node_endpoint,
            target,
        }
    }

    /// A node-enumeration shard is pinned to db 0; every other strategy
    /// iterates whatever logical dbs `INFO keyspace` reports as non-empty.
    pub fn fixed_logical_db(&self) -> Option<i64> {
        match self.source {
            SourceShard::ClusterNode { .. } => Some(0),
            _ => None,
        }
    }
}
