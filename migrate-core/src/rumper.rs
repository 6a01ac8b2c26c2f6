// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! One Rumper owns one source entry point and turns it into one or more
//! Executors, depending on which vendor-specific topology the source
//! speaks. Every Executor it spawns restores into the same target pool.

use crate::config::{EngineOptions, ScanSpecialCloud, TargetType};
use crate::driver::{ActivityMetric, NoopActivityMetric};
use crate::endpoint::{self, Endpoint};
use crate::error::{ErrorContext, ShakeError, ShakeResult};
use crate::executor::{Executor, ExecutorReport};
use crate::shard::{ShardBinding, TargetBinding};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What one Rumper did, aggregating every Executor it ran.
#[derive(Debug, Clone)]
pub struct RumperReport {
    pub rumper_id: usize,
    pub source_address: String,
    pub executors: Vec<ExecutorReport>,
}

/// Builds the target binding for one Executor. A cluster target is
/// addressed as one whole pool (the client routes internally by slot), so
/// every Executor gets the same binding; a standalone target hands out one
/// address per Executor, picked round-robin from the pool via `counter` so a
/// multi-address standalone target spreads writes across every configured
/// node instead of every Executor in the run piling onto the first one.
pub fn build_target_binding(
    options: &EngineOptions,
    counter: &AtomicUsize,
) -> ShakeResult<TargetBinding> {
    if options.target_addresses.is_empty() {
        return Err(ShakeError::Discovery {
            context: ErrorContext::default(),
            reason: "target_addresses is empty".into(),
        });
    }
    match options.target_type {
        TargetType::Cluster => Ok(TargetBinding::Cluster(options.target_addresses.clone())),
        TargetType::Standalone => {
            let idx = counter.fetch_add(1, Ordering::Relaxed) % options.target_addresses.len();
            Ok(TargetBinding::Single(options.target_addresses[idx].clone()))
        }
    }
}

/// One source entry point and the topology-discovery strategy that turns it
/// into a set of shard bindings.
pub struct Rumper {
    id: usize,
    source_entry: Endpoint,
    target_counter: Arc<AtomicUsize>,
    options: Arc<EngineOptions>,
    metric: Arc<dyn ActivityMetric>,
}

impl Rumper {
    pub fn new(
        id: usize,
        source_entry: Endpoint,
        target_counter: Arc<AtomicUsize>,
        options: Arc<EngineOptions>,
    ) -> Self {
        Self::with_metric(
            id,
            source_entry,
            target_counter,
            options,
            Arc::new(NoopActivityMetric),
        )
    }

    pub fn with_metric(
        id: usize,
        source_entry: Endpoint,
        target_counter: Arc<AtomicUsize>,
        options: Arc<EngineOptions>,
        metric: Arc<dyn ActivityMetric>,
    ) -> Self {
        Self {
            id,
            source_entry,
            target_counter,
            options,
            metric,
        }
    }

    /// Resolves this Rumper's source entry into one `ShardBinding` per
    /// shard it is responsible for, per `scan_special_cloud`. Every binding
    /// gets its own target pick via `build_target_binding`, so a standalone
    /// target with several addresses is spread across the shards rather than
    /// all of them landing on the same node.
    async fn discover_shards(&self) -> ShakeResult<Vec<ShardBinding>> {
        let context = ErrorContext {
            source_address: self.source_entry.display_address(),
            rumper_id: self.id,
            executor_id: 0,
            key: None,
            pttl: None,
        };

        match self.options.scan_special_cloud {
            ScanSpecialCloud::Standalone => Ok(vec![ShardBinding::standalone(
                self.source_entry.clone(),
                build_target_binding(&self.options, &self.target_counter)?,
            )]),

            ScanSpecialCloud::AliyunCluster => {
                let mut conn = endpoint::open_standalone(
                    &self.source_entry,
                    self.options.request_timeout,
                    context.clone(),
                )
                .await?;
                let info: String = redis::cmd("INFO")
                    .arg("Cluster")
                    .query_async(&mut conn)
                    .await
                    .map_err(|source| ShakeError::Connect {
                        context: context.clone(),
                        source,
                    })?;
                let node_count =
                    crate::cloud::parse_node_count(&info).map_err(|reason| ShakeError::Discovery {
                        context: context.clone(),
                        reason,
                    })?;
                (0..node_count as u64)
                    .map(|ordinal| {
                        Ok(ShardBinding::aliyun_shard(
                            ordinal,
                            self.source_entry.clone(),
                            build_target_binding(&self.options, &self.target_counter)?,
                        ))
                    })
                    .collect()
            }

            ScanSpecialCloud::TencentCluster => {
                let mut conn = endpoint::open_standalone(
                    &self.source_entry,
                    self.options.request_timeout,
                    context.clone(),
                )
                .await?;
                let raw: String = redis::cmd("CLUSTER")
                    .arg("NODES")
                    .query_async(&mut conn)
                    .await
                    .map_err(|source| ShakeError::Connect {
                        context: context.clone(),
                        source,
                    })?;
                let masters = crate::cloud::parse_cluster_master_nodes(&raw).map_err(|reason| {
                    ShakeError::Discovery {
                        context: context.clone(),
                        reason,
                    }
                })?;
                masters
                    .into_iter()
                    .map(|node| {
                        Ok(ShardBinding::cluster_node(
                            node.id,
                            Endpoint::standalone(node.host, node.port)
                                .with_auth(self.source_entry.auth.clone())
                                .with_tls(self.source_entry.tls),
                            build_target_binding(&self.options, &self.target_counter)?,
                        ))
                    })
                    .collect()
            }
        }
    }

    pub async fn run(self) -> ShakeResult<RumperReport> {
        let source_address = self.source_entry.display_address();
        let bindings = self.discover_shards().await?;
        redishake_logger::log_info(
            format!("rumper[{}]", self.id),
            format!(
                "topology discovered: {} shard(s) over {source_address}",
                bindings.len()
            ),
        );
        let options = self.options.clone();
        let rumper_id = self.id;

        let handles: Vec<_> = bindings
            .into_iter()
            .enumerate()
            .map(|(executor_id, binding)| {
                let executor = Executor::new(rumper_id, executor_id, binding, options.clone());
                let (handle, join) = executor.spawn();
                self.metric.on_executor_spawned(&handle);
                join
            })
            .collect();

        let mut executors = Vec::with_capacity(handles.len());
        for joined in futures::future::join_all(handles).await {
            let report = joined.map_err(|err| ShakeError::Discovery {
                context: ErrorContext {
                    source_address: source_address.clone(),
                    rumper_id,
                    executor_id: 0,
                    key: None,
                    pttl: None,
                },
                reason: format!("executor task did not complete: {err}"),
            })??;
            executors.push(report);
        }

        Ok(RumperReport {
            rumper_id,
            source_address,
            executors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineOptions, TargetType};

    #[test]
    fn cluster_target_requires_at_least_one_address() {
        let mut options = EngineOptions::new(vec![Endpoint::standalone("s", 6379)], vec![]);
        options.target_type = TargetType::Cluster;
        let counter = AtomicUsize::new(0);
        assert!(build_target_binding(&options, &counter).is_err());
    }

    #[test]
    fn standalone_target_uses_first_address_on_the_first_call() {
        let options = EngineOptions::new(
            vec![Endpoint::standalone("s", 6379)],
            vec![
                Endpoint::standalone("t1", 6379),
                Endpoint::standalone("t2", 6379),
            ],
        );
        let counter = AtomicUsize::new(0);
        match build_target_binding(&options, &counter).unwrap() {
            TargetBinding::Single(ep) => assert_eq!(ep.display_address(), "t1:6379"),
            other => panic!("expected Single, got {other:?}"),
        }
    }

    #[test]
    fn standalone_target_round_robins_and_wraps() {
        let options = EngineOptions::new(
            vec![Endpoint::standalone("s", 6379)],
            vec![
                Endpoint::standalone("t1", 6379),
                Endpoint::standalone("t2", 6379),
            ],
        );
        let counter = AtomicUsize::new(0);
        let picks: Vec<String> = (0..4)
            .map(|_| match build_target_binding(&options, &counter).unwrap() {
                TargetBinding::Single(ep) => ep.display_address(),
                other => panic!("expected Single, got {other:?}"),
            })
            .collect();
        assert_eq!(
            picks,
            vec!["t1:6379", "t2:6379", "t1:6379", "t2:6379"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn cluster_target_carries_every_address() {
        let mut options = EngineOptions::new(
            vec![Endpoint::standalone("s", 6379)],
            vec![
                Endpoint::standalone("t1", 6379),
                Endpoint::standalone("t2", 6379),
            ],
        );
        options.target_type = TargetType::Cluster;
        let counter = AtomicUsize::new(0);
        match build_target_binding(&options, &counter).unwrap() {
            TargetBinding::Cluster(eps) => assert_eq!(eps.len(), 2),
            other => panic!("expected Cluster, got {other:?}"),
        }
    }
}
