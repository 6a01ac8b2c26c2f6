// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! One Executor owns one source shard end to end: it scans the shard's
//! keyspace, dumps and restores every key it finds, and reports what it did.
//! Internally it runs three stages connected by bounded channels:
//!
//! `Fetcher -> keyChan -> Writer -> resultChan -> Receiver`
//!
//! The Writer batches keys into a `redis::Pipeline` of `RESTORE` commands
//! and issues the whole batch with one `query_async` call on its own target
//! connection, rather than firing each command on a separately spawned task
//! against a connection clone. A `MultiplexedConnection`/`ClusterConnection`
//! clone sends on a shared channel with no ordering tie to when it was
//! cloned or spawned, so dispatching one command at a time from independent
//! tasks cannot guarantee wire order against a `SELECT` issued directly on
//! the original handle; one pipeline call awaited before the next `SELECT`
//! can. The Receiver still exists as its own stage so confirming a batch's
//! replies (and turning an error into a `ShakeError::Confirm`) happens off
//! the Writer's hot path while it prepares the next one.

use crate::config::EngineOptions;
use crate::endpoint::{self, Endpoint};
use crate::error::{ErrorContext, ShakeError, ShakeResult};
use crate::scanner::Scanner;
use crate::shard::{ShardBinding, SourceShard, TargetBinding};
use crate::stats::ExecutorStats;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::cluster_async::ClusterConnection;
use redis::RedisResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One key pulled off the source, destined for `RESTORE` on the target. The
/// logical db it was scanned from rides along so the Writer can `SELECT`
/// the matching db on the target before restoring it. `key`/`value` are
/// `Bytes` rather than `Vec<u8>` so that cloning a record for the error path
/// (see `resultChan`) is a refcount bump, not a copy.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub db: i64,
    pub key: Bytes,
    pub value: Bytes,
    pub pttl: i64,
}

/// One key's `RESTORE` outcome, already resolved by the time it reaches
/// `resultChan` — the Writer awaited the whole batch's pipeline before
/// publishing any of it.
type PendingRestore = (Bytes, i64, RedisResult<()>);

/// One key queued in the Writer's current batch, not yet sent: key, ttl
/// already resolved by `resolve_ttl`, and the dump payload to restore.
type PendingWrite = (Bytes, i64, Bytes);

/// A live connection to the target pool, opened once per Executor.
enum TargetConnection {
    Standalone(MultiplexedConnection),
    Cluster(ClusterConnection),
}

impl TargetConnection {
    async fn open(
        binding: &TargetBinding,
        options: &EngineOptions,
        context: ErrorContext,
    ) -> ShakeResult<Self> {
        match binding {
            TargetBinding::Single(endpoint) => {
                endpoint::open_standalone(endpoint, options.request_timeout, context)
                    .await
                    .map(TargetConnection::Standalone)
            }
            TargetBinding::Cluster(endpoints) => {
                endpoint::open_cluster(endpoints, options.request_timeout, context)
                    .await
                    .map(TargetConnection::Cluster)
            }
        }
    }

    async fn select_db(&mut self, db: i64) -> RedisResult<()> {
        let mut cmd = redis::cmd("SELECT");
        cmd.arg(db);
        match self {
            TargetConnection::Standalone(conn) => cmd.query_async(conn).await,
            TargetConnection::Cluster(conn) => cmd.query_async(conn).await,
        }
    }

    /// Sends every command in `pipe` as one write and returns the raw reply
    /// for each, in order. The caller converts each reply itself (as
    /// `fetcher` already does for `DUMP`/`PTTL`), so one failing `RESTORE`
    /// surfaces as a `Value::Error` in its own slot instead of aborting the
    /// whole batch's decode. Always runs on this Executor's own connection
    /// (never a clone), so it cannot race with the `SELECT` that precedes it.
    async fn query_pipeline(&mut self, pipe: &redis::Pipeline) -> RedisResult<Vec<redis::Value>> {
        match self {
            TargetConnection::Standalone(conn) => pipe.query_async(conn).await,
            TargetConnection::Cluster(conn) => pipe.query_async(conn).await,
        }
    }
}

/// Translates a `PTTL` reply into the Writer's decision: `None` means drop
/// the key (it expired between scan and dump), `Some(ttl)` is the ttl to
/// pass to `RESTORE`, with the "no expiration" sentinel rewritten to `0`.
fn resolve_ttl(pttl: i64) -> Option<i64> {
    match pttl {
        -2 => None,
        -1 => Some(0),
        ttl => Some(ttl),
    }
}

fn new_scanner(shard: &SourceShard) -> Scanner {
    match shard {
        SourceShard::Standalone => Scanner::single(),
        SourceShard::ClusterShard(ordinal) => Scanner::aliyun_shard(*ordinal),
        SourceShard::ClusterNode { .. } => Scanner::cluster_node(),
    }
}

async fn discover_dbs(
    source_conn: &mut MultiplexedConnection,
    fixed_db: Option<i64>,
    context: &ErrorContext,
) -> ShakeResult<Vec<i64>> {
    if let Some(db) = fixed_db {
        return Ok(vec![db]);
    }
    let info: String = redis::cmd("INFO")
        .arg("keyspace")
        .query_async(source_conn)
        .await
        .map_err(|source| ShakeError::Discovery {
            context: context.clone(),
            reason: source.to_string(),
        })?;
    let dbs: Vec<i64> = crate::cloud::parse_keyspace(&info)
        .into_iter()
        .map(i64::from)
        .collect();
    if dbs.is_empty() {
        return Ok(vec![0]);
    }
    Ok(dbs)
}

/// Scans every db the source reports, dumps each key it finds in
/// `DUMP`+`PTTL` pairs batched `scan_key_number` at a time, and pushes the
/// results onto `key_tx`. A key that vanishes between `SCAN` and `DUMP`
/// (reported as a nil dump) is silently skipped, matching the source's own
/// eventual-consistency guarantee.
async fn fetcher(
    mut source_conn: MultiplexedConnection,
    shard: SourceShard,
    fixed_db: Option<i64>,
    batch_size: u32,
    key_tx: mpsc::Sender<KeyRecord>,
    stats: Arc<ExecutorStats>,
    context: ErrorContext,
) -> ShakeResult<()> {
    let fetch_err = |source: redis::RedisError| ShakeError::Fetch {
        context: context.clone(),
        source,
    };

    let dbs = discover_dbs(&mut source_conn, fixed_db, &context).await?;
    redishake_logger::log_debug(context.to_string(), format!("scanning {} logical db(s)", dbs.len()));
    for db in dbs {
        // Node-enumeration shards are pinned to db 0 on a dedicated
        // per-master connection; selecting it explicitly is redundant there.
        if fixed_db.is_none() {
            redis::cmd("SELECT")
                .arg(db)
                .query_async::<()>(&mut source_conn)
                .await
                .map_err(fetch_err)?;
            redishake_logger::log_debug(context.to_string(), format!("selected source db {db}"));
        }

        let mut scanner = new_scanner(&shard);
        loop {
            let keys = scanner
                .scan_key(&mut source_conn, batch_size)
                .await
                .map_err(fetch_err)?;

            if !keys.is_empty() {
                let mut pipe = redis::pipe();
                for key in &keys {
                    pipe.cmd("DUMP").arg(key);
                }
                for key in &keys {
                    pipe.cmd("PTTL").arg(key);
                }
                let replies: Vec<redis::Value> =
                    pipe.query_async(&mut source_conn).await.map_err(fetch_err)?;
                let n = keys.len();
                let (dumps, pttls) = replies.split_at(n);

                let mut batch_bytes = 0u64;
                for (i, key) in keys.iter().enumerate() {
                    let value: Option<Vec<u8>> =
                        redis::from_redis_value(&dumps[i]).map_err(fetch_err)?;
                    let Some(value) = value else {
                        continue;
                    };
                    let pttl: i64 = redis::from_redis_value(&pttls[i]).unwrap_or(-1);
                    batch_bytes += value.len() as u64;
                    let record = KeyRecord {
                        db,
                        key: Bytes::from(key.clone()),
                        value: Bytes::from(value),
                        pttl,
                    };
                    if key_tx.send(record).await.is_err() {
                        return Ok(()); // writer gone; nothing left to do
                    }
                }
                stats.add_read(n as u64, batch_bytes);
            }

            if scanner.end_node() {
                break;
            }
        }
    }
    Ok(())
}

/// Builds one `RESTORE` pipeline from `batch`, issues it with a single
/// `query_async` on `target_conn`, and pushes each key's resolved outcome
/// onto `result_chan` before crediting the batch to
/// `write-commands`/`write-bytes` in one update. A no-op on an empty batch.
/// Returns `false` if `resultChan`'s receiver is gone, in which case the
/// caller should stop.
async fn flush_pipeline(
    target_conn: &mut TargetConnection,
    batch: &mut Vec<PendingWrite>,
    batch_bytes: &mut u64,
    rewrite: bool,
    result_tx: &mpsc::Sender<PendingRestore>,
    stats: &ExecutorStats,
    context: &ErrorContext,
) -> ShakeResult<bool> {
    if batch.is_empty() {
        return Ok(true);
    }

    let mut pipe = redis::pipe();
    for (key, pttl, value) in batch.iter() {
        let mut cmd = redis::cmd("RESTORE");
        cmd.arg(&key[..]).arg(*pttl).arg(&value[..]);
        if rewrite {
            cmd.arg("REPLACE");
        }
        pipe.add_command(cmd);
    }

    let replies = target_conn
        .query_pipeline(&pipe)
        .await
        .map_err(|source| ShakeError::Confirm {
            context: context.clone(),
            source,
        })?;

    let count = batch.len() as u64;
    for ((key, pttl, _value), reply) in batch.drain(..).zip(replies) {
        let result: RedisResult<()> = redis::from_redis_value(&reply);
        if result_tx.send((key, pttl, result)).await.is_err() {
            return Ok(false); // receiver gone; caller should stop
        }
    }
    stats.add_write(count, *batch_bytes);
    *batch_bytes = 0;
    Ok(true)
}

/// Drains `key_chan`, translating each record's ttl per the target
/// semantics (drop a key whose ttl already expired, persist a key with no
/// ttl) and batching `RESTORE` commands into one pipeline per flush. A db
/// switch always flushes the outstanding batch first and waits for it to
/// finish before issuing the next `SELECT`, so a batch destined for the
/// outgoing db can never land on the wire after it. The trailing partial
/// batch is flushed when `key_chan` closes.
async fn writer(
    mut target_conn: TargetConnection,
    mut key_rx: mpsc::Receiver<KeyRecord>,
    result_tx: mpsc::Sender<PendingRestore>,
    rewrite: bool,
    batch_size: u32,
    inter_command_delay: Duration,
    stats: Arc<ExecutorStats>,
    context: ErrorContext,
) -> ShakeResult<()> {
    let batch_size = batch_size.max(1) as usize;
    let mut current_db: Option<i64> = None;
    let mut batch: Vec<PendingWrite> = Vec::with_capacity(batch_size);
    let mut batch_bytes = 0u64;

    while let Some(record) = key_rx.recv().await {
        let Some(pttl) = resolve_ttl(record.pttl) else {
            continue; // already expired on the source between scan and dump
        };

        if current_db != Some(record.db) {
            let flushed = batch.len();
            if !flush_pipeline(
                &mut target_conn,
                &mut batch,
                &mut batch_bytes,
                rewrite,
                &result_tx,
                &stats,
                &context,
            )
            .await?
            {
                return Ok(()); // receiver gone
            }
            if flushed > 0 {
                redishake_logger::log_debug(
                    context.to_string(),
                    format!("flushed batch of {flushed} restores before db switch"),
                );
            }

            target_conn
                .select_db(record.db)
                .await
                .map_err(|source| ShakeError::Confirm {
                    context: context.clone(),
                    source,
                })?;
            current_db = Some(record.db);
            redishake_logger::log_debug(context.to_string(), format!("selected target db {}", record.db));
        }

        batch_bytes += record.value.len() as u64;
        batch.push((record.key, pttl, record.value));

        if batch.len() >= batch_size {
            let flushed = batch.len();
            if !flush_pipeline(
                &mut target_conn,
                &mut batch,
                &mut batch_bytes,
                rewrite,
                &result_tx,
                &stats,
                &context,
            )
            .await?
            {
                return Ok(()); // receiver gone
            }
            redishake_logger::log_debug(context.to_string(), format!("flushed batch of {flushed} restores"));
        }

        if !inter_command_delay.is_zero() {
            tokio::time::sleep(inter_command_delay).await;
        }
    }
    let trailing = batch.len();
    if flush_pipeline(
        &mut target_conn,
        &mut batch,
        &mut batch_bytes,
        rewrite,
        &result_tx,
        &stats,
        &context,
    )
    .await?
        && trailing > 0
    {
        redishake_logger::log_debug(
            context.to_string(),
            format!("flushed trailing batch of {trailing} restores"),
        );
    }
    Ok(())
}

/// Confirms every pipelined `RESTORE` in issue order. `()` as the decode
/// target accepts both the usual `+OK` and the nil some target
/// implementations reply with on an already-expired-ttl restore, so no
/// special-casing is needed here: a nil reply is simply a successful
/// confirmation, and a `Value::Error` decodes to `Err` the same way a direct
/// `query_async::<()>` call would.
async fn receiver(
    mut result_rx: mpsc::Receiver<PendingRestore>,
    stats: Arc<ExecutorStats>,
    context: ErrorContext,
) -> ShakeResult<()> {
    while let Some((key, pttl, result)) = result_rx.recv().await {
        match result {
            Ok(()) => stats.incr_confirmed(),
            Err(source) => {
                return Err(ShakeError::Confirm {
                    context: ErrorContext {
                        key: Some(key.to_vec()),
                        pttl: Some(pttl),
                        ..context.clone()
                    },
                    source,
                })
            }
        }
    }
    Ok(())
}

/// What one Executor did, handed back up to its Rumper for aggregation.
#[derive(Debug, Clone)]
pub struct ExecutorReport {
    pub rumper_id: usize,
    pub executor_id: usize,
    pub source_address: String,
    pub stats: BTreeMap<&'static str, u64>,
}

/// A live view onto one running Executor's `ExecutorStats` plus the current
/// depth of its `keyChan`/`resultChan`, sampled on demand. Cheap to clone
/// and safe to poll from outside the Executor's own task for as long as the
/// Executor is alive; after it exits, the channel senders are closed and
/// both depths read back as zero.
#[derive(Clone)]
pub struct ExecutorHandle {
    rumper_id: usize,
    executor_id: usize,
    source_address: String,
    stats: Arc<ExecutorStats>,
    key_tx: mpsc::Sender<KeyRecord>,
    result_tx: mpsc::Sender<PendingRestore>,
}

impl ExecutorHandle {
    pub fn rumper_id(&self) -> usize {
        self.rumper_id
    }

    pub fn executor_id(&self) -> usize {
        self.executor_id
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    /// The five atomic counters plus `key_chan_depth` and `result_chan_depth`.
    /// Entries are sampled independently, so the map as a whole is only
    /// eventually consistent, not a single atomic snapshot.
    pub fn detailed_info(&self) -> BTreeMap<&'static str, u64> {
        let mut info = self.stats.snapshot();
        info.insert("key_chan_depth", crate::stats::channel_depth(&self.key_tx) as u64);
        info.insert(
            "result_chan_depth",
            crate::stats::channel_depth(&self.result_tx) as u64,
        );
        info
    }
}

/// One shard's worth of migration work: a single source connection, a
/// single target binding, and the fetcher/writer/receiver pipeline that
/// moves keys between them.
pub struct Executor {
    rumper_id: usize,
    executor_id: usize,
    binding: ShardBinding,
    options: Arc<EngineOptions>,
}

impl Executor {
    pub fn new(
        rumper_id: usize,
        executor_id: usize,
        binding: ShardBinding,
        options: Arc<EngineOptions>,
    ) -> Self {
        Self {
            rumper_id,
            executor_id,
            binding,
            options,
        }
    }

    pub fn source_address(&self) -> String {
        self.binding.source_endpoint.display_address()
    }

    /// Builds this Executor's channels and hands back an [`ExecutorHandle`]
    /// for live introspection before spawning the pipeline itself, so a
    /// caller can start polling `detailed_info()` from the moment the
    /// Executor is scheduled rather than only after it finishes.
    pub fn spawn(self) -> (ExecutorHandle, JoinHandle<ShakeResult<ExecutorReport>>) {
        let stats = Arc::new(ExecutorStats::default());
        let capacity = self.options.channel_capacity();
        let (key_tx, key_rx) = mpsc::channel::<KeyRecord>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<PendingRestore>(capacity);

        let handle = ExecutorHandle {
            rumper_id: self.rumper_id,
            executor_id: self.executor_id,
            source_address: self.source_address(),
            stats: stats.clone(),
            key_tx: key_tx.clone(),
            result_tx: result_tx.clone(),
        };

        let join = tokio::spawn(self.run_with_channels(stats, key_tx, key_rx, result_tx, result_rx));
        (handle, join)
    }

    /// Runs the pipeline to completion on the current task, building its own
    /// channels and stats. Equivalent to `spawn()` followed by awaiting the
    /// join handle, for callers that have no use for live introspection.
    pub async fn run(self) -> ShakeResult<ExecutorReport> {
        let stats = Arc::new(ExecutorStats::default());
        let capacity = self.options.channel_capacity();
        let (key_tx, key_rx) = mpsc::channel::<KeyRecord>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<PendingRestore>(capacity);
        self.run_with_channels(stats, key_tx, key_rx, result_tx, result_rx)
            .await
    }

    async fn run_with_channels(
        self,
        stats: Arc<ExecutorStats>,
        key_tx: mpsc::Sender<KeyRecord>,
        key_rx: mpsc::Receiver<KeyRecord>,
        result_tx: mpsc::Sender<PendingRestore>,
        result_rx: mpsc::Receiver<PendingRestore>,
    ) -> ShakeResult<ExecutorReport> {
        let context = ErrorContext {
            source_address: self.source_address(),
            rumper_id: self.rumper_id,
            executor_id: self.executor_id,
            key: None,
            pttl: None,
        };
        redishake_logger::log_info(context.to_string(), "executor started");

        let source_conn = endpoint::open_standalone(
            &self.binding.source_endpoint,
            self.options.request_timeout,
            context.clone(),
        )
        .await?;
        let target_conn =
            TargetConnection::open(&self.binding.target, &self.options, context.clone()).await?;

        let fixed_db = self.binding.fixed_logical_db();
        let fetcher_handle = tokio::spawn(fetcher(
            source_conn,
            self.binding.source.clone(),
            fixed_db,
            self.options.scan_key_number,
            key_tx,
            stats.clone(),
            context.clone(),
        ));
        let writer_handle = tokio::spawn(writer(
            target_conn,
            key_rx,
            result_tx,
            self.options.rewrite,
            self.options.scan_key_number,
            self.options.inter_command_delay,
            stats.clone(),
            context.clone(),
        ));
        let receiver_handle = tokio::spawn(receiver(result_rx, stats.clone(), context.clone()));

        let join_err = |stage: &'static str, err: tokio::task::JoinError| ShakeError::Confirm {
            context: context.clone(),
            source: (
                redis::ErrorKind::IoError,
                "pipeline task did not complete",
                format!("{stage}: {err}"),
            )
                .into(),
        };

        fetcher_handle
            .await
            .map_err(|e| join_err("fetcher", e))??;
        writer_handle.await.map_err(|e| join_err("writer", e))??;
        receiver_handle
            .await
            .map_err(|e| join_err("receiver", e))??;

        let snapshot = stats.snapshot();
        redishake_logger::log_info(
            context.to_string(),
            format!(
                "executor finished: {} confirmed of {} written",
                snapshot.get("confirmed_commands").unwrap_or(&0),
                snapshot.get("write_commands").unwrap_or(&0)
            ),
        );

        Ok(ExecutorReport {
            rumper_id: self.rumper_id,
            executor_id: self.executor_id,
            source_address: context.source_address,
            stats: snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-2, None)]
    #[case(-1, Some(0))]
    #[case(0, Some(0))]
    #[case(120_000, Some(120_000))]
    fn resolve_ttl_applies_drop_and_rewrite_rules(#[case] pttl: i64, #[case] expected: Option<i64>) {
        assert_eq!(resolve_ttl(pttl), expected);
    }

    #[tokio::test]
    async fn executor_handle_reports_counters_and_chan_depths() {
        let stats = Arc::new(ExecutorStats::default());
        stats.add_read(2, 10);
        let (key_tx, mut key_rx) = mpsc::channel::<KeyRecord>(4);
        let (result_tx, _result_rx) = mpsc::channel::<PendingRestore>(4);
        key_tx
            .send(KeyRecord {
                db: 0,
                key: Bytes::from_static(b"k"),
                value: Bytes::from_static(b"v"),
                pttl: -1,
            })
            .await
            .unwrap();

        let handle = ExecutorHandle {
            rumper_id: 1,
            executor_id: 2,
            source_address: "src:6379".into(),
            stats: stats.clone(),
            key_tx,
            result_tx,
        };

        let info = handle.detailed_info();
        assert_eq!(info["read_commands"], 2);
        assert_eq!(info["key_chan_depth"], 1);
        assert_eq!(info["result_chan_depth"], 0);
        assert_eq!(handle.rumper_id(), 1);
        assert_eq!(handle.executor_id(), 2);
        assert_eq!(handle.source_address(), "src:6379");

        key_rx.recv().await;
    }

    #[test]
    fn fixed_logical_db_only_applies_to_cluster_node_shards() {
        let target = TargetBinding::Single(Endpoint::standalone("target", 6379));
        let standalone = ShardBinding::standalone(Endpoint::standalone("src", 6379), target.clone());
        assert_eq!(standalone.fixed_logical_db(), None);

        let node = ShardBinding::cluster_node(
            "node-1".into(),
            Endpoint::standalone("10.0.0.5", 6379),
            target,
        );
        assert_eq!(node.fixed_logical_db(), Some(0));
    }
}
