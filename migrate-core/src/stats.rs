// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! Per-executor atomic counters and the introspection snapshot built from
//! them. Counters are enumerated by name into a `BTreeMap` rather than
//! walked via reflection, so the snapshot stays a plain, typed projection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Five monotonically non-decreasing counters, touched concurrently by the
/// Fetcher, Writer and Receiver of one Executor. No locks: every update is a
/// single atomic add.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    read_bytes: AtomicU64,
    read_commands: AtomicU64,
    write_bytes: AtomicU64,
    write_commands: AtomicU64,
    confirmed_commands: AtomicU64,
}

impl ExecutorStats {
    pub fn add_read(&self, commands: u64, bytes: u64) {
        self.read_commands.fetch_add(commands, Ordering::Relaxed);
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_write(&self, commands: u64, bytes: u64) {
        self.write_commands.fetch_add(commands, Ordering::Relaxed);
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn incr_confirmed(&self) {
        self.confirmed_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    pub fn read_commands(&self) -> u64 {
        self.read_commands.load(Ordering::Relaxed)
    }

    pub fn write_bytes(&self) -> u64 {
        self.write_bytes.load(Ordering::Relaxed)
    }

    pub fn write_commands(&self) -> u64 {
        self.write_commands.load(Ordering::Relaxed)
    }

    pub fn confirmed_commands(&self) -> u64 {
        self.confirmed_commands.load(Ordering::Relaxed)
    }

    /// A best-effort snapshot: the five counters are read independently, so
    /// the map is not guaranteed to be mutually consistent across entries.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        BTreeMap::from([
            ("read_bytes", self.read_bytes()),
            ("read_commands", self.read_commands()),
            ("write_bytes", self.write_bytes()),
            ("write_commands", self.write_commands()),
            ("confirmed_commands", self.confirmed_commands()),
        ])
    }
}

/// Current number of items sitting in a bounded `tokio::sync::mpsc` channel,
/// derived from the sender's free capacity. Used to sample `keyChan`'s and
/// `resultChan`'s depths on demand without giving either queue a dedicated
/// counter.
pub fn channel_depth<T>(sender: &mpsc::Sender<T>) -> usize {
    sender.max_capacity() - sender.capacity()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_all_five_counters() {
        let stats = ExecutorStats::default();
        stats.add_read(3, 120);
        stats.add_write(2, 80);
        stats.incr_confirmed();
        stats.incr_confirmed();
        let snap = stats.snapshot();
        assert_eq!(snap["read_commands"], 3);
        assert_eq!(snap["read_bytes"], 120);
        assert_eq!(snap["write_commands"], 2);
        assert_eq!(snap["write_bytes"], 80);
        assert_eq!(snap["confirmed_commands"], 2);
    }

    #[tokio::test]
    async fn channel_depth_counts_buffered_items() {
        let (tx, mut rx) = mpsc::channel::<i32>(4);
        assert_eq!(channel_depth(&tx), 0);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        assert_eq!(channel_depth(&tx), 2);
        rx.recv().await;
        assert_eq!(channel_depth(&tx), 1);
    }
}
