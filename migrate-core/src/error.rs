// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! The typed error surface every fallible operation in this crate returns.
//!
//! Errors propagate as `Result`s up through Executor -> Rumper -> Driver
//! instead of panicking, so a single shard's failure doesn't tear down a
//! run still making progress on the rest of the source estate.

use redis::RedisError;
use std::fmt;

/// Identifies which rumper/executor/key/pttl an error occurred at, for both
/// the structured log line and the aggregate report.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub source_address: String,
    pub rumper_id: usize,
    pub executor_id: usize,
    pub key: Option<Vec<u8>>,
    pub pttl: Option<i64>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source[{}] rumper[{}] executor[{}]",
            self.source_address, self.rumper_id, self.executor_id
        )?;
        if let Some(key) = &self.key {
            write!(f, " key[{}]", String::from_utf8_lossy(key))?;
        }
        if let Some(pttl) = self.pttl {
            write!(f, " pttl[{pttl}]")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ShakeError {
    /// Could not open a source or target connection.
    #[error("{context}: failed to connect: {source}")]
    Connect {
        context: ErrorContext,
        #[source]
        source: RedisError,
    },

    /// `INFO Cluster`/`CLUSTER NODES` could not be parsed, or reported zero nodes.
    #[error("{context}: topology discovery failed: {reason}")]
    Discovery {
        context: ErrorContext,
        reason: String,
    },

    /// A `DUMP`/`PTTL` batch reply could not be decoded.
    #[error("{context}: fetch from source failed: {source}")]
    Fetch {
        context: ErrorContext,
        #[source]
        source: RedisError,
    },

    /// A `RESTORE` reply was an error other than the nil sentinel, or the
    /// confirmer task died before it could observe one.
    #[error("{context}: restore to target failed: {source}")]
    Confirm {
        context: ErrorContext,
        #[source]
        source: RedisError,
    },
}

impl ShakeError {
    pub fn context(&self) -> &ErrorContext {
        match self {
            ShakeError::Connect { context, .. }
            | ShakeError::Discovery { context, .. }
            | ShakeError::Fetch { context, .. }
            | ShakeError::Confirm { context, .. } => context,
        }
    }

    /// Emits a structured failure line carrying rumper id, executor id, key,
    /// pttl, and the underlying error. Whether the caller aborts the run or
    /// drains the remaining executors is its own decision; this only logs.
    pub fn log(&self) {
        redishake_logger::log_error(self.context().to_string(), self.to_string());
    }
}

pub type ShakeResult<T> = Result<T, ShakeError>;
