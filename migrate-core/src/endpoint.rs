// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! A reachable server, and the plumbing that turns one or more of them into
//! a live `redis-rs` connection. This module is the core's only point of
//! contact with connection setup; TLS certificate provisioning and
//! credential storage stay the caller's concern, as does choosing an
//! `AuthType` in the first place.

use crate::error::{ErrorContext, ShakeError};
use redis::aio::MultiplexedConnection;
use redis::cluster_async::ClusterConnection;
use std::time::Duration;

/// How a connection authenticates to its server.
#[derive(Debug, Clone, Default)]
pub enum AuthType {
    #[default]
    NoAuth,
    Password {
        username: Option<String>,
        password: String,
    },
}

/// What role this address plays in its topology; informational, carried
/// through for logging and report generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Standalone,
    ClusterMember,
    Proxy,
}

/// A reachable server: address, auth, TLS, and a role hint. Immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub auth: AuthType,
    pub tls: bool,
    pub role: EndpointRole,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, role: EndpointRole) -> Self {
        Self {
            host: host.into(),
            port,
            auth: AuthType::NoAuth,
            tls: false,
            role,
        }
    }

    pub fn standalone(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, EndpointRole::Standalone)
    }

    pub fn with_auth(mut self, auth: AuthType) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn display_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connection_addr(&self) -> redis::ConnectionAddr {
        if self.tls {
            redis::ConnectionAddr::TcpTls {
                host: self.host.clone(),
                port: self.port,
                insecure: false,
                tls_params: None,
            }
        } else {
            redis::ConnectionAddr::Tcp(self.host.clone(), self.port)
        }
    }

    fn redis_connection_info(&self, database_id: i64) -> redis::RedisConnectionInfo {
        match &self.auth {
            AuthType::NoAuth => redis::RedisConnectionInfo {
                db: database_id,
                ..Default::default()
            },
            AuthType::Password { username, password } => redis::RedisConnectionInfo {
                db: database_id,
                username: username.clone(),
                password: Some(password.clone()),
                ..Default::default()
            },
        }
    }

    fn connection_info(&self, database_id: i64) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: self.connection_addr(),
            redis: self.redis_connection_info(database_id),
        }
    }
}

/// Opens a single-node, pipelined async connection to `endpoint`. Used for
/// every source connection and for non-cluster target connections.
pub async fn open_standalone(
    endpoint: &Endpoint,
    request_timeout: Duration,
    context: ErrorContext,
) -> Result<MultiplexedConnection, ShakeError> {
    let client =
        redis::Client::open(endpoint.connection_info(0)).map_err(|source| ShakeError::Connect {
            context: context.clone(),
            source,
        })?;
    tokio::time::timeout(request_timeout, client.get_multiplexed_async_connection())
        .await
        .map_err(|_| ShakeError::Connect {
            context: context.clone(),
            source: (redis::ErrorKind::IoError, "connection attempt timed out").into(),
        })?
        .map_err(|source| ShakeError::Connect { context, source })
}

/// Opens a cluster-routed async connection spanning every address in
/// `endpoints`. The returned connection performs slot-based routing
/// internally: callers never need to know which node owns which key.
pub async fn open_cluster(
    endpoints: &[Endpoint],
    request_timeout: Duration,
    context: ErrorContext,
) -> Result<ClusterConnection, ShakeError> {
    let initial_nodes: Vec<redis::ConnectionInfo> =
        endpoints.iter().map(|e| e.connection_info(0)).collect();
    let client = redis::cluster::ClusterClientBuilder::new(initial_nodes)
        .connection_timeout(request_timeout)
        .build()
        .map_err(|source| ShakeError::Connect {
            context: context.clone(),
            source,
        })?;
    client
        .get_async_connection()
        .await
        .map_err(|source| ShakeError::Connect { context, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_address_formats_host_and_port() {
        let ep = Endpoint::standalone("10.0.0.1", 7000);
        assert_eq!(ep.display_address(), "10.0.0.1:7000");
    }

    #[test]
    fn tls_selects_tcp_tls_connection_addr() {
        let ep = Endpoint::standalone("example.com", 6380).with_tls(true);
        match ep.connection_addr() {
            redis::ConnectionAddr::TcpTls { host, port, insecure, .. } => {
                assert_eq!(host, "example.com");
                assert_eq!(port, 6380);
                assert!(!insecure);
            }
            other => panic!("expected TcpTls, got {other:?}"),
        }
    }

    #[test]
    fn password_auth_is_carried_into_connection_info() {
        let ep = Endpoint::standalone("localhost", 6379).with_auth(AuthType::Password {
            username: Some("shaker".into()),
            password: "hunter2".into(),
        });
        let info = ep.redis_connection_info(3);
        assert_eq!(info.username.as_deref(), Some("shaker"));
        assert_eq!(info.password.as_deref(), Some("hunter2"));
        assert_eq!(info.db, 3);
    }
}
