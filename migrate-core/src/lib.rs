/*
 * Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0
 */

pub mod cloud;
pub mod config;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod rumper;
pub mod scanner;
pub mod shard;
pub mod stats;

pub use config::{EngineOptions, ScanSpecialCloud, TargetType};
pub use driver::{ActivityMetric, Driver, DriverReport, NoopActivityMetric};
pub use endpoint::{AuthType, Endpoint, EndpointRole};
pub use error::{ShakeError, ShakeResult};
pub use executor::ExecutorHandle;
pub use rumper::RumperReport;
