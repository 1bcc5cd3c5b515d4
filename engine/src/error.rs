//! Engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("monitoring is already running")]
    AlreadyRunning,

    #[error("monitoring is not running")]
    NotRunning,

    #[error("session is closed, write rejected")]
    SessionClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("probe initialization failed: {0}")]
    ProbeInit(String),
}
