//! Core infrastructure for changeflow.
//!
//! Configuration loading and retry handling shared by the store and the
//! generation clients.

mod config;
mod retry;

pub use config::{AiConfig, Config, GeneralConfig, ImpactConfig, IntakeConfig, StoreConfig};
pub use retry::{retry_async, AttemptError, RetryConfig, RetryResult};
