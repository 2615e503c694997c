//! # vigild
//!
//! The Vigil monitoring daemon and its operator CLI.
//!
//! The daemon samples host and process metrics on a fixed period, evaluates
//! alert rules against the latest samples, and delivers triggered alerts to
//! the configured notification channels. The operator commands read and
//! update the alert snapshot the daemon writes, so they work whether or not
//! a daemon is running.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐  window   ┌───────────┐  alerts  ┌───────┐  drain  ┌────────────┐
//! │ sampler │──────────►│ evaluator │─────────►│ queue │────────►│ dispatcher │
//! └────┬────┘  (watch)  └───────────┘          └───────┘         └─────┬──────┘
//!      │ flush                                                         │ record
//!      ▼                                                               ▼
//! ┌────────────┐                                                 ┌────────────┐
//! │ sample log │                                                 │ alert store│──► snapshot
//! └────────────┘                                                 └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format};
pub use config::VigilConfig;
pub use daemon::{Daemon, build_dispatcher};
pub use error::{DaemonError, Result};
pub use output::{OutputFormat, TableDisplay};
