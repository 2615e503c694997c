//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`status`] - Alert and sampling overview
//! - [`alert`] - Alert listing, acknowledgement, and resolution
//! - [`test`] - Rule dry run against synthetic metrics
//! - [`summary`] - Sample log summary

pub mod alert;
pub mod status;
pub mod summary;

pub use alert::{AlertCommand, AlertList, load_store};
pub use status::{StatusCommand, StatusReport};
pub use summary::{SummaryCommand, SummaryReport};
pub use test::{TestCommand, TestReport, TriggeredRule, synthetic_metrics};
