//! Post-deployment profiling stage for Terraform-based provisioning runs.
//!
//! Registers as the last stage of the host orchestration lifecycle. On
//! deploy and destroy it provisions the pinned tf-profile release, runs it
//! against each executed stage's Terraform log, and captures the output into
//! per-stage report files, optionally aggregated into a single Markdown
//! document with one collapsible section per stage.

pub mod config;
pub mod error;
pub mod logs;
pub mod provision;
pub mod report;
pub mod stage;

pub use config::Config;
pub use error::StageError;
pub use logs::Mode;
pub use stage::{LifecycleStage, StageOutputs, StageStatus, TfProfileStage};
