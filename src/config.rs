//! Environment-driven configuration for the stage.
//!
//! Resolved once at startup; tests construct `Config` directly instead of
//! mutating the process environment.

use std::env;
use std::path::PathBuf;

/// Pinned release of the tf-profile binary.
pub const TF_PROFILE_VERSION: &str = "v0.4.0";

/// Reports directory override.
pub const RESULTS_PATH_ENV: &str = "NEBARI_TF_PROFILE_RESULTS_PATH";
/// Log-file root override.
pub const LOG_FILES_PATH_ENV: &str = "NEBARI_EXPORT_LOG_FILES_PATH";
/// Set (non-empty) to generate the combined `report.md`.
pub const CREATE_REPORT_ENV: &str = "NEBARI_TF_PROFILE_CREATE_REPORT";
/// Set (non-empty) to turn per-stage profiling failures into a run failure.
pub const STRICT_ENV: &str = "NEBARI_TF_PROFILE_STRICT";

#[derive(Debug, Clone)]
pub struct Config {
    /// Where per-stage report files (and `report.md`) are written.
    pub reports_dir: PathBuf,
    /// Root containing timestamped log directories from the provisioning run.
    pub log_root: PathBuf,
    /// Concatenate all report files into a single `report.md`.
    pub combined_report: bool,
    /// Fail the run when any stage's profiling fails.
    pub strict: bool,
    /// tf-profile release tag to provision.
    pub version: String,
}

impl Config {
    /// Resolve configuration from the environment, defaulting the reports
    /// directory and log root to paths under the working directory.
    pub fn from_env() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let reports_dir = env::var_os(RESULTS_PATH_ENV)
            .map_or_else(|| cwd.join("tf-profile-reports"), PathBuf::from);
        let log_root = env::var_os(LOG_FILES_PATH_ENV).map_or(cwd, PathBuf::from);
        Self {
            reports_dir,
            log_root,
            combined_report: env_flag(CREATE_REPORT_ENV),
            strict: env_flag(STRICT_ENV),
            version: TF_PROFILE_VERSION.to_string(),
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var_os(name).is_some_and(|value| !value.is_empty())
}
