//! Locate the Terraform log file for a stage and lifecycle mode.
//!
//! The provisioning run writes logs into timestamped subdirectories of a
//! root; the newest subdirectory holds the logs for the run being profiled.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StageError;

/// Lifecycle phase that produced the log being profiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Apply,
    Destroy,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Apply => "apply",
            Mode::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final path segment of a stage name; stage names may carry path separators
/// but log and report files are named by the last component only.
pub fn short_stage_name(stage: &str) -> &str {
    stage.rsplit('/').next().unwrap_or(stage)
}

/// Log filename for a stage and mode: `terraform_<mode>_<stage>.log`.
pub fn log_filename(mode: Mode, stage: &str) -> String {
    format!("terraform_{mode}_{}.log", short_stage_name(stage))
}

/// Pick the most recently modified immediate subdirectory of the log root.
pub fn latest_log_dir(root: &Path) -> Result<PathBuf, StageError> {
    let not_found = || StageError::LogNotFound {
        root: root.to_path_buf(),
    };
    let entries = fs::read_dir(root).map_err(|_| not_found())?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|err| StageError::io(format!("read {}", root.display()), err))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(UNIX_EPOCH);
        if newest.as_ref().is_none_or(|(when, _)| modified >= *when) {
            newest = Some((modified, path));
        }
    }
    newest.map(|(_, path)| path).ok_or_else(not_found)
}

/// Full path to the log file for `stage` in `mode` under the newest log
/// directory. The file itself is not checked for existence; the profiler is
/// invoked regardless and reports its own error.
pub fn resolve_log_file(root: &Path, mode: Mode, stage: &str) -> Result<PathBuf, StageError> {
    Ok(latest_log_dir(root)?.join(log_filename(mode, stage)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn log_filename_follows_terraform_pattern() {
        assert_eq!(
            log_filename(Mode::Apply, "03-kubernetes-initialize"),
            "terraform_apply_03-kubernetes-initialize.log"
        );
        assert_eq!(
            log_filename(Mode::Destroy, "stages/02-infrastructure"),
            "terraform_destroy_02-infrastructure.log"
        );
    }

    #[test]
    fn short_stage_name_takes_final_segment() {
        assert_eq!(short_stage_name("01-terraform-state"), "01-terraform-state");
        assert_eq!(short_stage_name("nested/path/02-infra"), "02-infra");
    }

    #[test]
    fn latest_log_dir_picks_newest_subdirectory() {
        let root = TempDir::new().expect("temp dir");
        fs::create_dir(root.path().join("older")).expect("create older");
        // Directory mtimes need to differ for the ordering to be observable.
        thread::sleep(Duration::from_millis(50));
        fs::create_dir(root.path().join("newer")).expect("create newer");

        let picked = latest_log_dir(root.path()).expect("resolve latest");
        assert_eq!(picked, root.path().join("newer"));
    }

    #[test]
    fn latest_log_dir_ignores_plain_files() {
        let root = TempDir::new().expect("temp dir");
        fs::write(root.path().join("stray.log"), b"x").expect("write file");
        fs::create_dir(root.path().join("run-1")).expect("create dir");

        let picked = latest_log_dir(root.path()).expect("resolve latest");
        assert_eq!(picked, root.path().join("run-1"));
    }

    #[test]
    fn empty_root_is_log_not_found() {
        let root = TempDir::new().expect("temp dir");
        let err = latest_log_dir(root.path()).expect_err("no subdirectories");
        assert!(matches!(err, StageError::LogNotFound { .. }));
    }

    #[test]
    fn missing_root_is_log_not_found() {
        let err = latest_log_dir(Path::new("/nonexistent/log-root")).expect_err("missing root");
        assert!(matches!(err, StageError::LogNotFound { .. }));
    }
}
