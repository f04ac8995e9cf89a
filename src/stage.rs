//! The tf-profile stage: host lifecycle hooks and the profiling procedure.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::StageError;
use crate::logs::{self, Mode};
use crate::provision::{HttpFetcher, Provisioner};
use crate::report::{write_combined_report, StageReports};

/// Registration name for the host framework.
pub const STAGE_NAME: &str = "tf-profile";
/// Registration priority; large so the stage runs after all others.
pub const STAGE_PRIORITY: u32 = 100;
/// tf-profile subcommands run per stage, in report order.
pub const REPORT_SUBCOMMANDS: &[&str] = &["stats", "table"];

/// Recorded stage set, persisted alongside the reports so `destroy` and
/// `check` work in a fresh process.
const STAGES_FILE: &str = "stages.json";

/// Wall-clock bound per profiler invocation; a hung binary must not block
/// the run indefinitely.
const PROFILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Stage outputs as supplied by the host: stage name to arbitrary results.
pub type StageOutputs = BTreeMap<String, serde_json::Value>;
/// Per-stage success flags supplied by the host on destroy.
pub type StageStatus = BTreeMap<String, bool>;

/// Host lifecycle contract. Hooks are scoped: each performs its side effects
/// and then invokes the host continuation, so host-side cleanup ordering is
/// preserved. A hook that fails fatally returns without running the
/// continuation; the host handles the error per its own conventions.
pub trait LifecycleStage {
    fn name(&self) -> &'static str;
    fn priority(&self) -> u32;
    fn deploy(
        &mut self,
        stage_outputs: &StageOutputs,
        scope: &mut dyn FnMut(),
    ) -> Result<(), StageError>;
    fn destroy(
        &mut self,
        stage_outputs: &StageOutputs,
        status: &StageStatus,
        scope: &mut dyn FnMut(),
    ) -> Result<(), StageError>;
    fn check(&mut self, stage_outputs: &StageOutputs) -> Result<bool, StageError>;
}

/// Source of the profiler binary. The default implementation provisions the
/// pinned tf-profile release; tests substitute a fixed path.
pub trait ProvideBinary {
    fn binary_path(&self) -> Result<PathBuf, StageError>;
}

struct PinnedProvisioner {
    provisioner: Provisioner<HttpFetcher>,
    version: String,
}

impl ProvideBinary for PinnedProvisioner {
    fn binary_path(&self) -> Result<PathBuf, StageError> {
        self.provisioner.ensure_binary(&self.version)
    }
}

/// Runs tf-profile against each executed stage's Terraform log and captures
/// the output into per-stage report files.
pub struct TfProfileStage {
    config: Config,
    provider: Box<dyn ProvideBinary>,
    stages: Vec<String>,
}

impl TfProfileStage {
    /// Create the stage, resolving and creating the reports directory.
    pub fn new(config: Config) -> Result<Self, StageError> {
        let provider = PinnedProvisioner {
            provisioner: Provisioner::default(),
            version: config.version.clone(),
        };
        Self::with_provider(config, Box::new(provider))
    }

    /// Create the stage with an explicit binary source.
    pub fn with_provider(
        config: Config,
        provider: Box<dyn ProvideBinary>,
    ) -> Result<Self, StageError> {
        fs::create_dir_all(&config.reports_dir).map_err(|err| StageError::Directory {
            path: config.reports_dir.clone(),
            source: err,
        })?;
        Ok(Self {
            config,
            provider,
            stages: Vec::new(),
        })
    }

    pub fn reports_dir(&self) -> &Path {
        &self.config.reports_dir
    }

    fn stages_file(&self) -> PathBuf {
        self.config.reports_dir.join(STAGES_FILE)
    }

    fn persist_stages(&self) -> Result<(), StageError> {
        let path = self.stages_file();
        let bytes = serde_json::to_vec_pretty(&self.stages).map_err(|err| {
            StageError::io(
                format!("serialize {}", path.display()),
                std::io::Error::other(err),
            )
        })?;
        fs::write(&path, bytes)
            .map_err(|err| StageError::io(format!("write {}", path.display()), err))
    }

    /// Stage set recorded by the last deploy, reloaded from disk when this
    /// instance has not recorded one itself.
    fn recorded_stages(&mut self) -> Result<Vec<String>, StageError> {
        if self.stages.is_empty() {
            let path = self.stages_file();
            if path.is_file() {
                let bytes = fs::read(&path)
                    .map_err(|err| StageError::io(format!("read {}", path.display()), err))?;
                self.stages = serde_json::from_slice(&bytes).map_err(|err| {
                    StageError::io(
                        format!("parse {}", path.display()),
                        std::io::Error::other(err),
                    )
                })?;
            }
        }
        Ok(self.stages.clone())
    }

    /// Profile every recorded stage in `mode`. Per-stage failures are
    /// collected and logged; they fail the run only in strict mode.
    /// Provisioning failures abort immediately.
    fn run_profile(&mut self, mode: Mode) -> Result<(), StageError> {
        let binary = self.provider.binary_path()?;
        let stages = self.recorded_stages()?;

        let mut sections = Vec::with_capacity(stages.len());
        let mut failed = Vec::new();
        for stage in &stages {
            let short = logs::short_stage_name(stage).to_string();
            let mut files = Vec::new();
            if let Err(err) = self.profile_stage(&binary, mode, stage, &mut files) {
                tracing::warn!(stage = %stage, %mode, error = %err, "stage profiling failed");
                failed.push(short.clone());
            }
            sections.push(StageReports { stage: short, files });
        }

        if failed.is_empty() {
            tracing::info!(%mode, stages = stages.len(), "profiling complete");
        } else {
            tracing::warn!(
                %mode,
                failed = failed.len(),
                stages = ?failed,
                "profiling finished with failures"
            );
        }

        if self.config.combined_report {
            let path = write_combined_report(&self.config.reports_dir, &sections)?;
            tracing::info!(path = %path.display(), "wrote combined report");
        }

        if self.config.strict && !failed.is_empty() {
            return Err(StageError::Profile { stages: failed });
        }
        Ok(())
    }

    /// Run every report subcommand for one stage, capturing stdout into
    /// `<stage>.<subcommand>` files. Output capture proceeds file-by-file:
    /// one subcommand failing does not suppress the remaining subcommands,
    /// and the first error is surfaced as the stage's failure.
    fn profile_stage(
        &self,
        binary: &Path,
        mode: Mode,
        stage: &str,
        files: &mut Vec<PathBuf>,
    ) -> Result<(), StageError> {
        let short = logs::short_stage_name(stage);
        let log_file = logs::resolve_log_file(&self.config.log_root, mode, stage)?;
        let mut first_error = None;
        for &subcommand in REPORT_SUBCOMMANDS {
            let report = self.config.reports_dir.join(format!("{short}.{subcommand}"));
            files.push(report.clone());
            if let Err(err) = run_profiler(binary, subcommand, &log_file, &report) {
                tracing::warn!(stage = %stage, subcommand, error = %err, "profiler invocation failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// True iff every recorded stage has at least one non-empty report file.
    fn check_reports(&mut self) -> Result<bool, StageError> {
        let stages = self.recorded_stages()?;
        if stages.is_empty() {
            return Ok(false);
        }
        for stage in &stages {
            let short = logs::short_stage_name(stage);
            let has_report = REPORT_SUBCOMMANDS.iter().any(|subcommand| {
                let path = self.config.reports_dir.join(format!("{short}.{subcommand}"));
                fs::metadata(path).is_ok_and(|meta| meta.len() > 0)
            });
            if !has_report {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl LifecycleStage for TfProfileStage {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn priority(&self) -> u32 {
        STAGE_PRIORITY
    }

    fn deploy(
        &mut self,
        stage_outputs: &StageOutputs,
        scope: &mut dyn FnMut(),
    ) -> Result<(), StageError> {
        self.stages = stage_outputs.keys().cloned().collect();
        self.persist_stages()?;
        self.run_profile(Mode::Apply)?;
        scope();
        Ok(())
    }

    fn destroy(
        &mut self,
        _stage_outputs: &StageOutputs,
        status: &StageStatus,
        scope: &mut dyn FnMut(),
    ) -> Result<(), StageError> {
        let failed = status.values().filter(|ok| !**ok).count();
        if failed > 0 {
            tracing::debug!(failed, "profiling destroy logs after partial teardown");
        }
        self.run_profile(Mode::Destroy)?;
        scope();
        Ok(())
    }

    fn check(&mut self, _stage_outputs: &StageOutputs) -> Result<bool, StageError> {
        self.check_reports()
    }
}

/// Invoke `<binary> <subcommand> <log-file>` with stdout captured into
/// `report`, bounded by [`PROFILE_TIMEOUT`].
fn run_profiler(
    binary: &Path,
    subcommand: &str,
    log_file: &Path,
    report: &Path,
) -> Result<(), StageError> {
    let command = format!("{} {subcommand} {}", binary.display(), log_file.display());
    let subprocess_error = |detail: String| StageError::Subprocess {
        command: command.clone(),
        detail,
    };

    let out = fs::File::create(report)
        .map_err(|err| StageError::io(format!("create {}", report.display()), err))?;
    let mut child = Command::new(binary)
        .arg(subcommand)
        .arg(log_file)
        .stdout(out)
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| subprocess_error(err.to_string()))?;

    let deadline = Instant::now() + PROFILE_TIMEOUT;
    loop {
        match child
            .try_wait()
            .map_err(|err| subprocess_error(err.to_string()))?
        {
            Some(status) if status.success() => return Ok(()),
            Some(status) => return Err(subprocess_error(format!("exited with {status}"))),
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(subprocess_error(format!(
                    "timed out after {}s",
                    PROFILE_TIMEOUT.as_secs()
                )));
            }
            None => thread::sleep(Duration::from_millis(20)),
        }
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
