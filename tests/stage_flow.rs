//! End-to-end lifecycle test: deploy, check, destroy against a fake
//! profiler binary, exercising the stage exactly as a host would.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::json;
use tempfile::TempDir;

use tf_profile_stage::stage::{ProvideBinary, StageOutputs, StageStatus};
use tf_profile_stage::{Config, LifecycleStage, StageError, TfProfileStage};

struct FixedBinary(PathBuf);

impl ProvideBinary for FixedBinary {
    fn binary_path(&self) -> Result<PathBuf, StageError> {
        Ok(self.0.clone())
    }
}

fn fake_profiler(dir: &Path) -> PathBuf {
    let path = dir.join("tf-profile");
    fs::write(&path, "#!/bin/sh\necho \"$1 $2\"\n").expect("write profiler script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod profiler");
    path
}

fn lifecycle_config(root: &Path) -> Config {
    let log_root = root.join("logs");
    fs::create_dir_all(log_root.join("20240101T000000")).expect("create log dir");
    Config {
        reports_dir: root.join("reports"),
        log_root,
        combined_report: true,
        strict: false,
        version: "v0.4.0".to_string(),
    }
}

fn stage_outputs() -> StageOutputs {
    [
        ("01-terraform-state", json!({"backend": "s3"})),
        ("02-infrastructure", json!({"cluster": "main"})),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

#[test]
fn full_lifecycle_produces_reports_and_passes_check() {
    let root = TempDir::new().expect("temp dir");
    let config = lifecycle_config(root.path());
    let reports_dir = config.reports_dir.clone();
    let binary = fake_profiler(root.path());

    // Deploy: records stages, profiles apply logs, yields to the host.
    let mut host_cleanups = 0;
    {
        let mut stage =
            TfProfileStage::with_provider(config.clone(), Box::new(FixedBinary(binary.clone())))
                .expect("construct stage");
        stage
            .deploy(&stage_outputs(), &mut || host_cleanups += 1)
            .expect("deploy");
    }
    assert_eq!(host_cleanups, 1);

    for name in ["01-terraform-state", "02-infrastructure"] {
        for subcommand in ["stats", "table"] {
            let report = reports_dir.join(format!("{name}.{subcommand}"));
            assert!(report.is_file(), "missing {}", report.display());
            assert!(fs::metadata(&report).expect("stat report").len() > 0);
        }
    }

    let combined = fs::read_to_string(reports_dir.join("report.md")).expect("read report.md");
    assert_eq!(combined.matches("<details>").count(), 2);
    assert!(combined.contains("<summary>01-terraform-state</summary>"));
    assert!(combined.contains("<summary>02-infrastructure</summary>"));

    // Check: a fresh instance reads the persisted stage set.
    {
        let mut stage =
            TfProfileStage::with_provider(config.clone(), Box::new(FixedBinary(binary.clone())))
                .expect("construct stage");
        assert!(stage.check(&stage_outputs()).expect("check"));
    }

    // Destroy: again a fresh instance, no stage set passed by the host.
    {
        let mut stage = TfProfileStage::with_provider(config, Box::new(FixedBinary(binary)))
            .expect("construct stage");
        let status: StageStatus = [("01-terraform-state".to_string(), true)].into_iter().collect();
        stage
            .destroy(&StageOutputs::new(), &status, &mut || host_cleanups += 1)
            .expect("destroy");
    }
    assert_eq!(host_cleanups, 2);

    let destroy_report = fs::read_to_string(reports_dir.join("02-infrastructure.stats"))
        .expect("read destroy report");
    assert!(destroy_report.contains("terraform_destroy_02-infrastructure.log"));
}
