//! Combined Markdown report assembly.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StageError;

/// Filename of the combined document inside the reports directory.
pub const COMBINED_REPORT_NAME: &str = "report.md";

/// Per-stage report files in subcommand order, recorded while profiling.
#[derive(Debug, Clone)]
pub struct StageReports {
    pub stage: String,
    pub files: Vec<PathBuf>,
}

/// Write `report.md`: one collapsible section per stage, wrapping the
/// verbatim contents of that stage's report files in subcommand order.
/// Missing report files (a stage whose profiling failed early) are skipped.
pub fn write_combined_report(
    reports_dir: &Path,
    sections: &[StageReports],
) -> Result<PathBuf, StageError> {
    let mut doc = String::new();
    for section in sections {
        doc.push_str(&format!(
            "<details><summary>{}</summary>\n\n",
            section.stage
        ));
        for file in &section.files {
            let Ok(contents) = fs::read_to_string(file) else {
                continue;
            };
            doc.push_str("```\n");
            doc.push_str(&contents);
            if !contents.ends_with('\n') {
                doc.push('\n');
            }
            doc.push_str("```\n\n");
        }
        doc.push_str("</details>\n\n");
    }

    let output = reports_dir.join(COMBINED_REPORT_NAME);
    fs::write(&output, doc)
        .map_err(|err| StageError::io(format!("write {}", output.display()), err))?;
    Ok(output)
}
