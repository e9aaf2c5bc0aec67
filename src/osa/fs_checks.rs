// Checks of the files referenced by an analysis.

use std::fs;
use std::path::Path;

use openstudio_analysis::Analysis;

use crate::osa::*;

fn ensure_exists(kind: &str, path: &Path) -> OsaResult<()> {
    ensure!(
        path.exists(),
        FileNotFoundSnafu {
            kind: kind.to_string(),
            path: path.display().to_string(),
        }
    );
    Ok(())
}

fn ensure_file(kind: &str, path: &Path) -> OsaResult<()> {
    ensure!(
        path.is_file(),
        FileNotFoundSnafu {
            kind: kind.to_string(),
            path: path.display().to_string(),
        }
    );
    Ok(())
}

/// Checks that every referenced file is present, then creates the export directory.
///
/// The first missing file is reported.
pub fn check_files(analysis: &Analysis) -> OsaResult<()> {
    for p in analysis.measure_paths.iter() {
        ensure!(
            p.is_dir(),
            FileNotFoundSnafu {
                kind: "measure directory".to_string(),
                path: p.display().to_string(),
            }
        );
    }

    ensure!(
        !analysis.models.is_empty(),
        ValidationSnafu {
            reason: "No seed model was declared in the Models section".to_string(),
        }
    );
    for m in analysis.models.iter() {
        ensure_file("seed model", &m.path)?;
    }

    ensure!(
        !analysis.weather_files.is_empty(),
        ValidationSnafu {
            reason: "No weather file was found in the Weather Files section".to_string(),
        }
    );
    for w in analysis.weather_files.iter() {
        ensure_file("weather file", w)?;
    }

    for f in analysis.other_files.iter() {
        ensure_exists("library file", &f.path)?;
    }
    for s in analysis.worker_inits.iter() {
        ensure_file("worker initialization script", &s.path)?;
    }
    for s in analysis.worker_finalizes.iter() {
        ensure_file("worker finalization script", &s.path)?;
    }

    if !analysis.export_path.is_dir() {
        info!(
            "check_files: creating export directory {}",
            analysis.export_path.display()
        );
        fs::create_dir_all(&analysis.export_path).context(IoSnafu {
            path: analysis.export_path.display().to_string(),
        })?;
    }
    Ok(())
}
