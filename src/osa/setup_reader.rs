// The Setup sheet: settings, files and models, split in sections by banner rows.

use std::path::{Path, PathBuf};

use openstudio_analysis::names::{machine_name, snake_case};
use openstudio_analysis::{Analysis, LibraryFile, SeedModel, WorkerScript};

use crate::osa::io_common::{cell, resolve_path, simplify_file_name, Row};
use crate::osa::*;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SetupSection {
    /// Before the first banner.
    Preamble,
    Settings,
    RunningSetup,
    ProblemDefinition,
    AlgorithmSetup,
    WeatherFiles,
    Models,
    OtherLibraryFiles,
    WorkerInitialization,
    WorkerFinalization,
}

const BANNERS: [(&str, SetupSection); 9] = [
    ("Settings", SetupSection::Settings),
    ("Running Setup", SetupSection::RunningSetup),
    ("Problem Definition", SetupSection::ProblemDefinition),
    ("Algorithm Setup", SetupSection::AlgorithmSetup),
    ("Weather Files", SetupSection::WeatherFiles),
    ("Models", SetupSection::Models),
    ("Other Library Files", SetupSection::OtherLibraryFiles),
    ("Worker Initialization Scripts", SetupSection::WorkerInitialization),
    ("Worker Finalization Scripts", SetupSection::WorkerFinalization),
];

fn banner(text: &str) -> Option<SetupSection> {
    BANNERS
        .iter()
        .find(|(b, _)| *b == text)
        .map(|(_, section)| *section)
}

/// Reads the Setup sheet into the analysis. Relative paths are resolved against `root`.
pub fn read_setup(rows: &[Row], root: &Path, analysis: &mut Analysis) -> OsaResult<()> {
    let mut section = SetupSection::Preamble;
    for (idx, row) in rows.iter().enumerate() {
        let first = match cell(row, 0).as_text() {
            Some(s) => s,
            None => continue,
        };
        if let Some(next) = banner(&first) {
            debug!("read_setup: row {}: section {:?}", idx + 1, next);
            section = next;
            continue;
        }
        match section {
            SetupSection::Preamble => {}
            SetupSection::Settings
            | SetupSection::RunningSetup
            | SetupSection::ProblemDefinition
            | SetupSection::AlgorithmSetup => {
                let key = snake_case(&first);
                if key.is_empty() {
                    continue;
                }
                let value = cell(row, 1).to_json();
                debug!("read_setup: {:?} {} = {}", section, key, value);
                let res = match section {
                    SetupSection::Settings => analysis.settings.set(&key, value),
                    SetupSection::RunningSetup => analysis.run_setup.set(&key, value),
                    SetupSection::ProblemDefinition => analysis.problem.set(&key, value),
                    _ => analysis.algorithm.set(&key, value),
                };
                res.context(ModelSnafu {})?;
            }
            SetupSection::WeatherFiles => {
                if let Some(pattern) = cell(row, 1).as_text() {
                    let mut files = expand_weather(root, &pattern)?;
                    analysis.weather_files.append(&mut files);
                }
            }
            SetupSection::Models => {
                if !first.eq_ignore_ascii_case("model") {
                    continue;
                }
                if let Some(path) = cell(row, 2).as_text() {
                    let path = resolve_path(root, &path);
                    let stem = simplify_file_name(&path);
                    let display_name = cell(row, 1).as_text().unwrap_or_else(|| stem.clone());
                    let name = match machine_name(&display_name) {
                        n if n.is_empty() => stem,
                        n => n,
                    };
                    analysis.models.push(SeedModel {
                        name,
                        display_name,
                        model_type: "model".to_string(),
                        path,
                    });
                }
            }
            SetupSection::OtherLibraryFiles => {
                if let Some(path) = cell(row, 2).as_text() {
                    let path = resolve_path(root, &path);
                    let lib_name = cell(row, 1)
                        .as_text()
                        .unwrap_or_else(|| simplify_file_name(&path));
                    analysis.other_files.push(LibraryFile { lib_name, path });
                } else {
                    warn!("read_setup: row {}: library file without a path", idx + 1);
                }
            }
            SetupSection::WorkerInitialization | SetupSection::WorkerFinalization => {
                if let Some(path) = cell(row, 1).as_text() {
                    let script = WorkerScript {
                        name: first,
                        path: resolve_path(root, &path),
                        args: cell(row, 2).as_text(),
                    };
                    if section == SetupSection::WorkerInitialization {
                        analysis.worker_inits.push(script);
                    } else {
                        analysis.worker_finalizes.push(script);
                    }
                }
            }
        }
    }
    Ok(())
}

fn expand_weather(root: &Path, pattern: &str) -> OsaResult<Vec<PathBuf>> {
    let full = resolve_path(root, pattern);
    let full_s = full.display().to_string();
    if !pattern.contains(|c| c == '*' || c == '?' || c == '[') {
        // Checked for existence during validation.
        return Ok(vec![full]);
    }
    let mut res: Vec<PathBuf> = Vec::new();
    for entry in glob::glob(&full_s).context(WeatherPatternSnafu {
        pattern: full_s.clone(),
    })? {
        res.push(entry.context(WeatherGlobSnafu {
            pattern: full_s.clone(),
        })?);
    }
    res.sort();
    if res.is_empty() {
        warn!("expand_weather: no weather file matches {}", full_s);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osa::io_common::Cell;
    use std::fs;

    fn row(cells: &[&str]) -> Row {
        cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            })
            .collect()
    }

    #[test]
    fn sections() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("weather")).unwrap();
        fs::write(dir.path().join("weather/b.epw"), "").unwrap();
        fs::write(dir.path().join("weather/a.epw"), "").unwrap();
        let rows = vec![
            row(&["Some title"]),
            row(&["Ignored", "before any banner"]),
            row(&["Settings"]),
            row(&["Spreadsheet Version", "0.3.3"]),
            row(&["Worker Nodes", "2"]),
            row(&[""]),
            row(&["Running Setup"]),
            row(&["Analysis Name", "Office Study"]),
            row(&["Measure Directory", "measures"]),
            row(&["Measure Directory", "./more_measures"]),
            row(&["Algorithm Setup"]),
            row(&["Number of Samples", "30"]),
            row(&["Custom Knob", "2.0"]),
            row(&["Weather Files"]),
            row(&["Weather File", "weather/*.epw"]),
            row(&["Models"]),
            row(&["Model", "Small Office", "./seeds/small_seed.osm"]),
            row(&["Comment", "not a model", "x.osm"]),
            row(&["Other Library Files"]),
            row(&["Schedules", "schedules", "lib/schedules.csv"]),
            row(&["Worker Initialization Scripts"]),
            row(&["Init", "scripts/init.rb", "-v 2"]),
            row(&["Worker Finalization Scripts"]),
            row(&["Finalize", "scripts/final.rb"]),
        ];
        let mut a = Analysis::default();
        read_setup(&rows, dir.path(), &mut a).unwrap();
        assert_eq!(a.settings.spreadsheet_version.as_deref(), Some("0.3.3"));
        assert_eq!(a.settings.worker_nodes, Some(2));
        assert_eq!(a.run_setup.analysis_name.as_deref(), Some("Office Study"));
        assert_eq!(a.run_setup.measure_directories, vec!["measures", "./more_measures"]);
        assert_eq!(a.algorithm.number_of_samples, Some(30));
        assert_eq!(a.algorithm.extra.get("custom_knob"), Some(&JSValue::from(2)));
        assert_eq!(
            a.weather_files,
            vec![dir.path().join("weather/a.epw"), dir.path().join("weather/b.epw")]
        );
        assert_eq!(a.models.len(), 1);
        assert_eq!(a.models[0].name, "small_office");
        assert_eq!(a.models[0].path, dir.path().join("seeds/small_seed.osm"));
        assert_eq!(a.other_files[0].lib_name, "schedules");
        assert_eq!(a.worker_inits[0].args.as_deref(), Some("-v 2"));
        assert_eq!(a.worker_finalizes[0].args, None);
        assert!(a.settings.extra.is_empty());
    }

    #[test]
    fn removed_setting() {
        let rows = vec![row(&["Running Setup"]), row(&["Allow Multiple Jobs", "true"])];
        let err = read_setup(&rows, Path::new("."), &mut Analysis::default()).unwrap_err();
        assert!(err.to_string().contains("allow_multiple_jobs"), "{}", err);
    }

    #[test]
    fn failed_value_setting() {
        let rows = vec![
            row(&["Algorithm Setup"]),
            row(&["Failed f(x) value", "1000000"]),
        ];
        let mut a = Analysis::default();
        read_setup(&rows, Path::new("."), &mut a).unwrap();
        assert_eq!(a.algorithm.failed_f_value, Some(serde_json::json!(1000000)));
        assert!(a.algorithm.extra.is_empty());
    }

    #[test]
    fn weather_without_match() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![row(&["Weather Files"]), row(&["Weather File", "*.epw"])];
        let mut a = Analysis::default();
        read_setup(&rows, dir.path(), &mut a).unwrap();
        assert!(a.weather_files.is_empty());
    }
}
