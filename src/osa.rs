use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use openstudio_analysis::builder::Builder;
use openstudio_analysis::template::{DefaultTemplate, Template};
use openstudio_analysis::version::{resolve, SchemaVersion};
use openstudio_analysis::{Analysis, AnalysisErrors, SeedModel};
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::osa::io_common::{open_workbook, required_sheet, resolve_path, simplify_file_name};

mod fs_checks;
mod io_common;
mod io_csv;
mod io_xlsx;
mod packager;
mod setup_reader;
mod sheet_reader;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum OsaError {
    #[snafu(display("Error opening Excel file {path}: {source}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}: {source}"))]
    OpeningCsv { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of {path}: {source}"))]
    ReadingCsv {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("The workbook {path} does not have a {sheet} sheet"))]
    MissingSheet { sheet: String, path: String },
    #[snafu(display("The setting '{setting}' is required in the Setup sheet"))]
    MissingRequiredSetting { setting: String },
    #[snafu(display("Could not find a column matching '{column}' in the {sheet} sheet"))]
    MissingColumn { sheet: String, column: String },
    #[snafu(display("Invalid header pattern {pattern}: {source}"))]
    HeaderPattern {
        source: regex::Error,
        pattern: String,
    },
    #[snafu(display(
        "{sheet} sheet, row {row}: expected {expected} in column {column}, found {content}"
    ))]
    InvalidCell {
        sheet: String,
        row: usize,
        column: String,
        content: String,
        expected: String,
    },
    #[snafu(display("Invalid weather file pattern {pattern}: {source}"))]
    WeatherPattern {
        source: glob::PatternError,
        pattern: String,
    },
    #[snafu(display("Error listing weather files for {pattern}: {source}"))]
    WeatherGlob {
        source: glob::GlobError,
        pattern: String,
    },
    #[snafu(display("Could not find {kind} {path}"))]
    FileNotFound { kind: String, path: String },
    #[snafu(display("{reason}"))]
    Validation { reason: String },
    #[snafu(display("{source}"))]
    Model { source: AnalysisErrors },
    #[snafu(display("Could not find the measures {measures} in any of: {searched}"))]
    UnresolvedMeasures { measures: String, searched: String },
    #[snafu(display("Error writing archive {path}: {source}"))]
    Archive {
        source: zip::result::ZipError,
        path: String,
    },
    #[snafu(display("Error accessing {path}: {source}"))]
    Io {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error listing {path}: {source}"))]
    WalkingDirectory {
        source: walkdir::Error,
        path: String,
    },
    #[snafu(display("Error with JSON document {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("The workbook has not been processed yet"))]
    NotProcessed {},
    #[snafu(display("The generated analysis differs from the reference {path}"))]
    ReferenceMismatch { path: String },
}

pub type OsaResult<T> = Result<T, OsaError>;

// Errors of the model: a failed check keeps its reason, the rest is wrapped.
fn model_error(e: AnalysisErrors) -> OsaError {
    match e {
        AnalysisErrors::Validation(reason) => OsaError::Validation { reason },
        source => OsaError::Model { source },
    }
}

/// Reads a workbook and turns it into analysis documents and archives.
pub struct Translator {
    input: PathBuf,
    // Relative paths of the workbook are resolved against this directory.
    root: PathBuf,
    measure_paths: Option<Vec<PathBuf>>,
    export_path: Option<PathBuf>,
    template: Box<dyn Template>,
    analysis: Option<Analysis>,
}

impl Translator {
    pub fn new(input: &Path) -> Translator {
        let root = input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Translator {
            input: input.to_path_buf(),
            root,
            measure_paths: None,
            export_path: None,
            template: Box::new(DefaultTemplate),
            analysis: None,
        }
    }

    /// Replaces the measure directories declared in the workbook.
    pub fn with_measure_paths(mut self, paths: Vec<PathBuf>) -> Translator {
        self.measure_paths = Some(paths);
        self
    }

    /// Replaces the export directory declared in the workbook.
    pub fn with_export_path(mut self, path: PathBuf) -> Translator {
        self.export_path = Some(path);
        self
    }

    /// Reads the workbook. Any previous result is replaced.
    pub fn process(&mut self) -> OsaResult<&Analysis> {
        info!("process: reading {}", self.input.display());
        let mut workbook = open_workbook(&self.input)?;
        let setup = required_sheet(workbook.as_mut(), "Setup", &self.input)?;

        let mut builder = Builder::new(&simplify_file_name(&self.input));
        setup_reader::read_setup(&setup, &self.root, builder.analysis_mut())?;

        let declared = builder
            .analysis()
            .settings
            .spreadsheet_version
            .clone()
            .context(MissingRequiredSettingSnafu {
                setting: "Spreadsheet Version",
            })?;
        let version = declared.parse::<SchemaVersion>().context(ModelSnafu {})?;
        let mapping = resolve(&version).context(ModelSnafu {})?;
        info!(
            "process: spreadsheet version {} (layout {})",
            version, mapping.threshold
        );

        if let Some(name) = builder.analysis().run_setup.analysis_name.clone() {
            builder.display_name(&name);
        }
        let measure_paths = match &self.measure_paths {
            Some(paths) => paths.clone(),
            None => {
                let declared = &builder.analysis().run_setup.measure_directories;
                if declared.is_empty() {
                    vec![self.root.join("measures")]
                } else {
                    declared
                        .iter()
                        .map(|d| resolve_path(&self.root, d))
                        .collect()
                }
            }
        };
        let export_path = match &self.export_path {
            Some(p) => p.clone(),
            None => match &builder.analysis().run_setup.export_directory {
                Some(d) => resolve_path(&self.root, d),
                None => self.root.join("export"),
            },
        };
        {
            let a = builder.analysis_mut();
            a.measure_paths = measure_paths;
            a.export_path = export_path;
        }

        let variables = required_sheet(workbook.as_mut(), "Variables", &self.input)?;
        for row in sheet_reader::read_variables(&variables, &mapping)? {
            builder.add_variable_row(&row).map_err(model_error)?;
        }
        let outputs = required_sheet(workbook.as_mut(), "Outputs", &self.input)?;
        for row in sheet_reader::read_outputs(&outputs, &mapping)? {
            builder.add_output_row(&row).map_err(model_error)?;
        }

        let analysis = builder.build();
        info!(
            "process: {} measures ({} enabled), {} outputs, {} seed models",
            analysis.measures.len(),
            analysis.enabled_measures().count(),
            analysis.outputs.len(),
            analysis.models.len()
        );
        Ok(self.analysis.insert(analysis))
    }

    pub fn analysis(&self) -> OsaResult<&Analysis> {
        self.analysis.as_ref().context(NotProcessedSnafu {})
    }

    fn analysis_mut(&mut self) -> OsaResult<&mut Analysis> {
        self.analysis.as_mut().context(NotProcessedSnafu {})
    }

    /// Adds a seed model. A relative path is resolved against the workbook directory.
    pub fn add_model(&mut self, display_name: &str, path: &Path) -> OsaResult<()> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            resolve_path(&self.root, &path.to_string_lossy())
        };
        let name = match openstudio_analysis::names::machine_name(display_name) {
            n if n.is_empty() => simplify_file_name(&path),
            n => n,
        };
        self.analysis_mut()?.models.push(SeedModel {
            name,
            display_name: display_name.to_string(),
            model_type: "model".to_string(),
            path,
        });
        Ok(())
    }

    pub fn delete_models(&mut self) -> OsaResult<()> {
        self.analysis_mut()?.models.clear();
        Ok(())
    }

    /// Checks the files, then the measures and variables. Creates the export directory.
    pub fn validate_analysis(&self) -> OsaResult<()> {
        let analysis = self.analysis()?;
        fs_checks::check_files(analysis)?;
        openstudio_analysis::checks(analysis).map_err(model_error)?;
        info!("validate_analysis: {} is valid", analysis.name);
        Ok(())
    }

    /// The analysis document of every seed model, by model name.
    pub fn generate_documents(&self) -> OsaResult<Vec<(String, JSValue)>> {
        let analysis = self.analysis()?;
        openstudio_analysis::generate_documents(analysis, self.template.as_ref())
            .map_err(model_error)
    }

    /// Validates the analysis and writes `<model>.json` and `<model>.zip` for every seed
    /// model in the export directory. Returns the written files.
    ///
    /// Nothing is written unless every document could be generated and every measure
    /// found.
    pub fn save_analysis(&self) -> OsaResult<Vec<PathBuf>> {
        self.validate_analysis()?;
        let analysis = self.analysis()?;
        let documents = self.generate_documents()?;
        let measures = packager::resolve_measures(analysis)?;
        let mut archives = Vec::new();
        for model in analysis.models.iter() {
            archives.push(packager::archive_entries(analysis, model, &measures)?);
        }

        write_outputs(&analysis.export_path, &documents, &archives)
    }

    /// Compares the document of the first seed model with a reference document.
    pub fn compare_reference(&self, reference: &Path) -> OsaResult<()> {
        let reference_s = reference.display().to_string();
        let documents = self.generate_documents()?;
        let (name, doc) = documents.first().context(ValidationSnafu {
            reason: "No seed model to compare with the reference".to_string(),
        })?;
        let contents = fs::read_to_string(reference).context(IoSnafu {
            path: reference_s.clone(),
        })?;
        let expected: JSValue = serde_json::from_str(&contents).context(ParsingJsonSnafu {
            path: reference_s.clone(),
        })?;
        let pretty_expected = serde_json::to_string_pretty(&expected).context(ParsingJsonSnafu {
            path: reference_s.clone(),
        })?;
        let pretty_doc = serde_json::to_string_pretty(doc).context(ParsingJsonSnafu {
            path: name.clone(),
        })?;
        if pretty_expected != pretty_doc {
            warn!("Found differences with the reference document");
            print_diff(pretty_expected.as_str(), pretty_doc.as_str(), "\n");
            return ReferenceMismatchSnafu { path: reference_s }.fail();
        }
        debug!("compare_reference: {} matches {}", name, reference_s);
        Ok(())
    }
}

/// Writes `<model>.zip` then `<model>.json` for every document, in order.
///
/// On failure, every file created so far is removed.
fn write_outputs(
    export_path: &Path,
    documents: &[(String, JSValue)],
    archives: &[Vec<(String, packager::EntrySource)>],
) -> OsaResult<Vec<PathBuf>> {
    let mut written: Vec<PathBuf> = Vec::new();
    let write_all = |written: &mut Vec<PathBuf>| -> OsaResult<()> {
        for ((name, doc), entries) in documents.iter().zip(archives.iter()) {
            let zip_path = export_path.join(format!("{}.zip", name));
            written.push(zip_path.clone());
            packager::write_archive(&zip_path, entries)?;

            let json_path = export_path.join(format!("{}.json", name));
            let text = serde_json::to_string_pretty(doc).context(ParsingJsonSnafu {
                path: json_path.display().to_string(),
            })?;
            written.push(json_path.clone());
            fs::write(&json_path, text).context(IoSnafu {
                path: json_path.display().to_string(),
            })?;
        }
        Ok(())
    };
    if let Err(e) = write_all(&mut written) {
        warn!("write_outputs: removing {} partial outputs", written.len());
        for p in written.iter() {
            packager::discard_output(p);
        }
        return Err(e);
    }
    Ok(written)
}

/// Runs the program with the command line arguments.
pub fn run(args: &Args) -> OsaResult<()> {
    let mut translator = Translator::new(Path::new(&args.input));
    if let Some(paths) = &args.measure_paths {
        translator = translator.with_measure_paths(paths.iter().map(PathBuf::from).collect());
    }
    if let Some(path) = &args.export_path {
        translator = translator.with_export_path(PathBuf::from(path));
    }
    translator.process()?;
    if let Some(seeds) = &args.seed_models {
        translator.delete_models()?;
        for s in seeds.iter() {
            let path = Path::new(s);
            translator.add_model(&simplify_file_name(path), path)?;
        }
    }

    if let Some(reference) = &args.reference {
        translator.validate_analysis()?;
        translator.compare_reference(Path::new(reference))?;
    }
    if args.check {
        translator.validate_analysis()?;
        println!("{} is valid", args.input);
        return Ok(());
    }
    for p in translator.save_analysis()? {
        println!("{}", p.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const SETUP: &str = "\
OpenStudio Analysis Spreadsheet,,
Settings,,
Spreadsheet Version,0.1.9,
User Id,tester,
Running Setup,,
Analysis Name,Small Window Study,
Measure Directory,./measures,
Export Directory,./export,
Problem Definition,,
Analysis Type,lhs,
Algorithm Setup,,
Number of Samples,5,
Seed,1973,
Weather Files,,
Weather File,./weather/partial_weather*.epw,
Models,,
Model,Small Seed,./seeds/small_seed.osm
";

    const VARIABLES: &str = "\
Enabled,Type,Parameter Display Name,Parameter Name in Measure,Variable Type,Units,Static/Default Value,Enumerations,Distribution,Min,Max,Mean,Std Dev
TRUE,Set Window To Wall Ratio,SetWindowToWallRatioByFacade,RubyMeasure,,,,,,,,,
,argument,Facade,facade,Choice,,South,North|South|East|West,,,,,
,argument,Sill Height,sill_height,Double,in,30,,,,,,
,variable,Window To Wall Ratio,wwr,Double,,0.4,,Triangle,0.1,0.6,0.4,
FALSE,Disabled Measure,SomethingElse,RubyMeasure,,,,,,,,,
";

    const OUTPUTS: &str = "\
Variable Display Name,Name,Units,Objective Function,Objective Function Group
Total Site Energy,standard_report_legacy.total_energy,GJ,TRUE,
Total Electricity,standard_report_legacy.total_electricity,GJ,FALSE,
";

    // A project with a CSV workbook in <root>/small_window_study.
    fn project(variables: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let wb = root.join("small_window_study");
        write(&wb.join("Setup.csv"), SETUP);
        write(&wb.join("Variables.csv"), variables);
        write(&wb.join("Outputs.csv"), OUTPUTS);
        write(&root.join("seeds/small_seed.osm"), "OS:Version");
        write(&root.join("weather/partial_weather.epw"), "LOCATION");
        write(&root.join("weather/partial_weather.stat"), "");
        let m = root.join("measures/set_window_to_wall_ratio_by_facade");
        write(&m.join("measure.rb"), "class SetWindowToWallRatioByFacade; end");
        write(&m.join("resources/helpers.rb"), "");
        write(&m.join("tests/measure_test.rb"), "");
        (dir, wb)
    }

    #[test]
    fn end_to_end() {
        init();
        let (dir, wb) = project(VARIABLES);
        let mut t = Translator::new(&wb);
        let a = t.process().unwrap();
        assert_eq!(a.name, "small_window_study");
        assert_eq!(a.measures.len(), 2);
        assert_eq!(a.weather_files.len(), 1);
        let written = t.save_analysis().unwrap();
        let export = dir.path().join("export");
        assert_eq!(
            written,
            vec![export.join("small_seed.zip"), export.join("small_seed.json")]
        );

        let doc: JSValue =
            serde_json::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        let analysis = &doc["analysis"];
        assert_eq!(analysis["display_name"], "Small Window Study");
        assert_eq!(analysis["seed"]["path"], "./seed/small_seed.osm");
        assert_eq!(analysis["weather_file"]["path"], "./weather/partial_weather.epw");
        assert_eq!(analysis["problem"]["analysis_type"], "lhs");
        assert_eq!(analysis["problem"]["algorithm"]["seed"], 1973);
        let workflow = analysis["problem"]["workflow"].as_array().unwrap();
        assert_eq!(workflow.len(), 1);
        assert_eq!(workflow[0]["arguments"][1]["value"].as_f64(), Some(30.0));
        assert_eq!(
            workflow[0]["variables"][0]["uncertainty_description"]["type"],
            "triangle_uncertain"
        );

        let mut archive =
            zip::ZipArchive::new(fs::File::open(&written[0]).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(|s| s.to_string()).collect();
        assert!(names.contains(&"seed/small_seed.osm".to_string()));
        assert!(names.contains(&"weather/partial_weather.epw".to_string()));
        assert!(names.contains(
            &"measures/set_window_to_wall_ratio_by_facade/resources/helpers.rb".to_string()
        ));
        assert!(!names.iter().any(|n| n.contains("/tests/")));
        assert!(!names.contains(
            &"measures/set_window_to_wall_ratio_by_facade/measure.rb".to_string()
        ));
        let mut seed = String::new();
        archive
            .by_name("seed/small_seed.osm")
            .unwrap()
            .read_to_string(&mut seed)
            .unwrap();
        assert_eq!(seed, "OS:Version");
    }

    #[test]
    fn generation_is_repeatable() {
        let (_dir, wb) = project(VARIABLES);
        let mut t = Translator::new(&wb);
        t.process().unwrap();
        assert_eq!(t.generate_documents().unwrap(), t.generate_documents().unwrap());
    }

    #[test]
    fn reference_comparison() {
        let (dir, wb) = project(VARIABLES);
        let mut t = Translator::new(&wb);
        t.process().unwrap();
        let (_, doc) = t.generate_documents().unwrap().remove(0);
        let reference = dir.path().join("reference.json");
        fs::write(&reference, serde_json::to_string(&doc).unwrap()).unwrap();
        t.compare_reference(&reference).unwrap();

        fs::write(&reference, "{\"analysis\": {}}").unwrap();
        assert!(matches!(
            t.compare_reference(&reference),
            Err(OsaError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn missing_mean() {
        let variables = VARIABLES.replace("Triangle,0.1,0.6,0.4,", "Triangle,0.1,0.6,,");
        let (dir, wb) = project(&variables);
        let mut t = Translator::new(&wb);
        t.process().unwrap();
        let err = t.save_analysis().unwrap_err();
        assert!(err.to_string().contains("must have a mean"), "{}", err);
        // The export directory is created, but nothing is written in it.
        let export = dir.path().join("export");
        assert_eq!(fs::read_dir(&export).unwrap().count(), 0);
    }

    #[test]
    fn missing_measure_writes_nothing() {
        let (dir, wb) = project(VARIABLES);
        fs::remove_file(
            dir.path()
                .join("measures/set_window_to_wall_ratio_by_facade/measure.rb"),
        )
        .unwrap();
        let mut t = Translator::new(&wb);
        t.process().unwrap();
        let err = t.save_analysis().unwrap_err();
        assert!(
            matches!(err, OsaError::UnresolvedMeasures { .. }),
            "{:?}",
            err
        );
        assert_eq!(fs::read_dir(dir.path().join("export")).unwrap().count(), 0);
    }

    #[test]
    fn script_directory_writes_nothing() {
        let (dir, wb) = project(VARIABLES);
        fs::create_dir(dir.path().join("scripts_dir")).unwrap();
        write(
            &wb.join("Setup.csv"),
            &format!("{}Worker Initialization Scripts,,\nInit,./scripts_dir,-v\n", SETUP),
        );
        let mut t = Translator::new(&wb);
        t.process().unwrap();
        let err = t.save_analysis().unwrap_err();
        assert!(err.to_string().contains("scripts_dir"), "{}", err);
        assert_eq!(fs::read_dir(dir.path().join("export")).unwrap().count(), 0);
    }

    #[test]
    fn failed_archive_removes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, "x").unwrap();
        let documents = vec![
            ("first".to_string(), serde_json::json!({"analysis": {}})),
            ("second".to_string(), serde_json::json!({"analysis": {}})),
        ];
        let archives = vec![
            vec![("a.txt".to_string(), packager::EntrySource::File(good))],
            vec![(
                "b.txt".to_string(),
                packager::EntrySource::File(dir.path().to_path_buf()),
            )],
        ];
        let err = write_outputs(dir.path(), &documents, &archives).unwrap_err();
        assert!(
            matches!(&err, OsaError::Io { path, .. } if *path == dir.path().display().to_string()),
            "{:?}",
            err
        );
        for f in ["first.zip", "first.json", "second.zip", "second.json"] {
            assert!(!dir.path().join(f).exists(), "{} was left behind", f);
        }
    }

    #[test]
    fn missing_sheet() {
        let (_dir, wb) = project(VARIABLES);
        fs::remove_file(wb.join("Outputs.csv")).unwrap();
        let mut t = Translator::new(&wb);
        match t.process() {
            Err(OsaError::MissingSheet { sheet, .. }) => assert_eq!(sheet, "Outputs"),
            other => panic!("unexpected result {:?}", other.map(|a| a.name.clone())),
        }
    }

    #[test]
    fn unsupported_version() {
        let (_dir, wb) = project(VARIABLES);
        write(
            &wb.join("Setup.csv"),
            &SETUP.replace("Spreadsheet Version,0.1.9", "Spreadsheet Version,0.1.8"),
        );
        let mut t = Translator::new(&wb);
        let err = t.process().map(|_| ()).unwrap_err();
        assert!(
            matches!(
                err,
                OsaError::Model {
                    source: AnalysisErrors::UnsupportedVersion { .. }
                }
            ),
            "{:?}",
            err
        );
    }

    #[test]
    fn missing_version() {
        let (_dir, wb) = project(VARIABLES);
        write(
            &wb.join("Setup.csv"),
            &SETUP.replace("Spreadsheet Version,0.1.9,\n", ""),
        );
        let mut t = Translator::new(&wb);
        let err = t.process().map(|_| ()).unwrap_err();
        assert!(matches!(err, OsaError::MissingRequiredSetting { .. }), "{:?}", err);
    }

    #[test]
    fn overrides_and_models() {
        let (dir, wb) = project(VARIABLES);
        let mut t = Translator::new(&wb).with_export_path(dir.path().join("elsewhere"));
        assert!(matches!(t.delete_models(), Err(OsaError::NotProcessed {})));
        t.process().unwrap();
        t.delete_models().unwrap();
        assert!(matches!(
            t.validate_analysis(),
            Err(OsaError::Validation { .. })
        ));
        t.add_model("Second Seed", Path::new("seeds/small_seed.osm"))
            .unwrap();
        t.add_model("Third", Path::new("seeds/small_seed.osm"))
            .unwrap();
        let written = t.save_analysis().unwrap();
        assert_eq!(written.len(), 4);
        assert!(dir.path().join("elsewhere/second_seed.zip").is_file());
        let docs = t.generate_documents().unwrap();
        assert_eq!(docs[1].1["analysis"]["name"], "small_window_study_third");
    }
}
