// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

/// One data row of the Variables sheet, keyed by logical field.
///
/// The sheet reuses the same columns for two kinds of rows: a measure-start row (the
/// `enabled` cell is filled) and a continuation row describing one argument or variable
/// of the most recent measure. The field names reflect both uses.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct VariableRow {
    /// 1-based row number in the sheet, for messages.
    pub row_number: usize,
    pub enabled: Option<String>,
    /// Measure display name, or the variable kind (`argument`, `variable`, `pivot`).
    pub name_or_kind: Option<String>,
    /// Measure class name, or the variable display name.
    pub class_or_display_name: Option<String>,
    pub measure_directory: Option<String>,
    /// Measure type, or the name of the argument inside the measure.
    pub type_or_argument_name: Option<String>,
    pub display_name_short: Option<String>,
    pub declared_type: Option<String>,
    pub units: Option<String>,
    pub static_value: Option<String>,
    pub enumerations: Option<String>,
    pub distribution: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub delta_x: Option<f64>,
    pub discrete_values: Option<String>,
    pub discrete_weights: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub relation_to_output: Option<String>,
}

/// One data row of the Outputs sheet.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct OutputRow {
    pub display_name: Option<String>,
    pub display_name_short: Option<String>,
    pub metadata_id: Option<String>,
    pub name: Option<String>,
    pub units: Option<String>,
    pub visualize: Option<bool>,
    pub export: Option<bool>,
    pub variable_type: Option<String>,
    pub objective_function: bool,
    pub objective_function_target: Option<f64>,
    pub scaling_factor: Option<f64>,
    pub objective_function_group: Option<u32>,
}

// ******** Experiment model *********

/// The declared type of an argument or variable.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ValueType {
    Double,
    Integer,
    Bool,
    String,
    /// `choice` and the older `enum` spelling.
    Choice,
}

impl ValueType {
    pub fn parse(declared: &str) -> Option<ValueType> {
        match declared.trim().to_lowercase().as_str() {
            "double" => Some(ValueType::Double),
            "integer" => Some(ValueType::Integer),
            "bool" | "boolean" => Some(ValueType::Bool),
            "string" => Some(ValueType::String),
            "choice" | "enum" => Some(ValueType::Choice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Double => "double",
            ValueType::Integer => "integer",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Choice => "choice",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Double | ValueType::Integer)
    }
}

/// How a measure parameter takes part in the analysis.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum VariableKind {
    /// Held at its static value.
    Argument,
    /// Sampled by the algorithm.
    Variable,
    /// Enumerated into parallel branches of the analysis.
    Pivot,
}

impl VariableKind {
    pub fn parse(kind: &str) -> Option<VariableKind> {
        match kind.trim().to_lowercase().as_str() {
            "argument" => Some(VariableKind::Argument),
            "variable" => Some(VariableKind::Variable),
            "pivot" => Some(VariableKind::Pivot),
            _ => None,
        }
    }
}

/// The raw distribution cells of a variable, copied from its row.
///
/// The static value is kept as text: it is only coerced to the declared type when the
/// analysis document is generated.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub static_value: Option<String>,
    /// uniform, triangle, normal, lognormal or discrete. Blank means uniform.
    pub kind: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub delta_x: Option<f64>,
    pub enumerations: Vec<String>,
    pub discrete_values: Option<String>,
    pub discrete_weights: Option<String>,
    pub source: Option<String>,
}

/// The shape of a distribution, as used by the generator.
#[derive(PartialEq, Debug, Clone)]
pub enum DistributionShape {
    Continuous {
        kind: String,
        min: Option<f64>,
        max: Option<f64>,
        mean: Option<f64>,
        stddev: Option<f64>,
        delta_x: Option<f64>,
    },
    DiscreteEnumerated {
        enumerations: Vec<String>,
    },
    DiscreteUncertain {
        values: Vec<String>,
        weights: Option<Vec<String>>,
    },
}

impl Distribution {
    pub fn is_discrete(&self) -> bool {
        self.kind
            .as_deref()
            .map(|k| k.trim().to_lowercase().starts_with("discrete"))
            .unwrap_or(false)
    }

    /// Classifies the distribution for a value of the given declared type.
    ///
    /// Choice and bool values are always discrete. The listed discrete values win over the
    /// enumerations when both are present.
    pub fn shape(&self, value_type: ValueType) -> DistributionShape {
        let values = self.discrete_values.as_deref().map(split_list);
        if self.is_discrete() {
            DistributionShape::DiscreteUncertain {
                values: values.unwrap_or_else(|| self.enumerations.clone()),
                weights: self.discrete_weights.as_deref().map(split_list),
            }
        } else if matches!(value_type, ValueType::Choice | ValueType::Bool) {
            DistributionShape::DiscreteEnumerated {
                enumerations: values.unwrap_or_else(|| self.enumerations.clone()),
            }
        } else {
            DistributionShape::Continuous {
                kind: self
                    .kind
                    .as_deref()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .unwrap_or_else(|| "uniform".to_string()),
                min: self.min,
                max: self.max,
                mean: self.mean,
                stddev: self.stddev,
                delta_x: self.delta_x,
            }
        }
    }
}

/// Splits a comma-separated list cell, dropping blank entries.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// An argument or variable of a measure.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Raw kind text: argument, variable or pivot.
    pub kind: String,
    pub name: String,
    pub display_name: String,
    pub display_name_short: String,
    /// Lower-cased declared type: double, integer, bool, string, choice or enum.
    pub declared_type: String,
    pub units: Option<String>,
    /// Position in the measure, starting at 0.
    pub index: usize,
    pub distribution: Distribution,
    pub notes: Option<String>,
    pub relation_to_output: Option<String>,
}

impl Variable {
    pub fn variable_kind(&self) -> Option<VariableKind> {
        VariableKind::parse(&self.kind)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        ValueType::parse(&self.declared_type)
    }

    pub fn is_argument(&self) -> bool {
        self.variable_kind() == Some(VariableKind::Argument)
    }

    /// The static value, if the cell was not blank.
    pub fn static_value(&self) -> Option<&str> {
        self.distribution
            .static_value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// Machine name, derived from the display name.
    pub name: String,
    pub display_name: String,
    pub enabled: bool,
    pub measure_type: Option<String>,
    /// Class name of the measure.
    pub measure_file_name: String,
    /// Name of the measure directory, looked up under each measure path.
    pub directory: String,
    pub row_number: usize,
    pub variables: Vec<Variable>,
}

impl Measure {
    pub fn arguments(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| v.is_argument())
    }

    pub fn perturbed(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().filter(|v| !v.is_argument())
    }
}

/// One requested output of the analysis. Serialized as-is into the document.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub display_name: String,
    pub display_name_short: String,
    pub metadata_id: Option<String>,
    pub name: String,
    pub units: Option<String>,
    pub visualize: bool,
    pub export: bool,
    pub variable_type: Option<String>,
    pub objective_function: bool,
    pub objective_function_index: Option<usize>,
    pub objective_function_target: Option<f64>,
    pub scaling_factor: Option<f64>,
    pub objective_function_group: Option<u32>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SeedModel {
    /// Machine name. Also the stem of the generated files.
    pub name: String,
    pub display_name: String,
    pub model_type: String,
    pub path: PathBuf,
}

/// A file or directory shipped under `lib/<lib_name>/` in the archive.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct LibraryFile {
    pub lib_name: String,
    pub path: PathBuf,
}

/// A worker initialization or finalization script and its argument string.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct WorkerScript {
    pub name: String,
    pub path: PathBuf,
    pub args: Option<String>,
}

// ********* Settings **********

// Values in the setting bags come from spreadsheet cells, converted to json values.

fn text_value(value: &JSValue) -> Option<String> {
    match value {
        JSValue::Null => None,
        JSValue::String(s) if s.trim().is_empty() => None,
        JSValue::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

fn int_value(key: &str, value: &JSValue) -> Result<Option<i64>, AnalysisErrors> {
    let invalid = || AnalysisErrors::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    };
    match value {
        JSValue::Null => Ok(None),
        JSValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Some(i)),
            (None, Some(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
            _ => Err(invalid()),
        },
        JSValue::String(s) if s.trim().is_empty() => Ok(None),
        JSValue::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn bool_value(key: &str, value: &JSValue) -> Result<Option<bool>, AnalysisErrors> {
    match value {
        JSValue::Null => Ok(None),
        JSValue::Bool(b) => Ok(Some(*b)),
        JSValue::String(s) if s.trim().is_empty() => Ok(None),
        JSValue::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Some(true)),
        JSValue::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Some(false)),
        _ => Err(AnalysisErrors::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Whole floating numbers become integers, everything else is kept.
fn integral_value(value: JSValue) -> JSValue {
    match value.as_f64() {
        Some(f) if value.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => JSValue::from(f as i64),
        _ => value,
    }
}

/// The `Settings` section of the Setup sheet.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Selects the column layout of the Variables and Outputs sheets. Required.
    pub spreadsheet_version: Option<String>,
    pub user_id: Option<String>,
    pub openstudio_server_version: Option<String>,
    pub cluster_name: Option<String>,
    pub server_instance_type: Option<String>,
    pub worker_instance_type: Option<String>,
    pub worker_nodes: Option<i64>,
    /// Comma-separated in the sheet.
    pub aws_tags: Vec<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<i64>,
    pub proxy_username: Option<String>,
    /// Keys this version does not know about.
    pub extra: BTreeMap<String, JSValue>,
}

impl Settings {
    pub fn set(&mut self, key: &str, value: JSValue) -> Result<(), AnalysisErrors> {
        match key {
            "spreadsheet_version" => self.spreadsheet_version = text_value(&value),
            "user_id" => self.user_id = text_value(&value),
            "openstudio_server_version" => self.openstudio_server_version = text_value(&value),
            "cluster_name" => self.cluster_name = text_value(&value),
            "server_instance_type" => self.server_instance_type = text_value(&value),
            "worker_instance_type" => self.worker_instance_type = text_value(&value),
            "worker_nodes" => self.worker_nodes = int_value(key, &value)?,
            "aws_tags" => {
                self.aws_tags = text_value(&value)
                    .map(|s| split_list(&s))
                    .unwrap_or_default()
            }
            "proxy_host" => self.proxy_host = text_value(&value),
            "proxy_port" => self.proxy_port = int_value(key, &value)?,
            "proxy_username" => self.proxy_username = text_value(&value),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

/// The `Running Setup` section of the Setup sheet.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSetup {
    pub analysis_name: Option<String>,
    /// Every `Measure Directory` row adds one search path, in order.
    pub measure_directories: Vec<String>,
    pub export_directory: Option<String>,
    pub extra: BTreeMap<String, JSValue>,
}

impl RunSetup {
    pub fn set(&mut self, key: &str, value: JSValue) -> Result<(), AnalysisErrors> {
        match key {
            "analysis_name" => self.analysis_name = text_value(&value),
            "measure_directory" => {
                if let Some(dir) = text_value(&value) {
                    self.measure_directories.push(dir);
                }
            }
            "export_directory" => self.export_directory = text_value(&value),
            "allow_multiple_jobs" | "use_server_as_worker" => {
                return Err(AnalysisErrors::RemovedSetting {
                    key: key.to_string(),
                })
            }
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

/// The `Problem Definition` section. Merged into `analysis.problem`.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemSetup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JSValue>,
}

impl ProblemSetup {
    pub fn set(&mut self, key: &str, value: JSValue) -> Result<(), AnalysisErrors> {
        match key {
            "analysis_type" => self.analysis_type = text_value(&value),
            _ => {
                self.extra.insert(key.to_string(), integral_value(value));
            }
        }
        Ok(())
    }
}

/// The `Algorithm Setup` section. Merged into `analysis.problem.algorithm`.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlgorithmSetup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_samples: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queued_jobs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_generations: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_f_value: Option<JSValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_messages: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_baseline: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JSValue>,
}

impl AlgorithmSetup {
    pub fn set(&mut self, key: &str, value: JSValue) -> Result<(), AnalysisErrors> {
        match key {
            "number_of_samples" => self.number_of_samples = int_value(key, &value)?,
            "sample_method" => self.sample_method = text_value(&value),
            "seed" => self.seed = int_value(key, &value)?,
            "max_queued_jobs" => self.max_queued_jobs = int_value(key, &value)?,
            "number_of_generations" => self.number_of_generations = int_value(key, &value)?,
            "population_size" => self.population_size = int_value(key, &value)?,
            // The sheet label is "Failed f(x) value".
            "failed_f_x_value" | "failed_f_value" => {
                self.failed_f_value = Some(integral_value(value)).filter(|v| !v.is_null())
            }
            "debug_messages" => self.debug_messages = bool_value(key, &value)?,
            "run_baseline" => self.run_baseline = bool_value(key, &value)?,
            // Computed from the outputs, never read from the sheet.
            "objective_functions" => {}
            _ => {
                self.extra.insert(key.to_string(), integral_value(value));
            }
        }
        Ok(())
    }
}

/// The whole experiment, as read from the workbook.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub display_name: String,
    pub name: String,
    pub settings: Settings,
    pub run_setup: RunSetup,
    pub problem: ProblemSetup,
    pub algorithm: AlgorithmSetup,
    /// Searched in order when resolving measure directories.
    pub measure_paths: Vec<PathBuf>,
    pub export_path: PathBuf,
    pub models: Vec<SeedModel>,
    pub weather_files: Vec<PathBuf>,
    pub other_files: Vec<LibraryFile>,
    pub worker_inits: Vec<WorkerScript>,
    pub worker_finalizes: Vec<WorkerScript>,
    pub measures: Vec<Measure>,
    pub outputs: Vec<Output>,
}

impl Analysis {
    pub fn enabled_measures(&self) -> impl Iterator<Item = &Measure> {
        self.measures.iter().filter(|m| m.enabled)
    }
}

// ******** Errors *********

/// Errors that prevent an analysis from being resolved, validated or generated.
#[derive(PartialEq, Debug, Clone)]
pub enum AnalysisErrors {
    UnsupportedVersion { version: String, oldest: String },
    InvalidVersion(String),
    InvalidSetting { key: String, value: String },
    RemovedSetting { key: String },
    Validation(String),
    WeightMismatch {
        variable: String,
        values: usize,
        weights: usize,
    },
    PivotNotSupported { variable: String },
    UnknownVariableType { variable: String, declared: String },
    UnknownDistribution { variable: String, distribution: String },
    InvalidValue {
        variable: String,
        value: String,
        value_type: String,
    },
    Template(String),
}

impl Error for AnalysisErrors {}

impl Display for AnalysisErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisErrors::UnsupportedVersion { version, oldest } => write!(
                f,
                "Spreadsheet version {} is no longer supported. Please upgrade your spreadsheet to at least {}",
                version, oldest
            ),
            AnalysisErrors::InvalidVersion(v) => {
                write!(f, "Could not understand spreadsheet version {:?}", v)
            }
            AnalysisErrors::InvalidSetting { key, value } => {
                write!(f, "Invalid value {} for setting {}", value, key)
            }
            AnalysisErrors::RemovedSetting { key } => write!(
                f,
                "{} is no longer a valid option in the spreadsheet, please delete the row and rerun",
                key
            ),
            AnalysisErrors::Validation(reason) => write!(f, "{}", reason),
            AnalysisErrors::WeightMismatch {
                variable,
                values,
                weights,
            } => write!(
                f,
                "Discrete variable '{}' has {} values but {} weights",
                variable, values, weights
            ),
            AnalysisErrors::PivotNotSupported { variable } => write!(
                f,
                "Variable '{}' cannot be a pivot: pivoting on a continuous variable is not supported",
                variable
            ),
            AnalysisErrors::UnknownVariableType { variable, declared } => {
                write!(f, "Unknown variable type '{}' for '{}'", declared, variable)
            }
            AnalysisErrors::UnknownDistribution {
                variable,
                distribution,
            } => write!(
                f,
                "Unknown distribution '{}' for '{}'",
                distribution, variable
            ),
            AnalysisErrors::InvalidValue {
                variable,
                value,
                value_type,
            } => write!(
                f,
                "Value '{}' of '{}' is not a valid {}",
                value, variable, value_type
            ),
            AnalysisErrors::Template(msg) => write!(f, "Analysis template error: {}", msg),
        }
    }
}
