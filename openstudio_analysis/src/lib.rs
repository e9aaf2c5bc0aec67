/*!
Experiment model and analysis document generation for OpenStudio analyses.

An analysis is described by a workbook: a Setup sheet with settings and files, a Variables
sheet listing measures with their arguments and variables, and an Outputs sheet. This crate
holds the part of the translation that does not touch the filesystem:

* [`version`] selects the column layout of a given spreadsheet version,
* [`builder::Builder`] turns sheet rows into an [`Analysis`],
* [`checks`] validates the measures and variables of an analysis,
* [`generate_analysis`] produces the analysis JSON document of one seed model.

Reading workbooks and packaging archives is done by the `osatrans` program.
See the [`manual`] for the input format.
*/

mod config;
use log::{debug, info};
use serde_json::{json, Map, Value as JSValue};

use std::collections::HashMap;

pub use crate::config::*;

pub mod builder;
pub mod manual;
pub mod names;
pub mod template;
pub mod version;

use crate::template::{Template, TemplateBindings};

// ******** Checks *********

fn variable_label(measure: &Measure, variable: &Variable) -> String {
    format!("Variable '{}:{}'", measure.display_name, variable.display_name)
}

fn invalid(msg: String) -> AnalysisErrors {
    AnalysisErrors::Validation(msg)
}

/// Validates the measures and variables of an analysis. The first violation is returned.
///
/// In order:
/// * enabled measures have distinct display names,
/// * every variable of an enabled measure has a complete distribution,
/// * variables have distinct display names across all the measures.
///
/// Arguments are not checked: an argument without a static value is simply left out of
/// the generated document.
pub fn checks(analysis: &Analysis) -> Result<(), AnalysisErrors> {
    debug!("checks: {} measures", analysis.measures.len());
    let mut seen: HashMap<&str, &Measure> = HashMap::new();
    for m in analysis.enabled_measures() {
        if let Some(previous) = seen.insert(m.display_name.as_str(), m) {
            return Err(invalid(format!(
                "Measure '{}' on row {} has the same display name as the measure on row {}",
                m.display_name, m.row_number, previous.row_number
            )));
        }
    }

    for m in analysis.enabled_measures() {
        for v in m.perturbed() {
            check_variable(m, v)?;
        }
    }

    let mut seen: HashMap<&str, &Measure> = HashMap::new();
    for m in analysis.measures.iter() {
        for v in m.perturbed() {
            if let Some(previous) = seen.insert(v.display_name.as_str(), m) {
                return Err(invalid(format!(
                    "{} has the same display name as a variable of measure '{}'",
                    variable_label(m, v),
                    previous.display_name
                )));
            }
        }
    }
    Ok(())
}

fn check_variable(measure: &Measure, variable: &Variable) -> Result<(), AnalysisErrors> {
    let label = variable_label(measure, variable);
    let value_type = variable
        .value_type()
        .ok_or_else(|| AnalysisErrors::UnknownVariableType {
            variable: label.clone(),
            declared: variable.declared_type.clone(),
        })?;
    if variable.static_value().is_none() {
        return Err(invalid(format!("{} must have a static value", label)));
    }
    match variable.distribution.shape(value_type) {
        DistributionShape::Continuous {
            kind,
            min,
            max,
            mean,
            stddev,
            ..
        } => {
            if !value_type.is_numeric() {
                return Err(invalid(format!(
                    "{} of type {} must have a discrete distribution",
                    label,
                    value_type.as_str()
                )));
            }
            let mean = mean.ok_or_else(|| invalid(format!("{} must have a mean", label)))?;
            let min = min.ok_or_else(|| invalid(format!("{} must have a minimum", label)))?;
            let max = max.ok_or_else(|| invalid(format!("{} must have a maximum", label)))?;
            if min > max {
                return Err(invalid(format!(
                    "{} has a minimum ({}) greater than its maximum ({})",
                    label, min, max
                )));
            }
            debug!("check_variable: {} mean {} in [{}, {}]", label, mean, min, max);
            if (kind == "normal" || kind == "lognormal") && stddev.is_none() {
                return Err(invalid(format!(
                    "{} must have a standard deviation",
                    label
                )));
            }
        }
        DistributionShape::DiscreteUncertain { values, .. } => {
            if values.is_empty() {
                return Err(invalid(format!("{} must have discrete values", label)));
            }
        }
        DistributionShape::DiscreteEnumerated { enumerations } => {
            if enumerations.is_empty() {
                return Err(invalid(format!("{} must have enumerations", label)));
            }
        }
    }
    Ok(())
}

// ******** Generation *********

const CONTINUOUS_KINDS: [&str; 4] = ["uniform", "triangle", "normal", "lognormal"];

/// Generates the analysis documents of all the seed models, in model order.
///
/// The result pairs the machine name of each model with its document.
pub fn generate_documents(
    analysis: &Analysis,
    template: &dyn Template,
) -> Result<Vec<(String, JSValue)>, AnalysisErrors> {
    let mut res = Vec::new();
    for model in analysis.models.iter() {
        res.push((
            model.name.clone(),
            generate_analysis(analysis, model, template)?,
        ));
    }
    Ok(res)
}

/// Generates the analysis document of one seed model.
///
/// The analysis is not modified: calling this twice gives the same document.
pub fn generate_analysis(
    analysis: &Analysis,
    model: &SeedModel,
    template: &dyn Template,
) -> Result<JSValue, AnalysisErrors> {
    let (display_name, name) = if analysis.models.len() > 1 {
        (
            format!("{} {}", analysis.display_name, model.display_name),
            format!("{}_{}", analysis.name, model.name),
        )
    } else {
        (analysis.display_name.clone(), analysis.name.clone())
    };
    info!("generate_analysis: generating {}", name);

    let seed_file = file_name(&model.path);
    let weather_file = analysis
        .weather_files
        .first()
        .map(|p| file_name(p))
        .ok_or_else(|| invalid("The analysis does not have any weather file".to_string()))?;
    let text = template.render(&TemplateBindings {
        display_name: &display_name,
        name: &name,
        analysis_type: analysis.problem.analysis_type.as_deref(),
        seed_file: &seed_file,
        weather_file: &weather_file,
    })?;
    let mut doc: JSValue =
        serde_json::from_str(&text).map_err(|e| AnalysisErrors::Template(e.to_string()))?;

    set_at(&mut doc, "/analysis", "output_variables", to_json(&analysis.outputs)?)?;
    merge_at(&mut doc, "/analysis/problem", to_json(&analysis.problem)?)?;
    merge_at(
        &mut doc,
        "/analysis/problem/algorithm",
        to_json(&analysis.algorithm)?,
    )?;

    let mut objectives: Vec<&Output> = analysis
        .outputs
        .iter()
        .filter(|o| o.objective_function)
        .collect();
    objectives.sort_by_key(|o| o.objective_function_index);
    let objective_names: Vec<JSValue> = objectives.iter().map(|o| json!(o.name)).collect();
    set_at(
        &mut doc,
        "/analysis/problem/algorithm",
        "objective_functions",
        JSValue::Array(objective_names),
    )?;

    let mut workflow: Vec<JSValue> = Vec::new();
    for (idx, measure) in analysis.enabled_measures().enumerate() {
        workflow.push(workflow_item(analysis, measure, idx)?);
    }
    debug!("generate_analysis: {} workflow items", workflow.len());
    set_at(
        &mut doc,
        "/analysis/problem",
        "workflow",
        JSValue::Array(workflow),
    )?;
    Ok(doc)
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<JSValue, AnalysisErrors> {
    serde_json::to_value(value).map_err(|e| AnalysisErrors::Template(e.to_string()))
}

fn object_at<'a>(
    doc: &'a mut JSValue,
    pointer: &str,
) -> Result<&'a mut Map<String, JSValue>, AnalysisErrors> {
    doc.pointer_mut(pointer)
        .and_then(|v| v.as_object_mut())
        .ok_or_else(|| AnalysisErrors::Template(format!("{} is not an object", pointer)))
}

fn set_at(doc: &mut JSValue, pointer: &str, key: &str, value: JSValue) -> Result<(), AnalysisErrors> {
    object_at(doc, pointer)?.insert(key.to_string(), value);
    Ok(())
}

// Shallow merge: the keys of `value` overwrite the keys of the target.
fn merge_at(doc: &mut JSValue, pointer: &str, value: JSValue) -> Result<(), AnalysisErrors> {
    let target = object_at(doc, pointer)?;
    if let JSValue::Object(values) = value {
        for (k, v) in values {
            target.insert(k, v);
        }
    }
    Ok(())
}

/// A stable identifier in the usual 8-4-4-4-12 layout, derived from the given parts.
fn derived_uuid(parts: &[&str]) -> String {
    let hex = sha256::digest(parts.join("/"));
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn workflow_item(
    analysis: &Analysis,
    measure: &Measure,
    workflow_index: usize,
) -> Result<JSValue, AnalysisErrors> {
    let mut arguments: Vec<JSValue> = Vec::new();
    let mut variables: Vec<JSValue> = Vec::new();
    for v in measure.variables.iter() {
        let label = format!("{}:{}", measure.display_name, v.display_name);
        let value_type = v
            .value_type()
            .ok_or_else(|| AnalysisErrors::UnknownVariableType {
                variable: label.clone(),
                declared: v.declared_type.clone(),
            })?;
        match v.variable_kind() {
            Some(VariableKind::Argument) => {
                if let Some(text) = v.static_value() {
                    let value = coerce(&label, text, value_type)?;
                    arguments.push(argument_entry(v, value_type, value));
                }
            }
            Some(kind) => variables.push(variable_entry(&label, v, kind, value_type)?),
            None => {
                return Err(invalid(format!(
                    "Unknown variable kind '{}' for '{}'",
                    v.kind, label
                )))
            }
        }
    }

    Ok(json!({
        "name": measure.name,
        "display_name": measure.display_name,
        "measure_type": measure.measure_type,
        "measure_definition_class_name": measure.measure_file_name,
        "measure_definition_directory": format!("./measures/{}", measure.directory),
        "measure_definition_display_name": measure.display_name,
        "measure_definition_uuid": derived_uuid(&["definition", &measure.directory]),
        "measure_definition_version_uuid": derived_uuid(&[
            "definition_version",
            &measure.directory,
            &measure.measure_file_name,
        ]),
        "uuid": derived_uuid(&["workflow", &analysis.name, &measure.name]),
        "version_uuid": derived_uuid(&[
            "workflow_version",
            &analysis.name,
            &measure.name,
            &workflow_index.to_string(),
        ]),
        "arguments": arguments,
        "variables": variables,
        "workflow_index": workflow_index,
    }))
}

fn argument_entry(v: &Variable, value_type: ValueType, value: JSValue) -> JSValue {
    json!({
        "display_name": v.display_name,
        "display_name_short": v.display_name_short,
        "name": v.name,
        "value_type": value_type.as_str(),
        "default_value": value,
        "value": value,
    })
}

fn variable_entry(
    label: &str,
    v: &Variable,
    kind: VariableKind,
    value_type: ValueType,
) -> Result<JSValue, AnalysisErrors> {
    let static_value = match v.static_value() {
        Some(text) => coerce(label, text, value_type)?,
        None => JSValue::Null,
    };
    let variable_type = if kind == VariableKind::Pivot {
        "pivot"
    } else {
        "variable"
    };

    let (minimum, maximum, uncertainty) = match v.distribution.shape(value_type) {
        DistributionShape::Continuous {
            kind: distribution,
            min,
            max,
            mean,
            stddev,
            delta_x,
        } => {
            if kind == VariableKind::Pivot {
                return Err(AnalysisErrors::PivotNotSupported {
                    variable: label.to_string(),
                });
            }
            if !value_type.is_numeric() || !CONTINUOUS_KINDS.contains(&distribution.as_str()) {
                return Err(AnalysisErrors::UnknownDistribution {
                    variable: label.to_string(),
                    distribution,
                });
            }
            let mut attributes = vec![
                json!({"name": "lower_bounds", "value": number(value_type, min)}),
                json!({"name": "upper_bounds", "value": number(value_type, max)}),
                json!({"name": "modes", "value": number(value_type, mean)}),
            ];
            if delta_x.is_some() {
                attributes.push(json!({"name": "delta_x", "value": number(value_type, delta_x)}));
            }
            if stddev.is_some() {
                attributes.push(json!({"name": "stddev", "value": number(value_type, stddev)}));
            }
            (
                number(value_type, min),
                number(value_type, max),
                json!({
                    "type": format!("{}_uncertain", distribution),
                    "attributes": attributes,
                }),
            )
        }
        DistributionShape::DiscreteEnumerated { enumerations } => {
            discrete(label, value_type, &enumerations, None)?
        }
        DistributionShape::DiscreteUncertain { values, weights } => {
            discrete(label, value_type, &values, weights.as_deref())?
        }
    };

    let mut entry = json!({
        "argument": {
            "display_name": v.display_name,
            "display_name_short": v.display_name_short,
            "name": v.name,
            "value_type": value_type.as_str(),
            "default_value": static_value,
            "value": static_value,
        },
        "display_name": v.display_name,
        "display_name_short": v.display_name_short,
        "variable_type": variable_type,
        "units": v.units,
        "minimum": minimum,
        "maximum": maximum,
        "relation_to_output": v.relation_to_output,
        "static_value": static_value,
        "uncertainty_description": uncertainty,
        "workflow_index": v.index,
    });
    if let Some(obj) = entry.as_object_mut() {
        obj.insert(variable_type.to_string(), JSValue::Bool(true));
    }
    Ok(entry)
}

// Minimum, maximum and uncertainty description of a discrete variable.
fn discrete(
    label: &str,
    value_type: ValueType,
    values: &[String],
    weights: Option<&[String]>,
) -> Result<(JSValue, JSValue, JSValue), AnalysisErrors> {
    if let Some(w) = weights {
        if w.len() != values.len() {
            return Err(AnalysisErrors::WeightMismatch {
                variable: label.to_string(),
                values: values.len(),
                weights: w.len(),
            });
        }
    }
    let mut pairs: Vec<JSValue> = Vec::new();
    let mut numbers: Vec<f64> = Vec::new();
    for (idx, text) in values.iter().enumerate() {
        let value = coerce(label, text, value_type)?;
        if let Some(f) = value.as_f64() {
            numbers.push(f);
        }
        let mut pair = Map::new();
        pair.insert("value".to_string(), value);
        if let Some(w) = weights.and_then(|w| w.get(idx)) {
            let weight: f64 = w.trim().parse().map_err(|_| AnalysisErrors::InvalidValue {
                variable: label.to_string(),
                value: w.clone(),
                value_type: "weight".to_string(),
            })?;
            pair.insert("weight".to_string(), json!(weight));
        }
        pairs.push(JSValue::Object(pair));
    }
    let (minimum, maximum) = if value_type.is_numeric() && !numbers.is_empty() {
        let min = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        (number(value_type, Some(min)), number(value_type, Some(max)))
    } else {
        (JSValue::Null, JSValue::Null)
    };
    let uncertainty = json!({
        "type": "discrete_uncertain",
        "attributes": [{
            "name": "discrete",
            "values_and_weights": pairs,
        }],
    });
    Ok((minimum, maximum, uncertainty))
}

fn number(value_type: ValueType, value: Option<f64>) -> JSValue {
    match value {
        Some(f) if value_type == ValueType::Integer && f.fract() == 0.0 => json!(f as i64),
        Some(f) => json!(f),
        None => JSValue::Null,
    }
}

/// Converts a cell text to a value of the declared type.
fn coerce(label: &str, text: &str, value_type: ValueType) -> Result<JSValue, AnalysisErrors> {
    let text = text.trim();
    let bad = || AnalysisErrors::InvalidValue {
        variable: label.to_string(),
        value: text.to_string(),
        value_type: value_type.as_str().to_string(),
    };
    match value_type {
        ValueType::Double => text.parse::<f64>().map(|f| json!(f)).map_err(|_| bad()),
        ValueType::Integer => match text.parse::<i64>() {
            Ok(i) => Ok(json!(i)),
            Err(_) => match text.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 => Ok(json!(f as i64)),
                _ => Err(bad()),
            },
        },
        ValueType::Bool => Ok(JSValue::Bool(text.eq_ignore_ascii_case("true"))),
        ValueType::String | ValueType::Choice => Ok(json!(text)),
    }
}
