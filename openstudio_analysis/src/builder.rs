use log::{debug, warn};

pub use crate::config::*;
use crate::names::{machine_name, to_underscore};

/// A builder that turns sheet rows into an [`Analysis`].
///
/// Rows of the Variables sheet must be added in sheet order: a row with a filled
/// `enabled` cell starts a measure, and the rows that follow it describe the arguments
/// and variables of that measure.
///
/// ```
/// use openstudio_analysis::builder::Builder;
/// use openstudio_analysis::{AnalysisErrors, OutputRow, VariableRow};
///
/// let mut builder = Builder::new("Office retrofit");
/// builder.add_variable_row(&VariableRow {
///     row_number: 2,
///     enabled: Some("TRUE".to_string()),
///     name_or_kind: Some("Reduce Lighting Loads".to_string()),
///     class_or_display_name: Some("ReduceLightingLoadsByPercentage".to_string()),
///     type_or_argument_name: Some("RubyMeasure".to_string()),
///     ..Default::default()
/// })?;
/// builder.add_variable_row(&VariableRow {
///     row_number: 3,
///     name_or_kind: Some("variable".to_string()),
///     class_or_display_name: Some("Lighting Power Reduction".to_string()),
///     type_or_argument_name: Some("lighting_power_reduction_percent".to_string()),
///     declared_type: Some("Double".to_string()),
///     static_value: Some("30".to_string()),
///     min: Some(0.0),
///     max: Some(60.0),
///     mean: Some(30.0),
///     ..Default::default()
/// })?;
/// builder.add_output_row(&OutputRow {
///     display_name: Some("Total Site Energy".to_string()),
///     name: Some("standard_report.total_energy".to_string()),
///     objective_function: true,
///     ..Default::default()
/// })?;
///
/// let analysis = builder.build();
/// assert_eq!(analysis.measures[0].name, "reduce_lighting_loads");
/// assert_eq!(analysis.measures[0].directory, "reduce_lighting_loads_by_percentage");
/// assert_eq!(analysis.outputs[0].objective_function_group, Some(1));
/// # Ok::<(), AnalysisErrors>(())
/// ```
pub struct Builder {
    analysis: Analysis,
    // Index of the measure receiving continuation rows.
    current: Option<usize>,
    objective_count: usize,
    next_group: u32,
}

impl Builder {
    pub fn new(display_name: &str) -> Builder {
        Builder {
            analysis: Analysis {
                display_name: display_name.trim().to_string(),
                name: machine_name(display_name),
                ..Default::default()
            },
            current: None,
            objective_count: 0,
            next_group: 1,
        }
    }

    /// Renames the analysis. The machine name follows the display name.
    pub fn display_name(&mut self, display_name: &str) {
        self.analysis.display_name = display_name.trim().to_string();
        self.analysis.name = machine_name(display_name);
    }

    /// Adds one row of the Variables sheet.
    pub fn add_variable_row(&mut self, row: &VariableRow) -> Result<(), AnalysisErrors> {
        if non_blank(&row.enabled).is_some() {
            self.start_measure(row)
        } else {
            self.add_variable(row)
        }
    }

    fn start_measure(&mut self, row: &VariableRow) -> Result<(), AnalysisErrors> {
        let enabled = non_blank(&row.enabled)
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let display_name = non_blank(&row.name_or_kind).ok_or_else(|| {
            AnalysisErrors::Validation(format!(
                "Measure on row {} does not have a display name",
                row.row_number
            ))
        })?;
        let class_name = non_blank(&row.class_or_display_name).unwrap_or_default();
        let directory = non_blank(&row.measure_directory)
            .unwrap_or_else(|| to_underscore(&class_name));
        let measure = Measure {
            name: machine_name(&display_name),
            display_name,
            enabled,
            measure_type: non_blank(&row.type_or_argument_name),
            measure_file_name: class_name,
            directory,
            row_number: row.row_number,
            variables: Vec::new(),
        };
        debug!(
            "start_measure: row {}: {:?} (enabled: {})",
            row.row_number, measure.name, measure.enabled
        );
        self.analysis.measures.push(measure);
        self.current = Some(self.analysis.measures.len() - 1);
        Ok(())
    }

    fn add_variable(&mut self, row: &VariableRow) -> Result<(), AnalysisErrors> {
        let kind = match non_blank(&row.name_or_kind) {
            Some(k) => k.to_lowercase(),
            None => {
                debug!("add_variable: row {}: no kind, skipping", row.row_number);
                return Ok(());
            }
        };
        if VariableKind::parse(&kind).is_none() {
            return Err(AnalysisErrors::Validation(format!(
                "Row {}: unknown variable kind '{}', expected argument, variable or pivot",
                row.row_number, kind
            )));
        }
        let measure = match self.current {
            Some(idx) => &mut self.analysis.measures[idx],
            None => {
                warn!(
                    "add_variable: row {} comes before any measure and is dropped",
                    row.row_number
                );
                return Ok(());
            }
        };
        let name = non_blank(&row.type_or_argument_name).ok_or_else(|| {
            AnalysisErrors::Validation(format!(
                "Row {}: {} of measure '{}' has no argument name",
                row.row_number, kind, measure.display_name
            ))
        })?;
        let display_name = non_blank(&row.class_or_display_name).unwrap_or_else(|| name.clone());
        let declared_type = non_blank(&row.declared_type)
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        let enumerations = match ValueType::parse(&declared_type) {
            Some(ValueType::Bool) if non_blank(&row.enumerations).is_none() => {
                vec!["true".to_string(), "false".to_string()]
            }
            _ => non_blank(&row.enumerations)
                .map(|s| split_enumerations(&s))
                .unwrap_or_default(),
        };

        let variable = Variable {
            kind,
            display_name_short: non_blank(&row.display_name_short)
                .unwrap_or_else(|| display_name.clone()),
            display_name,
            name,
            declared_type,
            units: non_blank(&row.units),
            index: measure.variables.len(),
            distribution: Distribution {
                static_value: non_blank(&row.static_value),
                kind: non_blank(&row.distribution),
                min: row.min,
                max: row.max,
                mean: row.mean,
                stddev: row.stddev,
                delta_x: row.delta_x,
                enumerations,
                discrete_values: non_blank(&row.discrete_values),
                discrete_weights: non_blank(&row.discrete_weights),
                source: non_blank(&row.source),
            },
            notes: non_blank(&row.notes),
            relation_to_output: non_blank(&row.relation_to_output),
        };
        measure.variables.push(variable);
        Ok(())
    }

    /// Adds one row of the Outputs sheet. Rows without a name are ignored.
    pub fn add_output_row(&mut self, row: &OutputRow) -> Result<(), AnalysisErrors> {
        let name = match non_blank(&row.name) {
            Some(n) => n,
            None => return Ok(()),
        };
        let display_name = non_blank(&row.display_name).unwrap_or_else(|| name.clone());
        let (objective_function_index, objective_function_group) = if row.objective_function {
            let idx = self.objective_count;
            self.objective_count += 1;
            let group = match row.objective_function_group {
                Some(g) => g,
                None => {
                    let g = self.next_group;
                    self.next_group += 1;
                    g
                }
            };
            (Some(idx), Some(group))
        } else {
            (None, row.objective_function_group)
        };
        self.analysis.outputs.push(Output {
            display_name_short: non_blank(&row.display_name_short)
                .unwrap_or_else(|| display_name.clone()),
            display_name,
            metadata_id: non_blank(&row.metadata_id),
            name,
            units: non_blank(&row.units),
            visualize: row.visualize.unwrap_or(true),
            export: row.export.unwrap_or(true),
            variable_type: non_blank(&row.variable_type),
            objective_function: row.objective_function,
            objective_function_index,
            objective_function_target: row.objective_function_target,
            scaling_factor: row.scaling_factor,
            objective_function_group,
        });
        Ok(())
    }

    pub fn add_model(&mut self, model: SeedModel) {
        self.analysis.models.push(model);
    }

    pub fn delete_models(&mut self) {
        self.analysis.models.clear();
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Access to the settings, paths and files read from the Setup sheet.
    pub fn analysis_mut(&mut self) -> &mut Analysis {
        &mut self.analysis
    }

    pub fn build(self) -> Analysis {
        self.analysis
    }
}

fn non_blank(cell: &Option<String>) -> Option<String> {
    cell.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// Enumeration cells use both `|` and `,` as separators.
fn split_enumerations(text: &str) -> Vec<String> {
    text.split(|c| c == '|' || c == ',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measure_row(row_number: usize, enabled: &str, display_name: &str) -> VariableRow {
        VariableRow {
            row_number,
            enabled: Some(enabled.to_string()),
            name_or_kind: Some(display_name.to_string()),
            class_or_display_name: Some("SetWindowToWallRatioByFacade".to_string()),
            type_or_argument_name: Some("RubyMeasure".to_string()),
            ..Default::default()
        }
    }

    fn argument_row(row_number: usize, name: &str, declared: &str) -> VariableRow {
        VariableRow {
            row_number,
            name_or_kind: Some("argument".to_string()),
            class_or_display_name: Some(name.replace('_', " ")),
            type_or_argument_name: Some(name.to_string()),
            declared_type: Some(declared.to_string()),
            static_value: Some("1".to_string()),
            ..Default::default()
        }
    }

    fn output_row(name: &str, objective: bool, group: Option<u32>) -> OutputRow {
        OutputRow {
            display_name: Some(name.to_uppercase()),
            name: Some(name.to_string()),
            objective_function: objective,
            objective_function_group: group,
            ..Default::default()
        }
    }

    #[test]
    fn measures_and_indexes() {
        let mut b = Builder::new("Test");
        b.add_variable_row(&measure_row(2, "TRUE", "Set Window-To-Wall Ratio"))
            .unwrap();
        b.add_variable_row(&argument_row(3, "wwr", "Double")).unwrap();
        b.add_variable_row(&argument_row(4, "sill_height", "double"))
            .unwrap();
        b.add_variable_row(&measure_row(5, "false", "Other")).unwrap();
        b.add_variable_row(&argument_row(6, "facade", "choice")).unwrap();
        let a = b.build();
        assert_eq!(a.measures.len(), 2);
        let m = &a.measures[0];
        assert_eq!(m.name, "set_window_to_wall_ratio");
        assert!(m.enabled);
        assert_eq!(m.directory, "set_window_to_wall_ratio_by_facade");
        assert_eq!(m.variables.len(), 2);
        assert_eq!(m.variables[1].index, 1);
        assert_eq!(m.variables[1].declared_type, "double");
        assert!(!a.measures[1].enabled);
        // The counter restarts with each measure.
        assert_eq!(a.measures[1].variables[0].index, 0);
    }

    #[test]
    fn measure_directory_cell_wins() {
        let mut b = Builder::new("Test");
        let mut row = measure_row(2, "true", "Measure");
        row.measure_directory = Some("custom_dir".to_string());
        b.add_variable_row(&row).unwrap();
        assert_eq!(b.analysis().measures[0].directory, "custom_dir");
    }

    #[test]
    fn orphan_row_is_dropped() {
        let mut b = Builder::new("Test");
        b.add_variable_row(&argument_row(2, "wwr", "double")).unwrap();
        assert!(b.build().measures.is_empty());
    }

    #[test]
    fn enumerations() {
        let mut b = Builder::new("Test");
        b.add_variable_row(&measure_row(2, "true", "M")).unwrap();
        let mut row = argument_row(3, "facade", "Choice");
        row.enumerations = Some("North| South ,East,,".to_string());
        b.add_variable_row(&row).unwrap();
        b.add_variable_row(&argument_row(4, "flag", "bool")).unwrap();
        let a = b.build();
        let vars = &a.measures[0].variables;
        assert_eq!(
            vars[0].distribution.enumerations,
            vec!["North", "South", "East"]
        );
        assert_eq!(vars[1].distribution.enumerations, vec!["true", "false"]);
        assert_eq!(vars[1].display_name_short, vars[1].display_name);
    }

    #[test]
    fn unknown_kind() {
        let mut b = Builder::new("Test");
        b.add_variable_row(&measure_row(2, "true", "M")).unwrap();
        let mut row = argument_row(3, "x", "double");
        row.name_or_kind = Some("constant".to_string());
        assert!(matches!(
            b.add_variable_row(&row),
            Err(AnalysisErrors::Validation(_))
        ));
    }

    #[test]
    fn objective_indexes() {
        let mut b = Builder::new("Test");
        b.add_output_row(&output_row("a", true, None)).unwrap();
        b.add_output_row(&output_row("b", false, None)).unwrap();
        b.add_output_row(&output_row("c", true, None)).unwrap();
        b.add_output_row(&output_row("d", true, None)).unwrap();
        let a = b.build();
        let indexes: Vec<Option<usize>> = a
            .outputs
            .iter()
            .map(|o| o.objective_function_index)
            .collect();
        assert_eq!(indexes, vec![Some(0), None, Some(1), Some(2)]);
    }

    #[test]
    fn group_counter() {
        let mut b = Builder::new("Test");
        b.add_output_row(&output_row("a", true, None)).unwrap();
        b.add_output_row(&output_row("b", true, Some(7))).unwrap();
        b.add_output_row(&output_row("c", true, None)).unwrap();
        b.add_output_row(&OutputRow::default()).unwrap();
        let a = b.build();
        let groups: Vec<Option<u32>> = a
            .outputs
            .iter()
            .map(|o| o.objective_function_group)
            .collect();
        assert_eq!(groups, vec![Some(1), Some(7), Some(2)]);
    }

    #[test]
    fn models() {
        let mut b = Builder::new("Test");
        b.add_model(SeedModel {
            name: "small".to_string(),
            display_name: "Small".to_string(),
            model_type: "model".to_string(),
            path: "small.osm".into(),
        });
        assert_eq!(b.analysis().models.len(), 1);
        b.delete_models();
        assert!(b.analysis().models.is_empty());
    }
}
