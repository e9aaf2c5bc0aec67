// The Variables and Outputs sheets: header location and typed row reading.

use regex::Regex;

use openstudio_analysis::version::{ColumnSpec, OutputField, SchemaMapping, VariableField};
use openstudio_analysis::{OutputRow, VariableRow};

use crate::osa::io_common::{cell, Cell, Row, EMPTY};
use crate::osa::*;

/// The position of the header row and of each mapped column.
#[derive(Debug, Clone)]
struct Header<F> {
    /// 0-based index of the header row.
    row: usize,
    columns: Vec<(F, usize)>,
}

impl<F: Copy + PartialEq> Header<F> {
    fn column(&self, field: F) -> Option<usize> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, idx)| *idx)
    }
}

fn compile<F: Copy>(specs: &[ColumnSpec<F>]) -> OsaResult<Vec<(F, bool, &'static str, Regex)>> {
    let mut res = Vec::new();
    for spec in specs {
        let re = Regex::new(&format!("(?i)^(?:{})$", spec.pattern)).context(HeaderPatternSnafu {
            pattern: spec.pattern.to_string(),
        })?;
        res.push((spec.field, spec.required, spec.pattern, re));
    }
    Ok(res)
}

/// Finds the first row in which every required column is present.
fn locate<F: Copy + PartialEq>(
    rows: &[Row],
    specs: &[ColumnSpec<F>],
    sheet: &str,
) -> OsaResult<Header<F>> {
    let compiled = compile(specs)?;
    // Missing required patterns of the row that came closest.
    let mut best_missing: Option<Vec<&'static str>> = None;
    for (row_idx, row) in rows.iter().enumerate() {
        let texts: Vec<Option<String>> = row.iter().map(|c| c.as_text()).collect();
        let mut columns: Vec<(F, usize)> = Vec::new();
        let mut missing: Vec<&'static str> = Vec::new();
        for (field, required, pattern, re) in compiled.iter() {
            let found = texts.iter().enumerate().position(|(col, t)| {
                !columns.iter().any(|(_, c)| *c == col)
                    && t.as_deref().map(|s| re.is_match(s)).unwrap_or(false)
            });
            match found {
                Some(col) => columns.push((*field, col)),
                None if *required => missing.push(*pattern),
                None => {}
            }
        }
        if missing.is_empty() {
            debug!(
                "locate: {}: header on row {} with {} columns",
                sheet,
                row_idx + 1,
                columns.len()
            );
            return Ok(Header {
                row: row_idx,
                columns,
            });
        }
        if !columns.is_empty()
            && best_missing
                .as_ref()
                .map(|b| missing.len() < b.len())
                .unwrap_or(true)
        {
            best_missing = Some(missing);
        }
    }
    let column = best_missing
        .and_then(|m| m.first().map(|s| s.to_string()))
        .or_else(|| {
            compiled
                .iter()
                .find(|(_, required, _, _)| *required)
                .map(|(_, _, p, _)| p.to_string())
        })
        .unwrap_or_default();
    MissingColumnSnafu {
        sheet: sheet.to_string(),
        column,
    }
    .fail()
}

struct RowReader<'a, F> {
    sheet: &'a str,
    header: &'a Header<F>,
    row: &'a [Cell],
    row_number: usize,
}

impl<'a, F: Copy + PartialEq + std::fmt::Debug> RowReader<'a, F> {
    fn cell(&self, field: F) -> &'a Cell {
        match self.header.column(field) {
            Some(idx) => cell(self.row, idx),
            None => &EMPTY,
        }
    }

    fn text(&self, field: F) -> Option<String> {
        self.cell(field).as_text()
    }

    fn invalid(&self, field: F, expected: &str) -> OsaError {
        OsaError::InvalidCell {
            sheet: self.sheet.to_string(),
            row: self.row_number,
            column: format!("{:?}", field),
            content: format!("{:?}", self.cell(field)),
            expected: expected.to_string(),
        }
    }

    fn number(&self, field: F) -> OsaResult<Option<f64>> {
        self.cell(field)
            .as_f64()
            .map_err(|_| self.invalid(field, "a number"))
    }

    fn flag(&self, field: F) -> OsaResult<Option<bool>> {
        self.cell(field)
            .as_bool()
            .map_err(|_| self.invalid(field, "TRUE or FALSE"))
    }
}

fn data_rows<'a, F: Copy + PartialEq>(
    rows: &'a [Row],
    header: &'a Header<F>,
) -> impl Iterator<Item = (usize, &'a Row)> {
    rows.iter()
        .enumerate()
        .skip(header.row + 1)
        .filter(|(_, r)| !r.iter().all(|c| c.is_blank()))
        .map(|(idx, r)| (idx + 1, r))
}

pub fn read_variables(rows: &[Row], mapping: &SchemaMapping) -> OsaResult<Vec<VariableRow>> {
    let sheet = "Variables";
    let header = locate(rows, &mapping.variables, sheet)?;
    let mut res: Vec<VariableRow> = Vec::new();
    for (row_number, row) in data_rows(rows, &header) {
        let r = RowReader {
            sheet,
            header: &header,
            row,
            row_number,
        };
        use VariableField::*;
        let vr = VariableRow {
            row_number,
            enabled: r.text(Enabled),
            name_or_kind: r.text(NameOrKind),
            class_or_display_name: r.text(ClassOrDisplayName),
            measure_directory: r.text(MeasureDirectory),
            type_or_argument_name: r.text(TypeOrArgumentName),
            display_name_short: r.text(DisplayNameShort),
            declared_type: r.text(DeclaredType),
            units: r.text(Units),
            static_value: r.text(StaticValue),
            enumerations: r.text(Enumerations),
            distribution: r.text(Distribution),
            min: r.number(Min)?,
            max: r.number(Max)?,
            mean: r.number(Mean)?,
            stddev: r.number(StdDev)?,
            delta_x: r.number(DeltaX)?,
            discrete_values: r.text(DiscreteValues),
            discrete_weights: r.text(DiscreteWeights),
            source: r.text(Source),
            notes: r.text(Notes),
            relation_to_output: r.text(RelationToOutput),
        };
        debug!("read_variables: {:?}", vr);
        res.push(vr);
    }
    Ok(res)
}

pub fn read_outputs(rows: &[Row], mapping: &SchemaMapping) -> OsaResult<Vec<OutputRow>> {
    let sheet = "Outputs";
    let header = locate(rows, &mapping.outputs, sheet)?;
    let mut res: Vec<OutputRow> = Vec::new();
    for (row_number, row) in data_rows(rows, &header) {
        let r = RowReader {
            sheet,
            header: &header,
            row,
            row_number,
        };
        use OutputField::*;
        let group = match r.number(ObjectiveFunctionGroup)? {
            Some(g) if g >= 0.0 && g.fract() == 0.0 => Some(g as u32),
            Some(_) => return Err(r.invalid(ObjectiveFunctionGroup, "a positive integer")),
            None => None,
        };
        res.push(OutputRow {
            display_name: r.text(DisplayName),
            display_name_short: r.text(DisplayNameShort),
            metadata_id: r.text(MetadataId),
            name: r.text(Name),
            units: r.text(Units),
            visualize: r.flag(Visualize)?,
            export: r.flag(Export)?,
            variable_type: r.text(VariableType),
            objective_function: r.flag(ObjectiveFunction)?.unwrap_or(false),
            objective_function_target: r.number(ObjectiveFunctionTarget)?,
            scaling_factor: r.number(ScalingFactor)?,
            objective_function_group: group,
        });
    }
    Ok(res)
}
