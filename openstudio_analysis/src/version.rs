//! Spreadsheet schema versions and the column layout each of them uses.
//!
//! The layout of the Variables and Outputs sheets changed several times. Each change is
//! recorded as a [`Revision`] over the previous layout; resolving a version folds every
//! revision up to the greatest threshold that does not exceed it.

use std::fmt::Display;
use std::str::FromStr;

use log::debug;

use crate::config::AnalysisErrors;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> SchemaVersion {
        SchemaVersion {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = AnalysisErrors;

    /// Accepts `major.minor.patch` and `major.minor`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AnalysisErrors::InvalidVersion(s.to_string());
        let parts: Vec<u32> = s
            .trim()
            .split('.')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<u32>, _>>()
            .map_err(|_| invalid())?;
        match parts.as_slice() {
            [major, minor] => Ok(SchemaVersion::new(*major, *minor, 0)),
            [major, minor, patch] => Ok(SchemaVersion::new(*major, *minor, *patch)),
            _ => Err(invalid()),
        }
    }
}

impl Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Logical columns of the Variables sheet.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum VariableField {
    Enabled,
    NameOrKind,
    ClassOrDisplayName,
    MeasureDirectory,
    TypeOrArgumentName,
    DisplayNameShort,
    DeclaredType,
    Units,
    StaticValue,
    Enumerations,
    Distribution,
    Min,
    Max,
    Mean,
    StdDev,
    DeltaX,
    DiscreteValues,
    DiscreteWeights,
    Source,
    Notes,
    RelationToOutput,
}

/// Logical columns of the Outputs sheet.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum OutputField {
    DisplayName,
    DisplayNameShort,
    MetadataId,
    Name,
    Units,
    Visualize,
    Export,
    VariableType,
    ObjectiveFunction,
    ObjectiveFunctionTarget,
    ScalingFactor,
    ObjectiveFunctionGroup,
}

/// A header pattern for one logical column.
///
/// The pattern is a case-insensitive regular expression matched against the whole,
/// trimmed header text.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnSpec<F> {
    pub field: F,
    pub pattern: &'static str,
    pub required: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Change<F: 'static> {
    /// Adds the column, or replaces its pattern if it is already mapped.
    Set(F, &'static str, bool),
    Drop(F),
}

struct Revision {
    threshold: SchemaVersion,
    variables: &'static [Change<VariableField>],
    outputs: &'static [Change<OutputField>],
}

use Change::{Drop, Set};

const REVISIONS: &[Revision] = &[
    Revision {
        threshold: SchemaVersion::new(0, 1, 9),
        variables: &[
            Set(VariableField::Enabled, "Enabled", true),
            Set(VariableField::NameOrKind, "Type", true),
            Set(VariableField::ClassOrDisplayName, "Parameter Display Name.*", true),
            Set(VariableField::TypeOrArgumentName, "Parameter Name in Measure", true),
            Set(VariableField::DeclaredType, "Variable Type", true),
            Set(VariableField::Units, "Units", false),
            Set(VariableField::StaticValue, "Static.Default Value", true),
            Set(VariableField::Enumerations, "Enumerations", false),
            Set(VariableField::Distribution, "Distribution", false),
            Set(VariableField::Min, "Min", false),
            Set(VariableField::Max, "Max", false),
            Set(VariableField::Mean, "Mean|Mode", false),
            Set(VariableField::StdDev, "Std Dev", false),
            Set(VariableField::DeltaX, "Delta.X", false),
            Set(VariableField::Source, "Data Source", false),
            Set(VariableField::Notes, "Notes", false),
            Set(VariableField::RelationToOutput, "Typical Var to EUI Relationship", false),
        ],
        outputs: &[
            Set(OutputField::DisplayName, "Variable Display Name", true),
            Set(OutputField::Name, "Name", true),
            Set(OutputField::Units, "Units", false),
            Set(OutputField::ObjectiveFunction, "Objective Function", false),
            Set(OutputField::ObjectiveFunctionTarget, "Objective Function Target", false),
            Set(OutputField::ScalingFactor, "Scale|Scaling Factor", false),
            Set(OutputField::ObjectiveFunctionGroup, "Objective Function Group", false),
        ],
    },
    Revision {
        threshold: SchemaVersion::new(0, 1, 10),
        variables: &[
            Set(VariableField::DiscreteValues, "Discrete Values", false),
            Set(VariableField::DiscreteWeights, "Discrete Weights", false),
        ],
        outputs: &[],
    },
    Revision {
        threshold: SchemaVersion::new(0, 1, 11),
        variables: &[Set(VariableField::MeasureDirectory, "Measure Directory", false)],
        outputs: &[],
    },
    Revision {
        threshold: SchemaVersion::new(0, 1, 12),
        variables: &[Set(
            VariableField::DisplayNameShort,
            "Parameter Short Display Name",
            false,
        )],
        outputs: &[Set(OutputField::DisplayNameShort, "Short Display Name", false)],
    },
    Revision {
        threshold: SchemaVersion::new(0, 2, 0),
        variables: &[Set(
            VariableField::RelationToOutput,
            "Relation to Output|Typical Var to EUI Relationship",
            false,
        )],
        outputs: &[
            Set(OutputField::Visualize, "Visualize", false),
            Set(OutputField::Export, "Export", false),
        ],
    },
    Revision {
        threshold: SchemaVersion::new(0, 3, 0),
        variables: &[
            Set(VariableField::Source, "Data Source|Source", false),
            Drop(VariableField::Notes),
            Set(VariableField::Notes, "Notes|Comments", false),
        ],
        outputs: &[Set(OutputField::MetadataId, "Taxonomy Identifier", false)],
    },
    Revision {
        threshold: SchemaVersion::new(0, 3, 3),
        variables: &[Set(
            VariableField::StaticValue,
            "Static.Default Value|Default Value",
            true,
        )],
        outputs: &[Set(OutputField::VariableType, "Variable Type", false)],
    },
];

/// The column layout resolved for one declared version.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SchemaMapping {
    /// The threshold that was selected, not the declared version.
    pub threshold: SchemaVersion,
    pub variables: Vec<ColumnSpec<VariableField>>,
    pub outputs: Vec<ColumnSpec<OutputField>>,
}

/// All the registered thresholds, in increasing order.
pub fn supported_versions() -> Vec<SchemaVersion> {
    REVISIONS.iter().map(|r| r.threshold).collect()
}

/// Selects the layout of the greatest registered threshold not above `version`.
pub fn resolve(version: &SchemaVersion) -> Result<SchemaMapping, AnalysisErrors> {
    let oldest = REVISIONS[0].threshold;
    if *version < oldest {
        return Err(AnalysisErrors::UnsupportedVersion {
            version: version.to_string(),
            oldest: oldest.to_string(),
        });
    }
    let mut mapping = SchemaMapping {
        threshold: oldest,
        variables: Vec::new(),
        outputs: Vec::new(),
    };
    for revision in REVISIONS.iter().take_while(|r| r.threshold <= *version) {
        apply(&mut mapping.variables, revision.variables);
        apply(&mut mapping.outputs, revision.outputs);
        mapping.threshold = revision.threshold;
    }
    debug!(
        "resolve: version {} uses the layout of {}",
        version, mapping.threshold
    );
    Ok(mapping)
}

fn apply<F: Copy + PartialEq>(columns: &mut Vec<ColumnSpec<F>>, changes: &[Change<F>]) {
    for change in changes {
        match *change {
            Set(field, pattern, required) => {
                if let Some(spec) = columns.iter_mut().find(|c| c.field == field) {
                    spec.pattern = pattern;
                    spec.required = required;
                } else {
                    columns.push(ColumnSpec {
                        field,
                        pattern,
                        required,
                    });
                }
            }
            Drop(field) => columns.retain(|c| c.field != field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> SchemaVersion {
        s.parse().unwrap()
    }

    fn pattern(mapping: &SchemaMapping, field: VariableField) -> Option<&'static str> {
        mapping
            .variables
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.pattern)
    }

    #[test]
    fn parse_and_order() {
        assert_eq!(v("0.1.9"), SchemaVersion::new(0, 1, 9));
        assert_eq!(v("0.3"), SchemaVersion::new(0, 3, 0));
        assert!(v("0.1.10") > v("0.1.9"));
        assert!(v("0.2.0") > v("0.1.12"));
        assert!("0.x.1".parse::<SchemaVersion>().is_err());
        assert!("1".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn thresholds_are_increasing() {
        let versions = supported_versions();
        assert_eq!(versions.len(), 7);
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn too_old() {
        let err = resolve(&v("0.1.8")).unwrap_err();
        assert!(matches!(err, AnalysisErrors::UnsupportedVersion { .. }));
        assert!(err.to_string().contains("0.1.9"));
    }

    #[test]
    fn picks_greatest_threshold_below() {
        let m = resolve(&v("0.1.9")).unwrap();
        assert_eq!(m.threshold, v("0.1.9"));
        assert_eq!(pattern(&m, VariableField::DiscreteValues), None);
        assert_eq!(pattern(&m, VariableField::MeasureDirectory), None);

        let m = resolve(&v("0.1.11")).unwrap();
        assert_eq!(m.threshold, v("0.1.11"));
        assert_eq!(
            pattern(&m, VariableField::DiscreteValues),
            Some("Discrete Values")
        );
        assert_eq!(
            pattern(&m, VariableField::MeasureDirectory),
            Some("Measure Directory")
        );
        assert_eq!(pattern(&m, VariableField::DisplayNameShort), None);

        let m = resolve(&v("0.2.7")).unwrap();
        assert_eq!(m.threshold, v("0.2.0"));
        assert!(m.outputs.iter().any(|c| c.field == OutputField::Visualize));
        assert!(!m.outputs.iter().any(|c| c.field == OutputField::MetadataId));
    }

    #[test]
    fn never_extrapolates_forward() {
        let m = resolve(&v("4.0.0")).unwrap();
        assert_eq!(m.threshold, v("0.3.3"));
        assert_eq!(
            pattern(&m, VariableField::StaticValue),
            Some("Static.Default Value|Default Value")
        );
        assert_eq!(pattern(&m, VariableField::Notes), Some("Notes|Comments"));
        // Each field is mapped once.
        let mut fields: Vec<VariableField> = m.variables.iter().map(|c| c.field).collect();
        let count = fields.len();
        fields.sort();
        fields.dedup();
        assert_eq!(fields.len(), count);
    }
}
