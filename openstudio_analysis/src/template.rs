//! The skeleton of the analysis document.
//!
//! The generator renders a template into a JSON string, parses it back and then fills
//! in the workflow, the outputs and the settings.

use serde_json::json;

use crate::config::AnalysisErrors;

/// The values a template can refer to.
#[derive(PartialEq, Debug, Clone)]
pub struct TemplateBindings<'a> {
    pub display_name: &'a str,
    pub name: &'a str,
    pub analysis_type: Option<&'a str>,
    /// File name of the seed model, without directory.
    pub seed_file: &'a str,
    /// File name of the first weather file, without directory.
    pub weather_file: &'a str,
}

pub trait Template {
    /// Renders the skeleton as JSON text.
    ///
    /// The result must be an object with an `analysis` key holding an object with a
    /// `problem` object, itself holding `algorithm` and `workflow`.
    fn render(&self, bindings: &TemplateBindings) -> Result<String, AnalysisErrors>;
}

/// The skeleton of file format version 1.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct DefaultTemplate;

impl Template for DefaultTemplate {
    fn render(&self, bindings: &TemplateBindings) -> Result<String, AnalysisErrors> {
        let doc = json!({
            "analysis": {
                "display_name": bindings.display_name,
                "name": bindings.name,
                "output_variables": [],
                "problem": {
                    "analysis_type": bindings.analysis_type,
                    "algorithm": {
                        "objective_functions": [],
                    },
                    "workflow": [],
                },
                "seed": {
                    "file_type": "OSM",
                    "path": format!("./seed/{}", bindings.seed_file),
                },
                "weather_file": {
                    "file_type": "EPW",
                    "path": format!("./weather/{}", bindings.weather_file),
                },
                "file_format_version": 1,
            }
        });
        serde_json::to_string_pretty(&doc).map_err(|e| AnalysisErrors::Template(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as JSValue;

    #[test]
    fn default_skeleton() {
        let text = DefaultTemplate
            .render(&TemplateBindings {
                display_name: "Office",
                name: "office",
                analysis_type: Some("lhs"),
                seed_file: "small_seed.osm",
                weather_file: "partial_weather.epw",
            })
            .unwrap();
        let doc: JSValue = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["analysis"]["seed"]["path"], "./seed/small_seed.osm");
        assert_eq!(
            doc["analysis"]["weather_file"]["path"],
            "./weather/partial_weather.epw"
        );
        assert_eq!(doc["analysis"]["problem"]["analysis_type"], "lhs");
        assert!(doc["analysis"]["problem"]["workflow"].is_array());
    }
}
