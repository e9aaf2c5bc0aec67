use clap::Parser;

/// Translates an OpenStudio Analysis spreadsheet into analysis documents and the archives
/// that go with them.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The workbook: an Excel file, or a directory holding one CSV file per sheet
    /// (Setup.csv, Variables.csv, Outputs.csv).
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (list of directories) If specified, the measures are looked up in these directories, in
    /// order, instead of the Measure Directory rows of the Setup sheet.
    #[clap(long, value_parser, multiple_values = true)]
    pub measure_paths: Option<Vec<String>>,

    /// (directory) If specified, the documents and archives are written to this directory
    /// instead of the Export Directory of the Setup sheet.
    #[clap(short = 'o', long, value_parser)]
    pub export_path: Option<String>,

    /// (list of file paths) If specified, replaces the seed models of the Models section.
    /// Relative paths are resolved against the directory of the workbook.
    #[clap(long, value_parser, multiple_values = true)]
    pub seed_models: Option<Vec<String>>,

    /// (file path) A reference analysis document in JSON format. If provided, the document
    /// generated for the first seed model must match it.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// If passed as an argument, only reads and validates the workbook. Nothing is written.
    #[clap(long, takes_value = false)]
    pub check: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
