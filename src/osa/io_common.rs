// Cells, sheets and workbooks, independent of the file format.

use std::path::{Component, Path, PathBuf};

use serde_json::Value as JSValue;

use crate::osa::io_csv::CsvWorkbook;
use crate::osa::io_xlsx::XlsxWorkbook;
use crate::osa::*;

#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

pub type Row = Vec<Cell>;

/// The cell does not hold a value of the requested type.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct WrongType;

pub static EMPTY: Cell = Cell::Empty;

/// The cell at the given column. Short rows are padded with empty cells.
pub fn cell(row: &[Cell], idx: usize) -> &Cell {
    row.get(idx).unwrap_or(&EMPTY)
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// The trimmed text of the cell, or None if it is blank.
    /// Whole floats are written without a fractional part.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) if s.trim().is_empty() => None,
            Cell::Text(s) => Some(s.trim().to_string()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some((*f as i64).to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    /// Ok(None) for a blank cell.
    pub fn as_f64(&self) -> Result<Option<f64>, WrongType> {
        match self {
            Cell::Int(i) => Ok(Some(*i as f64)),
            Cell::Float(f) => Ok(Some(*f)),
            Cell::Bool(_) => Err(WrongType),
            c => match c.as_text() {
                None => Ok(None),
                Some(s) => s.parse::<f64>().map(Some).map_err(|_| WrongType),
            },
        }
    }

    /// Ok(None) for a blank cell. Int cells 0 and 1 are read as booleans.
    pub fn as_bool(&self) -> Result<Option<bool>, WrongType> {
        match self {
            Cell::Bool(b) => Ok(Some(*b)),
            Cell::Int(1) => Ok(Some(true)),
            Cell::Int(0) => Ok(Some(false)),
            c => match c.as_text() {
                None => Ok(None),
                Some(s) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
                Some(s) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
                Some(_) => Err(WrongType),
            },
        }
    }

    /// The value of a setting cell.
    ///
    /// Text is read as an integer, a float or a boolean literal when it looks like one.
    pub fn to_json(&self) -> JSValue {
        match self {
            Cell::Empty => JSValue::Null,
            Cell::Int(i) => JSValue::from(*i),
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => JSValue::from(*f as i64),
            Cell::Float(f) => JSValue::from(*f),
            Cell::Bool(b) => JSValue::Bool(*b),
            Cell::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    JSValue::Null
                } else if let Ok(i) = s.parse::<i64>() {
                    JSValue::from(i)
                } else if let Ok(f) = s.parse::<f64>() {
                    JSValue::from(f)
                } else if s.eq_ignore_ascii_case("true") {
                    JSValue::Bool(true)
                } else if s.eq_ignore_ascii_case("false") {
                    JSValue::Bool(false)
                } else {
                    JSValue::String(s.to_string())
                }
            }
        }
    }
}

/// A source of sheets.
pub trait Workbook {
    /// The rows of the sheet, or None if the workbook does not have this sheet.
    fn sheet(&mut self, name: &str) -> OsaResult<Option<Vec<Row>>>;
}

/// Opens a workbook: a directory is read as a set of CSV files, anything else as an
/// Excel file.
pub fn open_workbook(path: &Path) -> OsaResult<Box<dyn Workbook>> {
    if path.is_dir() {
        debug!("open_workbook: reading CSV sheets from {:?}", path);
        Ok(Box::new(CsvWorkbook::new(path)))
    } else {
        debug!("open_workbook: reading Excel file {:?}", path);
        Ok(Box::new(XlsxWorkbook::open(path)?))
    }
}

/// Reads a sheet that must be present.
pub fn required_sheet(
    workbook: &mut dyn Workbook,
    name: &str,
    path: &Path,
) -> OsaResult<Vec<Row>> {
    workbook.sheet(name)?.context(MissingSheetSnafu {
        sheet: name.to_string(),
        path: path.display().to_string(),
    })
}

/// Resolves a path of the workbook against its directory.
pub fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path.trim());
    let joined = if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    };
    joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// The file name without its extension.
pub fn simplify_file_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_text() {
        assert_eq!(Cell::Float(3.0).as_text(), Some("3".to_string()));
        assert_eq!(Cell::Float(0.25).as_text(), Some("0.25".to_string()));
        assert_eq!(Cell::Text("  ".to_string()).as_text(), None);
        assert_eq!(Cell::Bool(true).as_text(), Some("true".to_string()));
        assert_eq!(cell(&[], 4), &Cell::Empty);
    }

    #[test]
    fn cell_numbers() {
        assert_eq!(Cell::Text(" 2.5".to_string()).as_f64(), Ok(Some(2.5)));
        assert_eq!(Cell::Empty.as_f64(), Ok(None));
        assert_eq!(Cell::Text("abc".to_string()).as_f64(), Err(WrongType));
        assert_eq!(Cell::Bool(true).as_f64(), Err(WrongType));
        assert_eq!(Cell::Text("TRUE".to_string()).as_bool(), Ok(Some(true)));
        assert!(Cell::Text("yes".to_string()).as_bool().is_err());
    }

    #[test]
    fn setting_values() {
        assert_eq!(Cell::Text("30".to_string()).to_json(), JSValue::from(30));
        assert_eq!(Cell::Float(30.0).to_json(), JSValue::from(30));
        assert_eq!(Cell::Text("0.5".to_string()).to_json(), JSValue::from(0.5));
        assert_eq!(Cell::Text("False".to_string()).to_json(), JSValue::Bool(false));
        assert_eq!(
            Cell::Text("lhs".to_string()).to_json(),
            JSValue::String("lhs".to_string())
        );
    }

    #[test]
    fn paths() {
        let root = Path::new("/data/project");
        assert_eq!(
            resolve_path(root, "./seeds/small.osm"),
            PathBuf::from("/data/project/seeds/small.osm")
        );
        assert_eq!(resolve_path(root, "/abs/x.epw"), PathBuf::from("/abs/x.epw"));
        assert_eq!(simplify_file_name(Path::new("/a/b/study.xlsx")), "study");
    }
}
