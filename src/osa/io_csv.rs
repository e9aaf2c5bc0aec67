// Primitives for reading workbooks stored as one CSV file per sheet.

use std::path::{Path, PathBuf};

use crate::osa::io_common::{Cell, Row, Workbook};
use crate::osa::*;

pub struct CsvWorkbook {
    dir: PathBuf,
}

impl CsvWorkbook {
    pub fn new(dir: &Path) -> CsvWorkbook {
        CsvWorkbook {
            dir: dir.to_path_buf(),
        }
    }

    fn sheet_path(&self, name: &str) -> Option<PathBuf> {
        [
            self.dir.join(format!("{}.csv", name)),
            self.dir.join(format!("{}.csv", name.to_lowercase())),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }
}

impl Workbook for CsvWorkbook {
    fn sheet(&mut self, name: &str) -> OsaResult<Option<Vec<Row>>> {
        let path = match self.sheet_path(name) {
            Some(p) => p,
            None => return Ok(None),
        };
        let path_s = path.display().to_string();
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .context(OpeningCsvSnafu {
                path: path_s.clone(),
            })?;
        let mut rows: Vec<Row> = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record.context(ReadingCsvSnafu {
                path: path_s.clone(),
                lineno: idx + 1,
            })?;
            rows.push(
                record
                    .iter()
                    .map(|s| {
                        if s.trim().is_empty() {
                            Cell::Empty
                        } else {
                            Cell::Text(s.to_string())
                        }
                    })
                    .collect(),
            );
        }
        debug!("sheet: {} ({}): {} rows", name, path_s, rows.len());
        Ok(Some(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lower_case_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("outputs.csv"), "a,b\n,c,d\n").unwrap();
        let mut wb = CsvWorkbook::new(dir.path());
        let rows = wb.sheet("Outputs").unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], Cell::Empty);
        assert_eq!(rows[1][2], Cell::Text("d".to_string()));
        assert!(wb.sheet("Setup").unwrap().is_none());
    }
}
