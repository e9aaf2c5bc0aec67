// Primitives for reading Excel workbooks.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::osa::io_common::{Cell, Row, Workbook};
use crate::osa::*;

pub struct XlsxWorkbook {
    path: PathBuf,
    workbook: Xlsx<BufReader<File>>,
}

impl XlsxWorkbook {
    pub fn open(path: &Path) -> OsaResult<XlsxWorkbook> {
        let workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu {
            path: path.display().to_string(),
        })?;
        Ok(XlsxWorkbook {
            path: path.to_path_buf(),
            workbook,
        })
    }
}

impl Workbook for XlsxWorkbook {
    fn sheet(&mut self, name: &str) -> OsaResult<Option<Vec<Row>>> {
        let range = match self.workbook.worksheet_range(name) {
            None => return Ok(None),
            Some(r) => r.context(OpeningExcelSnafu {
                path: self.path.display().to_string(),
            })?,
        };
        // The range starts at the first used cell: pad it back to A1.
        let (top, left) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Row> = vec![Vec::new(); top as usize];
        for row in range.rows() {
            let mut cells: Row = vec![Cell::Empty; left as usize];
            cells.extend(row.iter().map(read_cell));
            rows.push(cells);
        }
        debug!("sheet: {}: {} rows", name, rows.len());
        Ok(Some(rows))
    }
}

fn read_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::Empty => Cell::Empty,
        DataType::String(s) => Cell::Text(s.clone()),
        DataType::Int(i) => Cell::Int(*i),
        DataType::Float(f) => Cell::Float(*f),
        DataType::Bool(b) => Cell::Bool(*b),
        DataType::Error(e) => {
            warn!("read_cell: cell error {:?} read as empty", e);
            Cell::Empty
        }
        other => Cell::Text(other.to_string()),
    }
}
