//! In-memory spreadsheet grids.
//!
//! Workbooks are read with calamine into a dense [`Grid`] whose coordinates are absolute sheet
//! coordinates, so parsers can reason about fixed row/column ranges exactly as they appear in
//! the provider's files.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{PullerError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Text rendering; integral numbers print without a fractional part (years).
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Cell::Number(x) if x.fract() == 0.0 && x.abs() < 1e15 => Some(format!("{}", *x as i64)),
            Cell::Number(x) => Some(x.to_string()),
        }
    }

    /// Numeric value; provider notation keys ("NO", "NE", "IE", "NA", "...") read as missing.
    pub fn number(&self) -> Option<f64> {
        match self {
            Cell::Number(x) => Some(*x),
            Cell::Text(s) => {
                let x = super::frame::parse_number(s);
                (!x.is_nan()).then_some(x)
            }
            Cell::Empty => None,
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.number()
            .filter(|x| x.fract() == 0.0 && (1800.0..2200.0).contains(x))
            .map(|x| x as i32)
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::Float(x) => Cell::Number(*x),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Dense rectangular view of a worksheet.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self { Self { rows } }

    /// Builds a grid from text; cells that parse as numbers become numbers. Handy for tests.
    pub fn from_text(rows: &[&[&str]]) -> Self {
        Self::new(rows.iter()
            .map(|r| r.iter()
                .map(|s| {
                    let t = s.trim();
                    if t.is_empty() { Cell::Empty }
                    else if let Ok(x) = t.parse::<f64>() { Cell::Number(x) }
                    else { Cell::Text(t.to_string()) }
                })
                .collect())
            .collect())
    }

    pub fn height(&self) -> usize { self.rows.len() }

    pub fn width(&self) -> usize { self.rows.iter().map(Vec::len).max().unwrap_or(0) }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&EMPTY)
    }

    pub fn text(&self, row: usize, col: usize) -> Option<String> { self.cell(row, col).text() }

    pub fn row_is_empty(&self, row: usize) -> bool {
        self.rows.get(row).is_none_or(|r| r.iter().all(Cell::is_empty))
    }

    /// First cell whose trimmed text equals `needle` exactly, scanning row-major.
    pub fn find_text(&self, needle: &str) -> Option<(usize, usize)> {
        self.rows.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(|c| matches!(c, Cell::Text(s) if s.trim() == needle))
                .map(|c| (r, c))
        })
    }

    /// First completely empty row at or after `from` (or the grid height).
    pub fn next_empty_row(&self, from: usize) -> usize {
        (from..self.height()).find(|&r| self.row_is_empty(r)).unwrap_or(self.height())
    }

    /// First column at or after `from` that is empty in `row`.
    pub fn next_empty_col(&self, row: usize, from: usize) -> usize {
        let width = self.width();
        (from..width).find(|&c| self.cell(row, c).is_empty()).unwrap_or(width)
    }
}

/// Replaces every `None` with the closest preceding `Some` (visual merges in spreadsheets).
pub fn forward_fill(values: &mut [Option<String>]) {
    let mut last: Option<String> = None;
    for v in values.iter_mut() {
        match v {
            Some(s) => last = Some(s.clone()),
            None => *v = last.clone(),
        }
    }
}

/// Lower-case snake form of a provider label: "Area (1000 ha)" -> "area_1000_ha".
pub fn snake_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Enough context to reproduce a parse failure.
#[derive(Debug, Clone, Default)]
pub struct SheetContext {
    pub path: PathBuf,
    pub sheet: String,
    pub title: String,
    pub country: String,
}

impl SheetContext {
    pub fn new(path: &Path, sheet: &str, title: &str, country: &str) -> Self {
        Self { path: path.to_path_buf(), sheet: sheet.into(), title: title.into(), country: country.into() }
    }

    pub fn error(&self, reason: impl Into<String>) -> PullerError {
        PullerError::Parse {
            path: self.path.clone(),
            sheet: self.sheet.clone(),
            title: self.title.clone(),
            country: self.country.clone(),
            reason: reason.into(),
        }
    }
}

/// Loads one worksheet of an xls/xlsx/ods workbook.
pub fn load_sheet(path: &Path, sheet: &str) -> Result<Grid> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range(sheet).map_err(|e| {
        SheetContext::new(path, sheet, "", "").error(format!("cannot open sheet: {e}"))
    })?;

    // Ranges start at the first used cell; pad so grid coordinates match the sheet's.
    let (row0, col0) = range.start().map_or((0, 0), |(r, c)| (r as usize, c as usize));
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row0];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col0];
        cells.extend(row.iter().map(Cell::from));
        rows.push(cells);
    }
    Ok(Grid::new(rows))
}

pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path)?;
    Ok(workbook.sheet_names())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_and_bound() {
        let grid = Grid::from_text(&[
            &["", "", ""],
            &["Table 1", "", ""],
            &["a", "b", ""],
            &["1", "2", ""],
            &["", "", ""],
            &["later", "", ""],
        ]);
        assert_eq!(grid.find_text("Table 1"), Some((1, 0)));
        assert_eq!(grid.find_text("Table"), None);
        assert_eq!(grid.next_empty_row(2), 4);
        assert_eq!(grid.next_empty_col(2, 0), 2);
        assert_eq!(grid.cell(99, 99), &Cell::Empty);
    }

    #[test]
    fn cell_rendering() {
        assert_eq!(Cell::Number(1990.0).text().as_deref(), Some("1990"));
        assert_eq!(Cell::Number(1990.0).year(), Some(1990));
        assert_eq!(Cell::Text("NO".into()).number(), None);
        assert_eq!(Cell::Text(" 12.5 ".into()).number(), Some(12.5));
    }

    #[test]
    fn fill_and_snake() {
        let mut v = vec![None, Some("a".to_string()), None, Some("b".to_string()), None];
        forward_fill(&mut v);
        assert_eq!(v, vec![None, Some("a".into()), Some("a".into()), Some("b".into()), Some("b".into())]);
        assert_eq!(snake_case("Area (1000 ha)"), "area_1000_ha");
        assert_eq!(snake_case("- of which available for wood supply"), "of_which_available_for_wood_supply");
    }
}
