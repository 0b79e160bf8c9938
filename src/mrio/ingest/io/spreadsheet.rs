use std::io::Cursor;

use calamine::{DataType, Range, Reader, Sheets, Xls, Xlsx};

use crate::mrio::ingest::error::{IngestError, Result};

/// Spreadsheet cell reduced to what the parsers distinguish.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    fn from_data(cell: &DataType) -> Self {
        match cell {
            DataType::Empty => Cell::Empty,
            DataType::Float(value) => Cell::Number(*value),
            DataType::Int(value) => Cell::Number(*value as f64),
            DataType::String(value) if value.trim().is_empty() => Cell::Empty,
            DataType::String(value) => Cell::Text(value.trim().to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Numeric value, also for text cells holding a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => text.parse().ok(),
            Cell::Empty => None,
        }
    }

    /// Label rendering; integral numbers print without a fraction.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                format!("{}", *value as i64)
            }
            Cell::Number(value) => value.to_string(),
        }
    }
}

/// A sheet as a dense grid addressed from cell `A1`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grid {
    cells: Vec<Vec<Cell>>,
}

const EMPTY: Cell = Cell::Empty;

impl Grid {
    pub fn new(cells: Vec<Vec<Cell>>) -> Self {
        Self { cells }
    }

    fn from_range(range: &Range<DataType>) -> Self {
        // calamine ranges start at the first used cell, not at A1.
        let (row_offset, col_offset) = range
            .start()
            .map_or((0, 0), |(row, col)| (row as usize, col as usize));
        let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut out = vec![Cell::Empty; col_offset];
            out.extend(row.iter().map(Cell::from_data));
            cells.push(out);
        }
        Self { cells }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at `(row, col)`; out of range reads as empty.
    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.cells
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn text(&self, row: usize, col: usize) -> String {
        self.get(row, col).as_text()
    }

    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        self.get(row, col).as_number()
    }

    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        if self.cells.len() <= row {
            self.cells.resize(row + 1, Vec::new());
        }
        let cells = &mut self.cells[row];
        if cells.len() <= col {
            cells.resize(col + 1, Cell::Empty);
        }
        cells[col] = cell;
    }

    /// Grid without the first `count` rows.
    pub fn skip_rows(&self, count: usize) -> Self {
        Self {
            cells: self.cells.iter().skip(count).cloned().collect(),
        }
    }

    pub fn row_is_empty(&self, row: usize) -> bool {
        self.cells
            .get(row)
            .is_none_or(|cells| cells.iter().all(Cell::is_empty))
    }

    /// Column position of the header cell in `row` whose text equals `name`.
    pub fn find_in_row(&self, row: usize, name: &str) -> Option<usize> {
        (0..self.cols()).find(|col| self.text(row, *col) == name)
    }
}

/// Workbook opened from memory so the same code serves folders and archives.
pub struct Workbook {
    name: String,
    sheets: Sheets<Cursor<Vec<u8>>>,
}

impl Workbook {
    /// Opens `.xlsx`/`.xlsm` or legacy `.xls` bytes, chosen by `name`.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        let cursor = Cursor::new(bytes);
        let sheets = if lower.ends_with(".xlsx") || lower.ends_with(".xlsm") {
            Sheets::Xlsx(Xlsx::new(cursor).map_err(calamine::Error::from)?)
        } else if lower.ends_with(".xls") {
            Sheets::Xls(Xls::new(cursor).map_err(calamine::Error::from)?)
        } else {
            return Err(IngestError::format(name, "not an .xls or .xlsx workbook"));
        };
        Ok(Self {
            name: name.to_string(),
            sheets,
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names().to_vec()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.sheet_names().iter().any(|sheet| sheet == name)
    }

    pub fn sheet(&mut self, name: &str) -> Result<Grid> {
        let range = self
            .sheets
            .worksheet_range(name)
            .ok_or_else(|| IngestError::structure(&self.name, format!("missing sheet '{name}'")))??;
        Ok(Grid::from_range(&range))
    }

    pub fn sheet_at(&mut self, index: usize) -> Result<Grid> {
        let range = self.sheets.worksheet_range_at(index).ok_or_else(|| {
            IngestError::structure(&self.name, format!("no sheet at position {index}"))
        })??;
        Ok(Grid::from_range(&range))
    }
}

/// Values of the column headed `name` in header row `header_row`, up to the
/// first empty cell.
pub fn column_values(grid: &Grid, header_row: usize, name: &str) -> Option<Vec<String>> {
    let col = grid.find_in_row(header_row, name)?;
    Some(
        (header_row + 1..grid.rows())
            .map(|row| grid.text(row, col))
            .take_while(|value| !value.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_as_integer_labels() {
        assert_eq!(Cell::Number(2011.0).as_text(), "2011");
        assert_eq!(Cell::Number(0.5).as_text(), "0.5");
        assert_eq!(Cell::Text("3.5".into()).as_number(), Some(3.5));
    }

    #[test]
    fn grid_reads_outside_range_as_empty() {
        let mut grid = Grid::default();
        grid.set(2, 1, Cell::Text("x".into()));
        assert_eq!(grid.rows(), 3);
        assert!(grid.get(0, 0).is_empty());
        assert!(grid.get(10, 10).is_empty());
        assert_eq!(grid.find_in_row(2, "x"), Some(1));
    }
}
