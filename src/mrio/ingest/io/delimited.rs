use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::model::{IndexLevel, Key, Matrix, MultiIndex, Table};
use crate::mrio::ingest::sniff::LayoutFormat;

/// Splits delimited text into trimmed cells. Rows may differ in length.
pub fn read_grid(text: &str, separator: char) -> Result<Vec<Vec<String>>> {
    let delimiter = u8::try_from(separator).map_err(|_| {
        IngestError::InvalidParameter(format!("separator {separator:?} is not a single byte"))
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|field| field.trim().to_string()).collect());
    }
    Ok(rows)
}

/// Parses a numeric cell; empty cells read as zero.
pub fn parse_number(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return Some(0.0);
    }
    cell.parse::<f64>().ok()
}

/// A delimited matrix split into header labels, row labels and values.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledBlock {
    /// Header rows restricted to the value columns.
    pub header: Vec<Vec<String>>,
    /// Header cells above the index columns; usually the level names.
    pub corner: Vec<Vec<String>>,
    /// Index columns of every data row.
    pub labels: Vec<Vec<String>>,
    pub values: Matrix,
}

impl LabelledBlock {
    /// Parses `text` following a sniffed or declared layout.
    pub fn parse(text: &str, format: &LayoutFormat, table: &str) -> Result<Self> {
        let grid = read_grid(text, format.separator)?;
        if grid.len() < format.header_rows {
            return Err(IngestError::structure(
                table,
                format!("{} rows cannot hold {} header rows", grid.len(), format.header_rows),
            ));
        }
        let width = grid
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .saturating_sub(format.index_cols);

        let cell = |row: &[String], col: usize| row.get(col).cloned().unwrap_or_default();

        let mut header = Vec::with_capacity(format.header_rows);
        let mut corner = Vec::with_capacity(format.header_rows);
        for row in &grid[..format.header_rows] {
            corner.push((0..format.index_cols).map(|c| cell(row, c)).collect());
            header.push(
                (0..width)
                    .map(|c| cell(row, format.index_cols + c))
                    .collect(),
            );
        }

        let body = &grid[format.header_rows..];
        let mut labels = Vec::with_capacity(body.len());
        let mut data = Vec::with_capacity(body.len() * width);
        for (r, row) in body.iter().enumerate() {
            labels.push((0..format.index_cols).map(|c| cell(row, c)).collect());
            for c in 0..width {
                let raw = cell(row, format.index_cols + c);
                let value = parse_number(&raw).ok_or_else(|| {
                    IngestError::structure(
                        table,
                        format!(
                            "non-numeric value '{raw}' at data row {r}, column {}",
                            format.index_cols + c
                        ),
                    )
                })?;
                data.push(value);
            }
        }

        Ok(Self {
            header,
            corner,
            labels,
            values: Matrix::new(body.len(), width, data)?,
        })
    }

    /// Row index built from the index columns.
    pub fn row_index(&self, names: &[IndexLevel]) -> Result<MultiIndex> {
        MultiIndex::new(names.to_vec(), self.labels.clone())
    }

    /// Column index built from the header rows.
    pub fn column_index(&self, names: &[IndexLevel]) -> Result<MultiIndex> {
        let keys: Vec<Key> = (0..self.values.cols())
            .map(|c| self.header.iter().map(|row| row[c].clone()).collect())
            .collect();
        MultiIndex::new(names.to_vec(), keys)
    }

    pub fn into_table(self, rows: &[IndexLevel], columns: &[IndexLevel]) -> Result<Table> {
        let index = self.row_index(rows)?;
        let cols = self.column_index(columns)?;
        Table::new(index, cols, self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrio::ingest::model::schema;

    #[test]
    fn block_splits_labels_from_values() {
        let text = "region\tsector\tAT\tAT\n\t\ta\tb\nAT\ta\t1\t2\nAT\tb\t3\t\n";
        let format = LayoutFormat {
            separator: '\t',
            header_rows: 2,
            index_cols: 2,
        };
        let block = LabelledBlock::parse(text, &format, "Z").unwrap();
        assert_eq!(block.corner[0], vec!["region", "sector"]);
        let table = block
            .into_table(schema::REGION_SECTOR, schema::REGION_SECTOR)
            .unwrap();
        assert_eq!(table.shape(), (2, 2));
        assert_eq!(table.get(1, 1), 0.0);
        assert_eq!(table.index(), table.columns());
    }

    #[test]
    fn text_in_value_area_is_rejected() {
        let format = LayoutFormat {
            separator: ',',
            header_rows: 1,
            index_cols: 1,
        };
        let err = LabelledBlock::parse("x,a\nr,oops\n", &format, "Y").unwrap_err();
        assert!(matches!(err, IngestError::StructureMismatch { .. }));
    }
}
