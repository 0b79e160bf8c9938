use std::collections::{BTreeMap, HashSet};

use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::model::index::{IndexLevel, Key, MultiIndex};
use crate::mrio::ingest::model::matrix::Matrix;

/// Axis selector for label operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Columns,
}

/// A row or column removed from a table together with the sum of its values.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedSlice {
    pub key: Key,
    pub total: f64,
}

/// Two-dimensional numeric table with labelled rows and columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    index: MultiIndex,
    columns: MultiIndex,
    values: Matrix,
}

impl Table {
    pub fn new(index: MultiIndex, columns: MultiIndex, values: Matrix) -> Result<Self> {
        if values.shape() != (index.len(), columns.len()) {
            return Err(IngestError::structure(
                "table",
                format!(
                    "values of shape {:?} do not fit {} rows x {} columns",
                    values.shape(),
                    index.len(),
                    columns.len()
                ),
            ));
        }
        Ok(Self {
            index,
            columns,
            values,
        })
    }

    pub fn zeros(index: MultiIndex, columns: MultiIndex) -> Self {
        let values = Matrix::zeros(index.len(), columns.len());
        Self {
            index,
            columns,
            values,
        }
    }

    pub fn index(&self) -> &MultiIndex {
        &self.index
    }

    pub fn columns(&self) -> &MultiIndex {
        &self.columns
    }

    pub fn values(&self) -> &Matrix {
        &self.values
    }

    pub fn into_values(self) -> Matrix {
        self.values
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub fn sum(&self) -> f64 {
        self.values.sum()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values.get(row, col)
    }

    /// Value addressed by row and column keys.
    pub fn get_by_key(&self, row: &[String], col: &[String]) -> Option<f64> {
        let r = self.index.position(row)?;
        let c = self.columns.position(col)?;
        Some(self.values.get(r, c))
    }

    pub fn with_index(self, index: MultiIndex) -> Result<Self> {
        Self::new(index, self.columns, self.values)
    }

    pub fn with_columns(self, columns: MultiIndex) -> Result<Self> {
        Self::new(self.index, columns, self.values)
    }

    pub fn with_values(&self, values: Matrix) -> Result<Self> {
        Self::new(self.index.clone(), self.columns.clone(), values)
    }

    pub fn transpose(&self) -> Self {
        Self {
            index: self.columns.clone(),
            columns: self.index.clone(),
            values: self.values.transpose(),
        }
    }

    pub fn take_rows(&self, positions: &[usize]) -> Result<Self> {
        Self::new(
            self.index.take(positions)?,
            self.columns.clone(),
            self.values.take_rows(positions),
        )
    }

    pub fn take_columns(&self, positions: &[usize]) -> Result<Self> {
        Self::new(
            self.index.clone(),
            self.columns.take(positions)?,
            self.values.take_cols(positions),
        )
    }

    /// Removes every row whose key matches `pred`, reporting what was lost.
    pub fn drop_rows<F>(&self, pred: F) -> Result<(Self, Vec<DroppedSlice>)>
    where
        F: Fn(&Key) -> bool,
    {
        let mut keep = Vec::with_capacity(self.index.len());
        let mut dropped = Vec::new();
        for (pos, key) in self.index.keys().iter().enumerate() {
            if pred(key) {
                dropped.push(DroppedSlice {
                    key: key.clone(),
                    total: self.values.row(pos).iter().sum(),
                });
            } else {
                keep.push(pos);
            }
        }
        Ok((self.take_rows(&keep)?, dropped))
    }

    /// Removes every column whose key matches `pred`, reporting what was lost.
    pub fn drop_columns<F>(&self, pred: F) -> Result<(Self, Vec<DroppedSlice>)>
    where
        F: Fn(&Key) -> bool,
    {
        let (transposed, dropped) = self.transpose().drop_rows(pred)?;
        Ok((transposed.transpose(), dropped))
    }

    pub fn rename_level(
        &self,
        axis: Axis,
        level: IndexLevel,
        map: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut out = self.clone();
        match axis {
            Axis::Rows => out.index = self.index.rename_level_values(level, map)?,
            Axis::Columns => out.columns = self.columns.rename_level_values(level, map)?,
        }
        Ok(out)
    }

    /// Reorders columns to `target`; columns absent from `self` are zero.
    pub fn reindex_columns(&self, target: &MultiIndex) -> Result<Self> {
        Ok(self.transpose().reindex_rows(target)?.transpose())
    }

    /// Reorders rows to `target`; rows absent from `self` are zero.
    pub fn reindex_rows(&self, target: &MultiIndex) -> Result<Self> {
        if target.names() != self.index.names() {
            return Err(IngestError::structure(
                "table",
                format!(
                    "cannot reindex {:?} rows with {:?}",
                    self.index.names(),
                    target.names()
                ),
            ));
        }
        let mut values = Matrix::zeros(target.len(), self.columns.len());
        for (r, key) in target.keys().iter().enumerate() {
            if let Some(src) = self.index.position(key) {
                for (c, value) in self.values.row(src).iter().enumerate() {
                    values.set(r, c, *value);
                }
            }
        }
        Self::new(target.clone(), self.columns.clone(), values)
    }

    /// Appends the rows of `other`, which must share the column index.
    pub fn append_rows(&self, other: &Table) -> Result<Self> {
        if self.columns != other.columns {
            return Err(IngestError::structure(
                "table",
                "cannot append rows with a different column index",
            ));
        }
        Self::new(
            self.index.append(&other.index)?,
            self.columns.clone(),
            self.values.vstack(&other.values)?,
        )
    }

    /// Sums the slices whose `level` value is one of `sources` into the slice
    /// with the same key but `level == target`, then drops the sources.
    ///
    /// The remaining levels of the key (typically `sector`) act as the join
    /// condition; a source slice without a matching target slice is an error.
    pub fn aggregate_into(
        &self,
        axis: Axis,
        level: IndexLevel,
        target: &str,
        sources: &[String],
    ) -> Result<Self> {
        if axis == Axis::Columns {
            return Ok(self
                .transpose()
                .aggregate_into(Axis::Rows, level, target, sources)?
                .transpose());
        }
        let level_pos = self.index.level_position(level).ok_or_else(|| {
            IngestError::structure("table", format!("no '{level}' level to aggregate"))
        })?;
        let sources: HashSet<&str> = sources.iter().map(String::as_str).collect();

        let mut values = self.values.clone();
        let mut keep = Vec::with_capacity(self.index.len());
        for (pos, key) in self.index.keys().iter().enumerate() {
            if !sources.contains(key[level_pos].as_str()) {
                keep.push(pos);
                continue;
            }
            let mut target_key = key.clone();
            target_key[level_pos] = target.to_string();
            let target_pos = self.index.position(&target_key).ok_or_else(|| {
                IngestError::structure(
                    "table",
                    format!("no counterpart {target_key:?} to aggregate {key:?} into"),
                )
            })?;
            for c in 0..values.cols() {
                let value = self.values.get(pos, c);
                values.add_at(target_pos, c, value);
            }
        }

        Self::new(
            self.index.take(&keep)?,
            self.columns.clone(),
            values.take_rows(&keep),
        )
    }
}

/// One unit string per index key.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitTable {
    index: MultiIndex,
    units: Vec<String>,
}

impl UnitTable {
    pub fn new(index: MultiIndex, units: Vec<String>) -> Result<Self> {
        if index.len() != units.len() {
            return Err(IngestError::structure(
                "unit",
                format!("{} units for {} index entries", units.len(), index.len()),
            ));
        }
        Ok(Self { index, units })
    }

    /// Same unit for every entry.
    pub fn uniform(index: MultiIndex, unit: &str) -> Self {
        let units = vec![unit.to_string(); index.len()];
        Self { index, units }
    }

    pub fn index(&self) -> &MultiIndex {
        &self.index
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn unit_of(&self, key: &[String]) -> Option<&str> {
        self.index.position(key).map(|pos| self.units[pos].as_str())
    }

    pub fn with_index(self, index: MultiIndex) -> Result<Self> {
        Self::new(index, self.units)
    }

    pub fn take(&self, positions: &[usize]) -> Result<Self> {
        Self::new(
            self.index.take(positions)?,
            positions.iter().map(|pos| self.units[*pos].clone()).collect(),
        )
    }

    pub fn append(&self, other: &UnitTable) -> Result<Self> {
        let mut units = self.units.clone();
        units.extend(other.units.iter().cloned());
        Self::new(self.index.append(&other.index)?, units)
    }

    pub fn map_units(self, f: impl Fn(&str) -> String) -> Self {
        let units = self.units.iter().map(|unit| f(unit)).collect();
        Self {
            index: self.index,
            units,
        }
    }

    pub fn rename_level(&self, level: IndexLevel, map: &BTreeMap<String, String>) -> Result<Self> {
        Self::new(
            self.index.rename_level_values(level, map)?,
            self.units.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrio::ingest::model::index::schema;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn square(regions: &[&str]) -> Table {
        let index =
            MultiIndex::from_product(schema::REGION_SECTOR, &[labels(regions), labels(&["a", "b"])])
                .unwrap();
        let n = index.len();
        let values = Matrix::new(n, n, (0..n * n).map(|v| v as f64).collect()).unwrap();
        Table::new(index.clone(), index, values).unwrap()
    }

    #[test]
    fn aggregation_conserves_total_flow() {
        let table = square(&["CHN", "CN1", "CN2"]);
        let before = table.sum();
        let sources = labels(&["CN1", "CN2"]);
        let rows = table
            .aggregate_into(Axis::Rows, IndexLevel::Region, "CHN", &sources)
            .unwrap();
        let both = rows
            .aggregate_into(Axis::Columns, IndexLevel::Region, "CHN", &sources)
            .unwrap();
        assert_eq!(both.shape(), (2, 2));
        assert!((both.sum() - before).abs() < 1e-9);
        assert_eq!(both.index(), both.columns());
    }

    #[test]
    fn dropped_rows_report_their_totals() {
        let table = square(&["AT"]);
        let (kept, dropped) = table.drop_rows(|key| key[1] == "b").unwrap();
        assert_eq!(kept.shape(), (1, 2));
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].total, 2.0 + 3.0);
    }

    #[test]
    fn reindex_fills_missing_columns_with_zero() {
        let table = square(&["AT"]);
        let target = MultiIndex::from_product(
            schema::REGION_SECTOR,
            &[labels(&["AT", "RoW"]), labels(&["a", "b"])],
        )
        .unwrap();
        let wide = table.reindex_columns(&target).unwrap();
        assert_eq!(wide.shape(), (2, 4));
        assert_eq!(wide.sum(), table.sum());
    }
}
