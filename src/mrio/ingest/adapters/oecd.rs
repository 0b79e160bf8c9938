//! OECD Inter-Country Input-Output tables (2016 and 2018 releases), one
//! comma separated file per year, optionally zipped.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, instrument};

use crate::mrio::ingest::adapters::{SourceAdapter, SourceKind, compile, finish, new_system};
use crate::mrio::ingest::config::OecdConfig;
use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::io::delimited::parse_number;
use crate::mrio::ingest::io::{Repository, read_grid};
use crate::mrio::ingest::model::{
    Axis, CanonicalSystem, Extension, IndexLevel, Key, Matrix, MultiIndex, Table, UnitTable,
    schema,
};
use crate::mrio::ingest::provenance::MetaField;

#[derive(Debug, Clone)]
pub struct OecdAdapter {
    config: OecdConfig,
    year: Option<String>,
    factor_input: Regex,
    final_demand: Regex,
    aggregations: Vec<(String, Regex)>,
    year_pattern: Regex,
}

impl OecdAdapter {
    pub fn new(config: OecdConfig) -> Result<Self> {
        let aggregations = config
            .aggregations
            .iter()
            .map(|(target, pattern)| Ok((target.clone(), compile(pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            factor_input: compile(&config.factor_input_pattern)?,
            final_demand: compile(&config.final_demand_pattern)?,
            year_pattern: compile(r"\d{4}")?,
            aggregations,
            config,
            year: None,
        })
    }

    /// Year used to pick the file when the location is a folder.
    pub fn with_year(mut self, year: impl ToString) -> Self {
        self.year = Some(year.to_string());
        self
    }

    fn resolve_file(&self, location: &Path) -> Result<PathBuf> {
        if !location.is_dir() {
            return Ok(location.to_path_buf());
        }
        let year = self.year.as_deref().ok_or_else(|| {
            IngestError::InvalidParameter(
                "no year specified (pass a specific file or a folder and a year)".into(),
            )
        })?;
        let stems: Vec<String> = self
            .config
            .file_prefixes
            .iter()
            .map(|prefix| format!("{prefix}{year}"))
            .collect();

        let mut candidates = Vec::new();
        for entry in fs::read_dir(location)? {
            let path = entry?.path();
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            let extension = path
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()));
            if let (Some(stem), Some(extension)) = (stem, extension) {
                if stems.contains(&stem) && self.config.file_extensions.contains(&extension) {
                    candidates.push((stem, path));
                }
            }
        }
        candidates.sort_by(|a, b| a.1.cmp(&b.1));
        let distinct: HashSet<&String> = candidates.iter().map(|(stem, _)| stem).collect();
        if distinct.len() > 1 {
            return Err(IngestError::InvalidParameter(format!(
                "multiple OECD files for {year} in {} (pass a specific file)",
                location.display()
            )));
        }
        candidates
            .into_iter()
            .next()
            .map(|(_, path)| path)
            .ok_or_else(|| IngestError::MissingSourceFile {
                table: format!("ICIO {year}"),
                location: location.to_path_buf(),
            })
    }

    fn split_label(&self, label: &str, table: &str) -> Result<Key> {
        label
            .split_once(self.config.label_separator)
            .map(|(region, rest)| vec![region.to_string(), rest.to_string()])
            .ok_or_else(|| {
                IngestError::structure(table, format!("label '{label}' has no region part"))
            })
    }
}

impl SourceAdapter for OecdAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Oecd
    }

    #[instrument(level = "info", skip_all, fields(location = %location.display()))]
    fn parse(&self, location: &Path) -> Result<CanonicalSystem> {
        let file = self.resolve_file(location)?;
        let (repo, member) = Repository::for_path(&file)?;
        let member = match member {
            Some(member) => member,
            None => repo
                .list()?
                .into_iter()
                .find(|name| name.to_ascii_lowercase().ends_with(".csv"))
                .ok_or_else(|| IngestError::MissingSourceFile {
                    table: "ICIO csv".into(),
                    location: file.clone(),
                })?,
        };
        let mut system = new_system(SourceKind::Oecd.name(), repo.location());

        let file_label = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let years: Vec<&str> = self
            .year_pattern
            .find_iter(&file_label)
            .map(|m| m.as_str())
            .collect();
        match years.as_slice() {
            [version, year, ..] => {
                system.meta.change_meta(MetaField::Version, format!("v{version}"));
                system.meta.change_meta(MetaField::Year, *year);
                system
                    .meta
                    .change_meta(MetaField::Description, format!("OECD ICIO for {year}"));
            }
            _ => {
                system.meta.change_meta(MetaField::Version, "n/a");
                system.meta.change_meta(MetaField::Year, "n/a");
                system
                    .meta
                    .change_meta(MetaField::Description, "OECD ICIO - year undefined");
            }
        }
        system.meta.change_meta(MetaField::System, "ixi");

        let grid = read_grid(&repo.read_text(&member)?, ',')?;
        system
            .meta
            .add_fileio(format!("OECD data parsed from {}", repo.describe(&member)));
        self.build(grid, &mut system)?;
        finish(system, SourceKind::Oecd)
    }
}

/// Parses an ICIO file, or the file for `year` inside a folder.
pub fn parse_oecd(path: &Path, year: Option<&str>, config: &OecdConfig) -> Result<CanonicalSystem> {
    let mut adapter = OecdAdapter::new(config.clone())?;
    if let Some(year) = year {
        adapter = adapter.with_year(year);
    }
    adapter.parse(path)
}

impl OecdAdapter {
    fn build(&self, grid: Vec<Vec<String>>, system: &mut CanonicalSystem) -> Result<()> {
        let cfg = &self.config;
        let (header, body) = grid
            .split_first()
            .ok_or_else(|| IngestError::structure("ICIO", "file is empty"))?;
        let col_labels: Vec<String> = header.iter().skip(1).cloned().collect();
        let row_labels: Vec<String> = body
            .iter()
            .map(|row| row.first().cloned().unwrap_or_default())
            .collect();

        let mut data = Vec::with_capacity(body.len() * col_labels.len());
        for (r, row) in body.iter().enumerate() {
            for c in 0..col_labels.len() {
                let raw = row.get(c + 1).map(String::as_str).unwrap_or("");
                data.push(parse_number(raw).ok_or_else(|| {
                    IngestError::structure(
                        "ICIO",
                        format!("non-numeric value '{raw}' in row {}", row_labels[r]),
                    )
                })?);
            }
        }
        let raw = Matrix::new(row_labels.len(), col_labels.len(), data)?;

        let mut cols: Vec<usize> = Vec::new();
        for (c, label) in col_labels.iter().enumerate() {
            if cfg.total_columns.contains(label) {
                let lost: f64 = (0..raw.rows()).map(|r| raw.get(r, c)).sum();
                system
                    .meta
                    .add_modify(format!("Removed total column {label} - losing {lost}"));
            } else {
                cols.push(c);
            }
        }
        let mut rows: Vec<usize> = Vec::new();
        for (r, label) in row_labels.iter().enumerate() {
            if cfg.total_rows.contains(label) {
                let lost: f64 = cols.iter().map(|c| raw.get(r, *c)).sum();
                system
                    .meta
                    .add_modify(format!("Removed total row {label} - losing {lost}"));
            } else {
                rows.push(r);
            }
        }

        let (factor_rows, z_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|r| self.factor_input.is_match(&row_labels[*r]));
        let (fd_cols, z_cols): (Vec<usize>, Vec<usize>) = cols
            .into_iter()
            .partition(|c| self.final_demand.is_match(&col_labels[*c]));

        let row_keys = z_rows
            .iter()
            .map(|r| self.split_label(&row_labels[*r], "Z"))
            .collect::<Result<Vec<_>>>()?;
        let sectors = MultiIndex::new(schema::REGION_SECTOR.to_vec(), row_keys)?;
        let col_index = MultiIndex::new(
            schema::REGION_SECTOR.to_vec(),
            z_cols
                .iter()
                .map(|c| self.split_label(&col_labels[*c], "Z"))
                .collect::<Result<Vec<_>>>()?,
        )?;
        if col_index.len() != sectors.len() {
            return Err(IngestError::structure(
                "Z",
                format!(
                    "{} interindustry rows but {} columns",
                    sectors.len(),
                    col_index.len()
                ),
            ));
        }
        let z_cols = sectors
            .keys()
            .iter()
            .map(|key| {
                col_index.position(key).map(|pos| z_cols[pos]).ok_or_else(|| {
                    IngestError::structure("Z", format!("no column for row {}", key.join("_")))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let regions: HashSet<String> = sectors.level_values(IndexLevel::Region).into_iter().collect();
        let fd_keys: Vec<Key> = fd_cols
            .iter()
            .map(|c| {
                let label = &col_labels[*c];
                match label.split_once(cfg.label_separator) {
                    None => vec![cfg.discrepancy_region.clone(), label.clone()],
                    // 2016 release writes CATEGORY_REGION
                    Some((first, second)) if regions.contains(second) => {
                        vec![second.to_string(), first.to_string()]
                    }
                    Some((first, second)) => vec![first.to_string(), second.to_string()],
                }
            })
            .collect();
        let categories = MultiIndex::new(schema::REGION_CATEGORY.to_vec(), fd_keys)?;
        let inputs = MultiIndex::single(
            IndexLevel::InputType,
            factor_rows.iter().map(|r| row_labels[*r].clone()),
        )?;

        let block = |rows: &[usize], cols: &[usize]| raw.take_rows(rows).take_cols(cols);
        let mut z = Table::new(sectors.clone(), sectors.clone(), block(&z_rows, &z_cols))?;
        let mut y = Table::new(sectors.clone(), categories.clone(), block(&z_rows, &fd_cols))?;
        let mut f = Table::new(inputs.clone(), sectors, block(&factor_rows, &z_cols))?;
        let f_y = Table::new(inputs.clone(), categories, block(&factor_rows, &fd_cols))?;
        debug!(z = ?z.shape(), y = ?y.shape(), f = ?f.shape(), "ICIO tables split");

        for (target, pattern) in &self.aggregations {
            let present = z.index().level_values(IndexLevel::Region);
            let sources: Vec<String> = present
                .iter()
                .filter(|region| pattern.is_match(region))
                .cloned()
                .collect();
            if sources.is_empty() || !present.contains(target) {
                continue;
            }
            z = z.aggregate_into(Axis::Rows, IndexLevel::Region, target, &sources)?;
            y = y.aggregate_into(Axis::Rows, IndexLevel::Region, target, &sources)?;
            z = z.aggregate_into(Axis::Columns, IndexLevel::Region, target, &sources)?;
            f = f.aggregate_into(Axis::Columns, IndexLevel::Region, target, &sources)?;
            system.meta.add_modify(format!(
                "Aggregated sub-regions {} into {target}",
                sources.join(", ")
            ));
        }

        system.unit = Some(UnitTable::uniform(z.index().clone(), &cfg.monetary_unit));
        system.z = Some(z);
        system.y = Some(y);
        let mut factor_inputs = Extension::new(
            "factor_inputs",
            f,
            UnitTable::uniform(inputs, &cfg.monetary_unit),
        );
        factor_inputs.f_y = Some(f_y);
        system.insert_extension(factor_inputs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(text: &str) -> Vec<Vec<String>> {
        read_grid(text, ',').unwrap()
    }

    #[test]
    fn reversed_final_demand_labels_are_swapped() {
        let adapter = OecdAdapter::new(OecdConfig::default()).unwrap();
        let text = "\
,AUT_C01,AUT_C02,HFCE_AUT,DISC,TOTAL
AUT_C01,1,2,3,0,6
AUT_C02,4,5,6,1,16
VALU,7,8,0,0,15
OUT,12,15,9,1,37
";
        let mut system = CanonicalSystem::default();
        adapter.build(grid(text), &mut system).unwrap();
        let y = system.y.unwrap();
        assert_eq!(
            y.columns().keys(),
            &[
                vec!["AUT".to_string(), "HFCE".to_string()],
                vec!["ALL".to_string(), "DISC".to_string()],
            ]
        );
        assert_eq!(system.meta.modifications().len(), 2);
        let f = &system.extensions["factor_inputs"];
        assert_eq!(f.f.as_ref().unwrap().values().data(), &[7.0, 8.0]);
    }
}
