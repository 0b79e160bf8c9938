//! Eora26: headerless tab separated matrices plus one label file per axis,
//! shipped as `Eora26_YYYY_{bp|pp}.zip` or extracted.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::mrio::ingest::adapters::{
    SourceAdapter, SourceKind, UNDEFINED_UNIT, compile, finish, new_system, pick_first,
};
use crate::mrio::ingest::config::EoraConfig;
use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::io::delimited::parse_number;
use crate::mrio::ingest::io::{Repository, read_grid};
use crate::mrio::ingest::model::{
    CanonicalSystem, Extension, IndexLevel, Key, Matrix, MultiIndex, Table, UnitTable, schema,
};
use crate::mrio::ingest::provenance::MetaField;

/// Which country labels to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountryNames {
    /// Eora flavoured ISO3 codes.
    #[default]
    Eora,
    Full,
}

impl FromStr for CountryNames {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('e') => Ok(CountryNames::Eora),
            Some('f') => Ok(CountryNames::Full),
            _ => Err(IngestError::InvalidParameter(format!(
                "country names must be eora or full, got '{value}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    /// Basic prices.
    #[default]
    Bp,
    /// Purchaser prices.
    Pp,
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceType::Bp => f.write_str("bp"),
            PriceType::Pp => f.write_str("pp"),
        }
    }
}

impl FromStr for PriceType {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bp" => Ok(PriceType::Bp),
            "pp" => Ok(PriceType::Pp),
            other => Err(IngestError::InvalidParameter(format!(
                "price type must be bp or pp, got '{other}'"
            ))),
        }
    }
}

// Columns of labels_T.txt and labels_FD.txt.
const FULL_NAME_COL: usize = 0;
const EORA_CODE_COL: usize = 1;
const NAME_COL: usize = 3;

#[derive(Debug, Clone)]
pub struct EoraAdapter {
    config: EoraConfig,
    year: Option<String>,
    price: PriceType,
    country_names: CountryNames,
}

/// Labels of one axis and which of its entries belong to the rest of world.
struct AxisLabels {
    index: MultiIndex,
    rest_of_world: Vec<bool>,
}

impl EoraAdapter {
    pub fn new(config: EoraConfig) -> Self {
        Self {
            config,
            year: None,
            price: PriceType::Bp,
            country_names: CountryNames::Eora,
        }
    }

    pub fn with_year(mut self, year: impl ToString) -> Self {
        self.year = Some(year.to_string());
        self
    }

    pub fn with_price(mut self, price: PriceType) -> Self {
        self.price = price;
        self
    }

    pub fn with_country_names(mut self, names: CountryNames) -> Self {
        self.country_names = names;
        self
    }

    /// Repository plus the year and price it holds.
    fn resolve(&self, location: &Path) -> Result<(Repository, String, PriceType)> {
        let file_label = location
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if file_label.to_ascii_lowercase().ends_with(".zip") {
            let year = compile(r"\d{4}")?
                .find(&file_label)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    IngestError::InvalidParameter(format!("no year in the name {file_label}"))
                })?;
            let price = compile("bp|pp")?
                .find(&file_label)
                .map(|m| m.as_str().parse::<PriceType>())
                .transpose()?
                .ok_or_else(|| {
                    IngestError::InvalidParameter(format!("no price type in the name {file_label}"))
                })?;
            return Ok((Repository::open(location)?, year, price));
        }

        let year = self.year.clone().ok_or_else(|| {
            IngestError::InvalidParameter(
                "no year given (pass an Eora zip file or a folder and a year)".into(),
            )
        })?;
        let mut folder = location.to_path_buf();
        if folder.join(&year).is_dir() {
            folder = folder.join(&year);
        }
        let price = self.price.to_string();
        let mut archives = Vec::new();
        for entry in fs::read_dir(&folder)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.ends_with(".zip") && name.contains(&year) && name.contains(&price) {
                archives.push(name);
            }
        }
        archives.sort();
        match archives.as_slice() {
            [] => Ok((Repository::Directory(folder), year, self.price)),
            [archive] => Ok((Repository::Archive(folder.join(archive)), year, self.price)),
            several => Err(IngestError::InvalidParameter(format!(
                "multiple Eora files for {year} {price}: {}",
                several.join(", ")
            ))),
        }
    }

    fn member(&self, repo: &Repository, name: &str, system: &mut CanonicalSystem) -> Result<String> {
        pick_first(name, repo.find_named(name)?, system).ok_or_else(|| {
            IngestError::MissingSourceFile {
                table: name.to_string(),
                location: repo.location().to_path_buf(),
            }
        })
    }

    fn read_rows(
        &self,
        repo: &Repository,
        name: &str,
        system: &mut CanonicalSystem,
    ) -> Result<Vec<Vec<String>>> {
        let member = self.member(repo, name, system)?;
        let rows = read_grid(&repo.read_text(&member)?, self.config.separator)?;
        system
            .meta
            .add_fileio(format!("{name} parsed from {}", repo.describe(&member)));
        Ok(rows)
    }

    fn data_file(&self, key: &str, year: &str, price: PriceType) -> Result<String> {
        let template = self.config.data_files.get(key).ok_or_else(|| {
            IngestError::InvalidParameter(format!("no Eora file name configured for {key}"))
        })?;
        Ok(template
            .replace("{year}", year)
            .replace("{price}", &price.to_string()))
    }

    fn label_file(&self, key: &str) -> Result<&str> {
        self.config
            .label_files
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| IngestError::InvalidParameter(format!("no Eora label file configured for {key}")))
    }

    /// Region/sector (or region/category) labels.
    fn region_labels(&self, rows: &[Vec<String>], names: &[IndexLevel]) -> Result<AxisLabels> {
        let region_col = match self.country_names {
            CountryNames::Eora => EORA_CODE_COL,
            CountryNames::Full => FULL_NAME_COL,
        };
        let cell = |row: &Vec<String>, col: usize| row.get(col).cloned().unwrap_or_default();
        let keys: Vec<Key> = rows
            .iter()
            .map(|row| vec![cell(row, region_col), cell(row, NAME_COL)])
            .collect();
        let rest_of_world = rows
            .iter()
            .map(|row| cell(row, EORA_CODE_COL) == self.config.rest_of_world)
            .collect();
        Ok(AxisLabels {
            index: MultiIndex::new(names.to_vec(), keys)?,
            rest_of_world,
        })
    }

    /// Drops rest-of-world rows and columns, one modify entry per axis.
    fn drop_rest_of_world(
        &self,
        table: &str,
        values: Matrix,
        rows: &AxisLabels,
        cols: &AxisLabels,
        system: &mut CanonicalSystem,
    ) -> Result<Table> {
        let keep = |flags: &[bool]| -> Vec<usize> {
            flags
                .iter()
                .enumerate()
                .filter(|(_, dropped)| !**dropped)
                .map(|(pos, _)| pos)
                .collect()
        };
        let rest = &self.config.rest_of_world;

        let dropped_cols: Vec<usize> = (0..values.cols()).filter(|c| cols.rest_of_world[*c]).collect();
        if !dropped_cols.is_empty() {
            let lost: f64 = (0..values.rows())
                .flat_map(|r| dropped_cols.iter().map(move |c| (r, *c)))
                .map(|(r, c)| values.get(r, c))
                .sum();
            system.meta.add_modify(format!(
                "Removed rest of the world ({rest}) columns from {table} - losing {lost}"
            ));
        }
        let col_keep = keep(&cols.rest_of_world);

        let dropped_rows: Vec<usize> = (0..values.rows()).filter(|r| rows.rest_of_world[*r]).collect();
        if !dropped_rows.is_empty() {
            let lost: f64 = dropped_rows
                .iter()
                .flat_map(|r| col_keep.iter().map(move |c| (*r, *c)))
                .map(|(r, c)| values.get(r, c))
                .sum();
            system.meta.add_modify(format!(
                "Removed rest of the world ({rest}) rows from {table} - losing {lost}"
            ));
        }
        let row_keep = keep(&rows.rest_of_world);

        Table::new(
            rows.index.take(&row_keep)?,
            cols.index.take(&col_keep)?,
            values.take_rows(&row_keep).take_cols(&col_keep),
        )
    }

    fn read_matrix(
        &self,
        repo: &Repository,
        key: &str,
        year: &str,
        price: PriceType,
        shape: (usize, usize),
        system: &mut CanonicalSystem,
    ) -> Result<Matrix> {
        let name = self.data_file(key, year, price)?;
        let rows = self.read_rows(repo, &name, system)?;
        let (n_rows, n_cols) = shape;
        let rows: Vec<&Vec<String>> = rows
            .iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();
        if rows.len() != n_rows {
            return Err(IngestError::structure(
                key,
                format!("{} rows for {n_rows} labels", rows.len()),
            ));
        }
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (r, row) in rows.iter().enumerate() {
            if row.len() < n_cols {
                return Err(IngestError::structure(
                    key,
                    format!("row {r} has {} values for {n_cols} labels", row.len()),
                ));
            }
            for cell in &row[..n_cols] {
                data.push(parse_number(cell).ok_or_else(|| {
                    IngestError::structure(key, format!("non-numeric value '{cell}' in row {r}"))
                })?);
            }
        }
        debug!(table = key, rows = n_rows, cols = n_cols, "Eora matrix read");
        Matrix::new(n_rows, n_cols, data)
    }
}

impl SourceAdapter for EoraAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Eora26
    }

    #[instrument(level = "info", skip_all, fields(location = %location.display()))]
    fn parse(&self, location: &Path) -> Result<CanonicalSystem> {
        let (repo, year, price) = self.resolve(location)?;
        let mut system = new_system(SourceKind::Eora26.name(), location);
        system.meta.change_meta(MetaField::Year, year.clone());
        system
            .meta
            .change_meta(MetaField::Description, format!("Eora26 {year} in {price}"));

        let sector_rows = self.read_rows(&repo, self.label_file("Z")?, &mut system)?;
        let sectors = self.region_labels(&sector_rows, schema::REGION_SECTOR)?;
        let category_rows = self.read_rows(&repo, self.label_file("Y")?, &mut system)?;
        let categories = self.region_labels(&category_rows, schema::REGION_CATEGORY)?;

        let unit_pattern: Regex = compile(r"\((.*)\)")?;
        let strip_pattern: Regex = compile(r"\s\((.*)\)")?;
        let q_rows = self.read_rows(&repo, self.label_file("Q")?, &mut system)?;
        let mut q_keys = Vec::with_capacity(q_rows.len());
        let mut q_units = Vec::with_capacity(q_rows.len());
        for row in &q_rows {
            let raw = row.first().cloned().unwrap_or_default();
            let unit = unit_pattern
                .captures(&raw)
                .and_then(|caps| caps.get(1))
                .map_or_else(|| UNDEFINED_UNIT.to_string(), |m| m.as_str().to_string());
            let stressor = strip_pattern.replace(&raw, "").into_owned();
            q_keys.push(vec![stressor, row.get(1).cloned().unwrap_or_default()]);
            q_units.push(unit);
        }
        let stressors = AxisLabels {
            rest_of_world: vec![false; q_keys.len()],
            index: MultiIndex::new(schema::STRESSOR_SOURCE.to_vec(), q_keys)?,
        };

        let va_rows = self.read_rows(&repo, self.label_file("VA")?, &mut system)?;
        let va_keys: Vec<Key> = va_rows
            .iter()
            .map(|row| {
                vec![
                    row.first().cloned().unwrap_or_default(),
                    row.get(1).cloned().unwrap_or_default(),
                ]
            })
            .collect();
        let inputs = AxisLabels {
            rest_of_world: vec![false; va_keys.len()],
            index: MultiIndex::new(schema::INPUTTYPE_CATEGORY.to_vec(), va_keys)?,
        };

        let n_sectors = sectors.index.len();
        let n_categories = categories.index.len();
        let n_stressors = stressors.index.len();
        let n_inputs = inputs.index.len();

        let z = self.read_matrix(&repo, "Z", &year, price, (n_sectors, n_sectors), &mut system)?;
        let z = self.drop_rest_of_world("Z", z, &sectors, &sectors, &mut system)?;
        let y = self.read_matrix(&repo, "Y", &year, price, (n_sectors, n_categories), &mut system)?;
        let y = self.drop_rest_of_world("Y", y, &sectors, &categories, &mut system)?;
        let q = self.read_matrix(&repo, "Q", &year, price, (n_stressors, n_sectors), &mut system)?;
        let q = self.drop_rest_of_world("Q", q, &stressors, &sectors, &mut system)?;
        let qy = self.read_matrix(&repo, "QY", &year, price, (n_stressors, n_categories), &mut system)?;
        let qy = self.drop_rest_of_world("QY", qy, &stressors, &categories, &mut system)?;
        let va = self.read_matrix(&repo, "VA", &year, price, (n_inputs, n_sectors), &mut system)?;
        let va = self.drop_rest_of_world("VA", va, &inputs, &sectors, &mut system)?;

        let monetary_unit = &self.config.monetary_unit;
        system
            .meta
            .note(format!("Set Eora monetary units to {monetary_unit} manually"));
        system.unit = Some(UnitTable::uniform(z.index().clone(), monetary_unit));
        system.z = Some(z);
        system.y = Some(y);

        let q_unit = UnitTable::new(q.index().clone(), q_units)?;
        let mut q_extension = Extension::new("Q", q, q_unit);
        q_extension.f_y = Some(qy);
        system.insert_extension(q_extension);
        let va_unit = UnitTable::uniform(va.index().clone(), monetary_unit);
        system.insert_extension(Extension::new("VA", va, va_unit));

        finish(system, SourceKind::Eora26)
    }
}

/// Parses Eora26 from a zip file, or from a folder given `year`.
pub fn parse_eora26(
    path: &Path,
    year: Option<&str>,
    price: PriceType,
    country_names: CountryNames,
    config: &EoraConfig,
) -> Result<CanonicalSystem> {
    let mut adapter = EoraAdapter::new(config.clone())
        .with_price(price)
        .with_country_names(country_names);
    if let Some(year) = year {
        adapter = adapter.with_year(year);
    }
    adapter.parse(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_accept_first_letters() {
        assert_eq!("Full".parse::<CountryNames>().unwrap(), CountryNames::Full);
        assert_eq!("e".parse::<CountryNames>().unwrap(), CountryNames::Eora);
        assert!("iso".parse::<CountryNames>().is_err());
        assert_eq!("PP".parse::<PriceType>().unwrap(), PriceType::Pp);
    }

    #[test]
    fn rest_of_world_is_found_by_code_in_both_namings() {
        let rows: Vec<Vec<String>> = [
            ["Austria", "AUT", "Industries", "Agriculture"],
            ["Rest of the World", "ROW", "Industries", "Total"],
        ]
        .iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
        for names in [CountryNames::Eora, CountryNames::Full] {
            let adapter = EoraAdapter::new(EoraConfig::default()).with_country_names(names);
            let labels = adapter.region_labels(&rows, schema::REGION_SECTOR).unwrap();
            assert_eq!(labels.rest_of_world, vec![false, true]);
        }
    }
}
