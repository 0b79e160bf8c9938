//! World Input-Output Database: one workbook per year plus optional
//! socio-economic (SEA) and environmental accounts next to it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::mrio::ingest::adapters::{
    SourceAdapter, SourceKind, UNDEFINED_UNIT, finish, new_system, pick_first,
};
use crate::mrio::ingest::config::{WiodConfig, WiodEnvExtension};
use crate::mrio::ingest::error::{IngestError, ParseWarning, Result};
use crate::mrio::ingest::io::repository::file_name;
use crate::mrio::ingest::io::{Cell, Grid, Repository, Workbook};
use crate::mrio::ingest::model::{
    CanonicalSystem, Extension, IndexLevel, Matrix, MultiIndex, Table, UnitTable, schema,
};
use crate::mrio::ingest::provenance::MetaField;

/// Naming scheme for sectors and final demand categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameScheme {
    /// ISIC rev. 3 codes (sectors only; categories fall back to c-codes).
    Isic,
    /// WIOD specific `cNN` numbers.
    CCodes,
    /// Full names.
    Full,
}

impl FromStr for NameScheme {
    type Err = IngestError;

    /// Case insensitive, the first letter suffices.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('i') => Ok(NameScheme::Isic),
            Some('c') => Ok(NameScheme::CCodes),
            Some('f') => Ok(NameScheme::Full),
            _ => Err(IngestError::InvalidParameter(format!(
                "'{value}' is not a WIOD naming scheme (isic, c_codes or full)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WiodAdapter {
    config: WiodConfig,
    year: Option<String>,
    sector_names: NameScheme,
    category_names: NameScheme,
}

impl WiodAdapter {
    pub fn new(config: WiodConfig) -> Self {
        Self {
            config,
            year: None,
            sector_names: NameScheme::Isic,
            category_names: NameScheme::CCodes,
        }
    }

    /// Year used to pick `wiotYY*.xlsx` when the location is a folder.
    pub fn with_year(mut self, year: impl ToString) -> Self {
        self.year = Some(year.to_string());
        self
    }

    pub fn with_names(mut self, sectors: NameScheme, categories: NameScheme) -> Self {
        self.sector_names = sectors;
        self.category_names = categories;
        self
    }
}

impl SourceAdapter for WiodAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Wiod
    }

    #[instrument(level = "info", skip_all, fields(location = %location.display()))]
    fn parse(&self, location: &Path) -> Result<CanonicalSystem> {
        let workbook_path = self.resolve_workbook(location)?;
        let root = workbook_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut system = new_system(SourceKind::Wiod.name(), &root);

        let bytes = fs::read(&workbook_path)?;
        let mut workbook = Workbook::from_bytes(&workbook_path.display().to_string(), bytes)?;
        let grid = workbook.sheet_at(0)?;
        system
            .meta
            .add_fileio(format!("WIOD data parsed from {}", workbook_path.display()));

        let core = self.read_core(grid, &mut system)?;
        let sectors = core.z.columns().clone();
        let categories = core.y.columns().clone();

        system.z = Some(core.z);
        system.y = Some(core.y);
        system.unit = Some(UnitTable::uniform(sectors.clone(), &core.unit));
        let factor_unit = UnitTable::uniform(core.f.index().clone(), &core.unit);
        let mut factor_inputs = Extension::new("factor_inputs", core.f, factor_unit);
        factor_inputs.f_y = Some(core.f_y);
        system.insert_extension(factor_inputs);

        // Extensions use ROU, so regions are fixed before they are read.
        system.rename_regions(&self.config.region_renames)?;
        let sectors = system.z.as_ref().map_or(sectors, |z| z.columns().clone());
        let categories = system.y.as_ref().map_or(categories, |y| y.columns().clone());

        if let Some(sea) = self.sea_extension(&root, &core.year, &sectors, &categories, &mut system)? {
            system.insert_extension(sea);
        }
        for spec in &self.config.environmental {
            if let Some(extension) = self.environmental_extension(
                &root,
                &core.year,
                spec,
                &sectors,
                &categories,
                &mut system,
            )? {
                system.insert_extension(extension);
            }
        }

        let sector_map = match self.sector_names {
            NameScheme::Isic => BTreeMap::new(),
            NameScheme::CCodes => core.lookup.code_to_c_code,
            NameScheme::Full => core.lookup.code_to_name,
        };
        system.rename_sectors(&sector_map)?;
        if self.category_names == NameScheme::Full {
            system.rename_categories(&core.lookup.category_to_name)?;
        }

        finish(system, SourceKind::Wiod)
    }
}

/// Parses a WIOD workbook (or the `wiotYY` workbook for `year` in a folder).
pub fn parse_wiod(path: &Path, year: Option<&str>, config: &WiodConfig) -> Result<CanonicalSystem> {
    let mut adapter = WiodAdapter::new(config.clone());
    if let Some(year) = year {
        adapter = adapter.with_year(year);
    }
    adapter.parse(path)
}

struct CoreTables {
    z: Table,
    y: Table,
    f: Table,
    f_y: Table,
    unit: String,
    year: String,
    lookup: Lookup,
}

#[derive(Default)]
struct Lookup {
    code_to_c_code: BTreeMap<String, String>,
    code_to_name: BTreeMap<String, String>,
    category_to_name: BTreeMap<String, String>,
}

/// The last `count` characters of `text`, or all of it when shorter.
fn trailing_chars(text: &str, count: usize) -> &str {
    match text.char_indices().rev().nth(count.saturating_sub(1)) {
        Some((start, _)) if count > 0 => &text[start..],
        Some(_) => "",
        None => text,
    }
}

fn strip_parens(text: &str) -> String {
    text.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .to_string()
}

impl WiodAdapter {
    fn resolve_workbook(&self, location: &Path) -> Result<PathBuf> {
        let suffix = &self.config.workbook_suffix;
        if location.is_file() {
            return Ok(location.to_path_buf());
        }
        if !location.is_dir() {
            let with_suffix = PathBuf::from(format!("{}{suffix}", location.display()));
            if with_suffix.is_file() {
                return Ok(with_suffix);
            }
            return Err(IngestError::MissingSourceFile {
                table: "WIOT".into(),
                location: location.to_path_buf(),
            });
        }

        let year = self.year.as_deref().ok_or_else(|| {
            IngestError::InvalidParameter(
                "no year given (pass a workbook or a folder and a year)".into(),
            )
        })?;
        let two_digit = trailing_chars(year, 2);
        let start = format!("{}{two_digit}", self.config.workbook_prefix);
        let mut candidates: Vec<String> = list_dir(location)?
            .into_iter()
            .filter(|name| name.starts_with(&start) && name.ends_with(suffix.as_str()))
            .collect();
        candidates.sort();
        match candidates.as_slice() {
            [single] => Ok(location.join(single)),
            [] => Err(IngestError::MissingSourceFile {
                table: format!("WIOT {year}"),
                location: location.to_path_buf(),
            }),
            several => Err(IngestError::InvalidParameter(format!(
                "several WIOD workbooks for {year}: {} (pass the file instead)",
                several.join(", ")
            ))),
        }
    }

    fn read_core(&self, mut grid: Grid, system: &mut CanonicalSystem) -> Result<CoreTables> {
        let cfg = &self.config;
        let year_cell = grid.text(cfg.meta_year_row, 0);
        let year = trailing_chars(year_cell.trim_end(), 4).to_string();
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IngestError::format(
                "WIOT",
                format!("no year at the end of the title cell '{year_cell}'"),
            ));
        }
        let io_system = strip_parens(&grid.text(cfg.meta_system_row, 0));
        let unit = strip_parens(&grid.text(cfg.meta_unit_row, 0));
        system.meta.change_meta(MetaField::Year, year.clone());
        system.meta.change_meta(MetaField::System, io_system);

        // Metadata overlaps the header block in column 0.
        for row in 0..=cfg.meta_unit_row.max(cfg.meta_system_row).max(cfg.meta_year_row) {
            grid.set(row, 0, Cell::Empty);
        }
        let grid = grid.skip_rows(cfg.empty_top_rows);
        let header_end = cfg.code_pos.max(cfg.name_pos).max(cfg.region_pos).max(cfg.c_code_pos) + 1;

        let mut n_cols = grid.cols();
        if cfg.drop_total_column && n_cols > header_end {
            let total_col = n_cols - 1;
            let lost: f64 = (header_end..grid.rows())
                .filter_map(|row| grid.number(row, total_col))
                .sum();
            system.meta.add_modify(format!(
                "Removed total column '{}' - losing {lost}",
                grid.text(cfg.c_code_pos, total_col)
            ));
            n_cols = total_col;
        }

        let marker = cfg.last_interindustry_code.as_str();
        let last_row = (header_end..grid.rows())
            .filter(|row| grid.text(*row, cfg.c_code_pos) == marker)
            .last();
        let last_col = (header_end..n_cols)
            .filter(|col| grid.text(cfg.c_code_pos, *col) == marker)
            .last();
        let (last_row, last_col) = match (last_row, last_col) {
            (Some(row), Some(col)) => (row, col),
            _ => {
                return Err(IngestError::structure(
                    "Z",
                    format!("last interindustry marker '{marker}' not found on both axes"),
                ));
            }
        };
        if last_row != last_col {
            return Err(IngestError::structure(
                "Z",
                format!(
                    "interindustry block is not symmetric ({} rows, {} columns)",
                    last_row + 1 - header_end,
                    last_col + 1 - header_end
                ),
            ));
        }

        let z_rows: Vec<usize> = (header_end..=last_row).collect();
        let z_cols: Vec<usize> = (header_end..=last_col).collect();
        let y_cols: Vec<usize> = (last_col + 1..n_cols).collect();

        let row_keys = |rows: &[usize]| -> Vec<Vec<String>> {
            rows.iter()
                .map(|row| vec![grid.text(*row, cfg.region_pos), grid.text(*row, cfg.code_pos)])
                .collect()
        };
        let sector_index = MultiIndex::new(schema::REGION_SECTOR.to_vec(), row_keys(&z_rows))?;
        let column_keys: Vec<Vec<String>> = z_cols
            .iter()
            .map(|col| vec![grid.text(cfg.region_pos, *col), grid.text(cfg.code_pos, *col)])
            .collect();
        if column_keys.as_slice() != sector_index.keys() {
            return Err(IngestError::structure(
                "Z",
                "row and column labels of the interindustry block differ",
            ));
        }
        let category_index = MultiIndex::new(
            schema::REGION_CATEGORY.to_vec(),
            y_cols
                .iter()
                .map(|col| vec![grid.text(cfg.region_pos, *col), grid.text(cfg.c_code_pos, *col)])
                .collect(),
        )?;

        let mut factor_rows = Vec::new();
        for row in last_row + 1..grid.rows() {
            if grid.row_is_empty(row) {
                continue;
            }
            let c_code = grid.text(row, cfg.c_code_pos);
            if cfg.factor_input_totals.contains(&c_code) {
                let lost: f64 = (header_end..n_cols)
                    .filter_map(|col| grid.number(row, col))
                    .sum();
                system.meta.add_modify(format!(
                    "Removed factor input total {c_code} ({}) - losing {lost}",
                    grid.text(row, cfg.name_pos)
                ));
                continue;
            }
            factor_rows.push(row);
        }
        let factor_index = MultiIndex::new(
            schema::INPUTTYPE.to_vec(),
            factor_rows
                .iter()
                .map(|row| vec![grid.text(*row, cfg.name_pos)])
                .collect(),
        )?;

        let block = |rows: &[usize], cols: &[usize], table: &str| -> Result<Matrix> {
            let mut data = Vec::with_capacity(rows.len() * cols.len());
            for row in rows {
                for col in cols {
                    data.push(cell_value(&grid, *row, *col, table)?);
                }
            }
            Matrix::new(rows.len(), cols.len(), data)
        };

        let z = Table::new(sector_index.clone(), sector_index.clone(), block(&z_rows, &z_cols, "Z")?)?;
        let y = Table::new(sector_index.clone(), category_index.clone(), block(&z_rows, &y_cols, "Y")?)?;
        let f = Table::new(factor_index.clone(), sector_index, block(&factor_rows, &z_cols, "factor_inputs")?)?;
        let f_y = Table::new(factor_index, category_index, block(&factor_rows, &y_cols, "factor_inputs")?)?;
        debug!(z = ?z.shape(), y = ?y.shape(), f = ?f.shape(), "WIOD core tables");

        let mut lookup = Lookup::default();
        for row in &z_rows {
            let code = grid.text(*row, cfg.code_pos);
            lookup
                .code_to_c_code
                .entry(code.clone())
                .or_insert_with(|| grid.text(*row, cfg.c_code_pos));
            lookup
                .code_to_name
                .entry(code)
                .or_insert_with(|| grid.text(*row, cfg.name_pos));
        }
        for col in &y_cols {
            lookup
                .category_to_name
                .entry(grid.text(cfg.c_code_pos, *col))
                .or_insert_with(|| grid.text(cfg.name_pos, *col));
        }

        Ok(CoreTables {
            z,
            y,
            f,
            f_y,
            unit,
            year,
            lookup,
        })
    }

    /// Employment accounts of the socio-economic accounts workbook.
    fn sea_extension(
        &self,
        root: &Path,
        year: &str,
        sectors: &MultiIndex,
        categories: &MultiIndex,
        system: &mut CanonicalSystem,
    ) -> Result<Option<Extension>> {
        let cfg = &self.config.sea;
        let unavailable = |system: &mut CanonicalSystem, reason: String| -> Result<Option<Extension>> {
            system.warn(ParseWarning::ExtensionUnavailable {
                extension: "SEA".into(),
                reason,
            });
            Ok(None)
        };

        let folder = if root.join(&cfg.folder).is_dir() {
            root.join(&cfg.folder)
        } else {
            root.to_path_buf()
        };
        let mut candidates: Vec<String> = list_dir(&folder)?
            .into_iter()
            .filter(|name| name.starts_with(&cfg.prefix) && name.ends_with(&cfg.suffix))
            .collect();
        candidates.sort();
        let Some(file) = candidates.first() else {
            return unavailable(system, "SEA workbook not found".into());
        };
        let path = folder.join(file);
        let mut workbook = Workbook::from_bytes(file, fs::read(&path)?)?;
        let grid = workbook.sheet(&cfg.sheet)?;

        let column = |name: &str| grid.find_in_row(0, name);
        let (Some(country_col), Some(variable_col), Some(code_col)) =
            (column("Country"), column("Variable"), column("Code"))
        else {
            return Err(IngestError::structure(
                "SEA",
                "expected Country, Variable and Code columns",
            ));
        };
        let Some(year_col) =
            (0..grid.cols()).find(|col| grid.text(0, *col).trim_start_matches('_') == year)
        else {
            return unavailable(system, format!("no data for {year}"));
        };

        let variables: Vec<String> = cfg.variables.iter().map(|(var, _)| var.clone()).collect();
        let mut values: HashMap<(String, String, String), f64> = HashMap::new();
        let mut has_row = false;
        for row in 1..grid.rows() {
            let variable = grid.text(row, variable_col);
            let code = grid.text(row, code_col);
            if !variables.contains(&variable) || code == cfg.total_code {
                continue;
            }
            let country = grid.text(row, country_col);
            has_row |= country == cfg.rest_of_world;
            let value = grid.number(row, year_col).unwrap_or(0.0);
            values.insert((variable, country, code), value);
        }
        system
            .meta
            .add_fileio(format!("SEA file extension parsed from {}", path.display()));
        if !has_row {
            system.meta.note(format!(
                "SEA carries no {} rows, filled with zeros",
                cfg.rest_of_world
            ));
        }

        let index = MultiIndex::single(IndexLevel::InputType, variables.iter().cloned())?;
        let f = fill_table(&index, sectors, |stressor, key| {
            values
                .get(&(stressor.to_string(), key[0].clone(), key[1].clone()))
                .copied()
        })?;
        let units = cfg.variables.iter().map(|(_, unit)| unit.clone()).collect();
        let mut extension = Extension::new("SEA", f, UnitTable::new(index.clone(), units)?);
        extension.f_y = Some(Table::zeros(index, categories.clone()));
        Ok(Some(extension))
    }

    /// One environmental account: a folder or archive with one workbook per
    /// country and one sheet per year.
    fn environmental_extension(
        &self,
        root: &Path,
        year: &str,
        spec: &WiodEnvExtension,
        sectors: &MultiIndex,
        categories: &MultiIndex,
        system: &mut CanonicalSystem,
    ) -> Result<Option<Extension>> {
        let cfg = &self.config;
        let unavailable = |system: &mut CanonicalSystem, reason: String| -> Result<Option<Extension>> {
            system.warn(ParseWarning::ExtensionUnavailable {
                extension: spec.key.clone(),
                reason,
            });
            Ok(None)
        };

        let mut stems: Vec<String> = list_dir(root)?
            .into_iter()
            .filter(|name| name.starts_with(&spec.prefix))
            .map(|name| name.trim_end_matches(".zip").to_string())
            .collect();
        stems.sort();
        stems.dedup();
        let Some(stem) = pick_first(&spec.key, stems, system) else {
            return unavailable(system, format!("no data starting with {}", spec.prefix));
        };
        let repo = Repository::open(&root.join(&stem))?;
        let members: Vec<String> = repo
            .list()?
            .into_iter()
            .filter(|member| member.ends_with(&spec.file_suffix))
            .collect();

        let upper_case = spec.prefix.chars().next().is_some_and(char::is_uppercase);
        let sector_col = usize::from(upper_case);
        let regions = sectors.level_values(IndexLevel::Region);

        let mut stressors: Vec<String> = Vec::new();
        let mut header_unit: Option<String> = None;
        let mut flows: HashMap<(String, String, String), f64> = HashMap::new();
        let mut household: HashMap<(String, String), f64> = HashMap::new();

        for region in &regions {
            let matching: Vec<String> = members
                .iter()
                .filter(|member| {
                    let name = file_name(member);
                    name.starts_with(&region.to_uppercase()) || name.starts_with(&region.to_lowercase())
                })
                .cloned()
                .collect();
            let Some(member) =
                pick_first(&format!("{} {region}", spec.key), matching, system)
            else {
                return unavailable(system, format!("country data missing for {region}"));
            };
            let mut workbook = Workbook::from_bytes(&member, repo.read(&member)?)?;
            if !workbook.has_sheet(year) {
                return unavailable(system, format!("no sheet for {year}"));
            }
            let grid = workbook.sheet(year)?;
            system
                .meta
                .add_fileio(format!("{} {region} parsed from {}", spec.key, repo.describe(&member)));

            if let Cell::Text(unit) = grid.get(0, 0) {
                header_unit.get_or_insert_with(|| unit.clone());
            }
            let data_start = sector_col + 1;
            let columns: Vec<(usize, String)> = (data_start..grid.cols())
                .map(|col| (col, grid.text(0, col)))
                .take_while(|(_, name)| !name.is_empty())
                .collect();
            for (_, name) in &columns {
                if !stressors.contains(name) {
                    stressors.push(name.clone());
                }
            }

            for row in 1..grid.rows() {
                let label = grid.text(row, sector_col);
                if label.is_empty() || cfg.environmental_drop_rows.contains(&label) {
                    continue;
                }
                let sector = label.replace(&cfg.environmental_sector_prefix, "");
                for (col, stressor) in &columns {
                    let value = grid.number(row, *col).unwrap_or(0.0);
                    if sector == cfg.household_column {
                        household.insert((stressor.clone(), region.clone()), value);
                    } else {
                        flows.insert((stressor.clone(), region.clone(), sector.clone()), value);
                    }
                }
            }
        }

        let index = MultiIndex::single(IndexLevel::Stressor, stressors.iter().cloned())?;
        let f = fill_table(&index, sectors, |stressor, key| {
            flows
                .get(&(stressor.to_string(), key[0].clone(), key[1].clone()))
                .copied()
        })?;
        let f_y = fill_table(&index, categories, |stressor, key| {
            if key[1] != cfg.household_category {
                return None;
            }
            household
                .get(&(stressor.to_string(), key[0].clone()))
                .copied()
        })?;
        let units = stressors
            .iter()
            .map(|stressor| {
                spec.units
                    .get(stressor)
                    .cloned()
                    .or_else(|| header_unit.clone())
                    .or_else(|| spec.default_unit.clone())
                    .unwrap_or_else(|| UNDEFINED_UNIT.to_string())
            })
            .collect();
        system.meta.add_fileio(format!(
            "Extension {} parsed from {}",
            spec.key,
            repo.location().display()
        ));

        let mut extension = Extension::new(spec.key.clone(), f, UnitTable::new(index, units)?);
        extension.f_y = Some(f_y);
        Ok(Some(extension))
    }
}

fn cell_value(grid: &Grid, row: usize, col: usize, table: &str) -> Result<f64> {
    match grid.get(row, col) {
        Cell::Empty => Ok(0.0),
        cell => cell.as_number().ok_or_else(|| {
            IngestError::structure(
                table,
                format!("non-numeric cell '{}' at row {row}, column {col}", cell.as_text()),
            )
        }),
    }
}

/// Table over `index` × `columns`, missing entries zero.
fn fill_table<F>(index: &MultiIndex, columns: &MultiIndex, lookup: F) -> Result<Table>
where
    F: Fn(&str, &[String]) -> Option<f64>,
{
    let mut values = Matrix::zeros(index.len(), columns.len());
    for (r, row_key) in index.keys().iter().enumerate() {
        for (c, col_key) in columns.keys().iter().enumerate() {
            if let Some(value) = lookup(&row_key[0], col_key) {
                values.set(r, c, value);
            }
        }
    }
    Table::new(index.clone(), columns.clone(), values)
}

fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_chars_respects_char_boundaries() {
        assert_eq!(trailing_chars("Table 2008", 4), "2008");
        assert_eq!(trailing_chars("Année é008", 4), "é008");
        assert_eq!(trailing_chars("08", 4), "08");
        assert_eq!(trailing_chars("2008", 0), "");
    }
}
