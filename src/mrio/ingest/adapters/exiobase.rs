//! EXIOBASE 1 and 2: region/sector text matrices in coefficient (`A`, `S`)
//! or flow (`Z`, `F`) form, plus the EXIOBASE 2 characterisation workbook.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::mrio::ingest::adapters::{
    SourceAdapter, SourceKind, UNDEFINED_UNIT, compile, finish, locate, new_system, pick_first,
    read_block, unique_labels,
};
use crate::mrio::ingest::config::{CharacterisationSheet, ExiobaseConfig, SniffConfig};
use crate::mrio::ingest::error::{IngestError, ParseWarning, Result};
use crate::mrio::ingest::io::repository::file_name;
use crate::mrio::ingest::io::{Grid, LabelledBlock, Repository, Workbook};
use crate::mrio::ingest::model::{
    CanonicalSystem, Extension, IndexLevel, Key, Matrix, MultiIndex, Table, UnitTable, schema,
};
use crate::mrio::ingest::provenance::MetaField;
use crate::mrio::ingest::sniff::{LayoutFormat, sniff_member};

/// Whether the release ships coefficients or flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableForm {
    /// `mrIot` is `A`, extensions are `S`.
    #[default]
    Coefficients,
    /// `mrIot` is `Z`, extensions are `F`.
    Flows,
}

/// Source of the characterisation factors applied by the EXIOBASE 2 parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Characterisation {
    Skip,
    /// Look for `characterisation*.xlsx` next to the data.
    Discover,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ExiobaseAdapter {
    kind: SourceKind,
    config: ExiobaseConfig,
    sniff: SniffConfig,
    form: TableForm,
    characterisation: Characterisation,
    coefficient_patterns: Vec<(String, Regex)>,
    flow_patterns: Vec<(String, Regex)>,
    characterisation_pattern: Regex,
    version_pattern: Regex,
    year_suffix: Regex,
    pxp: Regex,
    ixi: Regex,
}

/// One located and sniffed source file.
#[derive(Debug, Clone)]
struct SourceFile {
    key: String,
    member: String,
    format: LayoutFormat,
}

const CORE_TABLES: [&str; 3] = ["A", "Z", "Y"];

impl ExiobaseAdapter {
    pub fn version1(config: ExiobaseConfig, sniff: SniffConfig) -> Result<Self> {
        Self::build(SourceKind::Exiobase1, config, sniff, Characterisation::Skip)
    }

    pub fn version2(config: ExiobaseConfig, sniff: SniffConfig) -> Result<Self> {
        Self::build(SourceKind::Exiobase2, config, sniff, Characterisation::Discover)
    }

    fn build(
        kind: SourceKind,
        config: ExiobaseConfig,
        sniff: SniffConfig,
        characterisation: Characterisation,
    ) -> Result<Self> {
        let compile_all = |patterns: &BTreeMap<String, String>| -> Result<Vec<(String, Regex)>> {
            patterns
                .iter()
                .map(|(key, pattern)| Ok((key.clone(), compile(pattern)?)))
                .collect()
        };
        let case_insensitive = |pattern: &str| -> Result<Regex> {
            Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
        };
        Ok(Self {
            kind,
            coefficient_patterns: compile_all(&config.coefficient_patterns)?,
            flow_patterns: compile_all(&config.flow_patterns)?,
            characterisation_pattern: compile(&config.characterisation_pattern)?,
            version_pattern: compile(r"(\d+\w*(\.|-|_))*\d+\w*")?,
            year_suffix: compile(r"_\d{4}$")?,
            pxp: case_insensitive("pxp")?,
            ixi: case_insensitive("ixi")?,
            config,
            sniff,
            form: TableForm::Coefficients,
            characterisation,
        })
    }

    pub fn with_form(mut self, form: TableForm) -> Self {
        self.form = form;
        self
    }

    pub fn with_characterisation(mut self, characterisation: Characterisation) -> Self {
        self.characterisation = characterisation;
        self
    }

    /// Release version encoded in a file name, a trailing `_YYYY` removed.
    fn file_version(&self, name: &str) -> Option<String> {
        let found = self.version_pattern.find(name)?.as_str();
        Some(self.year_suffix.replace(found, "").into_owned())
    }

    fn io_system(&self, location: &Path) -> Option<&'static str> {
        let text = location.display().to_string();
        match (self.pxp.is_match(&text), self.ixi.is_match(&text)) {
            (true, false) => Some("pxp"),
            (false, true) => Some("ixi"),
            _ => None,
        }
    }
}

impl SourceAdapter for ExiobaseAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    #[instrument(level = "info", skip_all, fields(location = %location.display()))]
    fn parse(&self, location: &Path) -> Result<CanonicalSystem> {
        let repo = Repository::open(location)?;
        let mut system = new_system(self.kind.name(), repo.location());

        let patterns = match self.form {
            TableForm::Coefficients => &self.coefficient_patterns,
            TableForm::Flows => &self.flow_patterns,
        };
        let mut files = Vec::new();
        for (key, pattern) in patterns {
            if let Some(member) = locate(&repo, key, pattern, &mut system)? {
                let format = sniff_member(&repo, &member, &self.sniff)?;
                files.push(SourceFile {
                    key: key.clone(),
                    member,
                    format,
                });
            }
        }
        if files.is_empty() {
            return Err(IngestError::MissingSourceFile {
                table: "EXIOBASE tables".into(),
                location: repo.location().to_path_buf(),
            });
        }

        self.record_version(&files, &mut system)?;
        match self.io_system(location) {
            Some(io_system) => system.meta.change_meta(MetaField::System, io_system),
            None => system
                .meta
                .note("Could not determine the IO system (pxp or ixi) from the path"),
        }

        let monetary_unit = self.read_core(&repo, &files, &mut system)?;
        self.read_extensions(&repo, &files, &monetary_unit, &mut system)?;

        if self.kind == SourceKind::Exiobase2 {
            self.characterise(&repo, &mut system)?;
        }

        finish(system, self.kind)
    }
}

/// Parses an EXIOBASE 1 release (folder or zip).
pub fn parse_exiobase1(path: &Path, config: &ExiobaseConfig, sniff: &SniffConfig) -> Result<CanonicalSystem> {
    ExiobaseAdapter::version1(config.clone(), sniff.clone())?.parse(path)
}

/// Parses an EXIOBASE 2 release, applying the characterisation workbook
/// according to `characterisation`.
pub fn parse_exiobase2(
    path: &Path,
    config: &ExiobaseConfig,
    sniff: &SniffConfig,
    characterisation: Characterisation,
) -> Result<CanonicalSystem> {
    ExiobaseAdapter::version2(config.clone(), sniff.clone())?
        .with_characterisation(characterisation)
        .parse(path)
}

impl ExiobaseAdapter {
    fn record_version(&self, files: &[SourceFile], system: &mut CanonicalSystem) -> Result<()> {
        let versions: BTreeSet<String> = files
            .iter()
            .filter_map(|file| self.file_version(file_name(&file.member)))
            .filter(|version| !version.is_empty())
            .collect();
        let mut version = versions.into_iter().collect::<Vec<_>>().join(" & ");
        if version.is_empty() {
            system
                .meta
                .note("No version information found, assuming EXIOBASE 1");
            version = "1".into();
        }
        match version.chars().next() {
            Some('1') | Some('2') => {
                system
                    .meta
                    .change_meta(MetaField::Year, self.config.base_year.clone());
            }
            Some('3') => {
                return Err(IngestError::UnsupportedVersion {
                    source_name: "EXIOBASE".into(),
                    detail: format!("version {version} needs the EXIOBASE 3 parser"),
                });
            }
            _ => system
                .meta
                .note(format!("Unknown EXIOBASE version {version}, year not set")),
        }
        system.meta.change_meta(MetaField::Version, version);
        Ok(())
    }

    /// Reads `A`/`Z` and `Y`; returns the monetary unit.
    fn read_core(
        &self,
        repo: &Repository,
        files: &[SourceFile],
        system: &mut CanonicalSystem,
    ) -> Result<String> {
        let core_key = match self.form {
            TableForm::Coefficients => "A",
            TableForm::Flows => "Z",
        };
        let core = files
            .iter()
            .find(|file| file.key == core_key)
            .ok_or_else(|| IngestError::MissingSourceFile {
                table: core_key.into(),
                location: repo.location().to_path_buf(),
            })?;

        let block = read_block(repo, &core.member, &core.format, core_key, system)?;
        let (table, units) = core_table(block, core_key, schema::REGION_SECTOR)?;

        let first_unit = units.first().cloned().unwrap_or_default();
        let monetary_unit = match first_unit.split_once('/') {
            Some((monetary, _)) => monetary.to_string(),
            None => first_unit,
        };
        let unit = match units.first() {
            Some(unit) if unit.contains('/') => UnitTable::uniform(table.index().clone(), &monetary_unit),
            _ => UnitTable::new(table.index().clone(), units)?,
        };
        system.unit = Some(unit);
        match self.form {
            TableForm::Coefficients => system.a = Some(table),
            TableForm::Flows => system.z = Some(table),
        }

        if let Some(y_file) = files.iter().find(|file| file.key == "Y") {
            let block = read_block(repo, &y_file.member, &y_file.format, "Y", system)?;
            let (y, _) = core_table(block, "Y", schema::REGION_CATEGORY)?;
            system.y = Some(y);
        }
        Ok(monetary_unit)
    }

    fn read_extensions(
        &self,
        repo: &Repository,
        files: &[SourceFile],
        monetary_unit: &str,
        system: &mut CanonicalSystem,
    ) -> Result<()> {
        #[derive(Default)]
        struct Parts {
            main: Option<(Table, Vec<String>)>,
            final_demand: Option<(Table, Vec<String>)>,
        }
        let mut grouped: BTreeMap<String, Parts> = BTreeMap::new();

        for file in files.iter().filter(|file| !CORE_TABLES.contains(&file.key.as_str())) {
            let (table_type, name) = split_key(&file.key).ok_or_else(|| {
                IngestError::InvalidParameter(format!("unknown EXIOBASE table key '{}'", file.key))
            })?;
            if !(2..=3).contains(&file.format.index_cols) {
                return Err(IngestError::UnsupportedVersion {
                    source_name: "EXIOBASE".into(),
                    detail: format!(
                        "unknown file structure of {}: {} label columns, expected 2 or 3",
                        file.member, file.format.index_cols
                    ),
                });
            }
            let block = read_block(repo, &file.member, &file.format, &file.key, system)?;
            let columns = if table_type == "F_Y" {
                schema::REGION_CATEGORY
            } else {
                schema::REGION_SECTOR
            };
            let (table, units) = stressor_table(block, &file.key, columns, false)?;
            let units = units
                .unwrap_or_else(|| vec![UNDEFINED_UNIT.to_string(); table.index().len()])
                .iter()
                .map(|unit| strip_monetary(unit, monetary_unit))
                .collect();
            let parts = grouped.entry(name.to_string()).or_default();
            if table_type == "F_Y" {
                parts.final_demand = Some((table, units));
            } else {
                parts.main = Some((table, units));
            }
        }

        for (name, parts) in grouped {
            let Some((main, units)) = parts.main else {
                system.warn(ParseWarning::ExtensionUnavailable {
                    extension: name,
                    reason: "only final demand data found".into(),
                });
                continue;
            };
            let unit = UnitTable::new(main.index().clone(), units)?;
            let f_y = match parts.final_demand {
                Some((f_y, _)) if f_y.index() == main.index() => Some(f_y),
                Some((f_y, _)) => {
                    system.meta.note(format!(
                        "Final demand stressors of {name} aligned to the sector stressors"
                    ));
                    Some(f_y.reindex_rows(main.index())?)
                }
                None => None,
            };
            let extension = match self.form {
                TableForm::Coefficients => Extension {
                    name: name.clone(),
                    f: None,
                    f_y,
                    s: Some(main),
                    unit,
                },
                TableForm::Flows => {
                    let mut extension = Extension::new(name.clone(), main, unit);
                    extension.f_y = f_y;
                    extension
                }
            };
            debug!(extension = %name, "EXIOBASE extension assembled");
            system.insert_extension(extension);
        }
        Ok(())
    }

    /// Builds the `impact` extension from the characterisation workbook.
    fn characterise(&self, repo: &Repository, system: &mut CanonicalSystem) -> Result<()> {
        let unavailable = |system: &mut CanonicalSystem, reason: String| {
            system.warn(ParseWarning::ExtensionUnavailable {
                extension: "impact".into(),
                reason,
            });
        };

        let mut workbook = match &self.characterisation {
            Characterisation::Skip => return Ok(()),
            Characterisation::File(path) => {
                if !path.is_file() {
                    unavailable(system, format!("{} not found", path.display()));
                    return Ok(());
                }
                system
                    .meta
                    .add_fileio(format!("Characterisation factors parsed from {}", path.display()));
                Workbook::from_bytes(&path.display().to_string(), fs::read(path)?)?
            }
            Characterisation::Discover => {
                let candidates = repo.find(&self.characterisation_pattern)?;
                let Some(member) = pick_first("characterisation", candidates, system) else {
                    unavailable(system, "no characterisation workbook found".into());
                    return Ok(());
                };
                system.meta.add_fileio(format!(
                    "Characterisation factors parsed from {}",
                    repo.describe(&member)
                ));
                Workbook::from_bytes(&member, repo.read(&member)?)?
            }
        };

        let mut names = Vec::new();
        let mut units = Vec::new();
        let mut s_blocks: Vec<Matrix> = Vec::new();
        let mut f_y_blocks: Vec<Matrix> = Vec::new();
        let (Some(sectors), Some(y)) = (system.sector_index().cloned(), system.y.clone()) else {
            unavailable(system, "core tables incomplete".into());
            return Ok(());
        };

        for sheet in &self.config.characterisation_sheets {
            let Some(extension) = system.extension(&sheet.extension).cloned() else {
                unavailable(system, format!("extension {} missing", sheet.extension));
                return Ok(());
            };
            let Some(stressor_coefficients) = extension.s.clone().or(extension.f.clone()) else {
                unavailable(system, format!("extension {} has no data", sheet.extension));
                return Ok(());
            };
            if !workbook.has_sheet(&sheet.sheet) {
                unavailable(system, format!("sheet {} missing", sheet.sheet));
                return Ok(());
            }
            let grid = workbook.sheet(&sheet.sheet)?;
            let (sheet_names, sheet_units, factors) =
                characterisation_factors(&grid_rows(&grid), sheet, stressor_coefficients.shape().0)?;

            s_blocks.push(factors.matmul(stressor_coefficients.values())?);
            let final_demand = match &extension.f_y {
                Some(f_y) => f_y.values().clone(),
                None => Matrix::zeros(stressor_coefficients.shape().0, y.columns().len()),
            };
            f_y_blocks.push(factors.matmul(&final_demand)?);
            names.extend(sheet_names);
            units.extend(sheet_units);
        }

        let index = MultiIndex::single(IndexLevel::Stressor, unique_labels(names))?;
        let stack = |blocks: Vec<Matrix>, cols: usize| -> Result<Matrix> {
            blocks
                .into_iter()
                .try_fold(Matrix::zeros(0, cols), |acc, block| acc.vstack(&block))
        };
        let s = Table::new(index.clone(), sectors.clone(), stack(s_blocks, sectors.len())?)?;
        let f_y = Table::new(index.clone(), y.columns().clone(), stack(f_y_blocks, y.columns().len())?)?;
        system.insert_extension(Extension {
            name: "impact".into(),
            f: None,
            f_y: Some(f_y),
            s: Some(s),
            unit: UnitTable::new(index, units)?,
        });
        Ok(())
    }
}

/// Splits `S_emissions` / `F_Y_emissions` into table type and extension.
fn split_key(key: &str) -> Option<(&'static str, &str)> {
    ["F_Y_", "S_", "F_"]
        .into_iter()
        .find_map(|prefix| key.strip_prefix(prefix).map(|name| (prefix.trim_end_matches('_'), name)))
}

/// Removes `/<monetary unit>` from a stressor unit; a bare `/` is dropped.
fn strip_monetary(unit: &str, monetary_unit: &str) -> String {
    let stripped = unit.replace(&format!("/{monetary_unit}"), "");
    if stripped.is_empty() {
        unit.replace('/', "")
    } else {
        stripped
    }
}

/// Core table with a `region, sector, unit` row index; returns the table and
/// the unit column.
fn core_table(
    block: LabelledBlock,
    table: &str,
    columns: &[IndexLevel],
) -> Result<(Table, Vec<String>)> {
    if block.labels.first().is_some_and(|labels| labels.len() != 3) {
        return Err(IngestError::structure(
            table,
            "expected region, sector and unit index columns",
        ));
    }
    let units: Vec<String> = block.labels.iter().map(|key| key[2].clone()).collect();
    let keys: Vec<Key> = block.labels.iter().map(|key| key[..2].to_vec()).collect();
    let index = MultiIndex::new(schema::REGION_SECTOR.to_vec(), keys)?;
    let cols = block.column_index(columns)?;
    Ok((Table::new(index, cols, block.values)?, units))
}

/// Extension table with one to three leading label columns:
/// `stressor`, `stressor, unit` or `stressor, compartment, unit`. Label
/// columns beyond the third are discarded; release files are checked for
/// two or three columns before they get here.
fn stressor_table(
    block: LabelledBlock,
    table: &str,
    columns: &[IndexLevel],
    drop_compartment: bool,
) -> Result<(Table, Option<Vec<String>>)> {
    let width = block.labels.first().map_or(0, Vec::len);
    let (keys, names, units): (Vec<Key>, Vec<IndexLevel>, Option<Vec<String>>) = match width {
        1 => (block.labels.clone(), schema::STRESSOR.to_vec(), None),
        2 => (
            block.labels.iter().map(|key| vec![key[0].clone()]).collect(),
            schema::STRESSOR.to_vec(),
            Some(block.labels.iter().map(|key| key[1].clone()).collect()),
        ),
        3.. if drop_compartment => (
            block.labels.iter().map(|key| vec![key[0].clone()]).collect(),
            schema::STRESSOR.to_vec(),
            Some(block.labels.iter().map(|key| key[2].clone()).collect()),
        ),
        3.. => (
            block.labels.iter().map(|key| key[..2].to_vec()).collect(),
            schema::STRESSOR_COMPARTMENT.to_vec(),
            Some(block.labels.iter().map(|key| key[2].clone()).collect()),
        ),
        _ => {
            return Err(IngestError::structure(table, "no stressor label column"));
        }
    };
    let index = MultiIndex::new(names, keys)?;
    let cols = block.column_index(columns)?;
    Ok((Table::new(index, cols, block.values)?, units))
}

/// Parses a standalone EXIOBASE 1/2 style extension file holding `F` with
/// `index_cols` leading label columns and a `region, sector` header.
pub fn parse_extension_file(
    path: &Path,
    name: &str,
    index_cols: usize,
    separator: char,
    drop_compartment: bool,
) -> Result<Extension> {
    let (repo, member) = Repository::for_path(path)?;
    let member = member.ok_or_else(|| {
        IngestError::InvalidParameter(format!("{} is not a plain file", path.display()))
    })?;
    let format = LayoutFormat {
        separator,
        header_rows: 2,
        index_cols,
    };
    let block = LabelledBlock::parse(&repo.read_text(&member)?, &format, name)?;
    let (f, units) = stressor_table(block, name, schema::REGION_SECTOR, drop_compartment)?;
    let unit = match units {
        Some(units) => UnitTable::new(f.index().clone(), units)?,
        None => UnitTable::uniform(f.index().clone(), UNDEFINED_UNIT),
    };
    Ok(Extension::new(name, f, unit))
}

fn grid_rows(grid: &Grid) -> Vec<Vec<String>> {
    (0..grid.rows())
        .map(|row| (0..grid.cols()).map(|col| grid.text(row, col)).collect())
        .collect()
}

/// Impact names, units and the factor matrix (impacts × stressors) of one
/// characterisation sheet.
fn characterisation_factors(
    rows: &[Vec<String>],
    sheet: &CharacterisationSheet,
    stressors: usize,
) -> Result<(Vec<String>, Vec<String>, Matrix)> {
    let first_factor = sheet.unit_col + 1;
    let mut names = Vec::new();
    let mut units = Vec::new();
    let mut data = Vec::new();
    for row in rows.iter().skip(sheet.header_rows) {
        let name = row.get(sheet.name_col).map(String::as_str).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        for col in first_factor..first_factor + stressors {
            let raw = row.get(col).map(String::as_str).unwrap_or("");
            let value = if raw.is_empty() {
                0.0
            } else {
                raw.parse::<f64>().map_err(|_| {
                    IngestError::structure(
                        &sheet.sheet,
                        format!("non-numeric factor '{raw}' for {name}"),
                    )
                })?
            };
            data.push(value);
        }
        names.push(name.to_string());
        units.push(row.get(sheet.unit_col).cloned().unwrap_or_default());
    }
    let matrix = Matrix::new(names.len(), stressors, data)?;
    Ok((names, units, matrix))
}
