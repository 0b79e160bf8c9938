//! Cecilia 2050: supply and use tables per modelling step, converted to an
//! input-output system with the SUT transform.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::mrio::ingest::adapters::{
    SourceAdapter, SourceKind, UNDEFINED_UNIT, finish, new_system, unique_labels,
};
use crate::mrio::ingest::config::{CeciliaConfig, TransformConfig};
use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::io::delimited::parse_number;
use crate::mrio::ingest::io::{Repository, Workbook, read_grid};
use crate::mrio::ingest::model::{
    CanonicalSystem, Extension, IndexLevel, Matrix, MultiIndex, Table, UnitTable, schema,
};
use crate::mrio::ingest::provenance::MetaField;
use crate::mrio::ingest::transform::{
    TechnologyAssumption, complete_core, iot_from_sut, stressor_coefficients, stressor_flows,
    total_output,
};

pub const MATERIALS_EXTENSION: &str = "materials";

/// Modelling step of the 2050 pathway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum CeciliaStep {
    /// `-1`: the aggregated tables as published.
    #[serde(rename = "-1")]
    Original,
    /// `0`: balanced with GRAS.
    #[default]
    #[serde(rename = "0")]
    Preprocessed,
    /// `1`: business as usual efficiency gains.
    #[serde(rename = "1")]
    Efficiency,
    /// `2a`
    #[serde(rename = "2a")]
    EnergyMix,
    /// `2b`
    #[serde(rename = "2b")]
    TechnicalChange,
    /// `3`: growth curbed to the two degree pathway.
    #[serde(rename = "3")]
    CurbedGrowth,
}

impl CeciliaStep {
    pub const ALL: [CeciliaStep; 6] = [
        CeciliaStep::Original,
        CeciliaStep::Preprocessed,
        CeciliaStep::Efficiency,
        CeciliaStep::EnergyMix,
        CeciliaStep::TechnicalChange,
        CeciliaStep::CurbedGrowth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CeciliaStep::Original => "-1",
            CeciliaStep::Preprocessed => "0",
            CeciliaStep::Efficiency => "1",
            CeciliaStep::EnergyMix => "2a",
            CeciliaStep::TechnicalChange => "2b",
            CeciliaStep::CurbedGrowth => "3",
        }
    }

    /// Steps up to `0` describe the base year.
    pub fn is_base_year(&self) -> bool {
        matches!(self, CeciliaStep::Original | CeciliaStep::Preprocessed)
    }
}

impl fmt::Display for CeciliaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CeciliaStep {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        CeciliaStep::ALL
            .into_iter()
            .find(|step| step.label().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                IngestError::InvalidParameter(format!(
                    "unknown Cecilia step '{value}', expected -1, 0, 1, 2a, 2b or 3"
                ))
            })
    }
}

/// Supply, use and final demand of one step.
struct SupplyUse {
    supply: Matrix,
    use_table: Matrix,
    final_demand: Matrix,
}

/// The published aggregated tables and their total output.
struct BaseStep {
    tables: SupplyUse,
    output: Vec<f64>,
}

/// Labels and the material flows of the aggregated base tables.
struct Labels {
    sectors: MultiIndex,
    categories: MultiIndex,
    materials: Table,
}

#[derive(Debug, Clone)]
pub struct CeciliaAdapter {
    config: CeciliaConfig,
    transform: TransformConfig,
    step: CeciliaStep,
    technology: TechnologyAssumption,
}

impl CeciliaAdapter {
    pub fn new(config: CeciliaConfig, transform: TransformConfig, step: CeciliaStep) -> Self {
        Self {
            config,
            transform,
            step,
            technology: TechnologyAssumption::Industry,
        }
    }

    pub fn with_technology(mut self, technology: TechnologyAssumption) -> Self {
        self.technology = technology;
        self
    }

    fn preprocess(&self, name: &str) -> String {
        format!("{}/{name}", self.config.preprocess_folder)
    }

    /// Numeric block of a tab separated member: `skip` header rows dropped,
    /// `cols` values read from column `first_col` on.
    fn read_numeric(
        &self,
        repo: &Repository,
        member: &str,
        skip: usize,
        first_col: usize,
        cols: usize,
        system: &mut CanonicalSystem,
    ) -> Result<Matrix> {
        if !repo.contains(member)? {
            return Err(IngestError::MissingSourceFile {
                table: member.to_string(),
                location: repo.location().to_path_buf(),
            });
        }
        let grid = read_grid(&repo.read_text(member)?, '\t')?;
        let mut data = Vec::new();
        let mut rows = 0;
        for (r, row) in grid.iter().enumerate().skip(skip) {
            if row.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            if row.len() < first_col + cols {
                return Err(IngestError::structure(
                    member,
                    format!("row {r} has {} fields, expected {}", row.len(), first_col + cols),
                ));
            }
            for cell in &row[first_col..first_col + cols] {
                data.push(parse_number(cell).ok_or_else(|| {
                    IngestError::structure(member, format!("non-numeric value '{cell}' in row {r}"))
                })?);
            }
            rows += 1;
        }
        system
            .meta
            .add_fileio(format!("{member} parsed from {}", repo.describe(member)));
        debug!(member, rows, cols, "Cecilia matrix read");
        Matrix::new(rows, cols, data)
    }

    fn read_step(
        &self,
        repo: &Repository,
        step: CeciliaStep,
        labels: &Labels,
        system: &mut CanonicalSystem,
    ) -> Result<SupplyUse> {
        let n = labels.sectors.len();
        let m = labels.categories.len();
        let config = &self.config;
        let (supply, use_table, final_demand) = match step {
            CeciliaStep::Original => {
                let (skip, first) = (config.aggregated_skip_rows, config.aggregated_first_col);
                (
                    self.read_numeric(repo, &self.preprocess(&config.aggregated_supply), skip, first, n, system)?,
                    self.read_numeric(repo, &self.preprocess(&config.aggregated_use), skip, first, n, system)?,
                    self.read_numeric(repo, &self.preprocess(&config.aggregated_final_demand), skip, first, m, system)?,
                )
            }
            CeciliaStep::Preprocessed => (
                self.read_numeric(repo, &self.preprocess("V.txt"), 0, 0, n, system)?,
                self.read_numeric(repo, &self.preprocess("U.txt"), 0, 0, n, system)?,
                self.read_numeric(repo, &self.preprocess("Y.txt"), 0, 0, m, system)?,
            ),
            later => {
                let folder = format!("step{}", later.label());
                (
                    self.read_numeric(repo, &format!("{folder}/Vend.txt"), 0, 0, n, system)?,
                    self.read_numeric(repo, &format!("{folder}/Uend.txt"), 0, 0, n, system)?,
                    self.read_numeric(repo, &format!("{folder}/Yend.txt"), 0, 0, m, system)?,
                )
            }
        };
        for (name, matrix) in [("V", &supply), ("U", &use_table)] {
            if matrix.shape() != (n, n) {
                return Err(IngestError::structure(
                    name,
                    format!("shape {:?} for {n} region/sector pairs", matrix.shape()),
                ));
            }
        }
        if final_demand.rows() != n {
            return Err(IngestError::structure(
                "Y",
                format!("{} rows for {n} region/sector pairs", final_demand.rows()),
            ));
        }
        Ok(SupplyUse {
            supply,
            use_table,
            final_demand,
        })
    }

    fn read_labels(&self, repo: &Repository, system: &mut CanonicalSystem) -> Result<Labels> {
        let config = &self.config;
        let member = config.labels_workbook.as_str();
        let mut workbook = Workbook::from_bytes(member, repo.read(member)?)?;
        let grid = workbook.sheet_at(config.labels_sheet)?;
        let sectors: Vec<String> = (config.labels_first_row..grid.rows())
            .map(|row| grid.text(row, config.labels_column))
            .take_while(|name| !name.is_empty())
            .collect();
        if sectors.is_empty() {
            return Err(IngestError::structure(member, "no sector names in the labels sheet"));
        }
        system
            .meta
            .add_fileio(format!("Sector names parsed from {}", repo.describe(member)));
        let sectors = MultiIndex::from_product(
            schema::REGION_SECTOR,
            &[config.regions.clone(), sectors],
        )?;
        let categories = MultiIndex::from_product(
            schema::REGION_CATEGORY,
            &[config.regions.clone(), config.final_demand_categories.clone()],
        )?;

        let materials_member = self.preprocess(&config.aggregated_materials);
        let grid = read_grid(&repo.read_text(&materials_member)?, '\t')?;
        let names: Vec<String> = grid
            .iter()
            .skip(config.aggregated_skip_rows)
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .map(|row| row.first().cloned().unwrap_or_default())
            .collect();
        let values = self.read_numeric(
            repo,
            &materials_member,
            config.aggregated_skip_rows,
            config.materials_first_col,
            sectors.len(),
            system,
        )?;
        let stressors = MultiIndex::single(IndexLevel::Stressor, unique_labels(names))?;
        let materials = Table::new(stressors, sectors.clone(), values)?;
        Ok(Labels {
            sectors,
            categories,
            materials,
        })
    }

    /// Total output of a step, without the inverse.
    fn output_of(&self, tables: &SupplyUse, labels: &Labels) -> Result<Vec<f64>> {
        let (z, y) = self.core(tables, labels)?;
        total_output(&z, &y)
    }

    fn core(&self, tables: &SupplyUse, labels: &Labels) -> Result<(Table, Table)> {
        let sectors = &labels.sectors;
        let supply = Table::new(sectors.clone(), sectors.clone(), tables.supply.clone())?;
        let use_table = Table::new(sectors.clone(), sectors.clone(), tables.use_table.clone())?;
        let z = iot_from_sut(&supply, &use_table, self.technology)?;
        let y = Table::new(
            sectors.clone(),
            labels.categories.clone(),
            tables.final_demand.clone(),
        )?;
        Ok((z, y))
    }

    /// The published aggregated tables, whose output is the base of the
    /// material intensities of every step.
    fn base_step(
        &self,
        repo: &Repository,
        labels: &Labels,
        system: &mut CanonicalSystem,
    ) -> Result<BaseStep> {
        let tables = self.read_step(repo, CeciliaStep::Original, labels, system)?;
        let output = self.output_of(&tables, labels)?;
        Ok(BaseStep { tables, output })
    }

    fn build(
        &self,
        repo: &Repository,
        step: CeciliaStep,
        labels: &Labels,
        base: &BaseStep,
        shared: &CanonicalSystem,
        location: &Path,
    ) -> Result<CanonicalSystem> {
        let mut system = new_system(SourceKind::Cecilia.name(), location);
        for entry in shared.meta.file_io() {
            system.meta.add_fileio(entry.text.clone());
        }
        system.meta.change_meta(MetaField::Version, step.label());
        system.meta.change_meta(MetaField::System, self.technology.system());
        let year = if step.is_base_year() {
            &self.config.base_year
        } else {
            &self.config.target_year
        };
        system.meta.change_meta(MetaField::Year, year.as_str());

        // The aggregated files are already in the shared log.
        let read;
        let tables = if step == CeciliaStep::Original {
            &base.tables
        } else {
            read = self.read_step(repo, step, labels, &mut system)?;
            &read
        };
        let (z, y) = self.core(tables, labels)?;
        system
            .meta
            .add_modify(format!("Z computed from supply and use tables ({})", self.technology.system()));
        system.unit = Some(UnitTable::uniform(labels.sectors.clone(), UNDEFINED_UNIT));
        system.z = Some(z);
        system.y = Some(y);
        complete_core(&mut system, &self.transform)?;

        let x = system.x.clone().unwrap_or_default();
        let s = stressor_coefficients(&labels.materials, &base.output)?;
        let f = stressor_flows(&s, &x)?;
        let unit = UnitTable::uniform(labels.materials.index().clone(), UNDEFINED_UNIT);
        let mut materials = Extension::new(MATERIALS_EXTENSION, f, unit);
        materials.s = Some(s);
        system.insert_extension(materials);

        finish(system, SourceKind::Cecilia)
    }

    /// Every step, with the aggregated tables read once.
    #[instrument(level = "info", skip_all, fields(location = %location.display()))]
    pub fn parse_all(&self, location: &Path) -> Result<BTreeMap<CeciliaStep, CanonicalSystem>> {
        let repo = Repository::open(location)?;
        let mut shared = CanonicalSystem::default();
        let labels = self.read_labels(&repo, &mut shared)?;
        let base = self.base_step(&repo, &labels, &mut shared)?;
        let mut systems = BTreeMap::new();
        for step in CeciliaStep::ALL {
            let system = self.build(&repo, step, &labels, &base, &shared, location)?;
            systems.insert(step, system);
        }
        info!(steps = systems.len(), "parsed all Cecilia steps");
        Ok(systems)
    }
}

impl SourceAdapter for CeciliaAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Cecilia
    }

    #[instrument(level = "info", skip_all, fields(location = %location.display(), step = %self.step))]
    fn parse(&self, location: &Path) -> Result<CanonicalSystem> {
        let repo = Repository::open(location)?;
        let mut shared = CanonicalSystem::default();
        let labels = self.read_labels(&repo, &mut shared)?;
        let base = self.base_step(&repo, &labels, &mut shared)?;
        self.build(&repo, self.step, &labels, &base, &shared, location)
    }
}

/// Parses one step of Cecilia 2050 from its root folder.
pub fn parse_cecilia(
    path: &Path,
    step: CeciliaStep,
    technology: TechnologyAssumption,
    config: &CeciliaConfig,
    transform: &TransformConfig,
) -> Result<CanonicalSystem> {
    CeciliaAdapter::new(config.clone(), transform.clone(), step)
        .with_technology(technology)
        .parse(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_round_trip_through_labels() {
        for step in CeciliaStep::ALL {
            assert_eq!(step.label().parse::<CeciliaStep>().unwrap(), step);
        }
        assert!("4".parse::<CeciliaStep>().is_err());
        assert!(CeciliaStep::Original.is_base_year());
        assert!(!CeciliaStep::EnergyMix.is_base_year());
    }
}
