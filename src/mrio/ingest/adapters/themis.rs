//! THEMIS: technology and impact matrices of the nine-region hybrid model,
//! stored as one `.npz` array container plus a labels workbook.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::mrio::ingest::adapters::{
    SourceAdapter, SourceKind, UNDEFINED_UNIT, finish, new_system, unique_labels,
};
use crate::mrio::ingest::config::ThemisConfig;
use crate::mrio::ingest::error::{IngestError, Result};
use crate::mrio::ingest::io::npz::{NdArray, read_npz};
use crate::mrio::ingest::io::repository::file_name;
use crate::mrio::ingest::io::spreadsheet::column_values;
use crate::mrio::ingest::io::{Grid, Repository, Workbook};
use crate::mrio::ingest::model::{
    CanonicalSystem, Extension, IndexLevel, Key, Matrix, MultiIndex, Table, UnitTable, schema,
};
use crate::mrio::ingest::provenance::MetaField;

/// Extension holding the characterised impacts.
pub const IMPACT_EXTENSION: &str = "impact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ThemisScenario {
    /// Baseline.
    #[default]
    #[serde(rename = "BL")]
    Bl,
    /// Blue map.
    #[serde(rename = "BM")]
    Bm,
    #[serde(rename = "REF")]
    Ref,
    #[serde(rename = "ER")]
    Er,
    #[serde(rename = "ADV")]
    Adv,
    #[serde(rename = "combo")]
    Combo,
}

impl ThemisScenario {
    pub const ALL: [ThemisScenario; 6] = [
        ThemisScenario::Bl,
        ThemisScenario::Bm,
        ThemisScenario::Ref,
        ThemisScenario::Er,
        ThemisScenario::Adv,
        ThemisScenario::Combo,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ThemisScenario::Bl => "BL",
            ThemisScenario::Bm => "BM",
            ThemisScenario::Ref => "REF",
            ThemisScenario::Er => "ER",
            ThemisScenario::Adv => "ADV",
            ThemisScenario::Combo => "combo",
        }
    }
}

impl fmt::Display for ThemisScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ThemisScenario {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        ThemisScenario::ALL
            .into_iter()
            .find(|scenario| scenario.code().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                IngestError::InvalidParameter(format!(
                    "unknown THEMIS scenario '{value}', expected BL, BM, REF, ER, ADV or combo"
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ThemisYear {
    #[default]
    #[serde(rename = "2010")]
    Y2010,
    #[serde(rename = "2030")]
    Y2030,
    #[serde(rename = "2050")]
    Y2050,
}

impl ThemisYear {
    pub const ALL: [ThemisYear; 3] = [ThemisYear::Y2010, ThemisYear::Y2030, ThemisYear::Y2050];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThemisYear::Y2010 => "2010",
            ThemisYear::Y2030 => "2030",
            ThemisYear::Y2050 => "2050",
        }
    }
}

impl fmt::Display for ThemisYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThemisYear {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        ThemisYear::ALL
            .into_iter()
            .find(|year| year.as_str() == value.trim())
            .ok_or_else(|| {
                IngestError::InvalidParameter(format!(
                    "THEMIS year must be 2010, 2030 or 2050, got '{value}'"
                ))
            })
    }
}

/// One scenario/year combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ThemisVariant {
    pub scenario: ThemisScenario,
    pub year: ThemisYear,
}

/// How the data of a variant is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Stored in the container under its own keys.
    Stored,
    /// Same matrices as `base`.
    CopyOf(ThemisVariant),
    /// Technology of `base`; the electricity mix of `mix` is not part of the
    /// container and is only recorded.
    Combined {
        base: ThemisVariant,
        mix: ThemisVariant,
    },
}

impl ThemisVariant {
    pub const fn new(scenario: ThemisScenario, year: ThemisYear) -> Self {
        Self { scenario, year }
    }

    /// Every scenario/year combination, in canonical order.
    pub fn all() -> Vec<ThemisVariant> {
        ThemisScenario::ALL
            .into_iter()
            .flat_map(|scenario| {
                ThemisYear::ALL
                    .into_iter()
                    .map(move |year| ThemisVariant::new(scenario, year))
            })
            .collect()
    }

    pub fn derivation(&self) -> Derivation {
        use ThemisScenario::*;
        use ThemisYear::*;
        match (self.scenario, self.year) {
            (Bl | Bm, _) => Derivation::Stored,
            (Ref, year) => Derivation::CopyOf(ThemisVariant::new(Bl, year)),
            (Er | Adv, year) => Derivation::CopyOf(ThemisVariant::new(Bm, year)),
            (Combo, Y2010) => Derivation::Combined {
                base: ThemisVariant::new(Bl, Y2010),
                mix: ThemisVariant::new(Adv, Y2050),
            },
            (Combo, Y2030) => Derivation::Combined {
                base: ThemisVariant::new(Bl, Y2010),
                mix: ThemisVariant::new(Er, Y2050),
            },
            (Combo, Y2050) => Derivation::Combined {
                base: ThemisVariant::new(Bl, Y2050),
                mix: ThemisVariant::new(Bl, Y2010),
            },
        }
    }
}

impl fmt::Display for ThemisVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.scenario, self.year)
    }
}

/// Arrays and labels shared by every variant.
struct Sources {
    arrays: BTreeMap<String, NdArray>,
    sectors: MultiIndex,
    impacts: MultiIndex,
    impact_units: Vec<String>,
    container: String,
    labels: String,
}

#[derive(Debug, Clone)]
pub struct ThemisAdapter {
    config: ThemisConfig,
    variant: ThemisVariant,
}

impl ThemisAdapter {
    pub fn new(config: ThemisConfig, variant: ThemisVariant) -> Self {
        Self { config, variant }
    }

    /// Member for a configured path, falling back to a match on its file name.
    fn member(&self, repo: &Repository, path: &str) -> Result<String> {
        if repo.contains(path)? {
            return Ok(path.to_string());
        }
        repo.find_named(file_name(path))?
            .into_iter()
            .next()
            .ok_or_else(|| IngestError::MissingSourceFile {
                table: file_name(path).to_string(),
                location: repo.location().to_path_buf(),
            })
    }

    fn load(&self, repo: &Repository) -> Result<Sources> {
        let container = self.member(repo, &self.config.container)?;
        let arrays = read_npz(repo.read(&container)?)?;
        debug!(arrays = arrays.len(), "THEMIS container read");

        let labels = self.member(repo, &self.config.labels_workbook)?;
        let mut workbook = Workbook::from_bytes(&labels, repo.read(&labels)?)?;

        let sector_grid = workbook.sheet_at(self.config.sector_sheet)?;
        let column = |grid: &Grid, name: &str| {
            column_values(grid, 0, name).ok_or_else(|| {
                IngestError::structure(file_name(&labels), format!("no column '{name}'"))
            })
        };
        let names = column(&sector_grid, &self.config.sector_name_column)?;
        let regions = column(&sector_grid, &self.config.sector_region_column)?;
        if names.len() != regions.len() {
            return Err(IngestError::structure(
                file_name(&labels),
                format!("{} sector names for {} regions", names.len(), regions.len()),
            ));
        }
        let keys: Vec<Key> = regions
            .into_iter()
            .zip(names)
            .map(|(region, name)| {
                let region = self
                    .config
                    .region_names
                    .get(&region)
                    .cloned()
                    .unwrap_or(region);
                vec![region, name]
            })
            .collect();
        let sectors = MultiIndex::new(schema::REGION_SECTOR.to_vec(), keys)?;

        let impact_grid = workbook.sheet_at(self.config.impact_sheet)?;
        let impact_names = unique_labels(column(&impact_grid, &self.config.impact_name_column)?);
        let impact_units = column_values(&impact_grid, 0, "Unit")
            .filter(|units| units.len() == impact_names.len())
            .unwrap_or_else(|| vec![UNDEFINED_UNIT.to_string(); impact_names.len()]);
        let impacts = MultiIndex::single(IndexLevel::Stressor, impact_names)?;

        Ok(Sources {
            arrays,
            sectors,
            impacts,
            impact_units,
            container: repo.describe(&container),
            labels: repo.describe(&labels),
        })
    }

    fn array(&self, sources: &Sources, key: &str) -> Result<NdArray> {
        sources
            .arrays
            .get(key)
            .cloned()
            .ok_or_else(|| IngestError::structure(&sources.container, format!("no array '{key}'")))
    }

    /// System of a variant stored in the container.
    fn stored(
        &self,
        variant: ThemisVariant,
        sources: &Sources,
        location: &Path,
    ) -> Result<CanonicalSystem> {
        let scenario = variant.scenario.code();
        let year = variant.year.as_str();
        let mut system = new_system(SourceKind::Themis.name(), location);
        system.meta.change_meta(MetaField::System, "pxp");
        system.meta.change_meta(MetaField::Version, scenario);
        system.meta.change_meta(MetaField::Year, year);
        system
            .meta
            .add_fileio(format!("Sector and impact labels parsed from {}", sources.labels));

        let a_key = format!("A_{year}_{scenario}");
        let a = self.array(sources, &a_key)?.into_matrix(&a_key)?;
        let n = sources.sectors.len();
        if a.shape() != (n, n) {
            return Err(IngestError::structure(
                &a_key,
                format!("shape {:?} for {n} sectors", a.shape()),
            ));
        }
        system.a = Some(Table::new(sources.sectors.clone(), sources.sectors.clone(), a)?);
        system
            .meta
            .add_fileio(format!("A parsed from {} ({a_key})", sources.container));

        let background_key = format!("S_{year}_{scenario}");
        let foreground_key = format!("S_f_{scenario}");
        let background = self
            .array(sources, &background_key)?
            .into_matrix(&background_key)?;
        let foreground = self
            .array(sources, &foreground_key)?
            .slice_last(&foreground_key, self.config.foreground_slice)?;
        let s = impact_matrix(&foreground, &background)?;
        if s.shape() != (sources.impacts.len(), n) {
            return Err(IngestError::structure(
                IMPACT_EXTENSION,
                format!(
                    "shape {:?} for {} impacts and {n} sectors",
                    s.shape(),
                    sources.impacts.len()
                ),
            ));
        }
        system.meta.add_fileio(format!(
            "S parsed from {} ({foreground_key} and {background_key})",
            sources.container
        ));
        system.insert_extension(Extension {
            name: IMPACT_EXTENSION.to_string(),
            f: None,
            f_y: None,
            s: Some(Table::new(sources.impacts.clone(), sources.sectors.clone(), s)?),
            unit: UnitTable::new(sources.impacts.clone(), sources.impact_units.clone())?,
        });
        Ok(system)
    }

    fn build(
        &self,
        variant: ThemisVariant,
        sources: &Sources,
        location: &Path,
    ) -> Result<CanonicalSystem> {
        let system = match variant.derivation() {
            Derivation::Stored => self.stored(variant, sources, location)?,
            Derivation::CopyOf(base) => {
                let mut system = self.stored(base, sources, location)?;
                system.meta.change_meta(MetaField::Version, variant.scenario.code());
                system
                    .meta
                    .note(format!("THEMIS {variant} shares the matrices of {base}"));
                system
            }
            Derivation::Combined { base, mix } => {
                let mut system = self.stored(base, sources, location)?;
                system.meta.change_meta(MetaField::Version, variant.scenario.code());
                system.meta.change_meta(MetaField::Year, variant.year.as_str());
                system.meta.note(format!(
                    "THEMIS {variant} uses the technology of {base}; the electricity mix of {mix} is not applied"
                ));
                system
            }
        };
        finish(system, SourceKind::Themis)
    }

    /// Every scenario/year variant, reading the container once.
    #[instrument(level = "info", skip_all, fields(location = %location.display()))]
    pub fn parse_all(&self, location: &Path) -> Result<BTreeMap<ThemisVariant, CanonicalSystem>> {
        let repo = Repository::open(location)?;
        let sources = self.load(&repo)?;
        let mut systems = BTreeMap::new();
        for variant in ThemisVariant::all() {
            systems.insert(variant, self.build(variant, &sources, location)?);
        }
        info!(variants = systems.len(), "parsed all THEMIS variants");
        Ok(systems)
    }
}

impl SourceAdapter for ThemisAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Themis
    }

    #[instrument(level = "info", skip_all, fields(location = %location.display(), variant = %self.variant))]
    fn parse(&self, location: &Path) -> Result<CanonicalSystem> {
        let repo = Repository::open(location)?;
        let sources = self.load(&repo)?;
        self.build(self.variant, &sources, location)
    }
}

/// `[[S_f; 0], S_b]`: the foreground block padded with zero rows, followed
/// by the background block.
fn impact_matrix(foreground: &Matrix, background: &Matrix) -> Result<Matrix> {
    if foreground.rows() > background.rows() {
        return Err(IngestError::structure(
            IMPACT_EXTENSION,
            format!(
                "foreground has {} impact rows, background {}",
                foreground.rows(),
                background.rows()
            ),
        ));
    }
    let padding = Matrix::zeros(background.rows() - foreground.rows(), foreground.cols());
    foreground.vstack(&padding)?.hstack(background)
}

/// Parses one THEMIS variant from a folder or zip holding the `Data` folder.
pub fn parse_themis(
    path: &Path,
    variant: ThemisVariant,
    config: &ThemisConfig,
) -> Result<CanonicalSystem> {
    ThemisAdapter::new(config.clone(), variant).parse(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_scenarios_follow_their_base() {
        let er = ThemisVariant::new(ThemisScenario::Er, ThemisYear::Y2030);
        assert_eq!(
            er.derivation(),
            Derivation::CopyOf(ThemisVariant::new(ThemisScenario::Bm, ThemisYear::Y2030))
        );
        let combo = ThemisVariant::new(ThemisScenario::Combo, ThemisYear::Y2050);
        assert_eq!(
            combo.derivation(),
            Derivation::Combined {
                base: ThemisVariant::new(ThemisScenario::Bl, ThemisYear::Y2050),
                mix: ThemisVariant::new(ThemisScenario::Bl, ThemisYear::Y2010),
            }
        );
        assert_eq!(ThemisVariant::all().len(), 18);
    }

    #[test]
    fn scenario_codes_parse_case_insensitively() {
        assert_eq!("combo".parse::<ThemisScenario>().unwrap(), ThemisScenario::Combo);
        assert_eq!("adv".parse::<ThemisScenario>().unwrap(), ThemisScenario::Adv);
        assert!("2040".parse::<ThemisYear>().is_err());
    }

    #[test]
    fn foreground_impacts_are_padded_with_zero_rows() {
        let foreground = Matrix::from_rows(vec![vec![1.0]]).unwrap();
        let background = Matrix::from_rows(vec![vec![2.0, 3.0], vec![4.0, 5.0]]).unwrap();
        let s = impact_matrix(&foreground, &background).unwrap();
        assert_eq!(s.shape(), (2, 3));
        assert_eq!(s.data(), &[1.0, 2.0, 3.0, 0.0, 4.0, 5.0]);
    }
}
