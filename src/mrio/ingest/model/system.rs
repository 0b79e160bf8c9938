use std::collections::{BTreeMap, HashSet};

use crate::mrio::ingest::error::{IngestError, ParseWarning, Result};
use crate::mrio::ingest::model::index::{IndexLevel, MultiIndex};
use crate::mrio::ingest::model::table::{Axis, Table, UnitTable};
use crate::mrio::ingest::provenance::ProvenanceLog;

/// Satellite account sharing the column indexing of the core system.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub name: String,
    /// Factor use, stressors × (region, sector).
    pub f: Option<Table>,
    /// Final-demand counterpart, stressors × (region, category).
    pub f_y: Option<Table>,
    /// Coefficient form, for sources that ship `S` instead of `F`.
    pub s: Option<Table>,
    pub unit: UnitTable,
}

impl Extension {
    pub fn new(name: impl Into<String>, f: Table, unit: UnitTable) -> Self {
        Self {
            name: name.into(),
            f: Some(f),
            f_y: None,
            s: None,
            unit,
        }
    }

    /// Row index of the stressor tables.
    pub fn stressors(&self) -> Option<&MultiIndex> {
        self.f.as_ref().or(self.s.as_ref()).map(Table::index)
    }

    fn tables_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut Table)> {
        [("F", &mut self.f), ("F_Y", &mut self.f_y), ("S", &mut self.s)]
            .into_iter()
            .filter_map(|(name, table)| table.as_mut().map(|table| (name, table)))
    }

    fn validate(&self, sectors: &MultiIndex, final_demand: Option<&MultiIndex>) -> Result<()> {
        let stressors = self.stressors().ok_or_else(|| {
            IngestError::structure(&self.name, "extension has neither F nor S")
        })?;
        for (label, table) in [("F", &self.f), ("S", &self.s)] {
            if let Some(table) = table {
                if table.columns() != sectors {
                    return Err(IngestError::structure(
                        format!("{}.{label}", self.name),
                        "columns differ from the core region/sector columns",
                    ));
                }
                if table.index() != stressors {
                    return Err(IngestError::structure(
                        format!("{}.{label}", self.name),
                        "F and S carry different stressors",
                    ));
                }
            }
        }
        if let Some(f_y) = &self.f_y {
            if let Some(columns) = final_demand {
                if f_y.columns() != columns {
                    return Err(IngestError::structure(
                        format!("{}.F_Y", self.name),
                        "columns differ from the final demand columns",
                    ));
                }
            }
            if f_y.index() != stressors {
                return Err(IngestError::structure(
                    format!("{}.F_Y", self.name),
                    "index differs from F",
                ));
            }
        }
        if self.unit.index() != stressors {
            return Err(IngestError::structure(
                format!("{}.unit", self.name),
                "unit index differs from the stressor index",
            ));
        }
        Ok(())
    }
}

/// The canonical result of every adapter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalSystem {
    /// Inter-industry flows.
    pub z: Option<Table>,
    /// Final demand.
    pub y: Option<Table>,
    /// Technical coefficients.
    pub a: Option<Table>,
    /// Leontief inverse.
    pub l: Option<Table>,
    /// Total output, aligned with the region/sector index.
    pub x: Option<Vec<f64>>,
    /// Units of the rows of `Z`.
    pub unit: Option<UnitTable>,
    pub extensions: BTreeMap<String, Extension>,
    pub meta: ProvenanceLog,
    pub warnings: Vec<ParseWarning>,
}

impl CanonicalSystem {
    pub fn new(meta: ProvenanceLog) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    /// The shared region/sector index (taken from `Z`, else `A`).
    pub fn sector_index(&self) -> Option<&MultiIndex> {
        self.z.as_ref().or(self.a.as_ref()).map(Table::index)
    }

    pub fn regions(&self) -> Vec<String> {
        self.sector_index()
            .map(|index| index.level_values(IndexLevel::Region))
            .unwrap_or_default()
    }

    pub fn sectors(&self) -> Vec<String> {
        self.sector_index()
            .map(|index| index.level_values(IndexLevel::Sector))
            .unwrap_or_default()
    }

    pub fn extension(&self, name: &str) -> Option<&Extension> {
        self.extensions.get(name)
    }

    pub fn insert_extension(&mut self, extension: Extension) {
        self.extensions.insert(extension.name.clone(), extension);
    }

    /// Records a degradation as a warning, a provenance note and a log event.
    pub fn warn(&mut self, warning: ParseWarning) {
        tracing::warn!(%warning, "degraded parse");
        self.meta.note(warning.to_string());
        self.warnings.push(warning);
    }

    /// Checks the joint-indexing invariant across all member tables.
    pub fn validate(&self) -> Result<()> {
        let sectors = self
            .sector_index()
            .ok_or_else(|| IngestError::structure("system", "neither Z nor A present"))?;

        for (label, table) in [("Z", &self.z), ("A", &self.a), ("L", &self.l)] {
            if let Some(table) = table {
                if table.index() != sectors || table.columns() != sectors {
                    return Err(IngestError::structure(
                        label,
                        "not square over the shared region/sector index",
                    ));
                }
            }
        }
        if let Some(y) = &self.y {
            if y.index() != sectors {
                return Err(IngestError::structure(
                    "Y",
                    "rows differ from the region/sector index",
                ));
            }
        }
        if let Some(x) = &self.x {
            if x.len() != sectors.len() {
                return Err(IngestError::structure(
                    "x",
                    format!("{} entries for {} sectors", x.len(), sectors.len()),
                ));
            }
        }
        if let Some(unit) = &self.unit {
            if unit.index() != sectors {
                return Err(IngestError::structure(
                    "unit",
                    "index differs from the region/sector index",
                ));
            }
        }

        let final_demand = self.y.as_ref().map(Table::columns);
        for extension in self.extensions.values() {
            extension.validate(sectors, final_demand)?;
        }
        Ok(())
    }

    /// Renames regions across every member table.
    pub fn rename_regions(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.rename(IndexLevel::Region, map)
    }

    /// Renames sectors across every member table.
    pub fn rename_sectors(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.rename(IndexLevel::Sector, map)
    }

    /// Renames final demand categories across `Y` and every `F_Y`.
    pub fn rename_categories(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.rename(IndexLevel::Category, map)
    }

    /// Applies an injective label map to one level of every index that
    /// carries it, so index identity between member tables is preserved.
    fn rename(&mut self, level: IndexLevel, map: &BTreeMap<String, String>) -> Result<()> {
        let present: HashSet<String> = self.level_values(level);
        let map: BTreeMap<String, String> = map
            .iter()
            .filter(|(old, new)| present.contains(*old) && old != new)
            .map(|(old, new)| (old.clone(), new.clone()))
            .collect();
        if map.is_empty() {
            return Ok(());
        }
        check_injective(level, &map, &present)?;

        let rename_table = |table: &mut Table| -> Result<()> {
            let mut out = table.clone();
            if out.index().has_level(level) {
                out = out.rename_level(Axis::Rows, level, &map)?;
            }
            if out.columns().has_level(level) {
                out = out.rename_level(Axis::Columns, level, &map)?;
            }
            *table = out;
            Ok(())
        };

        for table in [&mut self.z, &mut self.y, &mut self.a, &mut self.l]
            .into_iter()
            .flatten()
        {
            rename_table(table)?;
        }
        if let Some(unit) = &mut self.unit {
            if unit.index().has_level(level) {
                *unit = unit.rename_level(level, &map)?;
            }
        }
        for extension in self.extensions.values_mut() {
            for (_, table) in extension.tables_mut() {
                rename_table(table)?;
            }
            if extension.unit.index().has_level(level) {
                extension.unit = extension.unit.rename_level(level, &map)?;
            }
        }

        let pairs: Vec<String> = map.iter().map(|(old, new)| format!("{old}->{new}")).collect();
        self.meta
            .add_modify(format!("Renamed {} {level} labels: {}", map.len(), pairs.join(", ")));
        Ok(())
    }

    fn level_values(&self, level: IndexLevel) -> HashSet<String> {
        let mut values = HashSet::new();
        let mut collect = |index: &MultiIndex| values.extend(index.level_values(level));
        for table in [&self.z, &self.y, &self.a, &self.l].into_iter().flatten() {
            collect(table.index());
            collect(table.columns());
        }
        for extension in self.extensions.values() {
            for table in [&extension.f, &extension.f_y, &extension.s]
                .into_iter()
                .flatten()
            {
                collect(table.index());
                collect(table.columns());
            }
        }
        values
    }
}

/// A rename must not merge two labels, neither with each other nor with an
/// untouched label.
fn check_injective(
    level: IndexLevel,
    map: &BTreeMap<String, String>,
    present: &HashSet<String>,
) -> Result<()> {
    let mut targets = HashSet::new();
    for (old, new) in map {
        if !targets.insert(new.as_str()) {
            return Err(IngestError::InvalidParameter(format!(
                "{level} rename maps several labels onto '{new}' (one of them '{old}')"
            )));
        }
        if present.contains(new) && !map.contains_key(new) {
            return Err(IngestError::InvalidParameter(format!(
                "{level} rename of '{old}' collides with existing label '{new}'"
            )));
        }
    }
    Ok(())
}
