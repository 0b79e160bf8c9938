//! EXIOBASE 3 in its published text layout: core tables in one folder, one
//! subfolder per satellite account.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::mrio::ingest::adapters::{
    SourceAdapter, SourceKind, UNDEFINED_UNIT, compile, finish, new_system, pick_first, read_block,
};
use crate::mrio::ingest::config::{Exiobase3Config, SniffConfig};
use crate::mrio::ingest::error::{IngestError, ParseWarning, Result};
use crate::mrio::ingest::io::repository::{file_name, parent_of};
use crate::mrio::ingest::io::{LabelledBlock, Repository, read_grid};
use crate::mrio::ingest::model::{
    CanonicalSystem, Extension, IndexLevel, Key, MultiIndex, Table, UnitTable, schema,
};
use crate::mrio::ingest::provenance::MetaField;
use crate::mrio::ingest::sniff::{LayoutFormat, sniff_member};

const FILE_SEPARATOR: char = '\t';

#[derive(Debug, Clone)]
pub struct Exiobase3Adapter {
    config: Exiobase3Config,
    sniff: SniffConfig,
}

/// `file_parameters.json` as written next to the text files. Counts are
/// stored as strings by some writers.
#[derive(Debug, Deserialize)]
struct FileParameters {
    files: BTreeMap<String, FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    name: String,
    nr_index_col: Count,
    nr_header: Count,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(usize),
    Text(String),
}

impl Count {
    fn value(&self, file: &str) -> Result<usize> {
        match self {
            Count::Number(value) => Ok(*value),
            Count::Text(text) => text.trim().parse().map_err(|_| {
                IngestError::format(file, format!("'{text}' is not a row or column count"))
            }),
        }
    }
}

fn join(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

impl Exiobase3Adapter {
    pub fn new(config: Exiobase3Config, sniff: SniffConfig) -> Self {
        Self { config, sniff }
    }

    fn core_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.config.core_files.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Layouts declared in `folder`'s parameter file, keyed by file name.
    fn declared_layouts(
        &self,
        repo: &Repository,
        folder: &str,
        system: &mut CanonicalSystem,
    ) -> Result<HashMap<String, LayoutFormat>> {
        let member = join(folder, &self.config.parameter_file);
        if !repo.contains(&member)? {
            return Ok(HashMap::new());
        }
        let parameters: FileParameters = serde_json::from_str(&repo.read_text(&member)?)?;
        system
            .meta
            .add_fileio(format!("File parameters read from {}", repo.describe(&member)));
        let mut layouts = HashMap::new();
        for entry in parameters.files.values() {
            layouts.insert(
                file_name(&entry.name).to_string(),
                LayoutFormat {
                    separator: FILE_SEPARATOR,
                    header_rows: entry.nr_header.value(&member)?,
                    index_cols: entry.nr_index_col.value(&member)?,
                },
            );
        }
        Ok(layouts)
    }

    fn layout(
        &self,
        repo: &Repository,
        member: &str,
        declared: &HashMap<String, LayoutFormat>,
    ) -> Result<LayoutFormat> {
        match declared.get(file_name(member)) {
            Some(format) => Ok(*format),
            None => sniff_member(repo, member, &self.sniff),
        }
    }

    fn read_table(
        &self,
        repo: &Repository,
        member: &str,
        declared: &HashMap<String, LayoutFormat>,
        table: &str,
        system: &mut CanonicalSystem,
    ) -> Result<LabelledBlock> {
        let format = self.layout(repo, member, declared)?;
        let mut block = read_block(repo, member, &format, table, system)?;
        // Written files may carry a row with the index level names only.
        block.header.retain(|row| row.iter().any(|cell| !cell.is_empty()));
        Ok(block)
    }
}

impl SourceAdapter for Exiobase3Adapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Exiobase3
    }

    #[instrument(level = "info", skip_all, fields(location = %location.display()))]
    fn parse(&self, location: &Path) -> Result<CanonicalSystem> {
        let repo = Repository::open(location)?;
        let mut system = new_system(SourceKind::Exiobase3.name(), repo.location());
        let members = repo.list()?;

        let core_names = [self.core_name("Z"), self.core_name("A")];
        let mut anchors: Vec<String> = members
            .iter()
            .filter(|member| core_names.contains(&file_name(member)))
            .map(|member| parent_of(member).to_string())
            .collect();
        anchors.sort_by_key(|folder| (folder.matches('/').count(), folder.len()));
        anchors.dedup();
        let folder = pick_first("core", anchors, &mut system).ok_or_else(|| {
            IngestError::MissingSourceFile {
                table: "Z or A".into(),
                location: repo.location().to_path_buf(),
            }
        })?;

        self.read_metadata(&repo, &folder, location, &mut system)?;
        let declared = self.declared_layouts(&repo, &folder, &mut system)?;

        for key in ["Z", "A"] {
            let member = join(&folder, self.core_name(key));
            if !repo.contains(&member)? {
                continue;
            }
            let table = self
                .read_table(&repo, &member, &declared, key, &mut system)?
                .into_table(schema::REGION_SECTOR, schema::REGION_SECTOR)?;
            match key {
                "Z" => system.z = Some(table),
                _ => system.a = Some(table),
            }
        }
        let y_member = join(&folder, self.core_name("Y"));
        if repo.contains(&y_member)? {
            let y = self
                .read_table(&repo, &y_member, &declared, "Y", &mut system)?
                .into_table(schema::REGION_SECTOR, schema::REGION_CATEGORY)?;
            system.y = Some(y);
        }
        let sectors = system
            .sector_index()
            .cloned()
            .ok_or_else(|| IngestError::structure("core", "neither Z nor A could be read"))?;

        let x_member = join(&folder, self.core_name("x"));
        if repo.contains(&x_member)? {
            let block = self.read_table(&repo, &x_member, &declared, "x", &mut system)?;
            let index = block.row_index(schema::REGION_SECTOR)?;
            if index != sectors || block.values.cols() == 0 {
                return Err(IngestError::structure(
                    "x",
                    "total output is not aligned with the region/sector index",
                ));
            }
            system.x = Some((0..index.len()).map(|row| block.values.get(row, 0)).collect());
        }

        let unit_member = join(&folder, &self.config.unit_file);
        system.unit = Some(if repo.contains(&unit_member)? {
            self.read_units(&repo, &unit_member, &sectors, &mut system)?
        } else {
            system.meta.note(format!(
                "No unit file for the core tables, assuming {}",
                self.config.monetary_unit
            ));
            UnitTable::uniform(sectors.clone(), &self.config.monetary_unit)
        });

        for extension_folder in self.extension_folders(&members, &folder) {
            if let Some(extension) = self.read_extension(&repo, &extension_folder, &mut system)? {
                system.insert_extension(extension);
            }
        }

        system.rename_regions(&self.config.region_renames)?;
        finish(system, SourceKind::Exiobase3)
    }
}

/// Parses an EXIOBASE 3 release (`IOT_YYYY_pxp` folder or zip).
pub fn parse_exiobase3(
    path: &Path,
    config: &Exiobase3Config,
    sniff: &SniffConfig,
) -> Result<CanonicalSystem> {
    Exiobase3Adapter::new(config.clone(), sniff.clone()).parse(path)
}

impl Exiobase3Adapter {
    /// Version, year and system from `metadata.json` and the folder name.
    fn read_metadata(
        &self,
        repo: &Repository,
        folder: &str,
        location: &Path,
        system: &mut CanonicalSystem,
    ) -> Result<()> {
        let member = join(folder, "metadata.json");
        if repo.contains(&member)? {
            let value: serde_json::Value = serde_json::from_str(&repo.read_text(&member)?)?;
            system
                .meta
                .add_fileio(format!("Metadata read from {}", repo.describe(&member)));
            for (key, field) in [
                ("description", MetaField::Description),
                ("version", MetaField::Version),
                ("system", MetaField::System),
                ("year", MetaField::Year),
            ] {
                match value.get(key) {
                    Some(serde_json::Value::String(text)) => system.meta.change_meta(field, text.clone()),
                    Some(serde_json::Value::Number(number)) => {
                        system.meta.change_meta(field, number.to_string())
                    }
                    _ => {}
                }
            }
        }

        let name_pattern: Regex = compile(r"IOT_(\d{4})_(pxp|ixi)")?;
        let path_text = format!("{}/{folder}", location.display());
        match name_pattern.captures(&path_text) {
            Some(caps) => {
                system.meta.change_meta(MetaField::Year, &caps[1]);
                system.meta.change_meta(MetaField::System, &caps[2]);
            }
            None if system.meta.year.is_none() => system
                .meta
                .note("Year and system not found in the folder name"),
            None => {}
        }
        if system.meta.version.is_none() {
            system.meta.change_meta(MetaField::Version, "3");
        }
        Ok(())
    }

    /// Reads a unit file (`index..., unit`) and aligns it with `index`.
    fn read_units(
        &self,
        repo: &Repository,
        member: &str,
        index: &MultiIndex,
        system: &mut CanonicalSystem,
    ) -> Result<UnitTable> {
        let rows = read_grid(&repo.read_text(member)?, FILE_SEPARATOR)?;
        let width = index.names().len();
        let mut units: HashMap<Key, String> = HashMap::new();
        for row in rows.iter().skip(1) {
            if row.len() <= width {
                continue;
            }
            let unit = row.last().cloned().unwrap_or_default();
            units.insert(row[..width].to_vec(), unit);
        }
        system
            .meta
            .add_fileio(format!("Units parsed from {}", repo.describe(member)));
        let aligned = index
            .keys()
            .iter()
            .map(|key| units.get(key).cloned().unwrap_or_else(|| UNDEFINED_UNIT.to_string()))
            .collect();
        UnitTable::new(index.clone(), aligned)
    }

    /// Direct subfolders of the core folder that hold `F` or `S`.
    fn extension_folders(&self, members: &[String], core: &str) -> Vec<String> {
        let markers: Vec<&str> = ["F", "S"]
            .iter()
            .filter_map(|key| self.config.extension_files.get(*key).map(String::as_str))
            .collect();
        let mut folders: Vec<String> = members
            .iter()
            .filter(|member| markers.contains(&file_name(member)))
            .map(|member| parent_of(member).to_string())
            .filter(|folder| !folder.is_empty() && folder != core && parent_of(folder) == core)
            .collect();
        folders.sort();
        folders.dedup();
        folders
    }

    fn read_extension(
        &self,
        repo: &Repository,
        folder: &str,
        system: &mut CanonicalSystem,
    ) -> Result<Option<Extension>> {
        let name = file_name(folder).to_string();
        let declared = self.declared_layouts(repo, folder, system)?;

        let has_final_demand = match self.config.extension_files.get("F_Y") {
            Some(f_y) => repo.contains(&join(folder, f_y))?,
            None => false,
        };
        let mut tables: BTreeMap<&str, Table> = BTreeMap::new();
        for (key, file) in &self.config.extension_files {
            let member = join(folder, file);
            if !repo.contains(&member)? || (key == "F_hh" && has_final_demand) {
                continue;
            }
            let block = self.read_table(repo, &member, &declared, &format!("{name}.{key}"), system)?;
            let rows = match block.labels.first().map_or(0, Vec::len) {
                1 => schema::STRESSOR,
                2 => schema::STRESSOR_COMPARTMENT,
                other => {
                    return Err(IngestError::UnsupportedVersion {
                        source_name: "EXIOBASE 3".into(),
                        detail: format!("{other} index columns in {}", repo.describe(&member)),
                    });
                }
            };
            let columns = if key.starts_with("F_") {
                schema::REGION_CATEGORY
            } else {
                schema::REGION_SECTOR
            };
            let table_key = match key.as_str() {
                "F" => "F",
                "S" => "S",
                _ => "F_Y",
            };
            if key == "F_hh" {
                system
                    .meta
                    .note(format!("Final demand table F_hh of {name} renamed to F_Y"));
            }
            tables.insert(table_key, block.into_table(rows, columns)?);
        }

        let f = tables.remove("F");
        let s = tables.remove("S");
        let Some(stressors) = f.as_ref().or(s.as_ref()).map(|table| table.index().clone()) else {
            system.warn(ParseWarning::ExtensionUnavailable {
                extension: name,
                reason: "neither F nor S present".into(),
            });
            return Ok(None);
        };
        let unit_member = join(folder, &self.config.unit_file);
        let unit = if repo.contains(&unit_member)? {
            self.read_units(repo, &unit_member, &stressors, system)?
        } else {
            UnitTable::uniform(stressors, UNDEFINED_UNIT)
        };
        debug!(extension = %name, has_f = f.is_some(), has_s = s.is_some(), "EXIOBASE 3 extension");
        Ok(Some(Extension {
            name,
            f,
            f_y: tables.remove("F_Y"),
            s,
            unit,
        }))
    }
}
