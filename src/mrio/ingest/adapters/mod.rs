//! One adapter per source family. Each turns a published release into a
//! validated [`CanonicalSystem`].

pub mod cecilia;
pub mod eora;
pub mod exiobase;
pub mod exiobase3;
pub mod oecd;
pub mod themis;
pub mod wiod;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::mrio::ingest::config::IngestConfig;
use crate::mrio::ingest::error::{IngestError, ParseWarning, Result};
use crate::mrio::ingest::io::{LabelledBlock, Repository};
use crate::mrio::ingest::model::{CanonicalSystem, DroppedSlice};
use crate::mrio::ingest::provenance::ProvenanceLog;
use crate::mrio::ingest::sniff::LayoutFormat;

pub use cecilia::{CeciliaAdapter, CeciliaStep, MATERIALS_EXTENSION, parse_cecilia};
pub use eora::{CountryNames, EoraAdapter, PriceType, parse_eora26};
pub use exiobase::{
    Characterisation, ExiobaseAdapter, TableForm, parse_exiobase1, parse_exiobase2,
    parse_extension_file,
};
pub use exiobase3::{Exiobase3Adapter, parse_exiobase3};
pub use oecd::{OecdAdapter, parse_oecd};
pub use themis::{
    Derivation, IMPACT_EXTENSION, ThemisAdapter, ThemisScenario, ThemisVariant, ThemisYear,
    parse_themis,
};
pub use wiod::{NameScheme, WiodAdapter, parse_wiod};

/// Unit recorded when a source does not state one.
pub const UNDEFINED_UNIT: &str = "undef";

/// Supported source families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Exiobase1,
    Exiobase2,
    Exiobase3,
    Wiod,
    Oecd,
    Eora26,
    Themis,
    Cecilia,
}

impl SourceKind {
    pub const ALL: [SourceKind; 8] = [
        SourceKind::Exiobase1,
        SourceKind::Exiobase2,
        SourceKind::Exiobase3,
        SourceKind::Wiod,
        SourceKind::Oecd,
        SourceKind::Eora26,
        SourceKind::Themis,
        SourceKind::Cecilia,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Exiobase1 | SourceKind::Exiobase2 | SourceKind::Exiobase3 => "EXIOBASE",
            SourceKind::Wiod => "WIOD",
            SourceKind::Oecd => "OECD-ICIO",
            SourceKind::Eora26 => "Eora26",
            SourceKind::Themis => "THEMIS",
            SourceKind::Cecilia => "Cecilia",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Exiobase1 => f.write_str("EXIOBASE 1"),
            SourceKind::Exiobase2 => f.write_str("EXIOBASE 2"),
            SourceKind::Exiobase3 => f.write_str("EXIOBASE 3"),
            other => f.write_str(other.name()),
        }
    }
}

/// Common surface of all adapters.
pub trait SourceAdapter {
    fn kind(&self) -> SourceKind;

    /// Parses the release stored at `location` (folder, archive or file).
    fn parse(&self, location: &Path) -> Result<CanonicalSystem>;
}

/// Adapter with default parameters for `kind`.
///
/// Sources that need a year or a variant to pick files (WIOD and OECD
/// folders, Eora folders) expect `location` to point at the file itself.
pub fn adapter_for(kind: SourceKind, config: &IngestConfig) -> Result<Box<dyn SourceAdapter>> {
    Ok(match kind {
        SourceKind::Exiobase1 => Box::new(ExiobaseAdapter::version1(
            config.exiobase.clone(),
            config.sniff.clone(),
        )?),
        SourceKind::Exiobase2 => Box::new(ExiobaseAdapter::version2(
            config.exiobase.clone(),
            config.sniff.clone(),
        )?),
        SourceKind::Exiobase3 => Box::new(Exiobase3Adapter::new(
            config.exiobase3.clone(),
            config.sniff.clone(),
        )),
        SourceKind::Wiod => Box::new(WiodAdapter::new(config.wiod.clone())),
        SourceKind::Oecd => Box::new(OecdAdapter::new(config.oecd.clone())?),
        SourceKind::Eora26 => Box::new(EoraAdapter::new(config.eora.clone())),
        SourceKind::Themis => Box::new(ThemisAdapter::new(
            config.themis.clone(),
            ThemisVariant::default(),
        )),
        SourceKind::Cecilia => Box::new(CeciliaAdapter::new(
            config.cecilia.clone(),
            config.transform.clone(),
            CeciliaStep::Preprocessed,
        )),
    })
}

/// Fresh system with the source name recorded in its log.
pub(crate) fn new_system(name: &str, location: &Path) -> CanonicalSystem {
    let mut meta = ProvenanceLog::new(name);
    meta.location = Some(location.display().to_string());
    CanonicalSystem::new(meta)
}

pub(crate) fn compile(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(pattern)?)
}

/// Finds the member for one logical table. Several matches keep the first
/// and record an [`ParseWarning::AmbiguousSourceFile`].
pub(crate) fn locate(
    repo: &Repository,
    table: &str,
    pattern: &Regex,
    system: &mut CanonicalSystem,
) -> Result<Option<String>> {
    let candidates = repo.find(pattern)?;
    Ok(pick_first(table, candidates, system))
}

/// Like [`locate`], but a missing member is fatal.
pub(crate) fn require(
    repo: &Repository,
    table: &str,
    pattern: &Regex,
    system: &mut CanonicalSystem,
) -> Result<String> {
    locate(repo, table, pattern, system)?.ok_or_else(|| IngestError::MissingSourceFile {
        table: table.to_string(),
        location: repo.location().to_path_buf(),
    })
}

pub(crate) fn pick_first(
    table: &str,
    mut candidates: Vec<String>,
    system: &mut CanonicalSystem,
) -> Option<String> {
    match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        _ => {
            let chosen = candidates[0].clone();
            system.warn(ParseWarning::AmbiguousSourceFile {
                table: table.to_string(),
                candidates,
                chosen: chosen.clone(),
            });
            Some(chosen)
        }
    }
}

/// Reads and parses one delimited member, logging the file access.
pub(crate) fn read_block(
    repo: &Repository,
    member: &str,
    format: &LayoutFormat,
    table: &str,
    system: &mut CanonicalSystem,
) -> Result<LabelledBlock> {
    let text = repo.read_text(member)?;
    let block = LabelledBlock::parse(&text, format, table)?;
    debug!(table, member, shape = ?block.values.shape(), "parsed delimited table");
    system
        .meta
        .add_fileio(format!("{table} parsed from {}", repo.describe(member)));
    Ok(block)
}

/// One modify entry per removed slice, quantifying the loss.
pub(crate) fn log_dropped(
    system: &mut CanonicalSystem,
    table: &str,
    what: &str,
    dropped: &[DroppedSlice],
) {
    for slice in dropped {
        system.meta.add_modify(format!(
            "Removed {what} {} from {table} - losing {}",
            slice.key.join("/"),
            slice.total
        ));
    }
}

/// Makes repeated labels unique by appending ` (2)`, ` (3)`, ... to later
/// occurrences. The first occurrence keeps its name.
pub(crate) fn unique_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: std::collections::HashSet<String> = labels.iter().cloned().collect();
    labels
        .into_iter()
        .map(|label| {
            let count = seen.entry(label.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                return label;
            }
            let mut n = *count;
            loop {
                let candidate = format!("{label} ({n})");
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

/// Validates the joint indexing and emits the summary event.
pub(crate) fn finish(system: CanonicalSystem, kind: SourceKind) -> Result<CanonicalSystem> {
    system.validate()?;
    info!(
        source = %kind,
        regions = system.regions().len(),
        sectors = system.sectors().len(),
        extensions = system.extensions.len(),
        warnings = system.warnings.len(),
        "parsed MRIO system"
    );
    Ok(system)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_labels_get_suffixes() {
        let labels = unique_labels(
            ["GWP", "GWP", "ODP", "GWP"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        assert_eq!(labels, vec!["GWP", "GWP (2)", "ODP", "GWP (3)"]);
    }

    #[test]
    fn ambiguous_match_keeps_first_and_warns() {
        let mut system = CanonicalSystem::default();
        let chosen = pick_first(
            "Z",
            vec!["a/Z.txt".to_string(), "b/Z.txt".to_string()],
            &mut system,
        );
        assert_eq!(chosen.as_deref(), Some("a/Z.txt"));
        assert_eq!(system.warnings.len(), 1);
        assert_eq!(system.meta.notes().len(), 1);
    }
}
