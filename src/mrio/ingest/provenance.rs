use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mrio::ingest::error::Result;

/// Category of a provenance entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A raw file was read.
    FileIo,
    /// Numbers or labels were changed irreversibly.
    Modify,
    /// Free-form remark, including metadata changes and degradations.
    Note,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::FileIo => f.write_str("FILEIO"),
            EntryKind::Modify => f.write_str("MODIFY"),
            EntryKind::Note => f.write_str("NOTE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}: {}",
            self.timestamp.format("%Y%m%d %H:%M:%S"),
            self.kind,
            self.text
        )
    }
}

/// Append-only record of what happened while a system was parsed.
///
/// Entries are never edited after they are pushed. Metadata changes go
/// through [`ProvenanceLog::change_meta`], which appends a note instead of
/// silently overwriting the previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceLog {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub system: Option<String>,
    pub year: Option<String>,
    pub location: Option<String>,
    entries: Vec<LogEntry>,
}

/// Scalar metadata fields tracked alongside the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    Name,
    Description,
    Version,
    System,
    Year,
    Location,
}

impl MetaField {
    fn as_str(&self) -> &'static str {
        match self {
            MetaField::Name => "name",
            MetaField::Description => "description",
            MetaField::Version => "version",
            MetaField::System => "system",
            MetaField::Year => "year",
            MetaField::Location => "location",
        }
    }
}

impl ProvenanceLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn entries_of(&self, kind: EntryKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }

    pub fn file_io(&self) -> Vec<&LogEntry> {
        self.entries_of(EntryKind::FileIo).collect()
    }

    pub fn modifications(&self) -> Vec<&LogEntry> {
        self.entries_of(EntryKind::Modify).collect()
    }

    pub fn notes(&self) -> Vec<&LogEntry> {
        self.entries_of(EntryKind::Note).collect()
    }

    pub fn add_fileio(&mut self, text: impl Into<String>) {
        self.push(EntryKind::FileIo, text.into());
    }

    pub fn add_modify(&mut self, text: impl Into<String>) {
        self.push(EntryKind::Modify, text.into());
    }

    pub fn note(&mut self, text: impl Into<String>) {
        self.push(EntryKind::Note, text.into());
    }

    /// Sets a metadata field and records the change.
    pub fn change_meta(&mut self, field: MetaField, value: impl Into<String>) {
        let value = value.into();
        let slot = match field {
            MetaField::Name => &mut self.name,
            MetaField::Description => &mut self.description,
            MetaField::Version => &mut self.version,
            MetaField::System => &mut self.system,
            MetaField::Year => &mut self.year,
            MetaField::Location => &mut self.location,
        };
        let previous = slot.replace(value.clone());
        if previous.as_deref() == Some(value.as_str()) {
            return;
        }
        let text = match previous {
            Some(old) => format!("Changed parameter \"{}\" from \"{old}\" to \"{value}\"", field.as_str()),
            None => format!("Set parameter \"{}\" to \"{value}\"", field.as_str()),
        };
        self.push(EntryKind::Note, text);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    fn push(&mut self, kind: EntryKind, text: String) {
        tracing::debug!(%kind, text = %text, "provenance entry");
        self.entries.push(LogEntry {
            kind,
            text,
            timestamp: Utc::now(),
        });
    }
}

impl fmt::Display for ProvenanceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "n/a".into());
        writeln!(f, "Description: {}", show(&self.description))?;
        writeln!(f, "MRIO Name: {}", show(&self.name))?;
        writeln!(f, "System: {}", show(&self.system))?;
        writeln!(f, "Version: {}", show(&self.version))?;
        writeln!(f, "Year: {}", show(&self.year))?;
        writeln!(f, "Location: {}", show(&self.location))?;
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_insertion_order_and_kind() {
        let mut log = ProvenanceLog::new("test");
        log.add_fileio("read a.txt");
        log.add_modify("dropped totals");
        log.change_meta(MetaField::Version, "1");
        log.change_meta(MetaField::Version, "1");

        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.file_io().len(), 1);
        assert_eq!(log.modifications()[0].text, "dropped totals");
        assert_eq!(log.version.as_deref(), Some("1"));
    }

    #[test]
    fn log_survives_json_roundtrip() {
        let mut log = ProvenanceLog::new("test");
        log.note("hello");
        let restored = ProvenanceLog::from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(restored, log);
    }
}
