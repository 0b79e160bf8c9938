use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use zip::ZipArchive;

use crate::mrio::ingest::error::{IngestError, Result};

/// A dataset location: an extracted folder or a zip archive.
///
/// Member names are relative paths with `/` separators in both cases, so
/// filename patterns apply uniformly. Archives are reopened for every read
/// and closed again before the call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repository {
    Directory(PathBuf),
    Archive(PathBuf),
}

impl Repository {
    /// Opens `path`, preferring an extracted folder over an equally named
    /// archive (`X/` wins over `X.zip`).
    pub fn open(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(Repository::Directory(path.to_path_buf()));
        }
        if is_zip(path) {
            let extracted = path.with_extension("");
            if extracted.is_dir() {
                debug!(folder = %extracted.display(), "using extracted folder instead of archive");
                return Ok(Repository::Directory(extracted));
            }
            if path.is_file() {
                return Ok(Repository::Archive(path.to_path_buf()));
            }
        }
        let zipped = PathBuf::from(format!("{}.zip", path.display()));
        if zipped.is_file() {
            return Ok(Repository::Archive(zipped));
        }
        Err(IngestError::MissingSourceFile {
            table: "repository".into(),
            location: path.to_path_buf(),
        })
    }

    /// Opens the folder holding a single plain file and returns that file's
    /// member name; zip files are opened as archives with no member.
    pub fn for_path(path: &Path) -> Result<(Self, Option<String>)> {
        if path.is_file() && !is_zip(path) {
            let parent = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| IngestError::InvalidParameter(format!("{} has no file name", path.display())))?;
            return Ok((Repository::Directory(parent.to_path_buf()), Some(name)));
        }
        Ok((Self::open(path)?, None))
    }

    pub fn location(&self) -> &Path {
        match self {
            Repository::Directory(path) | Repository::Archive(path) => path,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Repository::Archive(_))
    }

    /// All file members, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut members = match self {
            Repository::Directory(root) => {
                let mut members = Vec::new();
                walk(root, root, &mut members)?;
                members
            }
            Repository::Archive(path) => {
                let mut archive = ZipArchive::new(File::open(path)?)?;
                let mut members = Vec::with_capacity(archive.len());
                for i in 0..archive.len() {
                    let entry = archive.by_index(i)?;
                    if !entry.is_dir() {
                        members.push(entry.name().to_string());
                    }
                }
                members
            }
        };
        members.sort();
        Ok(members)
    }

    /// Members whose relative path matches `pattern`.
    pub fn find(&self, pattern: &Regex) -> Result<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|member| pattern.is_match(member))
            .collect())
    }

    /// Members whose file name (last path component) equals `name`.
    pub fn find_named(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|member| file_name(member) == name)
            .collect())
    }

    pub fn contains(&self, member: &str) -> Result<bool> {
        Ok(match self {
            Repository::Directory(root) => root.join(member).is_file(),
            Repository::Archive(_) => self.list()?.iter().any(|name| name == member),
        })
    }

    pub fn read(&self, member: &str) -> Result<Vec<u8>> {
        match self {
            Repository::Directory(root) => {
                let path = root.join(member);
                if !path.is_file() {
                    return Err(IngestError::MissingSourceFile {
                        table: member.to_string(),
                        location: root.clone(),
                    });
                }
                Ok(fs::read(path)?)
            }
            Repository::Archive(path) => {
                let mut archive = ZipArchive::new(File::open(path)?)?;
                let mut entry = archive.by_name(member).map_err(|err| match err {
                    zip::result::ZipError::FileNotFound => IngestError::MissingSourceFile {
                        table: member.to_string(),
                        location: path.clone(),
                    },
                    other => IngestError::from(other),
                })?;
                let size = usize::try_from(entry.size()).map_err(|_| {
                    IngestError::structure(member, "archive member too large to read into memory")
                })?;
                let mut buf = Vec::with_capacity(size);
                entry.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Reads a member as text, replacing invalid UTF-8.
    pub fn read_text(&self, member: &str) -> Result<String> {
        let bytes = self.read(member)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Human-readable path of a member, used in provenance entries.
    pub fn describe(&self, member: &str) -> String {
        match self {
            Repository::Directory(root) => root.join(member).display().to_string(),
            Repository::Archive(path) => format!("{}!{member}", path.display()),
        }
    }
}

/// Last path component of a member name.
pub fn file_name(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

/// Folder part of a member name, empty for top-level members.
pub fn parent_of(member: &str) -> &str {
    member.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn walk(root: &Path, dir: &Path, members: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, members)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect();
            members.push(parts.join("/"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_archive_is_an_error_not_an_absent_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IOT_2011_pxp.zip");
        fs::write(&path, b"not a zip archive").unwrap();

        let repo = Repository::open(&path).unwrap();
        assert!(repo.is_archive());
        assert!(matches!(repo.contains("Z.txt"), Err(IngestError::Archive(_))));
        assert!(matches!(repo.read("Z.txt"), Err(IngestError::Archive(_))));
    }

    #[test]
    fn member_names_split_on_slashes() {
        assert_eq!(file_name("air_emissions/F.txt"), "F.txt");
        assert_eq!(parent_of("air_emissions/F.txt"), "air_emissions");
        assert_eq!(parent_of("Z.txt"), "");
    }
}
