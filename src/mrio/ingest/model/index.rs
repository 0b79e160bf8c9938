use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::mrio::ingest::error::{IngestError, Result};

/// Controlled vocabulary for index level names. Joins and aggregations match
/// on these names rather than on level positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLevel {
    Region,
    Sector,
    Category,
    Stressor,
    Compartment,
    Unit,
    InputType,
    Source,
}

impl IndexLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            IndexLevel::Region => "region",
            IndexLevel::Sector => "sector",
            IndexLevel::Category => "category",
            IndexLevel::Stressor => "stressor",
            IndexLevel::Compartment => "compartment",
            IndexLevel::Unit => "unit",
            IndexLevel::InputType => "inputtype",
            IndexLevel::Source => "source",
        }
    }
}

impl fmt::Display for IndexLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexLevel {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "region" => IndexLevel::Region,
            "sector" => IndexLevel::Sector,
            "category" => IndexLevel::Category,
            "stressor" => IndexLevel::Stressor,
            "compartment" => IndexLevel::Compartment,
            "unit" => IndexLevel::Unit,
            "inputtype" => IndexLevel::InputType,
            "source" => IndexLevel::Source,
            other => {
                return Err(IngestError::InvalidParameter(format!(
                    "'{other}' is not an index level name"
                )));
            }
        })
    }
}

/// Frequently used index schemas.
pub mod schema {
    use super::IndexLevel::{self, *};

    pub const REGION_SECTOR: &[IndexLevel] = &[Region, Sector];
    pub const REGION_SECTOR_UNIT: &[IndexLevel] = &[Region, Sector, Unit];
    pub const REGION_CATEGORY: &[IndexLevel] = &[Region, Category];
    pub const REGION: &[IndexLevel] = &[Region];
    pub const STRESSOR: &[IndexLevel] = &[Stressor];
    pub const STRESSOR_UNIT: &[IndexLevel] = &[Stressor, Unit];
    pub const STRESSOR_COMPARTMENT: &[IndexLevel] = &[Stressor, Compartment];
    pub const STRESSOR_COMPARTMENT_UNIT: &[IndexLevel] = &[Stressor, Compartment, Unit];
    pub const STRESSOR_SOURCE: &[IndexLevel] = &[Stressor, Source];
    pub const INPUTTYPE: &[IndexLevel] = &[InputType];
    pub const INPUTTYPE_CATEGORY: &[IndexLevel] = &[InputType, Category];
}

/// One label tuple of a [`MultiIndex`].
pub type Key = Vec<String>;

/// Ordered, unique, named multi-level index.
#[derive(Debug, Clone)]
pub struct MultiIndex {
    names: Vec<IndexLevel>,
    keys: Vec<Key>,
    positions: HashMap<Key, usize>,
}

impl PartialEq for MultiIndex {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names && self.keys == other.keys
    }
}

impl MultiIndex {
    /// Builds an index, rejecting keys of the wrong arity and duplicates.
    pub fn new(names: Vec<IndexLevel>, keys: Vec<Key>) -> Result<Self> {
        let unique_names: HashSet<_> = names.iter().collect();
        if names.is_empty() || unique_names.len() != names.len() {
            return Err(IngestError::structure(
                "index",
                format!("invalid level names {names:?}"),
            ));
        }

        let mut positions = HashMap::with_capacity(keys.len());
        for (pos, key) in keys.iter().enumerate() {
            if key.len() != names.len() {
                return Err(IngestError::structure(
                    "index",
                    format!("key {key:?} does not match levels {names:?}"),
                ));
            }
            if positions.insert(key.clone(), pos).is_some() {
                return Err(IngestError::structure(
                    "index",
                    format!("duplicate key {key:?}"),
                ));
            }
        }

        Ok(Self {
            names,
            keys,
            positions,
        })
    }

    /// Single level index from plain labels.
    pub fn single<I, S>(level: IndexLevel, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = labels.into_iter().map(|label| vec![label.into()]).collect();
        Self::new(vec![level], keys)
    }

    /// Cartesian product, first level varying slowest.
    pub fn from_product(names: &[IndexLevel], levels: &[Vec<String>]) -> Result<Self> {
        if names.len() != levels.len() {
            return Err(IngestError::structure(
                "index",
                "number of level names and level value lists differ",
            ));
        }
        let mut keys: Vec<Key> = vec![Vec::new()];
        for values in levels {
            let mut next = Vec::with_capacity(keys.len() * values.len());
            for prefix in &keys {
                for value in values {
                    let mut key = prefix.clone();
                    key.push(value.clone());
                    next.push(key);
                }
            }
            keys = next;
        }
        Self::new(names.to_vec(), keys)
    }

    pub fn names(&self) -> &[IndexLevel] {
        &self.names
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn key(&self, position: usize) -> &Key {
        &self.keys[position]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn position(&self, key: &[String]) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn contains(&self, key: &[String]) -> bool {
        self.positions.contains_key(key)
    }

    pub fn level_position(&self, level: IndexLevel) -> Option<usize> {
        self.names.iter().position(|name| *name == level)
    }

    pub fn has_level(&self, level: IndexLevel) -> bool {
        self.level_position(level).is_some()
    }

    fn require_level(&self, level: IndexLevel) -> Result<usize> {
        self.level_position(level).ok_or_else(|| {
            IngestError::structure("index", format!("no '{level}' level in {:?}", self.names))
        })
    }

    /// Distinct values of one level, in order of first appearance.
    pub fn level_values(&self, level: IndexLevel) -> Vec<String> {
        let Some(pos) = self.level_position(level) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.keys
            .iter()
            .filter(|key| seen.insert(key[pos].as_str()))
            .map(|key| key[pos].clone())
            .collect()
    }

    /// Value of `level` for the key at `position`.
    pub fn value(&self, position: usize, level: IndexLevel) -> Option<&str> {
        self.level_position(level)
            .map(|pos| self.keys[position][pos].as_str())
    }

    /// Removes one level. Fails if the remaining keys are no longer unique.
    pub fn drop_level(&self, level: IndexLevel) -> Result<Self> {
        let pos = self.require_level(level)?;
        let mut names = self.names.clone();
        names.remove(pos);
        let keys = self
            .keys
            .iter()
            .map(|key| {
                let mut key = key.clone();
                key.remove(pos);
                key
            })
            .collect();
        Self::new(names, keys)
    }

    /// Index restricted to `positions`, in the given order.
    pub fn take(&self, positions: &[usize]) -> Result<Self> {
        let keys = positions.iter().map(|pos| self.keys[*pos].clone()).collect();
        Self::new(self.names.clone(), keys)
    }

    /// Applies `map` to every value of `level`. Values missing from the map
    /// are left untouched.
    pub fn rename_level_values(
        &self,
        level: IndexLevel,
        map: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let pos = self.require_level(level)?;
        let keys = self
            .keys
            .iter()
            .map(|key| {
                let mut key = key.clone();
                if let Some(new) = map.get(&key[pos]) {
                    key[pos] = new.clone();
                }
                key
            })
            .collect();
        Self::new(self.names.clone(), keys)
    }

    /// Replaces the level names without touching the keys.
    pub fn with_names(&self, names: Vec<IndexLevel>) -> Result<Self> {
        if names.len() != self.names.len() {
            return Err(IngestError::structure(
                "index",
                format!("cannot relabel {:?} as {names:?}", self.names),
            ));
        }
        Self::new(names, self.keys.clone())
    }

    /// Concatenates two indexes with identical level names.
    pub fn append(&self, other: &MultiIndex) -> Result<Self> {
        if self.names != other.names {
            return Err(IngestError::structure(
                "index",
                format!("cannot append {:?} to {:?}", other.names, self.names),
            ));
        }
        let mut keys = self.keys.clone();
        keys.extend(other.keys.iter().cloned());
        Self::new(self.names.clone(), keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn product_orders_first_level_slowest() {
        let index = MultiIndex::from_product(
            schema::REGION_SECTOR,
            &[labels(&["AT", "DE"]), labels(&["food", "steel"])],
        )
        .unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.key(1), &labels(&["AT", "steel"]));
        assert_eq!(index.position(&labels(&["DE", "food"])), Some(2));
        assert_eq!(index.level_values(IndexLevel::Region), labels(&["AT", "DE"]));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let result = MultiIndex::single(IndexLevel::Stressor, ["CO2", "CO2"]);
        assert!(matches!(result, Err(IngestError::StructureMismatch { .. })));
    }

    #[test]
    fn dropping_compartment_can_collide() {
        let index = MultiIndex::new(
            schema::STRESSOR_COMPARTMENT.to_vec(),
            vec![labels(&["CO2", "air"]), labels(&["CO2", "water"])],
        )
        .unwrap();
        assert!(index.drop_level(IndexLevel::Compartment).is_err());
        assert!(index.drop_level(IndexLevel::Unit).is_err());
    }

    #[test]
    fn level_names_parse_from_vocabulary() {
        assert_eq!("InputType".parse::<IndexLevel>().unwrap(), IndexLevel::InputType);
        assert!("country".parse::<IndexLevel>().is_err());
    }
}
