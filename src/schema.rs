//! Column schema resolution.
//!
//! The header row decides which physical column feeds which logical role:
//!
//! - `item_id`: the leaf identifier (required)
//! - `level_<n>`: the category segment at depth `n` (`level_1` required, depths contiguous)
//!
//! Columns may appear in any order; the numeric suffix defines depth, not position.

use std::collections::BTreeMap;
use std::fmt;

use csv::StringRecord;

use crate::error::{RecordError, SchemaError};
use crate::types::HierarchyPath;

/// Header name of the item identifier column.
pub const ITEM_ID_COLUMN: &str = "item_id";
/// Header prefix of level columns (`level_1`, `level_2`, ...).
pub const LEVEL_PREFIX: &str = "level_";

/// Logical role of a header column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnRole {
    /// Category segment at the given 1-based depth.
    Level(usize),
    /// Leaf item identifier.
    ItemId,
}

impl ColumnRole {
    /// Classify a header name.
    pub fn parse(name: &str) -> Result<Self, SchemaError> {
        if name == ITEM_ID_COLUMN {
            return Ok(Self::ItemId);
        }
        let Some(suffix) = name.strip_prefix(LEVEL_PREFIX) else {
            return Err(SchemaError::UnknownColumn {
                name: name.to_owned(),
            });
        };
        // `usize::from_str` accepts a leading '+', which is not a level name.
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SchemaError::InvalidLevelColumn {
                name: name.to_owned(),
            });
        }
        match suffix.parse::<usize>() {
            Ok(depth) if depth >= 1 => Ok(Self::Level(depth)),
            _ => Err(SchemaError::InvalidLevelColumn {
                name: name.to_owned(),
            }),
        }
    }

    /// Canonical header name for this role.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(depth) => write!(f, "{LEVEL_PREFIX}{depth}"),
            Self::ItemId => f.write_str(ITEM_ID_COLUMN),
        }
    }
}

/// Resolved mapping from logical role to physical column index.
///
/// Immutable once built; shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// `levels[k - 1]` is the column index of `level_k`.
    levels: Vec<usize>,
    item_id: usize,
}

impl ColumnSchema {
    /// Resolve the schema from header names.
    ///
    /// Fails on unknown or duplicate names, a missing `item_id` or `level_1`, and gaps in
    /// the level depths.
    pub fn from_header<'a, I>(header: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut roles: BTreeMap<ColumnRole, usize> = BTreeMap::new();
        for (index, name) in header.into_iter().enumerate() {
            let role = ColumnRole::parse(name)?;
            if roles.insert(role, index).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    name: name.to_owned(),
                });
            }
        }

        let item_id = roles
            .remove(&ColumnRole::ItemId)
            .ok_or_else(|| SchemaError::MissingRequiredColumn {
                name: ITEM_ID_COLUMN.to_owned(),
            })?;

        if !roles.contains_key(&ColumnRole::Level(1)) {
            return Err(SchemaError::MissingRequiredColumn {
                name: ColumnRole::Level(1).name(),
            });
        }

        // Only level roles remain, iterated in ascending depth.
        let mut levels = Vec::with_capacity(roles.len());
        for (role, index) in roles {
            let ColumnRole::Level(depth) = role else {
                continue;
            };
            if depth != levels.len() + 1 {
                return Err(SchemaError::NonContiguousLevels {
                    column: role.name(),
                    missing: ColumnRole::Level(levels.len() + 1).name(),
                });
            }
            levels.push(index);
        }

        Ok(Self { levels, item_id })
    }

    /// Number of level columns.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn item_id_index(&self) -> usize {
        self.item_id
    }

    /// Column index of `level_<depth>`.
    pub fn level_index(&self, depth: usize) -> Option<usize> {
        depth.checked_sub(1).and_then(|i| self.levels.get(i)).copied()
    }

    /// Full role → index mapping (levels plus `item_id`).
    pub fn roles(&self) -> BTreeMap<ColumnRole, usize> {
        self.levels
            .iter()
            .enumerate()
            .map(|(i, &index)| (ColumnRole::Level(i + 1), index))
            .chain(std::iter::once((ColumnRole::ItemId, self.item_id)))
            .collect()
    }

    /// Extract the hierarchy path of a record.
    ///
    /// Levels are read in increasing depth. `level_1` must be non-empty; later levels may be
    /// empty, but a populated level after an empty one is rejected.
    pub fn hierarchy_path(&self, record: &StringRecord) -> Result<HierarchyPath, RecordError> {
        let mut segments = Vec::with_capacity(self.levels.len());
        let mut first_empty: Option<usize> = None;

        for (i, &index) in self.levels.iter().enumerate() {
            let depth = i + 1;
            let value = record
                .get(index)
                .ok_or_else(|| missing_value(ColumnRole::Level(depth)))?;

            if value.is_empty() {
                if depth == 1 {
                    return Err(missing_value(ColumnRole::Level(1)));
                }
                first_empty.get_or_insert(depth);
                continue;
            }

            if let Some(empty) = first_empty {
                return Err(RecordError::MissingParentElement {
                    column: ColumnRole::Level(depth).name(),
                    parent: ColumnRole::Level(empty).name(),
                });
            }
            segments.push(value.to_owned());
        }

        Ok(HierarchyPath::new(segments))
    }

    /// Extract the non-empty item identifier of a record.
    pub fn item_id<'r>(&self, record: &'r StringRecord) -> Result<&'r str, RecordError> {
        match record.get(self.item_id) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(missing_value(ColumnRole::ItemId)),
        }
    }
}

fn missing_value(role: ColumnRole) -> RecordError {
    RecordError::MissingRequiredValue {
        column: role.name(),
    }
}
