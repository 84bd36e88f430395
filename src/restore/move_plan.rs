// bakrest/src/restore/move_plan.rs
//! Relocation clauses (`MOVE 'logical' TO 'physical'`) for a RESTORE.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::utils::quote_literal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Data,
    Log,
}

impl FileKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "data" => Some(Self::Data),
            "log" => Some(Self::Log),
            _ => None,
        }
    }

    /// Suffix appended to the database name (and ordinal) for this kind.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Data => ".mdf",
            Self::Log => "_Log.ldf",
        }
    }
}

/// One file of the backup set as reported by the upload server. Both fields
/// may be missing in the wire format; such entries are skipped when planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalFile {
    #[serde(default)]
    pub logical_name: Option<String>,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
}

impl LogicalFile {
    #[cfg(test)]
    pub fn new(logical_name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            logical_name: Some(logical_name.into()),
            file_type: Some(file_type.into()),
        }
    }

    /// The name and kind, if this entry can be planned.
    fn validated(&self) -> Option<(&str, FileKind)> {
        let name = self.logical_name.as_deref().filter(|n| !n.is_empty());
        let kind_raw = self.file_type.as_deref().filter(|t| !t.is_empty());
        let (Some(name), Some(kind_raw)) = (name, kind_raw) else {
            warn!("Missing keys in logical file: {:?}", self);
            return None;
        };
        match FileKind::parse(kind_raw) {
            Some(kind) => Some((name, kind)),
            None => {
                warn!("Unknown file type '{}' for {}", kind_raw, name);
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveStatement {
    pub logical_name: String,
    pub destination: String,
}

impl fmt::Display for MoveStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MOVE {} TO {}",
            quote_literal(&self.logical_name),
            quote_literal(&self.destination)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestorePlan {
    moves: Vec<MoveStatement>,
}

impl RestorePlan {
    pub fn moves(&self) -> &[MoveStatement] {
        &self.moves
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Rendered clauses, in plan order.
    pub fn statements(&self) -> Vec<String> {
        self.moves().iter().map(ToString::to_string).collect()
    }
}

/// Builds the relocation clauses for `files`.
///
/// The first file of each kind is named after the database
/// (`Orders.mdf`, `Orders_Log.ldf`); later files of the same kind get a
/// 1-based ordinal (`Orders_2.mdf`). Ordinals follow input order within a
/// kind and only count entries that are valid. An empty plan is returned as
/// is; refusing to restore without files is the caller's decision.
pub fn plan(db_name: &str, restore_dir: &str, files: &[LogicalFile]) -> RestorePlan {
    let mut ordinals: HashMap<FileKind, usize> = HashMap::new();
    let mut moves = Vec::with_capacity(files.len());

    for (name, kind) in files.iter().filter_map(LogicalFile::validated) {
        let ordinal = ordinals.entry(kind).or_insert(0);
        *ordinal += 1;

        let file_name = if *ordinal == 1 {
            format!("{}{}", db_name, kind.suffix())
        } else {
            format!("{}_{}{}", db_name, ordinal, kind.suffix())
        };

        moves.push(MoveStatement {
            logical_name: name.to_string(),
            destination: join_server_path(restore_dir, &file_name),
        });
    }

    RestorePlan { moves }
}

/// Joins a file name onto a directory on the SQL Server host, keeping the
/// directory's own separator style.
fn join_server_path(dir: &str, file_name: &str) -> String {
    if dir.is_empty() {
        return file_name.to_string();
    }
    if dir.ends_with('/') || dir.ends_with('\\') {
        return format!("{}{}", dir, file_name);
    }
    let separator = if dir.contains('\\') && !dir.contains('/') { '\\' } else { '/' };
    format!("{}{}{}", dir, separator, file_name)
}
