//! Name directories used to render tasks: column id → column name and
//! member id → display name.

use std::collections::{BTreeSet, HashMap};

use crate::weeek::{Column, ColumnId, Member};

/// Rendered when a task has no assignees.
pub const UNASSIGNED: &str = "unassigned";

/// Column id → display name for one board. Refreshed every iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnDirectory {
    names: HashMap<ColumnId, String>,
}

impl ColumnDirectory {
    pub fn from_columns(columns: &[Column]) -> Self {
        Self {
            names: columns.iter().map(|c| (c.id, c.name.clone())).collect(),
        }
    }

    /// Display name of a column. Unknown ids render as a placeholder
    /// instead of failing.
    pub fn name(&self, column_id: Option<ColumnId>) -> String {
        match column_id {
            Some(id) => self
                .names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("Column {id}")),
            None => "Column ?".to_owned(),
        }
    }

    /// Find a column by exact name (case-insensitive) or numeric id.
    pub fn find(&self, needle: &str) -> Option<ColumnId> {
        let needle = needle.trim();
        if let Ok(id) = needle.parse::<ColumnId>()
            && self.names.contains_key(&id)
        {
            return Some(id);
        }
        let needle = needle.to_lowercase();
        self.names
            .iter()
            .find(|(_, name)| name.to_lowercase() == needle)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Member id → display name. Built once when a session starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssigneeDirectory {
    names: HashMap<String, String>,
}

impl AssigneeDirectory {
    pub fn from_members(members: &[Member]) -> Self {
        Self {
            names: members
                .iter()
                .map(|m| (m.id.clone(), m.display_name()))
                .collect(),
        }
    }

    /// Display name of one member; unknown ids render as the raw id.
    pub fn name(&self, member_id: &str) -> String {
        self.names
            .get(member_id)
            .cloned()
            .unwrap_or_else(|| member_id.to_owned())
    }

    /// Comma-separated names in id order, or [`UNASSIGNED`].
    pub fn render(&self, member_ids: &BTreeSet<String>) -> String {
        if member_ids.is_empty() {
            return UNASSIGNED.to_owned();
        }
        member_ids
            .iter()
            .map(|id| self.name(id))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
