//! Migration items: the units of work in a batch.

use serde::{Deserialize, Serialize};

use super::outcome::Outcome;

/// Kind of infrastructure object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Host,
    VirtualMachine,
    Folder,
    Role,
    Permission,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        ItemKind::Host,
        ItemKind::VirtualMachine,
        ItemKind::Folder,
        ItemKind::Role,
        ItemKind::Permission,
    ];

    /// Name passed to external operations as `ItemType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Host => "Host",
            ItemKind::VirtualMachine => "VirtualMachine",
            ItemKind::Folder => "Folder",
            ItemKind::Role => "Role",
            ItemKind::Permission => "Permission",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "host" => Ok(ItemKind::Host),
            "virtualmachine" | "vm" => Ok(ItemKind::VirtualMachine),
            "folder" => Ok(ItemKind::Folder),
            "role" => Ok(ItemKind::Role),
            "permission" => Ok(ItemKind::Permission),
            other => Err(format!("unknown item kind: {other}")),
        }
    }
}

/// Per-item migration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ItemStatus {
    #[default]
    Pending,
    Migrated,
    Failed,
    Skipped,
}

/// One unit of work in a migration batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationItem {
    pub kind: ItemKind,
    pub name: String,
    /// Opaque identifier assigned by the source endpoint.
    pub id: String,
    /// Hierarchical inventory path, `/`-separated.
    pub path: String,
    pub included: bool,
    #[serde(default)]
    pub status: ItemStatus,
    /// Last failure or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MigrationItem {
    pub fn new(kind: ItemKind, name: &str, id: &str, path: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            id: id.to_string(),
            path: path.to_string(),
            included: true,
            status: ItemStatus::Pending,
            detail: None,
        }
    }

    pub fn excluded(mut self) -> Self {
        self.included = false;
        self
    }

    /// Back to `Pending` with no detail, ready for a fresh run.
    pub fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.detail = None;
    }

    /// Record the result of migrating this item.
    pub fn apply_outcome(&mut self, outcome: &Outcome) {
        self.status = outcome.item_status();
        self.detail = outcome.reason().map(str::to_string);
    }
}

/// Record shape returned by discovery operations.
///
/// Accepts both snake_case and the PascalCase property names scripts emit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveredItem {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(default, alias = "Path")]
    pub path: String,
}

impl DiscoveredItem {
    pub fn into_item(self, kind: ItemKind) -> MigrationItem {
        MigrationItem::new(kind, &self.name, &self.id, &self.path)
    }
}
