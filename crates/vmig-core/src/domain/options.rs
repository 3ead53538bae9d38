//! Per-run migration option flags.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flags forwarded to every item operation of a run as the `Options`
/// parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    pub preserve_permissions: bool,
    pub preserve_folder_structure: bool,
    pub migrate_tags: bool,
    pub power_on_after_migration: bool,
    /// Validate only; operations must not change the target.
    pub validate_only: bool,
    /// Operation-specific knobs passed through verbatim.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            preserve_permissions: true,
            preserve_folder_structure: true,
            migrate_tags: true,
            power_on_after_migration: false,
            validate_only: false,
            extra: BTreeMap::new(),
        }
    }
}

impl MigrationOptions {
    /// Options as a PascalCase map, the shape scripts consume.
    pub fn to_parameter(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("PreservePermissions".into(), self.preserve_permissions.into());
        map.insert(
            "PreserveFolderStructure".into(),
            self.preserve_folder_structure.into(),
        );
        map.insert("MigrateTags".into(), self.migrate_tags.into());
        map.insert(
            "PowerOnAfterMigration".into(),
            self.power_on_after_migration.into(),
        );
        map.insert("ValidateOnly".into(), self.validate_only.into());
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_parameter_includes_extra() {
        let mut options = MigrationOptions {
            validate_only: true,
            ..MigrationOptions::default()
        };
        options.extra.insert("Datastore".into(), json!("ds-gold"));

        let param = options.to_parameter();
        assert_eq!(param["ValidateOnly"], json!(true));
        assert_eq!(param["PreservePermissions"], json!(true));
        assert_eq!(param["Datastore"], json!("ds-gold"));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let options: MigrationOptions = serde_json::from_str(r#"{"migrate_tags":false}"#).unwrap();
        assert!(!options.migrate_tags);
        assert!(options.preserve_permissions);
    }
}
