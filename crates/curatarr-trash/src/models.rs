// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One entry of a catalog directory listing (GitHub contents API shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    /// File name, e.g. `br-disk.json`.
    pub name: String,
    /// Repository-relative path.
    #[serde(default)]
    pub path: String,
    /// Raw download URL; absent for directories.
    #[serde(default)]
    pub download_url: Option<String>,
    /// `file` or `dir`.
    #[serde(rename = "type", default)]
    pub entry_type: String,
}

impl CatalogEntry {
    pub fn is_definition_file(&self) -> bool {
        self.entry_type == "file" && self.name.ends_with(".json")
    }
}

/// An upstream custom format definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomFormatDefinition {
    /// Stable upstream identifier.
    pub trash_id: String,
    /// Scores suggested by the catalog per scoring set (`default`, `anime-sonarr`, ...).
    #[serde(default)]
    pub trash_scores: HashMap<String, i32>,
    pub name: String,
    #[serde(rename = "includeCustomFormatWhenRenaming", default)]
    pub include_custom_format_when_renaming: bool,
    #[serde(default)]
    pub specifications: Vec<Specification>,
}

/// One test clause of an upstream definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Specification {
    pub name: String,
    /// Upstream implementation identifier, e.g. `ReleaseTitleSpecification`.
    pub implementation: String,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub required: bool,
    /// Either `{"value": ..}` / `{"min": .., "max": ..}` or the older
    /// `[{"name": "value", "value": ..}]` list form.
    #[serde(default)]
    pub fields: Value,
}

impl Specification {
    /// Look up a named field in either of the supported `fields` layouts.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match &self.fields {
            Value::Object(map) => map.get(name),
            Value::Array(items) => items
                .iter()
                .find(|item| item.get("name").and_then(Value::as_str) == Some(name))
                .and_then(|item| item.get("value")),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.field("value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_object_and_list_field_layouts() {
        let object: Specification = serde_json::from_value(json!({
            "name": "x265",
            "implementation": "ReleaseTitleSpecification",
            "fields": { "value": "[xh]\\.?265" }
        }))
        .unwrap();
        assert_eq!(object.value().and_then(Value::as_str), Some("[xh]\\.?265"));
        assert!(!object.negate);

        let list: Specification = serde_json::from_value(json!({
            "name": "Size",
            "implementation": "SizeSpecification",
            "negate": true,
            "fields": [{ "name": "min", "value": 1 }, { "name": "max", "value": 9 }]
        }))
        .unwrap();
        assert_eq!(list.field("max").and_then(Value::as_f64), Some(9.0));
        assert!(list.value().is_none());
        assert!(list.negate);
    }

    #[test]
    fn only_json_files_are_definitions() {
        let file = CatalogEntry {
            name: "hdr.json".into(),
            path: "docs/json/sonarr/cf/hdr.json".into(),
            download_url: Some("https://example.invalid/hdr.json".into()),
            entry_type: "file".into(),
        };
        let dir = CatalogEntry {
            entry_type: "dir".into(),
            download_url: None,
            ..file.clone()
        };
        assert!(file.is_definition_file());
        assert!(!dir.is_definition_file());
    }
}
