//! `postprocess.json`: what goboscript cannot express, kept so a later pass
//! can restore it (sprite state and the original Scratch names).

use crate::codegen::target_scope;
use crate::names::NamePool;
use crate::project::Target;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

const SPRITE_PROPERTIES: &[&str] = &[
    "x",
    "y",
    "size",
    "direction",
    "visible",
    "currentCostume",
    "volume",
    "layerOrder",
];

#[derive(Debug, Default, Serialize)]
pub struct PostProcess {
    pub targets: IndexMap<String, TargetMetadata>,
}

#[derive(Debug, Default, Serialize)]
pub struct TargetMetadata {
    #[serde(flatten)]
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// goboscript identifier to Scratch name, for every name that changed.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub code_remap: IndexMap<String, String>,
}

impl PostProcess {
    /// Collect metadata for `targets`, each paired with its output file name.
    ///
    /// Renamed identifiers are grouped under the file of the scope they were
    /// resolved in; global names belong to the stage.
    pub fn collect<'a>(
        targets: impl IntoIterator<Item = (&'a str, &'a Target)>,
        names: &NamePool,
    ) -> Self {
        let mut out = Self::default();
        let mut file_of_scope = IndexMap::new();
        for (file_name, target) in targets {
            let mut meta = TargetMetadata::default();
            if !target.is_stage {
                for key in SPRITE_PROPERTIES {
                    if let Some(value) = target.properties.get(*key) {
                        meta.properties.insert(key.to_string(), value.clone());
                    }
                }
                meta.name = Some(target.name.clone());
            }
            file_of_scope.insert(target_scope(target), file_name.to_string());
            out.targets.insert(file_name.to_string(), meta);
        }

        for (key, resolved) in names.entries() {
            if resolved == key.source {
                continue;
            }
            let Some(file_name) = file_of_scope.get(&key.scope) else {
                tracing::debug!(scope = %key.scope, "name resolved outside any known target");
                continue;
            };
            if let Some(meta) = out.targets.get_mut(file_name) {
                meta.code_remap
                    .insert(resolved.to_string(), key.source.clone());
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
