use crate::names::valid_file_name;
use crate::project::{Asset, AssetSource, Target};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Costumes,
    Sounds,
}

impl AssetKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::Costumes => "costumes",
            AssetKind::Sounds => "sounds",
        }
    }

    fn assets(self, target: &Target) -> &[Asset] {
        match self {
            AssetKind::Costumes => &target.costumes,
            AssetKind::Sounds => &target.sounds,
        }
    }
}

/// Content key (`<md5>.<ext>`) to output path, `/`-separated and relative to
/// the project directory.
pub type AssetMapping = IndexMap<String, String>;

/// Decide where every asset of `kind` is written.
///
/// `targets` pairs each target with the directory name it is written under.
/// Assets used exactly once live next to their sprite; shared assets move to
/// the kind's root, named after their display name when every use agrees on
/// it and after their content key otherwise.
pub fn compute_mapping(targets: &[(&str, &Target)], kind: AssetKind) -> AssetMapping {
    let mut uses: HashMap<&str, Vec<&str>> = HashMap::new();
    for (_, target) in targets {
        for asset in kind.assets(target) {
            uses.entry(asset.md5ext.as_str())
                .or_default()
                .push(asset.name.as_str());
        }
    }

    let mut mapping = AssetMapping::new();
    let mut claimed: HashMap<String, &str> = HashMap::new();
    for (dir_name, target) in targets {
        for asset in kind.assets(target) {
            let key = asset.md5ext.as_str();
            let names = &uses[key];
            let path = if names.len() == 1 {
                format!("{}/{}/{}", kind.dir_name(), dir_name, asset_file_name(asset))
            } else if mapping.contains_key(key) {
                continue;
            } else if names.iter().all(|name| *name == names[0]) {
                format!("{}/{}", kind.dir_name(), asset_file_name(asset))
            } else {
                format!("{}/{}", kind.dir_name(), key)
            };
            match claimed.get(&path) {
                Some(owner) if *owner != key => {
                    tracing::warn!(
                        asset = %key,
                        other = %owner,
                        path = %path,
                        "two assets share an output path, only the first is written"
                    );
                }
                Some(_) => {}
                None => {
                    claimed.insert(path.clone(), key);
                }
            }
            mapping.insert(key.to_string(), path);
        }
    }
    mapping
}

fn asset_file_name(asset: &Asset) -> String {
    format!("{}.{}", valid_file_name(&asset.name), asset.data_format)
}

/// Copy every mapped asset into `output_root`. Destinations that already
/// exist are left untouched, so re-running a conversion is cheap.
///
/// Returns the number of files written.
pub fn materialize<S: AssetSource + ?Sized>(
    source: &mut S,
    output_root: &Path,
    mapping: &AssetMapping,
) -> Result<usize> {
    let mut written = 0usize;
    for (md5ext, relative) in mapping {
        let dest = output_path(output_root, relative);
        let parent = dest.parent().unwrap_or(output_root);
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create '{}'.", parent.display()))?;
        if dest.exists() {
            continue;
        }
        let Some(bytes) = source.read_asset(md5ext)? else {
            tracing::warn!(asset = %md5ext, "asset missing from archive, skipping");
            continue;
        };
        let mut temp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create a temporary file in '{}'.", parent.display()))?;
        temp.write_all(&bytes)?;
        temp.persist(&dest)
            .with_context(|| format!("Failed to write '{}'.", dest.display()))?;
        tracing::debug!(asset = %md5ext, path = %dest.display(), "copied asset");
        written += 1;
    }
    Ok(written)
}

fn output_path(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use serde_json::json;

    fn project() -> Project {
        let costume = |name: &str, key: &str| {
            json!({ "name": name, "assetId": key, "md5ext": format!("{}.png", key), "dataFormat": "png" })
        };
        Project::from_json(&json!({
            "targets": [
                {
                    "isStage": true, "name": "Stage", "blocks": {},
                    "costumes": [costume("backdrop1", "bd")],
                    "sounds": []
                },
                {
                    "isStage": false, "name": "A", "blocks": {},
                    "costumes": [costume("cat", "k1"), costume("shared", "k3"), costume("dot", "k4")],
                    "sounds": []
                },
                {
                    "isStage": false, "name": "B", "blocks": {},
                    "costumes": [costume("cat", "k2"), costume("other name", "k3"), costume("dot", "k4")],
                    "sounds": []
                }
            ]
        }))
        .unwrap()
    }

    fn named(project: &Project) -> Vec<(&str, &Target)> {
        project
            .targets
            .iter()
            .map(|t| (if t.is_stage { "stage" } else { t.name.as_str() }, t))
            .collect()
    }

    #[test]
    fn deduplicates_by_content() {
        let project = project();
        let mapping = compute_mapping(&named(&project), AssetKind::Costumes);
        assert_eq!(mapping["bd.png"], "costumes/stage/backdrop1.png");
        assert_eq!(mapping["k1.png"], "costumes/A/cat.png");
        assert_eq!(mapping["k2.png"], "costumes/B/cat.png");
        assert_eq!(mapping["k3.png"], "costumes/k3.png");
        assert_eq!(mapping["k4.png"], "costumes/dot.png");
        assert_eq!(mapping.len(), 5);
    }

    #[test]
    fn sounds_use_their_own_folder() {
        let project = Project::from_json(&json!({
            "targets": [{
                "isStage": false, "name": "A", "blocks": {}, "costumes": [],
                "sounds": [{ "name": "pop", "assetId": "s1", "md5ext": "s1.wav", "dataFormat": "wav" }]
            }]
        }))
        .unwrap();
        let mapping = compute_mapping(&named(&project), AssetKind::Sounds);
        assert_eq!(mapping["s1.wav"], "sounds/A/pop.wav");
    }

    #[test]
    fn sanitized_names_can_collide() {
        let project = Project::from_json(&json!({
            "targets": [{
                "isStage": false, "name": "A", "blocks": {}, "sounds": [],
                "costumes": [
                    { "name": "a?", "assetId": "q1", "md5ext": "q1.png", "dataFormat": "png" },
                    { "name": "a*", "assetId": "q2", "md5ext": "q2.png", "dataFormat": "png" }
                ]
            }]
        }))
        .unwrap();
        let mapping = compute_mapping(&named(&project), AssetKind::Costumes);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["q1.png"], "costumes/A/a_.png");
        assert_eq!(mapping["q2.png"], mapping["q1.png"]);
    }

    #[test]
    fn materialize_copies_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut mapping = AssetMapping::new();
        mapping.insert("k1.png".to_string(), "costumes/A/cat.png".to_string());
        mapping.insert("gone.png".to_string(), "costumes/gone.png".to_string());
        let mut source = HashMap::new();
        source.insert("k1.png".to_string(), b"first".to_vec());

        assert_eq!(materialize(&mut source, dir.path(), &mapping).unwrap(), 1);
        let dest = dir.path().join("costumes").join("A").join("cat.png");
        assert_eq!(fs::read(&dest).unwrap(), b"first");

        source.insert("k1.png".to_string(), b"second".to_vec());
        assert_eq!(materialize(&mut source, dir.path(), &mapping).unwrap(), 0);
        assert_eq!(fs::read(&dest).unwrap(), b"first");
    }
}
