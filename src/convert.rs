//! Whole-project conversion: file naming, declarations, script emission and
//! writing the goboscript project directory.

use crate::assets::{self, AssetKind, AssetMapping};
use crate::codegen::{target_scope, Generator, DEFAULT_MAX_DEPTH};
use crate::config;
use crate::metadata::PostProcess;
use crate::names::{valid_file_name, NameKind, NamePool, Scope};
use crate::project::{Asset, Project, Target};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::collections::HashSet;

#[cfg(not(target_arch = "wasm32"))]
use crate::project::Sb3Archive;
#[cfg(not(target_arch = "wasm32"))]
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

const STAGE_FILE_NAME: &str = "stage";
const HEADER: &str = "# Converted from sb3 file";

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory the project folder is created in. Defaults to the input's
    /// directory.
    #[cfg(not(target_arch = "wasm32"))]
    pub output_dir: Option<PathBuf>,
    pub write_config: bool,
    pub write_postprocess: bool,
    pub max_depth: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            output_dir: None,
            write_config: true,
            write_postprocess: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Everything a conversion produces, before anything touches the disk.
#[derive(Debug, Clone)]
pub struct ConvertedProject {
    /// `<file name>.gs` to goboscript source, in target order.
    pub sources: IndexMap<String, String>,
    pub costumes: AssetMapping,
    pub sounds: AssetMapping,
    /// `goboscript.toml`, when the project carries TurboWarp settings.
    pub config: Option<String>,
    /// `postprocess.json`.
    pub postprocess: String,
}

/// Convert a parsed project. Targets are processed in document order so the
/// chosen identifiers are reproducible.
pub fn convert(project: &Project, options: &ConvertOptions) -> Result<ConvertedProject> {
    let file_names = target_file_names(project);
    let named = file_names
        .iter()
        .map(String::as_str)
        .zip(project.targets.iter())
        .collect::<Vec<_>>();

    let costumes = assets::compute_mapping(&named, AssetKind::Costumes);
    let sounds = assets::compute_mapping(&named, AssetKind::Sounds);

    let mut names = NamePool::new();
    register_declarations(project, &mut names);

    let mut sources = IndexMap::new();
    for (file_name, target) in &named {
        tracing::debug!(target_name = %target.name, file = %file_name, "generating target");
        let source = render_target(target, &costumes, &sounds, &mut names, options.max_depth)
            .with_context(|| format!("Failed to convert target '{}'.", target.name))?;
        sources.insert(format!("{}.gs", file_name), source);
    }

    let config = project
        .targets
        .iter()
        .find(|target| target.is_stage)
        .and_then(config::find_config)
        .map(|settings| config::render_config(&settings, &config::layer_order(named.iter().copied())));

    let postprocess = PostProcess::collect(named.iter().copied(), &names)
        .to_json()
        .context("Failed to serialize postprocess.json.")?;

    Ok(ConvertedProject {
        sources,
        costumes,
        sounds,
        config,
        postprocess,
    })
}

/// Convert the text of a bare `project.json`.
pub fn convert_project_json(text: &str) -> Result<ConvertedProject> {
    let project = Project::parse_json(text)?;
    convert(&project, &ConvertOptions::default())
}

/// Convert the `.sb3` at `input` into `<output dir>/<input stem>/`.
///
/// Returns the project directory.
#[cfg(not(target_arch = "wasm32"))]
pub fn convert_project(input: &Path, options: &ConvertOptions) -> Result<PathBuf> {
    convert_project_with_progress(input, options, None)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn convert_project_with_progress(
    input: &Path,
    options: &ConvertOptions,
    mut progress: Option<&mut dyn FnMut(usize, usize, &str)>,
) -> Result<PathBuf> {
    const STAGES: usize = 4;
    let mut report = |step: usize, label: &str| {
        if let Some(cb) = progress.as_deref_mut() {
            cb(step, STAGES, label);
        }
    };

    report(1, "Reading project");
    let Sb3Archive {
        project,
        mut archive,
    } = Sb3Archive::open(input)?;
    let project_dir = project_dir(input, options.output_dir.as_deref());
    fs::create_dir_all(&project_dir)
        .with_context(|| format!("Failed to create '{}'.", project_dir.display()))?;

    report(2, "Generating goboscript");
    let converted = convert(&project, options)
        .with_context(|| format!("Failed to convert '{}'.", input.display()))?;

    report(3, "Copying assets");
    let mut copied = assets::materialize(&mut archive, &project_dir, &converted.costumes)?;
    copied += assets::materialize(&mut archive, &project_dir, &converted.sounds)?;
    tracing::debug!(copied, "assets copied");

    report(4, "Writing project files");
    for (file_name, source) in &converted.sources {
        write_file(&project_dir.join(file_name), source)?;
    }
    if options.write_config {
        if let Some(config) = &converted.config {
            write_file(&project_dir.join("goboscript.toml"), config)?;
        }
    }
    if options.write_postprocess {
        write_file(&project_dir.join("postprocess.json"), &converted.postprocess)?;
    }

    tracing::info!(path = %project_dir.display(), "saved project");
    Ok(project_dir)
}

#[cfg(not(target_arch = "wasm32"))]
fn project_dir(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("project");
    let base = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf(),
    };
    base.join(stem)
}

#[cfg(not(target_arch = "wasm32"))]
fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write '{}'.", path.display()))
}

/// Output file names (without extension), one per target.
fn target_file_names(project: &Project) -> Vec<String> {
    let mut used = HashSet::from([STAGE_FILE_NAME.to_string()]);
    project
        .targets
        .iter()
        .map(|target| {
            if target.is_stage {
                STAGE_FILE_NAME.to_string()
            } else {
                unique_file_name(&target.name, &mut used)
            }
        })
        .collect()
}

fn unique_file_name(name: &str, used: &mut HashSet<String>) -> String {
    let base = valid_file_name(name);
    let mut candidate = base.clone();
    let mut index = 2usize;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{}_{}", base, index);
        index += 1;
    }
    candidate
}

/// Reserve declared lists and stage variables before any script runs, so a
/// declaration keeps its plain name.
fn register_declarations(project: &Project, names: &mut NamePool) {
    for target in &project.targets {
        let scope = target_scope(target);
        for list in &target.lists {
            names.resolve(&list.name, NameKind::List, &scope);
        }
        if target.is_stage {
            for var in &target.variables {
                names.resolve(&var.name, NameKind::Var, &Scope::Global);
            }
        }
    }
}

fn render_target(
    target: &Target,
    costumes: &AssetMapping,
    sounds: &AssetMapping,
    names: &mut NamePool,
    max_depth: usize,
) -> Result<String> {
    let mut lines = vec![HEADER.to_string(), String::new()];

    for (keyword, assets, mapping) in [
        ("costumes", &target.costumes, costumes),
        ("sounds", &target.sounds, sounds),
    ] {
        if let Some(declaration) = asset_declaration(keyword, assets, mapping) {
            lines.push(declaration);
            lines.push(String::new());
        }
    }

    let scope = target_scope(target);
    for list in &target.lists {
        let ident = names.resolve(&list.name, NameKind::List, &scope);
        lines.push(format!("list {} = {};", ident, list.value));
    }
    if !target.lists.is_empty() {
        lines.push(String::new());
    }

    if target.is_stage && !target.variables.is_empty() {
        for var in &target.variables {
            let ident = names.resolve(&var.name, NameKind::Var, &Scope::Global);
            lines.push(format!("var {} = {};", ident, var.value));
        }
        lines.push(String::new());
    }

    for block in target.top_level_blocks() {
        lines.push(format!("# script {} ({},{})", block.id, block.x, block.y));
        let code = Generator::new(target, names)
            .with_max_depth(max_depth)
            .generate(&block.id)
            .with_context(|| format!("Failed to generate script '{}'.", block.id))?;
        lines.push(code);
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

fn asset_declaration(keyword: &str, assets: &[Asset], mapping: &AssetMapping) -> Option<String> {
    let entries = assets
        .iter()
        .filter_map(|asset| {
            mapping.get(&asset.md5ext).map(|path| {
                format!(
                    "{} as {}",
                    serde_json::Value::from(path.as_str()),
                    serde_json::Value::from(asset.name.as_str())
                )
            })
        })
        .collect::<Vec<_>>();
    if entries.is_empty() {
        return None;
    }
    Some(format!("{} {};", keyword, entries.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn project() -> Project {
        Project::from_json(&json!({
            "targets": [
                {
                    "isStage": true, "name": "Stage",
                    "variables": { "v1": ["my score", 0], "v2": ["greeting", "hi"] },
                    "lists": { "l1": ["items", ["a", 1]] },
                    "blocks": {},
                    "costumes": [{ "name": "backdrop1", "assetId": "bd", "md5ext": "bd.svg", "dataFormat": "svg" }],
                    "sounds": []
                },
                {
                    "isStage": false, "name": "Cat",
                    "variables": { "v3": ["speed", 3] },
                    "lists": {},
                    "blocks": {
                        "hat": {
                            "opcode": "event_whenflagclicked", "next": "set",
                            "inputs": {}, "fields": {}, "topLevel": true, "x": 10, "y": 20
                        },
                        "set": {
                            "opcode": "data_setvariableto", "next": null,
                            "inputs": { "VALUE": [1, [10, "1"]] },
                            "fields": { "VARIABLE": ["my score", "v1"] }, "topLevel": false
                        },
                        "loose": {
                            "opcode": "looks_hide", "next": null,
                            "inputs": {}, "fields": {}, "topLevel": true, "x": 0, "y": 300
                        }
                    },
                    "costumes": [{ "name": "cat a", "assetId": "c1", "md5ext": "c1.png", "dataFormat": "png" }],
                    "sounds": [{ "name": "meow", "assetId": "s1", "md5ext": "s1.wav", "dataFormat": "wav" }]
                },
                { "isStage": false, "name": "cat", "blocks": {} },
                { "isStage": false, "name": "a/b", "blocks": {} }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn file_names_are_unique_and_safe() {
        assert_eq!(
            target_file_names(&project()),
            vec!["stage", "Cat", "cat_2", "a_b"]
        );
    }

    #[test]
    fn renders_stage_declarations() {
        let converted = convert(&project(), &ConvertOptions::default()).unwrap();
        assert_eq!(
            converted.sources["stage.gs"],
            "# Converted from sb3 file\n\
             \n\
             costumes \"costumes/stage/backdrop1.svg\" as \"backdrop1\";\n\
             \n\
             list items = [\"a\",1];\n\
             \n\
             var my_score = 0;\n\
             var greeting = \"hi\";\n"
        );
    }

    #[test]
    fn renders_sprite_scripts() {
        let converted = convert(&project(), &ConvertOptions::default()).unwrap();
        assert_eq!(
            converted.sources["Cat.gs"],
            "# Converted from sb3 file\n\
             \n\
             costumes \"costumes/Cat/cat a.png\" as \"cat a\";\n\
             \n\
             sounds \"sounds/Cat/meow.wav\" as \"meow\";\n\
             \n\
             # script hat (10,20)\n\
             onflag {\n    my_score = \"1\";\n}\n\
             \n\
             # script loose (0,300)\n\
             # hide;\n"
        );
        assert_eq!(converted.sources.len(), 4);
        assert_eq!(converted.config, None);
    }

    #[test]
    fn postprocess_lists_renamed_globals() {
        let converted = convert(&project(), &ConvertOptions::default()).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&converted.postprocess).unwrap();
        assert_eq!(meta["targets"]["stage"]["code_remap"]["my_score"], json!("my score"));
        assert_eq!(meta["targets"]["cat_2"]["name"], json!("cat"));
    }

    #[test]
    fn generation_errors_name_the_target() {
        let project = Project::from_json(&json!({
            "targets": [{
                "isStage": false, "name": "Broken",
                "blocks": {
                    "hat": {
                        "opcode": "event_whenflagclicked", "next": "missing",
                        "inputs": {}, "fields": {}, "topLevel": true
                    }
                }
            }]
        }))
        .unwrap();
        let err = convert(&project, &ConvertOptions::default()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Broken"));
        assert!(message.contains("missing"));
    }
}
