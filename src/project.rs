use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

#[cfg(not(target_arch = "wasm32"))]
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Project {
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub is_stage: bool,
    pub blocks: IndexMap<String, Block>,
    pub costumes: Vec<Asset>,
    pub sounds: Vec<Asset>,
    pub variables: Vec<Declaration>,
    pub lists: Vec<Declaration>,
    pub comments: Vec<Comment>,
    pub layer_order: Option<i64>,
    /// Remaining top-level keys (position, size, visibility, ...).
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: String,
    pub opcode: String,
    pub inputs: IndexMap<String, Value>,
    pub fields: IndexMap<String, Field>,
    pub next: Option<String>,
    pub top_level: bool,
    pub mutation: Option<Mutation>,
    pub x: Value,
    pub y: Value,
}

/// A field value, optionally paired with the id of the variable, list or
/// broadcast it names.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub value: Value,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    raw: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub name: String,
    pub md5ext: String,
    pub data_format: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub block_id: Option<String>,
    pub text: String,
}

impl Project {
    pub fn from_json(project_json: &Value) -> Result<Self> {
        let targets = project_json
            .get("targets")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Invalid project.json: missing 'targets' array."))?;
        let targets = targets
            .iter()
            .map(Target::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { targets })
    }

    pub fn parse_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("Invalid project.json.")?;
        Self::from_json(&value)
    }
}

impl Target {
    fn from_json(target: &Value) -> Result<Self> {
        let name = target
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Target missing 'name'."))?
            .to_string();
        let is_stage = target
            .get("isStage")
            .and_then(Value::as_bool)
            .ok_or_else(|| anyhow!("Target '{}' missing isStage.", name))?;

        let blocks_obj = target
            .get("blocks")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("Target '{}' missing blocks object.", name))?;
        let mut blocks = IndexMap::new();
        for (id, block) in blocks_obj {
            // Loose variable and list reporters are stored as bare arrays.
            if !block.is_object() {
                continue;
            }
            let block = Block::from_json(id, block)
                .with_context(|| format!("Invalid block '{}' in target '{}'.", id, name))?;
            blocks.insert(id.clone(), block);
        }

        let costumes = read_assets(target.get("costumes"))
            .with_context(|| format!("Invalid costume list in target '{}'.", name))?;
        let sounds = read_assets(target.get("sounds"))
            .with_context(|| format!("Invalid sound list in target '{}'.", name))?;

        let mut properties = Map::new();
        if let Some(obj) = target.as_object() {
            for (key, value) in obj {
                if !matches!(
                    key.as_str(),
                    "blocks" | "costumes" | "sounds" | "variables" | "lists" | "comments" | "broadcasts"
                ) {
                    properties.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(Self {
            is_stage,
            blocks,
            costumes,
            sounds,
            variables: read_decls(target.get("variables")),
            lists: read_decls(target.get("lists")),
            comments: read_comments(target.get("comments")),
            layer_order: target.get("layerOrder").and_then(Value::as_i64),
            properties,
            name,
        })
    }

    /// Blocks that start a script, in document order.
    pub fn top_level_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values().filter(|block| block.top_level)
    }

    /// Comments anchored to a block, keyed by block id.
    pub fn attached_comments(&self) -> impl Iterator<Item = (&str, &Comment)> {
        self.comments.iter().filter_map(|comment| {
            comment
                .block_id
                .as_deref()
                .map(|block_id| (block_id, comment))
        })
    }
}

impl Block {
    fn from_json(id: &str, block: &Value) -> Result<Self> {
        let opcode = block
            .get("opcode")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Block '{}' missing opcode.", id))?
            .to_string();
        let inputs = block
            .get("inputs")
            .and_then(Value::as_object)
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let fields = block
            .get("fields")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| (k.clone(), Field::from_json(v)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            id: id.to_string(),
            opcode,
            inputs,
            fields,
            next: block
                .get("next")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
            top_level: block
                .get("topLevel")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            mutation: block
                .get("mutation")
                .and_then(Value::as_object)
                .map(|raw| Mutation { raw: raw.clone() }),
            x: block.get("x").cloned().unwrap_or(Value::from(0)),
            y: block.get("y").cloned().unwrap_or(Value::from(0)),
        })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// The field's value as plain text, for menus such as `STOP_OPTION`.
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(Field::text)
    }
}

impl Field {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Array(arr) => Self {
                value: arr.first().cloned().unwrap_or(Value::Null),
                id: arr.get(1).and_then(Value::as_str).map(ToString::to_string),
            },
            other => Self {
                value: other.clone(),
                id: None,
            },
        }
    }

    pub fn text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl Mutation {
    pub fn proccode(&self) -> Option<&str> {
        self.raw.get("proccode").and_then(Value::as_str)
    }

    /// `argumentnames` is itself a JSON-encoded array of strings.
    pub fn argument_names(&self) -> Option<Vec<String>> {
        self.json_string_list("argumentnames")
    }

    pub fn argument_ids(&self) -> Option<Vec<String>> {
        self.json_string_list("argumentids")
    }

    pub fn warp(&self) -> bool {
        match self.raw.get("warp") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn json_string_list(&self, key: &str) -> Option<Vec<String>> {
        let raw = self.raw.get(key)?;
        match raw {
            Value::String(text) => serde_json::from_str::<Vec<String>>(text).ok(),
            Value::Array(_) => serde_json::from_value::<Vec<String>>(raw.clone()).ok(),
            _ => None,
        }
    }
}

impl Comment {
    /// The comment text with backslash escapes (`\n`, `\t`, `\uXXXX`, ...)
    /// expanded. Unknown escapes are kept verbatim.
    pub fn decoded_text(&self) -> String {
        unescape(&self.text)
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        let hex_len = match escaped {
            'x' => 2,
            'u' => 4,
            'U' => 8,
            _ => 0,
        };
        if hex_len > 0 {
            let digits = chars.clone().take(hex_len).collect::<String>();
            let decoded = (digits.len() == hex_len)
                .then(|| u32::from_str_radix(&digits, 16).ok())
                .flatten()
                .and_then(char::from_u32);
            match decoded {
                Some(decoded) => {
                    out.push(decoded);
                    for _ in 0..hex_len {
                        chars.next();
                    }
                }
                None => {
                    out.push('\\');
                    out.push(escaped);
                }
            }
            continue;
        }
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '\\' | '\'' | '"' => out.push(escaped),
            '\n' => {}
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn read_assets(node: Option<&Value>) -> Result<Vec<Asset>> {
    let mut out = Vec::new();
    let Some(arr) = node.and_then(Value::as_array) else {
        return Ok(out);
    };
    for asset in arr {
        let name = match asset.get("name") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err(anyhow!("Asset missing 'name'.")),
        };
        let data_format = asset
            .get("dataFormat")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Asset '{}' missing dataFormat.", name))?
            .to_string();
        let md5ext = match asset.get("md5ext").and_then(Value::as_str) {
            Some(md5ext) => md5ext.to_string(),
            None => {
                let asset_id = asset
                    .get("assetId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("Asset '{}' missing md5ext and assetId.", name))?;
                format!("{}.{}", asset_id, data_format)
            }
        };
        out.push(Asset {
            name,
            md5ext,
            data_format,
        });
    }
    Ok(out)
}

fn read_decls(node: Option<&Value>) -> Vec<Declaration> {
    let mut out = Vec::new();
    let Some(obj) = node.and_then(Value::as_object) else {
        return out;
    };
    for value in obj.values() {
        let Some(arr) = value.as_array() else {
            continue;
        };
        if let Some(name) = arr.first().and_then(Value::as_str) {
            out.push(Declaration {
                name: name.to_string(),
                value: arr.get(1).cloned().unwrap_or(Value::from(0)),
            });
        }
    }
    out
}

fn read_comments(node: Option<&Value>) -> Vec<Comment> {
    let mut out = Vec::new();
    let Some(obj) = node.and_then(Value::as_object) else {
        return out;
    };
    for comment in obj.values() {
        let Some(text) = comment.get("text").and_then(Value::as_str) else {
            continue;
        };
        out.push(Comment {
            block_id: comment
                .get("blockId")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            text: text.to_string(),
        });
    }
    out
}

/// Somewhere asset bytes can be fetched from by content key (`<md5>.<ext>`).
pub trait AssetSource {
    fn read_asset(&mut self, md5ext: &str) -> Result<Option<Vec<u8>>>;
}

impl<R: Read + Seek> AssetSource for ZipArchive<R> {
    fn read_asset(&mut self, md5ext: &str) -> Result<Option<Vec<u8>>> {
        let mut entry = match self.by_name(md5ext) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("Failed reading '{}'.", md5ext)),
        };
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed reading '{}' from archive.", md5ext))?;
        Ok(Some(bytes))
    }
}

impl AssetSource for HashMap<String, Vec<u8>> {
    fn read_asset(&mut self, md5ext: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(md5ext).cloned())
    }
}

/// An opened `.sb3` file: the parsed project plus the archive it came from.
#[cfg(not(target_arch = "wasm32"))]
pub struct Sb3Archive {
    pub project: Project,
    pub archive: ZipArchive<fs::File>,
}

#[cfg(not(target_arch = "wasm32"))]
impl Sb3Archive {
    pub fn open(input: &Path) -> Result<Self> {
        let file = fs::File::open(input)
            .with_context(|| format!("Failed to open '{}'.", input.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("'{}' is not a valid zip/.sb3 file.", input.display()))?;

        let mut project_json_str = String::new();
        archive
            .by_name("project.json")
            .map_err(|_| anyhow!("project.json not found in '{}'.", input.display()))?
            .read_to_string(&mut project_json_str)?;
        let project_json: Value = serde_json::from_str(&project_json_str)
            .with_context(|| format!("Invalid project.json inside '{}'.", input.display()))?;
        let project = Project::from_json(&project_json)?;
        Ok(Self { project, archive })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "targets": [
                {
                    "isStage": true,
                    "name": "Stage",
                    "variables": { "v1": ["score", 0] },
                    "lists": { "l1": ["items", ["a", "b"]] },
                    "blocks": {
                        "loose": [12, "score", "v1", 10, 10]
                    },
                    "comments": {
                        "c1": { "blockId": null, "text": "hello" }
                    },
                    "costumes": [
                        { "name": "backdrop1", "assetId": "abc", "md5ext": "abc.svg", "dataFormat": "svg" }
                    ],
                    "sounds": []
                },
                {
                    "isStage": false,
                    "name": "Cat",
                    "variables": {},
                    "lists": {},
                    "blocks": {
                        "b1": {
                            "opcode": "event_whenflagclicked",
                            "next": "b2", "parent": null,
                            "inputs": {}, "fields": {},
                            "topLevel": true, "x": 12, "y": 40
                        },
                        "b2": {
                            "opcode": "data_setvariableto",
                            "next": null, "parent": "b1",
                            "inputs": { "VALUE": [1, [10, "0"]] },
                            "fields": { "VARIABLE": ["score", "v1"] },
                            "topLevel": false
                        }
                    },
                    "comments": {
                        "c2": { "blockId": "b2", "text": "reset" }
                    },
                    "costumes": [
                        { "name": "cat", "assetId": "def", "dataFormat": "png" }
                    ],
                    "sounds": [],
                    "layerOrder": 1,
                    "x": 0, "y": 0
                }
            ]
        })
    }

    #[test]
    fn parses_targets_in_document_order() {
        let project = Project::from_json(&sample()).unwrap();
        assert_eq!(project.targets.len(), 2);
        let stage = &project.targets[0];
        assert!(stage.is_stage);
        assert!(stage.blocks.is_empty());
        assert_eq!(stage.variables[0].name, "score");
        assert_eq!(stage.lists[0].value, json!(["a", "b"]));

        let cat = &project.targets[1];
        assert_eq!(cat.layer_order, Some(1));
        assert_eq!(cat.costumes[0].md5ext, "def.png");
        assert_eq!(cat.properties.get("x"), Some(&json!(0)));
        let tops = cat.top_level_blocks().map(|b| b.id.as_str()).collect::<Vec<_>>();
        assert_eq!(tops, vec!["b1"]);
        assert_eq!(cat.blocks["b1"].next.as_deref(), Some("b2"));
        assert_eq!(cat.blocks["b2"].field_text("VARIABLE").as_deref(), Some("score"));
        assert_eq!(cat.blocks["b2"].field("VARIABLE").unwrap().id.as_deref(), Some("v1"));
        let attached = cat
            .attached_comments()
            .map(|(id, comment)| (id, comment.text.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(attached, vec![("b2", "reset")]);
    }

    #[test]
    fn reads_mutation_lists() {
        let mutation = Mutation {
            raw: json!({
                "proccode": "jump %s",
                "argumentnames": "[\"height\"]",
                "argumentids": "[\"a1\"]",
                "warp": "true"
            })
            .as_object()
            .unwrap()
            .clone(),
        };
        assert_eq!(mutation.proccode(), Some("jump %s"));
        assert_eq!(mutation.argument_names(), Some(vec!["height".to_string()]));
        assert_eq!(mutation.argument_ids(), Some(vec!["a1".to_string()]));
        assert!(mutation.warp());
    }

    #[test]
    fn decodes_comment_escapes() {
        let comment = Comment {
            block_id: None,
            text: r#"line one\nline two \"q\" \u00e9 \x41 \q"#.to_string(),
        };
        assert_eq!(comment.decoded_text(), "line one\nline two \"q\" \u{e9} A \\q");
        let plain = Comment {
            block_id: None,
            text: "caf\u{e9}".to_string(),
        };
        assert_eq!(plain.decoded_text(), "caf\u{e9}");
    }

    #[test]
    fn missing_targets_is_an_error() {
        assert!(Project::from_json(&json!({})).is_err());
    }

    #[test]
    fn in_memory_asset_source() {
        let mut assets = HashMap::new();
        assets.insert("abc.svg".to_string(), b"<svg/>".to_vec());
        assert_eq!(assets.read_asset("abc.svg").unwrap(), Some(b"<svg/>".to_vec()));
        assert_eq!(assets.read_asset("missing.png").unwrap(), None);
    }
}
