use pretty_assertions::assert_eq;
use sb3_goboscript_core::convert::{convert_project, ConvertOptions};
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

const TW_CONFIG: &str = "Configuration for https://turbowarp.org/\\n{\\\"framerate\\\":30,\\\"runtimeOptions\\\":{\\\"fencing\\\":false}} // _twconfig_";

fn project_json() -> Value {
    json!({
        "targets": [
            {
                "isStage": true,
                "name": "Stage",
                "variables": { "v1": ["lives left", 3] },
                "lists": {},
                "broadcasts": { "b1": "go" },
                "blocks": {},
                "comments": { "tw": { "blockId": null, "text": TW_CONFIG } },
                "costumes": [
                    { "name": "backdrop1", "assetId": "aaa", "md5ext": "aaa.svg", "dataFormat": "svg" }
                ],
                "sounds": [],
                "volume": 100
            },
            {
                "isStage": false,
                "name": "Player",
                "variables": {},
                "lists": { "l1": ["path", [1, 2]] },
                "blocks": {
                    "hat": {
                        "opcode": "event_whenbroadcastreceived", "next": "loop",
                        "inputs": {}, "fields": { "BROADCAST_OPTION": ["go", "b1"] },
                        "topLevel": true, "x": 48, "y": 64
                    },
                    "loop": {
                        "opcode": "control_repeat", "next": "done",
                        "inputs": { "TIMES": [1, [6, "3"]], "SUBSTACK": [2, "step"] },
                        "fields": {}, "topLevel": false
                    },
                    "step": {
                        "opcode": "data_changevariableby", "next": null,
                        "inputs": { "VALUE": [1, [4, "-1"]] },
                        "fields": { "VARIABLE": ["lives left", "v1"] }, "topLevel": false
                    },
                    "done": {
                        "opcode": "control_delete_this_clone", "next": null,
                        "inputs": {}, "fields": {}, "topLevel": false
                    }
                },
                "comments": {},
                "costumes": [
                    { "name": "idle", "assetId": "bbb", "md5ext": "bbb.png", "dataFormat": "png" },
                    { "name": "backdrop1", "assetId": "aaa", "md5ext": "aaa.svg", "dataFormat": "svg" }
                ],
                "sounds": [
                    { "name": "jump", "assetId": "ccc", "md5ext": "ccc.wav", "dataFormat": "wav" }
                ],
                "x": 5, "y": 6, "size": 100, "direction": 90, "visible": true,
                "layerOrder": 1, "currentCostume": 0, "volume": 100
            }
        ]
    })
}

fn write_sb3(dir: &Path, project: &Value) -> PathBuf {
    let path = dir.join("demo game.sb3");
    let file = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("project.json", opts).unwrap();
    zip.write_all(project.to_string().as_bytes()).unwrap();
    zip.start_file("aaa.svg", opts).unwrap();
    zip.write_all(b"<svg/>").unwrap();
    zip.start_file("bbb.png", opts).unwrap();
    zip.write_all(b"png bytes").unwrap();
    // ccc.wav is left out on purpose: missing assets are skipped.
    zip.finish().unwrap();
    path
}

#[test]
fn converts_archive_into_project_directory() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_sb3(dir.path(), &project_json());
    let out = dir.path().join("out");
    let options = ConvertOptions {
        output_dir: Some(out.clone()),
        ..ConvertOptions::default()
    };

    let project_dir = convert_project(&input, &options).unwrap();
    assert_eq!(project_dir, out.join("demo game"));

    let player = fs::read_to_string(project_dir.join("Player.gs")).unwrap();
    assert_eq!(
        player,
        "# Converted from sb3 file\n\
         \n\
         costumes \"costumes/Player/idle.png\" as \"idle\", \"costumes/backdrop1.svg\" as \"backdrop1\";\n\
         \n\
         sounds \"sounds/Player/jump.wav\" as \"jump\";\n\
         \n\
         list path = [1,2];\n\
         \n\
         # script hat (48,64)\n\
         on \"go\" {\n    repeat 3 {\n        lives_left += -1;\n    }\n    delete_this_clone;\n}\n"
    );

    let stage = fs::read_to_string(project_dir.join("stage.gs")).unwrap();
    assert!(stage.contains("costumes \"costumes/backdrop1.svg\" as \"backdrop1\";"));
    assert!(stage.contains("var lives_left = 3;"));

    assert_eq!(
        fs::read(project_dir.join("costumes").join("backdrop1.svg")).unwrap(),
        b"<svg/>"
    );
    assert_eq!(
        fs::read(project_dir.join("costumes").join("Player").join("idle.png")).unwrap(),
        b"png bytes"
    );
    assert!(!project_dir.join("sounds").join("Player").join("jump.wav").exists());

    let config = fs::read_to_string(project_dir.join("goboscript.toml")).unwrap();
    assert_eq!(
        config,
        "frame_rate = 30\nno_sprite_fencing = true\nbitmap_resolution = 2\nlayers = [\"Player\"]"
    );

    let meta: Value =
        serde_json::from_str(&fs::read_to_string(project_dir.join("postprocess.json")).unwrap())
            .unwrap();
    assert_eq!(meta["targets"]["Player"]["x"], json!(5));
    assert_eq!(meta["targets"]["Player"]["name"], json!("Player"));
    assert_eq!(meta["targets"]["stage"]["code_remap"]["lives_left"], json!("lives left"));
}

#[test]
fn rerunning_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_sb3(dir.path(), &project_json());
    let options = ConvertOptions::default();

    let first = convert_project(&input, &options).unwrap();
    let before = fs::read_to_string(first.join("Player.gs")).unwrap();
    let second = convert_project(&input, &options).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, dir.path().join("demo game"));
    assert_eq!(fs::read_to_string(second.join("Player.gs")).unwrap(), before);
}

#[test]
fn optional_outputs_can_be_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_sb3(dir.path(), &project_json());
    let options = ConvertOptions {
        write_config: false,
        write_postprocess: false,
        ..ConvertOptions::default()
    };
    let project_dir = convert_project(&input, &options).unwrap();
    assert!(project_dir.join("stage.gs").exists());
    assert!(!project_dir.join("goboscript.toml").exists());
    assert!(!project_dir.join("postprocess.json").exists());
}

#[test]
fn malformed_input_aborts_with_location() {
    let mut project = project_json();
    project["targets"][1]["blocks"]["step"]["inputs"]["VALUE"] = json!([9, [4, "1"]]);
    let dir = tempfile::tempdir().unwrap();
    let input = write_sb3(dir.path(), &project);

    let err = convert_project(&input, &ConvertOptions::default()).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Player"), "{}", message);
    assert!(message.contains("step"), "{}", message);
}

#[test]
fn non_archive_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.sb3");
    fs::write(&input, b"not a zip").unwrap();
    assert!(convert_project(&input, &ConvertOptions::default()).is_err());
}
