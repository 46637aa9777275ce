use wasm_bindgen::prelude::*;

/// Convert a `project.json` document and return a JSON object mapping each
/// `<target>.gs` file name to its goboscript source.
#[wasm_bindgen]
pub fn convert_project_json_to_goboscript(project_json: &str) -> Result<String, JsValue> {
    let converted = crate::convert::convert_project_json(project_json)
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
    serde_json::to_string(&converted.sources).map_err(|e| JsValue::from_str(&e.to_string()))
}
