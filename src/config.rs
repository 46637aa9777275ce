//! `goboscript.toml` generation from the TurboWarp settings comment that
//! TurboWarp stores on the stage.

use crate::project::Target;
use serde_json::Value;

const CONFIG_MARKER: &str = "_twconfig_";
const BITMAP_RESOLUTION: u32 = 2;
const DEFAULT_LAYER_ORDER: i64 = 1000;

/// Parse the JSON payload of the stage's TurboWarp config comment.
///
/// The comment ends with a line like `{"framerate":60} // _twconfig_`.
/// Returns `None` when there is no such comment or its payload is not JSON.
pub fn find_config(stage: &Target) -> Option<Value> {
    let comment = stage
        .comments
        .iter()
        .find(|comment| comment.text.ends_with(CONFIG_MARKER))?;
    let decoded = comment.decoded_text();
    let last_line = decoded.rsplit('\n').next()?;
    let end = last_line.rfind('}')?;
    match serde_json::from_str(&last_line[..=end]) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable TurboWarp config comment");
            None
        }
    }
}

/// Sprite names ordered back to front.
pub fn layer_order<'a>(sprites: impl IntoIterator<Item = (&'a str, &'a Target)>) -> Vec<String> {
    let mut layers = sprites
        .into_iter()
        .filter(|(_, target)| !target.is_stage)
        .map(|(name, target)| (target.layer_order.unwrap_or(DEFAULT_LAYER_ORDER), name))
        .collect::<Vec<_>>();
    layers.sort_by_key(|(order, _)| *order);
    layers.into_iter().map(|(_, name)| name.to_string()).collect()
}

/// Render `goboscript.toml` from a parsed config payload.
pub fn render_config(config: &Value, layers: &[String]) -> String {
    let mut out = String::new();
    let mut line = |key: &str, value: String| out.push_str(&format!("{} = {}\n", key, value));

    if let Some(frame_rate) = config.get("framerate") {
        line("frame_rate", scalar(frame_rate));
    }
    if let Some(options) = config.get("runtimeOptions") {
        if let Some(max_clones) = options.get("maxClones") {
            let value = match max_clones {
                Value::String(s) if s == "Infinity" => "inf".to_string(),
                other => scalar(other),
            };
            line("max_clones", value);
        }
        if let Some(limits) = options.get("miscLimits").and_then(Value::as_bool) {
            line("no_miscellaneous_limits", (!limits).to_string());
        }
        if let Some(fencing) = options.get("fencing").and_then(Value::as_bool) {
            line("no_sprite_fencing", (!fencing).to_string());
        }
    }
    for (source, key) in [
        ("interpolation", "frame_interpolation"),
        ("hq", "high_quality_pen"),
        ("width", "stage_width"),
        ("height", "stage_height"),
    ] {
        if let Some(value) = config.get(source) {
            line(key, scalar(value));
        }
    }
    line("bitmap_resolution", BITMAP_RESOLUTION.to_string());

    let layers = Value::from(layers.to_vec()).to_string();
    out.push_str(&format!("layers = {}", layers));
    out
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
