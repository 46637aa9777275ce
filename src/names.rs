use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

/// Words goboscript reserves for statements, reporters and declarations.
const RESERVED_NAMES: &[&str] = &[
    "costumes", "sounds", "global", "list", "var", "proc", "func", "nowarp", "onflag", "onkey",
    "onclick", "onbackdrop", "onloudness", "ontimer", "on", "onclone", "if", "else", "elif",
    "until", "forever", "repeat", "delete", "at", "add", "to", "insert", "true", "false", "as",
    "struct", "enum", "return", "log", "error", "warn", "breakpoint", "local", "not", "and", "or",
    "in", "length", "round", "abs", "floor", "ceil", "sqrt", "sin", "cos", "tan", "asin", "acos",
    "atan", "ln", "antiln", "antilog", "contains", "move", "turn_left", "turn_right",
    "goto_random_position", "goto_mouse_pointer", "goto", "glide", "glide_to_random_position",
    "glide_to_mouse_pointer", "point_in_direction", "point_towards_mouse_pointer",
    "point_towards_random_direction", "point_towards", "change_x", "set_x", "change_y", "set_y",
    "if_on_edge_bounce", "set_rotation_style_left_right", "set_rotation_style_do_not_rotate",
    "set_rotation_style_all_around", "say", "think", "switch_costume", "next_costume",
    "switch_backdrop", "next_backdrop", "set_size", "change_size", "change_color_effect",
    "change_fisheye_effect", "change_whirl_effect", "change_pixelate_effect",
    "change_mosaic_effect", "change_brightness_effect", "change_ghost_effect", "set_color_effect",
    "set_fisheye_effect", "set_whirl_effect", "set_pixelate_effect", "set_mosaic_effect",
    "set_brightness_effect", "set_ghost_effect", "clear_graphic_effects", "show", "hide",
    "goto_front", "goto_back", "go_forward", "go_backward", "play_sound_until_done",
    "start_sound", "stop_all_sounds", "change_pitch_effect", "change_pan_effect",
    "set_pitch_effect", "set_pan_effect", "change_volume", "set_volume", "clear_sound_effects",
    "broadcast", "broadcast_and_wait", "wait", "wait_until", "stop_all", "stop_this_script",
    "stop_other_scripts", "delete_this_clone", "clone", "ask", "set_drag_mode_draggable",
    "set_drag_mode_not_draggable", "reset_timer", "erase_all", "stamp", "pen_down", "pen_up",
    "set_pen_color", "change_pen_size", "set_pen_size", "set_pen_hue", "set_pen_saturation",
    "set_pen_brightness", "set_pen_transparency", "change_pen_hue", "change_pen_saturation",
    "change_pen_brightness", "change_pen_transparency", "set_pen_shade", "change_pen_shade",
    "rest", "set_tempo", "change_tempo", "distance_to_mouse_pointer", "distance_to",
    "x_position", "y_position", "direction", "size", "costume_number", "costume_name",
    "backdrop_number", "backdrop_name", "volume", "touching_mouse_pointer", "touching_edge",
    "touching", "key_pressed", "mouse_down", "mouse_x", "mouse_y", "loudness", "timer",
    "current_year", "current_month", "current_date", "current_day_of_week", "current_hour",
    "current_minute", "current_second", "days_since_2000", "username", "touching_color",
    "color_is_touching_color", "answer", "random", "tw_is_compiled", "tw_is_turbowarp",
    "tw_is_forkphorus",
];

const DIGEST_CHARS: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const DIGEST_LEN: usize = 5;

static RESERVED: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| RESERVED_NAMES.iter().copied().collect());

static INVALID_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid file name pattern"));

const RESERVED_FILE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Var,
    List,
    Arg,
    Custom,
}

impl NameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NameKind::Var => "var",
            NameKind::List => "list",
            NameKind::Arg => "arg",
            NameKind::Custom => "custom",
        }
    }
}

/// Where a name is visible: one sprite, or every target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Sprite(String),
}

impl Scope {
    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => write!(f, "stage"),
            Scope::Sprite(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKey {
    pub source: String,
    pub kind: NameKind,
    pub scope: Scope,
}

/// Registry of every identifier handed out during one conversion.
///
/// Lookups are memoized, so the same Scratch name always maps to the same
/// goboscript identifier, and a freshly sanitized name is never handed to a
/// second source name. Global identifiers are visible from every sprite, so a
/// sprite may not reuse one.
#[derive(Debug, Default)]
pub struct NamePool {
    resolved: IndexMap<NameKey, String>,
    used: HashSet<(String, Scope)>,
    used_anywhere: HashSet<String>,
}

impl NamePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, source: &str, kind: NameKind, scope: &Scope) -> String {
        if !scope.is_global() {
            if let Some(found) = self.lookup(source, kind, scope) {
                return found.to_string();
            }
        }
        if let Some(found) = self.lookup(source, kind, &Scope::Global) {
            return found.to_string();
        }

        let candidate = sanitize_name(source);
        if !scope.is_global()
            && !self.is_used(&candidate, scope)
            && !self.is_used(&candidate, &Scope::Global)
        {
            return self.reserve(source, kind, scope, candidate);
        }
        // A global identifier is visible in every sprite, so it must be free everywhere.
        if !self.used_anywhere.contains(&candidate) {
            return self.reserve(source, kind, &Scope::Global, candidate);
        }

        let mut attempt = 0u32;
        loop {
            let hashed = format!("{}_{}", candidate, name_digest(source, kind, scope, attempt));
            if self.is_available(&hashed, scope) {
                return self.reserve(source, kind, scope, hashed);
            }
            attempt += 1;
        }
    }

    pub fn lookup(&self, source: &str, kind: NameKind, scope: &Scope) -> Option<&str> {
        let key = NameKey {
            source: source.to_string(),
            kind,
            scope: scope.clone(),
        };
        self.resolved.get(&key).map(String::as_str)
    }

    /// Every resolved name in the order it was first requested.
    pub fn entries(&self) -> impl Iterator<Item = (&NameKey, &str)> {
        self.resolved.iter().map(|(key, name)| (key, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    fn is_used(&self, name: &str, scope: &Scope) -> bool {
        self.used.contains(&(name.to_string(), scope.clone()))
    }

    fn is_available(&self, name: &str, scope: &Scope) -> bool {
        match scope {
            Scope::Global => !self.used_anywhere.contains(name),
            Scope::Sprite(_) => !self.is_used(name, scope) && !self.is_used(name, &Scope::Global),
        }
    }

    fn reserve(&mut self, source: &str, kind: NameKind, scope: &Scope, name: String) -> String {
        self.used.insert((name.clone(), scope.clone()));
        self.used_anywhere.insert(name.clone());
        self.resolved.insert(
            NameKey {
                source: source.to_string(),
                kind,
                scope: scope.clone(),
            },
            name.clone(),
        );
        name
    }
}

/// Make a Scratch name usable as a goboscript identifier.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if c.is_ascii() {
            out.push('_');
        } else {
            out.push_str(&format!("0x{:06X}", c as u32));
        }
    }
    let needs_prefix = out.is_empty()
        || out.starts_with(|c: char| c.is_ascii_digit())
        || RESERVED.contains(out.as_str());
    if needs_prefix {
        out.insert(0, '_');
    }
    out
}

fn name_digest(source: &str, kind: NameKind, scope: &Scope, attempt: u32) -> String {
    let seed = format!("{}\u{0}{}\u{0}{}\u{0}{}", source, kind.as_str(), scope, attempt);
    let digest = md5::compute(seed.as_bytes());
    let mut value = u128::from_be_bytes(digest.0);
    let mut out = [0u8; DIGEST_LEN];
    for slot in out.iter_mut().rev() {
        *slot = DIGEST_CHARS[(value % 62) as usize];
        value /= 62;
    }
    out.iter().map(|&b| b as char).collect()
}

/// Make a name safe to use as a file or directory name on every platform.
pub fn valid_file_name(name: &str) -> String {
    let replaced = INVALID_FILE_CHARS.replace_all(name, "_");
    let mut sanitized = replaced.trim_end_matches(['.', ' ']).to_string();
    if RESERVED_FILE_NAMES
        .iter()
        .any(|reserved| sanitized.eq_ignore_ascii_case(reserved))
    {
        sanitized.push('_');
    }
    if sanitized.is_empty() {
        sanitized.push('_');
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite(name: &str) -> Scope {
        Scope::Sprite(name.to_string())
    }

    #[test]
    fn sanitizes_identifiers() {
        assert_eq!(sanitize_name("player speed"), "player_speed");
        assert_eq!(sanitize_name("x!"), "x_");
        assert_eq!(sanitize_name("1st"), "_1st");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(sanitize_name("repeat"), "_repeat");
        assert_eq!(sanitize_name("é"), "_0x0000E9");
        assert_eq!(sanitize_name("aé"), "a0x0000E9");
    }

    #[test]
    fn resolution_is_memoized() {
        let mut pool = NamePool::new();
        let first = pool.resolve("x!", NameKind::Var, &sprite("A"));
        let second = pool.resolve("x!", NameKind::Var, &sprite("A"));
        assert_eq!(first, "x_");
        assert_eq!(first, second);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn kinds_do_not_share_identifiers() {
        let mut pool = NamePool::new();
        let var = pool.resolve("x!", NameKind::Var, &sprite("A"));
        let list = pool.resolve("x!", NameKind::List, &sprite("A"));
        assert_ne!(var, list);
        assert!(list.starts_with("x__"));
        assert_eq!(list.len(), "x_".len() + 1 + DIGEST_LEN);
    }

    #[test]
    fn global_names_are_visible_from_sprites() {
        let mut pool = NamePool::new();
        let global = pool.resolve("score", NameKind::Var, &Scope::Global);
        assert_eq!(pool.resolve("score", NameKind::Var, &sprite("A")), global);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn sprite_candidate_colliding_with_global_is_hashed() {
        let mut pool = NamePool::new();
        let global = pool.resolve("n!", NameKind::Var, &Scope::Global);
        let local = pool.resolve("n?", NameKind::Var, &sprite("A"));
        assert_eq!(global, "n_");
        assert_ne!(global, local);
        assert!(local.starts_with("n__"));
    }

    #[test]
    fn stage_names_go_global() {
        let mut pool = NamePool::new();
        pool.resolve("a", NameKind::Var, &Scope::Global);
        assert_eq!(pool.lookup("a", NameKind::Var, &Scope::Global), Some("a"));
    }

    #[test]
    fn local_collisions_never_share_an_identifier() {
        let mut pool = NamePool::new();
        let first = pool.resolve("a b", NameKind::Var, &sprite("A"));
        let second = pool.resolve("a-b", NameKind::Var, &sprite("A"));
        assert_eq!(first, "a_b");
        assert_ne!(second, first);
        assert_eq!(pool.lookup("a-b", NameKind::Var, &sprite("A")), Some(second.as_str()));
    }

    #[test]
    fn global_name_taken_by_a_sprite_is_hashed() {
        let mut pool = NamePool::new();
        let local = pool.resolve("hp", NameKind::Var, &sprite("A"));
        let global = pool.resolve("hp", NameKind::Var, &Scope::Global);
        assert_eq!(local, "hp");
        assert_ne!(global, "hp");
        assert!(global.starts_with("hp_"));
    }

    #[test]
    fn candidate_free_locally_but_used_elsewhere_goes_global() {
        let mut pool = NamePool::new();
        pool.resolve("t", NameKind::Var, &Scope::Global);
        let custom = pool.resolve("t", NameKind::Custom, &Scope::Global);
        assert_ne!(custom, "t");
    }

    #[test]
    fn separate_sprites_can_reuse_a_name() {
        let mut pool = NamePool::new();
        let a = pool.resolve("speed", NameKind::Var, &sprite("A"));
        let b = pool.resolve("speed", NameKind::Var, &sprite("B"));
        assert_eq!(a, "speed");
        assert_eq!(b, "speed");
    }

    #[test]
    fn digest_is_deterministic() {
        let a = name_digest("x", NameKind::Var, &sprite("A"), 0);
        let b = name_digest("x", NameKind::Var, &sprite("A"), 0);
        let c = name_digest("x", NameKind::Var, &sprite("A"), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn file_names() {
        assert_eq!(valid_file_name("a/b:c"), "a_b_c");
        assert_eq!(valid_file_name("name. "), "name");
        assert_eq!(valid_file_name("con"), "con_");
        assert_eq!(valid_file_name("..."), "_");
        assert_eq!(valid_file_name("Sprite1"), "Sprite1");
    }
}
