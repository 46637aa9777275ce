//! goboscript emission for Scratch block scripts.
//!
//! A script is emitted by walking its `next` chain and recursing into nested
//! inputs. Every block produces one fragment plus a [`Flow`] saying how the
//! chain continues after it. Opcodes whose output is a fixed template live in
//! the tables at the bottom of this file; everything with branching behavior
//! has an explicit rule in one of the per-category `emit_*` methods.

use crate::error::GenerateError;
use crate::names::{NameKind, NamePool, Scope};
use crate::project::{Block, Target};
use crate::slot::{Primitive, Slot, SlotPair, TaggedPrimitive};
use std::collections::{HashMap, HashSet};

/// Prefix of every line of a script that cannot run in goboscript.
pub const DISABLE_MARKER: &str = "# ";
pub const DEFAULT_MAX_DEPTH: usize = 128;

const INDENT: &str = "    ";
const EMPTY_CONDITION: &str = "false";

/// Opcodes goboscript accepts as the first block of a script.
pub const HATS: &[&str] = &[
    "event_whenflagclicked",
    "event_whenkeypressed",
    "event_whenthisspriteclicked",
    "event_whenstageclicked",
    "event_whenbackdropswitchesto",
    "event_whengreaterthan",
    "event_whenbroadcastreceived",
    "control_start_as_clone",
    "procedures_definition",
];

const COMMENT_PROCCODE: &str = "// %s";
const LOG_PROCCODE: &str = "\u{200B}\u{200B}log\u{200B}\u{200B} %s";
const WARN_PROCCODE: &str = "\u{200B}\u{200B}warn\u{200B}\u{200B} %s";
const ERROR_PROCCODE: &str = "\u{200B}\u{200B}error\u{200B}\u{200B} %s";
const BREAKPOINT_PROCCODE: &str = "\u{200B}\u{200B}breakpoint\u{200B}\u{200B}";

type GenResult<T> = Result<T, GenerateError>;

/// Emit the script starting at `start` in `target`.
pub fn generate(target: &Target, start: &str, names: &mut NamePool) -> GenResult<String> {
    Generator::new(target, names).generate(start)
}

/// The name scope a target's identifiers are resolved in.
pub fn target_scope(target: &Target) -> Scope {
    if target.is_stage {
        Scope::Global
    } else {
        Scope::Sprite(target.name.clone())
    }
}

/// How the chain continues after a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Ends with `;`, followed by `next`.
    Statement,
    /// Ends with a closing brace or comment, followed by `next`.
    Compound,
    /// Ends with `;`, nothing may follow.
    Cap,
    /// Hats and `forever`: the fragment is complete on its own.
    Closed,
    /// A reporter used inside an expression.
    Value,
}

struct Emit {
    text: String,
    flow: Flow,
}

impl Emit {
    fn statement(text: String) -> Self {
        Self {
            text,
            flow: Flow::Statement,
        }
    }

    fn compound(text: String) -> Self {
        Self {
            text,
            flow: Flow::Compound,
        }
    }

    fn cap(text: String) -> Self {
        Self {
            text,
            flow: Flow::Cap,
        }
    }

    fn closed(text: String) -> Self {
        Self {
            text,
            flow: Flow::Closed,
        }
    }

    fn value(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            flow: Flow::Value,
        }
    }
}

/// The kind of value an input resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Block,
    Number,
    Color,
    Text,
    Broadcast,
    Variable,
    List,
}

pub struct Generator<'a> {
    target: &'a Target,
    scope: Scope,
    names: &'a mut NamePool,
    comments: HashMap<&'a str, String>,
    disabled: bool,
    depth: usize,
    max_depth: usize,
}

impl<'a> Generator<'a> {
    pub fn new(target: &'a Target, names: &'a mut NamePool) -> Self {
        let comments = target
            .attached_comments()
            .map(|(block_id, comment)| (block_id, comment.decoded_text()))
            .collect();
        Self {
            target,
            scope: target_scope(target),
            names,
            comments,
            disabled: false,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn generate(mut self, start: &str) -> GenResult<String> {
        let root = self.block(start)?;
        self.disabled = !HATS.contains(&root.opcode.as_str());
        let text = self.walk(Some(start), 0)?;
        if !self.disabled {
            return Ok(text);
        }
        let lines = text
            .split('\n')
            .map(|line| {
                if line.starts_with('#') {
                    line.to_string()
                } else {
                    format!("{}{}", DISABLE_MARKER, line)
                }
            })
            .collect::<Vec<_>>();
        Ok(lines.join("\n"))
    }

    fn block(&self, id: &str) -> GenResult<&'a Block> {
        let target: &'a Target = self.target;
        target
            .blocks
            .get(id)
            .ok_or_else(|| GenerateError::MissingBlock(id.to_string()))
    }

    fn indent(&self, level: usize) -> String {
        let base = INDENT.repeat(level);
        if self.disabled {
            format!("{}{}", DISABLE_MARKER, base)
        } else {
            base
        }
    }

    /// Emit the chain starting at `start`, every statement at `level`.
    fn walk(&mut self, start: Option<&str>, level: usize) -> GenResult<String> {
        let Some(start) = start.filter(|id| !id.is_empty()) else {
            return Ok(String::new());
        };
        self.depth += 1;
        let result = self.walk_chain(start, level);
        self.depth -= 1;
        result
    }

    fn walk_chain(&mut self, start: &str, level: usize) -> GenResult<String> {
        if self.depth > self.max_depth {
            return Err(GenerateError::DepthExceeded {
                block: start.to_string(),
                limit: self.max_depth,
            });
        }
        let indent = self.indent(level);
        let mut out = String::new();
        let mut visited = HashSet::new();
        let mut current = Some(start);
        let mut first = true;
        while let Some(id) = current.take() {
            // A revisited block means the chain never ends.
            if !visited.insert(id) {
                return Err(GenerateError::DepthExceeded {
                    block: id.to_string(),
                    limit: self.max_depth,
                });
            }
            let block = self.block(id)?;
            let emitted = self.emit(block, level)?;
            if !first {
                out.push('\n');
                if let Some(comment) = self.comments.get(id) {
                    for line in comment.split('\n') {
                        out.push_str(&format!("{}# {}\n", indent, line));
                    }
                }
            }
            first = false;
            out.push_str(&emitted.text);
            match emitted.flow {
                Flow::Statement => {
                    out.push(';');
                    current = block.next.as_deref();
                }
                Flow::Compound => current = block.next.as_deref(),
                Flow::Cap => out.push(';'),
                Flow::Closed | Flow::Value => {}
            }
        }
        Ok(out)
    }

    fn emit(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let op = block.opcode.as_str();
        if let Some(template) = STATEMENTS.iter().find(|t| t.opcode == op) {
            return self.emit_template(block, level, template);
        }
        if let Some(reporter) = REPORTERS.iter().find(|r| r.opcode == op) {
            let args = self.template_args(block, reporter.args)?;
            return Ok(Emit::value(format!("{}({})", reporter.keyword, args)));
        }
        if let Some((_, field)) = MENUS.iter().find(|(opcode, _)| *opcode == op) {
            return Ok(Emit::value(self.field(block, field, "")));
        }
        if let Some(binary) = BINARY_OPERATORS.iter().find(|b| b.opcode == op) {
            return self.emit_binary(block, binary);
        }
        match op.split_once('_').map(|(category, _)| category) {
            Some("event") => self.emit_event(block, level),
            Some("motion") => self.emit_motion(block, level),
            Some("looks") => self.emit_looks(block, level),
            Some("sound") => self.emit_sound(block, level),
            Some("control") => self.emit_control(block, level),
            Some("sensing") => self.emit_sensing(block, level),
            Some("operator") => self.emit_operator(block, level),
            Some("data") => self.emit_data(block, level),
            Some("procedures") | Some("argument") => self.emit_procedure(block, level),
            Some("pen") => self.emit_pen(block, level),
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_template(
        &mut self,
        block: &'a Block,
        level: usize,
        template: &Template,
    ) -> GenResult<Emit> {
        let args = self.template_args(block, template.args)?;
        let indent = self.indent(level);
        if args.is_empty() {
            Ok(Emit::statement(format!("{}{}", indent, template.keyword)))
        } else {
            Ok(Emit::statement(format!(
                "{}{} {}",
                indent, template.keyword, args
            )))
        }
    }

    fn template_args(&mut self, block: &'a Block, args: &[Arg]) -> GenResult<String> {
        let mut rendered = Vec::with_capacity(args.len());
        for arg in args {
            rendered.push(match arg {
                Arg::Text(name) => self.input(block, name)?,
                Arg::Num(name) => self.input_numeric(block, name)?,
            });
        }
        Ok(rendered.join(", "))
    }

    fn emit_binary(&mut self, block: &'a Block, binary: &BinaryOperator) -> GenResult<Emit> {
        let (left, right) = if binary.numeric {
            (
                self.input_numeric(block, binary.left)?,
                self.input_numeric(block, binary.right)?,
            )
        } else {
            (self.input(block, binary.left)?, self.input(block, binary.right)?)
        };
        Ok(Emit::value(format!("({}{}{})", left, binary.infix, right)))
    }

    /// Emit a hat: `header { body }`, the body being the hat's `next` chain.
    fn hat(&mut self, block: &'a Block, level: usize, header: &str) -> GenResult<Emit> {
        let indent = self.indent(level);
        let body = self.walk(block.next.as_deref(), level + 1)?;
        Ok(Emit::closed(format!(
            "{}{} {{\n{}\n{}}}",
            indent, header, body, indent
        )))
    }

    fn emit_event(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        match block.opcode.as_str() {
            "event_whenflagclicked" => self.hat(block, level, "onflag"),
            "event_whenkeypressed" => {
                let key = self.field(block, "KEY_OPTION", "");
                self.hat(block, level, &format!("onkey {}", key))
            }
            "event_whenthisspriteclicked" | "event_whenstageclicked" => {
                self.hat(block, level, "onclick")
            }
            "event_whenbackdropswitchesto" => {
                let backdrop = self.field(block, "BACKDROP", "");
                self.hat(block, level, &format!("onbackdrop {}", backdrop))
            }
            "event_whengreaterthan" => {
                let menu = block.field_text("WHENGREATERTHANMENU").unwrap_or_default();
                let keyword = match menu.as_str() {
                    "LOUDNESS" => "onloudness",
                    "TIMER" => "ontimer",
                    _ => return self.unsupported_hat(block, level, &menu),
                };
                let value = self.input_numeric(block, "VALUE")?;
                self.hat(block, level, &format!("{} {}", keyword, value))
            }
            "event_whenbroadcastreceived" => {
                let message = self.field(block, "BROADCAST_OPTION", "");
                self.hat(block, level, &format!("on {}", message))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_motion(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        match block.opcode.as_str() {
            "motion_goto" => {
                let target = self.input(block, "TO")?;
                let text = match target.as_str() {
                    "\"_mouse_\"" => format!("{}goto_mouse_pointer", indent),
                    "\"_random_\"" => format!("{}goto_random_position", indent),
                    _ => format!("{}goto {}", indent, target),
                };
                Ok(Emit::statement(text))
            }
            "motion_pointtowards" => {
                let target = self.input(block, "TOWARDS")?;
                let text = match target.as_str() {
                    "\"_mouse_\"" => format!("{}point_towards_mouse_pointer", indent),
                    "\"_random_\"" => format!("{}point_towards_random_direction", indent),
                    _ => format!("{}point_towards {}", indent, target),
                };
                Ok(Emit::statement(text))
            }
            "motion_glideto" => {
                let target = self.input(block, "TO")?;
                let secs = self.input_numeric(block, "SECS")?;
                let text = match target.as_str() {
                    "\"_mouse_\"" => format!("{}glide_to_mouse_pointer {}", indent, secs),
                    "\"_random_\"" => format!("{}glide_to_random_position {}", indent, secs),
                    _ => format!("{}glide {}, {}", indent, target, secs),
                };
                Ok(Emit::statement(text))
            }
            "motion_setrotationstyle" => {
                let style = block.field_text("STYLE").unwrap_or_default();
                let suffix = match style.as_str() {
                    "left-right" => "left_right",
                    "don't rotate" => "do_not_rotate",
                    "all around" => "all_around",
                    _ => return Ok(self.unsupported(block, level, &style)),
                };
                Ok(Emit::statement(format!(
                    "{}set_rotation_style_{}",
                    indent, suffix
                )))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_looks(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        match block.opcode.as_str() {
            "looks_seteffectto" | "looks_changeeffectby" => {
                let effect = block.field_text("EFFECT").unwrap_or_default().to_lowercase();
                if !LOOKS_EFFECTS.contains(&effect.as_str()) {
                    return Ok(self.unsupported(block, level, &effect));
                }
                let (verb, input) = if block.opcode == "looks_seteffectto" {
                    ("set", "VALUE")
                } else {
                    ("change", "CHANGE")
                };
                let value = self.input_numeric(block, input)?;
                Ok(Emit::statement(format!(
                    "{}{}_{}_effect {}",
                    indent, verb, effect, value
                )))
            }
            "looks_gotofrontback" => {
                let layer = block.field_text("FRONT_BACK").unwrap_or_default().to_lowercase();
                if !matches!(layer.as_str(), "front" | "back") {
                    return Ok(self.unsupported(block, level, &layer));
                }
                Ok(Emit::statement(format!("{}goto_{}", indent, layer)))
            }
            "looks_goforwardbackwardlayers" => {
                let direction = block
                    .field_text("FORWARD_BACKWARD")
                    .unwrap_or_default()
                    .to_lowercase();
                if !matches!(direction.as_str(), "forward" | "backward") {
                    return Ok(self.unsupported(block, level, &direction));
                }
                let layers = self.input_numeric(block, "NUM")?;
                Ok(Emit::statement(format!(
                    "{}go_{} {}",
                    indent, direction, layers
                )))
            }
            "looks_costumenumbername" | "looks_backdropnumbername" => {
                let which = block.field_text("NUMBER_NAME").unwrap_or_default().to_lowercase();
                if !matches!(which.as_str(), "number" | "name") {
                    return Ok(self.unsupported(block, level, &which));
                }
                let subject = if block.opcode == "looks_costumenumbername" {
                    "costume"
                } else {
                    "backdrop"
                };
                Ok(Emit::value(format!("{}_{}()", subject, which)))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_sound(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        match block.opcode.as_str() {
            "sound_seteffectto" | "sound_changeeffectby" => {
                let effect = block.field_text("EFFECT").unwrap_or_default().to_lowercase();
                if !matches!(effect.as_str(), "pitch" | "pan") {
                    return Ok(self.unsupported(block, level, &effect));
                }
                let verb = if block.opcode == "sound_seteffectto" {
                    "set"
                } else {
                    "change"
                };
                let value = self.input_numeric(block, "VALUE")?;
                Ok(Emit::statement(format!(
                    "{}{}_{}_effect {}",
                    self.indent(level),
                    verb,
                    effect,
                    value
                )))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_control(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        match block.opcode.as_str() {
            "control_repeat" => {
                let times = self.input_numeric(block, "TIMES")?;
                let body = self.input_with_stack(block, "SUBSTACK", level)?;
                Ok(Emit::compound(format!(
                    "{}repeat {} {{\n{}\n{}}}",
                    indent, times, body, indent
                )))
            }
            "control_repeat_until" | "control_while" => {
                let condition = self.input_with_reporter(block, "CONDITION", level)?;
                let body = self.input_with_stack(block, "SUBSTACK", level)?;
                let negate = if block.opcode == "control_while" {
                    "not "
                } else {
                    ""
                };
                Ok(Emit::compound(format!(
                    "{}until {}{} {{\n{}\n{}}}",
                    indent, negate, condition, body, indent
                )))
            }
            "control_for_each" => {
                let counter = self.variable(block, "VARIABLE", NameKind::Var);
                let times = self.input_numeric(block, "VALUE")?;
                let body = self.input_with_stack(block, "SUBSTACK", level)?;
                let inner = self.indent(level + 1);
                Ok(Emit::compound(format!(
                    "{indent}{counter} = 1;\n{indent}repeat {times} {{\n{body}\n{inner}{counter}++;\n{indent}}}"
                )))
            }
            "control_forever" => {
                let body = self.input_with_stack(block, "SUBSTACK", level)?;
                Ok(Emit::closed(format!(
                    "{}forever {{\n{}\n{}}}",
                    indent, body, indent
                )))
            }
            "control_if" => {
                let condition = self.input_with_reporter(block, "CONDITION", level)?;
                let body = self.input_with_stack(block, "SUBSTACK", level)?;
                Ok(Emit::compound(format!(
                    "{}if {} {{\n{}\n{}}}",
                    indent, condition, body, indent
                )))
            }
            "control_if_else" => {
                let condition = self.input_with_reporter(block, "CONDITION", level)?;
                let then_body = self.input_with_stack(block, "SUBSTACK", level)?;
                let else_body = self.input_with_stack(block, "SUBSTACK2", level)?;
                Ok(Emit::compound(format!(
                    "{indent}if {condition} {{\n{then_body}\n{indent}}} else {{\n{else_body}\n{indent}}}"
                )))
            }
            "control_wait_until" => {
                let condition = self.input_with_reporter(block, "CONDITION", level)?;
                Ok(Emit::statement(format!(
                    "{}wait_until {}",
                    indent, condition
                )))
            }
            "control_stop" => {
                let option = block
                    .field_text("STOP_OPTION")
                    .unwrap_or_else(|| "all".to_string());
                match option.as_str() {
                    "all" => Ok(Emit::cap(format!("{}stop_all", indent))),
                    "this script" => Ok(Emit::cap(format!("{}stop_this_script", indent))),
                    "other scripts in sprite" | "other scripts in stage" => {
                        Ok(Emit::statement(format!("{}stop_other_scripts", indent)))
                    }
                    _ => Ok(self.unsupported(block, level, &option)),
                }
            }
            "control_delete_this_clone" => {
                Ok(Emit::cap(format!("{}delete_this_clone", indent)))
            }
            "control_start_as_clone" => self.hat(block, level, "onclone"),
            "control_get_counter" => Ok(Emit::value("control_counter")),
            "control_all_at_once" => {
                let body = self.input_with_stack(block, "SUBSTACK", level)?;
                Ok(Emit::compound(format!(
                    "{}# control_all_at_once:\n{}",
                    indent, body
                )))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_sensing(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        match block.opcode.as_str() {
            "sensing_touchingobject" => {
                let target = self.input(block, "TOUCHINGOBJECTMENU")?;
                let text = match target.as_str() {
                    "\"_mouse_\"" => "touching_mouse_pointer()".to_string(),
                    "\"_edge_\"" => "touching_edge()".to_string(),
                    _ => format!("touching({})", target),
                };
                Ok(Emit::value(text))
            }
            "sensing_distanceto" => {
                let target = self.input(block, "DISTANCETOMENU")?;
                let text = match target.as_str() {
                    "\"_mouse_\"" => "distance_to_mouse_pointer()".to_string(),
                    _ => format!("distance_to({})", target),
                };
                Ok(Emit::value(text))
            }
            "sensing_setdragmode" => {
                let mode = block.field_text("DRAG_MODE").unwrap_or_default();
                let text = if mode == "draggable" {
                    format!("{}set_drag_mode_draggable", indent)
                } else {
                    format!("{}set_drag_mode_not_draggable", indent)
                };
                Ok(Emit::statement(text))
            }
            "sensing_of" => {
                let object = self.input(block, "OBJECT")?;
                let property = self.field(block, "PROPERTY", "");
                Ok(Emit::value(format!("({}.{})", object, property)))
            }
            "sensing_current" => {
                let menu = block.field_text("CURRENTMENU").unwrap_or_default();
                let unit = match menu.as_str() {
                    "YEAR" => "year",
                    "MONTH" => "month",
                    "DATE" => "date",
                    "DAYOFWEEK" => "day_of_week",
                    "HOUR" => "hour",
                    "MINUTE" => "minute",
                    "SECOND" => "second",
                    _ => return Ok(self.unsupported(block, level, &menu)),
                };
                Ok(Emit::value(format!("current_{}()", unit)))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_operator(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        match block.opcode.as_str() {
            "operator_and" | "operator_or" => {
                let left = self.input_with_reporter(block, "OPERAND1", level)?;
                let right = self.input_with_reporter(block, "OPERAND2", level)?;
                let keyword = if block.opcode == "operator_and" {
                    "and"
                } else {
                    "or"
                };
                Ok(Emit::value(format!("({} {} {})", left, keyword, right)))
            }
            "operator_not" => {
                let operand = self.input_with_reporter(block, "OPERAND", level)?;
                Ok(Emit::value(format!("(not {})", operand)))
            }
            "operator_letter_of" => {
                let text = self.input(block, "STRING")?;
                let index = self.input_numeric(block, "LETTER")?;
                Ok(Emit::value(format!("{}[{}]", text, index)))
            }
            "operator_mathop" => {
                let op = block.field_text("OPERATOR").unwrap_or_default();
                let Some((_, function)) = MATH_FUNCTIONS.iter().find(|(name, _)| *name == op)
                else {
                    return Ok(self.unsupported(block, level, &op));
                };
                let value = self.input_numeric(block, "NUM")?;
                Ok(Emit::value(format!("{}({})", function, value)))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_data(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        match block.opcode.as_str() {
            "data_variable" => Ok(Emit::value(self.variable(block, "VARIABLE", NameKind::Var))),
            "data_listcontents" => Ok(Emit::value(self.variable(block, "LIST", NameKind::List))),
            "data_setvariableto" => {
                let name = self.variable(block, "VARIABLE", NameKind::Var);
                let value = self.input(block, "VALUE")?;
                Ok(Emit::statement(format!("{}{} = {}", indent, name, value)))
            }
            "data_changevariableby" => {
                let name = self.variable(block, "VARIABLE", NameKind::Var);
                let value = self.input_numeric(block, "VALUE")?;
                Ok(Emit::statement(format!("{}{} += {}", indent, name, value)))
            }
            "data_showvariable" | "data_hidevariable" => {
                let name = self.variable(block, "VARIABLE", NameKind::Var);
                let verb = if block.opcode == "data_showvariable" {
                    "show"
                } else {
                    "hide"
                };
                Ok(Emit::statement(format!("{}{} {}", indent, verb, name)))
            }
            "data_showlist" | "data_hidelist" => {
                let name = self.variable(block, "LIST", NameKind::List);
                let verb = if block.opcode == "data_showlist" {
                    "show"
                } else {
                    "hide"
                };
                Ok(Emit::statement(format!("{}{} {}", indent, verb, name)))
            }
            "data_addtolist" => {
                let item = self.input(block, "ITEM")?;
                let list = self.variable(block, "LIST", NameKind::List);
                Ok(Emit::statement(format!("{}add {} to {}", indent, item, list)))
            }
            "data_deleteoflist" => {
                let list = self.variable(block, "LIST", NameKind::List);
                let index = self.input_numeric(block, "INDEX")?;
                Ok(Emit::statement(format!("{}delete {}[{}]", indent, list, index)))
            }
            "data_deletealloflist" => {
                let list = self.variable(block, "LIST", NameKind::List);
                Ok(Emit::statement(format!("{}delete {}", indent, list)))
            }
            "data_insertatlist" => {
                let item = self.input(block, "ITEM")?;
                let list = self.variable(block, "LIST", NameKind::List);
                let index = self.input_numeric(block, "INDEX")?;
                Ok(Emit::statement(format!(
                    "{}insert {} {}[{}]",
                    indent, item, list, index
                )))
            }
            "data_replaceitemoflist" => {
                let list = self.variable(block, "LIST", NameKind::List);
                let index = self.input_numeric(block, "INDEX")?;
                let item = self.input(block, "ITEM")?;
                Ok(Emit::statement(format!(
                    "{}{}[{}] = {}",
                    indent, list, index, item
                )))
            }
            "data_itemoflist" => {
                let list = self.variable(block, "LIST", NameKind::List);
                let index = self.input_numeric(block, "INDEX")?;
                Ok(Emit::value(format!("{}[{}]", list, index)))
            }
            "data_itemnumoflist" => {
                let item = self.input(block, "ITEM")?;
                let list = self.variable(block, "LIST", NameKind::List);
                Ok(Emit::value(format!("({} in {})", item, list)))
            }
            "data_lengthoflist" => {
                let list = self.variable(block, "LIST", NameKind::List);
                Ok(Emit::value(format!("(length {})", list)))
            }
            "data_listcontainsitem" => {
                let list = self.variable(block, "LIST", NameKind::List);
                let item = self.input(block, "ITEM")?;
                Ok(Emit::value(format!("contains({}, {})", list, item)))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_procedure(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        match block.opcode.as_str() {
            "procedures_definition" => {
                let prototype_id = self
                    .slot(block, "custom_block")?
                    .and_then(|pair| {
                        pair.visible_value()
                            .and_then(Slot::block_id)
                            .map(ToString::to_string)
                    })
                    .ok_or_else(|| {
                        GenerateError::mutation(&block.id, "definition has no prototype")
                    })?;
                let prototype = self.block(&prototype_id)?;
                let mutation = prototype.mutation.as_ref().ok_or_else(|| {
                    GenerateError::mutation(&prototype.id, "prototype has no mutation")
                })?;
                let signature = self.walk(Some(prototype_id.as_str()), 0)?;
                if mutation.proccode() == Some(COMMENT_PROCCODE) {
                    return Ok(Emit::closed(format!("{}# proc {} {{}}", indent, signature)));
                }
                let keyword = if mutation.warp() { "proc" } else { "nowarp proc" };
                self.hat(block, level, &format!("{} {}", keyword, signature))
            }
            "procedures_prototype" => {
                let mutation = block.mutation.as_ref().ok_or_else(|| {
                    GenerateError::mutation(&block.id, "prototype has no mutation")
                })?;
                let proccode = mutation.proccode().ok_or_else(|| {
                    GenerateError::mutation(&block.id, "prototype has no proccode")
                })?;
                let arg_names = mutation.argument_names().ok_or_else(|| {
                    GenerateError::mutation(&block.id, "prototype has no valid argumentnames")
                })?;
                let name = self.names.resolve(proccode, NameKind::Custom, &self.scope);
                let params = arg_names
                    .iter()
                    .map(|arg| self.names.resolve(arg, NameKind::Arg, &self.scope))
                    .collect::<Vec<_>>();
                if params.is_empty() {
                    Ok(Emit::value(name))
                } else {
                    Ok(Emit::value(format!("{} {}", name, params.join(", "))))
                }
            }
            "procedures_call" => self.emit_call(block, level),
            "argument_reporter_string_number" => {
                let name = block.field_text("VALUE").unwrap_or_default();
                Ok(Emit::value(format!(
                    "${}",
                    self.names.resolve(&name, NameKind::Arg, &self.scope)
                )))
            }
            "argument_reporter_boolean" => {
                let name = block.field_text("VALUE").unwrap_or_default();
                if let Some((_, builtin)) = RUNTIME_ARGUMENTS.iter().find(|(arg, _)| *arg == name) {
                    return Ok(Emit::value(*builtin));
                }
                Ok(Emit::value(format!(
                    "${}",
                    self.names.resolve(&name, NameKind::Arg, &self.scope)
                )))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn emit_call(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        let mutation = block
            .mutation
            .as_ref()
            .ok_or_else(|| GenerateError::mutation(&block.id, "call has no mutation"))?;
        let proccode = mutation
            .proccode()
            .ok_or_else(|| GenerateError::mutation(&block.id, "call has no proccode"))?;

        let arg_ids = mutation
            .argument_ids()
            .unwrap_or_else(|| block.inputs.keys().cloned().collect());
        let mut args = Vec::with_capacity(arg_ids.len());
        for arg_id in &arg_ids {
            if block.inputs.contains_key(arg_id) {
                args.push(self.input(block, arg_id)?);
            } else {
                // Empty boolean sockets are not stored at all.
                args.push(EMPTY_CONDITION.to_string());
            }
        }
        let args = args.join(", ");
        let with_args = |keyword: &str| {
            if args.is_empty() {
                format!("{}{}", indent, keyword)
            } else {
                format!("{}{} {}", indent, keyword, args)
            }
        };

        match proccode {
            COMMENT_PROCCODE => {
                let text = args
                    .strip_prefix('"')
                    .and_then(|rest| rest.strip_suffix('"'))
                    .unwrap_or(&args);
                Ok(Emit::compound(format!("{}# {}", indent, text)))
            }
            LOG_PROCCODE => Ok(Emit::statement(with_args("log"))),
            WARN_PROCCODE => Ok(Emit::statement(with_args("warn"))),
            ERROR_PROCCODE => Ok(Emit::statement(with_args("error"))),
            BREAKPOINT_PROCCODE => Ok(Emit::statement(format!("{}breakpoint", indent))),
            _ => {
                let name = self.names.resolve(proccode, NameKind::Custom, &self.scope);
                Ok(Emit::statement(with_args(&name)))
            }
        }
    }

    fn emit_pen(&mut self, block: &'a Block, level: usize) -> GenResult<Emit> {
        let indent = self.indent(level);
        match block.opcode.as_str() {
            "pen_changePenColorParamBy" | "pen_setPenColorParamTo" => {
                let param = self.input(block, "COLOR_PARAM")?;
                let param = param.trim_matches('"').to_string();
                if !PEN_COLOR_PARAMS.contains(&param.as_str()) {
                    return Ok(self.unsupported(block, level, &param));
                }
                let verb = if block.opcode == "pen_setPenColorParamTo" {
                    "set"
                } else {
                    "change"
                };
                let value = self.input_numeric(block, "VALUE")?;
                Ok(Emit::statement(format!(
                    "{}{}_pen_{} {}",
                    indent, verb, param, value
                )))
            }
            "pen_menu_colorParam" => {
                let param = self.field(block, "colorParam", "");
                if param == "\"color\"" {
                    Ok(Emit::value("\"hue\""))
                } else {
                    Ok(Emit::value(param))
                }
            }
            "pen_setPenShadeToNumber" | "pen_changePenShadeBy" => {
                tracing::warn!(
                    target_name = %self.target.name,
                    block = %block.id,
                    opcode = %block.opcode,
                    "pen shade is not supported by goboscript, emitting a best-effort statement"
                );
                let verb = if block.opcode == "pen_setPenShadeToNumber" {
                    "set"
                } else {
                    "change"
                };
                let shade = self.input_numeric(block, "SHADE")?;
                Ok(Emit::statement(format!(
                    "{}{}_pen_shade {}",
                    indent, verb, shade
                )))
            }
            _ => Ok(self.unhandled(block, level)),
        }
    }

    fn unhandled(&self, block: &Block, level: usize) -> Emit {
        tracing::warn!(
            target_name = %self.target.name,
            block = %block.id,
            opcode = %block.opcode,
            "unhandled opcode"
        );
        Emit::compound(format!("{}# unhandled {}", self.indent(level), block.opcode))
    }

    fn unsupported(&self, block: &Block, level: usize, variant: &str) -> Emit {
        tracing::warn!(
            target_name = %self.target.name,
            block = %block.id,
            opcode = %block.opcode,
            variant,
            "unsupported option"
        );
        Emit::compound(format!(
            "{}# unsupported {} option {:?}",
            self.indent(level),
            block.opcode,
            variant
        ))
    }

    /// A hat that cannot be expressed. Its body is kept but disabled, since
    /// it would otherwise land outside any hat.
    fn unsupported_hat(&mut self, block: &'a Block, level: usize, variant: &str) -> GenResult<Emit> {
        let marker = self.unsupported(block, level, variant).text;
        let was_disabled = std::mem::replace(&mut self.disabled, true);
        let body = self.walk(block.next.as_deref(), level);
        self.disabled = was_disabled;
        let body = body?;
        if body.is_empty() {
            return Ok(Emit::closed(marker));
        }
        Ok(Emit::closed(format!("{}\n{}", marker, body)))
    }

    fn slot(&self, block: &Block, name: &str) -> GenResult<Option<SlotPair>> {
        block
            .inputs
            .get(name)
            .map(|raw| SlotPair::decode(raw).map_err(|err| GenerateError::decode(&block.id, err)))
            .transpose()
    }

    /// Resolve an input to text: a nested block is emitted inline, a literal
    /// is rendered as a goboscript literal or identifier.
    fn resolve_input(
        &mut self,
        block: &'a Block,
        name: &str,
    ) -> GenResult<(String, Option<InputKind>)> {
        let Some(pair) = self.slot(block, name)? else {
            return Ok((String::new(), None));
        };
        for slot in [&pair.primary, &pair.shadow] {
            match slot {
                Slot::Empty => continue,
                Slot::Block(id) => {
                    return Ok((self.walk(Some(id.as_str()), 0)?, Some(InputKind::Block)))
                }
                Slot::Literal(primitive) => {
                    let (text, kind) = self.literal(primitive);
                    return Ok((text, Some(kind)));
                }
            }
        }
        Ok((String::new(), None))
    }

    fn literal(&mut self, primitive: &Primitive) -> (String, InputKind) {
        match &primitive.tag {
            TaggedPrimitive::Number(value) => (value.to_string(), InputKind::Number),
            TaggedPrimitive::Color(value) => (value.to_string(), InputKind::Color),
            TaggedPrimitive::Text(value) => (value.to_string(), InputKind::Text),
            TaggedPrimitive::Broadcast { name, .. } => (quote(name), InputKind::Broadcast),
            TaggedPrimitive::Variable { name, .. } => (
                self.names.resolve(name, NameKind::Var, &self.scope),
                InputKind::Variable,
            ),
            TaggedPrimitive::List { name, .. } => (
                self.names.resolve(name, NameKind::List, &self.scope),
                InputKind::List,
            ),
        }
    }

    fn input(&mut self, block: &'a Block, name: &str) -> GenResult<String> {
        Ok(self.resolve_input(block, name)?.0)
    }

    /// Like [`Self::input`], but quoted literals holding a number are
    /// emitted as bare numerals.
    fn input_numeric(&mut self, block: &'a Block, name: &str) -> GenResult<String> {
        let (text, kind) = self.resolve_input(block, name)?;
        if matches!(kind, Some(InputKind::Number) | Some(InputKind::Text)) {
            if let Some(numeral) = numeric_literal(&text) {
                return Ok(numeral.to_string());
            }
        }
        Ok(text)
    }

    /// A boolean input rendered as a nested expression. Empty sockets become
    /// `false`.
    fn input_with_reporter(
        &mut self,
        block: &'a Block,
        name: &str,
        level: usize,
    ) -> GenResult<String> {
        let Some(pair) = self.slot(block, name)? else {
            return Ok(EMPTY_CONDITION.to_string());
        };
        if pair.has_inserted_block() {
            return self.walk(pair.primary.block_id(), level + 1);
        }
        if pair.is_empty() {
            return Ok(EMPTY_CONDITION.to_string());
        }
        self.input(block, name)
    }

    /// A nested stack (the body of a C block), one level deeper.
    fn input_with_stack(&mut self, block: &'a Block, name: &str, level: usize) -> GenResult<String> {
        let Some(pair) = self.slot(block, name)? else {
            return Ok(String::new());
        };
        if !pair.has_inserted_block() {
            return Ok(String::new());
        }
        self.walk(pair.primary.block_id(), level + 1)
    }

    /// A field rendered as a string literal, or `fallback` if absent.
    fn field(&self, block: &Block, name: &str, fallback: &str) -> String {
        block
            .field(name)
            .map(|field| field.value.to_string())
            .unwrap_or_else(|| fallback.to_string())
    }

    fn variable(&mut self, block: &Block, field: &str, kind: NameKind) -> String {
        let name = block.field_text(field).unwrap_or_default();
        self.names.resolve(&name, kind, &self.scope)
    }
}

fn quote(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

/// The numeral inside a JSON literal such as `"3.5"` or `12`, if it is one.
fn numeric_literal(text: &str) -> Option<&str> {
    let inner = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(text)
        .trim();
    let looks_numeric = inner
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '.');
    let parsed = inner.parse::<f64>().ok()?;
    (looks_numeric && parsed.is_finite()).then_some(inner)
}

#[derive(Debug, Clone, Copy)]
enum Arg {
    Text(&'static str),
    Num(&'static str),
}

/// `keyword arg, arg` statements (or `keyword(arg, arg)` reporters).
struct Template {
    opcode: &'static str,
    keyword: &'static str,
    args: &'static [Arg],
}

struct BinaryOperator {
    opcode: &'static str,
    infix: &'static str,
    numeric: bool,
    left: &'static str,
    right: &'static str,
}

const fn template(opcode: &'static str, keyword: &'static str, args: &'static [Arg]) -> Template {
    Template {
        opcode,
        keyword,
        args,
    }
}

const fn binary(opcode: &'static str, infix: &'static str, numeric: bool) -> BinaryOperator {
    let (left, right) = if numeric {
        ("NUM1", "NUM2")
    } else {
        ("OPERAND1", "OPERAND2")
    };
    BinaryOperator {
        opcode,
        infix,
        numeric,
        left,
        right,
    }
}

const STATEMENTS: &[Template] = &[
    template("looks_say", "say", &[Arg::Text("MESSAGE")]),
    template("looks_sayforsecs", "say", &[Arg::Text("MESSAGE"), Arg::Num("SECS")]),
    template("looks_think", "think", &[Arg::Text("MESSAGE")]),
    template("looks_thinkforsecs", "think", &[Arg::Text("MESSAGE"), Arg::Num("SECS")]),
    template("looks_show", "show", &[]),
    template("looks_hide", "hide", &[]),
    template("looks_switchcostumeto", "switch_costume", &[Arg::Text("COSTUME")]),
    template("looks_switchbackdropto", "switch_backdrop", &[Arg::Text("BACKDROP")]),
    template("looks_nextcostume", "next_costume", &[]),
    template("looks_nextbackdrop", "next_backdrop", &[]),
    template("looks_cleargraphiceffects", "clear_graphic_effects", &[]),
    template("looks_setsizeto", "set_size", &[Arg::Num("SIZE")]),
    template("looks_changesizeby", "change_size", &[Arg::Num("CHANGE")]),
    template("sound_playuntildone", "play_sound_until_done", &[Arg::Text("SOUND_MENU")]),
    template("sound_play", "start_sound", &[Arg::Text("SOUND_MENU")]),
    template("sound_stopallsounds", "stop_all_sounds", &[]),
    template("sound_cleareffects", "clear_sound_effects", &[]),
    template("sound_changevolumeby", "change_volume", &[Arg::Num("VOLUME")]),
    template("sound_setvolumeto", "set_volume", &[Arg::Num("VOLUME")]),
    template("event_broadcast", "broadcast", &[Arg::Text("BROADCAST_INPUT")]),
    template("event_broadcastandwait", "broadcast_and_wait", &[Arg::Text("BROADCAST_INPUT")]),
    template("motion_movesteps", "move", &[Arg::Num("STEPS")]),
    template("motion_gotoxy", "goto", &[Arg::Num("X"), Arg::Num("Y")]),
    template("motion_turnright", "turn_right", &[Arg::Num("DEGREES")]),
    template("motion_turnleft", "turn_left", &[Arg::Num("DEGREES")]),
    template("motion_pointindirection", "point_in_direction", &[Arg::Num("DIRECTION")]),
    template("motion_glidesecstoxy", "glide", &[Arg::Num("X"), Arg::Num("Y"), Arg::Num("SECS")]),
    template("motion_ifonedgebounce", "if_on_edge_bounce", &[]),
    template("motion_changexby", "change_x", &[Arg::Num("DX")]),
    template("motion_setx", "set_x", &[Arg::Num("X")]),
    template("motion_changeyby", "change_y", &[Arg::Num("DY")]),
    template("motion_sety", "set_y", &[Arg::Num("Y")]),
    template("control_wait", "wait", &[Arg::Num("DURATION")]),
    template("control_create_clone_of", "clone", &[Arg::Text("CLONE_OPTION")]),
    template("control_incr_counter", "control_counter++", &[]),
    template("control_clear_counter", "control_counter = 0", &[]),
    template("sensing_askandwait", "ask", &[Arg::Text("QUESTION")]),
    template("sensing_resettimer", "reset_timer", &[]),
    template("pen_clear", "erase_all", &[]),
    template("pen_stamp", "stamp", &[]),
    template("pen_penDown", "pen_down", &[]),
    template("pen_penUp", "pen_up", &[]),
    template("pen_setPenColorToColor", "set_pen_color", &[Arg::Text("COLOR")]),
    template("pen_changePenSizeBy", "change_pen_size", &[Arg::Num("SIZE")]),
    template("pen_setPenSizeTo", "set_pen_size", &[Arg::Num("SIZE")]),
];

const REPORTERS: &[Template] = &[
    template("motion_xposition", "x_position", &[]),
    template("motion_yposition", "y_position", &[]),
    template("motion_direction", "direction", &[]),
    template("looks_size", "size", &[]),
    template("sound_volume", "volume", &[]),
    template("sensing_answer", "answer", &[]),
    template("sensing_mousedown", "mouse_down", &[]),
    template("sensing_mousex", "mouse_x", &[]),
    template("sensing_mousey", "mouse_y", &[]),
    template("sensing_loudness", "loudness", &[]),
    template("sensing_timer", "timer", &[]),
    template("sensing_dayssince2000", "days_since_2000", &[]),
    template("sensing_username", "username", &[]),
    template("sensing_keypressed", "key_pressed", &[Arg::Text("KEY_OPTION")]),
    template("sensing_touchingcolor", "touching_color", &[Arg::Text("COLOR")]),
    template(
        "sensing_coloristouchingcolor",
        "color_is_touching_color",
        &[Arg::Text("COLOR"), Arg::Text("COLOR2")],
    ),
    template("operator_round", "round", &[Arg::Num("NUM")]),
    template("operator_length", "length", &[Arg::Text("STRING")]),
    template("operator_contains", "contains", &[Arg::Text("STRING1"), Arg::Text("STRING2")]),
    template("operator_random", "random", &[Arg::Text("FROM"), Arg::Text("TO")]),
];

/// Shadow menu blocks, rendered as their field's literal.
const MENUS: &[(&str, &str)] = &[
    ("looks_costume", "COSTUME"),
    ("looks_backdrops", "BACKDROP"),
    ("sound_sounds_menu", "SOUND_MENU"),
    ("event_broadcast_menu", "BROADCAST_OPTION"),
    ("motion_goto_menu", "TO"),
    ("motion_glideto_menu", "TO"),
    ("motion_pointtowards_menu", "TOWARDS"),
    ("control_create_clone_of_menu", "CLONE_OPTION"),
    ("sensing_touchingobjectmenu", "TOUCHINGOBJECTMENU"),
    ("sensing_distancetomenu", "DISTANCETOMENU"),
    ("sensing_keyoptions", "KEY_OPTION"),
    ("sensing_of_object_menu", "OBJECT"),
];

const BINARY_OPERATORS: &[BinaryOperator] = &[
    binary("operator_add", "+", true),
    binary("operator_subtract", "-", true),
    binary("operator_multiply", "*", true),
    binary("operator_divide", "/", true),
    binary("operator_mod", "%", true),
    binary("operator_lt", " < ", false),
    binary("operator_gt", " > ", false),
    binary("operator_equals", " == ", false),
    BinaryOperator {
        opcode: "operator_join",
        infix: " & ",
        numeric: false,
        left: "STRING1",
        right: "STRING2",
    },
];

const MATH_FUNCTIONS: &[(&str, &str)] = &[
    ("abs", "abs"),
    ("floor", "floor"),
    ("ceiling", "ceil"),
    ("sqrt", "sqrt"),
    ("sin", "sin"),
    ("cos", "cos"),
    ("tan", "tan"),
    ("asin", "asin"),
    ("acos", "acos"),
    ("atan", "atan"),
    ("ln", "ln"),
    ("log", "log"),
    ("e ^", "antiln"),
    ("10 ^", "antilog"),
];

/// Boolean arguments that TurboWarp answers itself.
const RUNTIME_ARGUMENTS: &[(&str, &str)] = &[
    ("is compiled?", "tw_is_compiled()"),
    ("is TurboWarp?", "tw_is_turbowarp()"),
    ("is forkphorus?", "tw_is_forkphorus()"),
];

const LOOKS_EFFECTS: &[&str] = &[
    "color",
    "fisheye",
    "whirl",
    "pixelate",
    "mosaic",
    "brightness",
    "ghost",
];

const PEN_COLOR_PARAMS: &[&str] = &["hue", "saturation", "brightness", "transparency"];
