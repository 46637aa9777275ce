//! Decoding of Scratch 3 block inputs.
//!
//! An input is stored as `[mode, primary?, shadow?]` where mode 1 means only a
//! shadow is present, 2 means only a manually inserted value is present and 3
//! means an inserted value obscures a shadow. Each position holds `null`, a
//! block id, or an inline primitive such as `[10, "hello"]`.

use crate::error::DecodeError;
use serde_json::{json, Value};

/// One side of an input: nothing, a nested block, or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Empty,
    Block(String),
    Literal(Primitive),
}

/// An inline primitive together with its raw encoding, so it can be written
/// back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub tag: TaggedPrimitive,
    raw: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaggedPrimitive {
    Number(Value),
    Color(Value),
    Text(Value),
    Broadcast { name: String, id: Option<String> },
    Variable { name: String, id: Option<String> },
    List { name: String, id: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotPair {
    pub primary: Slot,
    pub shadow: Slot,
}

impl Slot {
    fn decode(raw: &Value) -> Result<Self, DecodeError> {
        match raw {
            Value::Null => Ok(Slot::Empty),
            Value::String(id) => Ok(Slot::Block(id.clone())),
            Value::Array(_) => Ok(Slot::Literal(Primitive::decode(raw)?)),
            other => Err(DecodeError::MalformedSlot(other.clone())),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Slot::Empty => Value::Null,
            Slot::Block(id) => Value::String(id.clone()),
            Slot::Literal(primitive) => primitive.to_value(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn block_id(&self) -> Option<&str> {
        match self {
            Slot::Block(id) => Some(id),
            _ => None,
        }
    }
}

impl Primitive {
    pub fn decode(raw: &Value) -> Result<Self, DecodeError> {
        let tag = classify(raw)?;
        let raw = raw.as_array().cloned().unwrap_or_default();
        Ok(Self { tag, raw })
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.raw.clone())
    }

    /// The literal payload (second element), used when a primitive is shown
    /// rather than compiled.
    pub fn payload(&self) -> &Value {
        self.raw.get(1).unwrap_or(&Value::Null)
    }
}

/// Classify an inline primitive by its type code.
pub fn classify(raw: &Value) -> Result<TaggedPrimitive, DecodeError> {
    let arr = raw
        .as_array()
        .filter(|arr| arr.len() >= 2)
        .ok_or_else(|| DecodeError::MalformedPrimitive(raw.clone()))?;
    let code = arr[0]
        .as_u64()
        .ok_or_else(|| DecodeError::MalformedPrimitive(raw.clone()))?;
    let value = arr[1].clone();
    let named = |value: &Value| -> Result<(String, Option<String>), DecodeError> {
        let name = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(DecodeError::MalformedPrimitive(raw.clone())),
        };
        let id = arr.get(2).and_then(Value::as_str).map(ToString::to_string);
        Ok((name, id))
    };
    let tag = match code {
        4..=8 => TaggedPrimitive::Number(value),
        9 => TaggedPrimitive::Color(value),
        10 => TaggedPrimitive::Text(value),
        11 => {
            let (name, id) = named(&value)?;
            TaggedPrimitive::Broadcast { name, id }
        }
        12 => {
            let (name, id) = named(&value)?;
            TaggedPrimitive::Variable { name, id }
        }
        13 => {
            let (name, id) = named(&value)?;
            TaggedPrimitive::List { name, id }
        }
        _ => return Err(DecodeError::UnknownPrimitive(arr[0].clone())),
    };
    Ok(tag)
}

impl SlotPair {
    pub fn empty() -> Self {
        Self {
            primary: Slot::Empty,
            shadow: Slot::Empty,
        }
    }

    pub fn decode(raw: &Value) -> Result<Self, DecodeError> {
        let arr = raw
            .as_array()
            .filter(|arr| arr.len() >= 2)
            .ok_or_else(|| DecodeError::MalformedSlot(raw.clone()))?;
        let mode = arr[0]
            .as_u64()
            .ok_or_else(|| DecodeError::UnknownSlotMode(arr[0].clone()))?;
        match mode {
            1 => Ok(Self {
                primary: Slot::Empty,
                shadow: Slot::decode(&arr[1])?,
            }),
            2 => Ok(Self {
                primary: Slot::decode(&arr[1])?,
                shadow: Slot::Empty,
            }),
            3 => {
                let shadow = arr
                    .get(2)
                    .ok_or_else(|| DecodeError::MalformedSlot(raw.clone()))?;
                Ok(Self {
                    primary: Slot::decode(&arr[1])?,
                    shadow: Slot::decode(shadow)?,
                })
            }
            _ => Err(DecodeError::UnknownSlotMode(arr[0].clone())),
        }
    }

    pub fn to_value(&self) -> Value {
        if self.shadow.is_empty() {
            return json!([2, self.primary.to_value()]);
        }
        if self.primary.is_empty() {
            return json!([1, self.shadow.to_value()]);
        }
        json!([3, self.primary.to_value(), self.shadow.to_value()])
    }

    /// True if a block was dropped into the input by hand.
    pub fn has_inserted_block(&self) -> bool {
        matches!(self.primary, Slot::Block(_))
    }

    pub fn has_shadow_block(&self) -> bool {
        matches!(self.shadow, Slot::Block(_))
    }

    /// No value at all, not even a shadow: an empty boolean or stack socket.
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.shadow.is_empty()
    }

    pub fn visible_value(&self) -> Option<&Slot> {
        if !self.primary.is_empty() {
            return Some(&self.primary);
        }
        if !self.shadow.is_empty() {
            return Some(&self.shadow);
        }
        None
    }

    /// Human readable rendering of the visible value, for diagnostics.
    pub fn preview(&self) -> String {
        match self.visible_value() {
            None => String::new(),
            Some(Slot::Block(id)) => format!("<block {}>", id),
            Some(Slot::Literal(primitive)) => match primitive.payload() {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            Some(Slot::Empty) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_mode_and_encodes_back() {
        for raw in [
            json!([2, "b1"]),
            json!([1, [10, "text"]]),
            json!([1, "shadow_block"]),
            json!([3, "b1", [4, "10"]]),
            json!([3, "b1", "b2"]),
            json!([2, [11, "go", "bc1"]]),
        ] {
            let pair = SlotPair::decode(&raw).unwrap();
            assert_eq!(pair.to_value(), raw);
        }
    }

    #[test]
    fn primary_only_input() {
        let pair = SlotPair::decode(&json!([2, "b1"])).unwrap();
        assert_eq!(pair.primary, Slot::Block("b1".to_string()));
        assert!(pair.shadow.is_empty());
        assert!(pair.has_inserted_block());
        assert!(!pair.has_shadow_block());
    }

    #[test]
    fn obscured_shadow_prefers_primary() {
        let pair = SlotPair::decode(&json!([3, "b1", [10, "fallback"]])).unwrap();
        assert_eq!(pair.visible_value(), Some(&Slot::Block("b1".to_string())));
        assert_eq!(pair.preview(), "<block b1>");
    }

    #[test]
    fn empty_socket() {
        let pair = SlotPair::decode(&json!([2, null])).unwrap();
        assert!(pair.is_empty());
        assert_eq!(pair.visible_value(), None);
        assert!(SlotPair::empty().is_empty());
    }

    #[test]
    fn shadow_literal_preview() {
        let pair = SlotPair::decode(&json!([1, [4, 12]])).unwrap();
        assert!(!pair.has_inserted_block());
        assert_eq!(pair.preview(), "12");
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = SlotPair::decode(&json!([7, "b1"])).unwrap_err();
        assert_eq!(err, DecodeError::UnknownSlotMode(json!(7)));
        assert!(SlotPair::decode(&json!("b1")).is_err());
        assert!(SlotPair::decode(&json!([3, "b1"])).is_err());
    }

    #[test]
    fn classifies_primitive_codes() {
        for code in 4..=8 {
            assert_eq!(
                classify(&json!([code, "1"])).unwrap(),
                TaggedPrimitive::Number(json!("1"))
            );
        }
        assert_eq!(
            classify(&json!([9, "#ff0000"])).unwrap(),
            TaggedPrimitive::Color(json!("#ff0000"))
        );
        assert_eq!(
            classify(&json!([10, "hi"])).unwrap(),
            TaggedPrimitive::Text(json!("hi"))
        );
        assert_eq!(
            classify(&json!([11, "start", "id1"])).unwrap(),
            TaggedPrimitive::Broadcast {
                name: "start".to_string(),
                id: Some("id1".to_string())
            }
        );
        assert_eq!(
            classify(&json!([12, "score", "v1", 10, 20])).unwrap(),
            TaggedPrimitive::Variable {
                name: "score".to_string(),
                id: Some("v1".to_string())
            }
        );
        assert_eq!(
            classify(&json!([13, "items", "l1"])).unwrap(),
            TaggedPrimitive::List {
                name: "items".to_string(),
                id: Some("l1".to_string())
            }
        );
    }

    #[test]
    fn rejects_unknown_primitive() {
        assert_eq!(
            classify(&json!([3, "x"])).unwrap_err(),
            DecodeError::UnknownPrimitive(json!(3))
        );
        assert!(classify(&json!([10])).is_err());
        assert!(SlotPair::decode(&json!([1, [99, "x"]])).is_err());
    }
}
