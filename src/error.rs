use serde_json::Value;
use thiserror::Error;

/// Raised when a block input or inline primitive does not follow the
/// Scratch 3 encoding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unknown input mode {0}")]
    UnknownSlotMode(Value),

    #[error("malformed input encoding {0}")]
    MalformedSlot(Value),

    #[error("unknown primitive type {0}")]
    UnknownPrimitive(Value),

    #[error("malformed primitive {0}")]
    MalformedPrimitive(Value),
}

/// Errors that abort generation of a script.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("block '{block}' has an undecodable input: {source}")]
    Decode {
        block: String,
        #[source]
        source: DecodeError,
    },

    #[error("reference to missing block '{0}'")]
    MissingBlock(String),

    #[error("block '{block}' has a missing or malformed procedure mutation: {message}")]
    Mutation { block: String, message: String },

    #[error("script exceeds the maximum block depth of {limit} at block '{block}'")]
    DepthExceeded { block: String, limit: usize },
}

impl GenerateError {
    pub fn decode(block: &str, source: DecodeError) -> Self {
        Self::Decode {
            block: block.to_string(),
            source,
        }
    }

    pub fn mutation(block: &str, message: impl Into<String>) -> Self {
        Self::Mutation {
            block: block.to_string(),
            message: message.into(),
        }
    }
}
