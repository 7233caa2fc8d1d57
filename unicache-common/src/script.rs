//! # Script Descriptor
//!
//! A Lua script plus what the caller expects back. The SHA1 handed out by
//! `SCRIPT LOAD` is remembered on the descriptor so later calls can try
//! `EVALSHA` first; drivers still treat a `NOSCRIPT` reply as normal because
//! the server-side cache does not survive restarts or `SCRIPT FLUSH`.

use std::sync::OnceLock;

/// Declared shape of a script's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// Integer 1 is true; 0 and Lua `false` (nil) are false.
    Boolean,
    /// Plain integer reply.
    Integer,
    /// Status reply such as `OK`.
    Status,
    /// A single bulk reply decoded with the value codec.
    Value,
    /// An array of bulk replies, each decoded with the value codec.
    MultiValue,
}

/// Lua script source with its declared result type and cached digest.
#[derive(Debug, Clone)]
pub struct Script {
    source: String,
    return_type: ReturnType,
    sha: OnceLock<String>,
}

impl Script {
    pub fn new(source: impl Into<String>, return_type: ReturnType) -> Self {
        Script {
            source: source.into(),
            return_type,
            sha: OnceLock::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    /// Digest returned by a previous `SCRIPT LOAD`, if any.
    pub fn cached_sha(&self) -> Option<&str> {
        self.sha.get().map(String::as_str)
    }

    /// Records the digest returned by `SCRIPT LOAD`. First writer wins; the
    /// digest of a given source never changes.
    pub fn remember_sha(&self, sha: impl Into<String>) {
        let _ = self.sha.set(sha.into());
    }
}

/// Decoded script reply, shaped by the declared `ReturnType`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue<V> {
    Nil,
    Boolean(bool),
    Integer(i64),
    Status(String),
    Value(V),
    Values(Vec<Option<V>>),
}

impl<V> ScriptValue<V> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Boolean(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            ScriptValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_values(self) -> Option<Vec<Option<V>>> {
        match self {
            ScriptValue::Values(values) => Some(values),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sha_wins() {
        let script = Script::new("return 1", ReturnType::Integer);
        assert!(script.cached_sha().is_none());
        script.remember_sha("abc");
        script.remember_sha("def");
        assert_eq!(script.cached_sha(), Some("abc"));
    }

    #[test]
    fn accessors_match_variant() {
        let value: ScriptValue<String> = ScriptValue::Boolean(true);
        assert_eq!(value.as_bool(), Some(true));
        assert_eq!(value.as_integer(), None);
        assert_eq!(
            ScriptValue::Value("x".to_string()).into_value(),
            Some("x".to_string())
        );
    }
}
