//! Custom scalar codecs.
//!
//! A custom scalar rides on a primitive wire representation (string or
//! number token) and decodes into a canonical application-level literal.
//! Codecs are registered by tag (case-sensitive exact match) in a
//! `ScalarRegistry` built once at process start and shared read-only by
//! every decode/encode call.
//!
//! Round-trip law: `encode` must be the left inverse of `decode` for
//! every value `decode` can produce.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use ordered_float::OrderedFloat;
use regex::Regex;
use serde_json::Value;

/// Canonical literal a codec decodes into. Floats are ordered so the
/// whole tree stays `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarLit {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
}

impl ScalarLit {
    /// The literal's natural token form.
    pub fn to_token(&self) -> Value {
        match self {
            ScalarLit::Bool(b) => Value::from(*b),
            ScalarLit::Int(i) => Value::from(*i),
            ScalarLit::Float(f) => Value::from(f.0),
            ScalarLit::Str(s) => Value::from(s.clone()),
        }
    }
}

impl std::fmt::Display for ScalarLit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarLit::Bool(b) => write!(f, "{b}"),
            ScalarLit::Int(i) => write!(f, "{i}"),
            ScalarLit::Float(x) => write!(f, "{}", x.0),
            ScalarLit::Str(s) => write!(f, "{s}"),
        }
    }
}

/// A decoded custom scalar: the codec tag plus its canonical literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomValue {
    pub tag: String,
    pub value: ScalarLit,
}

impl std::fmt::Display for CustomValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.tag, self.value)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ScalarError {
    reason: String,
}

impl ScalarError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

pub type DecodeFn = fn(&Value) -> Result<ScalarLit, ScalarError>;
pub type EncodeFn = fn(&ScalarLit) -> Value;

/// Decode/encode pair for one scalar tag. Plain function pointers; no
/// state, so a registry is trivially shareable across threads.
#[derive(Clone, Copy)]
pub struct ScalarCodec {
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

impl std::fmt::Debug for ScalarCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScalarCodec")
    }
}

// ------------------------------ Registry ---------------------------------- //

#[derive(Debug, Default)]
pub struct ScalarRegistry {
    codecs: HashMap<String, ScalarCodec>,
}

impl ScalarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `URL` and `DateTime` preregistered.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register("URL", ScalarCodec { decode: decode_url, encode: encode_lit });
        reg.register("DateTime", ScalarCodec { decode: decode_datetime, encode: encode_lit });
        reg
    }

    /// Register a codec under `tag`. Registering the same tag twice is a
    /// programming error, fatal here rather than at decode time.
    pub fn register(&mut self, tag: &str, codec: ScalarCodec) {
        if self.codecs.insert(tag.to_string(), codec).is_some() {
            panic!("scalar codec tag `{tag}` registered twice");
        }
    }

    pub fn lookup(&self, tag: &str) -> Option<&ScalarCodec> {
        self.codecs.get(tag)
    }
}

/// Process-wide registry with the built-in codecs.
pub fn default_registry() -> &'static ScalarRegistry {
    static DEFAULT: Lazy<ScalarRegistry> = Lazy::new(ScalarRegistry::with_builtins);
    &DEFAULT
}

// Generic encode half: emit the canonical literal's natural token.
// Both builtins decode to a canonical form, so this closes the
// round-trip law without a per-codec inverse.
fn encode_lit(lit: &ScalarLit) -> Value {
    lit.to_token()
}

// ------------------------------ URL codec --------------------------------- //

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://|mailto:|tel:)\S+$").unwrap());

fn decode_url(token: &Value) -> Result<ScalarLit, ScalarError> {
    let raw = token
        .as_str()
        .ok_or_else(|| ScalarError::new("URL token must be a string"))?;
    let trimmed = raw.trim();
    if !URL_RE.is_match(trimmed) {
        return Err(ScalarError::new(format!("not a recognized URL: {trimmed:?}")));
    }
    Ok(ScalarLit::Str(trimmed.to_string()))
}

// ---------------------------- DateTime codec ------------------------------ //

// Canonical rendering is idempotent: parse(render(t)) == t.
fn render_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_datetime(token: &Value) -> Result<ScalarLit, ScalarError> {
    match token {
        Value::String(s) => {
            let dt = DateTime::parse_from_rfc3339(s.trim())
                .map_err(|e| ScalarError::new(format!("bad RFC 3339 timestamp: {e}")))?;
            Ok(ScalarLit::Str(render_utc(dt.with_timezone(&Utc))))
        }
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| ScalarError::new("epoch timestamp must be integral milliseconds"))?;
            let dt = Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| ScalarError::new(format!("epoch millis out of range: {millis}")))?;
            Ok(ScalarLit::Str(render_utc(dt)))
        }
        other => Err(ScalarError::new(format!(
            "DateTime token must be a string or number, got {}",
            crate::reader::token_kind(other)
        ))),
    }
}

// ------------------------------- Tests ------------------------------------ //
