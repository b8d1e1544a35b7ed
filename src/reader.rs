//! Pull-based decode engine.
//!
//! A `Reader` is a cursor over a single token-model object. Driven by a
//! field descriptor, it resolves one slot at a time: absent-vs-null
//! first, then the kind-directed coercion. Fields are found by response
//! alias (wire name as fallback), never by position, so token-source
//! field order is irrelevant.
//!
//! Design goals:
//! - Decode is all-or-nothing: the first error wins, nothing partial
//!   escapes.
//! - Unknown extra fields in the token source are ignored.
//! - An empty token list decodes to an empty typed list, never Absent.

use serde_json::{Map, Value};

use crate::field::{FieldDescriptor, FieldKind};
use crate::mapper::Mapper;
use crate::scalar::{CustomValue, ScalarRegistry};
use crate::value::{Slot, TypedList, TypedValue};

/// Token kind name for diagnostics.
pub fn token_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

// ------------------------------- Errors ----------------------------------- //

/// Decode failures. The first one encountered during the depth-first
/// field walk is surfaced; siblings are not aggregated.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing required field `{alias}`")]
    MissingField { alias: String },

    #[error("field `{alias}` is not nullable but the token source holds null")]
    NullFieldViolation { alias: String },

    #[error("field `{alias}` expected {expected}, got {found}")]
    TypeMismatch {
        alias: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("no scalar codec registered for tag `{tag}`")]
    UnknownScalarTag { tag: String },

    #[error("custom scalar field `{alias}` (tag `{tag}`) rejected its token: {reason}")]
    ScalarDecode {
        alias: String,
        tag: String,
        reason: String,
    },
}

impl DecodeError {
    fn mismatch(field: &FieldDescriptor, expected: &'static str, token: &Value) -> Self {
        DecodeError::TypeMismatch {
            alias: field.alias.clone(),
            expected,
            found: token_kind(token),
        }
    }
}

// ------------------------------- Reader ----------------------------------- //

enum Staged<'a> {
    Absent,
    Null,
    Token(&'a Value),
}

/// Cursor over one token object. Cheap to construct; nested objects get
/// their own scoped `Reader`.
pub struct Reader<'a> {
    obj: &'a Map<String, Value>,
    registry: &'a ScalarRegistry,
}

impl<'a> Reader<'a> {
    pub fn new(obj: &'a Map<String, Value>, registry: &'a ScalarRegistry) -> Self {
        Self { obj, registry }
    }

    pub fn registry(&self) -> &'a ScalarRegistry {
        self.registry
    }

    fn fetch(&self, field: &FieldDescriptor) -> Option<&'a Value> {
        self.obj
            .get(&field.alias)
            .or_else(|| self.obj.get(&field.wire_name))
    }

    /// Resolve the tri-state before any kind checking.
    fn stage(&self, field: &FieldDescriptor) -> Result<Staged<'a>, DecodeError> {
        match self.fetch(field) {
            None if field.nullable => Ok(Staged::Absent),
            None => Err(DecodeError::MissingField { alias: field.alias.clone() }),
            Some(Value::Null) if field.nullable => Ok(Staged::Null),
            Some(Value::Null) => Err(DecodeError::NullFieldViolation { alias: field.alias.clone() }),
            Some(v) => Ok(Staged::Token(v)),
        }
    }

    /// Read the discriminator: always present, always a string.
    pub fn typename(&self, field: &FieldDescriptor) -> Result<String, DecodeError> {
        match self.fetch(field) {
            None => Err(DecodeError::MissingField { alias: field.alias.clone() }),
            Some(Value::Null) => Err(DecodeError::NullFieldViolation { alias: field.alias.clone() }),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(DecodeError::mismatch(field, "string", other)),
        }
    }

    /// Primitive scalar field (`Str`/`Bool`/`Int`/`Float`).
    pub fn read_scalar(&self, field: &FieldDescriptor) -> Result<Slot, DecodeError> {
        match self.stage(field)? {
            Staged::Absent => Ok(Slot::Absent),
            Staged::Null => Ok(Slot::Null),
            Staged::Token(v) => Ok(Slot::Present(scalar_token(field, &field.kind, v)?)),
        }
    }

    /// Custom scalar field, decoded through the registry codec matching
    /// the descriptor's tag.
    pub fn read_custom(&self, field: &FieldDescriptor) -> Result<Slot, DecodeError> {
        match self.stage(field)? {
            Staged::Absent => Ok(Slot::Absent),
            Staged::Null => Ok(Slot::Null),
            Staged::Token(v) => Ok(Slot::Present(self.custom_token(field, &field.kind, v)?)),
        }
    }

    /// Nested object field: delegates to the child mapper with a new
    /// `Reader` scoped to the nested token object.
    pub fn read_object(&self, field: &FieldDescriptor, child: &Mapper) -> Result<Slot, DecodeError> {
        match self.stage(field)? {
            Staged::Absent => Ok(Slot::Absent),
            Staged::Null => Ok(Slot::Null),
            Staged::Token(Value::Object(m)) => {
                let sub = Reader::new(m, self.registry);
                Ok(Slot::Present(TypedValue::Node(child.map(&sub)?)))
            }
            Staged::Token(other) => Err(DecodeError::mismatch(field, "object", other)),
        }
    }

    /// List field: applies the item shape to each element in order.
    /// `child` carries the mapper for the innermost object shape, if any.
    pub fn read_list(&self, field: &FieldDescriptor, child: Option<&Mapper>) -> Result<Slot, DecodeError> {
        match self.stage(field)? {
            Staged::Absent => Ok(Slot::Absent),
            Staged::Null => Ok(Slot::Null),
            Staged::Token(v) => Ok(Slot::Present(self.list_token(field, &field.kind, v, child)?)),
        }
    }

    // ---- kind-directed token coercion ----

    fn custom_token(
        &self,
        field: &FieldDescriptor,
        kind: &FieldKind,
        token: &Value,
    ) -> Result<TypedValue, DecodeError> {
        let FieldKind::Custom(tag) = kind else {
            unreachable!("custom_token on non-custom field `{}`", field.alias);
        };
        let codec = self
            .registry
            .lookup(tag)
            .ok_or_else(|| DecodeError::UnknownScalarTag { tag: tag.clone() })?;
        let lit = (codec.decode)(token).map_err(|e| DecodeError::ScalarDecode {
            alias: field.alias.clone(),
            tag: tag.clone(),
            reason: e.to_string(),
        })?;
        Ok(TypedValue::Custom(CustomValue { tag: tag.clone(), value: lit }))
    }

    fn list_token(
        &self,
        field: &FieldDescriptor,
        kind: &FieldKind,
        token: &Value,
        child: Option<&Mapper>,
    ) -> Result<TypedValue, DecodeError> {
        let FieldKind::List { item, item_nullable } = kind else {
            unreachable!("list_token on non-list field `{}`", field.alias);
        };
        let Value::Array(items) = token else {
            return Err(DecodeError::mismatch(field, "list", token));
        };
        let mut out = Vec::with_capacity(items.len());
        for v in items {
            if v.is_null() {
                if !item_nullable {
                    return Err(DecodeError::NullFieldViolation { alias: field.alias.clone() });
                }
                out.push(Slot::Null);
                continue;
            }
            out.push(Slot::Present(self.item_token(field, item, v, child)?));
        }
        Ok(TypedValue::List(TypedList(out)))
    }

    fn item_token(
        &self,
        field: &FieldDescriptor,
        kind: &FieldKind,
        token: &Value,
        child: Option<&Mapper>,
    ) -> Result<TypedValue, DecodeError> {
        match kind {
            FieldKind::Str | FieldKind::Bool | FieldKind::Int | FieldKind::Float => {
                scalar_token(field, kind, token)
            }
            FieldKind::Custom(_) => self.custom_token(field, kind, token),
            FieldKind::Object => match token {
                Value::Object(m) => {
                    let Some(mapper) = child else {
                        panic!("no child mapper bound for list field `{}`", field.alias);
                    };
                    let sub = Reader::new(m, self.registry);
                    Ok(TypedValue::Node(mapper.map(&sub)?))
                }
                other => Err(DecodeError::mismatch(field, "object", other)),
            },
            FieldKind::List { .. } => self.list_token(field, kind, token, child),
        }
    }
}

fn scalar_token(
    field: &FieldDescriptor,
    kind: &FieldKind,
    token: &Value,
) -> Result<TypedValue, DecodeError> {
    match kind {
        FieldKind::Str => match token {
            Value::String(s) => Ok(TypedValue::Str(s.clone())),
            other => Err(DecodeError::mismatch(field, "string", other)),
        },
        FieldKind::Bool => match token {
            Value::Bool(b) => Ok(TypedValue::Bool(*b)),
            other => Err(DecodeError::mismatch(field, "boolean", other)),
        },
        FieldKind::Int => match token.as_i64() {
            Some(i) => Ok(TypedValue::Int(i)),
            None => Err(DecodeError::mismatch(field, "integer", token)),
        },
        FieldKind::Float => match token.as_f64() {
            // integral tokens widen to float
            Some(f) => Ok(TypedValue::Float(f.into())),
            None => Err(DecodeError::mismatch(field, "number", token)),
        },
        _ => unreachable!("scalar_token on non-scalar field `{}`", field.alias),
    }
}

// ------------------------------- Tests ------------------------------------ //
