// Static field-selection metadata. No serde_json::Value here.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Type conditions restricting when a field applies.
/// Empty set ⇒ unconditional.
pub type TypeConditions = BTreeSet<String>;

/// Value shape selected by one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Str,
    Bool,
    Int,                     // integral tokens only
    Float,                   // integral tokens widen
    Custom(String),          // codec tag, case-sensitive
    Object,
    List {
        item: Box<FieldKind>,
        #[serde(default)]
        item_nullable: bool,
    },
}

impl FieldKind {
    /// True if decoding this kind eventually reaches a nested object
    /// (and therefore needs a bound child mapper).
    pub fn bears_object(&self) -> bool {
        match self {
            FieldKind::Object => true,
            FieldKind::List { item, .. } => item.bears_object(),
            _ => false,
        }
    }

    /// Short name used in mismatch diagnostics.
    pub fn expected_token(&self) -> &'static str {
        match self {
            FieldKind::Str => "string",
            FieldKind::Bool => "boolean",
            FieldKind::Int => "integer",
            FieldKind::Float => "number",
            FieldKind::Custom(_) => "scalar",
            FieldKind::Object => "object",
            FieldKind::List { .. } => "list",
        }
    }
}

/// One selected field: wire name, response alias, shape, nullability,
/// and the type conditions gating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub wire_name: String,

    /// Key under which the value appears in the response object.
    /// Empty in a serialized form means "same as `wire_name`";
    /// table construction normalizes it.
    #[serde(default)]
    pub alias: String,

    pub kind: FieldKind,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conditions: TypeConditions,
}

impl FieldDescriptor {
    fn new(wire_name: &str, kind: FieldKind) -> Self {
        Self {
            wire_name: wire_name.to_string(),
            alias: wire_name.to_string(),
            kind,
            nullable: false,
            conditions: TypeConditions::new(),
        }
    }

    /// The discriminator field carrying the node's concrete type name.
    pub fn typename() -> Self {
        Self::new("__typename", FieldKind::Str)
    }

    pub fn string(wire_name: &str) -> Self {
        Self::new(wire_name, FieldKind::Str)
    }

    pub fn boolean(wire_name: &str) -> Self {
        Self::new(wire_name, FieldKind::Bool)
    }

    pub fn int(wire_name: &str) -> Self {
        Self::new(wire_name, FieldKind::Int)
    }

    pub fn float(wire_name: &str) -> Self {
        Self::new(wire_name, FieldKind::Float)
    }

    pub fn custom(wire_name: &str, tag: &str) -> Self {
        Self::new(wire_name, FieldKind::Custom(tag.to_string()))
    }

    pub fn object(wire_name: &str) -> Self {
        Self::new(wire_name, FieldKind::Object)
    }

    pub fn list(wire_name: &str, item: FieldKind) -> Self {
        Self::new(wire_name, FieldKind::List { item: Box::new(item), item_nullable: false })
    }

    pub fn aliased(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Null tokens allowed inside the list. Only meaningful on `List` kinds.
    pub fn nullable_items(mut self) -> Self {
        if let FieldKind::List { item_nullable, .. } = &mut self.kind {
            *item_nullable = true;
        }
        self
    }

    /// Restrict the field to nodes whose discriminator matches `type_name`.
    /// May be chained; any match admits the field.
    pub fn when(mut self, type_name: &str) -> Self {
        self.conditions.insert(type_name.to_string());
        self
    }

    /// Whether the field applies to a node of the given concrete type.
    pub fn applies_to(&self, type_name: &str) -> bool {
        self.conditions.is_empty() || self.conditions.contains(type_name)
    }
}

// ------------------------------ Table ------------------------------------ //

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("field table is empty")]
    Empty,
    #[error("duplicate response alias `{0}`")]
    DuplicateAlias(String),
    #[error("first field `{0}` must be a non-nullable, unconditional string discriminator")]
    BadDiscriminator(String),
}

/// Immutable, ordered field selection for one type. Built once, shared
/// read-only by every decode/encode call afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldDescriptor>", into = "Vec<FieldDescriptor>")]
pub struct FieldTable {
    fields: Vec<FieldDescriptor>,
    index: IndexMap<String, usize>, // alias → position
}

impl FieldTable {
    /// Validating constructor. The first field must be the discriminator;
    /// aliases must be unique within the table. An empty serialized alias
    /// is normalized to the wire name before checking.
    pub fn try_new(mut fields: Vec<FieldDescriptor>) -> Result<Self, TableError> {
        if fields.is_empty() {
            return Err(TableError::Empty);
        }
        for f in &mut fields {
            if f.alias.is_empty() {
                f.alias = f.wire_name.clone();
            }
        }
        {
            let head = &fields[0];
            let ok = matches!(head.kind, FieldKind::Str)
                && !head.nullable
                && head.conditions.is_empty();
            if !ok {
                return Err(TableError::BadDiscriminator(head.alias.clone()));
            }
        }
        let mut index = IndexMap::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            if index.insert(f.alias.clone(), i).is_some() {
                return Err(TableError::DuplicateAlias(f.alias.clone()));
            }
        }
        Ok(Self { fields, index })
    }

    /// Panicking constructor for statically-known tables. A duplicate
    /// alias or a bad discriminator is a programming error, fatal at
    /// construction rather than at decode time.
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        match Self::try_new(fields) {
            Ok(t) => t,
            Err(e) => panic!("invalid field table: {e}"),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, i: usize) -> &FieldDescriptor {
        &self.fields[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn discriminator(&self) -> &FieldDescriptor {
        &self.fields[0]
    }

    /// Position of a field by response alias.
    pub fn position(&self, alias: &str) -> Option<usize> {
        self.index.get(alias).copied()
    }

    /// Resolve by alias first, wire name second. Wire names need not be
    /// unique (two aliases may select the same wire field), so the wire
    /// fallback returns the first match in table order.
    pub fn lookup(&self, name_or_alias: &str) -> Option<&FieldDescriptor> {
        if let Some(&i) = self.index.get(name_or_alias) {
            return Some(&self.fields[i]);
        }
        self.fields.iter().find(|f| f.wire_name == name_or_alias)
    }
}

impl TryFrom<Vec<FieldDescriptor>> for FieldTable {
    type Error = TableError;

    fn try_from(fields: Vec<FieldDescriptor>) -> Result<Self, TableError> {
        Self::try_new(fields)
    }
}

impl From<FieldTable> for Vec<FieldDescriptor> {
    fn from(table: FieldTable) -> Self {
        table.fields
    }
}

// ------------------------------- Tests ------------------------------------ //
