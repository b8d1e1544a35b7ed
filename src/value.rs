//! The decoded value tree.
//!
//! A `TypedNode` is an immutable record shaped by one `FieldTable`: one
//! `Slot` per descriptor, in table order. Every field is explicitly
//! `Absent`, `Null`, or `Present(v)`, never an implicit null.
//!
//! Identity is structural: field-by-field equality, recursively, with
//! the three slot states distinct. The 64-bit hash and the display
//! string are memoized in write-once cells; the computation is a pure
//! function of already-immutable fields, so concurrent first reads are
//! benign.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use ordered_float::OrderedFloat;

use crate::field::{FieldKind, FieldTable};
use crate::scalar::CustomValue;

// ------------------------------- Slots ------------------------------------ //

/// Tri-state resolution of one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Not on the wire, or gated out by a type condition.
    Absent,
    /// Explicitly null on the wire.
    Null,
    Present(TypedValue),
}

impl Slot {
    pub fn is_absent(&self) -> bool {
        matches!(self, Slot::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Slot::Null)
    }

    pub fn value(&self) -> Option<&TypedValue> {
        match self {
            Slot::Present(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Absent => f.write_str("absent"),
            Slot::Null => f.write_str("null"),
            Slot::Present(v) => write!(f, "{v}"),
        }
    }
}

// ------------------------------- Values ----------------------------------- //

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypedValue {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Custom(CustomValue),
    Node(TypedNode),
    List(TypedList),
}

impl TypedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            TypedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            TypedValue::Float(f) => Some(f.0),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&TypedNode> {
        match self {
            TypedValue::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&TypedList> {
        match self {
            TypedValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomValue> {
        match self {
            TypedValue::Custom(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Bool(b) => write!(f, "{b}"),
            TypedValue::Int(i) => write!(f, "{i}"),
            TypedValue::Float(x) => write!(f, "{}", x.0),
            TypedValue::Str(s) => f.write_str(s),
            TypedValue::Custom(c) => write!(f, "{c}"),
            TypedValue::Node(n) => f.write_str(n.display_string()),
            TypedValue::List(l) => write!(f, "{l}"),
        }
    }
}

/// Ordered sequence of slots. Items are `Null` or `Present`; `Absent`
/// never occurs inside a list. An empty list is a value of its own,
/// distinct from an absent or null list field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypedList(pub Vec<Slot>);

impl TypedList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Slot> {
        self.0.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.0.iter()
    }
}

impl fmt::Display for TypedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, slot) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{slot}")?;
        }
        f.write_str("]")
    }
}

// ------------------------------- Nodes ------------------------------------ //

/// Immutable table-shaped record. Produced by `Mapper::map` or a
/// `NodeBuilder`; never mutated afterwards except the two write-once
/// caches below.
#[derive(Debug, Clone)]
pub struct TypedNode {
    table: Arc<FieldTable>,
    slots: Vec<Slot>,
    hash_cell: OnceCell<u64>,
    display_cell: OnceCell<String>,
}

impl TypedNode {
    pub(crate) fn from_slots(table: Arc<FieldTable>, slots: Vec<Slot>) -> Self {
        debug_assert_eq!(table.len(), slots.len());
        Self { table, slots, hash_cell: OnceCell::new(), display_cell: OnceCell::new() }
    }

    pub fn table(&self) -> &Arc<FieldTable> {
        &self.table
    }

    /// The discriminator value this node decoded with.
    pub fn type_name(&self) -> &str {
        match &self.slots[0] {
            Slot::Present(TypedValue::Str(s)) => s,
            // construction guarantees a present string discriminator
            _ => unreachable!("discriminator slot is always a present string"),
        }
    }

    pub fn slot(&self, i: usize) -> &Slot {
        &self.slots[i]
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn get(&self, alias: &str) -> Option<&Slot> {
        self.table.position(alias).map(|i| &self.slots[i])
    }

    /// Memoized structural hash. Folds per-slot hashes with the same
    /// `1000003` multiplier scheme the wire format's reference models
    /// use, so equal nodes hash equal and the value is stable for the
    /// node's lifetime.
    pub fn structural_hash(&self) -> u64 {
        *self.hash_cell.get_or_init(|| {
            let mut h: u64 = 1;
            for slot in &self.slots {
                h = h.wrapping_mul(1_000_003);
                h ^= hash_one(slot);
            }
            h
        })
    }

    /// Memoized display rendering, `TypeName{alias=value, ...}`.
    pub fn display_string(&self) -> &str {
        self.display_cell.get_or_init(|| {
            let mut out = String::new();
            out.push_str(self.type_name());
            out.push('{');
            for (i, field) in self.table.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&field.alias);
                out.push('=');
                out.push_str(&self.slots[i].to_string());
            }
            out.push('}');
            out
        })
    }
}

fn hash_one(slot: &Slot) -> u64 {
    let mut h = DefaultHasher::new();
    slot.hash(&mut h);
    h.finish()
}

impl PartialEq for TypedNode {
    fn eq(&self, other: &Self) -> bool {
        if !Arc::ptr_eq(&self.table, &other.table) {
            let same_shape = self.table.len() == other.table.len()
                && self
                    .table
                    .iter()
                    .zip(other.table.iter())
                    .all(|(a, b)| a.alias == b.alias);
            if !same_shape {
                return false;
            }
        }
        self.slots == other.slots
    }
}

impl Eq for TypedNode {}

impl Hash for TypedNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl fmt::Display for TypedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_string())
    }
}

// ------------------------------ Builder ----------------------------------- //

/// Checked hand-construction of a `TypedNode`, for callers assembling
/// values to encode. Misuse (unknown alias, kind mismatch, a missing
/// required field) is a programming error and panics at construction,
/// mirroring the field-table policy: a node that finishes is
/// well-formed, and encode is total over it.
pub struct NodeBuilder {
    table: Arc<FieldTable>,
    slots: Vec<Option<Slot>>,
}

impl NodeBuilder {
    pub fn new(table: Arc<FieldTable>) -> Self {
        let slots = vec![None; table.len()];
        Self { table, slots }
    }

    pub fn typename(self, name: &str) -> Self {
        let alias = self.table.discriminator().alias.clone();
        self.set(&alias, Slot::Present(TypedValue::Str(name.to_string())))
    }

    pub fn set(mut self, alias: &str, slot: Slot) -> Self {
        let Some(i) = self.table.position(alias) else {
            panic!("NodeBuilder: no field `{alias}` in table");
        };
        if let Slot::Present(v) = &slot {
            check_kind(alias, &self.table.get(i).kind, v);
        }
        self.slots[i] = Some(slot);
        self
    }

    /// Unset fields become `Absent`. Validates nullability and condition
    /// gating against the discriminator before sealing the node.
    pub fn finish(self) -> TypedNode {
        let type_name = match self.slots.first().and_then(|s| s.as_ref()) {
            Some(Slot::Present(TypedValue::Str(s))) => s.clone(),
            _ => panic!("NodeBuilder: discriminator must be set before finish"),
        };
        let mut slots = Vec::with_capacity(self.table.len());
        for (i, staged) in self.slots.into_iter().enumerate() {
            let field = self.table.get(i);
            let slot = staged.unwrap_or(Slot::Absent);
            if !field.applies_to(&type_name) {
                if !slot.is_absent() {
                    panic!(
                        "NodeBuilder: field `{}` does not apply to type `{type_name}`",
                        field.alias
                    );
                }
            } else if !field.nullable && !matches!(slot, Slot::Present(_)) {
                panic!("NodeBuilder: required field `{}` not set", field.alias);
            }
            slots.push(slot);
        }
        TypedNode::from_slots(self.table, slots)
    }
}

fn check_kind(alias: &str, kind: &FieldKind, value: &TypedValue) {
    let ok = match (kind, value) {
        (FieldKind::Str, TypedValue::Str(_)) => true,
        (FieldKind::Bool, TypedValue::Bool(_)) => true,
        (FieldKind::Int, TypedValue::Int(_)) => true,
        (FieldKind::Float, TypedValue::Float(f)) => {
            // non-finite floats have no token form
            if !f.0.is_finite() {
                panic!("NodeBuilder: field `{alias}` holds a non-finite float");
            }
            true
        }
        (FieldKind::Custom(tag), TypedValue::Custom(c)) => tag == &c.tag,
        (FieldKind::Object, TypedValue::Node(_)) => true,
        (FieldKind::List { item, item_nullable }, TypedValue::List(list)) => {
            for slot in list.iter() {
                match slot {
                    Slot::Absent => panic!("NodeBuilder: list `{alias}` contains an absent slot"),
                    Slot::Null if !item_nullable => {
                        panic!("NodeBuilder: list `{alias}` does not admit null items")
                    }
                    Slot::Null => {}
                    Slot::Present(v) => check_kind(alias, item, v),
                }
            }
            true
        }
        _ => false,
    };
    if !ok {
        panic!(
            "NodeBuilder: field `{alias}` expects {}, got incompatible value",
            kind.expected_token()
        );
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;

    fn character_table() -> Arc<FieldTable> {
        Arc::new(FieldTable::new(vec![
            FieldDescriptor::typename(),
            FieldDescriptor::string("name"),
            FieldDescriptor::float("height").nullable(),
            FieldDescriptor::list("aliases", FieldKind::Str).nullable(),
        ]))
    }

    fn luke(height: Slot) -> TypedNode {
        NodeBuilder::new(character_table())
            .typename("Human")
            .set("name", Slot::Present(TypedValue::Str("Luke Skywalker".into())))
            .set("height", height)
            .finish()
    }

    #[test]
    fn tri_states_are_distinct() {
        let absent = luke(Slot::Absent);
        let null = luke(Slot::Null);
        let present = luke(Slot::Present(TypedValue::Float(OrderedFloat(1.72))));
        assert_ne!(absent, null);
        assert_ne!(null, present);
        assert_ne!(absent, present);
    }

    #[test]
    fn equal_nodes_hash_equal() {
        let a = luke(Slot::Present(TypedValue::Float(OrderedFloat(1.72))));
        let b = luke(Slot::Present(TypedValue::Float(OrderedFloat(1.72))));
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());

        let c = luke(Slot::Null);
        assert_ne!(a, c);
    }

    #[test]
    fn hash_and_display_are_memoized() {
        let node = luke(Slot::Null);
        let h1 = node.structural_hash();
        let h2 = node.structural_hash();
        assert_eq!(h1, h2);

        let d1 = node.display_string() as *const str;
        let d2 = node.display_string() as *const str;
        assert_eq!(d1, d2, "second read must observe the same cached string");
        assert!(node.display_string().starts_with("Human{"));
    }

    #[test]
    fn empty_list_is_not_absent() {
        let empty = luke(Slot::Absent);
        let with_list = NodeBuilder::new(character_table())
            .typename("Human")
            .set("name", Slot::Present(TypedValue::Str("Luke Skywalker".into())))
            .set("aliases", Slot::Present(TypedValue::List(TypedList::default())))
            .finish();
        assert!(with_list.get("aliases").unwrap().value().unwrap().as_list().unwrap().is_empty());
        assert_ne!(empty, with_list);
    }

    #[test]
    fn lookup_by_alias() {
        let node = luke(Slot::Null);
        assert_eq!(node.type_name(), "Human");
        assert_eq!(
            node.get("name").unwrap().value().unwrap().as_str(),
            Some("Luke Skywalker")
        );
        assert!(node.get("unknown").is_none());
    }

    #[test]
    #[should_panic(expected = "required field `name` not set")]
    fn builder_enforces_required_fields() {
        NodeBuilder::new(character_table()).typename("Human").finish();
    }

    #[test]
    #[should_panic(expected = "expects string")]
    fn builder_enforces_kinds() {
        NodeBuilder::new(character_table())
            .typename("Human")
            .set("name", Slot::Present(TypedValue::Int(7)));
    }

    #[test]
    #[should_panic(expected = "does not apply")]
    fn builder_enforces_condition_gating() {
        let table = Arc::new(FieldTable::new(vec![
            FieldDescriptor::typename(),
            FieldDescriptor::string("primaryFunction").nullable().when("Droid"),
        ]));
        NodeBuilder::new(table)
            .typename("Human")
            .set("primaryFunction", Slot::Present(TypedValue::Str("protocol".into())))
            .finish();
    }
}
