//! Per-type decode/encode units.
//!
//! A `Mapper` owns one fragment (and therefore one field table) plus a
//! lazily-bound child mapper per nested object shape. `map` pulls every
//! descriptor in table order through a `Reader` and seals one immutable
//! `TypedNode`; `marshal` is the reverse. Composition is pure
//! delegation: a parent only ever calls a child's `map`/`marshal`, so
//! recursive fragment graphs (including self-reference) work by holding
//! `Arc` references, bound after construction.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::field::FieldKind;
use crate::fragment::Fragment;
use crate::reader::{token_kind, DecodeError, Reader};
use crate::scalar::{default_registry, ScalarRegistry};
use crate::value::{Slot, TypedNode, TypedValue};
use crate::writer::Writer;

pub struct Mapper {
    fragment: Fragment,
    // one slot per descriptor; only object-bearing positions are ever set
    children: Vec<OnceCell<Arc<Mapper>>>,
}

impl Mapper {
    pub fn new(fragment: Fragment) -> Self {
        let children = (0..fragment.table().len()).map(|_| OnceCell::new()).collect();
        Self { fragment, children }
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn table(&self) -> &Arc<crate::field::FieldTable> {
        self.fragment.table()
    }

    /// Bind the child mapper for an object-bearing field. Binding an
    /// unknown field, a field with no nested object shape, or the same
    /// field twice is a programming error, fatal at construction time.
    pub fn bind(&self, alias: &str, child: Arc<Mapper>) {
        let table = self.table();
        let Some(i) = table.position(alias) else {
            panic!("bind: no field `{alias}` in `{}`", self.fragment.name());
        };
        if !table.get(i).kind.bears_object() {
            panic!("bind: field `{alias}` of `{}` selects no object", self.fragment.name());
        }
        if self.children[i].set(child).is_err() {
            panic!("bind: field `{alias}` of `{}` already bound", self.fragment.name());
        }
    }

    /// First object-bearing field without a bound child, if any.
    pub fn unbound(&self) -> Option<&str> {
        self.table()
            .iter()
            .enumerate()
            .find(|(i, f)| f.kind.bears_object() && self.children[*i].get().is_none())
            .map(|(_, f)| f.alias.as_str())
    }

    fn child(&self, i: usize) -> Option<&Mapper> {
        self.children[i].get().map(Arc::as_ref)
    }

    fn child_required(&self, i: usize) -> &Mapper {
        match self.child(i) {
            Some(m) => m,
            None => panic!(
                "no child mapper bound for field `{}` of `{}`",
                self.table().get(i).alias,
                self.fragment.name()
            ),
        }
    }

    /// Decode one node. Pulls every descriptor in table order; fields
    /// gated out by their type conditions resolve to `Absent` without
    /// touching the token source. The first reader-level error
    /// propagates; nothing partial escapes.
    pub fn map(&self, reader: &Reader<'_>) -> Result<TypedNode, DecodeError> {
        let table = self.table();
        let type_name = reader.typename(table.discriminator())?;

        let mut slots = Vec::with_capacity(table.len());
        slots.push(Slot::Present(TypedValue::Str(type_name.clone())));
        for (i, field) in table.iter().enumerate().skip(1) {
            if !field.applies_to(&type_name) {
                slots.push(Slot::Absent);
                continue;
            }
            let slot = match &field.kind {
                FieldKind::Str | FieldKind::Bool | FieldKind::Int | FieldKind::Float => {
                    reader.read_scalar(field)?
                }
                FieldKind::Custom(_) => reader.read_custom(field)?,
                FieldKind::Object => reader.read_object(field, self.child_required(i))?,
                FieldKind::List { .. } => reader.read_list(field, self.list_child(i, &field.kind))?,
            };
            slots.push(slot);
        }
        Ok(TypedNode::from_slots(Arc::clone(table), slots))
    }

    /// Encode one node back to its token form. Total over well-formed
    /// nodes: every slot was kind-checked at construction.
    pub fn marshal(&self, node: &TypedNode, registry: &ScalarRegistry) -> Value {
        debug_assert_eq!(node.table().len(), self.table().len());
        let mut writer = Writer::new(registry);
        for (i, field) in self.table().iter().enumerate() {
            let child = if field.kind.bears_object() { self.child(i) } else { None };
            writer.write_slot(field, node.slot(i), child);
        }
        writer.finish()
    }

    fn list_child(&self, i: usize, kind: &FieldKind) -> Option<&Mapper> {
        if kind.bears_object() { Some(self.child_required(i)) } else { None }
    }
}

impl std::fmt::Debug for Mapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // children may point back at self; print names only
        f.debug_struct("Mapper")
            .field("fragment", &self.fragment.name())
            .field("fields", &self.table().len())
            .finish()
    }
}

// --------------------------- Entry points --------------------------------- //

/// Decode a token object into a typed node.
pub fn decode(token: &Value, mapper: &Mapper, registry: &ScalarRegistry) -> Result<TypedNode, DecodeError> {
    match token {
        Value::Object(m) => mapper.map(&Reader::new(m, registry)),
        other => Err(DecodeError::TypeMismatch {
            alias: mapper.fragment().name().to_string(),
            expected: "object",
            found: token_kind(other),
        }),
    }
}

/// Encode a typed node back into a token object.
pub fn encode(node: &TypedNode, mapper: &Mapper, registry: &ScalarRegistry) -> Value {
    mapper.marshal(node, registry)
}

/// `decode` against the process-wide registry.
pub fn decode_default(token: &Value, mapper: &Mapper) -> Result<TypedNode, DecodeError> {
    decode(token, mapper, default_registry())
}

/// `encode` against the process-wide registry.
pub fn encode_default(node: &TypedNode, mapper: &Mapper) -> Value {
    encode(node, mapper, default_registry())
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDescriptor, FieldTable};
    use serde_json::json;

    /// The character fragment graph used across these tests:
    /// Character → friendsConnection → edges → node (a Character again,
    /// but selected shallowly). `height` applies only to humans,
    /// `primaryFunction` only to droids.
    fn character_mapper() -> Arc<Mapper> {
        let node = Arc::new(Mapper::new(Fragment::new(
            "FriendNode",
            "",
            FieldTable::new(vec![
                FieldDescriptor::typename(),
                FieldDescriptor::string("name"),
            ]),
        )));
        let edge = Arc::new(Mapper::new(Fragment::new(
            "FriendsEdge",
            "",
            FieldTable::new(vec![
                FieldDescriptor::typename(),
                FieldDescriptor::object("node").nullable(),
            ]),
        )));
        edge.bind("node", Arc::clone(&node));

        let connection = Arc::new(Mapper::new(Fragment::new(
            "FriendsConnection",
            "",
            FieldTable::new(vec![
                FieldDescriptor::typename(),
                FieldDescriptor::int("totalCount").nullable(),
                FieldDescriptor::list("edges", FieldKind::Object).nullable(),
            ]),
        )));
        connection.bind("edges", edge);

        let character = Arc::new(Mapper::new(Fragment::new(
            "CharacterDetails",
            "fragment CharacterDetails on Character {\n  __typename\n  name\n  profileLink\n  friendsConnection { edges { node { name } } }\n}",
            FieldTable::new(vec![
                FieldDescriptor::typename(),
                FieldDescriptor::string("name"),
                FieldDescriptor::custom("profileLink", "URL"),
                FieldDescriptor::object("friendsConnection"),
                FieldDescriptor::float("height").nullable().when("Human"),
                FieldDescriptor::string("primaryFunction").when("Droid"),
            ]),
        )));
        character.bind("friendsConnection", connection);
        character
    }

    fn luke_token() -> Value {
        json!({
            "__typename": "Human",
            "name": "Luke Skywalker",
            "profileLink": "https://example.com/luke",
            "friendsConnection": {
                "__typename": "FriendsConnection",
                "edges": [
                    {
                        "__typename": "FriendsEdge",
                        "node": { "__typename": "Human", "name": "Han Solo" }
                    }
                ]
            }
        })
    }

    #[test]
    fn decodes_the_nested_scenario() {
        let mapper = character_mapper();
        let node = decode_default(&luke_token(), &mapper).unwrap();

        assert_eq!(node.type_name(), "Human");
        assert_eq!(node.get("name").unwrap().value().unwrap().as_str(), Some("Luke Skywalker"));

        let link = node.get("profileLink").unwrap().value().unwrap().as_custom().unwrap();
        assert_eq!(link.tag, "URL");
        assert_eq!(link.value.to_string(), "https://example.com/luke");

        let conn = node.get("friendsConnection").unwrap().value().unwrap().as_node().unwrap();
        assert!(conn.get("totalCount").unwrap().is_absent());
        let edges = conn.get("edges").unwrap().value().unwrap().as_list().unwrap();
        assert_eq!(edges.len(), 1);
        let friend = edges.get(0).unwrap().value().unwrap().as_node().unwrap()
            .get("node").unwrap().value().unwrap().as_node().unwrap();
        assert_eq!(friend.get("name").unwrap().value().unwrap().as_str(), Some("Han Solo"));
    }

    #[test]
    fn encode_reproduces_the_token_object() {
        let mapper = character_mapper();
        let node = decode_default(&luke_token(), &mapper).unwrap();
        let token = encode_default(&node, &mapper);
        // map equality: field values must match, order is unspecified
        assert_eq!(token, luke_token());
    }

    #[test]
    fn decode_encode_decode_round_trip() {
        let mapper = character_mapper();
        let v = decode_default(&luke_token(), &mapper).unwrap();
        let again = decode_default(&encode_default(&v, &mapper), &mapper).unwrap();
        assert_eq!(again, v);
        assert_eq!(again.structural_hash(), v.structural_hash());
    }

    #[test]
    fn token_field_order_does_not_matter() {
        let mapper = character_mapper();
        let permuted = json!({
            "friendsConnection": {
                "edges": [
                    {
                        "node": { "name": "Han Solo", "__typename": "Human" },
                        "__typename": "FriendsEdge"
                    }
                ],
                "__typename": "FriendsConnection"
            },
            "profileLink": "https://example.com/luke",
            "name": "Luke Skywalker",
            "__typename": "Human"
        });
        let a = decode_default(&luke_token(), &mapper).unwrap();
        let b = decode_default(&permuted, &mapper).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_required_field_fails_not_defaults() {
        let mapper = character_mapper();
        let mut token = luke_token();
        token.as_object_mut().unwrap().remove("name");
        assert_eq!(
            decode_default(&token, &mapper).unwrap_err(),
            DecodeError::MissingField { alias: "name".into() }
        );
    }

    #[test]
    fn condition_gated_field_is_absent_even_when_present_on_the_wire() {
        let mapper = character_mapper();
        let mut token = luke_token();
        token
            .as_object_mut()
            .unwrap()
            .insert("primaryFunction".into(), json!("smuggling?"));
        let node = decode_default(&token, &mapper).unwrap();
        // Droid-only field on a Human node: skipped, not null
        assert!(node.get("primaryFunction").unwrap().is_absent());
    }

    #[test]
    fn matching_condition_admits_the_field() {
        let mapper = character_mapper();
        let droid = json!({
            "__typename": "Droid",
            "name": "C-3PO",
            "profileLink": "https://example.com/3po",
            "friendsConnection": { "__typename": "FriendsConnection", "edges": [] },
            "primaryFunction": "protocol"
        });
        let node = decode_default(&droid, &mapper).unwrap();
        assert_eq!(
            node.get("primaryFunction").unwrap().value().unwrap().as_str(),
            Some("protocol")
        );
        // Human-only field gated out for a droid
        assert!(node.get("height").unwrap().is_absent());
        // and the gated shape survives a round trip
        let again = decode_default(&encode_default(&node, &mapper), &mapper).unwrap();
        assert_eq!(again, node);
    }

    #[test]
    fn empty_edges_list_is_distinct_from_absent() {
        let mapper = character_mapper();
        let with_empty = json!({
            "__typename": "Human",
            "name": "Rey",
            "profileLink": "https://example.com/rey",
            "friendsConnection": { "__typename": "FriendsConnection", "edges": [] }
        });
        let with_absent = json!({
            "__typename": "Human",
            "name": "Rey",
            "profileLink": "https://example.com/rey",
            "friendsConnection": { "__typename": "FriendsConnection" }
        });
        let a = decode_default(&with_empty, &mapper).unwrap();
        let b = decode_default(&with_absent, &mapper).unwrap();

        let conn_a = a.get("friendsConnection").unwrap().value().unwrap().as_node().unwrap();
        assert!(conn_a.get("edges").unwrap().value().unwrap().as_list().unwrap().is_empty());
        let conn_b = b.get("friendsConnection").unwrap().value().unwrap().as_node().unwrap();
        assert!(conn_b.get("edges").unwrap().is_absent());
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_extra_fields_are_ignored() {
        let mapper = character_mapper();
        let mut token = luke_token();
        token.as_object_mut().unwrap().insert("starship".into(), json!("X-wing"));
        let node = decode_default(&token, &mapper).unwrap();
        assert_eq!(node, decode_default(&luke_token(), &mapper).unwrap());
    }

    #[test]
    fn self_referential_mappers_compose_by_reference() {
        let friend = Arc::new(Mapper::new(Fragment::new(
            "Friend",
            "",
            FieldTable::new(vec![
                FieldDescriptor::typename(),
                FieldDescriptor::string("name"),
                FieldDescriptor::object("bestFriend").nullable(),
            ]),
        )));
        friend.bind("bestFriend", Arc::clone(&friend));

        let token = json!({
            "__typename": "Human",
            "name": "Luke Skywalker",
            "bestFriend": {
                "__typename": "Human",
                "name": "Han Solo",
                "bestFriend": { "__typename": "Wookiee", "name": "Chewbacca" }
            }
        });
        let node = decode_default(&token, &friend).unwrap();
        let inner = node.get("bestFriend").unwrap().value().unwrap().as_node().unwrap();
        let innermost = inner.get("bestFriend").unwrap().value().unwrap().as_node().unwrap();
        assert_eq!(innermost.type_name(), "Wookiee");
        assert!(innermost.get("bestFriend").unwrap().is_absent());

        assert_eq!(encode_default(&node, &friend), token);
    }

    #[test]
    fn hand_built_nodes_survive_the_round_trip() {
        use crate::scalar::{CustomValue, ScalarLit};
        use crate::value::{NodeBuilder, TypedList};

        let mapper = character_mapper();
        // same shape character_mapper binds under `friendsConnection`
        let connection_table = Arc::new(FieldTable::new(vec![
            FieldDescriptor::typename(),
            FieldDescriptor::int("totalCount").nullable(),
            FieldDescriptor::list("edges", FieldKind::Object).nullable(),
        ]));

        let connection = NodeBuilder::new(connection_table)
            .typename("FriendsConnection")
            .set("totalCount", Slot::Present(TypedValue::Int(0)))
            .set("edges", Slot::Present(TypedValue::List(TypedList::default())))
            .finish();
        let human = NodeBuilder::new(Arc::clone(mapper.table()))
            .typename("Human")
            .set("name", Slot::Present(TypedValue::Str("Leia Organa".into())))
            .set(
                "profileLink",
                Slot::Present(TypedValue::Custom(CustomValue {
                    tag: "URL".into(),
                    value: ScalarLit::Str("https://example.com/leia".into()),
                })),
            )
            .set("friendsConnection", Slot::Present(TypedValue::Node(connection)))
            .finish();

        let token = encode_default(&human, &mapper);
        let again = decode_default(&token, &mapper).unwrap();
        assert_eq!(again, human);
        assert_eq!(again.structural_hash(), human.structural_hash());
    }

    #[test]
    fn root_token_must_be_an_object() {
        let mapper = character_mapper();
        let err = decode_default(&json!([1, 2, 3]), &mapper).unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { expected: "object", .. }));
    }

    #[test]
    fn unbound_reports_missing_children() {
        let orphan = Mapper::new(Fragment::new(
            "Orphan",
            "",
            FieldTable::new(vec![
                FieldDescriptor::typename(),
                FieldDescriptor::object("child").nullable(),
            ]),
        ));
        assert_eq!(orphan.unbound(), Some("child"));
    }
}
