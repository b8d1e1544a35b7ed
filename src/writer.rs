//! Encode-direction mirror of the reader.
//!
//! A `Writer` builds one token object from a typed node's slots: absent
//! fields are omitted, null fields emit explicit null tokens, lists are
//! emitted with exact order and cardinality (including zero-length).
//! Encode has no failure mode over well-formed nodes.

use serde_json::{Map, Value};

use crate::field::{FieldDescriptor, FieldKind};
use crate::mapper::Mapper;
use crate::scalar::ScalarRegistry;
use crate::value::{Slot, TypedValue};

pub struct Writer<'a> {
    out: Map<String, Value>,
    registry: &'a ScalarRegistry,
}

impl<'a> Writer<'a> {
    pub fn new(registry: &'a ScalarRegistry) -> Self {
        Self { out: Map::new(), registry }
    }

    /// Emit one slot under the field's response alias. `child` carries
    /// the marshaller for nested object shapes, if the kind has one.
    pub fn write_slot(&mut self, field: &FieldDescriptor, slot: &Slot, child: Option<&Mapper>) {
        match slot {
            Slot::Absent => {}
            Slot::Null => {
                self.out.insert(field.alias.clone(), Value::Null);
            }
            Slot::Present(v) => {
                let token = self.token(field, &field.kind, v, child);
                self.out.insert(field.alias.clone(), token);
            }
        }
    }

    pub fn finish(self) -> Value {
        Value::Object(self.out)
    }

    fn token(
        &self,
        field: &FieldDescriptor,
        kind: &FieldKind,
        value: &TypedValue,
        child: Option<&Mapper>,
    ) -> Value {
        match (kind, value) {
            (FieldKind::Str, TypedValue::Str(s)) => Value::from(s.clone()),
            (FieldKind::Bool, TypedValue::Bool(b)) => Value::from(*b),
            (FieldKind::Int, TypedValue::Int(i)) => Value::from(*i),
            (FieldKind::Float, TypedValue::Float(f)) => Value::from(f.0),
            (FieldKind::Custom(tag), TypedValue::Custom(c)) => match self.registry.lookup(tag) {
                Some(codec) => (codec.encode)(&c.value),
                // a node built against a different registry still emits
                // its canonical literal
                None => c.value.to_token(),
            },
            (FieldKind::Object, TypedValue::Node(node)) => match child {
                Some(mapper) => mapper.marshal(node, self.registry),
                None => panic!("no child mapper bound for field `{}`", field.alias),
            },
            (FieldKind::List { item, .. }, TypedValue::List(list)) => {
                let items = list
                    .iter()
                    .map(|slot| match slot {
                        Slot::Null | Slot::Absent => Value::Null,
                        Slot::Present(v) => self.token(field, item, v, child),
                    })
                    .collect();
                Value::Array(items)
            }
            // decode and NodeBuilder both verify kinds at construction
            _ => unreachable!("field `{}` holds a value of the wrong kind", field.alias),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use crate::scalar::default_registry;
    use crate::value::TypedList;
    use ordered_float::OrderedFloat;
    use serde_json::json;

    #[test]
    fn absent_is_omitted_and_null_is_explicit() {
        let mut w = Writer::new(default_registry());
        w.write_slot(&FieldDescriptor::string("a").nullable(), &Slot::Absent, None);
        w.write_slot(&FieldDescriptor::string("b").nullable(), &Slot::Null, None);
        w.write_slot(
            &FieldDescriptor::string("c"),
            &Slot::Present(TypedValue::Str("x".into())),
            None,
        );
        assert_eq!(w.finish(), json!({"b": null, "c": "x"}));
    }

    #[test]
    fn lists_keep_order_cardinality_and_emptiness() {
        let mut w = Writer::new(default_registry());
        let d = FieldDescriptor::list("xs", FieldKind::Int).nullable_items();
        let list = TypedList(vec![
            Slot::Present(TypedValue::Int(1)),
            Slot::Null,
            Slot::Present(TypedValue::Int(3)),
        ]);
        w.write_slot(&d, &Slot::Present(TypedValue::List(list)), None);

        let empty = FieldDescriptor::list("none", FieldKind::Str);
        w.write_slot(&empty, &Slot::Present(TypedValue::List(TypedList::default())), None);

        assert_eq!(w.finish(), json!({"xs": [1, null, 3], "none": []}));
    }

    #[test]
    fn scalars_emit_their_token_forms() {
        let mut w = Writer::new(default_registry());
        w.write_slot(
            &FieldDescriptor::float("height"),
            &Slot::Present(TypedValue::Float(OrderedFloat(1.72))),
            None,
        );
        w.write_slot(
            &FieldDescriptor::boolean("alive"),
            &Slot::Present(TypedValue::Bool(false)),
            None,
        );
        assert_eq!(w.finish(), json!({"height": 1.72, "alive": false}));
    }
}
