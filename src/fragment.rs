//! Fragments and loadable fragment bundles.
//!
//! A `Fragment` pairs a field table with its name and original source
//! text. The source is opaque: carried for diagnostics and dumps,
//! never parsed or consulted during decode/encode.
//!
//! A `FragmentBundle` is the serde form of one fragment and every
//! nested type it selects, with child links by type name. Building a
//! bundle produces a fully-bound mapper graph; name references make
//! recursive selections (a type reaching itself through any cycle)
//! unremarkable.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::field::FieldTable;
use crate::mapper::Mapper;

#[derive(Debug, Clone)]
pub struct Fragment {
    name: String,
    source: String,
    table: Arc<FieldTable>,
}

impl Fragment {
    pub fn new(name: &str, source: &str, table: FieldTable) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            table: Arc::new(table),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fragment's source text, verbatim. Diagnostics only.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn table(&self) -> &Arc<FieldTable> {
        &self.table
    }
}

// ------------------------------ Bundles ----------------------------------- //

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("root type `{0}` is not defined in the bundle")]
    UnknownRoot(String),
    #[error("type `{referenced}` (child of `{parent}.{alias}`) is not defined in the bundle")]
    UnknownType {
        parent: String,
        alias: String,
        referenced: String,
    },
    #[error("type `{parent}` has no field `{alias}` to bind")]
    UnknownField { parent: String, alias: String },
    #[error("field `{parent}.{alias}` selects no object; nothing to bind")]
    NotAnObjectField { parent: String, alias: String },
    #[error("object field `{parent}.{alias}` has no child type in the bundle")]
    UnboundChild { parent: String, alias: String },
}

/// One named type inside a bundle: its field table plus child links
/// (response alias → type name) for every nested object shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSpec {
    pub fields: FieldTable,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, String>,
}

/// Serde model of a complete fragment: tables for the root type and
/// everything it reaches. Table invariants are enforced while
/// deserializing (`FieldTable` validates itself), so a loaded bundle
/// carries only well-formed tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentBundle {
    pub name: String,
    #[serde(default)]
    pub source: String,
    pub root: String,
    pub types: IndexMap<String, TypeSpec>,
}

impl FragmentBundle {
    /// Construct one mapper per type and bind every child link.
    /// Returns the root mapper of the fully-bound graph.
    pub fn build(&self) -> Result<Arc<Mapper>, BundleError> {
        let mut mappers: IndexMap<&str, Arc<Mapper>> = IndexMap::with_capacity(self.types.len());
        for (type_name, spec) in &self.types {
            let source = if *type_name == self.root { self.source.as_str() } else { "" };
            let fragment = Fragment::new(type_name, source, spec.fields.clone());
            mappers.insert(type_name, Arc::new(Mapper::new(fragment)));
        }

        for (type_name, spec) in &self.types {
            let parent = &mappers[type_name.as_str()];
            for (alias, child_name) in &spec.children {
                let Some(field) = spec.fields.position(alias).map(|i| spec.fields.get(i)) else {
                    return Err(BundleError::UnknownField {
                        parent: type_name.clone(),
                        alias: alias.clone(),
                    });
                };
                if !field.kind.bears_object() {
                    return Err(BundleError::NotAnObjectField {
                        parent: type_name.clone(),
                        alias: alias.clone(),
                    });
                }
                let Some(child) = mappers.get(child_name.as_str()) else {
                    return Err(BundleError::UnknownType {
                        parent: type_name.clone(),
                        alias: alias.clone(),
                        referenced: child_name.clone(),
                    });
                };
                parent.bind(alias, Arc::clone(child));
            }
        }

        for type_name in self.types.keys() {
            if let Some(alias) = mappers[type_name.as_str()].unbound() {
                return Err(BundleError::UnboundChild {
                    parent: type_name.clone(),
                    alias: alias.to_string(),
                });
            }
        }

        match mappers.get(self.root.as_str()) {
            Some(root) => Ok(Arc::clone(root)),
            None => Err(BundleError::UnknownRoot(self.root.clone())),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
