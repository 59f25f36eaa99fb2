//! Semantic types and the coercion registry.
//!
//! Every declared property carries a [`TypeId`]. The [`TypeRegistry`] maps a
//! semantic type to its storage [`Primitive`] plus optional load/dump
//! transforms, so custom types (a string-backed impostor type, an enum
//! stored as an integer) round-trip through the adapter correctly.
//!
//! Coercion happens at the repository boundary only -- on read from storage
//! and on write to storage -- never inside the attribute tracker, so
//! in-memory values are always already in typed form.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoercionError, SchemaError};
use crate::value::Value;

/// Unique identifier for a semantic type in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Pre-registered TypeId constants for built-in semantic types.
impl TypeId {
    pub const BOOL: TypeId = TypeId(0);
    pub const INT: TypeId = TypeId(1);
    pub const FLOAT: TypeId = TypeId(2);
    pub const TEXT: TypeId = TypeId(3);
    pub const DATETIME: TypeId = TypeId(4);
    /// Text-backed type identity column for single-table inheritance.
    pub const DISCRIMINATOR: TypeId = TypeId(5);
}

/// The primitive storage representation behind a semantic type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Primitive {
    Bool,
    Int,
    Float,
    Text,
    DateTime,
}

impl Primitive {
    /// Whether a raw value is acceptable input for this primitive.
    /// `Nil` is admitted everywhere.
    pub fn admits(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Nil)
                | (Primitive::Bool, Value::Bool(_))
                | (Primitive::Int, Value::Int(_))
                | (Primitive::Float, Value::Float(_))
                | (Primitive::Text, Value::Text(_))
                | (Primitive::DateTime, Value::DateTime(_))
        )
    }

    /// Primitive name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Text => "text",
            Primitive::DateTime => "datetime",
        }
    }
}

/// Load-transform: raw storage value to typed value.
pub type LoadFn = fn(Value) -> Result<Value, CoercionError>;

/// Dump-transform: typed value to raw storage value. Dumping cannot fail;
/// in-memory values are already typed.
pub type DumpFn = fn(Value) -> Value;

/// Definition of one semantic type: its storage primitive and transforms.
///
/// `None` transforms mean identity over the primitive (a primitive mismatch
/// on load is still a [`CoercionError`]).
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub primitive: Primitive,
    pub load: Option<LoadFn>,
    pub dump: Option<DumpFn>,
}

impl TypeDef {
    /// Creates an identity-transform type over the given primitive.
    pub fn new(name: impl Into<String>, primitive: Primitive) -> Self {
        TypeDef {
            name: name.into(),
            primitive,
            load: None,
            dump: None,
        }
    }

    /// Attaches a load-transform.
    pub fn with_load(mut self, load: LoadFn) -> Self {
        self.load = Some(load);
        self
    }

    /// Attaches a dump-transform.
    pub fn with_dump(mut self, dump: DumpFn) -> Self {
        self.dump = Some(dump);
        self
    }
}

/// Registry of semantic types, keyed by [`TypeId`].
///
/// On construction, the registry pre-registers the 6 built-in types:
/// - `TypeId(0)` = Bool
/// - `TypeId(1)` = Int
/// - `TypeId(2)` = Float
/// - `TypeId(3)` = Text
/// - `TypeId(4)` = DateTime
/// - `TypeId(5)` = Discriminator (Text-backed)
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    /// Type definitions indexed by TypeId.0
    defs: Vec<TypeDef>,
    /// Named type lookup
    names: HashMap<String, TypeId>,
}

impl TypeRegistry {
    /// Number of built-in types pre-registered on construction.
    const BUILTIN_COUNT: u32 = 6;

    /// Creates a registry with the built-in types pre-registered.
    pub fn new() -> Self {
        let defs = vec![
            TypeDef::new("bool", Primitive::Bool),
            TypeDef::new("int", Primitive::Int),
            TypeDef::new("float", Primitive::Float),
            TypeDef::new("text", Primitive::Text),
            TypeDef::new("datetime", Primitive::DateTime),
            TypeDef::new("discriminator", Primitive::Text),
        ];
        let names = defs
            .iter()
            .enumerate()
            .map(|(i, def)| (def.name.clone(), TypeId(i as u32)))
            .collect();

        TypeRegistry { defs, names }
    }

    /// Registers a custom semantic type, returning its new [`TypeId`].
    ///
    /// Returns [`SchemaError::DuplicateTypeName`] if the name is taken.
    pub fn register(&mut self, def: TypeDef) -> Result<TypeId, SchemaError> {
        if self.names.contains_key(&def.name) {
            return Err(SchemaError::DuplicateTypeName {
                name: def.name.clone(),
            });
        }
        let id = TypeId(self.defs.len() as u32);
        self.names.insert(def.name.clone(), id);
        self.defs.push(def);
        Ok(id)
    }

    /// Looks up a type definition by its [`TypeId`].
    pub fn get(&self, id: TypeId) -> Option<&TypeDef> {
        self.defs.get(id.0 as usize)
    }

    /// Looks up a type's [`TypeId`] by name.
    pub fn find(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// Transforms a raw stored value into its typed form.
    ///
    /// `Nil` passes through untransformed. A raw value outside the type's
    /// primitive is a [`CoercionError`], as is anything the registered
    /// load-transform rejects.
    pub fn load(&self, id: TypeId, raw: Value) -> Result<Value, CoercionError> {
        let def = self.get(id).ok_or_else(|| CoercionError {
            type_name: format!("{}", id),
            value: raw.to_string(),
            reason: "semantic type is not registered".to_string(),
        })?;
        if raw.is_nil() {
            return Ok(Value::Nil);
        }
        if !def.primitive.admits(&raw) {
            return Err(CoercionError {
                type_name: def.name.clone(),
                value: raw.to_string(),
                reason: format!("expected {} primitive, got {}", def.primitive.name(), raw.kind()),
            });
        }
        match def.load {
            Some(load) => load(raw),
            None => Ok(raw),
        }
    }

    /// Transforms a typed value into its raw storage form.
    ///
    /// `Nil` passes through untransformed.
    pub fn dump(&self, id: TypeId, typed: Value) -> Value {
        if typed.is_nil() {
            return Value::Nil;
        }
        match self.get(id).and_then(|def| def.dump) {
            Some(dump) => dump(typed),
            None => typed,
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
