//! Semantic-type integration tests: custom type round trips through the
//! repository boundary, coercion failures surfacing on first access, and
//! paranoid (logical) deletion in both flag and timestamp flavors.

use strata_core::{
    CoercionError, ModelBuilder, ModelId, Primitive, Property, Schema, TypeDef, TypeId, Value,
};
use strata_storage::{MemoryAdapter, Query, RepositorySet, StorageError};

// -----------------------------------------------------------------------
// Custom types
// -----------------------------------------------------------------------

/// A model mixing a text-backed impostor type with built-in types.
fn coconut_set() -> (RepositorySet, ModelId) {
    let mut schema = Schema::new();
    let impostor = schema
        .types
        .register(TypeDef::new("impostor", Primitive::Text))
        .unwrap();
    let coconut = schema
        .define(
            ModelBuilder::new("Coconut")
                .storage_name("coconuts")
                .property(Property::new("id", TypeId::INT).serial())
                .property(Property::new("faked", impostor))
                .property(Property::new("active", TypeId::BOOL))
                .property(Property::new("note", TypeId::TEXT)),
        )
        .unwrap();
    let set = RepositorySet::new(schema);
    set.setup("default", Box::new(MemoryAdapter::new())).unwrap();
    (set, coconut)
}

#[test]
fn instantiates_with_custom_types() {
    let (set, coconut) = coconut_set();
    let repo = set.repository("default").unwrap();
    let mut bob = repo
        .build(
            coconut,
            vec![
                ("faked", Value::from("bob")),
                ("active", Value::Bool(true)),
                ("note", Value::from("This is a note on our ol' guy bob")),
            ],
        )
        .unwrap();

    assert_eq!(bob.get("faked").unwrap(), Value::from("bob"));
    assert_eq!(bob.get("active").unwrap(), Value::Bool(true));
    assert!(matches!(bob.get("note").unwrap(), Value::Text(_)));
}

#[test]
fn cruds_an_object_with_custom_types() {
    let (set, coconut) = coconut_set();
    let repo = set.repository("default").unwrap();

    let mut created = repo
        .create(
            coconut,
            vec![
                ("faked", Value::from("bob")),
                ("active", Value::Bool(true)),
                ("note", Value::from("This is a note on our ol' guy bob")),
            ],
        )
        .unwrap();
    let id = created.get("id").unwrap();
    assert!(!id.is_nil());

    let mut fred = repo.fetch(coconut, &[id.clone()]).unwrap();
    assert_eq!(fred.get("faked").unwrap(), Value::from("bob"));
    assert_eq!(fred.get("active").unwrap(), Value::Bool(true));

    let note = "Seems like bob is just mockin' around";
    fred.set("note", note).unwrap();
    assert!(fred.save().unwrap());

    fred.set("active", false).unwrap();
    assert!(fred.save().unwrap());

    let mut mac = repo.fetch(coconut, &[id]).unwrap();
    assert_eq!(mac.get("active").unwrap(), Value::Bool(false));
    assert_eq!(mac.get("note").unwrap(), Value::from(note));
}

// -----------------------------------------------------------------------
// Coercion failure surfacing
// -----------------------------------------------------------------------

fn load_severity(raw: Value) -> Result<Value, CoercionError> {
    match raw {
        Value::Int(n) if n >= 0 => Ok(Value::Int(n)),
        other => Err(CoercionError {
            type_name: "severity".to_string(),
            value: other.to_string(),
            reason: "severity must be non-negative".to_string(),
        }),
    }
}

#[test]
fn coercion_failure_surfaces_at_first_access_not_at_fetch() {
    let mut schema = Schema::new();
    let severity = schema
        .types
        .register(TypeDef::new("severity", Primitive::Int).with_load(load_severity))
        .unwrap();
    // Two models over the same table: one writes raw integers, the other
    // reads them through the strict severity type.
    let raw_event = schema
        .define(
            ModelBuilder::new("RawEvent")
                .storage_name("events")
                .property(Property::new("id", TypeId::INT).serial())
                .property(Property::new("level", TypeId::INT)),
        )
        .unwrap();
    let event = schema
        .define(
            ModelBuilder::new("Event")
                .storage_name("events")
                .property(Property::new("id", TypeId::INT).serial())
                .property(Property::new("level", severity)),
        )
        .unwrap();

    let set = RepositorySet::new(schema);
    let repo = set.setup("default", Box::new(MemoryAdapter::new())).unwrap();
    repo.create(raw_event, vec![("level", Value::Int(-3))]).unwrap();

    // The fetch itself succeeds; only the poisoned attribute errs.
    let mut fetched = repo.fetch(event, &[Value::Int(1)]).unwrap();
    assert_eq!(fetched.get("id").unwrap(), Value::Int(1));

    let result = fetched.get("level");
    assert!(matches!(result, Err(StorageError::Coercion(_))));
    // Repeated access keeps failing until the value changes.
    assert!(fetched.get("level").is_err());

    // Overwriting the attribute clears the failure.
    fetched.set("level", Value::Int(2)).unwrap();
    assert_eq!(fetched.get("level").unwrap(), Value::Int(2));
}

// -----------------------------------------------------------------------
// Paranoid deletion
// -----------------------------------------------------------------------

#[test]
fn paranoia_with_a_boolean_marker() {
    let mut schema = Schema::new();
    let lime = schema
        .define(
            ModelBuilder::new("Lime")
                .storage_name("limes")
                .property(Property::new("id", TypeId::INT).serial())
                .property(Property::new("color", TypeId::TEXT))
                .property(Property::new("deleted", TypeId::BOOL))
                .paranoid_flag("deleted"),
        )
        .unwrap();
    let set = RepositorySet::new(schema);
    let repo = set.setup("default", Box::new(MemoryAdapter::new())).unwrap();

    let mut green = repo.create(lime, vec![("color", Value::from("green"))]).unwrap();
    let key = green.key();
    assert!(green.destroy().unwrap());

    // The instance stays materialized with the marker set.
    assert_eq!(green.get("deleted").unwrap(), Value::Bool(true));
    assert_eq!(green.get("color").unwrap(), Value::from("green"));

    // Gone from default scope, for finders and key lookups alike.
    assert!(repo.all(lime, Query::new()).unwrap().is_empty());
    assert!(repo.get(lime, &key).unwrap().is_none());

    // Explicitly querying the marker still reaches the row.
    let marked = repo.all(lime, Query::new().eq("deleted", true)).unwrap();
    assert_eq!(marked.len(), 1);
}

#[test]
fn paranoia_with_a_timestamp_marker() {
    let mut schema = Schema::new();
    let lime = schema
        .define(
            ModelBuilder::new("Lime")
                .storage_name("limes")
                .property(Property::new("id", TypeId::INT).serial())
                .property(Property::new("color", TypeId::TEXT))
                .property(Property::new("deleted_at", TypeId::DATETIME))
                .paranoid_timestamp("deleted_at"),
        )
        .unwrap();
    let set = RepositorySet::new(schema);
    let repo = set.setup("default", Box::new(MemoryAdapter::new())).unwrap();

    let mut green = repo.create(lime, vec![("color", Value::from("green"))]).unwrap();
    let key = green.key();
    assert!(green.destroy().unwrap());

    assert!(matches!(
        green.get("deleted_at").unwrap(),
        Value::DateTime(_)
    ));
    assert!(repo.all(lime, Query::new()).unwrap().is_empty());
    assert!(repo.get(lime, &key).unwrap().is_none());
}

#[test]
fn destroyed_paranoid_instance_can_still_reload() {
    let mut schema = Schema::new();
    let lime = schema
        .define(
            ModelBuilder::new("Lime")
                .storage_name("limes")
                .property(Property::new("id", TypeId::INT).serial())
                .property(Property::new("color", TypeId::TEXT))
                .property(Property::new("deleted", TypeId::BOOL))
                .paranoid_flag("deleted"),
        )
        .unwrap();
    let set = RepositorySet::new(schema);
    let repo = set.setup("default", Box::new(MemoryAdapter::new())).unwrap();

    let mut green = repo.create(lime, vec![("color", Value::from("green"))]).unwrap();
    green.destroy().unwrap();

    // Identity lookups bypass default scope: the row is still there.
    green.reload().unwrap();
    assert_eq!(green.get("deleted").unwrap(), Value::Bool(true));
    assert_eq!(green.get("color").unwrap(), Value::from("green"));
}
