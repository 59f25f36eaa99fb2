//! Symbolic query conditions and their translation into query plans.
//!
//! Callers describe what they want with a [`Query`]: a field-to-[`Condition`]
//! map (insertion ordered), an optional field restriction, and limit/offset.
//! [`translate`] resolves that against a model into a backend-agnostic
//! [`QueryPlan`]: dump-coerced clauses in condition order, plus the
//! discriminator and paranoid scoping the model requires. The plan is
//! ephemeral -- constructed per finder call, consumed by the adapter.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use strata_core::{ModelId, Schema, Value};

use crate::error::StorageError;

/// One symbolic condition on a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// Inclusive range over both bounds.
    Range(Value, Value),
    /// Membership in a value set (an IN clause).
    In(Vec<Value>),
}

/// A symbolic finder query: conditions, field restriction, limit/offset.
///
/// Conditions are kept in insertion order; the translated plan evaluates
/// them in that order. Limit and offset compose as "skip offset rows, then
/// take limit rows" over whatever order the adapter returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    conditions: IndexMap<String, Condition>,
    fields: Option<Vec<String>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Query {
    /// An unconditioned query: everything in default scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition on a field.
    pub fn filter(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    /// Equality shorthand.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, Condition::Eq(value.into()))
    }

    /// Membership shorthand (an IN clause).
    pub fn within<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(
            field,
            Condition::In(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Inclusive-range shorthand.
    pub fn between(
        self,
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.filter(field, Condition::Range(low.into(), high.into()))
    }

    /// Restricts the fetched columns. Key properties and the discriminator
    /// are always fetched regardless; everything else stays lazily loadable.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The condition map, in insertion order.
    pub fn conditions(&self) -> &IndexMap<String, Condition> {
        &self.conditions
    }
}

/// A translated, dump-coerced condition operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Comparator {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value),
    In(Vec<Value>),
}

/// One translated condition: a storage column and its comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub column: String,
    pub cmp: Comparator,
}

/// Which columns a plan fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Every column of the backing row.
    All,
    /// The named columns only.
    Columns(Vec<String>),
}

/// An ordered, backend-agnostic description of one read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Backing table name.
    pub storage: String,
    /// Conditions in evaluation order: caller conditions first (in their
    /// insertion order), then discriminator scope, then paranoid scope.
    pub clauses: Vec<Clause>,
    pub projection: Projection,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Translates a symbolic query against a model into a [`QueryPlan`],
/// applying the model's default scope (discriminator and paranoid
/// filtering).
pub fn translate(
    schema: &Schema,
    model: ModelId,
    query: &Query,
) -> Result<QueryPlan, StorageError> {
    translate_with_scope(schema, model, query, true)
}

/// Translation without default scoping, for identity lookups (reload, lazy
/// load) where the row is addressed by key alone.
pub(crate) fn translate_unscoped(
    schema: &Schema,
    model: ModelId,
    query: &Query,
) -> Result<QueryPlan, StorageError> {
    translate_with_scope(schema, model, query, false)
}

fn translate_with_scope(
    schema: &Schema,
    model: ModelId,
    query: &Query,
    scoped: bool,
) -> Result<QueryPlan, StorageError> {
    let def = schema.model(model);

    let mut clauses = Vec::with_capacity(query.conditions.len() + 2);
    for (field, condition) in &query.conditions {
        let property = def.property(field).ok_or_else(|| StorageError::UnknownProperty {
            model: def.name.clone(),
            property: field.clone(),
        })?;
        let ty = property.semantic_type;
        let dump = |v: &Value| schema.types.dump(ty, v.clone());
        let cmp = match condition {
            Condition::Eq(v) => Comparator::Eq(dump(v)),
            Condition::Ne(v) => Comparator::Ne(dump(v)),
            Condition::Gt(v) => Comparator::Gt(dump(v)),
            Condition::Gte(v) => Comparator::Gte(dump(v)),
            Condition::Lt(v) => Comparator::Lt(dump(v)),
            Condition::Lte(v) => Comparator::Lte(dump(v)),
            Condition::Range(lo, hi) => Comparator::Between(dump(lo), dump(hi)),
            Condition::In(vs) => Comparator::In(vs.iter().map(dump).collect()),
        };
        clauses.push(Clause {
            column: field.clone(),
            cmp,
        });
    }

    if scoped {
        // Rows of any subtype satisfy a finder on the ancestor; the caller's
        // own condition on the discriminator wins when present.
        if let Some((property, names)) = schema.discriminator_scope(model) {
            if !query.conditions.contains_key(&property) {
                clauses.push(Clause {
                    column: property,
                    cmp: Comparator::In(names.into_iter().map(Value::Text).collect()),
                });
            }
        }
        // Logically deleted rows leave default scope entirely.
        if let Some(paranoid) = &def.paranoid {
            if !query.conditions.contains_key(paranoid.property()) {
                clauses.push(Clause {
                    column: paranoid.property().to_string(),
                    cmp: Comparator::Eq(Value::Nil),
                });
            }
        }
    }

    let projection = match &query.fields {
        None => Projection::All,
        Some(fields) => {
            let mut columns = Vec::with_capacity(fields.len() + 2);
            for field in fields {
                if def.property(field).is_none() {
                    return Err(StorageError::UnknownProperty {
                        model: def.name.clone(),
                        property: field.clone(),
                    });
                }
                if !columns.contains(field) {
                    columns.push(field.clone());
                }
            }
            // Identity and concrete-type resolution must survive projection.
            for (_, property) in def.key_properties() {
                if !columns.contains(&property.name) {
                    columns.push(property.name.clone());
                }
            }
            if let Some(disc) = &def.discriminator {
                if !columns.contains(disc) {
                    columns.push(disc.clone());
                }
            }
            Projection::Columns(columns)
        }
    };

    Ok(QueryPlan {
        storage: def.storage_name.clone(),
        clauses,
        projection,
        limit: query.limit,
        offset: query.offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ModelBuilder, Property, TypeId};

    fn test_schema() -> (Schema, ModelId, ModelId) {
        let mut schema = Schema::new();
        let flanimal = schema
            .define(
                ModelBuilder::new("Flanimal")
                    .property(Property::new("id", TypeId::INT).serial())
                    .property(Property::new("type", TypeId::DISCRIMINATOR))
                    .property(Property::new("name", TypeId::TEXT)),
            )
            .unwrap();
        let sprog = schema
            .define_subtype(flanimal, ModelBuilder::new("Sprog"))
            .unwrap();
        (schema, flanimal, sprog)
    }

    #[test]
    fn clauses_follow_condition_insertion_order() {
        let (schema, flanimal, _) = test_schema();
        let query = Query::new().eq("name", "Marty").within("id", vec![1i64, 2]);
        let plan = translate(&schema, flanimal, &query).unwrap();

        assert_eq!(plan.clauses[0].column, "name");
        assert_eq!(plan.clauses[1].column, "id");
        assert_eq!(
            plan.clauses[1].cmp,
            Comparator::In(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn discriminator_scope_is_appended() {
        let (schema, flanimal, sprog) = test_schema();

        let base_plan = translate(&schema, flanimal, &Query::new()).unwrap();
        assert_eq!(
            base_plan.clauses,
            vec![Clause {
                column: "type".to_string(),
                cmp: Comparator::In(vec![
                    Value::Text("Flanimal".into()),
                    Value::Text("Sprog".into())
                ]),
            }]
        );

        let sub_plan = translate(&schema, sprog, &Query::new()).unwrap();
        assert_eq!(
            sub_plan.clauses,
            vec![Clause {
                column: "type".to_string(),
                cmp: Comparator::In(vec![Value::Text("Sprog".into())]),
            }]
        );
    }

    #[test]
    fn caller_condition_on_discriminator_wins() {
        let (schema, flanimal, _) = test_schema();
        let query = Query::new().eq("type", "Sprog");
        let plan = translate(&schema, flanimal, &query).unwrap();
        assert_eq!(plan.clauses.len(), 1);
        assert_eq!(
            plan.clauses[0].cmp,
            Comparator::Eq(Value::Text("Sprog".into()))
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let (schema, flanimal, _) = test_schema();
        let query = Query::new().eq("nope", 1i64);
        let result = translate(&schema, flanimal, &query);
        assert!(matches!(
            result,
            Err(StorageError::UnknownProperty { property, .. }) if property == "nope"
        ));
    }

    #[test]
    fn projection_keeps_keys_and_discriminator() {
        let (schema, flanimal, _) = test_schema();
        let query = Query::new().fields(["name"]);
        let plan = translate(&schema, flanimal, &query).unwrap();
        assert_eq!(
            plan.projection,
            Projection::Columns(vec![
                "name".to_string(),
                "id".to_string(),
                "type".to_string()
            ])
        );
    }

    #[test]
    fn unscoped_translation_skips_default_scope() {
        let (schema, _, sprog) = test_schema();
        let query = Query::new().eq("id", 7i64);
        let plan = translate_unscoped(&schema, sprog, &query).unwrap();
        assert_eq!(plan.clauses.len(), 1);
        assert_eq!(plan.clauses[0].column, "id");
    }

    #[test]
    fn paranoid_scope_excludes_marked_rows() {
        let mut schema = Schema::new();
        let lime = schema
            .define(
                ModelBuilder::new("Lime")
                    .property(Property::new("id", TypeId::INT).serial())
                    .property(Property::new("deleted", TypeId::BOOL))
                    .paranoid_flag("deleted"),
            )
            .unwrap();

        let plan = translate(&schema, lime, &Query::new()).unwrap();
        assert_eq!(
            plan.clauses,
            vec![Clause {
                column: "deleted".to_string(),
                cmp: Comparator::Eq(Value::Nil),
            }]
        );

        // Explicitly querying the marker suppresses the default scope.
        let all_plan = translate(&schema, lime, &Query::new().eq("deleted", true)).unwrap();
        assert_eq!(all_plan.clauses.len(), 1);
        assert_eq!(
            all_plan.clauses[0].cmp,
            Comparator::Eq(Value::Bool(true))
        );
    }

    #[test]
    fn limit_offset_pass_through() {
        let (schema, flanimal, _) = test_schema();
        let plan = translate(&schema, flanimal, &Query::new().limit(20).offset(40)).unwrap();
        assert_eq!(plan.limit, Some(20));
        assert_eq!(plan.offset, Some(40));
    }

    #[test]
    fn plan_serde_roundtrip() {
        let (schema, flanimal, _) = test_schema();
        let query = Query::new().eq("name", "Marty").limit(5);
        let plan = translate(&schema, flanimal, &query).unwrap();

        let json = serde_json::to_string(&plan).unwrap();
        let back: QueryPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.storage, plan.storage);
        assert_eq!(back.clauses, plan.clauses);
        assert_eq!(back.projection, plan.projection);
        assert_eq!(back.limit, plan.limit);
    }
}
