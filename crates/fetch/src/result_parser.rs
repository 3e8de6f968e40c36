// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Reassembles one branch's flat, markup-labeled result rows into
//! nested JSON objects, and merges multiple branches' objects (keyed
//! by the root id, always column zero of every branch) into one
//! `records` array.
//!
//! Reconstruction walks the same [`NodeSchema`] the branch's query
//! tree produced rather than re-deriving nesting from the label text:
//! a node's own columns are a fixed-width, fixed-position slice of
//! every row, so contiguous rows sharing the same value across a
//! node's [`NodeSchema::stable_range`] are the same instance of that
//! node, and a run of those chunks is the expanding child's array.
//! Rows are expected in the order the compiled `ORDER BY` produces
//! (ancestor key columns first, expanding key last), which keeps every
//! instance's rows contiguous.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};
use unified_fetch_driver::SqlValue;

use crate::error::{FetchError, FetchResult};
use crate::schema_plan::NodeSchema;

/// The `on_header`/`on_row`/`records` collaborator a fetch hands a
/// branch's result set to, per the query specification surface's
/// Result-Set Parser contract.
pub trait ResultSetParser {
    fn on_header(&mut self, header: &[String]);
    fn on_row(&mut self, row: &[SqlValue]);
    /// Consumes the parser, producing the top-level objects it
    /// reconstructed (one per distinct root instance).
    fn into_records(self: Box<Self>) -> FetchResult<Vec<Json>>;
}

/// Reference [`ResultSetParser`], driven by a branch's [`NodeSchema`].
pub struct TreeResultParser {
    schema: NodeSchema,
    rows: Vec<Vec<SqlValue>>,
}

impl TreeResultParser {
    pub fn new(schema: NodeSchema) -> Self {
        Self { schema, rows: Vec::new() }
    }
}

impl ResultSetParser for TreeResultParser {
    fn on_header(&mut self, header: &[String]) {
        if header.len() != self.schema.total_columns() {
            tracing::warn!(
                expected = self.schema.total_columns(),
                got = header.len(),
                "result header column count does not match the compiled branch's projection"
            );
        }
    }

    fn on_row(&mut self, row: &[SqlValue]) {
        self.rows.push(row.to_vec());
    }

    fn into_records(self: Box<Self>) -> FetchResult<Vec<Json>> {
        build_objects(&self.schema, &row_refs(&self.rows))
    }
}

fn row_refs(rows: &[Vec<SqlValue>]) -> Vec<&[SqlValue]> {
    rows.iter().map(|r| r.as_slice()).collect()
}

/// Strips a markup label down to its bare property name: the text
/// after the last `$`-prefix segment, minus a trailing `:` fetched-
/// reference marker. `"$key"`-suffixed labels are the dedup-only
/// collection key column and never become a JSON field of their own.
fn bare_name(label: &str) -> (String, bool) {
    let (label, fetched) = match label.strip_suffix(':') {
        Some(rest) => (rest, true),
        None => (label, false),
    };
    let name = label.rsplit('$').next().unwrap_or(label);
    (name.to_string(), fetched)
}

fn is_structural_key(name: &str) -> bool {
    name == "key"
}

fn all_null(range: &std::ops::Range<usize>, row: &[SqlValue]) -> bool {
    range.clone().all(|i| matches!(row.get(i), Some(SqlValue::Null) | None))
}

pub fn sql_value_to_json(v: &SqlValue) -> Json {
    match v {
        SqlValue::Null => Json::Null,
        SqlValue::Bool(b) => Json::Bool(*b),
        SqlValue::Int(i) => Json::from(*i),
        SqlValue::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        SqlValue::Str(s) => Json::String(s.clone()),
        SqlValue::DateTime(s) => Json::String(s.clone()),
        SqlValue::Array(items) => Json::Array(items.iter().map(sql_value_to_json).collect()),
    }
}

/// Reconstructs the nested objects `schema` describes out of `rows`,
/// a contiguous slice belonging to exactly one instance of `schema`'s
/// *parent* (or the whole result set, at the top level).
fn build_objects(schema: &NodeSchema, rows: &[&[SqlValue]]) -> FetchResult<Vec<Json>> {
    let stable = schema.stable_range();
    let mut out = Vec::new();
    let mut i = 0;
    while i < rows.len() {
        let key = &rows[i][stable.clone()];
        let mut j = i + 1;
        while j < rows.len() && &rows[j][stable.clone()] == key {
            j += 1;
        }
        let chunk = &rows[i..j];
        out.push(build_one(schema, chunk)?);
        i = j;
    }
    Ok(out)
}

fn build_one(schema: &NodeSchema, chunk: &[&[SqlValue]]) -> FetchResult<Json> {
    let representative = *chunk.first().ok_or_else(|| {
        FetchError::Internal("result reconstruction received an empty row chunk".to_string())
    })?;

    let claimed: std::collections::HashSet<&str> = schema
        .single_row_children
        .iter()
        .map(|c| c.field_name())
        .chain(schema.expanding_child.iter().map(|c| c.field_name()))
        .collect();

    let mut obj = Map::new();
    for (idx, label) in schema.own_labels.iter().enumerate() {
        let (name, _fetched) = bare_name(label);
        if is_structural_key(&name) || claimed.contains(name.as_str()) {
            continue;
        }
        obj.insert(name, sql_value_to_json(&representative[schema.own_start + idx]));
    }

    for child in &schema.single_row_children {
        let value = if child.virtual_ && all_null(&child.subtree_range(), representative) {
            Json::Null
        } else {
            let mut built = build_objects(child, &[representative])?;
            built.pop().unwrap_or(Json::Null)
        };
        obj.insert(child.field_name().to_string(), value);
    }

    if let Some(exp) = &schema.expanding_child {
        let filtered: Vec<&[SqlValue]> =
            chunk.iter().copied().filter(|row| !all_null(&exp.subtree_range(), row)).collect();
        let items = build_objects(exp, &filtered)?;
        obj.insert(exp.field_name().to_string(), Json::Array(items));
    }

    Ok(Json::Object(obj))
}

/// Merges the objects produced by one branch per debranched property
/// axis into one array, keyed by `id_field` -- every branch's root
/// shares the same record type and so the same id property, always
/// present in column zero of that branch's own select list.
pub fn merge_branches(id_field: &str, branches: Vec<Vec<Json>>) -> FetchResult<Vec<Json>> {
    let mut order: Vec<Json> = Vec::new();
    let mut merged: BTreeMap<String, Map<String, Json>> = BTreeMap::new();

    for branch in branches {
        for record in branch {
            let Json::Object(fields) = record else {
                return Err(FetchError::Internal("branch produced a non-object record".to_string()));
            };
            let id = fields
                .get(id_field)
                .ok_or_else(|| FetchError::Internal(format!("branch record has no '{id_field}' field")))?
                .clone();
            let key = id.to_string();
            match merged.get_mut(&key) {
                Some(existing) => existing.extend(fields),
                None => {
                    order.push(id);
                    merged.insert(key, fields);
                }
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|id| Json::Object(merged.remove(&id.to_string()).unwrap_or_default()))
        .collect())
}

#[cfg(test)]
mod tests {
    use unified_fetch_driver::PostgresLikeDriver;
    use unified_fetch_prop_tree::{build_props_tree_branches, Clause, FetchOptions};
    use unified_fetch_query_tree::for_direct_query;
    use unified_fetch_record_schema::{Cardinality, PropertyDesc, SchemaBuilder, StorageHint, ValueKind};

    use super::*;

    fn schema() -> unified_fetch_record_schema::Schema {
        let mut builder = SchemaBuilder::new();
        builder
            .add_record_type(
                "Customer",
                "customers",
                "id",
                vec![
                    PropertyDesc::new("id", ValueKind::Number, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("id".into())),
                    PropertyDesc::new("name", ValueKind::String, Cardinality::Scalar)
                        .with_storage(StorageHint::Column("name".into())),
                    PropertyDesc::new("tags", ValueKind::String, Cardinality::Array).with_storage(
                        StorageHint::Table {
                            table: "customer_tags".into(),
                            parent_id_column: "customer_id".into(),
                            key_column: Some("value".into()),
                            index_column: None,
                        },
                    ),
                ],
            )
            .unwrap();
        builder.finalize().unwrap()
    }

    #[test]
    fn reconstructs_scalar_fields() {
        let schema = schema();
        let driver = PostgresLikeDriver;
        let patterns = vec!["name".to_string()];
        let mut branches = build_props_tree_branches(
            &schema,
            "Customer",
            Clause::Select,
            &patterns,
            &FetchOptions::default(),
            None,
        )
        .unwrap();
        let tree = for_direct_query(&schema, &driver, "Customer", &branches.remove(0)).unwrap();
        let plan = NodeSchema::for_tree_root(&tree.root);

        let rows: Vec<Vec<SqlValue>> =
            vec![vec![SqlValue::Int(1), SqlValue::Str("Al".into())], vec![SqlValue::Int(2), SqlValue::Str("Bo".into())]];
        let objects = build_objects(&plan, &row_refs(&rows)).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["name"], Json::String("Al".to_string()));
        assert_eq!(objects[1]["id"], Json::from(2));
    }

    #[test]
    fn reconstructs_a_scalar_collection_as_an_array() {
        let schema = schema();
        let driver = PostgresLikeDriver;
        let patterns = vec!["tags".to_string()];
        let mut branches = build_props_tree_branches(
            &schema,
            "Customer",
            Clause::Select,
            &patterns,
            &FetchOptions::default(),
            None,
        )
        .unwrap();
        let tree = for_direct_query(&schema, &driver, "Customer", &branches.remove(0)).unwrap();
        let plan = NodeSchema::for_tree_root(&tree.root);

        // id, then the tags node's own (key, value) pair.
        let rows: Vec<Vec<SqlValue>> = vec![
            vec![SqlValue::Int(1), SqlValue::Str("k1".into()), SqlValue::Str("red".into())],
            vec![SqlValue::Int(1), SqlValue::Str("k2".into()), SqlValue::Str("blue".into())],
            vec![SqlValue::Int(2), SqlValue::Null, SqlValue::Null],
        ];
        let objects = build_objects(&plan, &row_refs(&rows)).unwrap();
        assert_eq!(objects.len(), 2);
        let tags = objects[0]["tags"].as_array().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(objects[1]["tags"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn merges_branches_by_id() {
        let a = vec![Json::from(serde_json::json!({"id": 1, "name": "Al"}))];
        let b = vec![Json::from(serde_json::json!({"id": 1, "tags": ["red"]}))];
        let merged = merge_branches("id", vec![a, b]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["name"], Json::String("Al".to_string()));
        assert_eq!(merged[0]["tags"], serde_json::json!(["red"]));
    }
}
