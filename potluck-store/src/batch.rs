use serde_json::Value;

use crate::{DocumentPath, Fields};

#[derive(Clone, Debug, PartialEq)]
pub enum FieldChange {
    Set(Value),
    Delete,
    /// Appends each value not already present. A non-array field is replaced.
    ArrayUnion(Vec<Value>),
    /// Removes every occurrence of each value. A non-array field becomes an empty array.
    ArrayRemove(Vec<Value>),
}

/// Partial update of a single document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Changes(Vec<(String, FieldChange)>);

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((field.into(), FieldChange::Set(value.into())));
        self
    }

    pub fn delete(mut self, field: impl Into<String>) -> Self {
        self.0.push((field.into(), FieldChange::Delete));
        self
    }

    pub fn array_union<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.0.push((field.into(), FieldChange::ArrayUnion(values)));
        self
    }

    pub fn array_remove<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.0.push((field.into(), FieldChange::ArrayRemove(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn apply_to(&self, fields: &mut Fields) {
        for (field, change) in &self.0 {
            match change {
                FieldChange::Set(value) => {
                    fields.insert(field.clone(), value.clone());
                }
                FieldChange::Delete => {
                    fields.remove(field);
                }
                FieldChange::ArrayUnion(values) => {
                    let slot = fields.entry(field.clone()).or_insert(Value::Null);
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = slot {
                        for value in values {
                            if !items.contains(value) {
                                items.push(value.clone());
                            }
                        }
                    }
                }
                FieldChange::ArrayRemove(values) => {
                    let slot = fields.entry(field.clone()).or_insert(Value::Null);
                    match slot {
                        Value::Array(items) => items.retain(|item| !values.contains(item)),
                        other => *other = Value::Array(Vec::new()),
                    }
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Set { path: DocumentPath, fields: Fields },
    Update { path: DocumentPath, changes: Changes },
    Delete { path: DocumentPath },
}

impl Write {
    pub fn path(&self) -> &DocumentPath {
        match self {
            Write::Set { path, .. } | Write::Update { path, .. } | Write::Delete { path } => path,
        }
    }
}

/// Writes across any set of documents, committed all-or-nothing by [`crate::DocumentStore::commit`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.writes.push(Write::Set { path, fields });
        self
    }

    pub fn update(&mut self, path: DocumentPath, changes: Changes) -> &mut Self {
        self.writes.push(Write::Update { path, changes });
        self
    }

    pub fn delete(&mut self, path: DocumentPath) -> &mut Self {
        self.writes.push(Write::Delete { path });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test fields are objects"),
        }
    }

    #[test]
    fn array_union_is_idempotent() {
        let mut doc = fields(json!({"friendIds": ["a"]}));
        let changes = Changes::new().array_union("friendIds", ["b", "a"]);
        changes.apply_to(&mut doc);
        changes.apply_to(&mut doc);
        assert_eq!(doc["friendIds"], json!(["a", "b"]));
    }

    #[test]
    fn array_union_creates_missing_field() {
        let mut doc = fields(json!({}));
        Changes::new().array_union("favorites", [42]).apply_to(&mut doc);
        assert_eq!(doc["favorites"], json!([42]));
    }

    #[test]
    fn array_remove_of_absent_value_is_a_no_op() {
        let mut doc = fields(json!({"friendIds": ["a", "b"]}));
        let changes = Changes::new().array_remove("friendIds", ["c"]);
        changes.apply_to(&mut doc);
        assert_eq!(doc["friendIds"], json!(["a", "b"]));
    }

    #[test]
    fn set_and_delete_fields() {
        let mut doc = fields(json!({"reaction": "like", "recipeId": 1}));
        Changes::new()
            .set("reaction", "yum")
            .delete("recipeId")
            .apply_to(&mut doc);
        assert_eq!(doc, fields(json!({"reaction": "yum"})));
    }
}
