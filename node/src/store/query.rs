use super::{Document, FieldPath};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(FieldPath, Value),
    /// Documents without the field never match.
    NotEq(FieldPath, Value),
    ArrayContains(FieldPath, Value),
}

impl Filter {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(path, expected) => doc.field(path) == Some(expected),
            Filter::NotEq(path, expected) => doc
                .field(path)
                .is_some_and(|value| !value.is_null() && value != expected),
            Filter::ArrayContains(path, expected) => doc
                .field(path)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(expected)),
        }
    }
}

/// Filtered, ordered, optionally capped view over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(FieldPath, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_owned(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Single-document view, as used for document-level subscriptions.
    pub fn document(collection: &str, id: &str) -> Self {
        Self::collection(collection).where_eq("id", id).limit(1)
    }

    pub fn where_eq(mut self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(path.into(), value.into()));
        self
    }

    pub fn where_not_eq(mut self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::NotEq(path.into(), value.into()));
        self
    }

    pub fn where_array_contains(
        mut self,
        path: impl Into<FieldPath>,
        value: impl Into<Value>,
    ) -> Self {
        self.filters
            .push(Filter::ArrayContains(path.into(), value.into()));
        self
    }

    pub fn order_by(mut self, path: impl Into<FieldPath>, direction: Direction) -> Self {
        self.order_by = Some((path.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(doc))
    }

    /// Evaluate against a collection's documents.
    pub fn apply<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut selected: Vec<&Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((path, direction)) = &self.order_by {
            selected.sort_by(|a, b| {
                let ordering = match (a.field(path), b.field(path)) {
                    (Some(x), Some(y)) => {
                        let ord = compare_values(x, y);
                        match direction {
                            Direction::Ascending => ord,
                            Direction::Descending => ord.reverse(),
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                ordering.then_with(|| a.id.cmp(&b.id))
            });
        }

        let limit = self.limit.unwrap_or(usize::MAX);
        selected.into_iter().take(limit).cloned().collect()
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
