//! Rows flowing between pipeline stages.

use indexmap::IndexMap;

use crate::ast::AggregateId;
use crate::types::Value;

/// Accumulator values for one group, keyed by aggregate id.
pub type AggregateValues = IndexMap<AggregateId, Value>;

/// An ordered mapping of column name to value.
///
/// A row may also carry the accumulator state the grouping stage attaches to
/// a group's representative row. That state is only visible to expression
/// evaluation and is dropped by projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: IndexMap<String, Value>,
    aggregates: Option<AggregateValues>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Row {
            columns: IndexMap::with_capacity(n),
            aggregates: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.columns.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    // -- aggregate state ---------------------------------------------------

    pub fn aggregates(&self) -> Option<&AggregateValues> {
        self.aggregates.as_ref()
    }

    pub fn aggregates_mut(&mut self) -> Option<&mut AggregateValues> {
        self.aggregates.as_mut()
    }

    pub fn set_aggregates(&mut self, values: AggregateValues) {
        self.aggregates = Some(values);
    }

    pub fn aggregate_value(&self, id: AggregateId) -> Option<&Value> {
        self.aggregates.as_ref().and_then(|a| a.get(&id))
    }

    /// Drop any transient aggregate state.
    pub fn strip_aggregates(&mut self) {
        self.aggregates = None;
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let columns = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Row {
            columns,
            aggregates: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order_is_preserved() {
        let row: Row = vec![("name", "Bob"), ("age", "29"), ("gender", "M")]
            .into_iter()
            .collect();
        let names: Vec<&str> = row.column_names().collect();
        assert_eq!(names, vec!["name", "age", "gender"]);
        assert_eq!(row.get("age"), Some(&Value::Text("29".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_aggregate_state_is_stripped() {
        let mut row: Row = vec![("g", "M")].into_iter().collect();
        let mut state = AggregateValues::new();
        state.insert(AggregateId(7), Value::Number(2.0));
        row.set_aggregates(state);
        assert_eq!(row.aggregate_value(AggregateId(7)), Some(&Value::Number(2.0)));

        row.strip_aggregates();
        assert!(row.aggregates().is_none());
        assert_eq!(row.len(), 1);
    }
}
