//! Row and filter types shared by every store implementation.
//!
//! Rows are kept as raw JSON objects: a backup must be a faithful copy of what
//! the store returned, so nothing here knows about persons or attendance.

use serde_json::Value;

/// One table row exactly as the store serialises it.
pub type Row = serde_json::Map<String, Value>;

/// Conjunction of `column = value` conditions.
///
/// An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// A filter that matches every row in the table.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    pub fn eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.conditions.push((column.into(), value));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against an in-memory row. A missing column compares as `null`.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::all();
        assert!(filter.is_unconditional());
        assert!(filter.matches(&row(json!({ "id": 1 }))));
        assert!(filter.matches(&Row::new()));
    }

    #[test]
    fn all_conditions_must_hold() {
        let filter = Filter::all()
            .eq("date", json!("2024-01-15"))
            .eq("activity_type", json!("Training"));

        assert!(filter.matches(&row(json!({
            "id": 7, "date": "2024-01-15", "activity_type": "Training"
        }))));
        assert!(!filter.matches(&row(json!({
            "date": "2024-01-15", "activity_type": "Match"
        }))));
    }

    #[test]
    fn missing_column_compares_as_null() {
        let filter = Filter::all().eq("team", Value::Null);
        assert!(filter.matches(&row(json!({ "pass_number": "abc" }))));
        assert!(!filter.matches(&row(json!({ "team": "U10" }))));
    }
}
