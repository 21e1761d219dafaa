//! Filter clauses and sort orders for remote queries.
//!
//! A query takes a list of `[field, operator, value]` clauses that the service
//! AND-s together. `in_last` carries its time unit as a fourth element.

use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Is,
    IsNot,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    InLast,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Is => "is",
            Operator::IsNot => "is_not",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::InLast => "in_last",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single filter clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    /// One value for most operators; `in_last` also carries the unit.
    pub values: Vec<Value>,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            values: vec![value.into()],
        }
    }

    /// `[field, "is", value]`
    pub fn is(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Is, value)
    }

    /// `[field, "is_not", value]`
    pub fn is_not(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::IsNot, value)
    }

    /// `[field, "in", [values...]]`
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::In, Value::Array(values))
    }

    /// `[field, "in_last", amount, unit]`, e.g. `["created_at", "in_last", 1, "HOUR"]`.
    pub fn in_last(field: impl Into<String>, amount: u32, unit: TimeUnit) -> Self {
        Self {
            field: field.into(),
            operator: Operator::InLast,
            values: vec![Value::from(amount), Value::from(unit.as_str())],
        }
    }

    /// The first (usually only) value of the clause.
    pub fn value(&self) -> &Value {
        self.values.first().unwrap_or(&Value::Null)
    }

    /// Wire representation as a JSON array.
    pub fn to_value(&self) -> Value {
        let mut items = vec![
            Value::from(self.field.clone()),
            Value::from(self.operator.as_str()),
        ];
        items.extend(self.values.iter().cloned());
        Value::Array(items)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 + self.values.len()))?;
        seq.serialize_element(&self.field)?;
        seq.serialize_element(self.operator.as_str())?;
        for value in &self.values {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

/// Time units accepted by `in_last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "HOUR",
            TimeUnit::Day => "DAY",
            TimeUnit::Week => "WEEK",
            TimeUnit::Month => "MONTH",
            TimeUnit::Year => "YEAR",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort order entry: `{field_name, direction}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field_name: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            direction: Direction::Desc,
        }
    }

    /// Sort parameter syntax of the REST API (`-field` for descending).
    pub fn to_sort_param(&self) -> String {
        match self.direction {
            Direction::Asc => self.field_name.clone(),
            Direction::Desc => format!("-{}", self.field_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_wire_format() {
        let f = Filter::is("code", "SH010");
        assert_eq!(serde_json::to_value(&f).unwrap(), json!(["code", "is", "SH010"]));
        assert_eq!(f.to_value(), json!(["code", "is", "SH010"]));

        let f = Filter::in_last("created_at", 2, TimeUnit::Hour);
        assert_eq!(
            serde_json::to_value(&f).unwrap(),
            json!(["created_at", "in_last", 2, "HOUR"])
        );
    }

    #[test]
    fn test_order_sort_param() {
        assert_eq!(Order::desc("created_at").to_sort_param(), "-created_at");
        assert_eq!(Order::asc("code").to_sort_param(), "code");
        assert_eq!(
            serde_json::to_value(Order::desc("created_at")).unwrap(),
            json!({"field_name": "created_at", "direction": "desc"})
        );
    }
}
