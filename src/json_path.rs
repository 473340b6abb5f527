//! Optional-chaining lookups over loosely shaped JSON.
//!
//! OpenAlex records are irregular: keys go missing, objects come back as `null`,
//! and lists are sometimes empty objects. Every accessor here returns an absent
//! value instead of failing, so callers can read deeply nested fields without
//! checking each level.

use serde_json::Value;

/// Path-based accessors for `serde_json::Value`.
pub trait JsonPath {
    /// Walk `path` through nested objects.
    ///
    /// Returns `None` when a key is missing, an intermediate value is not an
    /// object, or the final value is `null` or an empty object.
    fn at(&self, path: &[&str]) -> Option<&Value>;

    fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.at(path).and_then(Value::as_str)
    }

    /// String at `path`, or empty.
    fn string_at(&self, path: &[&str]) -> String {
        self.str_at(path).unwrap_or_default().to_string()
    }

    fn i64_at(&self, path: &[&str]) -> Option<i64> {
        self.at(path).and_then(Value::as_i64)
    }

    fn f64_at(&self, path: &[&str]) -> Option<f64> {
        self.at(path).and_then(Value::as_f64)
    }

    fn bool_at(&self, path: &[&str]) -> Option<bool> {
        self.at(path).and_then(Value::as_bool)
    }

    /// Array at `path`, or an empty slice.
    fn array_at(&self, path: &[&str]) -> &[Value] {
        self.at(path)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Scalar rendered as text; arrays of scalars are joined with `"; "`.
    fn text_at(&self, path: &[&str]) -> String {
        match self.at(path) {
            Some(Value::Array(items)) => items
                .iter()
                .map(scalar_text)
                .collect::<Vec<_>>()
                .join("; "),
            Some(value) => scalar_text(value),
            None => String::new(),
        }
    }
}

impl JsonPath for Value {
    fn at(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self;
        for key in path {
            current = current.as_object()?.get(*key)?;
        }
        match current {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            other => Some(other),
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}
