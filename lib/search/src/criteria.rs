use serde_json::{Map, Value};
use shadowvec_core::{Error, Result, Vector};

/// A search body reduced to the one field it targets.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub field: String,
    pub vector: Vector,
}

impl SearchCriteria {
    /// Parse `{"<field>": [numbers]}`. Anything but exactly one entry is rejected.
    pub fn from_body(body: Map<String, Value>) -> Result<Self> {
        if body.len() != 1 {
            return Err(Error::Validation("can only search by one field".to_string()));
        }
        let Some((field, value)) = body.into_iter().next() else {
            return Err(Error::Validation("can only search by one field".to_string()));
        };
        let vector = Vector::from_json(&field, &value)?;
        Ok(Self { field, vector })
    }

    pub fn from_value(body: Value) -> Result<Self> {
        match body {
            Value::Object(map) => Self::from_body(map),
            _ => Err(Error::Validation(
                "search body must be an object of one field".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_field() {
        let criteria = SearchCriteria::from_value(json!({"embedding": [1, 2.5, -3]})).unwrap();
        assert_eq!(criteria.field, "embedding");
        assert_eq!(criteria.vector.as_slice(), &[1.0, 2.5, -3.0]);
    }

    #[test]
    fn test_rejects_other_shapes() {
        let many = SearchCriteria::from_value(json!({"a": [1], "b": [2]}));
        assert!(matches!(many, Err(Error::Validation(m)) if m == "can only search by one field"));
        assert!(matches!(SearchCriteria::from_value(json!({})), Err(Error::Validation(_))));
        assert!(matches!(SearchCriteria::from_value(json!([1, 2])), Err(Error::Validation(_))));
        assert!(matches!(SearchCriteria::from_value(json!({"a": "x"})), Err(Error::Validation(_))));
        assert!(matches!(SearchCriteria::from_value(json!({"a": [1, "x"]})), Err(Error::Validation(_))));
    }
}
