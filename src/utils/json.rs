use serde_json::Value;

/// How a key in a PATCH body was supplied.
pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableValue, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::String(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

/// Resolves a nullable text field into a changeset slot.
///
/// `None` leaves the column untouched, `Some(None)` clears it. Blank strings
/// clear the column as well.
pub fn nullable_text_change(
    body: &Value,
    field: &str,
) -> Result<Option<Option<String>>, String> {
    match classify_nullable(body.get(field)).map_err(|err| format!("{field}: {err}"))? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Ok(Some(None)),
        NullableValue::String(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(Some(None))
            } else {
                Ok(Some(Some(trimmed.to_string())))
            }
        }
    }
}

/// Resolves a required text field: omitted leaves it, null or blank is an error.
pub fn required_text_change(body: &Value, field: &str) -> Result<Option<String>, String> {
    match classify_nullable(body.get(field)).map_err(|err| format!("{field}: {err}"))? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(format!("{field} cannot be null")),
        NullableValue::String(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(format!("{field} must not be empty"))
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nullable_text_distinguishes_omitted_and_cleared() {
        let body = json!({ "notes": null, "phone": "  ", "company": " Acme " });
        assert_eq!(nullable_text_change(&body, "location").unwrap(), None);
        assert_eq!(nullable_text_change(&body, "notes").unwrap(), Some(None));
        assert_eq!(nullable_text_change(&body, "phone").unwrap(), Some(None));
        assert_eq!(
            nullable_text_change(&body, "company").unwrap(),
            Some(Some("Acme".to_string()))
        );
    }

    #[test]
    fn required_text_rejects_null_and_blank() {
        let body = json!({ "name": null, "email": "", "title": 3 });
        assert!(required_text_change(&body, "name").is_err());
        assert!(required_text_change(&body, "email").is_err());
        assert!(required_text_change(&body, "title").is_err());
        assert_eq!(required_text_change(&body, "missing").unwrap(), None);
    }
}
