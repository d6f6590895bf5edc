//! Validation of login lists coming from untrusted JSON (file uploads and
//! remote sync bodies).
//!
//! Records are validated one by one: a malformed record is rejected on its
//! own and the remaining valid records are still admitted. Only a document
//! that is not JSON, or not an array, fails as a whole.

use serde_json::{Map, Value};

use crate::{Categories, Login, LoginError, Result};

/// Outcome of importing a login list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Valid records, in document order
    pub logins: Vec<Login>,

    /// One `LoginError::InvalidRecord` per rejected record
    pub rejected: Vec<LoginError>,
}

/// Parse a JSON document whose top level must be an array of logins.
pub fn parse_logins(text: &str) -> Result<ImportReport> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| LoginError::Parse(e.to_string()))?;
    logins_from_value(value)
}

pub fn logins_from_value(value: Value) -> Result<ImportReport> {
    let Value::Array(records) = value else {
        return Err(LoginError::NotAnArray);
    };

    let mut report = ImportReport::default();
    for (index, record) in records.iter().enumerate() {
        match validate_record(record) {
            Ok(login) => report.logins.push(login),
            Err(reason) => {
                tracing::warn!("Rejected login record {}: {}", index, reason);
                report
                    .rejected
                    .push(LoginError::InvalidRecord { index, reason });
            }
        }
    }

    Ok(report)
}

fn validate_record(record: &Value) -> std::result::Result<Login, String> {
    let Value::Object(fields) = record else {
        return Err("expected an object".to_string());
    };

    let username = required_string(fields, "username")?;
    let password = required_string(fields, "password")?;

    let description = match fields.get("description") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err("'description' must be a string".to_string()),
    };

    let categories = match fields.get("categories") {
        None | Some(Value::Null) => Categories::new(),
        Some(Value::Object(map)) => {
            let mut categories = Categories::new();
            for (key, value) in map {
                match value {
                    Value::String(s) => {
                        categories.insert(key.clone(), s.clone());
                    }
                    _ => return Err(format!("category '{}' must be a string", key)),
                }
            }
            categories
        }
        Some(_) => return Err("'categories' must be an object".to_string()),
    };

    Ok(Login {
        username,
        password,
        description,
        categories,
    })
}

fn required_string(fields: &Map<String, Value>, name: &str) -> std::result::Result<String, String> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(format!("'{}' must be a string", name)),
        None => Err(format!("missing '{}'", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_list() {
        let json = r#"[
            {"username": "a@x.com", "password": "pw", "description": "foo",
             "categories": {"type": "single"}},
            {"username": "b@x.com", "password": "pw"}
        ]"#;

        let report = parse_logins(json).unwrap();
        assert!(report.rejected.is_empty());
        assert_eq!(report.logins.len(), 2);
        assert_eq!(report.logins[0].categories["type"], "single");
        assert_eq!(report.logins[1].description, "");
    }

    #[test]
    fn test_malformed_records_rejected_individually() {
        let json = r#"[
            {"username": "ok", "password": "pw"},
            {"username": "no-password"},
            "not an object",
            {"username": "bad-cat", "password": "pw", "categories": {"type": 1}},
            {"username": 42, "password": "pw"},
            {"username": "ok2", "password": "pw", "description": null}
        ]"#;

        let report = parse_logins(json).unwrap();
        let names: Vec<&str> = report.logins.iter().map(|l| l.username.as_str()).collect();
        assert_eq!(names, vec!["ok", "ok2"]);

        let indices: Vec<usize> = report
            .rejected
            .iter()
            .map(|e| match e {
                LoginError::InvalidRecord { index, .. } => *index,
                other => panic!("unexpected error: {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(parse_logins("{not json"), Err(LoginError::Parse(_))));
    }

    #[test]
    fn test_non_array_is_rejected() {
        assert_eq!(
            parse_logins(r#"{"username": "a", "password": "b"}"#),
            Err(LoginError::NotAnArray)
        );
    }

    #[test]
    fn test_empty_array_is_empty_report() {
        assert_eq!(parse_logins("[]").unwrap(), ImportReport::default());
    }
}
