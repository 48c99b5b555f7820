use serde_json::Value;
use uplink_engine::RequestParams;

use crate::error::AppError;

/// Parse `key=value` arguments. Values are taken as strings, which render
/// the same way in a fingerprint as their numeric or boolean forms.
pub fn parse_params(raw: &[String]) -> Result<Option<RequestParams>, AppError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let mut params = RequestParams::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(AppError::ParseError(format!(
                "Invalid parameter '{pair}'. Expected 'key=value'"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::ParseError(format!(
                "Invalid parameter '{pair}': empty key"
            )));
        }
        params.insert_value(key, Value::String(value.to_owned()));
    }
    Ok(Some(params))
}

/// Dynamic parameters only contribute their names
pub fn parse_dynamic(keys: &[String]) -> Option<RequestParams> {
    if keys.is_empty() {
        return None;
    }
    Some(
        keys.iter()
            .map(|key| (key.trim().to_owned(), Value::Null))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplink_engine::derive_key;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&["uid=7".to_owned(), "q=a=b".to_owned()])
            .unwrap()
            .unwrap();
        assert_eq!(params.get("uid"), Some(&Value::String("7".to_owned())));
        assert_eq!(params.get("q"), Some(&Value::String("a=b".to_owned())));

        assert!(parse_params(&[]).unwrap().is_none());
        assert!(parse_params(&["novalue".to_owned()]).is_err());
        assert!(parse_params(&["=x".to_owned()]).is_err());
    }

    #[test]
    fn test_string_values_match_typed_fingerprints() {
        let parsed = parse_params(&["uid=7".to_owned()]).unwrap().unwrap();
        let typed = RequestParams::new().with("uid", 7).unwrap();
        assert_eq!(
            derive_key("http://up.example", Some(&parsed), None),
            derive_key("http://up.example", Some(&typed), None)
        );
    }

    #[test]
    fn test_parse_dynamic() {
        let dynamic = parse_dynamic(&["ts".to_owned()]).unwrap();
        assert!(dynamic.contains_key("ts"));
        assert!(parse_dynamic(&[]).is_none());
    }
}
