use serde_json::Value as JsonValue;

const REDACTED: &str = "[REDACTED]";

/// Copy of `value` that is safe to emit in logs.
///
/// Credential-like keys are masked whatever their type; every other string
/// leaf is masked too, so free-text context (notes, assignment names) never
/// reaches a log line. Numbers, booleans and structure are kept.
pub fn redact_for_log(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, val)| {
                    let redacted = if is_credential_field(key) {
                        JsonValue::String(REDACTED.to_string())
                    } else {
                        redact_for_log(val)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(redact_for_log).collect()),
        JsonValue::String(s) if !s.is_empty() => JsonValue::String(REDACTED.to_string()),
        _ => value.clone(),
    }
}

/// Masks all but the last four characters, e.g. for showing a stored API key.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

fn is_credential_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    matches!(
        lower.as_str(),
        "token" | "accesstoken" | "access_token" | "apikey" | "api_key" | "password" | "secret"
    )
}
