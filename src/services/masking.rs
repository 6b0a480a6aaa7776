// Value masking
//
// Pure transforms applied to visible-but-masked result columns. Null passes
// through unchanged for every kind.

use serde_json::Value;

use crate::models::MaskingFn;

const HIDDEN: &str = "***";

/// Obscure a single value according to `kind`
pub fn apply_mask(value: &Value, kind: MaskingFn) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match kind {
        MaskingFn::Email => Value::String(mask_email(&as_text(value))),
        MaskingFn::Phone => Value::String(mask_phone(&as_text(value))),
        MaskingFn::Name => Value::String(mask_name(&as_text(value))),
        MaskingFn::Uuid => Value::String(mask_uuid(&as_text(value))),
        MaskingFn::Number => Value::from(0),
        MaskingFn::Date => Value::String(mask_date(&as_text(value))),
        MaskingFn::Full => Value::String(HIDDEN.to_string()),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn mask_email(value: &str) -> String {
    let at = match value.find('@') {
        Some(idx) if idx > 0 => idx,
        _ => return HIDDEN.to_string(),
    };
    let first = first_char(value);
    let domain = &value[at + 1..];

    match domain.rfind('.') {
        Some(dot) if dot > 0 => format!("{}***@***{}", first, &domain[dot..]),
        _ => format!("{}***@***", first),
    }
}

fn mask_phone(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 3 {
        return HIDDEN.to_string();
    }

    let prefix = if value.starts_with('+') { "+" } else { "" };
    let last3: String = digits[digits.len() - 3..].iter().collect();
    format!("{}{}***{}", prefix, digits[0], last3)
}

fn mask_name(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 2 {
        return HIDDEN.to_string();
    }

    format!(
        "{}{}{}",
        chars[0],
        "*".repeat(chars.len() - 2),
        chars[chars.len() - 1]
    )
}

fn mask_uuid(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }

    let head: String = chars[..4].iter().collect();
    format!("{}****", head)
}

/// Truncate to January 1st of the leading year, if there is one
fn mask_date(value: &str) -> String {
    let year: String = value.chars().take(4).collect();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-01-01", year)
    } else {
        HIDDEN.to_string()
    }
}

fn first_char(value: &str) -> char {
    value.chars().next().unwrap_or('*')
}
