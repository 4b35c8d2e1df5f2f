//! Canonicalization of string-or-list fields.
//!
//! Every `input`, `model`, `action`, `output` and `next-action` field is
//! converted here, once, into an ordered `Vec<String>`. Nothing downstream
//! looks at the raw shape again.

use baton_types::workflow::{FieldItem, FieldValue, NO_INPUT};

/// Convert a string-or-list field into an ordered sequence of strings.
///
/// - absent or empty scalar: empty sequence
/// - scalar: one element
/// - list: element-wise; non-string elements become `""` so positions stay
///   aligned with sibling fields
///
/// Never fails.
pub fn normalize_string_slice(value: Option<&FieldValue>) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(FieldValue::Scalar(s)) if s.is_empty() => Vec::new(),
        Some(FieldValue::Scalar(s)) => vec![s.clone()],
        Some(FieldValue::List(items)) => items
            .iter()
            .map(|item| match item {
                FieldItem::Text(s) => s.clone(),
                FieldItem::Other => String::new(),
            })
            .collect(),
    }
}

/// Normalize an `input` field, where empty means "no input".
pub fn normalize_input(value: Option<&FieldValue>) -> Vec<String> {
    let inputs = normalize_string_slice(value);
    if inputs.is_empty() {
        vec![NO_INPUT.to_string()]
    } else {
        inputs
    }
}
