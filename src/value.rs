//! Display strings for element values in the DICOM JSON model.

use serde_json::{Map, Value};

use crate::tree::truncate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Longest single value shown before it is cut and suffixed with `...`.
    pub value_width: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self { value_width: 50 }
    }
}

/// Formats the body of one DICOM JSON attribute (`{"vr": .., "Value": [..]}`).
pub fn format_value(vr: &str, body: &Map<String, Value>, opts: &FormatOptions) -> String {
    if vr == "SQ" {
        let count = body
            .get("Value")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        return item_count(count);
    }
    if body.contains_key("InlineBinary") || body.contains_key("BulkDataURI") {
        return "<Binary Data>".into();
    }

    let values = match body.get("Value") {
        Some(Value::Array(values)) => values.as_slice(),
        Some(other) => std::slice::from_ref(other),
        None => return String::new(),
    };

    match values {
        [] => String::new(),
        [single] => truncate(&scalar_text(vr, single), opts.value_width),
        many => {
            let parts: Vec<String> = many.iter().map(|v| list_entry(vr, v)).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

/// Summary shown for a sequence holding `count` items.
pub fn item_count(count: usize) -> String {
    format!("{count} Item(s)")
}

fn scalar_text(vr: &str, value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) if vr == "PN" => person_name(map),
        other => other.to_string(),
    }
}

fn list_entry(vr: &str, value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        other => format!("'{}'", scalar_text(vr, other)),
    }
}

fn person_name(map: &Map<String, Value>) -> String {
    ["Alphabetic", "Ideographic", "Phonetic"]
        .iter()
        .find_map(|group| map.get(*group).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}
