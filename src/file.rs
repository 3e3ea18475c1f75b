use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::dictionary::Dictionary;
use crate::error::LoadError;
use crate::types::{Element, Item, Record, Tag};
use crate::value::{format_value, item_count, FormatOptions};

/// Reads a record stored in the DICOM JSON model.
///
/// The file holds either a dataset object or an array of datasets (as
/// DICOMweb metadata responses do), in which case the first one is used.
pub fn open_record(path: &Path, dict: &Dictionary, opts: &FormatOptions) -> Result<Record, LoadError> {
    let f = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root: Value = serde_json::from_reader(BufReader::new(f)).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let malformed = |reason: &str| LoadError::Malformed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let dataset = match &root {
        Value::Object(map) => map,
        Value::Array(list) => list
            .first()
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("array does not start with a dataset object"))?,
        _ => return Err(malformed("top level is neither an object nor an array")),
    };
    if !dataset.is_empty() && dataset.keys().all(|k| Tag::from_hex(k).is_none()) {
        return Err(malformed("no attribute keys found"));
    }

    let elements = parse_dataset(dataset, dict, opts);
    info!(path = %path.display(), elements = elements.len(), "record loaded");
    Ok(Record {
        source: path.display().to_string(),
        elements,
    })
}

/// Converts one dataset object into elements sorted by tag.
pub fn parse_dataset(dataset: &Map<String, Value>, dict: &Dictionary, opts: &FormatOptions) -> Vec<Element> {
    let mut elements: Vec<Element> = dataset
        .iter()
        .filter_map(|(key, body)| {
            let Some(tag) = Tag::from_hex(key) else {
                warn!(key = %key, "skipping non-tag key");
                return None;
            };
            Some(parse_element(tag, body, dict, opts))
        })
        .collect();
    elements.sort_by_key(|e| e.tag);
    elements
}

fn parse_element(tag: Tag, body: &Value, dict: &Dictionary, opts: &FormatOptions) -> Element {
    let empty = Map::new();
    let body = body.as_object().unwrap_or(&empty);
    let vr = body
        .get("vr")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| dict.get(tag).map(|d| d.vr.clone()))
        .unwrap_or_else(|| "UN".to_string());

    let items = if vr == "SQ" {
        parse_items(tag, body, dict, opts)
    } else {
        None
    };

    // Items that failed to parse are not shown, so they are not counted either.
    let value = match &items {
        Some(items) => item_count(items.len()),
        None => format_value(&vr, body, opts),
    };

    Element {
        tag,
        name: dict.name_for(tag),
        value,
        vr,
        items,
    }
}

fn parse_items(tag: Tag, body: &Map<String, Value>, dict: &Dictionary, opts: &FormatOptions) -> Option<Vec<Item>> {
    match body.get("Value") {
        // An empty sequence omits "Value" altogether.
        None => Some(Vec::new()),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(parse_dataset(map, dict, opts)),
                    _ => {
                        warn!(tag = %tag, "skipping sequence item that is not an object");
                        None
                    }
                })
                .collect(),
        ),
        Some(_) => {
            warn!(tag = %tag, "sequence value is not an array");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_json(text: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        f
    }

    const SAMPLE: &str = r#"{
        "00100010": {"vr": "PN", "Value": [{"Alphabetic": "DOE^JOHN"}]},
        "00080060": {"vr": "CS", "Value": ["CT"]},
        "00081140": {"vr": "SQ", "Value": [
            {"00081155": {"vr": "UI", "Value": ["1.2.3.4"]}},
            {"00081155": {"vr": "UI", "Value": ["1.2.3.5"]}}
        ]},
        "7FE00010": {"vr": "OW", "BulkDataURI": "http://pacs/frames/1"}
    }"#;

    #[test]
    fn loads_sorted_elements_with_names() {
        let f = write_json(SAMPLE);
        let record = open_record(f.path(), &Dictionary::builtin(), &FormatOptions::default()).unwrap();

        let tags: Vec<String> = record.elements.iter().map(|e| e.tag.to_string()).collect();
        assert_eq!(tags, vec!["(0008,0060)", "(0008,1140)", "(0010,0010)", "(7FE0,0010)"]);
        assert_eq!(record.elements[2].name, "Patient's Name");
        assert_eq!(record.elements[2].value, "DOE^JOHN");
        assert_eq!(record.elements[3].value, "<Binary Data>");
    }

    #[test]
    fn sequences_become_items() {
        let f = write_json(SAMPLE);
        let record = open_record(f.path(), &Dictionary::builtin(), &FormatOptions::default()).unwrap();

        let seq = &record.elements[1];
        assert!(seq.is_composite());
        assert_eq!(seq.value, "2 Item(s)");
        let items = seq.items.as_ref().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1][0].value, "1.2.3.5");
    }

    #[test]
    fn dicomweb_array_uses_first_dataset() {
        let f = write_json(&format!("[{SAMPLE}]"));
        let record = open_record(f.path(), &Dictionary::builtin(), &FormatOptions::default()).unwrap();
        assert_eq!(record.elements.len(), 4);
    }

    #[test]
    fn malformed_sequence_keeps_element() {
        let f = write_json(r#"{"00400275": {"vr": "SQ", "Value": "oops"}}"#);
        let record = open_record(f.path(), &Dictionary::builtin(), &FormatOptions::default()).unwrap();

        assert!(record.elements[0].is_composite());
        assert!(record.elements[0].items.is_none());
    }

    #[test]
    fn item_count_ignores_unparsable_items() {
        let f = write_json(
            r#"{"00081140": {"vr": "SQ", "Value": [
                {"00081155": {"vr": "UI", "Value": ["1.2.3.4"]}},
                "garbage",
                {"00081155": {"vr": "UI", "Value": ["1.2.3.5"]}}
            ]}}"#,
        );
        let record = open_record(f.path(), &Dictionary::builtin(), &FormatOptions::default()).unwrap();

        let seq = &record.elements[0];
        assert_eq!(seq.items.as_ref().map(Vec::len), Some(2));
        assert_eq!(seq.value, "2 Item(s)");
    }

    #[test]
    fn load_failures() {
        let dict = Dictionary::builtin();
        let opts = FormatOptions::default();

        let missing = open_record(Path::new("/nonexistent/file.json"), &dict, &opts).unwrap_err();
        assert!(matches!(missing, LoadError::Io { .. }));

        let garbage = write_json("not json");
        assert!(matches!(open_record(garbage.path(), &dict, &opts), Err(LoadError::Json { .. })));

        let scalar = write_json("42");
        assert!(matches!(open_record(scalar.path(), &dict, &opts), Err(LoadError::Malformed { .. })));

        let wrong_keys = write_json(r#"{"name": "x"}"#);
        assert!(matches!(open_record(wrong_keys.path(), &dict, &opts), Err(LoadError::Malformed { .. })));
    }
}
