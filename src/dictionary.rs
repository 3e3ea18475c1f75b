//! Attribute names for tags.
//!
//! A built-in table covers the attributes most headers carry. A full table
//! can be merged in from a locally downloaded `attributes.json` in the
//! innolitics `dicom-standard` layout.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::info;

use crate::error::LoadError;
use crate::types::Tag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictEntry {
    pub name: String,
    pub vr: String,
}

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<Tag, DictEntry>,
}

const BUILTIN: &[(u16, u16, &str, &str)] = &[
    (0x0002, 0x0001, "File Meta Information Version", "OB"),
    (0x0002, 0x0002, "Media Storage SOP Class UID", "UI"),
    (0x0002, 0x0003, "Media Storage SOP Instance UID", "UI"),
    (0x0002, 0x0010, "Transfer Syntax UID", "UI"),
    (0x0002, 0x0012, "Implementation Class UID", "UI"),
    (0x0008, 0x0005, "Specific Character Set", "CS"),
    (0x0008, 0x0008, "Image Type", "CS"),
    (0x0008, 0x0012, "Instance Creation Date", "DA"),
    (0x0008, 0x0013, "Instance Creation Time", "TM"),
    (0x0008, 0x0016, "SOP Class UID", "UI"),
    (0x0008, 0x0018, "SOP Instance UID", "UI"),
    (0x0008, 0x0020, "Study Date", "DA"),
    (0x0008, 0x0021, "Series Date", "DA"),
    (0x0008, 0x0022, "Acquisition Date", "DA"),
    (0x0008, 0x0023, "Content Date", "DA"),
    (0x0008, 0x0030, "Study Time", "TM"),
    (0x0008, 0x0031, "Series Time", "TM"),
    (0x0008, 0x0032, "Acquisition Time", "TM"),
    (0x0008, 0x0033, "Content Time", "TM"),
    (0x0008, 0x0050, "Accession Number", "SH"),
    (0x0008, 0x0060, "Modality", "CS"),
    (0x0008, 0x0064, "Conversion Type", "CS"),
    (0x0008, 0x0070, "Manufacturer", "LO"),
    (0x0008, 0x0080, "Institution Name", "LO"),
    (0x0008, 0x0090, "Referring Physician's Name", "PN"),
    (0x0008, 0x1010, "Station Name", "SH"),
    (0x0008, 0x1030, "Study Description", "LO"),
    (0x0008, 0x103E, "Series Description", "LO"),
    (0x0008, 0x1090, "Manufacturer's Model Name", "LO"),
    (0x0008, 0x1110, "Referenced Study Sequence", "SQ"),
    (0x0008, 0x1111, "Referenced Performed Procedure Step Sequence", "SQ"),
    (0x0008, 0x1140, "Referenced Image Sequence", "SQ"),
    (0x0008, 0x1150, "Referenced SOP Class UID", "UI"),
    (0x0008, 0x1155, "Referenced SOP Instance UID", "UI"),
    (0x0008, 0x2112, "Source Image Sequence", "SQ"),
    (0x0010, 0x0010, "Patient's Name", "PN"),
    (0x0010, 0x0020, "Patient ID", "LO"),
    (0x0010, 0x0030, "Patient's Birth Date", "DA"),
    (0x0010, 0x0040, "Patient's Sex", "CS"),
    (0x0010, 0x1010, "Patient's Age", "AS"),
    (0x0010, 0x1020, "Patient's Size", "DS"),
    (0x0010, 0x1030, "Patient's Weight", "DS"),
    (0x0018, 0x0015, "Body Part Examined", "CS"),
    (0x0018, 0x0050, "Slice Thickness", "DS"),
    (0x0018, 0x0060, "KVP", "DS"),
    (0x0018, 0x0088, "Spacing Between Slices", "DS"),
    (0x0018, 0x1020, "Software Versions", "LO"),
    (0x0018, 0x1030, "Protocol Name", "LO"),
    (0x0018, 0x1150, "Exposure Time", "IS"),
    (0x0018, 0x1151, "X-Ray Tube Current", "IS"),
    (0x0018, 0x5100, "Patient Position", "CS"),
    (0x0020, 0x000D, "Study Instance UID", "UI"),
    (0x0020, 0x000E, "Series Instance UID", "UI"),
    (0x0020, 0x0010, "Study ID", "SH"),
    (0x0020, 0x0011, "Series Number", "IS"),
    (0x0020, 0x0012, "Acquisition Number", "IS"),
    (0x0020, 0x0013, "Instance Number", "IS"),
    (0x0020, 0x0032, "Image Position (Patient)", "DS"),
    (0x0020, 0x0037, "Image Orientation (Patient)", "DS"),
    (0x0020, 0x0052, "Frame of Reference UID", "UI"),
    (0x0020, 0x1041, "Slice Location", "DS"),
    (0x0028, 0x0002, "Samples per Pixel", "US"),
    (0x0028, 0x0004, "Photometric Interpretation", "CS"),
    (0x0028, 0x0008, "Number of Frames", "IS"),
    (0x0028, 0x0010, "Rows", "US"),
    (0x0028, 0x0011, "Columns", "US"),
    (0x0028, 0x0030, "Pixel Spacing", "DS"),
    (0x0028, 0x0100, "Bits Allocated", "US"),
    (0x0028, 0x0101, "Bits Stored", "US"),
    (0x0028, 0x0102, "High Bit", "US"),
    (0x0028, 0x0103, "Pixel Representation", "US"),
    (0x0028, 0x1050, "Window Center", "DS"),
    (0x0028, 0x1051, "Window Width", "DS"),
    (0x0028, 0x1052, "Rescale Intercept", "DS"),
    (0x0028, 0x1053, "Rescale Slope", "DS"),
    (0x0032, 0x1060, "Requested Procedure Description", "LO"),
    (0x0040, 0x0244, "Performed Procedure Step Start Date", "DA"),
    (0x0040, 0x0245, "Performed Procedure Step Start Time", "TM"),
    (0x0040, 0x0275, "Request Attributes Sequence", "SQ"),
    (0x0040, 0xA730, "Content Sequence", "SQ"),
    (0x7FE0, 0x0010, "Pixel Data", "OW"),
];

static BUILTIN_DICTIONARY: Lazy<Dictionary> = Lazy::new(|| {
    let entries = BUILTIN
        .iter()
        .map(|&(group, element, name, vr)| {
            (
                Tag::new(group, element),
                DictEntry {
                    name: name.to_string(),
                    vr: vr.to_string(),
                },
            )
        })
        .collect();
    Dictionary { entries }
});

/// One row of innolitics `attributes.json`; unused columns are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeRow {
    tag: String,
    name: String,
    #[serde(default)]
    value_representation: String,
}

impl Dictionary {
    pub fn builtin() -> Self {
        BUILTIN_DICTIONARY.clone()
    }

    /// Built-in table overlaid with the rows of an `attributes.json` file.
    pub fn with_attributes_file(path: &Path) -> Result<Self, LoadError> {
        let f = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rows: Vec<AttributeRow> =
            serde_json::from_reader(BufReader::new(f)).map_err(|source| LoadError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let mut dict = Self::builtin();
        let mut added = 0usize;
        for row in rows {
            // Repeating groups such as (60xx,3000) have no single tag.
            let Some(tag) = Tag::from_paren(&row.tag) else { continue };
            if row.name.is_empty() {
                continue;
            }
            dict.entries.insert(
                tag,
                DictEntry {
                    name: row.name,
                    vr: row.value_representation,
                },
            );
            added += 1;
        }
        info!(path = %path.display(), added, "loaded attribute dictionary");
        Ok(dict)
    }

    pub fn get(&self, tag: Tag) -> Option<&DictEntry> {
        self.entries.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name_for(&self, tag: Tag) -> String {
        if let Some(entry) = self.get(tag) {
            return entry.name.clone();
        }
        if tag.element == 0x0000 {
            "Group Length".into()
        } else if tag.is_private() {
            "Private tag data".into()
        } else {
            "Unknown Tag".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_names() {
        let dict = Dictionary::builtin();
        assert_eq!(dict.name_for(Tag::new(0x0010, 0x0010)), "Patient's Name");
        assert_eq!(dict.get(Tag::new(0x0008, 0x1140)).unwrap().vr, "SQ");
    }

    #[test]
    fn fallback_names() {
        let dict = Dictionary::builtin();
        assert_eq!(dict.name_for(Tag::new(0x0009, 0x1001)), "Private tag data");
        assert_eq!(dict.name_for(Tag::new(0x0018, 0x0000)), "Group Length");
        assert_eq!(dict.name_for(Tag::new(0x0018, 0x9999)), "Unknown Tag");
    }

    #[test]
    fn attributes_file_overlays_builtin() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"tag": "(0018,9073)", "name": "Acquisition Duration", "keyword": "AcquisitionDuration", "valueRepresentation": "FD"}},
                {{"tag": "(60xx,3000)", "name": "Overlay Data", "valueRepresentation": "OB"}}
            ]"#
        )
        .unwrap();

        let dict = Dictionary::with_attributes_file(file.path()).unwrap();
        assert_eq!(dict.name_for(Tag::new(0x0018, 0x9073)), "Acquisition Duration");
        assert_eq!(dict.len(), Dictionary::builtin().len() + 1);
    }

    #[test]
    fn missing_attributes_file_is_a_load_error() {
        let err = Dictionary::with_attributes_file(Path::new("/nonexistent/attributes.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
