//! Manifest entries and the manifest CSV format.
//!
//! ```text
//! Id,Type,Path,UpdatedOn,Version,AssetBundleName,AssetBundlePersistent
//! mech_def_1,MechDef,data/mech/mech_def_1.json,2024-03-01T10:15:00Z,1,,False
//! ```
//!
//! Empty cells are absent values. Cells containing commas or quotes are
//! double-quoted, with embedded quotes doubled.

use crate::error::{Error, Result};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use hangar_core::fs::has_extension;

pub const CSV_HEADER: &str = "Id,Type,Path,UpdatedOn,Version,AssetBundleName,AssetBundlePersistent";

/// Extensions of resources that are also indexed by id alone.
const STRING_RESOURCE_EXTENSIONS: [&str; 3] = ["json", "txt", "csv"];

/// Descriptor of one game resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestEntry {
    pub id: String,
    pub kind: String,
    pub path: String,
    pub updated_on: Option<DateTime<Utc>>,
    pub revision: Option<String>,
    pub asset_bundle_name: Option<String>,
    pub asset_bundle_persistent: bool,
}

impl ManifestEntry {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Whether the resource is a text document (`.json`, `.txt`, `.csv`).
    pub fn is_string_resource(&self) -> bool {
        !self.path.is_empty()
            && STRING_RESOURCE_EXTENSIONS
                .iter()
                .any(|ext| has_extension(&self.path, ext))
    }

    fn to_csv_row(&self) -> String {
        let updated_on = self
            .updated_on
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
            .unwrap_or_default();
        let persistent = if self.asset_bundle_persistent { "True" } else { "False" };
        [
            self.id.as_str(),
            self.kind.as_str(),
            self.path.as_str(),
            updated_on.as_str(),
            self.revision.as_deref().unwrap_or(""),
            self.asset_bundle_name.as_deref().unwrap_or(""),
            persistent,
        ]
        .iter()
        .map(|cell| quote_cell(cell))
        .collect::<Vec<_>>()
        .join(",")
    }

    fn from_csv_row(cells: &[String], line: usize) -> Result<Self> {
        let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");
        let optional = |i: usize| Some(cell(i)).filter(|s| !s.is_empty()).map(str::to_string);

        let id = cell(0);
        let kind = cell(1);
        if id.is_empty() || kind.is_empty() {
            return Err(Error::InvalidRow {
                line,
                message: "missing id or type".to_string(),
            });
        }

        let updated_on = match cell(3) {
            "" => None,
            raw => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| Error::InvalidRow {
                        line,
                        message: format!("invalid UpdatedOn '{raw}': {e}"),
                    })?
                    .with_timezone(&Utc),
            ),
        };

        Ok(Self {
            id: id.to_string(),
            kind: kind.to_string(),
            path: cell(2).to_string(),
            updated_on,
            revision: optional(4),
            asset_bundle_name: optional(5),
            asset_bundle_persistent: cell(6).eq_ignore_ascii_case("true"),
        })
    }
}

fn quote_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn split_row(row: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = row.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

/// Parses manifest CSV text. A leading header row is skipped.
pub fn parse_manifest_csv(content: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for (index, row) in content.lines().enumerate() {
        let row = row.trim_end_matches('\r');
        if row.trim().is_empty() {
            continue;
        }
        if index == 0 && row.starts_with("Id,") {
            continue;
        }
        entries.push(ManifestEntry::from_csv_row(&split_row(row), index + 1)?);
    }
    Ok(entries)
}

pub fn read_manifest_csv(path: &Utf8Path) -> Result<Vec<ManifestEntry>> {
    let content = std::fs::read_to_string(path)?;
    parse_manifest_csv(&content)
}

/// Renders entries as manifest CSV, header included.
pub fn to_manifest_csv<'a>(entries: impl IntoIterator<Item = &'a ManifestEntry>) -> String {
    let mut content = String::from(CSV_HEADER);
    content.push('\n');
    for entry in entries {
        content.push_str(&entry.to_csv_row());
        content.push('\n');
    }
    content
}

pub fn write_manifest_csv<'a>(
    path: &Utf8Path,
    entries: impl IntoIterator<Item = &'a ManifestEntry>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_manifest_csv(entries))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rows() {
        let csv = "Id,Type,Path,UpdatedOn,Version,AssetBundleName,AssetBundlePersistent\n\
                   mech_def_1,MechDef,data/mech/mech_def_1.json,2024-03-01T10:15:00Z,1,,False\n\
                   \n\
                   \"odd,id\",Texture,,,,bundle_a,True\r\n";
        let entries = parse_manifest_csv(csv).unwrap();
        assert_eq!(entries.len(), 2);

        let mech = &entries[0];
        assert_eq!(mech.kind, "MechDef");
        assert_eq!(
            mech.updated_on,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap())
        );
        assert_eq!(mech.revision.as_deref(), Some("1"));
        assert!(mech.asset_bundle_name.is_none());
        assert!(mech.is_string_resource());

        let texture = &entries[1];
        assert_eq!(texture.id, "odd,id");
        assert_eq!(texture.asset_bundle_name.as_deref(), Some("bundle_a"));
        assert!(texture.asset_bundle_persistent);
        assert!(!texture.is_string_resource());
    }

    #[test]
    fn test_write_then_parse() {
        let mut entry = ManifestEntry::new("say \"hi\"", "Text", "data/text.txt");
        entry.updated_on = Some(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap());
        let csv = to_manifest_csv([&entry]);
        assert!(csv.starts_with(CSV_HEADER));
        assert_eq!(parse_manifest_csv(&csv).unwrap(), vec![entry]);
    }

    #[test]
    fn test_invalid_rows() {
        assert!(matches!(
            parse_manifest_csv(",MechDef,x.json"),
            Err(Error::InvalidRow { line: 1, .. })
        ));
        assert!(parse_manifest_csv("a,MechDef,x.json,yesterday").is_err());
    }
}
