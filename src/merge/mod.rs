//! Merge fields: map spreadsheet columns to directory profile attributes.
//!
//! The spreadsheet itself is parsed elsewhere; this module receives header and
//! row strings, derives one [`MergeField`] per column and renders the CSV that
//! the bulk import consumes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One spreadsheet column and the profile attribute it populates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeField {
    pub original_name: String,
    pub field_id: String,
    pub sample_value: String,
    pub column_index: usize,
    pub is_primary_key: bool,
    /// Template placeholder, e.g. `{{user.profile.region}}`
    pub merge_code: String,
}

/// Lowercase and keep only `[a-z0-9]`.
pub fn sanitize_field_id(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Derive merge fields from headers and rows.
///
/// Column 0 is the primary key and always maps to `primary_key_field`. Other
/// columns are sanitized and, when `date_stamp` is given, suffixed with it.
/// Blank headers are skipped but keep their column index.
pub fn derive_merge_fields(
    headers: &[String],
    rows: &[Vec<String>],
    primary_key_field: &str,
    date_stamp: Option<&str>,
) -> Vec<MergeField> {
    let stamp = date_stamp
        .map(sanitize_field_id)
        .filter(|stamp| !stamp.is_empty());

    headers
        .iter()
        .enumerate()
        .filter_map(|(index, header)| {
            let original_name = header.trim();
            if original_name.is_empty() {
                return None;
            }

            let is_primary_key = index == 0;
            let field_id = if is_primary_key {
                primary_key_field.to_string()
            } else {
                let base = sanitize_field_id(original_name);
                match &stamp {
                    Some(stamp) => format!("{}_{}", base, stamp),
                    None => base,
                }
            };

            let sample_value = rows
                .first()
                .and_then(|row| row.get(index))
                .cloned()
                .unwrap_or_default();

            Some(MergeField {
                original_name: original_name.to_string(),
                merge_code: format!("{{{{user.profile.{}}}}}", field_id),
                field_id,
                sample_value,
                column_index: index,
                is_primary_key,
            })
        })
        .collect()
}

/// Render rows as CSV using the fields' ids as the header line.
pub fn build_csv(fields: &[MergeField], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        fields
            .iter()
            .map(|field| escape_cell(&field.field_id))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(
            fields
                .iter()
                .map(|field| {
                    row.get(field.column_index)
                        .map(|value| escape_cell(value))
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// Identity mapping for every non-primary field, as the import config expects.
pub fn field_mappings(fields: &[MergeField]) -> BTreeMap<String, String> {
    fields
        .iter()
        .filter(|field| !field.is_primary_key)
        .map(|field| (field.field_id.clone(), field.field_id.clone()))
        .collect()
}

fn escape_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_sanitize_field_id() {
        assert_eq!(sanitize_field_id("Store Manager (Name)"), "storemanagername");
        assert_eq!(sanitize_field_id("Q3 Sales $"), "q3sales");
        assert_eq!(sanitize_field_id("Ünïcode"), "ncode");
    }

    #[test]
    fn test_primary_key_is_exempt_from_suffix() {
        let headers = strings(&["Store #", "Region", "Open Date"]);
        let rows = vec![strings(&["100", "North", "1/2/2026"])];

        let fields = derive_merge_fields(&headers, &rows, "storeid", Some("2026-10"));

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].field_id, "storeid");
        assert!(fields[0].is_primary_key);
        assert_eq!(fields[1].field_id, "region_202610");
        assert_eq!(fields[2].field_id, "opendate_202610");
        assert_eq!(fields[1].sample_value, "North");
        assert_eq!(fields[1].merge_code, "{{user.profile.region_202610}}");
    }

    #[test]
    fn test_blank_headers_skipped_but_indices_kept() {
        let headers = strings(&["Store", "", "Region"]);
        let rows = vec![strings(&["100", "x", "South"])];

        let fields = derive_merge_fields(&headers, &rows, "storeid", None);

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].field_id, "region");
        assert_eq!(fields[1].column_index, 2);
        assert_eq!(fields[1].sample_value, "South");
    }

    #[test]
    fn test_missing_first_row_gives_empty_samples() {
        let fields = derive_merge_fields(&strings(&["Store", "Region"]), &[], "storeid", None);
        assert!(fields.iter().all(|f| f.sample_value.is_empty()));
    }

    #[test]
    fn test_build_csv_escapes_cells() {
        let headers = strings(&["Store", "Note"]);
        let rows = vec![
            strings(&["100", "plain"]),
            strings(&["200", "has, comma"]),
            strings(&["300", "say \"hi\""]),
            strings(&["400"]),
        ];
        let fields = derive_merge_fields(&headers, &rows, "storeid", None);

        let csv = build_csv(&fields, &rows);

        assert_eq!(
            csv,
            "storeid,note\n100,plain\n200,\"has, comma\"\n300,\"say \"\"hi\"\"\"\n400,"
        );
    }

    #[test]
    fn test_field_mappings_exclude_primary_key() {
        let headers = strings(&["Store", "Region", "District"]);
        let fields = derive_merge_fields(&headers, &[], "storeid", None);

        let mappings = field_mappings(&fields);

        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings.get("region").map(String::as_str), Some("region"));
        assert!(!mappings.contains_key("storeid"));
    }
}
