//! Spreadsheet ingestion and field-schema extraction.
//!
//! An upload is first read into a grid of cell text (`read_rows`), then the
//! grid is turned into an ordered list of fields (`extract_fields`).
//!
//! Two sheet layouts are understood:
//!
//! * **Question layout** - the header row names a label column (`label`,
//!   `question` or `field`) and a type column (`type` or `kind`), optionally
//!   `options`/`choices` and `required`. Every following row defines a field.
//! * **Header layout** - no type column. Each non-empty header cell becomes a
//!   text field, in column order.

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use crate::error::{Result, SurveyError};
use crate::field::{Field, FieldKind};

const LABEL_HEADERS: &[&str] = &["label", "question", "field"];
const KIND_HEADERS: &[&str] = &["type", "kind"];
const OPTIONS_HEADERS: &[&str] = &["options", "choices"];
const REQUIRED_HEADERS: &[&str] = &["required"];

/// File extensions accepted for upload
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"];

/// Read and extract fields from an uploaded file in one step
///
/// # Arguments
/// * `bytes` - Raw file content
/// * `filename` - Original file name, used to pick the parser
///
/// # Examples
/// ```
/// use survey::extractor::load_fields;
///
/// let csv = b"label,type,options\nName,text,\nColour,select,Red;Blue\n";
/// let fields = load_fields(csv, "questions.csv").unwrap();
/// assert_eq!(fields.len(), 2);
/// assert_eq!(fields[1].options, vec!["Red", "Blue"]);
/// ```
pub fn load_fields(bytes: &[u8], filename: &str) -> Result<Vec<Field>> {
    let rows = read_rows(bytes, filename)?;
    extract_fields(&rows)
}

/// Detect the file type from its extension and read the first sheet as text
pub fn read_rows(bytes: &[u8], filename: &str) -> Result<Vec<Vec<String>>> {
    if bytes.is_empty() {
        return Err(SurveyError::InvalidUpload("file is empty".to_string()));
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => rows_from_csv(bytes),
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext) => rows_from_workbook(bytes),
        Some(ext) => Err(SurveyError::InvalidUpload(format!(
            "unsupported file extension: {}",
            ext
        ))),
        None => Err(SurveyError::InvalidUpload("file has no extension".to_string())),
    }
}

fn rows_from_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| SurveyError::InvalidUpload(format!("could not read spreadsheet: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SurveyError::InvalidUpload("no sheets found in workbook".to_string()))?
        .map_err(|e| SurveyError::InvalidUpload(format!("could not read first sheet: {}", e)))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn rows_from_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| SurveyError::InvalidUpload(format!("could not read CSV: {}", e)))
        })
        .collect()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Whole numbers come back from Excel as floats; huge ones would
            // saturate as i64
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Derive the ordered field list from a grid of cell text
///
/// The first row is the header. Any bad row rejects the whole sheet; errors
/// carry the 1-based row number.
pub fn extract_fields(rows: &[Vec<String>]) -> Result<Vec<Field>> {
    let header = rows
        .first()
        .filter(|row| !is_blank(row))
        .ok_or_else(|| SurveyError::InvalidUpload("spreadsheet is empty".to_string()))?;

    match Columns::detect(header)? {
        Some(columns) => question_layout(rows, &columns),
        None => header_layout(header),
    }
}

/// Column positions for the question layout
struct Columns {
    label: usize,
    kind: usize,
    options: Option<usize>,
    required: Option<usize>,
}

impl Columns {
    fn detect(header: &[String]) -> Result<Option<Self>> {
        let find = |names: &[&str]| {
            header
                .iter()
                .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
        };

        let Some(kind) = find(KIND_HEADERS) else {
            return Ok(None);
        };
        let label = find(LABEL_HEADERS)
            .ok_or_else(|| SurveyError::schema(1, "a type column needs a label column"))?;

        Ok(Some(Columns {
            label,
            kind,
            options: find(OPTIONS_HEADERS),
            required: find(REQUIRED_HEADERS),
        }))
    }
}

fn question_layout(rows: &[Vec<String>], columns: &Columns) -> Result<Vec<Field>> {
    let last = rows.iter().rposition(|row| !is_blank(row)).unwrap_or(0);

    let mut fields = Vec::new();
    let mut seen = HashSet::new();

    for (idx, row) in rows.iter().enumerate().take(last + 1).skip(1) {
        let row_num = idx + 1;

        if is_blank(row) {
            return Err(SurveyError::schema(row_num, "empty row"));
        }

        let label = cell(row, columns.label);
        let kind_text = cell(row, columns.kind);
        if kind_text.is_empty() {
            return Err(SurveyError::schema(row_num, "missing field type"));
        }
        let kind: FieldKind = kind_text
            .parse()
            .map_err(|e: String| SurveyError::schema(row_num, e))?;

        let options = columns
            .options
            .map(|col| split_options(cell(row, col)))
            .unwrap_or_default();
        let required = columns
            .required
            .map(|col| is_truthy(cell(row, col)))
            .unwrap_or(false);

        let field = Field::new(label, kind, options, required)
            .map_err(|e| SurveyError::schema(row_num, e))?;

        if !seen.insert(field.label.clone()) {
            return Err(SurveyError::schema(
                row_num,
                format!("duplicate label '{}'", field.label),
            ));
        }
        fields.push(field);
    }

    if fields.is_empty() {
        return Err(SurveyError::schema(1, "the sheet defines no fields"));
    }

    Ok(fields)
}

fn header_layout(header: &[String]) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    let mut seen = HashSet::new();

    for label in header.iter().map(|h| h.trim()).filter(|h| !h.is_empty()) {
        if !seen.insert(label.to_string()) {
            return Err(SurveyError::schema(1, format!("duplicate label '{}'", label)));
        }
        fields.push(Field::text(label).map_err(|e| SurveyError::schema(1, e))?);
    }

    Ok(fields)
}

fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(|s| s.trim()).unwrap_or("")
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

fn split_options(text: &str) -> Vec<String> {
    text.split([';', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_truthy(text: &str) -> bool {
    matches!(
        text.to_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "x"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn numeric_cells_read_as_written() {
        assert_eq!(cell_text(&Data::Float(3.0)), "3");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Float(1e20)), "100000000000000000000");
        assert_eq!(cell_text(&Data::Float(-1e20)), "-100000000000000000000");
        assert_eq!(cell_text(&Data::Int(7)), "7");
    }

    #[test]
    fn question_layout_keeps_row_order() {
        let rows = grid(&[
            &["Question", "Type", "Choices", "Required"],
            &["Your name", "text", "", "yes"],
            &["Start date", "Date", "", ""],
            &["Diet", "checkbox", "Vegan; Vegetarian", ""],
            &["Team", "select", "Red;Blue\nGreen", "x"],
        ]);

        let fields = extract_fields(&rows).unwrap();
        let labels: Vec<_> = fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Your name", "Start date", "Diet", "Team"]);
        assert_eq!(fields[0].name, "your_name");
        assert!(fields[0].required);
        assert_eq!(fields[1].kind, FieldKind::Date);
        assert_eq!(fields[2].options, vec!["Vegan", "Vegetarian"]);
        assert_eq!(fields[3].options, vec!["Red", "Blue", "Green"]);
        assert!(fields[3].required);
    }

    #[test]
    fn unknown_kind_rejects_sheet() {
        let rows = grid(&[
            &["label", "type"],
            &["Name", "text"],
            &["Mood", "slider"],
        ]);

        match extract_fields(&rows) {
            Err(SurveyError::InvalidSchema { row, reason }) => {
                assert_eq!(row, 3);
                assert!(reason.contains("slider"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn interior_empty_row_rejects_sheet() {
        let rows = grid(&[
            &["label", "type"],
            &["Name", "text"],
            &["", ""],
            &["Age", "text"],
        ]);

        assert!(matches!(
            extract_fields(&rows),
            Err(SurveyError::InvalidSchema { row: 3, .. })
        ));
    }

    #[test]
    fn trailing_empty_rows_are_ignored() {
        let rows = grid(&[&["label", "type"], &["Name", "text"], &["", ""], &[" ", ""]]);

        assert_eq!(extract_fields(&rows).unwrap().len(), 1);
    }

    #[test]
    fn empty_label_and_missing_kind_are_rejected() {
        let rows = grid(&[&["label", "type"], &["", "text"]]);
        assert!(matches!(
            extract_fields(&rows),
            Err(SurveyError::InvalidSchema { row: 2, .. })
        ));

        let rows = grid(&[&["label", "type"], &["Name", ""]]);
        assert!(matches!(
            extract_fields(&rows),
            Err(SurveyError::InvalidSchema { row: 2, .. })
        ));
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let rows = grid(&[&["label", "type"], &["Name", "text"], &["Name", "date"]]);

        assert!(matches!(
            extract_fields(&rows),
            Err(SurveyError::InvalidSchema { row: 3, .. })
        ));
    }

    #[test]
    fn header_only_sheet_yields_text_fields() {
        let rows = grid(&[&["First Name", "", "Email"], &["ignored", "", "data"]]);

        let fields = extract_fields(&rows).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.iter().all(|f| f.kind == FieldKind::Text));
        assert_eq!(fields[0].name, "first_name");
    }

    #[test]
    fn header_without_questions_is_rejected() {
        let rows = grid(&[&["label", "type"]]);
        assert!(extract_fields(&rows).is_err());
        assert!(extract_fields(&[]).is_err());
    }

    #[test]
    fn type_column_needs_label_column() {
        let rows = grid(&[&["name", "type"], &["x", "text"]]);
        assert!(matches!(
            extract_fields(&rows),
            Err(SurveyError::InvalidSchema { row: 1, .. })
        ));
    }

    #[test]
    fn unsupported_extension_is_an_upload_error() {
        assert!(matches!(
            read_rows(b"hello", "notes.txt"),
            Err(SurveyError::InvalidUpload(_))
        ));
        assert!(matches!(
            read_rows(b"hello", "noext"),
            Err(SurveyError::InvalidUpload(_))
        ));
        assert!(matches!(
            read_rows(b"", "empty.xlsx"),
            Err(SurveyError::InvalidUpload(_))
        ));
    }

    #[test]
    fn garbage_workbook_is_an_upload_error() {
        assert!(matches!(
            read_rows(b"definitely not a zip file", "survey.xlsx"),
            Err(SurveyError::InvalidUpload(_))
        ));
    }
}
