use crate::error::{Result, SurveyError};
use crate::survey::{Response, Survey};

/// Supported export formats for collected responses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// Parse a `?format=` value; anything other than csv/xlsx is `None`
    pub fn from_query(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// Render responses in the requested format
pub fn export(survey: &Survey, responses: &[Response], format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => to_csv(survey, responses),
        ExportFormat::Xlsx => to_xlsx(survey, responses),
    }
}

/// Convert responses to CSV
///
/// The header row holds the field labels in display order, followed by one
/// row per response in submission order.
///
/// # Examples
/// ```
/// use survey::downloader::to_csv;
/// use survey::field::Field;
/// use survey::survey::Survey;
///
/// let survey = Survey::new("Demo", None, vec![Field::text("Name").unwrap()]);
/// let csv = to_csv(&survey, &[]).unwrap();
/// assert_eq!(String::from_utf8(csv).unwrap(), "Name\n");
/// ```
pub fn to_csv(survey: &Survey, responses: &[Response]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(survey.labels()).map_err(csv_error)?;
    for response in responses {
        writer.write_record(response.row(survey)).map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| SurveyError::Storage(e.to_string()))
}

/// Convert responses to XLSX using rust_xlsxwriter
///
/// Same layout as [`to_csv`], on a sheet named `Responses`.
#[cfg(feature = "web")]
pub fn to_xlsx(survey: &Survey, responses: &[Response]) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Responses").map_err(xlsx_error)?;

    for (c, label) in survey.labels().iter().enumerate() {
        worksheet
            .write_string(0, c as u16, *label)
            .map_err(xlsx_error)?;
    }

    for (r, response) in responses.iter().enumerate() {
        for (c, value) in response.row(survey).iter().enumerate() {
            worksheet
                .write_string((r + 1) as u32, c as u16, *value)
                .map_err(xlsx_error)?;
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().map_err(xlsx_error)
}

#[cfg(not(feature = "web"))]
pub fn to_xlsx(_survey: &Survey, _responses: &[Response]) -> Result<Vec<u8>> {
    Err(SurveyError::Storage(
        "XLSX export requires the 'web' feature".to_string(),
    ))
}

fn csv_error(e: csv::Error) -> SurveyError {
    SurveyError::Storage(format!("CSV export failed: {}", e))
}

#[cfg(feature = "web")]
fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> SurveyError {
    SurveyError::Storage(format!("XLSX export failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use serde_json::json;

    #[test]
    fn csv_has_header_and_one_row_per_response() {
        let survey = Survey::new(
            "Demo",
            None,
            vec![Field::text("Name").unwrap(), Field::text("Note").unwrap()],
        );
        let first = survey
            .build_response(json!({"Name": "Ada", "Note": "hi, there"}).as_object().unwrap())
            .unwrap();
        let second = survey
            .build_response(json!({"Name": "Bob"}).as_object().unwrap())
            .unwrap();

        let csv = String::from_utf8(to_csv(&survey, &[first, second]).unwrap()).unwrap();
        assert_eq!(csv, "Name,Note\nAda,\"hi, there\"\nBob,\n");
    }

    #[test]
    fn format_query_parsing() {
        assert_eq!(ExportFormat::from_query("CSV"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_query("xlsx"), Some(ExportFormat::Xlsx));
        assert_eq!(ExportFormat::from_query("pdf"), None);
    }
}
