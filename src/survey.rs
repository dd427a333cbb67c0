use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Result, SurveyError};
use crate::field::Field;

/// Longest answer accepted, in characters; Excel cells cannot hold more
pub const MAX_ANSWER_CHARS: usize = 32_767;

/// A survey built from one uploaded spreadsheet
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Survey {
    pub id: String,
    pub title: String,

    /// Username of the uploader, if they were logged in
    pub owner: Option<String>,

    /// Fields in display order
    pub fields: Vec<Field>,

    pub created_at: DateTime<Utc>,
}

/// One respondent's complete set of answers
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Response {
    pub survey_id: String,

    /// Field label to submitted text
    pub answers: BTreeMap<String, String>,

    pub submitted_at: DateTime<Utc>,
}

/// Row of an owner's survey index (`list.json`)
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SurveyEntry {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Survey {
    pub fn new(title: &str, owner: Option<String>, fields: Vec<Field>) -> Self {
        Survey {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            owner,
            fields,
            created_at: Utc::now(),
        }
    }

    pub fn field(&self, label: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.label == label)
    }

    /// Column headers used when exporting responses
    pub fn labels(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.label.as_str()).collect()
    }

    pub fn entry(&self) -> SurveyEntry {
        SurveyEntry {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
        }
    }

    /// Turn a submitted JSON object into a response for this survey
    ///
    /// Keys must be field labels. Fields missing from the body are recorded
    /// as empty text, arrays (multi-checkbox answers) are joined with `"; "`.
    ///
    /// # Arguments
    /// * `body` - The submitted JSON object, keyed by field label
    ///
    /// # Returns
    /// The response to store, or `InvalidSubmission` for unknown keys,
    /// nested values, or answers longer than [`MAX_ANSWER_CHARS`]
    pub fn build_response(&self, body: &serde_json::Map<String, Value>) -> Result<Response> {
        if let Some(unknown) = body.keys().find(|key| self.field(key).is_none()) {
            return Err(SurveyError::InvalidSubmission(format!(
                "'{}' is not a field of this survey",
                unknown
            )));
        }

        let mut answers = BTreeMap::new();
        for field in &self.fields {
            let value = match body.get(&field.label) {
                Some(value) => answer_text(value).ok_or_else(|| {
                    SurveyError::InvalidSubmission(format!(
                        "unsupported value for '{}'",
                        field.label
                    ))
                })?,
                None => String::new(),
            };
            if value.chars().count() > MAX_ANSWER_CHARS {
                return Err(SurveyError::InvalidSubmission(format!(
                    "answer to '{}' is longer than {} characters",
                    field.label, MAX_ANSWER_CHARS
                )));
            }
            answers.insert(field.label.clone(), value);
        }

        Ok(Response {
            survey_id: self.id.clone(),
            answers,
            submitted_at: Utc::now(),
        })
    }
}

impl Response {
    /// Answers in the survey's field order, for one export row
    pub fn row<'a>(&'a self, survey: &Survey) -> Vec<&'a str> {
        survey
            .fields
            .iter()
            .map(|f| self.answers.get(&f.label).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

fn answer_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| match item {
                    Value::Array(_) | Value::Object(_) => None,
                    scalar => answer_text(scalar),
                })
                .collect::<Option<Vec<_>>>()?;
            Some(parts.join("; "))
        }
        Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;
    use serde_json::json;

    fn sample() -> Survey {
        Survey::new(
            "Team lunch",
            None,
            vec![
                Field::text("Name").unwrap(),
                Field::new(
                    "Days",
                    FieldKind::Checkbox,
                    vec!["Mon".into(), "Tue".into()],
                    false,
                )
                .unwrap(),
            ],
        )
    }

    #[test]
    fn missing_fields_become_empty() {
        let survey = sample();
        let body = json!({ "Name": "Ada" });
        let response = survey.build_response(body.as_object().unwrap()).unwrap();

        assert_eq!(response.answers["Name"], "Ada");
        assert_eq!(response.answers["Days"], "");
        assert_eq!(response.row(&survey), vec!["Ada", ""]);
    }

    #[test]
    fn arrays_are_joined() {
        let survey = sample();
        let body = json!({ "Name": "Ada", "Days": ["Mon", "Tue"] });
        let response = survey.build_response(body.as_object().unwrap()).unwrap();

        assert_eq!(response.answers["Days"], "Mon; Tue");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let survey = sample();
        let body = json!({ "Nickname": "A" });
        let err = survey.build_response(body.as_object().unwrap()).unwrap_err();

        assert!(matches!(err, SurveyError::InvalidSubmission(_)));
    }

    #[test]
    fn answers_must_fit_in_a_cell() {
        let survey = sample();

        let longest = json!({ "Name": "x".repeat(MAX_ANSWER_CHARS) });
        assert!(survey.build_response(longest.as_object().unwrap()).is_ok());

        let too_long = json!({ "Name": "x".repeat(MAX_ANSWER_CHARS + 1) });
        assert!(matches!(
            survey.build_response(too_long.as_object().unwrap()),
            Err(SurveyError::InvalidSubmission(_))
        ));
    }

    #[test]
    fn nested_objects_are_rejected() {
        let survey = sample();
        let body = json!({ "Name": { "first": "Ada" } });

        assert!(survey.build_response(body.as_object().unwrap()).is_err());
    }
}
