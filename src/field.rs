use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of input a field renders as
///
/// This is a closed set: a sheet naming any other kind is rejected at upload.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text input
    Text,

    /// Calendar date (`<input type="date">`)
    Date,

    /// One checkbox per option, or a single yes/no box when there are none
    Checkbox,

    /// Drop-down with a fixed list of options
    Select,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Date => "date",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select => "select",
        }
    }

    /// Whether the kind takes its values from `Field::options`
    pub fn uses_options(&self) -> bool {
        matches!(self, FieldKind::Checkbox | FieldKind::Select)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(FieldKind::Text),
            "date" => Ok(FieldKind::Date),
            "checkbox" => Ok(FieldKind::Checkbox),
            "select" => Ok(FieldKind::Select),
            other => Err(format!(
                "unknown field type '{}' (expected text, date, checkbox or select)",
                other
            )),
        }
    }
}

/// One input definition within a survey
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Field {
    /// Question text shown to the respondent; also the response key
    pub label: String,

    /// HTML-safe form name derived from the label
    pub name: String,

    pub kind: FieldKind,

    /// Ordered choices, only meaningful for checkbox and select
    pub options: Vec<String>,

    /// Rendered as the HTML `required` attribute
    pub required: bool,
}

impl Field {
    /// Build a field, enforcing the label and option invariants
    ///
    /// Options given to kinds that do not use them are dropped.
    pub fn new(
        label: &str,
        kind: FieldKind,
        options: Vec<String>,
        required: bool,
    ) -> Result<Self, String> {
        let label = label.trim();
        if label.is_empty() {
            return Err("field label cannot be empty".to_string());
        }

        let options = if kind.uses_options() {
            options
        } else {
            Vec::new()
        };

        if kind == FieldKind::Select && options.is_empty() {
            return Err(format!("select field '{}' has no options", label));
        }

        Ok(Field {
            label: label.to_string(),
            name: field_name(label),
            kind,
            options,
            required,
        })
    }

    /// A plain text field, as produced by header-only sheets
    pub fn text(label: &str) -> Result<Self, String> {
        Field::new(label, FieldKind::Text, Vec::new(), false)
    }
}

/// Turn a label into a simple form name: lowercase, whitespace runs become `_`
pub fn field_name(label: &str) -> String {
    label
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing_is_case_insensitive() {
        assert_eq!("Text".parse::<FieldKind>(), Ok(FieldKind::Text));
        assert_eq!(" DATE ".parse::<FieldKind>(), Ok(FieldKind::Date));
        assert_eq!("checkbox".parse::<FieldKind>(), Ok(FieldKind::Checkbox));
        assert_eq!("Select".parse::<FieldKind>(), Ok(FieldKind::Select));
        assert!("radio".parse::<FieldKind>().is_err());
        assert!("".parse::<FieldKind>().is_err());
    }

    #[test]
    fn field_name_slugs_label() {
        assert_eq!(field_name("Favourite  Colour"), "favourite_colour");
        assert_eq!(field_name("Age"), "age");
    }

    #[test]
    fn select_needs_options() {
        assert!(Field::new("Pick one", FieldKind::Select, Vec::new(), false).is_err());

        let field = Field::new(
            "Pick one",
            FieldKind::Select,
            vec!["a".to_string(), "b".to_string()],
            true,
        )
        .unwrap();
        assert_eq!(field.options, vec!["a", "b"]);
        assert!(field.required);
    }

    #[test]
    fn text_field_drops_options() {
        let field = Field::new("Name", FieldKind::Text, vec!["x".to_string()], false).unwrap();
        assert!(field.options.is_empty());
    }

    #[test]
    fn blank_label_is_rejected() {
        assert!(Field::text("   ").is_err());
    }
}
