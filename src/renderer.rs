//! Server-side HTML rendering with handlebars.
//!
//! Templates are compiled into the binary and registered once at startup.
//! Handlebars escapes every `{{value}}`, so labels and options taken from an
//! uploaded sheet are safe to interpolate.

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::error::{Result, SurveyError};
use crate::field::{Field, FieldKind};
use crate::login::PageMessage;
use crate::survey::{Survey, SurveyEntry};

const TEMPLATES: &[(&str, &str)] = &[
    ("layout", include_str!("./static/layout.hbs")),
    ("index", include_str!("./static/index.hbs")),
    ("survey", include_str!("./static/survey.hbs")),
    ("auth", include_str!("./static/auth.hbs")),
    ("dashboard", include_str!("./static/dashboard.hbs")),
    ("message", include_str!("./static/message.hbs")),
];

pub struct Renderer {
    registry: Handlebars<'static>,
}

/// Per-field view model; flags keep the template free of comparisons
#[derive(Serialize)]
struct FieldView<'a> {
    index: usize,
    label: &'a str,
    name: &'a str,
    kind: &'static str,
    options: &'a [String],
    required: bool,
    is_text: bool,
    is_date: bool,
    is_select: bool,
    is_checkbox_group: bool,
    is_checkbox_single: bool,
}

impl<'a> FieldView<'a> {
    fn new(index: usize, field: &'a Field) -> Self {
        let checkbox = field.kind == FieldKind::Checkbox;
        FieldView {
            index,
            label: &field.label,
            name: &field.name,
            kind: field.kind.as_str(),
            options: &field.options,
            required: field.required,
            is_text: field.kind == FieldKind::Text,
            is_date: field.kind == FieldKind::Date,
            is_select: field.kind == FieldKind::Select,
            is_checkbox_group: checkbox && !field.options.is_empty(),
            is_checkbox_single: checkbox && field.options.is_empty(),
        }
    }
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        for (name, source) in TEMPLATES {
            registry
                .register_template_string(name, *source)
                .map_err(|e| SurveyError::Storage(format!("template '{}': {}", name, e)))?;
        }

        Ok(Renderer { registry })
    }

    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String> {
        self.registry
            .render(name, data)
            .map_err(|e| SurveyError::Storage(format!("rendering '{}' failed: {}", name, e)))
    }

    /// Landing page with the upload form
    pub fn index(&self, user: Option<&str>) -> Result<String> {
        self.render("index", &json!({ "title": "Survey Sheets", "user": user }))
    }

    /// The respondent-facing form, one input per field in stored order
    ///
    /// # Arguments
    /// * `survey` - The survey to render
    ///
    /// # Returns
    /// The complete HTML page. Each field is a `.survey-field` block carrying
    /// its label in `data-label`, which the client posts back as the answer key.
    pub fn survey_form(&self, survey: &Survey) -> Result<String> {
        let fields: Vec<FieldView> = survey
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| FieldView::new(i, f))
            .collect();

        self.render(
            "survey",
            &json!({
                "title": survey.title,
                "survey_id": survey.id,
                "fields": fields,
            }),
        )
    }

    /// Login or signup form (`mode` is `"login"` or `"signup"`)
    pub fn auth_page(&self, mode: &str, message: &PageMessage) -> Result<String> {
        let signup = mode == "signup";
        self.render(
            "auth",
            &json!({
                "title": if signup { "Sign up" } else { "Log in" },
                "signup": signup,
                "error": message.error,
                "notice": message.notice,
            }),
        )
    }

    /// List a user's surveys with share, download and delete actions
    ///
    /// # Arguments
    /// * `user` - The logged-in username
    /// * `surveys` - Entries from the owner index
    /// * `base_url` - Prefix for the share links shown next to each survey
    pub fn dashboard(&self, user: &str, surveys: &[SurveyEntry], base_url: &str) -> Result<String> {
        let rows: Vec<_> = surveys
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "title": entry.title,
                    "created": entry.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                    "url": format!("{}/survey/{}", base_url, entry.id),
                })
            })
            .collect();

        self.render(
            "dashboard",
            &json!({ "title": "My surveys", "user": user, "surveys": rows }),
        )
    }

    /// Plain message page, used for "not found" and similar
    pub fn message(&self, heading: &str, text: &str) -> Result<String> {
        self.render(
            "message",
            &json!({ "title": heading, "heading": heading, "text": text }),
        )
    }
}
