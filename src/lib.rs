/*!
# Survey Sheets

A web application that builds surveys from spreadsheets, written in Rust.

## Overview

A user uploads a spreadsheet describing questions. The backend turns each
question row into a form field, stores the survey and hands back a shareable
link. Respondents fill in the rendered form, every submission is stored as
one response, and the owner can download all responses as a spreadsheet
again.

## Architecture

### Frontend Layer
- **Technologies**: HTML (handlebars templates), CSS, plain JavaScript
- **Key Components**:
  - Upload form and share modal with copy-to-clipboard
  - Share-by-email form, validated before any request is made
  - Survey form that posts answers as JSON
  - Dismissible notification for every `{"error": ...}` reply

### Backend Layer
- **Technologies**: Rust, axum
- **Core Components**:
  - Field-Schema Extractor - reads the first sheet and derives ordered fields
  - Survey Store - surveys (gzip + bincode), append-only responses (JSON lines)
  - Form Renderer - one input per field, in sheet order
  - Export - responses back to XLSX or CSV
  - Mailer - sends survey links over SMTP

## Sheet Format

| label       | type     | options              | required |
|-------------|----------|----------------------|----------|
| Your name   | text     |                      | yes      |
| Start date  | date     |                      |          |
| Diet        | checkbox | Vegan; Vegetarian    |          |
| Team        | select   | Red; Blue; Green     | yes      |

A sheet without a `type` column is read the simple way: every header cell
becomes a text question.

## Modules

- **field**: `Field` and the closed `FieldKind` set
- **survey**: `Survey`, `Response` and answer handling
- **extractor**: spreadsheet ingestion and field extraction
- **store**: on-disk persistence
- **downloader**: response export (CSV, XLSX)
- **error**: the `SurveyError` kinds
- **config**, **login**, **mailer**, **renderer**, **app**: the web layer

## REST API Endpoints

- `POST /upload` - multipart `surveyFile`, returns `{survey_id, survey_url}`
- `GET /survey/{id}` - the survey form
- `POST /submit/{id}` - JSON answers keyed by field label
- `GET /download/{id}?format=xlsx|csv` - collected responses
- `POST /share_email` - `{email, link}`
- `POST /delete/{id}` - owner only
*/

pub mod downloader;
pub mod error;
pub mod extractor;
pub mod field;
pub mod store;
pub mod survey;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod mailer;
#[cfg(feature = "web")]
pub mod renderer;

pub use error::{Result, SurveyError};
pub use field::{Field, FieldKind};
pub use survey::{Response, Survey, SurveyEntry};
