use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::downloader::{self, ExportFormat};
use crate::error::{Result, SurveyError};
use crate::extractor;
use crate::login::{self, current_user};
use crate::mailer::{Mailer, is_valid_email};
use crate::renderer::Renderer;
use crate::store::SurveyStore;
use crate::survey::Survey;

pub struct AppState {
    pub config: Config,
    pub store: SurveyStore,
    pub renderer: Renderer,

    /// `None` when no SMTP relay is configured
    pub mailer: Option<Mailer>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let store = SurveyStore::open(&config.data_dir)?;
        let renderer = Renderer::new()?;
        let mailer = Mailer::from_config(&config)?;

        Ok(AppState {
            config,
            store,
            renderer,
            mailer,
        })
    }

    /// Replace the configured mailer
    pub fn with_mailer(mut self, mailer: Mailer) -> Self {
        self.mailer = Some(mailer);
        self
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub message: String,
    pub survey_id: String,
    pub survey_url: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct ShareRequest {
    pub email: String,
    pub link: String,
}

#[derive(Deserialize, Debug)]
pub struct DownloadQuery {
    pub format: Option<String>,
}

/// Build the application router
///
/// # Arguments
/// * `state` - Shared state handed to every handler
///
/// # Returns
/// A router serving the pages, the JSON API, and `/static` from
/// `config.static_dir`, with request bodies capped at `config.max_upload_bytes`
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(serve_index))
        .route("/upload", post(upload_survey))
        .route("/survey/:survey_id", get(show_survey))
        .route("/api/survey/:survey_id", get(get_survey))
        .route("/submit/:survey_id", post(submit_survey))
        .route("/download/:survey_id", get(download_responses))
        .route("/share_email", post(share_email))
        .route("/delete/:survey_id", post(delete_survey))
        .route("/dashboard", get(dashboard))
        .route(
            "/login",
            get(login::serve_login_page).post(login::handle_login),
        )
        .route(
            "/signup",
            get(login::serve_signup_page).post(login::handle_signup),
        )
        .route("/logout", get(login::handle_logout))
        .nest_service("/static", static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Start the web server and block until it stops
///
/// # Arguments
/// * `config` - Parsed configuration; `listen` is the bind address
///
/// # Returns
/// An error if the state cannot be built or the address cannot be bound
pub async fn run(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let listen = config.listen;
    let state = Arc::new(AppState::new(config)?);

    if state.mailer.is_none() {
        log::warn!("SMTP_HOST is not set, sharing surveys by email is disabled");
    }
    log::info!("Storing data in {}", state.store.root().display());

    let app = router(state);
    let listener = TcpListener::bind(listen).await?;
    log::info!("Listening on http://{}", listen);
    axum::serve(listener, app).await?;

    Ok(())
}

fn host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|h| h.to_str().ok())
}

fn html(rendered: Result<String>) -> Response {
    match rendered {
        Ok(page) => Html(page).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn serve_index(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let user = current_user(&jar);
    html(state.renderer.index(user.as_deref()))
}

/// Accept a spreadsheet, turn it into a survey and return its share link
///
/// Nothing is stored unless the sheet parses into a valid field list.
async fn upload_survey(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut title = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SurveyError::InvalidUpload(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "surveyFile" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| SurveyError::InvalidUpload(e.to_string()))?;
                file = Some((filename, data.to_vec()));
            }
            "title" => {
                title = field
                    .text()
                    .await
                    .map_err(|e| SurveyError::InvalidUpload(e.to_string()))?;
            }
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| SurveyError::InvalidUpload("no surveyFile was sent".to_string()))?;
    if filename.trim().is_empty() {
        return Err(SurveyError::InvalidUpload("no file selected".to_string()));
    }

    let fields = extractor::load_fields(&data, &filename)?;

    let path = std::path::Path::new(&filename);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let title = match title.trim() {
        "" => path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("Survey")
            .to_string(),
        given => given.to_string(),
    };

    let survey = Survey::new(&title, current_user(&jar), fields);
    state.store.create(&survey, &data, &extension)?;

    let survey_url = format!(
        "{}/survey/{}",
        state.config.base_url(host(&headers)),
        survey.id
    );
    log::info!("Uploaded '{}' as survey {}", filename, survey.id);

    Ok(Json(UploadResponse {
        message: "File uploaded!".to_string(),
        survey_id: survey.id,
        survey_url,
    }))
}

/// Render the survey form, or a friendly page if it does not exist
async fn show_survey(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<String>,
) -> Response {
    match state.store.load(&survey_id) {
        Ok(survey) => html(state.renderer.survey_form(&survey)),
        Err(SurveyError::NotFound(_)) => {
            let page = state.renderer.message(
                "Survey not found",
                "This survey does not exist or has been deleted.",
            );
            match page {
                Ok(page) => (StatusCode::NOT_FOUND, Html(page)).into_response(),
                Err(e) => e.into_response(),
            }
        }
        Err(e) => e.into_response(),
    }
}

async fn get_survey(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<String>,
) -> Result<Json<Survey>> {
    Ok(Json(state.store.load(&survey_id)?))
}

/// Store one complete set of answers
///
/// # Arguments
/// * `survey_id` - Path segment naming the survey
/// * `body` - JSON object keyed by field label
///
/// # Returns
/// `{message}` once the response is stored, or an error with nothing stored
async fn submit_survey(
    State(state): State<Arc<AppState>>,
    Path(survey_id): Path<String>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let survey = state.store.load(&survey_id)?;

    let Json(body) = body.map_err(|e| SurveyError::InvalidSubmission(e.body_text()))?;
    let answers = body.as_object().ok_or_else(|| {
        SurveyError::InvalidSubmission("expected a JSON object of answers".to_string())
    })?;

    let response = survey.build_response(answers)?;
    state.store.append_response(&response)?;
    log::info!("Saved response for survey {}", survey_id);

    Ok(Json(MessageResponse {
        message: "Data saved!".to_string(),
    }))
}

/// Only the owner may manage an owned survey; ownerless surveys are open
fn authorize(survey: &Survey, jar: &CookieJar) -> Result<()> {
    let Some(owner) = &survey.owner else {
        return Ok(());
    };

    match current_user(jar) {
        Some(user) if &user == owner => Ok(()),
        Some(_) => Err(SurveyError::Forbidden(
            "this survey belongs to another user".to_string(),
        )),
        None => Err(SurveyError::Unauthorized(
            "log in to manage this survey".to_string(),
        )),
    }
}

/// Export collected responses as an xlsx (default) or csv attachment
async fn download_responses(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(survey_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let survey = state.store.load(&survey_id)?;
    authorize(&survey, &jar)?;

    let format = match query.format.as_deref() {
        None => ExportFormat::Xlsx,
        Some(value) => ExportFormat::from_query(value).ok_or_else(|| {
            SurveyError::InvalidSubmission(format!("unknown export format '{}'", value))
        })?,
    };

    let responses = state.store.responses(&survey_id)?;
    let data = downloader::export(&survey, &responses, format)?;
    log::info!(
        "Exported {} responses for survey {} as {}",
        responses.len(),
        survey_id,
        format.extension()
    );

    let disposition = format!(
        "attachment; filename=\"{}-responses.{}\"",
        file_stem(&survey.title),
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

fn file_stem(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.trim_matches('_').is_empty() {
        "survey".to_string()
    } else {
        stem
    }
}

/// Survey id from a share link of the form `<base>/survey/<id>[?#/...]`
///
/// Links pointing anywhere other than this server's `base` yield `None`.
fn survey_id_from_link<'a>(link: &'a str, base: &str) -> Option<&'a str> {
    let rest = link.trim().strip_prefix(base)?.strip_prefix("/survey/")?;
    let id = rest.split(['?', '#', '/']).next()?;
    (!id.is_empty()).then_some(id)
}

/// Email a survey link
///
/// # Arguments
/// * `headers` - Request headers, whose `Host` decides the public base URL
/// * `body` - JSON `{email, link}`; `link` must be a survey link on this server
///
/// # Returns
/// `{message}` on success. The emailed link is rebuilt from the base URL and
/// the survey id, so the caller's text is never relayed.
async fn share_email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: std::result::Result<Json<ShareRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(request) = body.map_err(|e| SurveyError::InvalidSubmission(e.body_text()))?;
    let email = request.email.trim().to_string();

    if !is_valid_email(&email) {
        return Err(SurveyError::InvalidEmail(email));
    }

    let base_url = state.config.base_url(host(&headers));
    let survey_id = survey_id_from_link(&request.link, &base_url).ok_or_else(|| {
        SurveyError::InvalidSubmission(format!("link is not a survey link on {}", base_url))
    })?;
    let survey = state.store.load(survey_id)?;

    if state.mailer.is_none() {
        return Err(SurveyError::Mail(
            "email delivery is not configured".to_string(),
        ));
    }

    let link = format!("{}/survey/{}", base_url, survey.id);
    let to = email.clone();
    let sender = Arc::clone(&state);
    tokio::task::spawn_blocking(move || match &sender.mailer {
        Some(mailer) => mailer.send_survey_link(&to, &survey.title, &link),
        None => Err(SurveyError::Mail(
            "email delivery is not configured".to_string(),
        )),
    })
    .await
    .map_err(|e| SurveyError::Mail(e.to_string()))??;

    log::info!("Shared survey {} with {}", survey_id, email);
    Ok(Json(MessageResponse {
        message: format!("Link sent to {}", email),
    }))
}

/// Delete a survey and everything collected for it (owner only)
async fn delete_survey(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(survey_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    let user = current_user(&jar)
        .ok_or_else(|| SurveyError::Unauthorized("log in to delete surveys".to_string()))?;
    let survey = state.store.load(&survey_id)?;

    if survey.owner.as_deref() != Some(user.as_str()) {
        return Err(SurveyError::Forbidden(
            "only the owner can delete a survey".to_string(),
        ));
    }

    state.store.delete(&survey_id)?;

    Ok(Json(MessageResponse {
        message: format!("Deleted '{}'", survey.title),
    }))
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    let Some(user) = current_user(&jar) else {
        return Redirect::to("/login").into_response();
    };

    let base_url = state.config.base_url(host(&headers));
    let page = state
        .store
        .list(&user)
        .and_then(|surveys| state.renderer.dashboard(&user, &surveys, &base_url));
    html(page)
}
