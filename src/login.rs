use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, create_dir_all};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{Result, SurveyError};
use crate::mailer::is_valid_email;

/// User data structure representing a registered application user
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique identifier for the user)
    pub username: String,

    pub email: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,
}

/// Credential data for login and registration
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,

    /// Email address (ignored for login, required for registration)
    #[serde(default)]
    pub email: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
}

/// Optional banner messages carried in the query string after a redirect
#[derive(Debug, Default, Deserialize)]
pub struct PageMessage {
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub user_id: String,

    pub expires_at: SystemTime,
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
    // Serialises read-modify-write of users.json
    static ref USERS_LOCK: Mutex<()> = Mutex::new(());
}

const USERS_FILE: &str = "users.json";
pub const SESSION_COOKIE: &str = "session";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Get all registered users
///
/// A missing users file means nobody has registered yet.
pub fn get_users(data_dir: &Path) -> Result<HashMap<String, User>> {
    let path = data_dir.join(USERS_FILE);
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn save_users(data_dir: &Path, users: &HashMap<String, User>) -> Result<()> {
    create_dir_all(data_dir)?;
    let json = serde_json::to_string_pretty(users)?;
    fs::write(data_dir.join(USERS_FILE), json)?;
    Ok(())
}

/// Register a new user
///
/// Usernames are limited to letters, digits, `-` and `_` since they name
/// the owner's directory in the store.
///
/// # Errors
/// * `InvalidSubmission` if a field is empty, the username is malformed, or
///   the username or email is already in use
/// * `InvalidEmail` if the email is not syntactically valid
pub fn register_user(data_dir: &Path, username: &str, email: &str, password: &str) -> Result<()> {
    let username = username.trim();
    let email = email.trim();

    if username.is_empty() || password.is_empty() || email.is_empty() {
        return Err(SurveyError::InvalidSubmission(
            "Username, email and password cannot be empty".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SurveyError::InvalidSubmission(
            "Username may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }

    if !is_valid_email(email) {
        return Err(SurveyError::InvalidEmail(email.to_string()));
    }

    let password_hash = hash_password(password)?;

    let _guard = USERS_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let mut users = get_users(data_dir)?;
    if users.contains_key(username) {
        return Err(SurveyError::InvalidSubmission(
            "Username already exists".to_string(),
        ));
    }

    if users.values().any(|user| user.email == email) {
        return Err(SurveyError::InvalidSubmission(
            "Email address is already registered".to_string(),
        ));
    }

    let user = User {
        username: username.to_string(),
        email: email.to_string(),
        password_hash,
    };

    users.insert(username.to_string(), user);
    save_users(data_dir, &users)?;

    log::info!("Registered user {}", username);
    Ok(())
}

/// Check whether the username and password match a registered user
pub fn verify_user(data_dir: &Path, username: &str, password: &str) -> Result<bool> {
    let users = get_users(data_dir)?;

    match users.get(username) {
        Some(user) => verify_password(password, &user.password_hash),
        None => Ok(false),
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| SurveyError::Storage("Password hashing failed".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| SurveyError::Storage("Invalid password hash format".to_string()))?;

    // A mismatch is an expected outcome, not an error
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Create and store a session, returning its id
pub fn create_session(username: &str) -> String {
    let session_id = Uuid::new_v4().to_string();
    let session = Session {
        user_id: username.to_string(),
        expires_at: SystemTime::now() + Duration::from_secs(SESSION_DURATION),
    };

    let mut sessions = SESSIONS.write().unwrap_or_else(|e| e.into_inner());
    sessions.retain(|_, s| s.expires_at > SystemTime::now());
    sessions.insert(session_id.clone(), session);

    session_id
}

/// The username for a live session, if any
pub fn validate_session(session_id: &str) -> Option<String> {
    let sessions = SESSIONS.read().unwrap_or_else(|e| e.into_inner());

    sessions
        .get(session_id)
        .filter(|session| session.expires_at > SystemTime::now())
        .map(|session| session.user_id.clone())
}

pub fn end_session(session_id: &str) {
    let mut sessions = SESSIONS.write().unwrap_or_else(|e| e.into_inner());
    sessions.remove(session_id);
}

/// Username of the request's session cookie, if it is valid
pub fn current_user(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| validate_session(cookie.value()))
}

// Web handlers

pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    Query(message): Query<PageMessage>,
) -> Response {
    match state.renderer.auth_page("login", &message) {
        Ok(html) => Html(html).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn serve_signup_page(
    State(state): State<Arc<AppState>>,
    Query(message): Query<PageMessage>,
) -> Response {
    match state.renderer.auth_page("signup", &message) {
        Ok(html) => Html(html).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Validate credentials and start a session
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    // Stored usernames are trimmed at registration
    let username = credentials.username.trim();

    match verify_user(&state.config.data_dir, username, &credentials.password) {
        Ok(true) => {
            log::info!("User {} logged in", username);
            let session_id = create_session(username);
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true)
                .build();
            (jar.add(cookie), Redirect::to("/dashboard")).into_response()
        }
        Ok(false) => {
            Redirect::to("/login?error=Invalid+username+or+password").into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Create an account, then send the user to the login page
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    match register_user(
        &state.config.data_dir,
        &credentials.username,
        &credentials.email,
        &credentials.password,
    ) {
        Ok(()) => Redirect::to("/login?notice=Account+created%2C+please+log+in").into_response(),
        Err(e) if e.is_client_error() => Redirect::to(&format!(
            "/signup?error={}",
            urlencoding::encode(&e.to_string())
        ))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        end_session(cookie.value());
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login"),
    )
}
