//! Runtime configuration, from command-line flags or environment variables.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Survey Sheets - build web surveys from spreadsheets
#[derive(Parser, Debug, Clone)]
#[command(name = "website")]
#[command(about = "Serve surveys built from uploaded spreadsheets")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Directory holding surveys, responses and users
    #[arg(long, env = "DATA_DIR", default_value = "database")]
    pub data_dir: PathBuf,

    /// Directory served under /static
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Base URL used in share links (defaults to the request's Host header)
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// SMTP relay host; share-by-email is disabled when unset
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 465)]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Sender mailbox for share emails
    #[arg(long, env = "MAIL_FROM", default_value = "Survey Sheets <surveys@localhost>")]
    pub mail_from: String,
}

impl Config {
    /// Defaults with a custom data directory, for embedding and tests
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::parse_from(["website"]);
        config.data_dir = data_dir.into();
        config
    }

    /// Base URL for share links, without a trailing slash
    pub fn base_url(&self, host: Option<&str>) -> String {
        match (&self.public_url, host) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("http://{}", host),
            (None, None) => format!("http://{}", self.listen),
        }
    }
}
