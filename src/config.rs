//! Server configuration, read from command line flags or environment variables.

use std::{net::IpAddr, path::PathBuf};

use clap::Parser;

use crate::Error;

/// The REST API server for finbook_rs.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// URL of the application database. Only SQLite is supported, e.g. `sqlite://financeiro.db`.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://financeiro.db")]
    pub database_url: String,

    /// The address to serve the API from.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// The secret used to sign bearer tokens.
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// The secret used to encrypt the cookies of a Google login.
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    /// Where the frontend is served from. Google logins redirect back here.
    #[arg(long, env = "FRONTEND_URL", default_value = "http://localhost:3000")]
    pub frontend_url: String,

    /// Origins allowed to call the API from a browser, comma separated.
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// OAuth client ID for Google logins.
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// OAuth client secret for Google logins.
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    /// The URL Google redirects to after a login.
    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URL",
        default_value = "http://localhost:8000/auth/google/callback"
    )]
    pub google_redirect_url: String,

    /// `cloudinary://<api_key>:<api_secret>@<cloud_name>`. Uploads are refused when unset.
    #[arg(long, env = "CLOUDINARY_URL", hide_env_values = true)]
    pub cloudinary_url: Option<String>,

    /// API key for the Gemini text generation API.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Token required to reset the database. The reset route is disabled when unset.
    #[arg(long, env = "RESET_TOKEN", hide_env_values = true)]
    pub reset_token: Option<String>,

    /// The largest request body accepted, in megabytes. Uploaded files count towards it.
    #[arg(long, env = "MAX_BODY_MB", default_value_t = 20)]
    pub max_body_mb: usize,

    /// Also write logs to this file.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// The file path of the SQLite database named by [Config::database_url].
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidDatabaseUrl] for URLs of any other database.
    pub fn database_path(&self) -> Result<PathBuf, Error> {
        parse_database_url(&self.database_url)
    }

    /// [Config::max_body_mb] in bytes.
    pub fn body_limit(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }

    /// The configured origins plus the frontend URL, without duplicates.
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self
            .allowed_origins
            .iter()
            .map(|origin| origin.trim().trim_end_matches('/').to_owned())
            .filter(|origin| !origin.is_empty())
            .collect();

        let frontend_url = self.frontend_url.trim_end_matches('/').to_owned();
        if !origins.contains(&frontend_url) {
            origins.push(frontend_url);
        }

        origins
    }
}

fn parse_database_url(database_url: &str) -> Result<PathBuf, Error> {
    if let Some(path) = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
    {
        if path.is_empty() {
            return Err(Error::InvalidDatabaseUrl(database_url.to_owned()));
        }

        return Ok(PathBuf::from(path));
    }

    if database_url.contains("://") {
        return Err(Error::InvalidDatabaseUrl(database_url.to_owned()));
    }

    // A bare file path.
    Ok(PathBuf::from(database_url))
}
