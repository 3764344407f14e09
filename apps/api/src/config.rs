use anyhow::{bail, Context, Result};

/// Where uploaded files (pictures, attachments) are kept.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Local { root: String },
    S3(S3Config),
}

#[derive(Debug, Clone, PartialEq)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// HTTP mail API settings. When absent, outgoing mail is only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub port: u16,
    pub rust_log: String,
    pub public_base_url: String,
    pub storage: StorageBackend,
    pub mail: Option<MailConfig>,
    pub mail_from: String,
    pub cv_render_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let storage = match optional_env("STORAGE_BACKEND").as_deref() {
            None | Some("local") => StorageBackend::Local {
                root: optional_env("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
            },
            Some("s3") => StorageBackend::S3(S3Config {
                bucket: require_env("S3_BUCKET")?,
                endpoint: require_env("S3_ENDPOINT")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            Some(other) => bail!("STORAGE_BACKEND must be 'local' or 's3', got '{other}'"),
        };

        let mail = match (optional_env("MAIL_API_URL"), optional_env("MAIL_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(MailConfig { api_url, api_key }),
            (Some(_), None) => bail!("MAIL_API_URL is set but MAIL_API_KEY is missing"),
            _ => None,
        };

        Ok(Config {
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://here_i_am.db?mode=rwc".to_string()),
            jwt_secret: require_env("JWT_SECRET")?,
            token_ttl_hours: optional_env("TOKEN_TTL_HOURS")
                .map(|v| v.parse::<i64>())
                .transpose()
                .context("TOKEN_TTL_HOURS must be an integer")?
                .unwrap_or(24),
            port,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            public_base_url: optional_env("PUBLIC_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            storage,
            mail,
            mail_from: optional_env("MAIL_FROM")
                .unwrap_or_else(|| "Here I Am <no-reply@hereiam.local>".to_string()),
            cv_render_url: optional_env("CV_RENDER_URL"),
            max_upload_bytes: optional_env("MAX_UPLOAD_BYTES")
                .map(|v| v.parse::<usize>())
                .transpose()
                .context("MAX_UPLOAD_BYTES must be a byte count")?
                .unwrap_or(10 * 1024 * 1024),
        })
    }

    /// A configuration suitable for tests: in-memory database, local storage
    /// rooted at `upload_dir`, no outbound services.
    #[cfg(test)]
    pub fn for_tests(upload_dir: &str) -> Self {
        Config {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
            port: 3001,
            rust_log: "debug".to_string(),
            public_base_url: "http://localhost:3001".to_string(),
            storage: StorageBackend::Local {
                root: upload_dir.to_string(),
            },
            mail: None,
            mail_from: "Here I Am <no-reply@hereiam.local>".to_string(),
            cv_render_url: None,
            max_upload_bytes: 1024 * 1024,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
