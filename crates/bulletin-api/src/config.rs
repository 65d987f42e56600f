use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const MIN_SECRET_LEN: usize = 32;

/// Upper bound for either token lifetime (30 days).
pub const MAX_TTL_MINUTES: i64 = 30 * 24 * 60;

/// Everything the server needs, read once at startup and handed to the
/// components that use it.
#[derive(Debug, Clone)]
pub struct BulletinConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub auth: AuthSettings,
    pub upload: UploadConfig,
    pub admin: AdminSeed,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Upload layout: uploads land in `{home}/{tmp_dir}` and attachments are
/// kept in `{home}/{file_dir}`. Both dirs are single path components.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub home: PathBuf,
    pub tmp_dir: String,
    pub file_dir: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub user_id: String,
    pub password: String,
    pub user_name: String,
}

impl BulletinConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("BULLETIN_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("BULLETIN_JWT_SECRET is unset or still a placeholder");
        }
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("BULLETIN_JWT_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }

        let admin_password = lookup("BULLETIN_ADMIN_PASSWORD").unwrap_or_default();
        if admin_password.is_empty() {
            bail!("BULLETIN_ADMIN_PASSWORD must be set to seed the administrator");
        }

        let port: u16 = get("BULLETIN_PORT", "3000")
            .parse()
            .context("BULLETIN_PORT is not a valid port")?;
        let access_ttl_minutes: i64 = get("BULLETIN_ACCESS_TTL_MINUTES", "15")
            .parse()
            .context("BULLETIN_ACCESS_TTL_MINUTES is not a number")?;
        let refresh_ttl_minutes: i64 = get("BULLETIN_REFRESH_TTL_MINUTES", "120")
            .parse()
            .context("BULLETIN_REFRESH_TTL_MINUTES is not a number")?;
        if access_ttl_minutes <= 0 || refresh_ttl_minutes <= access_ttl_minutes {
            bail!("token lifetimes must be positive and the refresh lifetime longer than the access lifetime");
        }
        if refresh_ttl_minutes > MAX_TTL_MINUTES {
            bail!("token lifetimes must not exceed {MAX_TTL_MINUTES} minutes");
        }
        let max_upload_bytes: usize = get("BULLETIN_MAX_UPLOAD_BYTES", "52428800") // 50 MB
            .parse()
            .context("BULLETIN_MAX_UPLOAD_BYTES is not a number")?;

        let tmp_dir = get("BULLETIN_TMP_DIR", "tmp");
        let file_dir = get("BULLETIN_FILE_DIR", "upload");
        for (key, dir) in [("BULLETIN_TMP_DIR", &tmp_dir), ("BULLETIN_FILE_DIR", &file_dir)] {
            if !is_plain_component(dir) {
                bail!("{key} must be a single directory name, got {dir:?}");
            }
        }
        if tmp_dir == file_dir {
            bail!("BULLETIN_TMP_DIR and BULLETIN_FILE_DIR must differ");
        }

        Ok(Self {
            host: get("BULLETIN_HOST", "0.0.0.0"),
            port,
            db_path: get("BULLETIN_DB_PATH", "bulletin.db").into(),
            auth: AuthSettings {
                jwt_secret,
                access_ttl_minutes,
                refresh_ttl_minutes,
            },
            upload: UploadConfig {
                home: get("BULLETIN_UPLOAD_HOME", "./static").into(),
                tmp_dir,
                file_dir,
                max_upload_bytes,
            },
            admin: AdminSeed {
                user_id: get("BULLETIN_ADMIN_ID", "admin"),
                password: admin_password,
                user_name: get("BULLETIN_ADMIN_NAME", "Administrator"),
            },
        })
    }
}

/// True for a non-empty name with no separators and no `.`/`..`.
pub fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
