use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::kodo::Credentials;

/// Default form-upload endpoint (Kodo region z0)
pub const DEFAULT_UPLOAD_HOST: &str = "https://upload.qiniup.com";

/// Default lifetime of a signed upload token
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Configuration for publishing to a Kodo bucket
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub bucket: String,
    pub prefix: String,
    pub upload_host: String,
    pub token_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables and .env file
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Load .env file if it exists

        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_key = lookup("QINIU_ACCESS_KEY")
            .context("QINIU_ACCESS_KEY not found in environment. Please set it in .env file")?;
        let secret_key = lookup("QINIU_SECRET_KEY")
            .context("QINIU_SECRET_KEY not found in environment. Please set it in .env file")?;
        if access_key.trim().is_empty() || secret_key.trim().is_empty() {
            anyhow::bail!("QINIU_ACCESS_KEY and QINIU_SECRET_KEY cannot be empty");
        }

        let bucket = lookup("QINIU_BUCKET")
            .context("QINIU_BUCKET not found in environment. Please set it in .env file")?;
        Self::validate_bucket_name(&bucket)?;

        let prefix = lookup("QINIU_PREFIX").unwrap_or_default();
        Self::validate_prefix(&prefix)?;

        let upload_host =
            lookup("QINIU_UPLOAD_HOST").unwrap_or_else(|| DEFAULT_UPLOAD_HOST.to_string());
        Self::validate_upload_host(&upload_host)?;

        let token_ttl = match lookup("QINIU_TOKEN_TTL") {
            Some(raw) => Self::parse_token_ttl(&raw)?,
            None => DEFAULT_TOKEN_TTL,
        };

        Ok(Self {
            credentials: Credentials::new(access_key, secret_key),
            bucket,
            prefix,
            upload_host: upload_host.trim_end_matches('/').to_string(),
            token_ttl,
        })
    }

    /// Replace the key prefix, validating it the same way as `QINIU_PREFIX`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        Self::validate_prefix(&prefix)?;
        self.prefix = prefix;
        Ok(self)
    }

    /// Validate Kodo bucket name
    fn validate_bucket_name(bucket: &str) -> Result<()> {
        if bucket.is_empty() {
            anyhow::bail!("QINIU_BUCKET cannot be empty");
        }

        if bucket.len() < 3 || bucket.len() > 63 {
            anyhow::bail!(
                "QINIU_BUCKET '{}' must be between 3 and 63 characters (got {})",
                bucket,
                bucket.len()
            );
        }

        // Legacy buckets may carry uppercase letters and underscores
        if let Some(c) = bucket
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            anyhow::bail!(
                "QINIU_BUCKET '{}' contains invalid character '{}'. Only letters, numbers, hyphens and underscores are allowed",
                bucket,
                c
            );
        }

        Ok(())
    }

    /// Validate key prefix
    fn validate_prefix(prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            return Ok(());
        }

        if prefix.contains("//") {
            anyhow::bail!(
                "QINIU_PREFIX '{}' contains consecutive slashes (not allowed)",
                prefix
            );
        }

        if prefix.contains("..") {
            anyhow::bail!(
                "QINIU_PREFIX '{}' contains '..' (not allowed for security)",
                prefix
            );
        }

        if prefix.starts_with('/') {
            anyhow::bail!(
                "QINIU_PREFIX '{}' should not start with '/' (use relative path)",
                prefix
            );
        }

        Ok(())
    }

    fn validate_upload_host(host: &str) -> Result<()> {
        if !host.starts_with("http://") && !host.starts_with("https://") {
            anyhow::bail!(
                "QINIU_UPLOAD_HOST '{}' must start with http:// or https://",
                host
            );
        }
        Ok(())
    }

    fn parse_token_ttl(raw: &str) -> Result<Duration> {
        let secs: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("QINIU_TOKEN_TTL '{}' is not a number of seconds", raw))?;
        if secs == 0 {
            anyhow::bail!("QINIU_TOKEN_TTL must be greater than zero");
        }
        Ok(Duration::from_secs(secs))
    }
}
