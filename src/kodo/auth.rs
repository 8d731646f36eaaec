use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::error::Result;

type HmacSha1 = Hmac<Sha1>;

/// Access/secret key pair used to sign upload tokens
#[derive(Clone)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Upload policy signed into a token
///
/// `scope` is `<bucket>:<key>`, which lets the upload overwrite an existing
/// object under the same key. `deadline` is a unix timestamp in seconds.
#[derive(Debug, Serialize)]
pub struct PutPolicy {
    pub scope: String,
    pub deadline: u64,
}

impl PutPolicy {
    pub fn new(bucket: &str, key: &str, deadline: u64) -> Self {
        Self {
            scope: format!("{}:{}", bucket, key),
            deadline,
        }
    }

    /// Policy that expires `ttl` from now
    pub fn expiring_in(bucket: &str, key: &str, ttl: Duration) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(bucket, key, (now + ttl).as_secs())
    }
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// URL-safe base64 of HMAC-SHA1 over `data`
    fn sign(&self, data: &[u8]) -> String {
        // HMAC accepts keys of any length
        let mut mac = HmacSha1::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(data);
        URL_SAFE.encode(mac.finalize().into_bytes())
    }

    /// Sign a put policy into an upload token
    ///
    /// Token layout: `<access_key>:<sign>:<encoded_policy>`, where
    /// `encoded_policy` is the URL-safe base64 of the compact policy JSON and
    /// `sign` is the URL-safe base64 HMAC-SHA1 of `encoded_policy`.
    pub fn sign_policy(&self, policy: &PutPolicy) -> Result<String> {
        let json = serde_json::to_vec(policy)?;
        let encoded_policy = URL_SAFE.encode(json);
        let sign = self.sign(encoded_policy.as_bytes());
        Ok(format!("{}:{}:{}", self.access_key, sign, encoded_policy))
    }

    /// Short-lived token authorizing a single upload of `key` into `bucket`
    pub fn upload_token(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        let policy = PutPolicy::expiring_in(bucket, key, ttl);
        debug!(scope = %policy.scope, deadline = policy.deadline, "signing upload token");
        self.sign_policy(&policy)
    }
}
