//! Request signing.
//!
//! Two token flavors: a reusable multi-signature cached until close to its
//! expiry (list/stat/upload/download), and a single-use signature carrying a
//! fresh nonce and the full resource id (delete/move).

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::CosConfig;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a multi-signature stays valid.
const SIGN_TTL: i64 = 600;
/// Recompute the cached token once it is this close to expiring.
const REFRESH_MARGIN: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Explicit signing handle, constructed once and shared by clone.
#[derive(Clone)]
pub struct Signer {
    app_id: u64,
    bucket: String,
    secret_id: String,
    secret_key: String,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl Signer {
    pub fn new(config: &CosConfig) -> Signer {
        Signer {
            app_id: config.app_id,
            bucket: config.bucket.clone(),
            secret_id: config.secret_id.clone(),
            secret_key: config.secret_key.clone(),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Reusable authorization token, recomputed only when the cached one is
    /// within [`REFRESH_MARGIN`] of its expiry.
    pub fn multi_signature(&self) -> String {
        let now = Utc::now().timestamp();
        let mut cached = self.cached.lock().expect("signer cache poisoned");
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at - REFRESH_MARGIN > now {
                return entry.token.clone();
            }
        }
        let expires_at = now + SIGN_TTL;
        let token = self.sign(now, expires_at, "");
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        token
    }

    /// Single-use token for exactly one resource; never cached.
    pub fn once_signature(&self, file_id: &str) -> String {
        self.sign(Utc::now().timestamp(), 0, file_id)
    }

    fn sign(&self, now: i64, expire: i64, file_id: &str) -> String {
        let nonce: u32 = rand::random();
        let plain = format!(
            "a={}&b={}&k={}&e={}&t={}&r={}&f={}",
            self.app_id, self.bucket, self.secret_id, expire, now, nonce, file_id
        );
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(plain.as_bytes());
        let mut signed = mac.finalize().into_bytes().to_vec();
        signed.extend_from_slice(plain.as_bytes());
        BASE64.encode(signed)
    }
}
