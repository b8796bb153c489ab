//! Download claim signing and validation
//!
//! Claims are HS256 JWTs built by hand (header, payload and signature, each
//! base64url without padding) and signed with HMAC-SHA256.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::directory::Principal;
use crate::error::GateError;

type HmacSha256 = Hmac<Sha256>;

/// The only purpose a download claim may carry
pub const DOWNLOAD_PURPOSE: &str = "download";

/// Shortest accepted signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Default claim lifetime (2 hours)
pub fn default_claim_ttl() -> Duration {
    Duration::hours(2)
}

/// JWT Header for HS256
#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

impl Default for JwtHeader {
    fn default() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by a download token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadClaims {
    /// Subject (principal id)
    pub sub: String,
    /// Principal email address
    pub email: String,
    /// Principal display name
    pub name: String,
    /// Artifact the claim grants access to
    pub file_id: String,
    /// Always [`DOWNLOAD_PURPOSE`] for valid claims
    pub purpose: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

impl DownloadClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A freshly signed token and the claims inside it
#[derive(Debug, Clone)]
pub struct IssuedClaim {
    pub token: String,
    pub claims: DownloadClaims,
}

/// Whether a claim may be redeemed more than once within its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedemptionPolicy {
    /// Valid until expiry, any number of times
    #[default]
    Reusable,
    /// First successful redemption consumes the claim
    SingleUse,
}

impl FromStr for RedemptionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reusable" => Ok(Self::Reusable),
            "single-use" | "single_use" | "singleuse" => Ok(Self::SingleUse),
            other => Err(format!(
                "unknown redemption policy '{}', expected 'reusable' or 'single-use'",
                other
            )),
        }
    }
}

impl fmt::Display for RedemptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reusable => write!(f, "reusable"),
            Self::SingleUse => write!(f, "single-use"),
        }
    }
}

/// HMAC secret used to sign claims. Never printed.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(secret: &str) -> Result<Self, GateError> {
        if secret.is_empty() {
            return Err(GateError::MissingSecret);
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(GateError::WeakSecret {
                len: secret.len(),
                min: MIN_SECRET_LEN,
            });
        }
        Ok(Self(secret.as_bytes().to_vec()))
    }

    fn mac(&self) -> Result<HmacSha256, String> {
        HmacSha256::new_from_slice(&self.0).map_err(|e| format!("HMAC error: {}", e))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// Encode claims to JWT using HS256
fn encode_jwt<T: Serialize>(claims: &T, key: &SigningKey) -> Result<String, String> {
    let header_json = serde_json::to_string(&JwtHeader::default()).map_err(|e| e.to_string())?;
    let header_b64 = URL_SAFE_NO_PAD.encode(header_json.as_bytes());

    let payload_json = serde_json::to_string(claims).map_err(|e| e.to_string())?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());

    let signing_input = format!("{}.{}", header_b64, payload_b64);

    let mut mac = key.mac()?;
    mac.update(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature_b64))
}

/// Decode and verify a JWT using HS256
fn decode_jwt<T: DeserializeOwned>(token: &str, key: &SigningKey) -> Result<T, String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let (header_b64, payload_b64, signature_b64) = (parts[0], parts[1], parts[2]);

    // Signature first: nothing else in the token is trusted until it verifies
    let signing_input = format!("{}.{}", header_b64, payload_b64);
    let mut mac = key.mac()?;
    mac.update(signing_input.as_bytes());

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| "Invalid signature encoding")?;
    mac.verify_slice(&signature)
        .map_err(|_| "Invalid signature")?;

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| "Invalid header encoding")?;
    let header: JwtHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| "Invalid header format")?;
    if header.alg != "HS256" {
        return Err("Unsupported algorithm".to_string());
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| "Invalid payload encoding")?;
    serde_json::from_slice(&payload_bytes).map_err(|_| "Invalid payload format".to_string())
}

/// Issues and redeems download claims
#[derive(Debug)]
pub struct TokenService {
    key: SigningKey,
    ttl: Duration,
    policy: RedemptionPolicy,
    /// Redeemed token ids and their expiry, tracked in single-use mode only
    redeemed: Mutex<HashMap<String, i64>>,
}

impl TokenService {
    pub fn new(key: SigningKey, ttl: Duration, policy: RedemptionPolicy) -> Self {
        Self {
            key,
            ttl,
            policy,
            redeemed: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> RedemptionPolicy {
        self.policy
    }

    /// Issue a claim binding `principal` to `artifact_id`
    pub fn issue(
        &self,
        principal: &Principal,
        artifact_id: &str,
    ) -> Result<IssuedClaim, GateError> {
        self.issue_at(principal, artifact_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        principal: &Principal,
        artifact_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedClaim, GateError> {
        let claims = DownloadClaims {
            sub: principal.id.clone(),
            email: principal.email.clone(),
            name: principal.name.clone(),
            file_id: artifact_id.to_string(),
            purpose: DOWNLOAD_PURPOSE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode_jwt(&claims, &self.key).map_err(GateError::Signing)?;
        debug!(
            "Issued download claim {} for artifact {}",
            claims.jti, claims.file_id
        );

        Ok(IssuedClaim { token, claims })
    }

    /// Validate a token and return its claims
    ///
    /// Does not check that the artifact exists or who owns it.
    pub fn redeem(&self, token: &str) -> Result<DownloadClaims, GateError> {
        self.redeem_at(token, Utc::now())
    }

    pub fn redeem_at(&self, token: &str, now: DateTime<Utc>) -> Result<DownloadClaims, GateError> {
        let claims: DownloadClaims =
            decode_jwt(token, &self.key).map_err(GateError::InvalidClaim)?;

        if claims.purpose != DOWNLOAD_PURPOSE {
            warn!("Rejected claim {} with purpose '{}'", claims.jti, claims.purpose);
            return Err(GateError::InvalidClaim("Wrong token purpose".to_string()));
        }

        let now = now.timestamp();
        if now >= claims.exp {
            return Err(GateError::ExpiredClaim);
        }

        if self.policy == RedemptionPolicy::SingleUse {
            let mut redeemed = self.redeemed.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries past their expiry can no longer be replayed anyway
            redeemed.retain(|_, exp| *exp > now);

            if redeemed.contains_key(&claims.jti) {
                warn!("Replay of single-use claim {}", claims.jti);
                return Err(GateError::InvalidClaim("Token already redeemed".to_string()));
            }
            redeemed.insert(claims.jti.clone(), claims.exp);
        }

        Ok(claims)
    }
}
