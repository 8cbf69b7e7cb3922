//! HS256 bearer tokens for staff sessions.
//!
//! A token is a compact JWS: `base64url(header).base64url(claims).base64url(mac)`.
//! Decoding never trusts the payload before the MAC has been checked.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::role::StaffRole;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LEN: usize = 32;

const ALG: &str = "HS256";
const TYP: &str = "JWT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG.to_string(),
            typ: TYP.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    pub staff_id: i64,
    pub role: StaffRole,
    pub first_name: String,
    pub last_name: String,
    pub kind: TokenKind,
    pub sid: Uuid,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    /// Claims for a fresh token; `iat`/`exp` are stamped by [`TokenCodec::issue`].
    #[must_use]
    pub fn new(
        sub: impl Into<String>,
        staff_id: i64,
        role: StaffRole,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        kind: TokenKind,
        sid: Uuid,
    ) -> Self {
        Self {
            sub: sub.into(),
            staff_id,
            role,
            first_name: first_name.into(),
            last_name: last_name.into(),
            kind,
            sid,
            jti: Uuid::new_v4(),
            iat: 0,
            exp: 0,
        }
    }

    /// Same identity, new token id, different kind.
    #[must_use]
    pub fn sibling(&self, kind: TokenKind) -> Self {
        Self {
            kind,
            jti: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("signing key must be at least {MIN_SECRET_LEN} bytes")]
    WeakKey,
    #[error("failed to encode token")]
    Encode(#[from] serde_json::Error),
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

pub struct TokenCodec {
    secret: SecretSlice<u8>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// # Errors
    /// Returns `TokenError::WeakKey` if the secret is shorter than [`MIN_SECRET_LEN`].
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let secret: Vec<u8> = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakKey);
        }
        Ok(Self {
            secret: SecretSlice::from(secret),
        })
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret()).map_err(|_| TokenError::WeakKey)
    }

    /// Sign `claims` with `iat = now` and `exp = now + ttl` (unix seconds).
    ///
    /// # Errors
    /// Returns an error if the header or claims cannot be encoded.
    pub fn issue(
        &self,
        claims: &TokenClaims,
        ttl: Duration,
        now_unix_seconds: i64,
    ) -> Result<String, TokenError> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let stamped = TokenClaims {
            iat: now_unix_seconds,
            exp: now_unix_seconds.saturating_add(ttl),
            ..claims.clone()
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&stamped)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    /// - `Malformed` if the token is not three base64url JSON segments or names
    ///   another algorithm,
    /// - `BadSignature` if the MAC does not match,
    /// - `Expired` if `exp` is at or before `now_unix_seconds`.
    pub fn decode(&self, token: &str, now_unix_seconds: i64) -> Result<TokenClaims, TokenError> {
        let mut parts = token.trim().split('.');
        let header_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let claims_b64 = parts.next().ok_or(TokenError::Malformed)?;
        let sig_b64 = parts.next().ok_or(TokenError::Malformed)?;
        if parts.next().is_some() {
            return Err(TokenError::Malformed);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG {
            return Err(TokenError::Malformed);
        }

        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: TokenClaims = b64d_json(claims_b64)?;
        if claims.exp <= now_unix_seconds {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}
