//! Outward error kinds and the internal rejection causes that get audited.
//!
//! Callers only ever see the coarse [`AuthError`] variants. The specific
//! [`RejectReason`] goes to the audit sink so operators can tell a typo from a
//! forged token without leaking that distinction to clients.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::token::TokenError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account temporarily locked")]
    AccountLocked,
    #[error("access denied")]
    AccessDenied,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    UnknownIdentity,
    Deactivated,
    Locked,
    BadPassword,
    MalformedToken,
    BadSignature,
    ExpiredToken,
    WrongTokenKind,
    SessionNotFound,
    SessionIdle,
    SessionRevoked,
    IdentityMismatch,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownIdentity => "unknown_identity",
            Self::Deactivated => "deactivated",
            Self::Locked => "locked",
            Self::BadPassword => "bad_password",
            Self::MalformedToken => "malformed_token",
            Self::BadSignature => "bad_signature",
            Self::ExpiredToken => "expired_token",
            Self::WrongTokenKind => "wrong_token_kind",
            Self::SessionNotFound => "session_not_found",
            Self::SessionIdle => "session_idle",
            Self::SessionRevoked => "session_revoked",
            Self::IdentityMismatch => "identity_mismatch",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TokenError> for RejectReason {
    fn from(err: &TokenError) -> Self {
        match err {
            TokenError::BadSignature => Self::BadSignature,
            TokenError::Expired => Self::ExpiredToken,
            TokenError::Malformed | TokenError::WeakKey | TokenError::Encode(_) => {
                Self::MalformedToken
            }
        }
    }
}
