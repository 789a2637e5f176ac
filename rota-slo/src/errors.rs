use std::{error::Error as StdError, fmt};

use backtrace::Backtrace;
use http::StatusCode;
use thiserror::Error;

pub trait ErrorCode: StdError + 'static {
    fn code(&self) -> (StatusCode, &'static str);
}

#[derive(Error, Debug)]
pub enum Code {
    #[error(transparent)]
    Any(#[from] anyhow::Error),
    #[error("No active signing key")]
    NoActiveKey,
    #[error("Unknown key. {0}")]
    UnknownKey(String),
    #[error("Token signed by an unknown key. {0}")]
    UnknownSigningKey(String),
    #[error("Token expired")]
    ExpiredToken,
    #[error("Malformed token. {0}")]
    MalformedToken(String),
    #[error("Invalid token type, expected {expected} but got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Invalid or revoked refresh token")]
    RevokedOrUnknownRefreshToken,
    #[error("Denied. {requirement} is required, held: {held:?}")]
    Denied {
        requirement: String,
        held: Vec<String>,
    },
    #[error("Authentication is required to access this resource")]
    Unauthorized,
    #[error("Please recheck the request.see: {0}")]
    BadRequest(String),
}

impl ErrorCode for Code {
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Any(_) => (StatusCode::INTERNAL_SERVER_ERROR, "1010001"),
            Self::NoActiveKey => {
                (StatusCode::INTERNAL_SERVER_ERROR, "1010002")
            }
            Self::UnknownKey(_) => (StatusCode::NOT_FOUND, "1010003"),
            Self::UnknownSigningKey(_) => {
                (StatusCode::UNAUTHORIZED, "1010004")
            }
            Self::ExpiredToken => (StatusCode::UNAUTHORIZED, "1010005"),
            Self::MalformedToken(_) => (StatusCode::UNAUTHORIZED, "1010006"),
            Self::TypeMismatch { .. } => {
                (StatusCode::UNAUTHORIZED, "1010007")
            }
            Self::RevokedOrUnknownRefreshToken => {
                (StatusCode::UNAUTHORIZED, "1010008")
            }
            Self::Denied { .. } => (StatusCode::FORBIDDEN, "1010009"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "1010010"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "1010011"),
        }
    }
}

pub struct WithBacktrace {
    source: Code,
    backtrace: Backtrace,
}

impl WithBacktrace {
    pub fn code(&self) -> &Code {
        &self.source
    }

    pub fn status(&self) -> StatusCode {
        self.source.code().0
    }
}

impl fmt::Debug for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithBacktrace")
            .field("source", &self.source)
            .field("backtrace", &self.backtrace)
            .finish()
    }
}

impl fmt::Display for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl StdError for WithBacktrace {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<Code> for WithBacktrace {
    fn from(code: Code) -> Self {
        WithBacktrace {
            source: code,
            backtrace: Backtrace::new_unresolved(),
        }
    }
}

impl From<WithBacktrace> for Code {
    fn from(value: WithBacktrace) -> Self {
        value.source
    }
}

impl PartialEq for WithBacktrace {
    fn eq(&self, other: &Self) -> bool {
        let (_, src_code) = self.source.code();
        let (_, dst_code) = other.source.code();
        src_code == dst_code
    }
}

#[inline]
pub fn any<E: StdError>(err: E) -> WithBacktrace {
    Code::Any(anyhow::anyhow!("{}", err.to_string())).into()
}

#[inline]
pub fn anyhow(err: anyhow::Error) -> WithBacktrace {
    Code::Any(err).into()
}

#[inline]
pub fn no_active_key() -> WithBacktrace {
    Code::NoActiveKey.into()
}

#[inline]
pub fn unknown_key<S: ToString + ?Sized>(kid: &S) -> WithBacktrace {
    Code::UnknownKey(kid.to_string()).into()
}

#[inline]
pub fn unknown_signing_key<S: ToString + ?Sized>(kid: &S) -> WithBacktrace {
    Code::UnknownSigningKey(kid.to_string()).into()
}

#[inline]
pub fn expired_token() -> WithBacktrace {
    Code::ExpiredToken.into()
}

#[inline]
pub fn malformed_token<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::MalformedToken(err.to_string()).into()
}

#[inline]
pub fn type_mismatch(
    expected: &'static str,
    found: &'static str,
) -> WithBacktrace {
    Code::TypeMismatch { expected, found }.into()
}

#[inline]
pub fn revoked_refresh_token() -> WithBacktrace {
    Code::RevokedOrUnknownRefreshToken.into()
}

#[inline]
pub fn denied<S: ToString + ?Sized>(
    requirement: &S,
    held: Vec<String>,
) -> WithBacktrace {
    Code::Denied {
        requirement: requirement.to_string(),
        held,
    }
    .into()
}

#[inline]
pub fn unauthorized() -> WithBacktrace {
    Code::Unauthorized.into()
}

#[inline]
pub fn bad_request<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::BadRequest(err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(expired_token().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            unknown_signing_key("key-1").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            denied("permission `delete:users`", vec![]).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(unknown_key("key-1").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            no_active_key().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn compare_by_code() {
        assert_eq!(malformed_token("a"), malformed_token("b"));
        assert_ne!(malformed_token("a"), expired_token());
    }

    #[test]
    fn denied_message_lists_held_permissions() {
        let err = denied(
            "permission `delete:users`",
            vec!["read:data".to_owned()],
        );
        assert_eq!(
            err.to_string(),
            "Denied. permission `delete:users` is required, held: \
             [\"read:data\"]"
        );
        assert!(matches!(Code::from(err), Code::Denied { .. }));
    }
}
