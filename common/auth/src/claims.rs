use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Identity facts a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub username: String,
    pub role: Role,
}

impl TokenSubject {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

/// Verified token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    pub subject: String,
    pub role: Role,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub token_id: Option<String>,
}

/// Wire payload. Every field is optional so that absent claims surface as
/// `MissingClaims` rather than a decode failure.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ClaimsRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let subject = non_empty(value.sub).ok_or(AuthError::MissingClaims)?;
        let role = non_empty(value.role)
            .and_then(|raw| raw.parse::<Role>().ok())
            .ok_or(AuthError::MissingClaims)?;
        let expires_at = value
            .exp
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
            .ok_or(AuthError::MissingClaims)?;
        let issued_at = value.iat.and_then(|iat| Utc.timestamp_opt(iat, 0).single());

        Ok(Self {
            subject,
            role,
            issued_at,
            expires_at,
            token_id: non_empty(value.jti),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|item| !item.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repr() -> ClaimsRepr {
        ClaimsRepr {
            sub: Some("alice".into()),
            role: Some("USER".into()),
            iat: Some(1_700_000_000),
            exp: Some(1_700_086_400),
            jti: Some("abc".into()),
        }
    }

    #[test]
    fn converts_complete_payload() {
        let claims = Claims::try_from(repr()).expect("claims");
        assert_eq!(claims.subject, "alice");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.expires_at.timestamp(), 1_700_086_400);
        assert_eq!(claims.token_id.as_deref(), Some("abc"));
    }

    #[test]
    fn blank_subject_or_unknown_role_is_missing_claims() {
        let mut blank = repr();
        blank.sub = Some("   ".into());
        assert_eq!(Claims::try_from(blank), Err(AuthError::MissingClaims));

        let mut unknown = repr();
        unknown.role = Some("ROOT".into());
        assert_eq!(Claims::try_from(unknown), Err(AuthError::MissingClaims));

        let mut absent = repr();
        absent.role = None;
        assert_eq!(Claims::try_from(absent), Err(AuthError::MissingClaims));
    }
}
