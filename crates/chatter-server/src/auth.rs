//! Handshake authentication.
//!
//! Credentials are HS256 JWTs carrying `userId` and `username` claims. A
//! browser presents one as a cookie on the upgrade request; other clients
//! may pass it as a `token` query parameter instead.

use axum::http::{header::COOKIE, HeaderMap};
use chatter_core::{AuthError, Identity, IdentityVerifier};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Claims carried by a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    /// Expiry in seconds since the Unix epoch. Credentials without one never
    /// expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Verifies HS256 credentials against a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier for `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is checked when present but not required
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let data = decode::<Claims>(credential, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidCredential(e.to_string()),
            }
        })?;

        let claims = data.claims;
        if claims.user_id.is_empty() {
            return Err(AuthError::InvalidCredential("empty userId".into()));
        }

        Ok(Identity::new(claims.user_id, claims.username))
    }
}

/// Sign a credential for `identity`.
///
/// Issuance belongs to the login flow, not the hub; this exists for tests and
/// tooling.
///
/// # Errors
///
/// Returns an error if the claims cannot be encoded.
pub fn issue_token(
    secret: &str,
    identity: &Identity,
    ttl: Option<Duration>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = ttl.map(|ttl| {
        SystemTime::now()
            .checked_add(ttl)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(u64::MAX)
    });

    let claims = Claims {
        user_id: identity.user_id.to_string(),
        username: identity.username.clone(),
        exp,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Find the credential on a request: the named cookie first, then the
/// `token` query parameter.
#[must_use]
pub fn extract_credential(
    headers: &HeaderMap,
    cookie_name: &str,
    query: Option<&str>,
) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        query?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, value)| *name == "token" && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn alice() -> Identity {
        Identity::new("u-alice", "alice")
    }

    #[test]
    fn test_issue_and_verify() {
        let token = issue_token(SECRET, &alice(), None).unwrap();
        let identity = JwtVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(identity, alice());
    }

    #[test]
    fn test_verify_with_future_expiry() {
        let token = issue_token(SECRET, &alice(), Some(Duration::from_secs(3600))).unwrap();
        assert!(JwtVerifier::new(SECRET).verify(&token).is_ok());
    }

    #[test]
    fn test_expired_credential() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            user_id: "u-alice".into(),
            username: "alice".into(),
            exp: Some(now - 3600),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(
            JwtVerifier::new(SECRET).verify(&token),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("other-secret", &alice(), None).unwrap();
        assert!(matches!(
            JwtVerifier::new(SECRET).verify(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_garbage_and_empty() {
        let verifier = JwtVerifier::new(SECRET);
        assert!(matches!(
            verifier.verify("not.a.jwt"),
            Err(AuthError::InvalidCredential(_))
        ));
        assert_eq!(verifier.verify(""), Err(AuthError::MissingCredential));
    }

    #[test]
    fn test_extract_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; token=abc.def.ghi; other=1"),
        );
        assert_eq!(
            extract_credential(&headers, "token", Some("token=fromquery")),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn test_extract_falls_back_to_query() {
        let headers = HeaderMap::new();
        assert_eq!(
            extract_credential(&headers, "token", Some("a=1&token=xyz")),
            Some("xyz".to_string())
        );
        assert_eq!(extract_credential(&headers, "token", Some("a=1")), None);
        assert_eq!(extract_credential(&headers, "token", None), None);
    }

    #[test]
    fn test_extract_custom_cookie_name() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("token=wrong; sid=right"));
        assert_eq!(
            extract_credential(&headers, "sid", None),
            Some("right".to_string())
        );
    }
}
