//! Bearer-token principals.
//!
//! Staff authenticate with an HS256 JWT issued by the identity provider. Clients
//! without an account exchange an access link for a short-lived token scoped to
//! their own engagement; the link is re-checked on every request.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::state::AppState;
use crate::portal::PortalError;

pub const LINKED_CLIENT_ROLE: &str = "linked-client";

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| {
            if auth.len() > 7 && auth[..7].eq_ignore_ascii_case("bearer ") {
                Some(auth[7..].trim())
            } else {
                None
            }
        })
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffCapability {
    Admin,
    Analyst,
    Auditor,
}

impl std::fmt::Display for StaffCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Admin => "admin",
            Self::Analyst => "analyst",
            Self::Auditor => "auditor",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StaffCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "analyst" => Ok(Self::Analyst),
            "auditor" => Ok(Self::Auditor),
            _ => Err(format!("Role {s} has no staff access")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaffUser {
    pub subject: String,
    pub email: Option<String>,
    pub capability: StaffCapability,
}

/// A client that came in through an access link.
#[derive(Debug, Clone)]
pub struct LinkedClient {
    pub client_id: Uuid,
    pub link_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum Principal {
    Staff(StaffUser),
    LinkedClient(LinkedClient),
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    linked_client_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, linked_client_ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            linked_client_ttl: Duration::minutes(linked_client_ttl_minutes),
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, PortalError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| PortalError::Internal(format!("Failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, PortalError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Rejected bearer token: {}", e);
                PortalError::Unauthorized("Invalid token".to_string())
            })
    }

    pub fn issue_staff_token(
        &self,
        subject: &str,
        email: Option<&str>,
        capability: StaffCapability,
        ttl: Duration,
    ) -> Result<String, PortalError> {
        let now = Utc::now();
        self.sign(&Claims {
            sub: subject.to_string(),
            email: email.map(str::to_string),
            role: capability.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            client_id: None,
            link_id: None,
        })
    }

    pub fn issue_linked_client_token(
        &self,
        client_id: Uuid,
        link_id: Uuid,
    ) -> Result<(String, DateTime<Utc>), PortalError> {
        let now = Utc::now();
        let expires_at = now + self.linked_client_ttl;
        let token = self.sign(&Claims {
            sub: format!("link:{link_id}"),
            email: None,
            role: LINKED_CLIENT_ROLE.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            client_id: Some(client_id),
            link_id: Some(link_id),
        })?;
        Ok((token, expires_at))
    }
}

fn claims_from_parts(parts: &Parts, keys: &JwtKeys) -> Result<Claims, PortalError> {
    let token = extract_bearer_token(&parts.headers)
        .ok_or_else(|| PortalError::Unauthorized("No authentication token".to_string()))?;
    keys.verify(token)
}

fn staff_from_claims(claims: Claims) -> Result<StaffUser, PortalError> {
    let capability: StaffCapability = claims.role.parse().map_err(PortalError::Forbidden)?;
    Ok(StaffUser {
        subject: claims.sub,
        email: claims.email,
        capability,
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for StaffUser {
    type Rejection = PortalError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, &state.tokens)?;
        staff_from_claims(claims)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = PortalError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, &state.tokens)?;
        if claims.role != LINKED_CLIENT_ROLE {
            return staff_from_claims(claims).map(Principal::Staff);
        }

        let (Some(client_id), Some(link_id)) = (claims.client_id, claims.link_id) else {
            return Err(PortalError::Unauthorized("Malformed client token".to_string()));
        };
        state.portal.verify_link_session(link_id, client_id).await?;
        Ok(Principal::LinkedClient(LinkedClient { client_id, link_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn keys() -> JwtKeys {
        JwtKeys::new("test-secret", 30)
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(extract_bearer_token(&headers), Some("xyz"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert!(extract_bearer_token(&headers).is_none());
    }

    #[test]
    fn test_staff_token_round_trip() {
        let keys = keys();
        let token = keys
            .issue_staff_token(
                "user-1",
                Some("analyst@example.com"),
                StaffCapability::Analyst,
                Duration::minutes(5),
            )
            .unwrap();
        let staff = staff_from_claims(keys.verify(&token).unwrap()).unwrap();
        assert_eq!(staff.capability, StaffCapability::Analyst);
        assert_eq!(staff.email.as_deref(), Some("analyst@example.com"));
    }

    #[test]
    fn test_other_roles_are_forbidden() {
        let claims = Claims {
            sub: "user-2".to_string(),
            email: None,
            role: "client".to_string(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iat: Utc::now().timestamp(),
            client_id: None,
            link_id: None,
        };
        assert!(matches!(
            staff_from_claims(claims).unwrap_err(),
            PortalError::Forbidden(_)
        ));
    }

    #[test]
    fn test_expired_and_foreign_tokens_rejected() {
        let keys = keys();
        let expired = keys
            .issue_staff_token("u", None, StaffCapability::Admin, Duration::minutes(-10))
            .unwrap();
        assert!(matches!(
            keys.verify(&expired).unwrap_err(),
            PortalError::Unauthorized(_)
        ));

        let foreign = JwtKeys::new("other-secret", 30)
            .issue_staff_token("u", None, StaffCapability::Admin, Duration::minutes(5))
            .unwrap();
        assert!(matches!(
            keys.verify(&foreign).unwrap_err(),
            PortalError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_linked_client_token_carries_scope() {
        let keys = keys();
        let client_id = Uuid::new_v4();
        let link_id = Uuid::new_v4();
        let (token, expires_at) = keys.issue_linked_client_token(client_id, link_id).unwrap();
        assert!(expires_at > Utc::now());
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.role, LINKED_CLIENT_ROLE);
        assert_eq!(claims.client_id, Some(client_id));
        assert_eq!(claims.link_id, Some(link_id));
    }
}
