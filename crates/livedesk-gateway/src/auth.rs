// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token verification for both socket populations and the REST surface.
//!
//! - Agents present a tenant JWT (HS256, `jwt_secret`). The projects they
//!   may serve are the keys of its `role_bindings` claim.
//! - Visitors present a session token signed with their widget's key,
//!   `hex(HMAC-SHA256(widget_secret, widget_id))`.
//!
//! A missing secret rejects every token of that kind (fail-closed).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use livedesk_config::model::AuthConfig;
use livedesk_core::LivedeskError;

type HmacSha256 = Hmac<Sha256>;

/// Claims of a tenant agent token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentClaims {
    pub sub: String,
    pub tenant_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub email: String,
    /// project id -> roles
    #[serde(default)]
    pub role_bindings: BTreeMap<String, Vec<String>>,
    pub exp: i64,
    pub iat: i64,
}

/// Claims of a visitor session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorClaims {
    pub session_id: String,
    pub widget_id: String,
    pub tenant_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_name: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// An authenticated agent, attached to REST requests as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub tenant_id: String,
    pub email: String,
    pub project_ids: Vec<String>,
}

impl AgentIdentity {
    pub fn serves(&self, project_id: &str) -> bool {
        self.project_ids.iter().any(|p| p == project_id)
    }
}

impl From<AgentClaims> for AgentIdentity {
    fn from(claims: AgentClaims) -> Self {
        Self {
            agent_id: claims.agent_id,
            tenant_id: claims.tenant_id,
            email: claims.email,
            project_ids: claims.role_bindings.into_keys().collect(),
        }
    }
}

#[derive(Clone, Default)]
pub struct TokenVerifier {
    jwt_secret: Option<String>,
    widget_secret: Option<String>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[redacted]"))
            .field(
                "widget_secret",
                &self.widget_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(jwt_secret: Option<String>, widget_secret: Option<String>) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        Self {
            jwt_secret: non_empty(jwt_secret),
            widget_secret: non_empty(widget_secret),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.clone(), config.widget_secret.clone())
    }

    /// Signing key of one widget.
    pub fn widget_key(&self, widget_id: &str) -> Result<String, LivedeskError> {
        let secret = self
            .widget_secret
            .as_deref()
            .ok_or_else(|| LivedeskError::Unauthorized("visitor auth is not configured".into()))?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| LivedeskError::Internal(format!("invalid widget secret: {e}")))?;
        mac.update(widget_id.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify_agent(&self, token: &str) -> Result<AgentIdentity, LivedeskError> {
        let secret = self
            .jwt_secret
            .as_deref()
            .ok_or_else(|| LivedeskError::Unauthorized("agent auth is not configured".into()))?;
        let claims: AgentClaims = decode(token, secret.as_bytes())?;
        if claims.agent_id.is_empty() || claims.tenant_id.is_empty() {
            return Err(LivedeskError::Unauthorized(
                "token carries no agent identity".into(),
            ));
        }
        Ok(claims.into())
    }

    /// Checks the token against the key of `widget_id` and that the token
    /// was issued for that widget.
    pub fn verify_visitor(
        &self,
        widget_id: &str,
        token: &str,
    ) -> Result<VisitorClaims, LivedeskError> {
        let key = self.widget_key(widget_id)?;
        let claims: VisitorClaims = decode(token, key.as_bytes())?;
        if claims.widget_id != widget_id {
            return Err(LivedeskError::Unauthorized(
                "session token was issued for another widget".into(),
            ));
        }
        if claims.session_id.is_empty() {
            return Err(LivedeskError::Unauthorized("session token has no session".into()));
        }
        Ok(claims)
    }

    pub fn sign_agent(&self, claims: &AgentClaims) -> Result<String, LivedeskError> {
        let secret = self
            .jwt_secret
            .as_deref()
            .ok_or_else(|| LivedeskError::Config("jwt_secret is not set".into()))?;
        encode(claims, secret.as_bytes())
    }

    pub fn sign_visitor(&self, claims: &VisitorClaims) -> Result<String, LivedeskError> {
        let key = self.widget_key(&claims.widget_id)?;
        encode(claims, key.as_bytes())
    }
}

fn decode<T: serde::de::DeserializeOwned>(token: &str, key: &[u8]) -> Result<T, LivedeskError> {
    jsonwebtoken::decode::<T>(
        token,
        &DecodingKey::from_secret(key),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| LivedeskError::Unauthorized(format!("invalid token: {e}")))
}

fn encode<T: Serialize>(claims: &T, key: &[u8]) -> Result<String, LivedeskError> {
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(key))
        .map_err(|e| LivedeskError::Internal(format!("failed to sign token: {e}")))
}

/// `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Requires a valid agent JWT and attaches the [`AgentIdentity`].
pub async fn auth_middleware(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    match verifier.verify_agent(&token) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::debug!(error = %e, "rejected agent token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(Some("jwt-secret".into()), Some("widget-secret".into()))
    }

    fn visitor(widget_id: &str, exp_offset: i64) -> VisitorClaims {
        let now = chrono::Utc::now().timestamp();
        VisitorClaims {
            session_id: "s1".into(),
            widget_id: widget_id.into(),
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            visitor_name: Some("Dana".into()),
            exp: now + exp_offset,
            iat: now,
        }
    }

    fn agent() -> AgentClaims {
        let now = chrono::Utc::now().timestamp();
        AgentClaims {
            sub: "user-1".into(),
            tenant_id: "t1".into(),
            agent_id: "a1".into(),
            email: "a1@example.com".into(),
            role_bindings: BTreeMap::from([
                ("p1".to_string(), vec!["agent".to_string()]),
                ("p2".to_string(), vec!["admin".to_string()]),
            ]),
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn widget_key_is_stable_hex() {
        let v = verifier();
        let key = v.widget_key("w1").unwrap();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, v.widget_key("w1").unwrap());
        assert_ne!(key, v.widget_key("w2").unwrap());
    }

    #[test]
    fn visitor_token_round_trip() {
        let v = verifier();
        let token = v.sign_visitor(&visitor("w1", 3600)).unwrap();
        let claims = v.verify_visitor("w1", &token).unwrap();
        assert_eq!(claims.session_id, "s1");
        assert_eq!(claims.project_id, "p1");
        assert_eq!(claims.visitor_name.as_deref(), Some("Dana"));
    }

    #[test]
    fn visitor_token_for_other_widget_is_rejected() {
        let v = verifier();
        let token = v.sign_visitor(&visitor("w1", 3600)).unwrap();
        assert!(matches!(
            v.verify_visitor("w2", &token),
            Err(LivedeskError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_visitor_token_is_rejected() {
        let v = verifier();
        let token = v.sign_visitor(&visitor("w1", -3600)).unwrap();
        assert!(v.verify_visitor("w1", &token).is_err());
    }

    #[test]
    fn token_from_another_deployment_is_rejected() {
        let other = TokenVerifier::new(Some("other".into()), Some("other".into()));
        let token = other.sign_visitor(&visitor("w1", 3600)).unwrap();
        assert!(verifier().verify_visitor("w1", &token).is_err());
        let token = other.sign_agent(&agent()).unwrap();
        assert!(verifier().verify_agent(&token).is_err());
    }

    #[test]
    fn agent_projects_come_from_role_bindings() {
        let v = verifier();
        let identity = v.verify_agent(&v.sign_agent(&agent()).unwrap()).unwrap();
        assert_eq!(identity.agent_id, "a1");
        assert_eq!(identity.project_ids, vec!["p1".to_string(), "p2".to_string()]);
        assert!(identity.serves("p2"));
        assert!(!identity.serves("p3"));
    }

    #[test]
    fn missing_secrets_fail_closed() {
        let token = verifier().sign_agent(&agent()).unwrap();
        let empty = TokenVerifier::new(None, Some(String::new()));
        assert!(matches!(
            empty.verify_agent(&token),
            Err(LivedeskError::Unauthorized(_))
        ));
        assert!(empty.verify_visitor("w1", "anything").is_err());
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let output = format!("{:?}", verifier());
        assert!(!output.contains("jwt-secret"));
        assert!(output.contains("[redacted]"));
    }
}
