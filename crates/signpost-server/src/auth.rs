use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use signpost_common::scope::Scope;

use crate::api::error_response;
use crate::logging::TraceId;
use crate::state::AppState;

/// 编辑账号角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorRole {
    Editor,
    Superuser,
}

impl std::str::FromStr for EditorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "editor" => Ok(Self::Editor),
            "superuser" => Ok(Self::Superuser),
            other => Err(format!("unknown editor role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: EditorRole,
    /// 可编辑的诊所 ID 列表
    #[serde(default)]
    pub surgeries: Vec<String>,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn is_superuser(&self) -> bool {
        self.role == EditorRole::Superuser
    }

    /// Superusers may act on every scope including the global default;
    /// editors only on the surgeries listed in their token.
    pub fn can_edit(&self, scope: &Scope) -> bool {
        match scope {
            _ if self.is_superuser() => true,
            Scope::Tenant(id) => self.surgeries.iter().any(|s| s == id),
            Scope::GlobalDefault => false,
        }
    }
}

pub fn create_token(
    secret: &str,
    user_id: &str,
    username: &str,
    role: EditorRole,
    surgeries: &[String],
    expire_secs: u64,
) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role,
        surgeries: surgeries.to_vec(),
        iat: now,
        exp: now + expire_secs,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// JWT 鉴权中间件
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => token,
        Some(_) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "invalid authorization header",
            );
        }
        None if auth_header.is_some() => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "invalid authorization header",
            );
        }
        None => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "missing authorization header",
            );
        }
    };

    match validate_token(&state.jwt_secret, token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature) => {
            error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "token_expired",
                "token expired",
            )
        }
        Err(_) => error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "invalid token",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: EditorRole, surgeries: &[&str]) -> Claims {
        Claims {
            sub: "u1".into(),
            username: "editor".into(),
            role,
            surgeries: surgeries.iter().map(|s| s.to_string()).collect(),
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn editor_limited_to_listed_surgeries() {
        let c = claims(EditorRole::Editor, &["s1"]);
        assert!(c.can_edit(&Scope::Tenant("s1".into())));
        assert!(!c.can_edit(&Scope::Tenant("s2".into())));
        assert!(!c.can_edit(&Scope::GlobalDefault));
    }

    #[test]
    fn superuser_can_edit_global_default() {
        let c = claims(EditorRole::Superuser, &[]);
        assert!(c.can_edit(&Scope::GlobalDefault));
        assert!(c.can_edit(&Scope::Tenant("any".into())));
    }

    #[test]
    fn token_round_trip_keeps_role_and_surgeries() {
        let surgeries = vec!["s1".to_string(), "s2".to_string()];
        let token =
            create_token("secret", "u1", "alice", EditorRole::Editor, &surgeries, 60).unwrap();
        let claims = validate_token("secret", &token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, EditorRole::Editor);
        assert_eq!(claims.surgeries, surgeries);
        assert!(validate_token("other-secret", &token).is_err());
    }
}
