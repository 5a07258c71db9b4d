use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::CaptureError;
use crate::router;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Ingest,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "ingest" => Ok(Role::Ingest),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// One key per role, configured as `admin:<key>,ingest:<key>`.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys(HashMap<Role, String>);

impl ApiKeys {
    pub fn authorizes(&self, role: Role, presented: Option<&str>) -> bool {
        match (self.0.get(&role), presented) {
            (Some(expected), Some(presented)) => expected == presented,
            _ => false,
        }
    }
}

impl FromStr for ApiKeys {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut keys = HashMap::new();
        for entry in s.split(',') {
            let Some((role, key)) = entry.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if role.trim().is_empty() || key.is_empty() {
                continue;
            }
            keys.insert(role.parse()?, key.to_string());
        }
        Ok(ApiKeys(keys))
    }
}

fn authorize(state: &router::State, role: Role, req: &Request) -> Result<(), CaptureError> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if state.api_keys.authorizes(role, presented) {
        Ok(())
    } else {
        metrics::counter!("capture_unauthorized_requests_total").increment(1);
        Err(CaptureError::Unauthorized)
    }
}

pub async fn require_ingest(
    State(state): State<router::State>,
    req: Request,
    next: Next,
) -> Result<Response, CaptureError> {
    authorize(&state, Role::Ingest, &req)?;
    Ok(next.run(req).await)
}

pub async fn require_admin(
    State(state): State<router::State>,
    req: Request,
    next: Next,
) -> Result<Response, CaptureError> {
    authorize(&state, Role::Admin, &req)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_role_keys() {
        let keys: ApiKeys = "admin:s3cret, ingest:feed ,broken,:x,ingest2".parse().unwrap();

        assert!(keys.authorizes(Role::Admin, Some("s3cret")));
        assert!(keys.authorizes(Role::Ingest, Some("feed")));
        assert!(!keys.authorizes(Role::Ingest, Some("s3cret")));
        assert!(!keys.authorizes(Role::Admin, None));
    }

    #[test]
    fn unknown_roles_are_errors() {
        assert!("root:x".parse::<ApiKeys>().is_err());
    }

    #[test]
    fn unconfigured_role_rejects_everything() {
        let keys: ApiKeys = "admin:s3cret".parse().unwrap();
        assert!(!keys.authorizes(Role::Ingest, Some("")));
        assert!(!keys.authorizes(Role::Ingest, Some("s3cret")));
    }
}
