//! Portainer source: stacks fetched from the Portainer HTTP API.
//!
//! One run performs:
//!
//! 1. `POST /api/auth` with `{"username","password"}` → `{"jwt"}`
//! 2. `GET /api/stacks` → stack list
//! 3. `GET /api/stacks/{id}/file` → `{"StackFileContent"}` per stack
//!
//! Any failure aborts enumeration; a partial list is never returned.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use salvage_core::{Secret, Stack, StackOrigin};

use crate::error::SourceError;
use crate::{tls, StackSource};

/// A stack entry as listed by `GET /api/stacks`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PortainerStack {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub creation_date: i64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub update_date: i64,
    #[serde(default)]
    pub updated_by: String,
}

impl PortainerStack {
    /// Creation/update metadata; update fields only when Portainer recorded one.
    pub fn origin(&self) -> StackOrigin {
        let created_at = timestamp(self.creation_date);
        let (updated_at, updated_by) = if self.update_date != 0 {
            (timestamp(self.update_date), non_blank(&self.updated_by))
        } else {
            (None, None)
        };
        StackOrigin {
            created_at,
            created_by: non_blank(&self.created_by),
            updated_at,
            updated_by,
        }
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Utc.timestamp_opt(secs, 0).single()
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    jwt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StackFileResponse {
    #[serde(rename = "StackFileContent")]
    stack_file_content: Option<String>,
}

/// Client for one Portainer instance.
pub struct PortainerSource {
    base_url: String,
    username: String,
    password: Secret,
    timeout: Duration,
    insecure_tls: bool,
    agent: ureq::Agent,
}

fn agent_builder(timeout: Duration) -> ureq::AgentBuilder {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(concat!("salvage/", env!("CARGO_PKG_VERSION")))
}

impl PortainerSource {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: Secret,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password,
            timeout,
            insecure_tls: false,
            agent: agent_builder(timeout).build(),
        }
    }

    /// Accept any TLS certificate, such as the self-signed one Portainer
    /// generates on first start.
    pub fn with_insecure_tls(mut self) -> Result<Self, SourceError> {
        let tls = tls::insecure_client_config().map_err(|e| SourceError::Tls {
            message: e.to_string(),
        })?;
        tracing::warn!(
            "TLS certificate verification disabled for Portainer at {}",
            self.base_url
        );
        self.agent = agent_builder(self.timeout).tls_config(tls).build();
        self.insecure_tls = true;
        Ok(self)
    }

    pub fn insecure_tls(&self) -> bool {
        self.insecure_tls
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in and return the JWT used for subsequent calls.
    pub fn authenticate(&self) -> Result<String, SourceError> {
        let url = self.url("/api/auth");
        let response = self
            .agent
            .post(&url)
            .send_json(json!({
                "username": self.username,
                "password": self.password.expose(),
            }))
            .map_err(|e| match map_ureq(&url, e) {
                // Portainer answers bad credentials with 422.
                SourceError::Api {
                    url,
                    status: 422,
                    message,
                } => SourceError::Auth {
                    url,
                    status: 422,
                    message,
                },
                other => other,
            })?;

        let body: AuthResponse = response.into_json().map_err(|e| decode(&url, e))?;
        let jwt = body
            .jwt
            .filter(|j| !j.is_empty())
            .ok_or_else(|| SourceError::Decode {
                url: url.clone(),
                message: "JWT token not found in response".to_string(),
            })?;
        tracing::info!("authenticated with Portainer at {}", self.base_url);
        Ok(jwt)
    }

    /// List every stack visible to the authenticated user.
    pub fn list_stacks(&self, jwt: &str) -> Result<Vec<PortainerStack>, SourceError> {
        let url = self.url("/api/stacks");
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {jwt}"))
            .call()
            .map_err(|e| map_ureq(&url, e))?;
        let stacks: Vec<PortainerStack> = response.into_json().map_err(|e| decode(&url, e))?;
        tracing::info!("found {} Portainer stack(s)", stacks.len());
        Ok(stacks)
    }

    /// Fetch the compose file content of one stack.
    pub fn stack_file(&self, jwt: &str, stack: &PortainerStack) -> Result<String, SourceError> {
        let url = self.url(&format!("/api/stacks/{}/file", stack.id));
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {jwt}"))
            .call()
            .map_err(|e| map_ureq(&url, e))?;
        let body: StackFileResponse = response.into_json().map_err(|e| decode(&url, e))?;
        let content = body
            .stack_file_content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SourceError::Decode {
                url: url.clone(),
                message: format!("stack '{}' file content is empty", stack.name),
            })?;
        tracing::debug!("fetched stack '{}' from Portainer", stack.name);
        Ok(content)
    }
}

impl StackSource for PortainerSource {
    fn describe(&self) -> String {
        if self.insecure_tls {
            format!("Portainer {} (certificate not verified)", self.base_url)
        } else {
            format!("Portainer {}", self.base_url)
        }
    }

    fn stacks(&self) -> Result<Vec<Stack>, SourceError> {
        let jwt = self.authenticate()?;
        let listed = self.list_stacks(&jwt)?;
        if listed.is_empty() {
            return Err(SourceError::Empty {
                origin: self.describe(),
            });
        }

        let mut stacks: Vec<Stack> = Vec::with_capacity(listed.len());
        for entry in &listed {
            if stacks.iter().any(|s| s.name.as_str() == entry.name) {
                return Err(SourceError::DuplicateStack {
                    name: entry.name.clone(),
                    first: self.describe(),
                    second: format!("stack id {}", entry.id),
                });
            }
            let content = self.stack_file(&jwt, entry)?;
            stacks.push(Stack::new(entry.name.as_str(), content).with_origin(entry.origin()));
        }
        Ok(stacks)
    }
}

fn map_ureq(url: &str, err: ureq::Error) -> SourceError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response.into_string().unwrap_or_default();
            if status == 401 || status == 403 {
                SourceError::Auth {
                    url: url.to_string(),
                    status,
                    message,
                }
            } else {
                SourceError::Api {
                    url: url.to_string(),
                    status,
                    message,
                }
            }
        }
        ureq::Error::Transport(transport) => SourceError::Network {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}

fn decode(url: &str, err: std::io::Error) -> SourceError {
    SourceError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(update_date: i64) -> PortainerStack {
        PortainerStack {
            id: 3,
            name: "web".to_string(),
            creation_date: 1_700_000_000,
            created_by: "admin".to_string(),
            update_date,
            updated_by: "ops".to_string(),
        }
    }

    #[test]
    fn origin_omits_update_fields_when_never_updated() {
        let origin = entry(0).origin();
        assert_eq!(origin.created_by.as_deref(), Some("admin"));
        assert!(origin.created_at.is_some());
        assert!(origin.updated_at.is_none());
        assert!(origin.updated_by.is_none());
    }

    #[test]
    fn origin_includes_update_fields_when_present() {
        let origin = entry(1_700_000_600).origin();
        assert_eq!(origin.updated_by.as_deref(), Some("ops"));
        assert_eq!(
            origin.updated_at.map(|t| t.timestamp()),
            Some(1_700_000_600)
        );
    }

    #[test]
    fn stack_list_deserializes_pascal_case() {
        let raw = r#"[{"Id":1,"Name":"web","CreationDate":1700000000,"CreatedBy":"admin","UpdateDate":0,"UpdatedBy":"","EndpointId":2}]"#;
        let parsed: Vec<PortainerStack> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].id, 1);
        assert_eq!(parsed[0].name, "web");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let src = PortainerSource::new(
            "https://p.lan:9443/",
            "admin",
            Secret::new("pw"),
            Duration::from_secs(1),
        );
        assert_eq!(src.url("/api/auth"), "https://p.lan:9443/api/auth");
    }

    #[test]
    fn insecure_tls_is_opt_in() {
        let src = PortainerSource::new(
            "https://p.lan:9443",
            "admin",
            Secret::new("pw"),
            Duration::from_secs(1),
        );
        assert!(!src.insecure_tls());
        assert_eq!(src.describe(), "Portainer https://p.lan:9443");

        let src = src.with_insecure_tls().expect("tls config");
        assert!(src.insecure_tls());
        assert_eq!(
            src.describe(),
            "Portainer https://p.lan:9443 (certificate not verified)"
        );
    }
}
