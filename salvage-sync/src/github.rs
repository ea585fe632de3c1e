//! GitHub contents-API implementation of [`RemoteRepository`].
//!
//! # Calls
//!
//! | Operation     | Request                                              |
//! |---------------|------------------------------------------------------|
//! | resolve owner | `GET /user` (only for a bare repository name)        |
//! | open          | `GET /repos/{owner}/{repo}`                          |
//! | get_file      | `GET /repos/{owner}/{repo}/contents/{path}?ref=`     |
//! | put_file      | `PUT /repos/{owner}/{repo}/contents/{path}`          |
//! | delete_file   | `DELETE /repos/{owner}/{repo}/contents/{path}`       |
//! | list_files    | `GET .../contents/{dir}?ref=`, recursing into dirs   |
//!
//! Updates and deletes carry the blob `sha` read earlier; GitHub rejects a
//! stale one with 409, which surfaces as [`RepoError::Conflict`].

use std::collections::VecDeque;
use std::io::Read;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use salvage_core::{config::GitHubSettings, ConfigError, RemoteFile, RevisionHandle, Secret};

use crate::error::RepoError;
use crate::repository::{PutOutcome, RemoteEntry, RemoteRepository};

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";
const API_VERSION: &str = "2022-11-28";
/// Upper bound for raw downloads of files the JSON API will not inline.
const RAW_LIMIT: u64 = 100 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UserInfo {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    full_name: String,
    private: bool,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(default)]
    content: Option<WrittenContent>,
    #[serde(default)]
    commit: Option<CommitInfo>,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    #[serde(default)]
    html_url: Option<String>,
}

// ---------------------------------------------------------------------------
// GitHubRepository
// ---------------------------------------------------------------------------

/// One GitHub repository and branch, opened and verified.
pub struct GitHubRepository {
    agent: ureq::Agent,
    api_url: Url,
    token: Secret,
    owner: String,
    name: String,
    branch: String,
    private: bool,
}

impl GitHubRepository {
    /// Resolve and verify the repository.
    ///
    /// `repository` is `owner/name`, or a bare `name` owned by the token's
    /// user. Fails with [`RepoError::NotPrivate`] for a public repository
    /// when `require_private` is set.
    pub fn open(
        api_url: &str,
        token: Secret,
        repository: &str,
        branch: Option<&str>,
        require_private: bool,
        timeout: Duration,
    ) -> Result<Self, RepoError> {
        let api_url = Url::parse(api_url).map_err(|e| RepoError::InvalidUrl {
            url: api_url.to_string(),
            message: e.to_string(),
        })?;
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("salvage/", env!("CARGO_PKG_VERSION")))
            .build();

        let mut repo = Self {
            agent,
            api_url,
            token,
            owner: String::new(),
            name: String::new(),
            branch: String::new(),
            private: false,
        };

        let (owner, name) = match split_repository(repository)? {
            (Some(owner), name) => (owner.to_string(), name.to_string()),
            (None, name) => (repo.authenticated_login()?, name.to_string()),
        };
        repo.owner = owner;
        repo.name = name;

        let info = repo.repository_info()?;
        if require_private && !info.private {
            tracing::error!(
                "GitHub repository {} is not private, refusing to proceed",
                info.full_name
            );
            return Err(RepoError::NotPrivate {
                repository: info.full_name,
            });
        }
        repo.private = info.private;
        repo.branch = branch
            .map(str::to_string)
            .unwrap_or(info.default_branch);

        tracing::debug!("loaded GitHub repository {}", repo.describe());
        Ok(repo)
    }

    /// [`open`](Self::open) with values from [`GitHubSettings`].
    pub fn from_settings(settings: &GitHubSettings, timeout: Duration) -> Result<Self, RepoError> {
        let token = settings.token.clone().ok_or(ConfigError::Missing {
            key: "GITHUB_ACCESS_TOKEN",
        })?;
        let repository = settings.repository.as_deref().ok_or(ConfigError::Missing {
            key: "GITHUB_REPOSITORY",
        })?;
        Self::open(
            &settings.api_url,
            token,
            repository,
            settings.branch.as_deref(),
            settings.require_private,
            timeout,
        )
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    // -- URL and request helpers -------------------------------------------

    fn endpoint<'a, I>(&self, segments: I) -> Result<Url, RepoError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| RepoError::InvalidUrl {
                url: self.api_url.to_string(),
                message: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn contents_url(&self, path: &str, with_ref: bool) -> Result<Url, RepoError> {
        let base = ["repos", self.owner.as_str(), self.name.as_str(), "contents"];
        let mut url = self.endpoint(
            base.into_iter()
                .chain(path.split('/').filter(|s| !s.is_empty())),
        )?;
        if with_ref {
            url.query_pairs_mut().append_pair("ref", &self.branch);
        }
        Ok(url)
    }

    fn request(&self, method: &str, url: &Url, accept: &str) -> ureq::Request {
        self.agent
            .request_url(method, url)
            .set("Authorization", &format!("Bearer {}", self.token.expose()))
            .set("Accept", accept)
            .set("X-GitHub-Api-Version", API_VERSION)
    }

    fn authenticated_login(&self) -> Result<String, RepoError> {
        let url = self.endpoint(["user"])?;
        let response = self
            .request("GET", &url, ACCEPT_JSON)
            .call()
            .map_err(|e| map_ureq(url.as_str(), "", e))?;
        let user: UserInfo = response.into_json().map_err(|e| decode(url.as_str(), e))?;
        tracing::debug!("authenticated with GitHub as {}", user.login);
        Ok(user.login)
    }

    fn repository_info(&self) -> Result<RepoInfo, RepoError> {
        let url = self.endpoint(["repos", self.owner.as_str(), self.name.as_str()])?;
        match self.request("GET", &url, ACCEPT_JSON).call() {
            Ok(response) => response.into_json().map_err(|e| decode(url.as_str(), e)),
            Err(ureq::Error::Status(404, _)) => Err(RepoError::RepositoryNotFound {
                repository: self.full_name(),
            }),
            Err(e) => Err(map_ureq(url.as_str(), "", e)),
        }
    }

    fn download_raw(&self, path: &str) -> Result<Vec<u8>, RepoError> {
        let url = self.contents_url(path, true)?;
        let response = self
            .request("GET", &url, ACCEPT_RAW)
            .call()
            .map_err(|e| map_ureq(url.as_str(), path, e))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(RAW_LIMIT)
            .read_to_end(&mut bytes)
            .map_err(|e| decode(url.as_str(), e))?;
        Ok(bytes)
    }

    fn write(
        &self,
        method: &str,
        path: &str,
        body: Value,
    ) -> Result<PutOutcome, RepoError> {
        let url = self.contents_url(path, false)?;
        let response = self
            .request(method, &url, ACCEPT_JSON)
            .send_json(body)
            .map_err(|e| map_ureq(url.as_str(), path, e))?;
        let parsed: WriteResponse = response.into_json().map_err(|e| decode(url.as_str(), e))?;
        Ok(PutOutcome {
            revision: parsed.content.map(|c| RevisionHandle(c.sha)),
            commit_url: parsed.commit.and_then(|c| c.html_url),
        })
    }
}

impl RemoteRepository for GitHubRepository {
    fn describe(&self) -> String {
        format!("{}/{}@{}", self.owner, self.name, self.branch)
    }

    fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, RepoError> {
        let url = self.contents_url(path, true)?;
        let response = match self.request("GET", &url, ACCEPT_JSON).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                tracing::debug!("{path} not found in {}", self.describe());
                return Ok(None);
            }
            Err(e) => return Err(map_ureq(url.as_str(), path, e)),
        };

        let value: Value = response.into_json().map_err(|e| decode(url.as_str(), e))?;
        if value.is_array() {
            return Err(RepoError::NotAFile {
                path: path.to_string(),
            });
        }
        let item: ContentItem =
            serde_json::from_value(value).map_err(|e| RepoError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        if item.kind != "file" {
            return Err(RepoError::NotAFile { path: item.path });
        }

        let content = match (item.encoding.as_deref(), item.content.as_deref()) {
            (Some("base64"), Some(encoded)) => decode_base64(url.as_str(), encoded)?,
            // Files over 1 MB come back with encoding "none" and no content.
            _ => self.download_raw(path)?,
        };

        Ok(Some(RemoteFile {
            path: item.path,
            content,
            revision: RevisionHandle(item.sha),
        }))
    }

    fn put_file(
        &self,
        path: &str,
        content: &[u8],
        previous: Option<&RevisionHandle>,
        message: &str,
    ) -> Result<PutOutcome, RepoError> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": self.branch,
        });
        if let Some(sha) = previous {
            body["sha"] = Value::String(sha.0.clone());
        }
        let outcome = self.write("PUT", path, body)?;
        tracing::debug!("saved {path} to {}", self.describe());
        Ok(outcome)
    }

    fn list_files(&self, dir: &str) -> Result<Vec<RemoteEntry>, RepoError> {
        let mut files = Vec::new();
        let mut pending = VecDeque::from([dir.trim_matches('/').to_string()]);

        while let Some(current) = pending.pop_front() {
            let url = self.contents_url(&current, true)?;
            let response = match self.request("GET", &url, ACCEPT_JSON).call() {
                Ok(response) => response,
                Err(ureq::Error::Status(404, _)) => continue,
                Err(e) => return Err(map_ureq(url.as_str(), &current, e)),
            };
            let value: Value = response.into_json().map_err(|e| decode(url.as_str(), e))?;
            let items: Vec<ContentItem> = if value.is_array() {
                serde_json::from_value(value)
            } else {
                serde_json::from_value::<ContentItem>(value).map(|item| vec![item])
            }
            .map_err(|e| RepoError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            for item in items {
                match item.kind.as_str() {
                    "dir" => pending.push_back(item.path),
                    "file" => files.push(RemoteEntry {
                        path: item.path,
                        revision: RevisionHandle(item.sha),
                    }),
                    _ => tracing::trace!("skipping {} ({})", item.path, item.kind),
                }
            }
        }

        tracing::debug!("found {} file(s) in {}", files.len(), self.describe());
        Ok(files)
    }

    fn delete_file(
        &self,
        path: &str,
        revision: &RevisionHandle,
        message: &str,
    ) -> Result<PutOutcome, RepoError> {
        let body = json!({
            "message": message,
            "sha": revision.0,
            "branch": self.branch,
        });
        let outcome = self.write("DELETE", path, body)?;
        tracing::debug!("deleted {path} from {}", self.describe());
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Translate a ureq failure into the repository error taxonomy.
fn map_ureq(url: &str, path: &str, err: ureq::Error) -> RepoError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = error_message(response.into_string().unwrap_or_default());
            classify_status(url, path, status, message)
        }
        ureq::Error::Transport(transport) => RepoError::Network {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}

fn classify_status(url: &str, path: &str, status: u16, message: String) -> RepoError {
    let lower = message.to_ascii_lowercase();
    match status {
        401 => RepoError::Auth { status, message },
        403 if !lower.contains("rate limit") => RepoError::Auth { status, message },
        409 => RepoError::Conflict {
            path: path.to_string(),
            message,
        },
        // "sha wasn't supplied" / "does not match": the file moved under us.
        422 if lower.contains("sha") => RepoError::Conflict {
            path: path.to_string(),
            message,
        },
        _ => RepoError::Api {
            url: url.to_string(),
            status,
            message,
        },
    }
}

/// GitHub errors are `{"message": "..."}`; fall back to the raw body.
fn error_message(body: String) -> String {
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body)
}

fn decode(url: &str, err: std::io::Error) -> RepoError {
    RepoError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// GitHub wraps base64 content at 60 columns.
fn decode_base64(url: &str, encoded: &str) -> Result<Vec<u8>, RepoError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64.decode(compact).map_err(|e| RepoError::Decode {
        url: url.to_string(),
        message: format!("invalid base64 content: {e}"),
    })
}

/// Split `owner/name` or a bare `name`. Both parts must be single non-empty segments.
fn split_repository(repository: &str) -> Result<(Option<&str>, &str), ConfigError> {
    let trimmed = repository.trim();
    let invalid = |reason: &str| ConfigError::Invalid {
        key: "GITHUB_REPOSITORY",
        value: repository.to_string(),
        reason: reason.to_string(),
    };
    let (owner, name) = match trimmed.split_once('/') {
        Some((owner, name)) => (Some(owner), name),
        None => (None, trimmed),
    };
    if owner.is_some_and(str::is_empty) || name.is_empty() {
        return Err(invalid("expected owner/name or name"));
    }
    if name.contains('/') {
        return Err(invalid("expected at most one '/'"));
    }
    Ok((owner, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_with_line_breaks_decodes() {
        let encoded = "aW1hZ2U6\nIG5naW54\n";
        assert_eq!(decode_base64("u", encoded).unwrap(), b"image: nginx".to_vec());
    }

    #[test]
    fn invalid_base64_is_decode_error() {
        assert!(matches!(
            decode_base64("u", "!!!"),
            Err(RepoError::Decode { .. })
        ));
    }

    #[test]
    fn status_classification() {
        assert!(classify_status("u", "p", 401, "Bad credentials".into()).is_auth());
        assert!(classify_status("u", "p", 403, "Resource not accessible".into()).is_auth());
        assert!(matches!(
            classify_status("u", "p", 403, "API rate limit exceeded".into()),
            RepoError::Api { status: 403, .. }
        ));
        assert!(classify_status("u", "p", 409, "does not match".into()).is_conflict());
        assert!(classify_status("u", "p", 422, "\"sha\" wasn't supplied.".into()).is_conflict());
        assert!(matches!(
            classify_status("u", "p", 422, "Invalid request".into()),
            RepoError::Api { status: 422, .. }
        ));
    }

    #[test]
    fn error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"message":"Not Found","documentation_url":"x"}"#.to_string()),
            "Not Found"
        );
        assert_eq!(error_message("plain".to_string()), "plain");
    }

    #[test]
    fn repository_names_split_into_owner_and_name() {
        assert_eq!(split_repository("acme/backups").unwrap(), (Some("acme"), "backups"));
        assert_eq!(split_repository(" backups ").unwrap(), (None, "backups"));
    }

    #[test]
    fn malformed_repository_names_are_config_errors() {
        for bad in ["acme/", "/backups", "acme/backups/extra", "", "  "] {
            let err = split_repository(bad).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "GITHUB_REPOSITORY", .. }),
                "{bad:?} gave {err}"
            );
        }
    }
}
