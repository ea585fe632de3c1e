//! Testing utilities for the Salvage workspace.
//!
//! The Salvage HTTP clients are blocking, so tests are plain `#[test]`
//! functions. [`MockApi`] owns a `wiremock` server together with the tokio
//! runtime that drives it and exposes blocking `mount`/`received` calls.
//!
//! [`ContentsApi`] is a stateful stand-in for the GitHub contents API that
//! honours revision checks on writes.

use std::collections::BTreeMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

// ---------------------------------------------------------------------------
// MockApi
// ---------------------------------------------------------------------------

/// A `wiremock` server usable from synchronous tests.
pub struct MockApi {
    server: MockServer,
    runtime: Runtime,
}

impl MockApi {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("tokio runtime");
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    /// Base URL without a trailing slash.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    /// Every request received so far, oldest first.
    pub fn received(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }

    pub fn received_with_method(&self, verb: &str) -> Vec<Request> {
        self.received()
            .into_iter()
            .filter(|r| r.method.as_str().eq_ignore_ascii_case(verb))
            .collect()
    }
}

/// A server that answers every request with `template`.
pub fn always(template: ResponseTemplate) -> MockApi {
    let api = MockApi::start();
    api.mount(Mock::given(path_regex(".*")).respond_with(template));
    api
}

/// A loopback URL with nothing listening on it.
pub fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Body as JSON, or `Value::Null` when it is not JSON.
pub fn body_json(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

/// Path plus query string, e.g. `/repos/a/b/contents/web.yaml?ref=main`.
pub fn path_and_query(request: &Request) -> String {
    match request.url.query() {
        Some(query) => format!("{}?{query}", request.url.path()),
        None => request.url.path().to_string(),
    }
}

// ---------------------------------------------------------------------------
// GitHub contents API
// ---------------------------------------------------------------------------

/// `GET /repos/{owner}/{name}` body.
pub fn repository_info(full_name: &str, private: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "full_name": full_name,
        "private": private,
        "default_branch": "main",
    }))
}

#[derive(Debug, Default)]
struct Store {
    /// path -> (content, revision number)
    files: BTreeMap<String, (String, u32)>,
    commits: u32,
}

/// Stateful file store answering `/repos/{owner}/{name}/contents/...`.
///
/// Revisions are reported as `sha-{n}`, starting at `sha-1`. Writes with a
/// stale or missing `sha` get a 409.
#[derive(Debug, Clone)]
pub struct ContentsApi {
    full_name: String,
    store: Arc<Mutex<Store>>,
}

impl ContentsApi {
    pub fn new(full_name: &str, initial: &[(&str, &str)]) -> Self {
        let store = Store {
            files: initial
                .iter()
                .map(|(p, c)| (p.to_string(), (c.to_string(), 1)))
                .collect(),
            commits: 0,
        };
        Self {
            full_name: full_name.to_string(),
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Mount the repository endpoint and this store on `api`.
    pub fn mount_on(&self, api: &MockApi, private: bool) {
        let repo_path = format!("/repos/{}", self.full_name);
        api.mount(
            Mock::given(method("GET"))
                .and(path(repo_path.as_str()))
                .respond_with(repository_info(&self.full_name, private)),
        );
        api.mount(
            Mock::given(path_regex(format!("^{repo_path}/contents/")))
                .respond_with(self.clone()),
        );
    }

    /// Current content of `path`, if stored.
    pub fn content(&self, path: &str) -> Option<String> {
        let store = self.store.lock().expect("store lock");
        store.files.get(path).map(|(c, _)| c.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        let store = self.store.lock().expect("store lock");
        store.files.keys().cloned().collect()
    }

    fn file_path<'a>(&self, request: &'a Request) -> Option<&'a str> {
        let prefix = format!("/repos/{}/contents/", self.full_name);
        request.url.path().strip_prefix(prefix.as_str())
    }

    fn commit(&self, store: &mut Store) -> Value {
        store.commits += 1;
        json!({ "html_url": format!("https://github.com/{}/commit/c{}", self.full_name, store.commits) })
    }
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" }))
}

fn stale() -> ResponseTemplate {
    ResponseTemplate::new(409).set_body_json(json!({ "message": "sha does not match" }))
}

impl Respond for ContentsApi {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some(file) = self.file_path(request) else {
            return not_found();
        };
        let mut store = self.store.lock().expect("store lock");
        let current = store.files.get(file).map(|(_, rev)| format!("sha-{rev}"));
        let body = body_json(request);
        let supplied = body.get("sha").and_then(Value::as_str).map(str::to_string);

        match request.method.as_str() {
            "GET" => {
                if let Some((content, rev)) = store.files.get(file) {
                    return ResponseTemplate::new(200).set_body_json(json!({
                        "type": "file",
                        "path": file,
                        "sha": format!("sha-{rev}"),
                        "encoding": "base64",
                        "content": BASE64.encode(content),
                    }));
                }
                let listing = list_dir(&store.files, file);
                if listing.is_empty() {
                    not_found()
                } else {
                    ResponseTemplate::new(200).set_body_json(Value::Array(listing))
                }
            }
            "PUT" => {
                if supplied != current {
                    return stale();
                }
                let encoded = body["content"].as_str().unwrap_or_default();
                let Some(content) = BASE64
                    .decode(encoded)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                else {
                    return ResponseTemplate::new(422)
                        .set_body_json(json!({ "message": "content is not valid Base64" }));
                };
                let rev = store.files.get(file).map(|(_, r)| r + 1).unwrap_or(1);
                store.files.insert(file.to_string(), (content, rev));
                let commit = self.commit(&mut store);
                ResponseTemplate::new(if rev == 1 { 201 } else { 200 }).set_body_json(json!({
                    "content": { "path": file, "sha": format!("sha-{rev}") },
                    "commit": commit,
                }))
            }
            "DELETE" => {
                if current.is_none() {
                    return not_found();
                }
                if supplied != current {
                    return stale();
                }
                store.files.remove(file);
                let commit = self.commit(&mut store);
                ResponseTemplate::new(200).set_body_json(json!({ "content": null, "commit": commit }))
            }
            _ => ResponseTemplate::new(405),
        }
    }
}

/// Immediate children of `dir`, as the contents API lists them.
fn list_dir(files: &BTreeMap<String, (String, u32)>, dir: &str) -> Vec<Value> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    let mut entries: Vec<Value> = Vec::new();
    let mut dirs: Vec<String> = Vec::new();
    for (path, (_, rev)) in files {
        let Some(rest) = path.strip_prefix(prefix.as_str()) else {
            continue;
        };
        match rest.split_once('/') {
            None => entries.push(json!({ "type": "file", "path": path, "sha": format!("sha-{rev}") })),
            Some((sub, _)) => {
                let sub_path = format!("{prefix}{sub}");
                if !dirs.contains(&sub_path) {
                    entries.push(json!({ "type": "dir", "path": sub_path, "sha": "tree" }));
                    dirs.push(sub_path);
                }
            }
        }
    }
    entries
}
