//! Scripted backend and collaborators for coordinator/client tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use reqwest::header::AUTHORIZATION;
use serde_json::json;
use session_auth::{MemoryCredentialStore, SessionTerminator, TokenPair};
use tokio::sync::Semaphore;
use transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// One request the backend saw: path plus the bearer token it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub path: String,
    pub authorization: Option<String>,
}

/// In-process stand-in for the session API.
///
/// Accepts exactly one access token at a time. Any other bearer token gets
/// `401 token.expired`; no token gets `401 token.invalid`. `/refresh`
/// rotates to `at_r{n}` / `rt_r{n}` unless told to fail, and can be held
/// open with `hold_refresh` until `release_refresh` is called.
pub struct ScriptedBackend {
    valid_access: Mutex<String>,
    refresh_calls: AtomicUsize,
    refresh_tokens_seen: Mutex<Vec<String>>,
    refresh_failure: Mutex<Option<TransportError>>,
    crash_refresh: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    overrides: Mutex<HashMap<String, TransportError>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new(valid_access: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new(valid_access.to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            refresh_failure: Mutex::new(None),
            crash_refresh: AtomicBool::new(false),
            gate: Mutex::new(None),
            overrides: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Make `/refresh` wait until `release_refresh`.
    pub fn hold_refresh(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_refresh(&self) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    pub fn fail_refresh(&self, err: TransportError) {
        *self.refresh_failure.lock().unwrap() = Some(err);
    }

    pub fn clear_refresh_failure(&self) {
        *self.refresh_failure.lock().unwrap() = None;
    }

    /// Make the `/refresh` handler panic once released.
    pub fn crash_refresh(&self) {
        self.crash_refresh.store(true, Ordering::SeqCst);
    }

    /// Answer `path` with `err` regardless of the token.
    pub fn fail_path(&self, path: &str, err: TransportError) {
        self.overrides.lock().unwrap().insert(path.to_string(), err);
    }

    /// Invalidate the current access token without issuing a new one.
    pub fn expire_current(&self) {
        *self.valid_access.lock().unwrap() = "at_revoked".to_string();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }

    /// Non-refresh calls in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    async fn refresh(&self, request: ApiRequest) -> transport::Result<ApiResponse> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let sent = request
            .body
            .as_ref()
            .and_then(|b| b["refreshToken"].as_str())
            .unwrap_or_default()
            .to_string();
        self.refresh_tokens_seen.lock().unwrap().push(sent);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }

        if self.crash_refresh.load(Ordering::SeqCst) {
            panic!("refresh handler crashed");
        }

        if let Some(err) = self.refresh_failure.lock().unwrap().clone() {
            return Err(err);
        }

        let access = format!("at_r{n}");
        *self.valid_access.lock().unwrap() = access.clone();
        Ok(ok(json!({ "token": access, "refreshToken": format!("rt_r{n}") })))
    }

    fn api(&self, request: ApiRequest) -> transport::Result<ApiResponse> {
        let authorization = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start_matches("Bearer ").to_string());
        self.calls.lock().unwrap().push(Call {
            path: request.path.clone(),
            authorization: authorization.clone(),
        });

        if let Some(err) = self.overrides.lock().unwrap().get(&request.path) {
            return Err(err.clone());
        }

        if request.path == "/sessions" {
            *self.valid_access.lock().unwrap() = "at_login".to_string();
            return Ok(ok(json!({
                "token": "at_login",
                "refreshToken": "rt_login",
                "permissions": ["metrics.list"],
                "roles": ["editor"]
            })));
        }

        let valid = self.valid_access.lock().unwrap().clone();
        match authorization {
            None => Err(unauthorized("token.invalid")),
            Some(token) if token != valid => Err(unauthorized("token.expired")),
            Some(token) if request.path == "/me" => Ok(ok(json!({
                "email": "user@example.com",
                "permissions": ["users.list"],
                "roles": ["administrator"],
                "token": token
            }))),
            Some(token) => Ok(ok(json!({ "path": request.path, "token": token }))),
        }
    }
}

impl Transport for ScriptedBackend {
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + '_>> {
        if request.path == "/refresh" {
            Box::pin(self.refresh(request))
        } else {
            let outcome = self.api(request);
            Box::pin(async move { outcome })
        }
    }
}

fn ok(body: serde_json::Value) -> ApiResponse {
    ApiResponse {
        status: 200,
        headers: Default::default(),
        body,
    }
}

pub fn unauthorized(code: &str) -> TransportError {
    TransportError::Status {
        status: 401,
        code: Some(code.to_string()),
        body: json!({ "error": true, "code": code }),
    }
}

pub fn status(status: u16) -> TransportError {
    TransportError::Status {
        status,
        code: None,
        body: json!({ "error": true }),
    }
}

/// Counts sign-outs and clears the store like the real collaborator.
pub struct CountingTerminator {
    store: Arc<MemoryCredentialStore>,
    count: AtomicUsize,
}

impl CountingTerminator {
    pub fn new(store: Arc<MemoryCredentialStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            count: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl SessionTerminator for CountingTerminator {
    fn sign_out(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.count.fetch_add(1, Ordering::SeqCst);
            let _ = session_auth::CredentialStore::clear(self.store.as_ref()).await;
        })
    }
}

/// A store holding `at_1` / `rt_1`.
pub fn seeded_store() -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_pair(TokenPair::new("at_1", "rt_1")))
}

