//! Command runner
//!
//! Wires config into the transport, credential store, terminator and
//! authenticated client, then executes one command and returns what to print.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use auth_client::AuthenticatedClient;
use session_auth::{ClearCredentials, FileCredentialStore, SessionState};
use tracing::{info, warn};
use transport::{ApiRequest, HttpTransport};

use crate::cli::Command;
use crate::config::Config;

/// Everything a command needs, built from config.
pub struct Session {
    pub client: AuthenticatedClient,
    pub terminator: Arc<ClearCredentials>,
}

impl Session {
    pub async fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(
            FileCredentialStore::load(config.session.credentials_path.clone())
                .await
                .with_context(|| {
                    format!(
                        "failed to load credentials from {}",
                        config.session.credentials_path.display()
                    )
                })?,
        );

        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let transport = Arc::new(
            HttpTransport::new(http, config.api.base_url.clone(), config.request_timeout())
                .with_headers(config.transport_headers()),
        );

        let terminator = Arc::new(ClearCredentials::with_entry_point(
            store.clone(),
            config.session.entry_point.clone(),
        ));

        let client = AuthenticatedClient::new(
            transport,
            store,
            terminator.clone(),
            config.refresh_options(),
        )
        .await;

        Ok(Self { client, terminator })
    }

    fn signed_out_hint(&self) -> Option<String> {
        match self.terminator.state() {
            SessionState::SignedOut { entry_point } => Some(format!(
                "session ended; sign in again ({entry_point}) with `session-cli login EMAIL`"
            )),
            SessionState::Active => None,
        }
    }
}

/// Run one command and return its printable output.
pub async fn run(config: &Config, command: Command) -> Result<String> {
    let session = Session::open(config).await?;
    let outcome = execute(config, &session, command).await;

    if outcome.is_err()
        && let Some(hint) = session.signed_out_hint()
    {
        warn!("{hint}");
        return outcome.context(hint);
    }
    outcome
}

async fn execute(config: &Config, session: &Session, command: Command) -> Result<String> {
    let client = &session.client;

    match command {
        Command::Login { email } => {
            let password = config
                .session
                .password
                .as_ref()
                .context("no password: set SESSION_PASSWORD or session.password_file")?;
            let user = client
                .sign_in(&email, password.expose())
                .await
                .context("sign-in failed")?;
            Ok(serde_json::to_string_pretty(&user)?)
        }
        Command::Whoami => match client.bootstrap().await.context("session check failed")? {
            Some(user) => Ok(serde_json::to_string_pretty(&user)?),
            None => bail!("not signed in; run `session-cli login EMAIL`"),
        },
        Command::Request { method, path, body } => {
            if client
                .bootstrap()
                .await
                .context("session check failed")?
                .is_none()
            {
                bail!("not signed in; run `session-cli login EMAIL`");
            }

            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.with_body(body)?;
            }
            let response = client.send(request).await.context("request failed")?;
            info!(status = response.status, "request completed");
            Ok(serde_json::to_string_pretty(&response.body)?)
        }
        Command::Logout => {
            client.sign_out().await;
            Ok("signed out".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{ENV_MUTEX, remove_env, set_env};
    use axum::Json;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use reqwest::Method;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    /// Session API double: one valid access token at a time.
    #[derive(Default)]
    struct Backend {
        access: Mutex<String>,
        refresh: Mutex<String>,
        refreshes: AtomicUsize,
        reject_refresh: Mutex<bool>,
    }

    impl Backend {
        fn expire(&self) {
            *self.access.lock().unwrap() = "revoked".into();
        }
    }

    fn unauthorized(code: &str) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": true, "code": code})),
        )
            .into_response()
    }

    fn check(backend: &Backend, headers: &HeaderMap) -> Option<Response> {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match bearer {
            None => Some(unauthorized("token.invalid")),
            Some(t) if t != *backend.access.lock().unwrap() => {
                Some(unauthorized("token.expired"))
            }
            Some(_) => None,
        }
    }

    async fn start_backend() -> (String, Arc<Backend>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let backend = Arc::new(Backend::default());

        let app = axum::Router::new()
            .route(
                "/sessions",
                post(|State(b): State<Arc<Backend>>, Json(body): Json<Value>| async move {
                    if body["password"] != "123456" {
                        return (StatusCode::UNAUTHORIZED, Json(json!({"error": true})))
                            .into_response();
                    }
                    *b.access.lock().unwrap() = "at_login".into();
                    *b.refresh.lock().unwrap() = "rt_login".into();
                    Json(json!({
                        "token": "at_login",
                        "refreshToken": "rt_login",
                        "permissions": ["users.list"],
                        "roles": ["administrator"]
                    }))
                    .into_response()
                }),
            )
            .route(
                "/refresh",
                post(|State(b): State<Arc<Backend>>, Json(body): Json<Value>| async move {
                    if *b.reject_refresh.lock().unwrap()
                        || body["refreshToken"] != *b.refresh.lock().unwrap()
                    {
                        return (StatusCode::BAD_REQUEST, Json(json!({"error": true})))
                            .into_response();
                    }
                    let n = b.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
                    let access = format!("at_r{n}");
                    let refresh = format!("rt_r{n}");
                    *b.access.lock().unwrap() = access.clone();
                    *b.refresh.lock().unwrap() = refresh.clone();
                    Json(json!({"token": access, "refreshToken": refresh})).into_response()
                }),
            )
            .route(
                "/me",
                get(|State(b): State<Arc<Backend>>, headers: HeaderMap| async move {
                    if let Some(denied) = check(&b, &headers) {
                        return denied;
                    }
                    Json(json!({
                        "email": "diego@example.com",
                        "permissions": ["users.list"],
                        "roles": ["administrator"]
                    }))
                    .into_response()
                }),
            )
            .route(
                "/items",
                post(
                    |State(b): State<Arc<Backend>>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        if let Some(denied) = check(&b, &headers) {
                            return denied;
                        }
                        Json(json!({"created": body})).into_response()
                    },
                ),
            )
            .with_state(backend.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (url, backend)
    }

    fn config_for(url: &str, dir: &tempfile::TempDir) -> Config {
        let path = dir.path().join("session-cli.toml");
        std::fs::write(
            &path,
            format!(
                r#"
[api]
base_url = "{url}"
timeout_secs = 5

[session]
credentials_path = "{}"
entry_point = "/login"
"#,
                dir.path().join("session.json").display()
            ),
        )
        .unwrap();

        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("SESSION_API_URL") };
        unsafe { set_env("SESSION_PASSWORD", "123456") };
        let config = Config::load(&path);
        unsafe { remove_env("SESSION_PASSWORD") };
        config.unwrap()
    }

    fn login() -> Command {
        Command::Login {
            email: "diego@example.com".into(),
        }
    }

    fn create_item() -> Command {
        Command::Request {
            method: Method::POST,
            path: "/items".into(),
            body: Some(json!({"name": "widget"})),
        }
    }

    #[tokio::test]
    async fn whoami_without_session_asks_for_login() {
        let (url, _backend) = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&url, &dir);

        let err = run(&config, Command::Whoami).await.unwrap_err();
        assert!(err.to_string().contains("not signed in"), "got: {err}");
    }

    #[tokio::test]
    async fn login_then_whoami() {
        let (url, _backend) = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&url, &dir);

        let out = run(&config, login()).await.unwrap();
        assert!(out.contains("administrator"), "got: {out}");
        assert!(dir.path().join("session.json").exists());

        let out = run(&config, Command::Whoami).await.unwrap();
        assert!(out.contains("diego@example.com"), "got: {out}");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let (url, backend) = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&url, &dir);
        run(&config, login()).await.unwrap();

        backend.expire();
        let out = run(&config, create_item()).await.unwrap();

        assert!(out.contains("widget"), "got: {out}");
        assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
        let stored = std::fs::read_to_string(dir.path().join("session.json")).unwrap();
        assert!(stored.contains("at_r1"), "got: {stored}");
        assert!(stored.contains("rt_r1"), "got: {stored}");
    }

    #[tokio::test]
    async fn rejected_refresh_signs_out() {
        let (url, backend) = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&url, &dir);
        run(&config, login()).await.unwrap();

        backend.expire();
        *backend.reject_refresh.lock().unwrap() = true;
        let err = run(&config, create_item()).await.unwrap_err();

        assert!(format!("{err:#}").contains("/login"), "got: {err:#}");
        assert!(!dir.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn logout_removes_credentials() {
        let (url, _backend) = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&url, &dir);
        run(&config, login()).await.unwrap();

        assert_eq!(run(&config, Command::Logout).await.unwrap(), "signed out");
        assert!(!dir.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn login_with_wrong_password_fails() {
        let (url, _backend) = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(&url, &dir);
        config.session.password = Some(common::Secret::from("wrong"));

        assert!(run(&config, login()).await.is_err());
        assert!(!dir.path().join("session.json").exists());
    }
}
