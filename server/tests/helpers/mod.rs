//! Reusable test helpers for dispatcher and HTTP integration tests.
//!
//! Provides in-memory fakes for every collaborator the dispatcher talks to,
//! `TestApp` for sending requests through the full axum router, and event
//! builders for the payload shapes the platform sends.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] when a real listener is needed, e.g. as the
//! callback target of the HTTP forwarder.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Method, Request, Response};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use mg_common::InboundEvent;
use mg_server::api::{create_router, AppState};
use mg_server::config::Config;
use mg_server::db::{ConnectionStatus, Instance, InstanceSummary, Template, BUSINESS_INTEGRATION};
use mg_server::sessions::{LiveSession, SessionError, SessionRegistry};
use mg_server::webhooks::{
    DispatchTimeouts, Dispatcher, ForwardError, Forwarder, InstanceStore, StoreError,
    TemplateStore,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

/// Short limits so timeout tests finish quickly.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(200);

/// Delay comfortably past [`TEST_TIMEOUT`].
pub const SLOW: Duration = Duration::from_secs(5);

// ============================================================================
// Stores
// ============================================================================

/// In-memory template and instance store.
#[derive(Default)]
pub struct FakeStore {
    templates: Mutex<Vec<Template>>,
    instances: Mutex<Vec<Instance>>,
    pub template_lookups: AtomicUsize,
    pub instance_lookups: AtomicUsize,
    pub listings: AtomicUsize,
    delay: Mutex<Duration>,
    unavailable: AtomicBool,
}

impl FakeStore {
    pub fn add_template(&self, template_id: &str, webhook_url: Option<&str>) {
        self.templates.lock().unwrap().push(Template {
            id: Uuid::now_v7(),
            template_id: template_id.to_owned(),
            instance_id: Uuid::now_v7(),
            name: format!("template_{template_id}"),
            language: "en_US".to_owned(),
            webhook_url: webhook_url.map(str::to_owned),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    pub fn add_instance(&self, name: &str, number: &str) {
        self.instances.lock().unwrap().push(Instance {
            id: Uuid::now_v7(),
            name: name.to_owned(),
            number: Some(number.to_owned()),
            integration: BUSINESS_INTEGRATION.to_owned(),
            connection_status: ConnectionStatus::Open,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    /// Every lookup sleeps this long first.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Every lookup fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn before_lookup(&self) -> Result<(), StoreError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for FakeStore {
    async fn find_template(&self, template_id: &str) -> Result<Option<Template>, StoreError> {
        self.template_lookups.fetch_add(1, Ordering::SeqCst);
        self.before_lookup().await?;
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.template_id == template_id)
            .cloned())
    }
}

#[async_trait]
impl InstanceStore for FakeStore {
    async fn find_instance_by_number(&self, number: &str) -> Result<Option<Instance>, StoreError> {
        self.instance_lookups.fetch_add(1, Ordering::SeqCst);
        self.before_lookup().await?;
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.number.as_deref() == Some(number))
            .cloned())
    }

    async fn list_instances(&self) -> Result<Vec<InstanceSummary>, StoreError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .instances
            .lock()
            .unwrap()
            .iter()
            .map(|i| InstanceSummary {
                name: i.name.clone(),
                number: i.number.clone(),
                integration: i.integration.clone(),
            })
            .collect())
    }
}

// ============================================================================
// Forwarder
// ============================================================================

/// Forwarder that records every POST and answers with a fixed status.
pub struct RecordingForwarder {
    calls: Mutex<Vec<(String, Value)>>,
    status: Mutex<u16>,
    delay: Mutex<Duration>,
}

impl Default for RecordingForwarder {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status: Mutex::new(200),
            delay: Mutex::new(Duration::ZERO),
        }
    }
}

impl RecordingForwarder {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn respond_with(&self, status: u16) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn post_json(&self, url: &str, body: &Value) -> Result<u16, ForwardError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .unwrap()
            .push((url.to_owned(), body.clone()));

        let status = *self.status.lock().unwrap();
        if (200..300).contains(&status) {
            Ok(status)
        } else {
            Err(ForwardError::Status {
                status,
                body: "callback rejected".to_owned(),
            })
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Live session that records the events fed to it.
pub struct RecordingSession {
    name: String,
    fed: Mutex<Vec<Arc<InboundEvent>>>,
    delay: Mutex<Duration>,
    refuse: AtomicBool,
}

impl RecordingSession {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            fed: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            refuse: AtomicBool::new(false),
        })
    }

    pub fn fed(&self) -> Vec<Arc<InboundEvent>> {
        self.fed.lock().unwrap().clone()
    }

    pub fn fed_count(&self) -> usize {
        self.fed.lock().unwrap().len()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Reject every feed as if the inbox were full.
    pub fn refuse_events(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LiveSession for RecordingSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn feed_event(&self, event: Arc<InboundEvent>) -> Result<(), SessionError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Full(self.name.clone()));
        }
        self.fed.lock().unwrap().push(event);
        Ok(())
    }
}

/// Session registry whose reload brings "persisted" sessions live.
#[derive(Default)]
pub struct FakeRegistry {
    live: Mutex<HashMap<String, Arc<RecordingSession>>>,
    persisted: Mutex<Vec<String>>,
    created: Mutex<HashMap<String, Arc<RecordingSession>>>,
    pub reloads: AtomicUsize,
    reload_delay: Mutex<Duration>,
    reload_fails: AtomicBool,
}

impl FakeRegistry {
    /// The recording session for `name`, live or not yet loaded.
    pub fn session(&self, name: &str) -> Arc<RecordingSession> {
        Arc::clone(
            self.created
                .lock()
                .unwrap()
                .entry(name.to_owned())
                .or_insert_with(|| RecordingSession::new(name)),
        )
    }

    /// Make a session live right away.
    pub fn add_live(&self, name: &str) -> Arc<RecordingSession> {
        let session = self.session(name);
        self.live
            .lock()
            .unwrap()
            .insert(name.to_owned(), Arc::clone(&session));
        session
    }

    /// Make a session appear only after the next reload.
    pub fn add_persisted(&self, name: &str) -> Arc<RecordingSession> {
        self.persisted.lock().unwrap().push(name.to_owned());
        self.session(name)
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn set_reload_delay(&self, delay: Duration) {
        *self.reload_delay.lock().unwrap() = delay;
    }

    pub fn fail_reloads(&self) {
        self.reload_fails.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionRegistry for FakeRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn LiveSession>> {
        self.live
            .lock()
            .unwrap()
            .get(name)
            .map(|session| Arc::clone(session) as Arc<dyn LiveSession>)
    }

    async fn reload(&self) -> Result<(), SessionError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.reload_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.reload_fails.load(Ordering::SeqCst) {
            return Err(SessionError::LoaderUnavailable("database offline".into()));
        }

        let persisted = self.persisted.lock().unwrap().clone();
        for name in persisted {
            let session = self.session(&name);
            self.live.lock().unwrap().insert(name, session);
        }
        Ok(())
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

// ============================================================================
// Dispatcher harness
// ============================================================================

/// Fakes wired into a dispatcher.
#[derive(Clone, Default)]
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub forwarder: Arc<RecordingForwarder>,
    pub registry: Arc<FakeRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher over this harness with [`TEST_TIMEOUT`] on every step.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher_with(DispatchTimeouts {
            lookup: TEST_TIMEOUT,
            reload: TEST_TIMEOUT,
            feed: TEST_TIMEOUT,
            forward: TEST_TIMEOUT,
        })
    }

    pub fn dispatcher_with(&self, timeouts: DispatchTimeouts) -> Dispatcher {
        Dispatcher::new(
            self.store.clone(),
            self.store.clone(),
            self.forwarder.clone(),
            self.registry.clone(),
        )
        .with_timeouts(timeouts)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Template status notification for `template_id` (string or number).
pub fn template_status_body(template_id: Value, status: &str) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba-1",
            "changes": [{
                "field": "message_template_status_update",
                "value": {
                    "message_template_id": template_id,
                    "event": status
                }
            }]
        }]
    })
}

/// One message entry routed by `phone_number_id`.
pub fn message_entry(phone_number_id: &str) -> Value {
    json!({
        "id": "waba-1",
        "changes": [{
            "field": "messages",
            "value": {
                "messaging_product": "whatsapp",
                "metadata": {
                    "display_phone_number": "15550001111",
                    "phone_number_id": phone_number_id
                },
                "messages": [{ "from": "15551234567", "type": "text", "text": { "body": "hi" } }]
            }
        }]
    })
}

/// Message event carrying the given entries.
pub fn messages_body(entries: Vec<Value>) -> Value {
    json!({ "object": "whatsapp_business_account", "entry": entries })
}

pub fn event(body: Value) -> Arc<InboundEvent> {
    Arc::new(serde_json::from_value(body).expect("valid event body"))
}

// ============================================================================
// HTTP
// ============================================================================

/// Full router over a fresh [`Harness`].
pub struct TestApp {
    pub router: Router,
    pub harness: Harness,
    pub config: Arc<Config>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default_for_test())
    }

    pub fn with_config(config: Config) -> Self {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher();
        Self::build(config, harness, dispatcher)
    }

    /// Default config, with the dispatcher's step limits replaced.
    pub fn with_timeouts(timeouts: DispatchTimeouts) -> Self {
        let harness = Harness::new();
        let dispatcher = harness.dispatcher_with(timeouts);
        Self::build(Config::default_for_test(), harness, dispatcher)
    }

    fn build(config: Config, harness: Harness, dispatcher: Dispatcher) -> Self {
        let state = AppState::new(config.clone(), dispatcher, harness.registry.clone());
        let router = create_router(state);

        Self {
            router,
            harness,
            config: Arc::new(config),
        }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// POST a JSON body to the delivery endpoint.
    pub fn delivery(body: &Value) -> Request<Body> {
        Self::request(Method::POST, "/webhook/meta")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }
}

pub async fn body_to_bytes(response: Response<Body>) -> axum::body::Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes()
}

pub async fn body_to_json(response: Response<Body>) -> Value {
    let bytes = body_to_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

// ============================================================================
// Test Server
// ============================================================================

/// A running test server bound to a random port.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for HTTP requests (e.g., `http://127.0.0.1:12345`).
    pub url: String,
    _handle: JoinHandle<()>,
}

/// Spawn a real HTTP server on a random port.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        _handle: handle,
    }
}
