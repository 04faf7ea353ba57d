//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use greenlight::config::ApiConfig;
use greenlight::data::MOVIES_WRITE;
use greenlight::mailer::{MailError, Mailer};
use greenlight::{HttpServer, Models, ServerError, Shutdown};

#[derive(Debug, Clone)]
pub struct SentMail {
    pub recipient: String,
    pub template: String,
    pub data: Value,
}

/// Mailer that remembers what it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicUsize,
    delay: Duration,
    failing: bool,
}

impl RecordingMailer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Every send fails after `delay`; nothing is recorded as sent.
    pub fn failing(delay: Duration) -> Self {
        Self {
            delay,
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> Result<(), MailError> {
        tokio::time::sleep(self.delay).await;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(MailError::Delivery("smtp relay refused connection".into()));
        }
        self.sent.lock().unwrap().push(SentMail {
            recipient: recipient.to_string(),
            template: template.to_string(),
            data,
        });
        Ok(())
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub models: Models,
    pub mailer: Arc<RecordingMailer>,
    pub server: JoinHandle<Result<(), ServerError>>,
    pub client: reqwest::Client,
}

/// Boot the server on an ephemeral port with the limiter off.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(configure: impl FnOnce(&mut ApiConfig)) -> TestApp {
    spawn_app_with_mailer(configure, RecordingMailer::default()).await
}

pub async fn spawn_app_with_mailer(
    configure: impl FnOnce(&mut ApiConfig),
    mailer: RecordingMailer,
) -> TestApp {
    spawn_app_with_models(configure, Models::in_memory(), mailer).await
}

pub async fn spawn_app_with_models(
    configure: impl FnOnce(&mut ApiConfig),
    models: Models,
    mailer: RecordingMailer,
) -> TestApp {
    let mut config = ApiConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.limiter.enabled = false;
    configure(&mut config);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let mailer = Arc::new(mailer);
    let server = HttpServer::new(config, models.clone(), mailer.clone(), shutdown.clone());
    let server = tokio::spawn(server.run(listener));

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestApp {
        addr,
        shutdown,
        models,
        mailer,
        server,
        client,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register a user and return (id, activation token from the welcome mail).
    pub async fn register(&self, email: &str) -> (i64, String) {
        let res = self
            .client
            .post(self.url("/v1/users"))
            .json(&json!({ "name": "Test User", "email": email, "password": "pa55word1234" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let body: Value = res.json().await.unwrap();
        let id = body["user"]["id"].as_i64().unwrap();

        let token = self.wait_for_mail(email).await["activationToken"]
            .as_str()
            .unwrap()
            .to_string();
        (id, token)
    }

    /// Data of the latest mail to `recipient`, waiting for the background send.
    pub async fn wait_for_mail(&self, recipient: &str) -> Value {
        for _ in 0..100 {
            if let Some(mail) = self
                .mailer
                .sent()
                .into_iter()
                .rev()
                .find(|m| m.recipient == recipient)
            {
                return mail.data;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no mail sent to {recipient}");
    }

    pub async fn activate(&self, token: &str) -> reqwest::Response {
        self.client
            .put(self.url("/v1/users/activated"))
            .json(&json!({ "token": token }))
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, email: &str) -> String {
        let res = self
            .client
            .post(self.url("/v1/tokens/authentication"))
            .json(&json!({ "email": email, "password": "pa55word1234" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let body: Value = res.json().await.unwrap();
        body["authentication_token"]["token"].as_str().unwrap().to_string()
    }

    /// Registered, activated user allowed to write movies; returns a bearer token.
    pub async fn editor(&self, email: &str) -> String {
        let (id, token) = self.register(email).await;
        assert_eq!(self.activate(&token).await.status(), 200);
        self.models
            .permissions
            .add_for_user(id, &[MOVIES_WRITE])
            .await
            .unwrap();
        self.login(email).await
    }
}
