//! Graceful shutdown behaviour of the running server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use greenlight::data::{
    Filters, MemoryStore, Metadata, Movie, MovieFilter, MovieStore, StoreError,
};
use greenlight::lifecycle::ShutdownState;
use greenlight::{Models, ServerError};

mod common;

#[tokio::test]
async fn test_background_mail_finishes_before_run_returns() {
    let app = common::spawn_app_with_mailer(
        |_| {},
        common::RecordingMailer::with_delay(Duration::from_millis(300)),
    )
    .await;

    let res = app
        .client
        .post(app.url("/v1/users"))
        .json(&json!({ "name": "Hank", "email": "hank@example.com", "password": "pa55word1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    assert!(app.mailer.sent().is_empty(), "mail is still in flight");

    assert!(app.shutdown.trigger());
    let result = tokio::time::timeout(Duration::from_secs(5), app.server)
        .await
        .expect("server stopped")
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(app.mailer.sent().len(), 1);
    assert_eq!(app.shutdown.state(), ShutdownState::Stopped);
}

#[tokio::test]
async fn test_no_connections_after_shutdown() {
    let app = common::spawn_app().await;
    let res = app.client.get(app.url("/v1/healthcheck")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    app.shutdown.trigger();
    let url = app.url("/v1/healthcheck");
    tokio::time::timeout(Duration::from_secs(5), app.server)
        .await
        .expect("server stopped")
        .unwrap()
        .unwrap();

    assert!(app.client.get(url).send().await.is_err());
}

#[tokio::test]
async fn test_second_trigger_is_ignored() {
    let app = common::spawn_app().await;
    assert!(app.shutdown.trigger());
    assert!(!app.shutdown.trigger());

    let result = tokio::time::timeout(Duration::from_secs(5), app.server)
        .await
        .expect("server stopped")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_failed_mail_does_not_fail_request_or_shutdown() {
    let app = common::spawn_app_with_mailer(
        |_| {},
        common::RecordingMailer::failing(Duration::from_millis(100)),
    )
    .await;

    let res = app
        .client
        .post(app.url("/v1/users"))
        .json(&json!({ "name": "Ivy", "email": "ivy@example.com", "password": "pa55word1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    assert!(app.shutdown.trigger());
    let result = tokio::time::timeout(Duration::from_secs(5), app.server)
        .await
        .expect("server stopped")
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(app.mailer.attempts(), 1);
    assert!(app.mailer.sent().is_empty());
    assert_eq!(app.shutdown.state(), ShutdownState::Stopped);
}

/// Movie store whose reads hang far longer than the shutdown grace period.
struct SlowMovies {
    inner: MemoryStore,
    entered: Arc<Notify>,
    delay: Duration,
}

#[async_trait]
impl MovieStore for SlowMovies {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError> {
        self.inner.insert(movie).await
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        self.entered.notify_one();
        tokio::time::sleep(self.delay).await;
        MovieStore::get(&self.inner, id).await
    }

    async fn get_all(
        &self,
        filter: &MovieFilter,
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        self.inner.get_all(filter, filters).await
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        MovieStore::update(&self.inner, movie).await
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn test_request_outliving_grace_period_ends_run_with_drain_timeout() {
    let entered = Arc::new(Notify::new());
    let mut models = Models::in_memory();
    models.movies = Arc::new(SlowMovies {
        inner: MemoryStore::new(),
        entered: entered.clone(),
        delay: Duration::from_secs(10),
    });

    let app = common::spawn_app_with_models(
        |config| {
            config.timeouts.shutdown_grace_secs = 1;
            config.timeouts.query_secs = 30;
        },
        models,
        common::RecordingMailer::default(),
    )
    .await;
    let token = app.editor("slow@example.com").await;

    let in_flight = {
        let request = app.client.get(app.url("/v1/movies/1")).bearer_auth(token);
        tokio::spawn(async move { request.send().await })
    };
    tokio::time::timeout(Duration::from_secs(5), entered.notified())
        .await
        .expect("request reached the store");

    let started = Instant::now();
    assert!(app.shutdown.trigger());
    let result = tokio::time::timeout(Duration::from_secs(5), app.server)
        .await
        .expect("run gave up on the stuck request")
        .unwrap();

    assert!(matches!(result, Err(ServerError::DrainTimeout(grace)) if grace == Duration::from_secs(1)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(app.shutdown.state(), ShutdownState::Stopped);
    in_flight.abort();
}
