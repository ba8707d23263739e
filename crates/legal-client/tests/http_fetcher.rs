//! HTTP behaviour of the crucial policy fetcher against a mock policy service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use legal_client::fetcher::{HttpPolicyFetcher, PolicyFetcher};
use legal_client::{ALL_CLIENTS_SCOPE, LegalError, PolicyVersionRule, RetryConfig};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CRUCIAL_PATH: &str = "/public/policies/version/allCrucial";

fn fast_retry(max_elapsed: Duration) -> RetryConfig {
    RetryConfig {
        initial_interval: Duration::from_millis(10),
        multiplier: 2.0,
        max_interval: Duration::from_millis(50),
        max_elapsed_time: max_elapsed,
    }
}

fn fetcher(base_url: &str, retry: RetryConfig) -> HttpPolicyFetcher {
    HttpPolicyFetcher::new(base_url, Duration::from_secs(5), retry).expect("valid fetcher")
}

fn document_body() -> serde_json::Value {
    serde_json::json!({
        "affectedClient": {
            "all": [
                {"policyVersionId": "policyVersionC", "country": "countryA", "namespace": "namespaceA"}
            ],
            "client-1": [
                {"policyVersionId": "policyVersionA", "country": "countryA", "namespace": "namespaceA"},
                {"policyVersionId": "policyVersionB", "country": "countryB", "namespace": "namespaceB"}
            ]
        }
    })
}

#[tokio::test]
async fn fetch_decodes_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document_body()))
        .expect(1)
        .mount(&server)
        .await;

    let document = fetcher(&server.uri(), RetryConfig::default())
        .fetch()
        .await
        .expect("fetch succeeds");

    assert_eq!(document.scope_count(), 2);
    assert_eq!(
        document.rules_for(ALL_CLIENTS_SCOPE).unwrap(),
        &[PolicyVersionRule::new(
            "policyVersionC",
            "countryA",
            "namespaceA"
        )]
    );
    assert_eq!(document.rules_for("client-1").unwrap().len(), 2);
}

#[tokio::test]
async fn fetch_handles_trailing_slash_in_base_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document_body()))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/", server.uri());
    assert!(fetcher(&base, RetryConfig::default()).fetch().await.is_ok());
}

#[tokio::test]
async fn fetch_retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document_body()))
        .expect(1)
        .mount(&server)
        .await;

    let document = fetcher(&server.uri(), fast_retry(Duration::from_secs(10)))
        .fetch()
        .await
        .expect("third attempt succeeds");
    assert_eq!(document.scope_count(), 2);
}

#[tokio::test]
async fn fetch_gives_up_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(2..)
        .mount(&server)
        .await;

    let err = fetcher(&server.uri(), fast_retry(Duration::from_millis(200)))
        .fetch()
        .await
        .unwrap_err();

    match err {
        LegalError::Server { status, attempts } => {
            assert_eq!(status, 500);
            assert!(attempts >= 2, "attempts = {attempts}");
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(&server.uri(), fast_retry(Duration::from_secs(10)))
        .fetch()
        .await
        .unwrap_err();

    match &err {
        LegalError::UnexpectedStatus { status, body } => {
            assert_eq!(*status, 404);
            assert_eq!(body, "no such route");
        }
        other => panic!("expected unexpected status, got {other:?}"),
    }
    assert!(err.is_protocol_error());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn fetch_does_not_retry_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"affectedClient\": [1, 2"))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher(&server.uri(), fast_retry(Duration::from_secs(10)))
        .fetch()
        .await
        .unwrap_err();
    assert!(matches!(err, LegalError::Decode(_)));
}

#[tokio::test]
async fn fetch_treats_empty_object_as_empty_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let document = fetcher(&server.uri(), RetryConfig::default())
        .fetch()
        .await
        .unwrap();
    assert!(document.is_empty());
}

#[tokio::test]
async fn fetch_aborts_on_transport_error() {
    // Reserve a port, then free it so nothing is listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let started = std::time::Instant::now();
    let err = fetcher(
        &format!("http://127.0.0.1:{port}"),
        fast_retry(Duration::from_secs(30)),
    )
    .fetch()
    .await
    .unwrap_err();

    assert!(matches!(err, LegalError::Transport { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// Records the level of every event emitted by this crate.
#[derive(Clone, Default)]
struct LevelRecorder(Arc<Mutex<Vec<tracing::Level>>>);

impl<S: tracing::Subscriber> Layer<S> for LevelRecorder {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target().starts_with("legal_client") {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }
}

#[tokio::test]
async fn fetch_failures_are_not_logged_as_warnings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let recorder = LevelRecorder::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(recorder.clone()));

    let http = fetcher(&server.uri(), fast_retry(Duration::ZERO));
    assert!(http.fetch().await.is_err());

    server.reset().await;
    Mock::given(method("GET"))
        .and(path(CRUCIAL_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    assert!(http.fetch().await.is_err());

    // Callers decide how loudly to report a failed fetch.
    let levels = recorder.0.lock().unwrap().clone();
    assert!(!levels.is_empty());
    assert!(
        levels.iter().all(|level| *level > tracing::Level::WARN),
        "{levels:?}"
    );
}
