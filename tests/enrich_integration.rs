//! Integration tests for the enrichment scheduler.
//!
//! These tests run the engine against a mock proxy: version discovery,
//! tombstones, partial failure, and the concurrency bound.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use modcorpus::{Corpus, EnrichEngine, EnrichError, IndexRecord, ProxyClient};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn record(module: &str, version: &str, timestamp: &str) -> IndexRecord {
    IndexRecord {
        path: module.to_string(),
        version: version.to_string(),
        timestamp: timestamp.to_string(),
    }
}

fn proxy(server: &MockServer) -> Arc<ProxyClient> {
    Arc::new(ProxyClient::new(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
    ))
}

/// Mounts a 200 text response for one proxy path.
async fn mount_text(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_enrich_merges_discovered_versions() {
    let server = MockServer::start().await;
    mount_text(&server, "/example.com/a/@v/list", "v1.0.0\nv1.1.0\n").await;
    mount_text(
        &server,
        "/example.com/a/@v/v1.0.0.mod",
        "module example.com/a\n\ngo 1.16\n\nrequire example.com/dep v0.2.0\n",
    )
    .await;
    mount_text(&server, "/example.com/a/@v/v1.1.0.mod", "module example.com/a\n\ngo 1.17\n").await;

    let seed = Corpus::from_index(&[record("example.com/a", "v1.0.0", "t1")]);
    let engine = EnrichEngine::new(proxy(&server), None, 4).unwrap();
    let (corpus, errors) = engine.enrich(seed).await.unwrap();

    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    let versions = &corpus.modules["example.com/a"];
    assert_eq!(versions.len(), 2, "seed version plus one discovered");

    let v100 = versions.iter().find(|mv| mv.version == "v1.0.0").unwrap();
    assert_eq!(v100.indexed_at.as_deref(), Some("t1"));
    assert_eq!(v100.language_version.as_deref(), Some("1.16"));
    assert_eq!(v100.requires.len(), 1);
    assert_eq!(v100.requires[0].module, "example.com/dep");

    let v110 = versions.iter().find(|mv| mv.version == "v1.1.0").unwrap();
    assert!(v110.indexed_at.is_none(), "discovered versions carry no index timestamp");
    assert_eq!(v110.language_version.as_deref(), Some("1.17"));
}

#[tokio::test]
async fn test_enrich_never_duplicates_versions() {
    let server = MockServer::start().await;
    // The list repeats the seeded version.
    mount_text(&server, "/example.com/a/@v/list", "v1.0.0\nv1.0.0\n").await;
    mount_text(&server, "/example.com/a/@v/v1.0.0.mod", "module example.com/a\n").await;

    let seed = Corpus::from_index(&[record("example.com/a", "v1.0.0", "t1")]);
    let engine = EnrichEngine::new(proxy(&server), None, 2).unwrap();
    let (corpus, errors) = engine.enrich(seed).await.unwrap();

    assert!(errors.is_empty());
    assert_eq!(corpus.modules["example.com/a"].len(), 1);
}

#[tokio::test]
async fn test_tombstoned_version_is_not_an_error() {
    let server = MockServer::start().await;
    mount_text(&server, "/example.com/gone/@v/list", "v0.1.0\n").await;
    Mock::given(method("GET"))
        .and(path("/example.com/gone/@v/v0.1.0.mod"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let seed = || Corpus::from_index(&[record("example.com/gone", "v0.1.0", "t1")]);
    let engine = EnrichEngine::new(proxy(&server), None, 2).unwrap();

    // Enrich twice: tombstones are idempotent.
    for _ in 0..2 {
        let (corpus, errors) = engine.enrich(seed()).await.unwrap();
        assert!(errors.is_empty(), "a tombstone is not an error: {errors:?}");

        let versions = &corpus.modules["example.com/gone"];
        assert_eq!(versions.len(), 1);
        assert!(!versions[0].proxied);
        // The index observation survives the tombstone.
        assert_eq!(versions[0].indexed_at.as_deref(), Some("t1"));
        assert!(versions[0].requires.is_empty());
    }
}

#[tokio::test]
async fn test_gone_version_list_tombstones_module() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/example.com/gone/@v/list"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let seed = Corpus::from_index(&[
        record("example.com/gone", "v0.1.0", "t1"),
        record("example.com/gone", "v0.2.0", "t2"),
    ]);
    let engine = EnrichEngine::new(proxy(&server), None, 2).unwrap();
    let (corpus, errors) = engine.enrich(seed).await.unwrap();

    assert!(errors.is_empty());
    let versions = &corpus.modules["example.com/gone"];
    assert_eq!(versions.len(), 2);
    assert!(versions.iter().all(|mv| !mv.proxied));
}

#[tokio::test]
async fn test_partial_failure_does_not_block_siblings() {
    let server = MockServer::start().await;
    mount_text(&server, "/example.com/bad/@v/list", "v1.0.0\n").await;
    Mock::given(method("GET"))
        .and(path("/example.com/bad/@v/v1.0.0.mod"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_text(&server, "/example.com/ok/@v/list", "v2.0.0\n").await;
    mount_text(&server, "/example.com/ok/@v/v2.0.0.mod", "module example.com/ok\n\ngo 1.20\n").await;

    let seed = Corpus::from_index(&[
        record("example.com/bad", "v1.0.0", "t1"),
        record("example.com/ok", "v2.0.0", "t2"),
    ]);
    let engine = EnrichEngine::new(proxy(&server), None, 4).unwrap();
    let (corpus, errors) = engine.enrich(seed).await.unwrap();

    // The healthy module is fully enriched.
    let ok = &corpus.modules["example.com/ok"];
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].language_version.as_deref(), Some("1.20"));

    // The failing version is dropped and reported once.
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        EnrichError::ManifestFetch {
            module, version, ..
        } => {
            assert_eq!(module, "example.com/bad");
            assert_eq!(version, "v1.0.0");
        }
        other => panic!("expected ManifestFetch, got: {other}"),
    }
    assert!(corpus.modules["example.com/bad"].is_empty());
}

#[tokio::test]
async fn test_list_failure_drops_module_and_reports() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/example.com/a/@v/list"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let seed = Corpus::from_index(&[record("example.com/a", "v1.0.0", "t1")]);
    let engine = EnrichEngine::new(proxy(&server), None, 2).unwrap();
    let (corpus, errors) = engine.enrich(seed).await.unwrap();

    assert_eq!(corpus.module_count(), 0);
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], EnrichError::ListVersions { module, .. } if module == "example.com/a"));
}

#[tokio::test]
async fn test_manifest_parse_failure_keeps_record() {
    let server = MockServer::start().await;
    mount_text(&server, "/example.com/a/@v/list", "v1.0.0\n").await;
    // Arity error: require with a path but no version.
    mount_text(&server, "/example.com/a/@v/v1.0.0.mod", "module example.com/a\nrequire broken\n")
        .await;

    let seed = Corpus::from_index(&[record("example.com/a", "v1.0.0", "t1")]);
    let engine = EnrichEngine::new(proxy(&server), None, 2).unwrap();
    let (corpus, errors) = engine.enrich(seed).await.unwrap();

    let versions = &corpus.modules["example.com/a"];
    assert_eq!(versions.len(), 1);
    assert!(versions[0].proxied);
    assert!(
        versions[0].manifest_error.as_deref().unwrap_or("").contains("require"),
        "parse failure recorded on the version"
    );
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], EnrichError::ManifestParse { .. }));
}

/// Responder that records request arrival times and answers slowly.
///
/// With every response taking `delay`, the number of arrivals packed
/// into any `delay`-sized window approximates the number of in-flight
/// requests, which is what the engine bounds.
struct RecordingResponder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
    delay: Duration,
}

impl Respond for RecordingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.arrivals
            .lock()
            .expect("arrival log lock poisoned")
            .push(Instant::now());
        let body = if request.url.path().ends_with("/list") {
            "v1.0.0\n"
        } else {
            "module m\n"
        };
        ResponseTemplate::new(200)
            .set_body_string(body)
            .set_delay(self.delay)
    }
}

#[tokio::test]
async fn test_in_flight_requests_never_exceed_parallelism() {
    let parallelism = 2;
    let delay = Duration::from_millis(400);

    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .respond_with(RecordingResponder {
            arrivals: Arc::clone(&arrivals),
            delay,
        })
        .mount(&server)
        .await;

    let seed = Corpus::from_index(&[
        record("example.com/a", "v1.0.0", "t1"),
        record("example.com/b", "v1.0.0", "t2"),
        record("example.com/c", "v1.0.0", "t3"),
        record("example.com/d", "v1.0.0", "t4"),
    ]);
    let engine = EnrichEngine::new(proxy(&server), None, parallelism).unwrap();
    let (corpus, errors) = engine.enrich(seed).await.unwrap();

    assert!(errors.is_empty());
    assert_eq!(corpus.module_count(), 4);

    let arrivals = arrivals.lock().unwrap().clone();
    // 4 modules x (list + one manifest).
    assert_eq!(arrivals.len(), 8);

    // Shrink the window slightly to absorb scheduling jitter.
    let window = delay - Duration::from_millis(100);
    let max_overlap = arrivals
        .iter()
        .map(|a| {
            arrivals
                .iter()
                .filter(|b| **b <= *a && *a < **b + window)
                .count()
        })
        .max()
        .unwrap_or(0);
    assert!(
        max_overlap <= parallelism,
        "observed {max_overlap} concurrent requests with parallelism {parallelism}"
    );
}
