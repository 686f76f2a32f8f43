use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use courier::{
    ChallengeResponder, DispatchManager, EndpointDefinition, Error, Method, MockResponse, MockTransport, Parameter,
    Request, RequestConfig, Response, ResultKind, State, Target, TargetHooks, TlsChallenge, TlsPolicy,
};
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;

fn url(s: &str) -> Url { Url::parse(s).unwrap() }

fn manager(mock: &Arc<MockTransport>) -> DispatchManager { DispatchManager::new(mock.clone()) }

#[tokio::test]
async fn test_get_user_endpoint_returns_json() {
    let mock = Arc::new(MockTransport::new());
    mock.route(
        Method::Get,
        "https://api.example.com/users/42",
        MockResponse::json(&json!({"id": 42, "name": "Ada"})),
    );
    let dispatch = manager(&mock).with_default_host("api.example.com");
    dispatch.add_endpoint(EndpointDefinition::new("getUser", Method::Get, "/users/{id}").result_kind(ResultKind::Json));

    let request = dispatch
        .make_request("getUser", None, &["42".to_string()], Vec::new(), true)
        .unwrap();
    let response = request.finished().await;

    assert_eq!(response.status(), Some(200));
    assert_eq!(response.converted().and_then(|c| c.as_json()), Some(&json!({"id": 42, "name": "Ada"})));
    assert_eq!(request.state(), State::Completed);
}

#[tokio::test]
async fn test_unknown_endpoint_is_reported() {
    let mock = Arc::new(MockTransport::new());
    let err = manager(&mock).make_request("missing", None, &[], Vec::new(), true).unwrap_err();
    assert_eq!(err, Error::UnknownEndpoint("missing".into()));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_completion_runs_exactly_once_when_cancel_races_finish() {
    for _ in 0..50 {
        let mock = Arc::new(MockTransport::new());
        mock.route(Method::Get, "https://example.com/race", MockResponse::ok("done"));
        let request = manager(&mock).request(RequestConfig::get(url("https://example.com/race")), None).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let count = count.clone();
            request.on_complete(move |_, _| {
                count.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            });
        }
        request.start();
        let other = request.clone();
        let racer = tokio::spawn(async move { other.cancel() });
        request.cancel();
        racer.await.unwrap();
        rx.recv().await.unwrap();

        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(request.state().is_terminal());
    }
}

#[tokio::test]
async fn test_cancel_twice_delivers_one_terminal_callback() {
    let mock = Arc::new(MockTransport::new());
    mock.route(
        Method::Get,
        "https://example.com/slow",
        MockResponse::ok("late").delay(Duration::from_secs(30)),
    );
    let request = manager(&mock).request(RequestConfig::get(url("https://example.com/slow")), None).unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    {
        let count = count.clone();
        request.on_complete(move |_, response| {
            assert!(response.is_cancelled());
            count.fetch_add(1, Ordering::SeqCst);
        });
    }
    request.start();
    request.cancel();
    request.cancel();

    let response = request.finished().await;
    assert!(matches!(response.error(), Some(Error::Cancelled)));
    assert_eq!(request.state(), State::Cancelled);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_late_completion_listener_fires_immediately() {
    let mock = Arc::new(MockTransport::new());
    mock.route(Method::Get, "https://example.com/a", MockResponse::ok("a"));
    let request = manager(&mock).request(RequestConfig::get(url("https://example.com/a")), None).unwrap();
    request.start();
    request.finished().await;

    let fired = Arc::new(AtomicUsize::new(0));
    let seen = fired.clone();
    request.on_complete(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_http_error_keeps_decoded_payload() {
    let mock = Arc::new(MockTransport::new());
    mock.route(
        Method::Get,
        "https://example.com/missing",
        MockResponse::json(&json!({"error": "not found"})).with_status(404),
    );
    let request = manager(&mock).request(
        RequestConfig::get(url("https://example.com/missing")).expect(ResultKind::Json),
        None,
    ).unwrap();
    request.start();
    let response = request.finished().await;

    assert_eq!(response.error(), Some(&Error::Http { status: 404 }));
    assert!(response.converted().is_none());
    assert_eq!(
        response.error_payload().and_then(|p| p.as_json()),
        Some(&json!({"error": "not found"}))
    );
    assert_eq!(request.state(), State::Failed);
}

#[tokio::test]
async fn test_timeout_fails_with_timeout_error() {
    let mock = Arc::new(MockTransport::new());
    mock.route(
        Method::Get,
        "https://example.com/stall",
        MockResponse::ok("never").delay(Duration::from_secs(30)),
    );
    let request = manager(&mock).request(
        RequestConfig::get(url("https://example.com/stall")).timeout(Duration::from_millis(50)),
        None,
    ).unwrap();
    request.start();
    let response = request.finished().await;
    assert_eq!(response.error(), Some(&Error::Timeout));
}

#[tokio::test]
async fn test_redirect_records_final_url() {
    let mock = Arc::new(MockTransport::new());
    mock.route(
        Method::Get,
        "https://example.com/old",
        MockResponse::redirect(301, "https://example.com/new"),
    );
    mock.route(Method::Get, "https://example.com/new", MockResponse::ok("moved"));
    let request = manager(&mock).request(RequestConfig::get(url("https://example.com/old")), None).unwrap();
    request.start();
    let response = request.finished().await;

    assert!(response.is_success());
    assert_eq!(response.redirected_url(), Some(&url("https://example.com/new")));
    assert_eq!(response.converted().and_then(|c| c.as_text()), Some("moved"));
}

#[tokio::test]
async fn test_multipart_body_carries_file_part() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("photo.png");
    std::fs::write(&file, b"PNGDATA").unwrap();

    let mock = Arc::new(MockTransport::new());
    mock.route(Method::Post, "https://example.com/upload", MockResponse::ok("ok"));
    let request = manager(&mock).request(
        RequestConfig::post(url("https://example.com/upload"))
            .parameter(Parameter::text("caption", "hello"))
            .parameter(Parameter::file("photo", &file)),
        None,
    ).unwrap();
    request.start();
    assert!(request.finished().await.is_success());

    let sent = mock.last_request().unwrap();
    let content_type = sent.headers.get("content-type").unwrap().to_string();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&sent.body);
    assert!(body.contains("name=\"caption\""));
    assert!(body.contains("filename=\"photo.png\""));
    assert!(body.contains("Content-Type: image/png"));
    assert!(body.contains("PNGDATA"));
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(String, bool)>>,
    tx:    Mutex<Option<mpsc::UnboundedSender<()>>>,
}

impl Recorder {
    fn record(&self, hook: &str, success: bool) {
        self.calls.lock().unwrap().push((hook.to_string(), success));
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(());
        }
    }
}

impl TargetHooks for Recorder {
    fn on_success(&self, hook: &str, _: &Request, _: &Response) { self.record(hook, true) }

    fn on_failure(&self, hook: &str, _: &Request, _: &Response) { self.record(hook, false) }
}

#[tokio::test]
async fn test_target_hooks_named_by_endpoint() {
    let mock = Arc::new(MockTransport::new());
    mock.route(Method::Get, "https://api.example.com/ok", MockResponse::ok("{}"));
    mock.route(Method::Get, "https://api.example.com/bad", MockResponse::status(500));
    let dispatch = manager(&mock).with_default_host("api.example.com");
    dispatch.add_endpoint(EndpointDefinition::new("ok", Method::Get, "/ok").hooks("loaded", "loadFailed"));
    dispatch.add_endpoint(EndpointDefinition::new("bad", Method::Get, "/bad").hooks("loaded", "loadFailed"));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let recorder = Arc::new(Recorder {
        tx: Mutex::new(Some(tx)),
        ..Recorder::default()
    });
    let target = Target::with_hooks(recorder.clone());

    dispatch.make_request("ok", Some(&target), &[], Vec::new(), true).unwrap();
    rx.recv().await.unwrap();
    dispatch.make_request("bad", Some(&target), &[], Vec::new(), true).unwrap();
    rx.recv().await.unwrap();

    let calls = recorder.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("loaded".to_string(), true), ("loadFailed".to_string(), false)]);
}

#[tokio::test]
async fn test_cancel_requests_for_target_only_touches_that_target() {
    let mock = Arc::new(MockTransport::new());
    mock.route(
        Method::Get,
        "https://api.example.com/slow",
        MockResponse::ok("x").delay(Duration::from_secs(30)),
    );
    let dispatch = manager(&mock);
    let (a, b) = (Target::new(), Target::new());
    let first = dispatch.request(RequestConfig::get(url("https://api.example.com/slow")), Some(&a)).unwrap();
    let second = dispatch.request(RequestConfig::get(url("https://api.example.com/slow")), Some(&b)).unwrap();
    dispatch.enqueue(&first);
    dispatch.enqueue(&second);
    assert_eq!(dispatch.tracked_count(a.id()), 1);

    dispatch.cancel_requests_for_target(a.id());
    assert!(first.finished().await.is_cancelled());
    assert!(!second.is_finished());
    assert_eq!(dispatch.tracked_count(a.id()), 0);

    dispatch.cancel_all_requests();
    assert!(second.finished().await.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queue_never_exceeds_concurrency_limit() {
    let mock = Arc::new(MockTransport::new());
    mock.route(
        Method::Get,
        "https://example.com/work",
        MockResponse::ok("w").delay(Duration::from_millis(40)),
    );
    let dispatch = manager(&mock);
    dispatch.set_maximum_concurrent_requests(Some(3));

    let requests: Vec<Request> = (0..12)
        .map(|i| {
            let r = dispatch.request(RequestConfig::get(url(&format!("https://example.com/work?n={i}"))), None).unwrap();
            dispatch.enqueue(&r);
            r
        })
        .collect();
    for request in &requests {
        assert!(request.finished().await.is_success());
    }

    assert_eq!(mock.calls(), 12);
    assert!(mock.peak_in_flight() <= 3, "peak was {}", mock.peak_in_flight());
    assert!(dispatch.queue().peak() <= 3);
}

#[tokio::test]
async fn test_prompt_and_cache_asks_once_per_fingerprint() {
    let mock = Arc::new(MockTransport::new());
    mock.untrusted_host("self-signed.example.com", vec![Bytes::from_static(b"leaf-cert")]);
    mock.route(Method::Get, "https://self-signed.example.com/a", MockResponse::ok("a"));
    mock.route(Method::Get, "https://self-signed.example.com/b", MockResponse::ok("b"));

    let prompts = Arc::new(AtomicUsize::new(0));
    let counter = prompts.clone();
    let dispatch = manager(&mock);
    dispatch.set_default_tls_policy(
        TlsPolicy::PromptAndCache,
        Some(Arc::new(move |_: TlsChallenge, responder: ChallengeResponder| {
            counter.fetch_add(1, Ordering::SeqCst);
            responder.allow();
        })),
    );

    for path in ["a", "b"] {
        let request = dispatch.request(
            RequestConfig::get(url(&format!("https://self-signed.example.com/{path}"))),
            None,
        ).unwrap();
        dispatch.enqueue(&request);
        let response = request.finished().await;
        assert_eq!(response.converted().and_then(|c| c.as_text()), Some(path));
    }

    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    let challenge = TlsChallenge::new("self-signed.example.com", vec![Bytes::from_static(b"leaf-cert")], "");
    assert!(dispatch.ssl_cache_permits(&challenge));

    dispatch.clear_ssl_cache();
    assert!(!dispatch.ssl_cache_permits(&challenge));
}

#[tokio::test]
async fn test_trust_ca_only_rejects_untrusted_chain() {
    let mock = Arc::new(MockTransport::new());
    mock.untrusted_host("bad.example.com", vec![Bytes::from_static(b"cert")]);
    mock.route(Method::Get, "https://bad.example.com/", MockResponse::ok("x"));
    let request = manager(&mock).request(RequestConfig::get(url("https://bad.example.com/")), None).unwrap();
    request.start();
    assert!(matches!(request.finished().await.error(), Some(Error::Tls(_))));
}

#[tokio::test]
async fn test_denied_prompt_is_tls_error() {
    let mock = Arc::new(MockTransport::new());
    mock.untrusted_host("bad.example.com", vec![Bytes::from_static(b"cert")]);
    mock.route(Method::Get, "https://bad.example.com/", MockResponse::ok("x"));
    let request = manager(&mock).request(
        RequestConfig::get(url("https://bad.example.com/")).tls(
            TlsPolicy::Prompt,
            Some(Arc::new(|_: TlsChallenge, r: ChallengeResponder| r.deny())),
        ),
        None,
    ).unwrap();
    request.start();
    assert!(matches!(request.finished().await.error(), Some(Error::Tls(_))));
}
