mod common;

use common::{fast_config, lan, session, FakeHttp, FakeProbe, Offline};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use lan_infer_scan::session::NOT_CONNECTED;
use lan_infer_scan::{DiscoveredServer, ScanState, ServerKind};

fn completed(states: &[ScanState]) -> &[DiscoveredServer] {
    match states.last() {
        Some(ScanState::Completed { servers }) => servers,
        other => panic!("expected Completed as the last state, got {other:?}"),
    }
}

#[tokio::test]
async fn no_network_emits_single_error() {
    let config = fast_config();
    let states: Vec<_> = session(
        Arc::new(Offline),
        FakeProbe::default(),
        FakeHttp::default(),
        &config,
    )
    .scan()
    .collect()
    .await;

    assert_eq!(
        states,
        vec![ScanState::Error {
            message: NOT_CONNECTED.to_string()
        }]
    );
}

#[tokio::test]
async fn nothing_listening_completes_empty() {
    let config = fast_config();
    let probe = FakeProbe {
        delay: Duration::from_millis(1),
        ..FakeProbe::default()
    };
    let states: Vec<_> = session(lan("192.168.1"), probe, FakeHttp::default(), &config)
        .scan()
        .collect()
        .await;

    assert_eq!(states.first(), Some(&ScanState::Scanning { progress: 0.0 }));
    assert!(completed(&states).is_empty());
    assert_eq!(states.iter().filter(|s| s.is_terminal()).count(), 1);
}

#[tokio::test]
async fn finds_single_ollama_server() {
    let config = fast_config();
    let probe = FakeProbe::with_open(&[("192.168.1.50", 11434)]);
    let http = FakeHttp::default().with(
        "http://192.168.1.50:11434/api/tags",
        r#"{"models":[{"name":"llama3"},{"name":"phi3"}]}"#,
    );
    let states: Vec<_> = session(lan("192.168.1"), probe, http, &config)
        .scan()
        .collect()
        .await;

    assert_eq!(
        completed(&states),
        &[DiscoveredServer {
            address: "192.168.1.50".into(),
            port: 11434,
            kind: ServerKind::Ollama,
            models: vec!["llama3".into(), "phi3".into()],
        }]
    );
}

#[tokio::test]
async fn falls_back_to_openai_models() {
    let config = fast_config();
    let probe = FakeProbe::with_open(&[("192.168.1.77", 8000)]);
    let http = FakeHttp::default().with(
        "http://192.168.1.77:8000/v1/models",
        r#"{"data":[{"id":"gpt-oss-20b"}]}"#,
    );
    let states: Vec<_> = session(lan("192.168.1"), probe, http, &config)
        .scan()
        .collect()
        .await;

    let servers = completed(&states);
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].kind, ServerKind::OpenAiCompatible);
    assert_eq!(servers[0].models, vec!["gpt-oss-20b".to_string()]);
}

#[tokio::test]
async fn ollama_wins_when_both_endpoints_answer() {
    let config = fast_config();
    let probe = FakeProbe::with_open(&[("10.0.0.5", 11434)]);
    let http = FakeHttp::default()
        .with("http://10.0.0.5:11434/api/tags", r#"{"models":[{"name":"qwen2"}]}"#)
        .with("http://10.0.0.5:11434/v1/models", r#"{"data":[{"id":"qwen2"}]}"#);
    let states: Vec<_> = session(lan("10.0.0"), probe, http, &config)
        .scan()
        .collect()
        .await;

    let servers = completed(&states);
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].kind, ServerKind::Ollama);
}

#[tokio::test]
async fn open_but_unrecognised_ports_are_excluded() {
    let config = fast_config();
    let probe = FakeProbe::with_open(&[("192.168.1.9", 8080), ("192.168.1.10", 1234)]);
    let http = FakeHttp::default()
        .with("http://192.168.1.9:8080/api/tags", "<html>router login</html>")
        .with("http://192.168.1.9:8080/v1/models", "{not json")
        .with(
            "http://192.168.1.10:1234/v1/models",
            r#"{"object":"list","data":[{"id":"mistral-7b"},{"id":""}]}"#,
        );
    let states: Vec<_> = session(lan("192.168.1"), probe, http, &config)
        .scan()
        .collect()
        .await;

    let servers = completed(&states);
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].address, "192.168.1.10");
    assert_eq!(servers[0].models, vec!["mistral-7b".to_string()]);
    assert_eq!(servers[0].runtime(), "lmstudio");
}

#[tokio::test]
async fn closed_ports_are_never_identified() {
    let config = fast_config();
    let probe = FakeProbe::with_open(&[("192.168.1.20", 8000)]);
    let http = FakeHttp::default()
        .with(
            "http://192.168.1.50:11434/api/tags",
            r#"{"models":[{"name":"llama3"}]}"#,
        )
        .with(
            "http://192.168.1.20:1234/v1/models",
            r#"{"data":[{"id":"mistral-7b"}]}"#,
        );
    let states: Vec<_> = session(lan("192.168.1"), probe, http, &config)
        .scan()
        .collect()
        .await;

    assert!(completed(&states).is_empty());
}

#[tokio::test]
async fn progress_is_monotonic_and_bounded() {
    let config = fast_config().with_concurrency(16);
    let probe = FakeProbe {
        delay: Duration::from_millis(2),
        ..FakeProbe::default()
    };
    let states: Vec<_> = session(lan("192.168.1"), probe, FakeHttp::default(), &config)
        .scan()
        .collect()
        .await;

    let progress: Vec<f64> = states
        .iter()
        .filter_map(|s| match s {
            ScanState::Scanning { progress } => Some(*progress),
            _ => None,
        })
        .collect();
    assert!(progress.len() > 1, "expected intermediate progress, got {progress:?}");
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!(completed(&states).is_empty());
}

#[tokio::test]
async fn concurrency_ceiling_is_respected() {
    let config = fast_config();
    let peak = Arc::new(AtomicUsize::new(0));
    let probe = FakeProbe {
        delay: Duration::from_millis(1),
        peak: peak.clone(),
        ..FakeProbe::default()
    };
    let states: Vec<_> = session(lan("192.168.1"), probe, FakeHttp::default(), &config)
        .scan()
        .collect()
        .await;

    assert!(completed(&states).is_empty());
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak > 0 && peak <= 64, "peak in-flight probes: {peak}");
}

#[tokio::test]
async fn dropping_the_stream_aborts_probes() {
    let config = fast_config();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let probe = FakeProbe {
        hang: true,
        in_flight: in_flight.clone(),
        ..FakeProbe::default()
    };
    let mut states = Box::pin(session(lan("192.168.1"), probe, FakeHttp::default(), &config).scan());

    assert_eq!(states.next().await, Some(ScanState::Scanning { progress: 0.0 }));
    assert!(matches!(states.next().await, Some(ScanState::Scanning { .. })));
    assert!(in_flight.load(Ordering::SeqCst) > 0);

    drop(states);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_token_ends_stream_without_terminal_state() {
    let config = fast_config();
    let cancel = CancellationToken::new();
    let probe = FakeProbe {
        hang: true,
        ..FakeProbe::default()
    };
    let scan = session(lan("192.168.1"), probe, FakeHttp::default(), &config)
        .with_cancel(cancel.clone())
        .scan();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });
    let states: Vec<_> = tokio::time::timeout(Duration::from_secs(5), scan.collect::<Vec<_>>())
        .await
        .expect("cancelled scan should end promptly");
    canceller.await.unwrap();

    assert!(!states.is_empty());
    assert!(states.iter().all(|s| !s.is_terminal()));
}

#[tokio::test]
async fn deadline_completes_with_partial_results() {
    let config = fast_config().with_deadline(Some(Duration::from_millis(200)));
    let probe = FakeProbe {
        hang: true,
        ..FakeProbe::with_open(&[("192.168.1.1", 11434)])
    };
    let http = FakeHttp::default().with(
        "http://192.168.1.1:11434/api/tags",
        r#"{"models":[]}"#,
    );
    let states: Vec<_> = tokio::time::timeout(
        Duration::from_secs(5),
        session(lan("192.168.1"), probe, http, &config)
            .scan()
            .collect::<Vec<_>>(),
    )
    .await
    .expect("deadline should end the scan");

    let servers = completed(&states);
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].kind, ServerKind::Ollama);
    assert!(servers[0].models.is_empty());
}
