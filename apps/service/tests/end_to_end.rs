use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lookout::config::EngineSettings;
use lookout::exporter::{Export, Exporter, ExporterConfig, HttpExporterConfig};
use lookout::healthcheck::{Base, CheckResult, Probe, ProbeConfig, TcpConfig};
use lookout::{Config, Engine, ExportError};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sink_config(server: &MockServer) -> HttpExporterConfig {
    HttpExporterConfig {
        name: "sink".into(),
        host: server.address().ip().to_string(),
        port: server.address().port(),
        path: "/results".into(),
        ..HttpExporterConfig::default()
    }
}

async fn wait_for_requests(server: &MockServer, count: usize) {
    for _ in 0..40 {
        if server.received_requests().await.unwrap_or_default().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn one_off_tcp_check_is_pushed_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/results"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&sink)
        .await;

    let engine = Engine::new(EngineSettings::default());
    let exporter = Exporter::try_from(ExporterConfig::Http(sink_config(&sink))).unwrap();
    engine.add_exporter(exporter).await.unwrap();

    let probe = Probe::from(ProbeConfig::Tcp(TcpConfig {
        base: Base {
            name: "local-tcp".into(),
            interval: Duration::from_secs(5),
            one_off: true,
            ..Base::default()
        },
        target: "127.0.0.1".into(),
        port,
        timeout: Duration::from_secs(2),
        ..TcpConfig::default()
    }));
    engine.add_check(probe).await.unwrap();

    wait_for_requests(&sink, 1).await;
    engine.shutdown().await;

    let requests = sink.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Vec<CheckResult> = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0].name, "local-tcp");
    assert!(body[0].success);
}

#[tokio::test]
async fn stopped_exporter_rejects_push() {
    let sink = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&sink)
        .await;

    let exporter = Exporter::try_from(ExporterConfig::Http(sink_config(&sink))).unwrap();
    exporter.start().await.unwrap();
    exporter.stop().await.unwrap();

    let err = exporter.push(&CheckResult::success("x", "")).await.unwrap_err();
    assert!(matches!(err, ExportError::NotStarted(_)));
}

#[tokio::test]
async fn configuration_file_drives_the_engine() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("lookout.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    write!(
        file,
        r#"
[engine]
queue-size = 10

[[tcp-checks]]
name = "from-file"
description = "listener"
interval = "2s"
timeout = "1s"
target = "127.0.0.1"
port = {port}
"#
    )
    .unwrap();

    let config = Config::from_config(Some(&config_path)).unwrap();
    assert_eq!(config.engine.queue_size, 10);

    let engine = Arc::new(Engine::new(config.engine.clone()));
    for probe in config.probes() {
        engine.add_check(Probe::from(probe)).await.unwrap();
    }

    let checks = engine.list_checks().await;
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].base().source, "configuration");

    let store = engine.store();
    for _ in 0..40 {
        if store.get("from-file").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(store.get("from-file").unwrap().success);

    engine.shutdown().await;
    assert!(engine.list_checks().await.is_empty());
}
