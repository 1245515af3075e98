//! End-to-end export tests against a local SQL API.

#[path = "../common/mod.rs"]
mod common;

use common::{
    BROKEN_TABLE, DRIP_BODY, DRIP_CHUNKS, DRIP_GAP, DRIP_USER, STALL_USER, TestServer,
    layer_group, layer_group_for, sublayer,
};
use serde_json::{Value, json};
use std::path::Path;
use std::time::{Duration, Instant};
use viz_export::models::{ExportReport, VisualizationDocument};
use viz_export::services::DocumentSource;
use viz_export::{ExportConfig, ExportError, ExportService, SublayerError};

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn expect_failed(result: Result<ExportReport, ExportError>) -> ExportReport {
    match result {
        Err(ExportError::SublayersFailed(report)) => report,
        other => panic!("expected sublayer failure, got {:?}", other),
    }
}

fn assert_nothing_left(dir: &Path) {
    assert!(!dir.join("layer.geojson").exists());
    assert!(!dir.join("layer.geojson.part").exists());
}

async fn single_layer_server(user: &'static str) -> TestServer {
    TestServer::start(move |base| {
        json!({ "layers": [layer_group_for(base, user, &[sublayer("SELECT * FROM big_table")])] })
    })
    .await
}

async fn two_group_server(second_sql: &str) -> TestServer {
    let second_sql = second_sql.to_string();
    TestServer::start(move |base| {
        json!({
            "id": "test",
            "layers": [
                layer_group(base, &[sublayer("SELECT * FROM parks")]),
                layer_group(base, &[
                    sublayer(&second_sql),
                    sublayer("SELECT name, the_geom FROM trees WHERE height > 10 ORDER BY name"),
                ]),
                { "type": "tiled", "options": { "urlTemplate": "https://tiles/{z}/{x}/{y}.png" } }
            ]
        })
    })
    .await
}

#[tokio::test]
async fn test_export_writes_every_sublayer() {
    let server = two_group_server("SELECT * FROM lakes GROUP BY kind").await;
    let dir = tempfile::tempdir().unwrap();

    let service = ExportService::new(&ExportConfig::default()).unwrap();
    let report = service
        .export_visualization(DocumentSource::parse(&server.viz_url()).unwrap(), dir.path())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.attempted, 3);
    assert_eq!(server.queries().len(), 3);

    for rel in [
        "layers/0/sublayers/0/layer.geojson",
        "layers/1/sublayers/0/layer.geojson",
        "layers/1/sublayers/1/layer.geojson",
    ] {
        let path = dir.path().join(rel);
        assert!(path.exists(), "missing {}", rel);
        assert!(report.written.contains(&path));
    }
    assert!(!dir.path().join("layers/2").exists());

    let viz = read_json(&dir.path().join("viz.json"));
    assert_eq!(viz["id"], "test");

    let first = read_json(&dir.path().join("layers/0/sublayers/0/layer.geojson"));
    assert_eq!(first["type"], "FeatureCollection");
    assert_eq!(first["user"], "eric");
    assert_eq!(first["format"], "GeoJSON");
    assert_eq!(
        first["q"],
        r#"SELECT * FROM parks WHERE ("the_geom" IS NOT NULL)"#
    );

    let grouped = read_json(&dir.path().join("layers/1/sublayers/0/layer.geojson"));
    let q = grouped["q"].as_str().unwrap();
    assert!(q.find("WHERE").unwrap() < q.find("GROUP BY kind").unwrap());

    let ordered = read_json(&dir.path().join("layers/1/sublayers/1/layer.geojson"));
    let q = ordered["q"].as_str().unwrap();
    assert!(q.contains(r#"WHERE (height > 10) AND ("the_geom" IS NOT NULL) ORDER BY name"#));
}

#[tokio::test]
async fn test_transport_failure_is_isolated() {
    let server = two_group_server(&format!("SELECT * FROM {}", BROKEN_TABLE)).await;
    let dir = tempfile::tempdir().unwrap();

    let service = ExportService::new(&ExportConfig::default()).unwrap();
    let result = service
        .export_visualization(DocumentSource::parse(&server.viz_url()).unwrap(), dir.path())
        .await;

    let report = expect_failed(result);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failed_coordinates(), vec![(1, 0)]);
    assert!(matches!(
        report.failures[0].error,
        SublayerError::Status { status, .. } if status.as_u16() == 500
    ));
    assert_eq!(report.written.len(), 2);

    assert!(dir.path().join("layers/0/sublayers/0/layer.geojson").exists());
    assert!(dir.path().join("layers/1/sublayers/1/layer.geojson").exists());

    let failed_dir = dir.path().join("layers/1/sublayers/0");
    assert!(!failed_dir.join("layer.geojson").exists());
    assert!(!failed_dir.join("layer.geojson.part").exists());
}

#[tokio::test]
async fn test_unparseable_sql_fails_without_request() {
    let server = two_group_server("SELEC * FORM nowhere").await;
    let dir = tempfile::tempdir().unwrap();

    let service = ExportService::new(&ExportConfig::default()).unwrap();
    let err = service
        .export_visualization(DocumentSource::parse(&server.viz_url()).unwrap(), dir.path())
        .await
        .unwrap_err();

    let report = err.report().expect("report");
    assert_eq!(report.failed_coordinates(), vec![(1, 0)]);
    assert!(matches!(
        report.failures[0].error,
        SublayerError::SqlParse(_)
    ));
    assert_eq!(server.queries().len(), 2);
}

#[tokio::test]
async fn test_document_load_failure_aborts() {
    let server = two_group_server("SELECT 1").await;
    let dir = tempfile::tempdir().unwrap();

    let service = ExportService::new(&ExportConfig::default()).unwrap();
    let err = service
        .export_visualization(
            DocumentSource::parse(&server.url("/api/v2/viz/missing/viz.json")).unwrap(),
            dir.path(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::DocumentLoad(_)));
    assert!(err.report().is_none());
    assert!(server.queries().is_empty());
    assert!(!dir.path().join("layers").exists());
    assert!(!dir.path().join("viz.json").exists());
}

#[tokio::test]
async fn test_export_with_styles() {
    let server = two_group_server("SELECT * FROM lakes").await;
    let dir = tempfile::tempdir().unwrap();

    let config = ExportConfig {
        export_styles: true,
        max_concurrency: 1,
        ..ExportConfig::default()
    };
    let service = ExportService::new(&config).unwrap();
    let report = service
        .export_visualization(DocumentSource::parse(&server.viz_url()).unwrap(), dir.path())
        .await
        .unwrap();

    assert_eq!(report.attempted, 6);
    assert_eq!(report.written.len(), 6);

    let style = read_json(&dir.path().join("layers/1/sublayers/1/style.json"));
    assert_eq!(style["version"], "2.1.1");
    assert_eq!(style["rules"][0]["selector"], "#layer");
    assert_eq!(style["rules"][0]["declarations"]["marker-fill"], "#FF6600");
    assert_eq!(style["rules"][0]["declarations"]["marker-width"], 10);
}

#[tokio::test]
async fn test_export_from_local_file() {
    let server = two_group_server("SELECT * FROM lakes").await;
    let source_dir = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();

    let viz_path = source_dir.path().join("my_viz.json");
    std::fs::write(&viz_path, serde_json::to_vec(&*server.state.viz).unwrap()).unwrap();

    let report = viz_export::export_visualization(viz_path.to_str().unwrap(), dest_dir.path())
        .await
        .unwrap();

    assert_eq!(report.written.len(), 3);
    assert_eq!(read_json(&dest_dir.path().join("viz.json"))["id"], "test");
}

#[tokio::test]
async fn test_steady_download_outlives_read_timeout() {
    let server = single_layer_server(DRIP_USER).await;
    let dir = tempfile::tempdir().unwrap();

    let read_timeout = Duration::from_millis(500);
    assert!(DRIP_GAP * DRIP_CHUNKS as u32 > read_timeout);
    let config = ExportConfig {
        read_timeout,
        ..ExportConfig::default()
    };

    let started = Instant::now();
    let report = ExportService::new(&config)
        .unwrap()
        .export_visualization(DocumentSource::parse(&server.viz_url()).unwrap(), dir.path())
        .await
        .unwrap();

    assert!(started.elapsed() > read_timeout);
    assert_eq!(report.written.len(), 1);
    let body = std::fs::read_to_string(dir.path().join("layers/0/sublayers/0/layer.geojson")).unwrap();
    assert_eq!(body, DRIP_BODY);
}

#[tokio::test]
async fn test_stalled_download_times_out() {
    let server = single_layer_server(STALL_USER).await;
    let dir = tempfile::tempdir().unwrap();

    let config = ExportConfig {
        read_timeout: Duration::from_millis(300),
        ..ExportConfig::default()
    };
    let report = expect_failed(
        ExportService::new(&config)
            .unwrap()
            .export_visualization(DocumentSource::parse(&server.viz_url()).unwrap(), dir.path())
            .await,
    );

    assert_eq!(report.failed_coordinates(), vec![(0, 0)]);
    assert!(matches!(report.failures[0].error, SublayerError::Transport(_)));
    assert_nothing_left(&dir.path().join("layers/0/sublayers/0"));
}

#[tokio::test]
async fn test_refused_connection_is_transport_failure() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", closed.local_addr().unwrap());
    drop(closed);

    let doc = VisualizationDocument::from_value(json!({
        "layers": [layer_group(&base, &[sublayer("SELECT * FROM parks")])]
    }));
    let dir = tempfile::tempdir().unwrap();

    let report = expect_failed(
        ExportService::new(&ExportConfig::default())
            .unwrap()
            .export_visualization(DocumentSource::Inline(doc), dir.path())
            .await,
    );

    assert_eq!(report.attempted, 1);
    assert!(matches!(
        &report.failures[0].error,
        SublayerError::Transport(e) if e.is_connect()
    ));
    assert_nothing_left(&dir.path().join("layers/0/sublayers/0"));
}

#[tokio::test]
async fn test_styles_skip_sublayer_without_cartocss() {
    let server = TestServer::start(|base| {
        json!({
            "layers": [layer_group(base, &[
                sublayer("SELECT * FROM parks"),
                json!({ "options": { "sql": "SELECT * FROM roads" } }),
            ])]
        })
    })
    .await;
    let dir = tempfile::tempdir().unwrap();

    let config = ExportConfig {
        export_styles: true,
        ..ExportConfig::default()
    };
    let report = ExportService::new(&config)
        .unwrap()
        .export_visualization(DocumentSource::parse(&server.viz_url()).unwrap(), dir.path())
        .await
        .unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.written.len(), 3);
    assert_eq!(
        report.skipped,
        vec![dir.path().join("layers/0/sublayers/1/style.json")]
    );
    assert!(dir.path().join("layers/0/sublayers/1/layer.geojson").exists());
    assert!(!dir.path().join("layers/0/sublayers/1/style.json").exists());
}
