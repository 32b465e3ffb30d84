//! Wire-level tests for the PuppetDB client against a mock server

use super::*;
use crate::extract::extract_value;
use crate::metrics::testing::sample;
use mockito::{Matcher, Server};
use prometheus::Registry;

fn client_for(url: &str) -> PuppetDbClient {
    PuppetDbClient::new(&ClientOptions {
        url: url.to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_endpoint_url_joins_with_single_slash() {
    let client = client_for("http://puppetdb.example:8080/prefix/");
    assert_eq!(
        client.endpoint_url("/status/v1/services").unwrap().as_str(),
        "http://puppetdb.example:8080/prefix/status/v1/services"
    );
    assert_eq!(
        client.endpoint_url("metrics/v2").unwrap().as_str(),
        "http://puppetdb.example:8080/prefix/metrics/v2"
    );

    let client = client_for("http://puppetdb.example:8080");
    assert_eq!(
        client.endpoint_url(endpoints::NODES).unwrap().as_str(),
        "http://puppetdb.example:8080/pdb/query/v4/nodes"
    );
}

#[tokio::test]
async fn test_nodes_sends_activation_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/pdb/query/v4/nodes")
        .match_query(Matcher::UrlEncoded("query".into(), NODES_QUERY.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"certname": "web01", "deactivated": null, "report_timestamp": "2024-05-01T10:00:00Z",
                 "latest_report_status": "changed", "report_environment": "production",
                 "latest_report_hash": "abc", "latest_report_noop": false},
                {"certname": "old01", "deactivated": "2024-01-01T00:00:00Z", "report_timestamp": null}
            ]"#,
        )
        .create_async()
        .await;

    let nodes = client_for(&server.url()).nodes().await.unwrap();

    mock.assert_async().await;
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].certname, "web01");
    assert!(nodes[0].is_active());
    assert!(!nodes[1].is_active());
    assert_eq!(nodes[1].report_timestamp(), None);
}

#[tokio::test]
async fn test_report_metrics_path() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/pdb/query/v4/reports/abc123/metrics")
        .with_status(200)
        .with_body(r#"[{"category": "resources", "name": "changed", "value": 3}]"#)
        .create_async()
        .await;

    let metrics = client_for(&server.url()).report_metrics("abc123").await.unwrap();

    mock.assert_async().await;
    assert_eq!(
        metrics,
        vec![ReportMetric {
            category: "resources".into(),
            name: "changed".into(),
            value: 3.0,
        }]
    );
}

#[tokio::test]
async fn test_services_decode() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/status/v1/services")
        .with_status(200)
        .with_body(
            r#"{
                "puppetdb-status": {
                    "service_version": "8.4.1",
                    "service_status_version": 1,
                    "detail_level": "info",
                    "state": "running",
                    "status": {"queue_depth": 2},
                    "active_alerts": []
                }
            }"#,
        )
        .create_async()
        .await;

    let services = client_for(&server.url()).services().await.unwrap();
    let status = &services["puppetdb-status"];
    assert_eq!(status.state, "running");
    assert_eq!(status.service_version, "8.4.1");
}

#[tokio::test]
async fn test_error_kinds() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/status/v1/services")
        .with_status(503)
        .create_async()
        .await;
    server
        .mock("GET", "/metrics/v2")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let client = client_for(&server.url());
    assert_eq!(client.services().await.unwrap_err().kind(), "http_status");
    assert_eq!(client.metrics_v2().await.unwrap_err().kind(), "decode_error");

    let unreachable = client_for("http://127.0.0.1:1");
    assert_eq!(unreachable.nodes().await.unwrap_err().kind(), "connection_error");
}

#[tokio::test]
async fn test_read_mbean_posts_json_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/metrics/v2/read")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(
            json!({"mbean": "puppetlabs.puppetdb.population:name=num-nodes"}),
        ))
        .with_status(200)
        .with_body(r#"{"request": {}, "value": {"Value": 42}, "status": 200}"#)
        .create_async()
        .await;

    let mbean = "puppetlabs.puppetdb.population:name=num-nodes";
    let reading = client_for(&server.url()).read_mbean(mbean).await.unwrap();

    mock.assert_async().await;
    assert_eq!(extract_value(&reading, mbean), Ok(42.0));
}

#[tokio::test]
async fn test_bulk_read_keeps_positions_when_one_bean_fails() {
    let mut server = Server::new_async().await;
    let names: Vec<String> = ["a:name=one", "b:name=two", "c:name=three"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mock = server
        .mock("POST", "/metrics/v2/read")
        .match_body(Matcher::Json(json!([
            {"mbean": "a:name=one"},
            {"mbean": "b:name=two"},
            {"mbean": "c:name=three"}
        ])))
        .with_status(200)
        .with_body(
            r#"[
                {"value": {"Value": 1}, "status": 200},
                {"error": "javax.management.InstanceNotFoundException: b:name=two", "status": 404},
                {"value": 3, "status": 200}
            ]"#,
        )
        .create_async()
        .await;

    let readings = client_for(&server.url())
        .read_mbeans_bulk(&names)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(readings.len(), 3);
    assert_eq!(extract_value(&readings[0], &names[0]), Ok(1.0));
    assert!(matches!(
        extract_value(&readings[1], &names[1]),
        Err(crate::error::ExtractError::Remote { .. })
    ));
    assert_eq!(extract_value(&readings[2], &names[2]), Ok(3.0));
}

#[tokio::test]
async fn test_bulk_read_with_no_names_sends_nothing() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/metrics/v2/read")
        .expect(0)
        .create_async()
        .await;

    let readings = client_for(&server.url()).read_mbeans_bulk(&[]).await.unwrap();

    mock.assert_async().await;
    assert!(readings.is_empty());
}

#[test]
fn test_align_bulk_response_pads_and_truncates() {
    let short = align_bulk_response(vec![json!({"value": 1}), json!("oops")], 3);
    assert_eq!(short.len(), 3);
    assert!(short[1].is_empty());
    assert!(short[2].is_empty());

    let long = align_bulk_response(vec![json!({}), json!({}), json!({})], 2);
    assert_eq!(long.len(), 2);
}

#[test]
fn test_mbean_names_from_list() {
    let listing = json!({
        "request": {"type": "list"},
        "value": {
            "java.lang": {"type=Memory": {}, "type=Threading": {}},
            "puppetlabs.puppetdb.population": {"": {}},
            "JMImplementation": "opaque"
        },
        "status": 200
    });

    let mut names = mbean_names_from_list(&listing);
    names.sort();
    assert_eq!(
        names,
        vec![
            "JMImplementation",
            "java.lang:type=Memory",
            "java.lang:type=Threading",
            "puppetlabs.puppetdb.population",
        ]
    );

    let flat = json!({"request": {}, "java.lang:type=Runtime": {}});
    assert_eq!(mbean_names_from_list(&flat), vec!["java.lang:type=Runtime"]);
}

#[tokio::test]
async fn test_requests_are_recorded() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/status/v1/services")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let registry = Registry::new();
    let telemetry = PerformanceMetrics::new(&registry).unwrap();
    let client = client_for(&server.url()).with_telemetry(telemetry);

    client.services().await.unwrap();

    assert_eq!(
        sample(
            &registry,
            "puppetdb_exporter_requests_total",
            &[("endpoint", "/status/v1/services"), ("status", "200")]
        ),
        Some(1.0)
    );
    assert_eq!(
        sample(
            &registry,
            "puppetdb_exporter_request_duration_seconds",
            &[("endpoint", "/status/v1/services"), ("method", "GET")]
        ),
        Some(1.0)
    );
}
