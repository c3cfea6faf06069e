//! End-to-end tests: the service wired from configuration against mock
//! feed and geocoding endpoints.

use std::sync::Arc;

use sky_core::{Config, FeedConfig, GeocodeConfig};
use sky_update::{UpdateService, WidgetRenderer, WidgetSnapshot};
use sky_weather::fixture::EXAMPLE_RESPONSE;
use sky_weather::{Coordinates, GeocodeQuery, Target, UpdateStatus};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct NullRenderer;

impl WidgetRenderer for NullRenderer {
    fn render(&self, _snapshot: &WidgetSnapshot) {}
}

fn config(dir: &std::path::Path, server: &MockServer) -> Config {
    Config {
        config_dir: dir.to_path_buf(),
        feed: FeedConfig {
            base_url: format!("{}/ig/api", server.uri()),
            ..FeedConfig::default()
        },
        geocode: GeocodeConfig {
            base_url: server.uri(),
            ..GeocodeConfig::default()
        },
        ..Config::default()
    }
}

fn lisbon(id: i64, interval: u32) -> Target {
    Target::new(id, "Lisbon")
        .with_coordinates(Coordinates::new(38.5, -9.25).unwrap())
        .with_interval(interval)
}

async fn mount_feed(server: &MockServer, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/ig/api"))
        .and(query_param("weather", "Lisbon,,,38500000,-9250000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EXAMPLE_RESPONSE))
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_configured_target_is_fetched_and_stored() {
    let mock_server = MockServer::start().await;
    mount_feed(&mock_server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let (service, _alarms) =
        UpdateService::open(&config(dir.path(), &mock_server), Arc::new(NullRenderer), None)
            .unwrap();

    let report = service
        .configure_target(lisbon(1, 6))
        .unwrap()
        .unwrap()
        .await
        .unwrap();

    assert!(report.all_ok);
    assert!(report.next_wake.is_some());

    let stored = service.target(1).unwrap().unwrap();
    assert_eq!(stored.status, UpdateStatus::Ok);
    assert_eq!(stored.conditions.and_then(|c| c.current_temperature), Some(12));
}

#[tokio::test]
async fn test_scheduled_refresh_only_covers_periodic_targets() {
    let mock_server = MockServer::start().await;
    mount_feed(&mock_server, 3).await;

    let dir = tempfile::tempdir().unwrap();
    let (service, _alarms) =
        UpdateService::open(&config(dir.path(), &mock_server), Arc::new(NullRenderer), None)
            .unwrap();

    for target in [lisbon(1, 0), lisbon(2, 3)] {
        service.configure_target(target).unwrap().unwrap().await.unwrap();
    }

    let report = service.update_scheduled().unwrap().unwrap().await.unwrap();

    assert_eq!(report.targets.len(), 1);
    assert_eq!(report.targets[0].id, 2);
}

#[tokio::test]
async fn test_lookup_location_uses_geocoder() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "lisbon"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"[{"lat":"38.7","lon":"-9.1","name":"Lisboa","address":{"city":"Lisboa"}}]"#,
            "application/json",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (service, _alarms) =
        UpdateService::open(&config(dir.path(), &mock_server), Arc::new(NullRenderer), None)
            .unwrap();

    let resolved = service
        .lookup_location(&GeocodeQuery::by_name("lisbon"))
        .await
        .unwrap();

    assert_eq!(resolved.name.as_deref(), Some("Lisboa"));
    assert_eq!(resolved.coordinates, Coordinates::new(38.7, -9.1));
}

#[tokio::test]
async fn test_removed_target_is_gone() {
    let mock_server = MockServer::start().await;
    mount_feed(&mock_server, 1).await;

    let dir = tempfile::tempdir().unwrap();
    let (service, _alarms) =
        UpdateService::open(&config(dir.path(), &mock_server), Arc::new(NullRenderer), None)
            .unwrap();

    service.configure_target(lisbon(4, 6)).unwrap().unwrap().await.unwrap();
    service.remove_target(4).unwrap();

    assert!(service.target(4).unwrap().is_none());
}
