//! Integration tests for scenario runs.
//!
//! Loads scenario files from disk and runs them end to end on the local bus.

use std::future::pending;

use courier_agent::ShopOutcome;
use courierd::{run, RunOptions, ScenarioConfig, DEFAULT_START_JITTER};

// ============================================================================
// Helper Functions
// ============================================================================

fn write_scenario(json: &str) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().expect("temp file");
    std::fs::write(file.path(), json).expect("write scenario");
    file
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn reference_scenario_from_disk_delivers_everything() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("scenario.json");
    ScenarioConfig::default().save(&path).unwrap();

    let config = ScenarioConfig::from_file(&path).unwrap();
    let options = RunOptions {
        start_jitter: Some(DEFAULT_START_JITTER),
    };
    let summary = run(&config, options, pending()).await.unwrap();

    assert_eq!(summary.delivered(), 3);
    for vehicle in &summary.vehicles {
        assert_eq!(vehicle.current_load, 0);
        assert!(vehicle.is_available());
    }
}

#[tokio::test(start_paused = true)]
async fn order_no_vehicle_can_carry_is_exhausted() {
    let file = write_scenario(
        r#"{
            "protocol": { "retry": { "max_retries": 2, "backoff_secs": 1.0 } },
            "vehicles": [ { "id": "van", "capacity": 20, "speed": 40 } ],
            "shops": [
                { "id": "bulk", "location": [3, 4], "time_window": [8, 18], "needs": { "cement": 500 } },
                { "id": "corner", "location": [6, 8], "time_window": [8, 18], "needs": { "milk": 10 } }
            ]
        }"#,
    );
    let config = ScenarioConfig::from_file(file.path()).unwrap();

    let summary = run(&config, RunOptions::default(), pending()).await.unwrap();

    assert_eq!(summary.shops[0].outcome, ShopOutcome::Exhausted { attempts: 3 });
    match &summary.shops[1].outcome {
        ShopOutcome::Delivered { vehicle_id, cost, .. } => {
            assert_eq!(vehicle_id.as_str(), "van");
            assert_eq!(*cost, 100.0);
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert_eq!(summary.delivered(), 1);
    assert_eq!(summary.total_cost(), 100.0);
}

#[tokio::test(start_paused = true)]
async fn non_positive_speed_uses_fallback() {
    let file = write_scenario(
        r#"{
            "protocol": { "default_speed_fallback": 5.0 },
            "vehicles": [ { "id": "cart", "capacity": 10, "speed": 0, "position": [0, 0] } ],
            "shops": [ { "id": "kiosk", "location": [30, 40], "time_window": [0, 24], "needs": { "tea": 1 } } ]
        }"#,
    );
    let config = ScenarioConfig::from_file(file.path()).unwrap();

    let summary = run(&config, RunOptions::default(), pending()).await.unwrap();
    assert!(summary.shops[0].is_delivered());
    assert_eq!(summary.vehicles[0].position.x, 30.0);
}

#[test]
fn invalid_scenario_file_is_rejected() {
    let file = write_scenario(r#"{ "vehicles": [], "shops": [] }"#);
    let err = ScenarioConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("at least one vehicle"));
}
