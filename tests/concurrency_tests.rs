//! Concurrency integration tests
//!
//! These tests drive a shared `RideEngine` from many tasks on a
//! multi-threaded runtime and check that contended mutations are settled
//! with exactly one winner and that retries under one key run once.

use bikeshare_engine::core::{ChannelSink, EngineConfig, ManualClock, RideEngine};
use bikeshare_engine::types::{
    Bike, BikeStatus, EngineError, GeoPoint, LockState, Polygon, RideState, TelemetrySample, Zone,
    ZoneKind,
};
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

fn depot() -> Zone {
    Zone {
        id: 1,
        name: "Depot".to_string(),
        kind: ZoneKind::Parking,
        polygon: Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.01),
            GeoPoint::new(0.01, 0.01),
            GeoPoint::new(0.01, 0.0),
        ]),
    }
}

fn engine_with_bikes(count: u32) -> RideEngine {
    let engine = RideEngine::new(EngineConfig::default(), vec![depot()]).unwrap();
    for id in 1..=count {
        engine
            .registry()
            .register(Bike::new(id, format!("BK-{}", id), GeoPoint::new(0.005, 0.005)))
            .unwrap();
    }
    engine
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_riders_racing_for_one_bike() {
    let engine = engine_with_bikes(1);

    let mut handles = Vec::new();
    for rider in 1..=32u32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.unlock("BK-1", rider, &format!("key-{}", rider)).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, EngineError::BikeUnavailable { .. }), "got {:?}", e),
        }
    }

    assert_eq!(winners, 1);
    let active: Vec<_> = engine
        .rides()
        .into_iter()
        .filter(|ride| ride.state == RideState::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(engine.registry().get(1).unwrap().lock_state, LockState::Unlocked);
    assert_eq!(engine.active_ride_for_bike(1).map(|r| r.id), Some(active[0].id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_one_rider_racing_for_many_bikes() {
    let engine = engine_with_bikes(16);

    let mut handles = Vec::new();
    for bike in 1..=16u32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .unlock(&format!("BK-{}", bike), 42, &format!("key-{}", bike))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, EngineError::RiderHasActiveRide { .. }), "got {:?}", e),
        }
    }

    assert_eq!(winners, 1);
    let unlocked = engine
        .bikes()
        .into_iter()
        .filter(|bike| bike.lock_state == LockState::Unlocked)
        .count();
    assert_eq!(unlocked, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_retries_under_one_key_run_once() {
    let engine = engine_with_bikes(1);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.unlock("BK-1", 7, "retry-key").await }));
    }

    let mut rides = Vec::new();
    for handle in handles {
        rides.push(handle.await.unwrap().unwrap().ride.id);
    }

    rides.dedup();
    assert_eq!(rides.len(), 1);
    assert_eq!(engine.rides().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_battery_reports_do_not_block_lock() {
    let engine = engine_with_bikes(1);
    let ride = engine.unlock("BK-1", 7, "u").await.unwrap().ride.id;

    let reporter = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for pct in (80..=99u8).rev() {
                engine.registry().report_battery(1, pct).unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };
    let receipt = engine.lock(ride, GeoPoint::new(0.005, 0.005), "l").await.unwrap();
    reporter.await.unwrap();

    assert_eq!(receipt.ride.id, ride);
    let bike = engine.registry().get(1).unwrap();
    assert_eq!(bike.lock_state, LockState::Locked);
    assert_eq!(bike.battery_pct, 80);
    assert_eq!(engine.ride(ride).unwrap().state, RideState::Ended);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_telemetry_and_lock_race_leaves_consistent_ride() {
    let engine = engine_with_bikes(1);
    let ride = engine.unlock("BK-1", 7, "u").await.unwrap().ride.id;
    engine
        .append_telemetry(ride, TelemetrySample::new(0.001, 0.001, 3.0, 0.0))
        .await
        .unwrap();

    let feeder = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut accepted = 0;
            for step in 1..=50 {
                let sample = TelemetrySample::new(0.001 + step as f64 * 1e-5, 0.001, 3.0, step as f64);
                match engine.append_telemetry(ride, sample).await {
                    Ok(_) => accepted += 1,
                    Err(e) => {
                        assert!(matches!(e, EngineError::RideNotActive { .. }), "got {:?}", e);
                        break;
                    }
                }
            }
            accepted
        })
    };
    let receipt = engine.lock(ride, GeoPoint::new(0.002, 0.001), "l").await.unwrap();
    let accepted = feeder.await.unwrap();

    // The ride froze with whatever telemetry made it in before the lock
    let stored = engine.ride(ride).unwrap();
    assert_eq!(stored.state, RideState::Ended);
    assert_eq!(stored.metrics, receipt.metrics);
    assert_eq!(stored.metrics.seconds, accepted as f64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_ended_ride_is_notified_once() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()));
    let (sink, mut receiver) = ChannelSink::new();
    let engine = RideEngine::with_collaborators(
        EngineConfig::default(),
        vec![depot()],
        clock,
        Arc::new(sink),
    )
    .unwrap();
    for id in 1..=8 {
        engine
            .registry()
            .register(Bike::new(id, format!("BK-{}", id), GeoPoint::new(0.005, 0.005)))
            .unwrap();
    }

    let mut handles = Vec::new();
    for id in 1..=8u32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let ride = engine
                .unlock(&format!("BK-{}", id), id, &format!("u{}", id))
                .await
                .unwrap()
                .ride
                .id;
            // The retry must not produce a second notice
            for _ in 0..2 {
                engine
                    .lock(ride, GeoPoint::new(0.004, 0.004), &format!("l{}", id))
                    .await
                    .unwrap();
            }
            ride
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let mut notified = Vec::new();
    while let Ok(notice) = receiver.try_recv() {
        notified.push(notice.ride);
    }
    notified.sort_unstable();
    assert_eq!(notified, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_bike_pulled_for_maintenance_mid_ride() {
    let engine = engine_with_bikes(1);
    let ride = engine.unlock("BK-1", 7, "u").await.unwrap().ride.id;

    engine.registry().set_status(1, BikeStatus::Maintenance).await.unwrap();
    engine.lock(ride, GeoPoint::new(0.005, 0.005), "l").await.unwrap();
    let result = engine.unlock("BK-1", 8, "u2").await;

    assert!(matches!(result, Err(EngineError::BikeUnavailable { .. })));
    assert_eq!(engine.ride(ride).unwrap().state, RideState::Ended);
}
