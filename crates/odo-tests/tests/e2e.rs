//! End-to-end scenarios driven through the registry, as the API layer would.

use std::sync::Arc;

use serde_json::{json, Value};

use odo_core::chain::{IntegrityFinding, VehicleChain};
use odo_core::config::FraudConfig;
use odo_core::error::ChainError;
use odo_core::fraud::{FraudCheck, ALERT_CROSS_APP_DUPLICATE, ALERT_IMAGE_REUSED, ALERT_NOT_INCREASING};
use odo_core::traits::DedupClaim;
use odo_core::types::{reading_fingerprint, Hash256, ReadingSubmission};
use odo_ledger::ChainRegistry;
use odo_tests::helpers::*;

/// Serialize the registry's chains, apply `edit`, and load them back, as if
/// the persistence layer's storage had been modified.
async fn tampered(registry: &ChainRegistry, edit: impl FnOnce(&mut Value)) -> Vec<VehicleChain> {
    let mut value = serde_json::to_value(registry.snapshot().await).unwrap();
    edit(&mut value);
    serde_json::from_value(value).unwrap()
}

// ---------------------------------------------------------------------------
// Reading scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accept_accept_then_reject_lower_reading() {
    let (registry, _) = new_registry();
    registry.create_chain("V1").unwrap();

    let genesis = registry.add_reading_at(&reading("V1", 100, "img-1"), T0).await.unwrap();
    assert!(genesis.success);
    assert_eq!(registry.summarize("V1").await.unwrap().last_valid_km, Some(100));

    let second = registry.add_reading_at(&reading("V1", 150, "img-2"), T0 + HOUR).await.unwrap();
    assert!(second.success);
    assert_eq!(registry.summarize("V1").await.unwrap().last_valid_km, Some(150));

    let third = registry.add_reading_at(&reading("V1", 140, "img-3"), T0 + 2 * HOUR).await.unwrap();
    assert!(!third.success);
    assert_eq!(third.fraud_alert.as_deref(), Some(ALERT_NOT_INCREASING));
    assert_eq!(registry.summarize("V1").await.unwrap().last_valid_km, Some(150));
}

#[tokio::test]
async fn same_image_twice_is_rejected() {
    let (registry, _) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100]).await;

    let first = registry.add_reading_at(&reading("V1", 150, "imgA"), T0 + HOUR).await.unwrap();
    assert!(first.success);

    let second = registry.add_reading_at(&reading("V1", 200, "imgA"), T0 + 2 * HOUR).await.unwrap();
    assert!(!second.success);
    assert!(second.fraud_alert.unwrap().contains(ALERT_IMAGE_REUSED));
    assert!(second.verdict.reasons.contains(&FraudCheck::ImageReused));
}

#[tokio::test]
async fn genesis_accepted_regardless_of_value() {
    let (registry, _) = new_registry();
    for (i, km) in [0u64, 7, 150_000, u32::MAX as u64].iter().enumerate() {
        let id = format!("G{i}");
        registry.create_chain(&id).unwrap();
        let out = registry.add_reading_at(&reading(&id, *km, "img"), T0).await.unwrap();
        assert!(out.success, "genesis km={km} rejected");
        let block = out.block.unwrap();
        assert_eq!(block.index, 0);
        assert!(block.previous_hash.is_zero());
    }
}

#[tokio::test]
async fn monotonicity_enforced_for_every_lower_or_equal_value() {
    let (registry, _) = new_registry_with(FraudConfig {
        suspension_threshold: u64::MAX,
        ..FraudConfig::default()
    });
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100, 150, 200]).await;

    for km in [0, 1, 100, 199, 200] {
        let out = registry
            .add_reading_at(&reading("V1", km, &format!("low-{km}")), T0 + 10 * HOUR)
            .await
            .unwrap();
        assert!(!out.success, "km={km}");
        assert_eq!(out.fraud_alert.as_deref(), Some(ALERT_NOT_INCREASING));
    }
    assert_eq!(registry.summarize("V1").await.unwrap().total_blocks, 3);
}

#[tokio::test]
async fn cross_app_claim_blocks_reading() {
    let (registry, oracle) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100]).await;

    let now = T0 + HOUR;
    oracle.seed(
        reading_fingerprint("V1", 150),
        DedupClaim {
            source: "partner-app".into(),
            vehicle_id: "V1".into(),
            odometer_km: 150,
            claimed_at: now - 60,
        },
    );

    let out = registry.add_reading_at(&reading("V1", 150, "img-x"), now).await.unwrap();
    assert!(!out.success);
    let alert = out.fraud_alert.unwrap();
    assert!(alert.contains(ALERT_CROSS_APP_DUPLICATE), "{alert}");
    assert!(alert.contains("partner-app"));

    // A different km in the same window is unaffected.
    let ok = registry.add_reading_at(&reading("V1", 151, "img-y"), now).await.unwrap();
    assert!(ok.success);
}

#[tokio::test]
async fn cross_app_claim_just_across_a_window_boundary_still_blocks() {
    let (registry, oracle) = new_registry();
    registry.create_chain("V1").unwrap();
    let window = registry.config().dedup_window_secs;

    // Partner claims 1 s before a multiple of the window; we submit 1 s after.
    let boundary = (T0 / window + 1) * window;
    oracle.seed(
        reading_fingerprint("V1", 100),
        DedupClaim {
            source: "partner-app".into(),
            vehicle_id: "V1".into(),
            odometer_km: 100,
            claimed_at: boundary - 1,
        },
    );

    let out = registry
        .add_reading_at(&reading("V1", 100, "img"), boundary + 1)
        .await
        .unwrap();
    assert!(!out.success);
    assert_eq!(out.verdict.hard_failure, Some(FraudCheck::CrossAppDuplicate));
}

#[tokio::test]
async fn cross_app_claim_outside_window_does_not_block() {
    let (registry, oracle) = new_registry();
    registry.create_chain("V1").unwrap();
    let window = registry.config().dedup_window_secs;
    oracle.seed(
        reading_fingerprint("V1", 100),
        DedupClaim {
            source: "partner-app".into(),
            vehicle_id: "V1".into(),
            odometer_km: 100,
            claimed_at: T0,
        },
    );

    let late = registry
        .add_reading_at(&reading("V1", 100, "img"), T0 + window + 1)
        .await
        .unwrap();
    assert!(late.success);
    assert!(!late.verdict.reasons.contains(&FraudCheck::CrossAppDuplicate));
}

#[tokio::test]
async fn own_claims_do_not_count_as_cross_app() {
    let (registry, oracle) = new_registry();
    registry.create_chain("V1").unwrap();
    let own_source = registry.config().source_id.clone();
    oracle.seed(
        reading_fingerprint("V1", 100),
        DedupClaim {
            source: own_source,
            vehicle_id: "V1".into(),
            odometer_km: 100,
            claimed_at: T0 - 5,
        },
    );

    let out = registry.add_reading_at(&reading("V1", 100, "img"), T0).await.unwrap();
    assert!(out.success);
    assert!(!out.verdict.reasons.contains(&FraudCheck::CrossAppDuplicate));
}

// ---------------------------------------------------------------------------
// Suspension
// ---------------------------------------------------------------------------

#[tokio::test]
async fn suspension_blocks_every_later_submission() {
    let (registry, _) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100]).await;
    let threshold = registry.config().suspension_threshold;

    let mut i = 0;
    while registry.summarize("V1").await.unwrap().is_active {
        registry
            .add_reading_at(&reading("V1", 1, &format!("fraud-{i}")), T0 + HOUR)
            .await
            .unwrap();
        i += 1;
        assert!(i < 100, "chain never suspended");
    }
    let summary = registry.summarize("V1").await.unwrap();
    assert!(summary.cumulative_fraud_score >= threshold);

    for (k, km) in [150u64, 200, 10_000].iter().enumerate() {
        let clean = reading("V1", *km, &format!("clean-{k}"));
        let err = registry.add_reading_at(&clean, T0 + (5 + k as u64) * HOUR).await.unwrap_err();
        assert_eq!(err, ChainError::Suspended);
        assert_eq!(err.to_string(), "chain suspended");
    }
    assert_eq!(registry.summarize("V1").await.unwrap().total_blocks, 1);
}

// ---------------------------------------------------------------------------
// Integrity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_block_chain_is_linked() {
    let (registry, _) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100, 150, 200]).await;

    let chain = registry.get_chain("V1").await.unwrap();
    let blocks = chain.blocks();
    assert_eq!(blocks[2].previous_hash, blocks[1].compute_hash());
    assert_eq!(blocks[1].previous_hash, blocks[0].compute_hash());
    assert!(registry.verify_integrity("V1").await.unwrap().is_valid);
}

#[tokio::test]
async fn rehashed_tamper_caught_by_next_link() {
    let (registry, oracle) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100, 150, 200]).await;

    let mut chains = tampered(&registry, |v| v[0]["blocks"][1]["odometer_km"] = json!(160)).await;
    let rehashed = chains[0].blocks()[1].compute_hash();
    let mut value = serde_json::to_value(&chains).unwrap();
    value[0]["blocks"][1]["hash"] = json!(rehashed.to_string());
    chains = serde_json::from_value(value).unwrap();

    let restored = ChainRegistry::from_chains(FraudConfig::default(), oracle, chains).unwrap();
    let report = restored.verify_integrity("V1").await.unwrap();
    assert!(!report.is_valid);
    assert!(report
        .errors
        .iter()
        .any(|e| matches!(e, IntegrityFinding::BrokenLink { index: 2, .. })));
}

#[tokio::test]
async fn any_single_field_tamper_is_detected() {
    let (registry, _) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100, 150, 200]).await;

    let fields = [
        "index",
        "previous_hash",
        "timestamp",
        "odometer_km",
        "image_fingerprint",
        "location_accuracy_m",
        "device_fingerprint",
        "fraud_score",
        "hash",
    ];
    for block in 0..3usize {
        for field in fields {
            let chains = tampered(&registry, |v| {
                let slot = &mut v[0]["blocks"][block][field];
                let replacement = match &*slot {
                    Value::Number(n) => json!(n.as_u64().unwrap() + 1),
                    Value::String(_) if field.ends_with("hash") => {
                        json!(Hash256([0x5A; 32]).to_string())
                    }
                    Value::String(s) => json!(format!("{s}-forged")),
                    other => panic!("unexpected value for {field}: {other}"),
                };
                *slot = replacement;
            })
            .await;
            let report = chains[0].verify_integrity();
            assert!(!report.is_valid, "tampering block {block} field {field} went unnoticed");
            assert!(!report.errors.is_empty());
        }
    }
}

// ---------------------------------------------------------------------------
// Oracle failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn oracle_outage_then_recovery() {
    let (registry, oracle) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100]).await;

    oracle.set_available(false);
    let submission = reading("V1", 150, "img-2");
    let err = registry.add_reading_at(&submission, T0 + HOUR).await.unwrap_err();
    assert!(matches!(err, ChainError::OracleUnavailable(_)));

    let summary = registry.summarize("V1").await.unwrap();
    assert_eq!(summary.cumulative_fraud_score, 0);
    assert_eq!(summary.rejected_attempts, 0);

    oracle.set_available(true);
    let out = registry.add_reading_at(&submission, T0 + HOUR).await.unwrap();
    assert!(out.success);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_vehicle_submissions_never_interleave() {
    let oracle = Arc::new(YieldingOracle::default());
    let registry = Arc::new(ChainRegistry::new(
        FraudConfig {
            suspension_threshold: u64::MAX,
            ..FraudConfig::default()
        },
        oracle.clone(),
    ));
    registry.create_chain("V1").unwrap();

    let mut tasks = Vec::new();
    for i in 0..16u64 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let sub = reading("V1", 100 + i * 10, &format!("img-{i}"));
            registry.add_reading_at(&sub, T0 + i * HOUR).await
        }));
    }
    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().success {
            accepted += 1;
        }
    }

    assert_eq!(oracle.max_in_flight(), 1, "oracle calls for one vehicle overlapped");
    let chain = registry.get_chain("V1").await.unwrap();
    assert_eq!(chain.len(), accepted);
    assert!(chain.verify_integrity().is_valid);
    assert!(chain.blocks().windows(2).all(|w| w[1].odometer_km > w[0].odometer_km));
}

#[tokio::test]
async fn different_vehicles_proceed_in_parallel() {
    let oracle = Arc::new(YieldingOracle::default());
    let registry = Arc::new(ChainRegistry::new(FraudConfig::default(), oracle.clone()));
    for i in 0..8 {
        registry.create_chain(&format!("V{i}")).unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..8 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry.add_reading_at(&reading(&format!("V{i}"), 100, "img"), T0).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap().success);
    }

    assert!(oracle.max_in_flight() > 1, "vehicles were serialized behind one another");
    for i in 0..8 {
        assert_eq!(registry.summarize(&format!("V{i}")).await.unwrap().total_blocks, 1);
    }
}

// ---------------------------------------------------------------------------
// API-facing shapes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn summary_serializes_for_status_endpoint() {
    let (registry, _) = new_registry();
    registry.create_chain("V1").unwrap();
    seed_chain(&registry, "V1", &[100, 150]).await;

    let value = serde_json::to_value(registry.summarize("V1").await.unwrap()).unwrap();
    assert_eq!(value["vehicle_id"], "V1");
    assert_eq!(value["total_blocks"], 2);
    assert_eq!(value["integrity"]["is_valid"], true);
}

#[tokio::test]
async fn submission_decodes_from_api_json() {
    let body = r#"{
        "vehicle_id": "V1",
        "odometer_km": 100,
        "image_fingerprint": "abc",
        "location_accuracy_m": 12,
        "device_fingerprint": "ua-hash",
        "proof": { "ocr_confidence": 91, "image_captured_at": 1700000000 }
    }"#;
    let sub: ReadingSubmission = serde_json::from_str(body).unwrap();
    let (registry, _) = new_registry();
    registry.create_chain("V1").unwrap();
    let out = registry.add_reading_at(&sub, T0 + 30).await.unwrap();
    assert!(out.success);
    assert_eq!(out.verdict.score, 0);
}
