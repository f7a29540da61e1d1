//! Integration tests for the full crc-sim pipeline.
//!
//! These tests verify end-to-end behavior: payload -> encode -> channel ->
//! inject -> verify, plus relaying outcomes between simulated endpoints.

use crc_sim_core::{
    bits::{BitString, Key},
    crc::CrcCodec,
    inject::{ErrorInjector, ErrorSpec, SharedRng},
    metrics::SimulationMetrics,
    relay::{Delivery, Relay, MASTER},
    transmission::{
        simulate_batch, AtomicFailureSwitch, ChannelParams, FailureSwitch, OutcomeError,
        TransmissionRequest, TransmissionSimulator,
    },
};
use std::sync::Arc;

/// The reference example: encode, transmit cleanly, verify.
#[tokio::test]
async fn test_reference_transfer() {
    let mut sim = TransmissionSimulator::seeded(42);
    let request = TransmissionRequest::new("101100110000", "10011").with_route("1", "2");

    let outcome = sim.simulate(&request).await;

    assert_eq!(outcome.remainder.unwrap().to_string(), "1100");
    assert_eq!(outcome.original_codeword.unwrap().to_string(), "1011001100001100");
    assert_eq!(outcome.verification_passed, Some(true));
}

/// Key 11 (x + 1) is a parity check: any odd number of flips is caught.
#[tokio::test]
async fn test_odd_errors_caught_by_parity_key() {
    let mut sim = TransmissionSimulator::seeded(5);

    for count in [1, 2, 3, 7] {
        let request = TransmissionRequest::new("110100111010", "11").with_error(ErrorSpec::Odd { count });
        for _ in 0..10 {
            let outcome = sim.simulate(&request).await;
            assert_eq!(outcome.flipped_positions.len() % 2, 1);
            assert_eq!(outcome.verification_passed, Some(false));
        }
    }
}

/// A burst no longer than the key degree is always detected.
#[tokio::test]
async fn test_short_bursts_detected() {
    let mut sim = TransmissionSimulator::seeded(8);

    for count in 1..=4 {
        let request =
            TransmissionRequest::new("101100110000", "10011").with_error(ErrorSpec::Burst { count });
        for _ in 0..20 {
            let outcome = sim.simulate(&request).await;
            let positions = &outcome.flipped_positions;
            assert_eq!(positions.len(), count);
            assert!(positions.windows(2).all(|w| w[1] == w[0] + 1));
            assert_eq!(outcome.verification_passed, Some(false));
        }
    }
}

/// Corruption reported by the outcome matches the codewords it carries.
#[tokio::test]
async fn test_outcome_positions_match_codewords() {
    let mut sim = TransmissionSimulator::seeded(77);
    let request = TransmissionRequest::new("1110010101", "1011").with_error(ErrorSpec::Double);

    let outcome = sim.simulate(&request).await;
    let original = outcome.original_codeword.as_ref().unwrap();
    let corrupted = outcome.corrupted_codeword.as_ref().unwrap();

    assert_eq!(
        original.differing_positions(corrupted).unwrap(),
        {
            let mut sorted = outcome.flipped_positions.clone();
            sorted.sort_unstable();
            sorted
        }
    );
}

/// A batch with mixed requests runs to completion and tallies correctly.
#[tokio::test]
async fn test_batch_metrics() {
    let mut requests = Vec::new();
    for _ in 0..10 {
        requests.push(TransmissionRequest::new("101100110000", "10011"));
        requests.push(TransmissionRequest::new("101100110000", "10011").with_error(ErrorSpec::Single));
        requests.push(
            TransmissionRequest::new("101100110000", "10011").with_channel(ChannelParams::new(0.0, 100.0)),
        );
        requests.push(TransmissionRequest::new("10a1", "10011"));
    }

    let outcomes = simulate_batch(requests, 1000, None).await;
    let mut metrics = SimulationMetrics::new();
    for outcome in &outcomes {
        metrics.record(outcome);
    }
    metrics.complete();

    assert_eq!(metrics.transmissions, 40);
    assert_eq!(metrics.clean, 10);
    assert_eq!(metrics.corruption_detected, 10);
    assert_eq!(metrics.corruption_undetected, 0);
    assert_eq!(metrics.packets_lost, 10);
    assert_eq!(metrics.invalid_requests, 10);
}

/// A failure switch shared by a batch refuses every transfer while on.
#[tokio::test]
async fn test_batch_outage() {
    let switch = Arc::new(AtomicFailureSwitch::new());
    switch.set(true);

    let requests = vec![TransmissionRequest::new("1", "11"); 5];
    let outcomes = simulate_batch(requests, 0, Some(switch as Arc<dyn FailureSwitch>)).await;

    assert!(outcomes
        .iter()
        .all(|o| o.error == Some(OutcomeError::Unavailable)));
}

/// Outcomes serialize to JSON and can be relayed to the master.
#[tokio::test]
async fn test_relay_outcome_to_master() {
    let relay = Relay::new();
    let mut master = relay.connect_master();

    let mut sim = TransmissionSimulator::seeded(3);
    let outcome = sim
        .simulate(&TransmissionRequest::new("1101", "1011").with_error(ErrorSpec::Single))
        .await;

    let message = serde_json::to_value(&outcome).unwrap();
    let delivery = relay.route_from_node("1", MASTER, message).unwrap();
    assert_eq!(delivery, Delivery::Delivered { recipients: 1 });

    let envelope = master.recv().await.unwrap();
    assert_eq!(envelope.message["original_codeword"], "1101001");
    assert_eq!(envelope.message["verification_passed"], false);
    assert_eq!(envelope.message["error_spec"]["error_type"], "single");
}

/// Injectors drawing from one shared source never panic or race.
#[tokio::test]
async fn test_shared_rng_across_tasks() {
    let shared = SharedRng::seeded(31);
    let codeword = CrcCodec::encode(
        &BitString::parse("101100110000").unwrap(),
        &Key::parse("10011").unwrap(),
    )
    .codeword;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let rng = shared.clone();
        let codeword = codeword.clone();
        handles.push(tokio::spawn(async move {
            let mut injector = ErrorInjector::new(rng);
            let mut counts = Vec::new();
            for _ in 0..25 {
                let corrupted = injector.inject(&codeword, ErrorSpec::Double).unwrap();
                counts.push(codeword.differing_positions(&corrupted).unwrap().len());
            }
            counts
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().iter().all(|&n| n == 2));
    }
}
