//! Scenario tests: raw votes in, claimable distribution out.

use std::sync::Arc;

use axum::http::StatusCode;
use primitive_types::U256;
use serde_json::json;

use crate::api::{self, ApiState, PublishRequest, GENERIC_FAILURE};
use crate::db;
use crate::distribution::{verify, MerkleDistribution, RoundPhase};
use crate::service::Allocator;
use crate::test_support::{payout, project_id, raw_vote, round, FixedPrices, MemoryIndexer, ROUND_ID};
use crate::types::{Address, DistributionEntry, Hash};

fn dai() -> Address {
    "0x6B175474E89094C44Da98b954EedeAC495271d0F".parse().unwrap()
}

/// Project 1 has four $1 supporters, project 2 one $4 supporter.
fn textbook_votes() -> Vec<crate::types::RawContribution> {
    vec![
        raw_vote(1, 1, dai(), "1"),
        raw_vote(1, 2, dai(), "1"),
        raw_vote(1, 3, dai(), "1"),
        raw_vote(1, 4, dai(), "1"),
        raw_vote(2, 5, dai(), "4"),
    ]
}

fn allocator(indexer: MemoryIndexer) -> Allocator {
    let indexer = Arc::new(indexer);
    Allocator::new(
        indexer.clone(),
        indexer,
        Arc::new(FixedPrices::new().with(dai(), "1")),
    )
}

async fn state(indexer: MemoryIndexer) -> ApiState {
    ApiState {
        pool: db::init_pool("sqlite::memory:").await.unwrap(),
        allocator: allocator(indexer),
    }
}

#[tokio::test]
async fn broad_support_takes_the_whole_pool() {
    let svc = allocator(MemoryIndexer::new(
        round(&[1, 2], U256::from(1000u64), json!({})),
        textbook_votes(),
    ));

    let matching = svc.compute_matching(1, ROUND_ID).await.unwrap();
    assert_eq!(matching.strategy, "linearQuadraticFunding");
    assert_eq!(matching.excluded_contributions, 0);

    let by_project = |p| {
        matching
            .results
            .iter()
            .find(|r| r.project_id == project_id(p))
            .unwrap()
    };
    assert_eq!(by_project(1).match_amount_in_token, U256::from(1000u64));
    assert_eq!(by_project(1).contributions_count, 4);
    assert_eq!(by_project(2).match_amount_in_token, U256::zero());
}

#[tokio::test]
async fn every_committed_leaf_verifies_against_the_root() {
    let mut votes = textbook_votes();
    votes.push(raw_vote(3, 6, dai(), "2"));
    votes.push(raw_vote(3, 7, dai(), "8"));
    let svc = allocator(MemoryIndexer::new(
        round(&[1, 2, 3], U256::from(999u64), json!({})),
        votes,
    ));

    let matching = svc.compute_matching(1, ROUND_ID).await.unwrap();
    let tree = MerkleDistribution::build(matching.results).unwrap();
    let artifact = tree.artifact();

    assert_eq!(artifact.leaves.len(), 3);
    for (i, (leaf, proof)) in artifact.leaves.iter().zip(&artifact.proofs).enumerate() {
        assert_eq!(leaf.index, i as u64);
        assert_eq!(leaf.payout_address, payout(i as u8 + 1));
        assert!(verify(&artifact.root, leaf, proof));
    }

    let forged = DistributionEntry {
        match_amount_in_token: artifact.leaves[1].match_amount_in_token + U256::one(),
        ..artifact.leaves[1].clone()
    };
    assert!(!verify(&artifact.root, &forged, &artifact.proofs[1]));
}

#[tokio::test]
async fn unpriced_votes_do_not_move_the_result() {
    let mut votes = textbook_votes();
    votes.push(raw_vote(2, 9, Address([0xee; 20]), "1000"));
    let svc = allocator(MemoryIndexer::new(
        round(&[1, 2], U256::from(1000u64), json!({})),
        votes,
    ));

    let matching = svc.compute_matching(1, ROUND_ID).await.unwrap();
    assert_eq!(matching.excluded_contributions, 1);
    let total: U256 = matching
        .results
        .iter()
        .fold(U256::zero(), |acc, r| acc + r.match_amount_in_token);
    assert_eq!(total, U256::from(1000u64));
}

#[tokio::test]
async fn commit_prove_and_publish_over_the_api() {
    let state = state(MemoryIndexer::new(
        round(&[1, 2], U256::from(1000u64), json!({})),
        textbook_votes(),
    ))
    .await;

    let (status, committed) = api::commit_response(&state, "1", ROUND_ID).await;
    assert_eq!(status, StatusCode::OK, "{committed:?}");
    let root: Hash = committed.data["root"].as_str().unwrap().parse().unwrap();

    // Committing the same inputs again yields the same root.
    let (_, again) = api::commit_response(&state, "1", ROUND_ID).await;
    assert_eq!(again.data["root"], committed.data["root"]);

    let (status, proof) = api::proof_response(&state, "1", ROUND_ID, "0").await;
    assert_eq!(status, StatusCode::OK);
    let leaf: DistributionEntry = serde_json::from_value(proof.data["leaf"].clone()).unwrap();
    let siblings: Vec<Hash> = serde_json::from_value(proof.data["proof"].clone()).unwrap();
    assert_eq!(leaf.project_id, project_id(1));
    assert!(verify(&root, &leaf, &siblings));

    let (status, missing) = api::proof_response(&state, "1", ROUND_ID, "7").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing.message, GENERIC_FAILURE);

    let publish = PublishRequest {
        root: root.to_string(),
        tx_hash: "0xfeed".to_string(),
    };
    let (status, published) = api::publish_response(&state, "1", ROUND_ID, &publish).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published.data["status"], RoundPhase::Published.as_str());

    let (status, replay) = api::publish_response(&state, "1", ROUND_ID, &publish).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!replay.success);

    let (status, stored) = api::distribution_response(&state, "1", ROUND_ID).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored.data["publishTx"], "0xfeed");
}

#[tokio::test]
async fn unsupported_strategy_commits_nothing() {
    let mut r = round(&[1, 2], U256::from(1000u64), json!({}));
    r.voting_strategy.strategy_name = "quadraticVoting".to_string();
    let state = state(MemoryIndexer::new(r, textbook_votes())).await;

    let (status, body) = api::commit_response(&state, "1", ROUND_ID).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body.message, GENERIC_FAILURE);
    assert_eq!(body.data, json!("error: unsupported voting strategy"));

    assert!(db::latest_distribution(&state.pool, 1, ROUND_ID)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn matches_endpoint_reports_results() {
    let state = state(MemoryIndexer::new(
        round(&[1, 2], U256::from(1000u64), json!({})),
        textbook_votes(),
    ))
    .await;

    let (status, body) = api::matches_response(&state.allocator, "1", ROUND_ID).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.data["strategy"], "linearQuadraticFunding");
    assert_eq!(body.data["results"].as_array().unwrap().len(), 2);
}
