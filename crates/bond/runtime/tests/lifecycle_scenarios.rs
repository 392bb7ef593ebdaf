//! End-to-end lifecycle scenarios through the registry and in-memory adapters.

mod common;

use bond_runtime::{AttestationOutcome, Clock, LifecycleEvent};
use bond_types::{
    AgentState, Amount, BondError, Command, ConsensusPolicy, DisputeVerdict, Identity,
    ReputationCommitment, SlashingSeverity,
};
use common::{config, Harness, AUTHORITY, GOVERNANCE, OWNER};
use std::collections::BTreeSet;

fn slash(severity: SlashingSeverity) -> Command {
    Command::ResolveDispute {
        verdict: DisputeVerdict::Slash(severity),
    }
}

fn open_dispute() -> Command {
    Command::OpenDispute {
        evidence: "receipt mismatch".into(),
    }
}

// ---------------------------------------------------------------------------
// Disputes and slashing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn severity_fixes_seizure_and_state() {
    let cases = [
        (SlashingSeverity::Minor, 900, AgentState::Active),
        (SlashingSeverity::Major, 500, AgentState::Frozen),
        (SlashingSeverity::Critical, 0, AgentState::Dead),
    ];
    for (severity, remaining, state) in cases {
        let h = Harness::new().await;
        let id = h.active_agent("nft-1", 1000).await;
        h.run(&id, "challenger", open_dispute()).await.unwrap();
        let outcome = h.run(&id, GOVERNANCE, slash(severity)).await.unwrap();

        assert_eq!(outcome.bond, Amount::new(remaining), "{severity}");
        assert_eq!(outcome.state, state, "{severity}");
        let resolution = outcome.resolution.unwrap();
        assert_eq!(resolution.seized, Amount::new(1000 - remaining));
        assert_eq!(h.assets.is_burned(&id), severity == SlashingSeverity::Critical);
    }
}

#[tokio::test]
async fn vigorish_goes_to_treasury() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, "challenger", open_dispute()).await.unwrap();
    h.run(&id, GOVERNANCE, slash(SlashingSeverity::Minor))
        .await
        .unwrap();

    let treasury = h.registry.treasury().await;
    assert_eq!(treasury.fees.vigorish, Amount::new(10));
    assert_eq!(treasury.fees.burned, Amount::new(90));
    assert_eq!(treasury.fees.registration, Amount::new(10));
}

#[tokio::test]
async fn second_dispute_is_rejected() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, "challenger", open_dispute()).await.unwrap();
    let err = h.run(&id, "someone-else", open_dispute()).await.unwrap_err();
    assert!(matches!(err, BondError::AlreadyChallenged(_)));
    assert_eq!(
        h.registry.get(&id).await.unwrap().state,
        AgentState::Challenged
    );
}

#[tokio::test]
async fn dismissal_restores_prior_state_and_freeze() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, "challenger", open_dispute()).await.unwrap();
    assert!(h.assets.entry(&id).frozen);

    let outcome = h
        .run(
            &id,
            GOVERNANCE,
            Command::ResolveDispute {
                verdict: DisputeVerdict::Dismissed,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.state, AgentState::Active);
    assert_eq!(outcome.bond, Amount::new(1000));
    assert!(!h.assets.entry(&id).frozen);
}

#[tokio::test]
async fn dispute_during_unbonding_blocks_release() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, AUTHORITY, Command::RequestUnbond).await.unwrap();
    h.run(&id, "challenger", open_dispute()).await.unwrap();

    h.clock.advance(chrono::Duration::days(8));
    let err = h.run(&id, AUTHORITY, Command::FinalizeUnbond).await.unwrap_err();
    assert!(matches!(err, BondError::InvalidStateTransition { .. }));
}

// ---------------------------------------------------------------------------
// Unbonding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn finalize_waits_for_grace_period() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, AUTHORITY, Command::RequestUnbond).await.unwrap();

    h.clock
        .advance(chrono::Duration::days(7) - chrono::Duration::seconds(1));
    let err = h.run(&id, AUTHORITY, Command::FinalizeUnbond).await.unwrap_err();
    assert_eq!(err, BondError::GracePeriodNotElapsed { remaining_secs: 1 });

    h.clock.advance(chrono::Duration::seconds(1));
    let outcome = h.run(&id, AUTHORITY, Command::FinalizeUnbond).await.unwrap();
    assert_eq!(outcome.state, AgentState::Thawed);
    assert_eq!(outcome.released, Some(Amount::new(1000)));
    assert_eq!(outcome.bond, Amount::zero());
    assert!(!h.assets.entry(&id).frozen);
}

#[tokio::test]
async fn owner_cannot_unbond() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    let err = h.run(&id, OWNER, Command::RequestUnbond).await.unwrap_err();
    assert!(matches!(err, BondError::Unauthorized { .. }));
}

// ---------------------------------------------------------------------------
// Validation consensus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_of_n_commits_on_second_matching_receipt() {
    let h = Harness::new().await;
    for v in ["v1", "v2"] {
        h.add_validator(v, 500);
    }
    let id = h.active_agent("nft-1", 1000).await;
    h.run(
        &id,
        AUTHORITY,
        Command::SetConsensusPolicy {
            policy: ConsensusPolicy::m_of_n(2, 3600),
        },
    )
    .await
    .unwrap();

    let first = h.signed_receipt("v1", &id, "task-1", 80);
    let outcome = h
        .run(&id, "relay", Command::SubmitAttestation { receipt: first.clone() })
        .await
        .unwrap();
    assert!(matches!(
        outcome.attestation,
        Some(AttestationOutcome::Pending { current: 1, required: 2, .. })
    ));
    let record = h.registry.get(&id).await.unwrap();
    assert_eq!(record.validation.commitment, ReputationCommitment::genesis());

    let digest = first.payload.digest();
    let err = h.registry.consensus_status(&id, &digest).await.unwrap_err();
    assert_eq!(err, BondError::ThresholdNotMet { required: 2, current: 1 });

    let second = h.signed_receipt("v2", &id, "task-1", 80);
    let outcome = h
        .run(&id, "relay", Command::SubmitAttestation { receipt: second })
        .await
        .unwrap();
    assert!(matches!(
        outcome.attestation,
        Some(AttestationOutcome::Committed { score: 80, .. })
    ));

    let committed = h.registry.consensus_status(&id, &digest).await.unwrap();
    assert_eq!(committed.epoch, 1);
    assert_ne!(committed.root, ReputationCommitment::genesis().root);
    assert_eq!(h.registry.get(&id).await.unwrap().score(), 80);
}

#[tokio::test]
async fn non_whitelisted_validator_never_counts() {
    let h = Harness::new().await;
    for v in ["v1", "v2", "v3"] {
        h.add_validator(v, 500);
    }
    let id = h.active_agent("nft-1", 1000).await;
    h.run(
        &id,
        AUTHORITY,
        Command::SetConsensusPolicy {
            policy: ConsensusPolicy::m_of_n(3, 3600),
        },
    )
    .await
    .unwrap();
    let whitelist: BTreeSet<Identity> = [Identity::new("v1"), Identity::new("v2")].into();
    h.run(
        &id,
        AUTHORITY,
        Command::SetValidatorWhitelist {
            whitelist: Some(whitelist),
        },
    )
    .await
    .unwrap();

    for v in ["v1", "v2"] {
        let receipt = h.signed_receipt(v, &id, "task-1", 90);
        h.run(&id, "relay", Command::SubmitAttestation { receipt })
            .await
            .unwrap();
    }
    let third = h.signed_receipt("v3", &id, "task-1", 90);
    let digest = third.payload.digest();
    let err = h
        .run(&id, "relay", Command::SubmitAttestation { receipt: third })
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::ValidatorNotEligible { .. }));

    let record = h.registry.get(&id).await.unwrap();
    assert_eq!(record.validation.commitment, ReputationCommitment::genesis());
    assert_eq!(
        h.registry.consensus_status(&id, &digest).await.unwrap_err(),
        BondError::ThresholdNotMet { required: 3, current: 2 }
    );
}

#[tokio::test]
async fn forged_signature_is_rejected() {
    let h = Harness::new().await;
    h.add_validator("v1", 500);
    let id = h.active_agent("nft-1", 1000).await;

    let mut receipt = h.signed_receipt("v1", &id, "task-1", 90);
    receipt.payload.score = 100;
    let err = h
        .run(&id, "relay", Command::SubmitAttestation { receipt })
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::InvalidAttestation(_)));
}

#[tokio::test]
async fn understaked_validator_is_rejected() {
    let h = Harness::new().await;
    h.add_validator("v1", 10);
    let id = h.active_agent("nft-1", 1000).await;
    let receipt = h.signed_receipt("v1", &id, "task-1", 90);
    let err = h
        .run(&id, "relay", Command::SubmitAttestation { receipt })
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::ValidatorNotEligible { .. }));
}

// ---------------------------------------------------------------------------
// Collateral
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitor_freezes_below_ratio() {
    let h = Harness::new().await;

    // 900 after a minor slash: under 10% of 10_000
    let thin = h.active_agent("thin", 1000).await;
    h.run(&thin, "challenger", open_dispute()).await.unwrap();
    h.run(&thin, GOVERNANCE, slash(SlashingSeverity::Minor))
        .await
        .unwrap();
    let outcome = h
        .run(&thin, GOVERNANCE, Command::ReportTvm { tvm: Amount::new(10_000) })
        .await
        .unwrap();
    assert_eq!(outcome.bond, Amount::new(900));
    assert_eq!(outcome.state, AgentState::Frozen);
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e, LifecycleEvent::CollateralFrozen { .. })));
    assert!(h.assets.entry(&thin).frozen);

    let healthy = h.active_agent("healthy", 1100).await;
    let outcome = h
        .run(&healthy, GOVERNANCE, Command::ReportTvm { tvm: Amount::new(10_000) })
        .await
        .unwrap();
    assert_eq!(outcome.state, AgentState::Active);
    let outcome = h.run(&healthy, "anyone", Command::CheckCollateral).await.unwrap();
    assert_eq!(outcome.state, AgentState::Active);
}

#[tokio::test]
async fn top_up_unfreezes_once_ratio_holds() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, "challenger", open_dispute()).await.unwrap();
    h.run(&id, GOVERNANCE, slash(SlashingSeverity::Major))
        .await
        .unwrap();
    h.run(&id, GOVERNANCE, Command::ReportTvm { tvm: Amount::new(10_000) })
        .await
        .unwrap();

    // 10% of 10_000 is 1000
    let outcome = h
        .run(&id, OWNER, Command::TopUp { amount: Amount::new(400) })
        .await
        .unwrap();
    assert_eq!(outcome.bond, Amount::new(900));
    assert_eq!(outcome.state, AgentState::Frozen);

    let outcome = h
        .run(&id, AUTHORITY, Command::TopUp { amount: Amount::new(100) })
        .await
        .unwrap();
    assert_eq!(outcome.bond, Amount::new(1000));
    assert_eq!(outcome.state, AgentState::Active);
    assert!(!h.assets.entry(&id).frozen);
}

#[tokio::test]
async fn top_up_without_tvm_unfreezes_on_first_funding() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, "challenger", open_dispute()).await.unwrap();
    let outcome = h
        .run(&id, GOVERNANCE, slash(SlashingSeverity::Major))
        .await
        .unwrap();
    assert_eq!(outcome.state, AgentState::Frozen);
    assert_eq!(outcome.bond, Amount::new(500));

    // no value at risk, so any bond satisfies the ratio
    let outcome = h
        .run(&id, OWNER, Command::TopUp { amount: Amount::new(100) })
        .await
        .unwrap();
    assert_eq!(outcome.bond, Amount::new(600));
    assert_eq!(outcome.state, AgentState::Active);
    assert!(!h.assets.entry(&id).frozen);

    // the freeze and unfreeze thresholds agree
    let outcome = h.run(&id, "anyone", Command::CheckCollateral).await.unwrap();
    assert_eq!(outcome.state, AgentState::Active);
}

// ---------------------------------------------------------------------------
// Terminal states
// ---------------------------------------------------------------------------

#[tokio::test]
async fn migrated_record_is_terminal() {
    let legacy = Harness::new().await;
    let id = legacy.active_agent("nft-1", 1000).await;

    let h = legacy.reopen(config(2)).await;
    let outcome = h
        .run(
            &id,
            AUTHORITY,
            Command::Migrate {
                target_asset_id: bond_types::AssetId::new("nft-1-v2"),
                protocol_version: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.state, AgentState::Migrated);

    let successor = h
        .registry
        .get(&bond_types::AssetId::new("nft-1-v2"))
        .await
        .unwrap();
    assert_eq!(successor.state, AgentState::Active);
    assert_eq!(successor.bond_amount(), Amount::new(1000));
    assert_eq!(successor.migrated_from, Some(id.clone()));
    assert!(!h.assets.entry(&successor.asset_id).frozen);

    for command in [
        Command::CheckCollateral,
        Command::TopUp { amount: Amount::new(1) },
        Command::SovereignExit,
    ] {
        let err = h.run(&id, AUTHORITY, command).await.unwrap_err();
        assert!(matches!(err, BondError::RecordTerminal { .. }));
    }
}

#[tokio::test]
async fn asset_transfer_hands_over_owner_role() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.assets
        .transfer(&id, Identity::new("buyer"), h.clock.now())
        .unwrap();

    let err = h
        .run(&id, OWNER, Command::TopUp { amount: Amount::new(100) })
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::Unauthorized { .. }));

    let outcome = h
        .run(&id, "buyer", Command::TopUp { amount: Amount::new(100) })
        .await
        .unwrap();
    assert_eq!(outcome.state, AgentState::Active);
    let record = h.registry.get(&id).await.unwrap();
    assert_eq!(record.owner, Identity::new("buyer"));
    assert_eq!(record.bond_amount(), Amount::new(1100));
    assert_eq!(record.last_transfer_timestamp, Some(h.clock.now()));
}

#[tokio::test]
async fn sovereign_exit_is_terminal() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, AUTHORITY, Command::RequestUnbond).await.unwrap();
    h.clock.advance(chrono::Duration::days(7));
    let outcome = h.run(&id, AUTHORITY, Command::SovereignExit).await.unwrap();
    assert_eq!(outcome.state, AgentState::Dead);
    let portable = outcome.portable.unwrap();
    assert!(portable.verify());
    assert_eq!(portable.bond, Amount::new(1000));
    assert!(h.assets.is_burned(&id));

    let err = h
        .run(&id, OWNER, Command::TopUp { amount: Amount::new(1) })
        .await
        .unwrap_err();
    assert!(matches!(err, BondError::RecordTerminal { .. }));
}

#[tokio::test]
async fn sovereign_exit_waits_out_grace_period() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;

    let err = h.run(&id, AUTHORITY, Command::SovereignExit).await.unwrap_err();
    assert!(matches!(err, BondError::InvalidStateTransition { .. }));

    h.run(&id, AUTHORITY, Command::RequestUnbond).await.unwrap();
    h.clock.advance(chrono::Duration::days(3));
    let err = h.run(&id, AUTHORITY, Command::SovereignExit).await.unwrap_err();
    assert!(matches!(err, BondError::GracePeriodNotElapsed { .. }));
    let record = h.registry.get(&id).await.unwrap();
    assert_eq!(record.state, AgentState::Unbonding);
    assert_eq!(record.bond_amount(), Amount::new(1000));

    h.clock.advance(chrono::Duration::days(4));
    let outcome = h.run(&id, AUTHORITY, Command::SovereignExit).await.unwrap();
    assert_eq!(outcome.state, AgentState::Dead);
    assert_eq!(outcome.portable.unwrap().bond, Amount::new(1000));
}

// ---------------------------------------------------------------------------
// Archive and audit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_anchor_lands_in_archive() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(
        &id,
        AUTHORITY,
        Command::AnchorHistory {
            blob: b"epoch-0 history".to_vec(),
        },
    )
    .await
    .unwrap();

    let pointer = h.registry.get(&id).await.unwrap().history_pointer.unwrap();
    assert_eq!(
        h.archive.get(&pointer.reference).as_deref(),
        Some(&b"epoch-0 history"[..])
    );
}

#[tokio::test]
async fn audit_trail_records_every_commit() {
    let h = Harness::new().await;
    let id = h.active_agent("nft-1", 1000).await;
    h.run(&id, OWNER, Command::TopUp { amount: Amount::new(5) })
        .await
        .unwrap();
    let _ = h.run(&id, OWNER, Command::RequestUnbond).await;

    let entries = h.registry.audit(&id).await.unwrap();
    // registered, fee, funded, state change, top-up
    assert_eq!(entries.len(), 5);
    let trail = bond_runtime::AuditTrail::from_entries(id.clone(), entries).unwrap();
    assert!(trail.verify_chain());
}
