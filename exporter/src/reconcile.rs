//! The reconciliation engine.
//!
//! Joins one poll's consensus set and staking registry into a
//! [`PollResult`]: one snapshot per identity in the union of both sets,
//! with rank and active-set membership derived from voting power, and the
//! configured target validator resolved by exact identity match.
//!
//! `reconcile` is pure and cannot fail on well-formed inputs. Staking
//! entries whose pubkey cannot be transformed into a consensus address
//! are skipped individually and counted in [`PollResult::skipped_keys`];
//! every other missing value degrades to `None` rather than raising.

use crate::identity::build_identity_index;
use crate::types::{ConsensusSet, PollResult, StakingValidator, TargetLookup, ValidatorSnapshot};

/// Options controlling one reconciliation.
#[derive(Clone, Debug, Default)]
pub struct ReconcileOptions {
    /// The chain's active-validator-set size. When `None`, active-set
    /// membership is left undetermined rather than guessed.
    pub active_set_size: Option<u32>,
    /// Identity of the target validator: an operator address, a consensus
    /// address in hex, or a moniker.
    pub target_hint: Option<String>,
}

/// Reconciles the two fetched sets into one [`PollResult`].
pub fn reconcile(
    consensus: &ConsensusSet,
    staking_set: &[StakingValidator],
    opts: &ReconcileOptions,
) -> PollResult {
    let index = build_identity_index(&consensus.validators, staking_set);

    // One draft snapshot per identity, in ascending address order. The
    // BTreeMap iteration order makes the output deterministic.
    let mut snapshots: Vec<ValidatorSnapshot> = Vec::with_capacity(index.entries.len());
    for entry in index.entries.values() {
        let mut snap = ValidatorSnapshot::new(entry.identity.clone());

        if let Some(i) = entry.staking_idx {
            let sv = &staking_set[i];
            snap.status = Some(sv.status);
            snap.jailed = Some(sv.jailed);
            snap.tokens = Some(sv.tokens.clone());
            snap.commission_rate = Some(sv.commission_rate.clone());
        }

        if let Some(i) = entry.consensus_idx {
            let cv = &consensus.validators[i];
            snap.voting_power = Some(cv.voting_power);
            snap.proposer_priority = Some(cv.proposer_priority);
        }

        snapshots.push(snap);
    }

    assign_ranks(&mut snapshots, opts.active_set_size);

    let target = match &opts.target_hint {
        Some(hint) => resolve_target(&snapshots, hint),
        None => TargetLookup::Unset,
    };

    PollResult {
        height: consensus.height,
        snapshots,
        target,
        skipped_keys: index.skipped_keys,
    }
}

/// Assigns 1-based ranks over the snapshots with a present voting power,
/// descending by power. Ties break by ascending consensus address so
/// rank does not flicker between polls for validators of equal power.
fn assign_ranks(snapshots: &mut [ValidatorSnapshot], active_set_size: Option<u32>) {
    let mut ranked: Vec<usize> = snapshots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.voting_power.is_some())
        .map(|(i, _)| i)
        .collect();

    ranked.sort_by(|&a, &b| {
        snapshots[b]
            .voting_power
            .cmp(&snapshots[a].voting_power)
            .then_with(|| {
                snapshots[a]
                    .identity
                    .consensus_address
                    .cmp(&snapshots[b].identity.consensus_address)
            })
    });

    for (pos, &i) in ranked.iter().enumerate() {
        let rank = (pos + 1) as u32;
        snapshots[i].rank = Some(rank);
        if let Some(n) = active_set_size {
            snapshots[i].active = Some(rank <= n);
        }
    }
}

/// Locates the snapshot matching the target hint.
///
/// The hint matches the operator address or moniker exactly, or the
/// consensus address hex case-insensitively. A miss is the explicit
/// not-found marker: a validator may be legitimately absent from both
/// sources.
fn resolve_target(snapshots: &[ValidatorSnapshot], hint: &str) -> TargetLookup {
    for (i, snap) in snapshots.iter().enumerate() {
        let id = &snap.identity;
        let matches_operator = id.operator_address.as_deref() == Some(hint);
        let matches_moniker = id.moniker.as_deref() == Some(hint);
        let matches_address = id
            .consensus_address
            .to_string()
            .eq_ignore_ascii_case(hint.trim());

        if matches_operator || matches_moniker || matches_address {
            return TargetLookup::Found(i);
        }
    }
    TargetLookup::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derive_consensus_address;
    use crate::types::{ADDR_LEN, BondStatus, ConsAddress, ConsensusValidator};

    // Well-formed base64 ed25519 pubkeys with precomputed addresses.
    const PUBKEY_A: &str = "q6urq6urq6urq6urq6urq6urq6urq6urq6urq6urq6s=";
    const PUBKEY_B: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
    const PUBKEY_C: &str = "UScc3kYUpM6wUBFgfHnFwfM7NSvjkVkf6hmsJ3gEXUo=";

    fn addr_for(pubkey: &str) -> ConsAddress {
        derive_consensus_address(pubkey).expect("test pubkey is well-formed")
    }

    fn consensus_validator(pubkey: &str, power: u64) -> ConsensusValidator {
        ConsensusValidator {
            address: addr_for(pubkey),
            voting_power: power,
            proposer_priority: 0,
        }
    }

    fn staking_validator(op: &str, pubkey: &str, moniker: &str) -> StakingValidator {
        StakingValidator {
            operator_address: op.to_string(),
            consensus_pubkey: pubkey.to_string(),
            status: BondStatus::Bonded,
            jailed: false,
            tokens: "1000000".to_string(),
            commission_rate: "0.100000000000000000".to_string(),
            moniker: moniker.to_string(),
        }
    }

    fn consensus_set(validators: Vec<ConsensusValidator>) -> ConsensusSet {
        ConsensusSet {
            height: Some(12345),
            validators,
        }
    }

    #[test]
    fn joined_sets_rank_and_activate_validators() {
        let consensus = consensus_set(vec![
            consensus_validator(PUBKEY_A, 100),
            consensus_validator(PUBKEY_B, 50),
        ]);
        let staking = vec![
            staking_validator("opX", PUBKEY_A, "Val1"),
            staking_validator("opY", PUBKEY_B, "Val2"),
        ];
        let opts = ReconcileOptions {
            active_set_size: Some(2),
            target_hint: None,
        };

        let result = reconcile(&consensus, &staking, &opts);
        assert_eq!(result.snapshots.len(), 2);
        assert_eq!(result.height, Some(12345));
        assert_eq!(result.skipped_keys, 0);

        let val1 = result
            .snapshots
            .iter()
            .find(|s| s.identity.moniker.as_deref() == Some("Val1"))
            .expect("Val1 present");
        assert_eq!(val1.voting_power, Some(100));
        assert_eq!(val1.rank, Some(1));
        assert_eq!(val1.active, Some(true));

        let val2 = result
            .snapshots
            .iter()
            .find(|s| s.identity.moniker.as_deref() == Some("Val2"))
            .expect("Val2 present");
        assert_eq!(val2.voting_power, Some(50));
        assert_eq!(val2.rank, Some(2));
        assert_eq!(val2.active, Some(true));
    }

    #[test]
    fn staking_only_validator_keeps_absent_consensus_fields() {
        let consensus = consensus_set(vec![consensus_validator(PUBKEY_A, 100)]);
        let staking = vec![
            staking_validator("opX", PUBKEY_A, "Val1"),
            staking_validator("opZ", PUBKEY_C, "ValZ"),
        ];

        let result = reconcile(&consensus, &staking, &ReconcileOptions::default());
        // Union, not intersection: total count includes the absent one.
        assert_eq!(result.snapshots.len(), 2);

        let val_z = result
            .snapshots
            .iter()
            .find(|s| s.identity.moniker.as_deref() == Some("ValZ"))
            .expect("ValZ present");
        assert_eq!(val_z.voting_power, None);
        assert_eq!(val_z.rank, None);
        assert_eq!(val_z.active, None);
        // Staking-side fields still attach.
        assert_eq!(val_z.status, Some(BondStatus::Bonded));
        assert_eq!(val_z.tokens.as_deref(), Some("1000000"));
    }

    #[test]
    fn consensus_only_validator_is_not_dropped() {
        let consensus = consensus_set(vec![
            consensus_validator(PUBKEY_A, 100),
            consensus_validator(PUBKEY_B, 50),
        ]);
        let staking = vec![staking_validator("opX", PUBKEY_A, "Val1")];

        let result = reconcile(&consensus, &staking, &ReconcileOptions::default());
        assert_eq!(result.snapshots.len(), 2);

        let orphan = result
            .snapshots
            .iter()
            .find(|s| s.identity.operator_address.is_none())
            .expect("placeholder identity present");
        assert_eq!(orphan.voting_power, Some(50));
        assert_eq!(orphan.rank, Some(2));
        assert_eq!(orphan.status, None);
        assert_eq!(orphan.jailed, None);
    }

    #[test]
    fn rank_is_a_permutation_with_deterministic_tie_break() {
        // Three validators, two with identical power.
        let consensus = consensus_set(vec![
            consensus_validator(PUBKEY_A, 50),
            consensus_validator(PUBKEY_B, 50),
            consensus_validator(PUBKEY_C, 100),
        ]);

        let result = reconcile(&consensus, &[], &ReconcileOptions::default());

        let mut ranks: Vec<u32> = result.snapshots.iter().filter_map(|s| s.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3]);

        // The equal-power pair is ordered by ascending consensus address.
        let addr_a = addr_for(PUBKEY_A);
        let addr_b = addr_for(PUBKEY_B);
        let (first, second) = if addr_a < addr_b {
            (addr_a, addr_b)
        } else {
            (addr_b, addr_a)
        };
        let rank_of = |addr: ConsAddress| {
            result
                .snapshots
                .iter()
                .find(|s| s.identity.consensus_address == addr)
                .and_then(|s| s.rank)
                .expect("ranked snapshot")
        };
        assert_eq!(rank_of(addr_for(PUBKEY_C)), 1);
        assert_eq!(rank_of(first), 2);
        assert_eq!(rank_of(second), 3);
    }

    #[test]
    fn zero_power_is_ranked_and_distinct_from_absent() {
        let consensus = consensus_set(vec![consensus_validator(PUBKEY_A, 0)]);
        let staking = vec![
            staking_validator("opX", PUBKEY_A, "Val1"),
            staking_validator("opZ", PUBKEY_C, "ValZ"),
        ];

        let result = reconcile(&consensus, &staking, &ReconcileOptions::default());

        let val1 = result
            .snapshots
            .iter()
            .find(|s| s.identity.moniker.as_deref() == Some("Val1"))
            .expect("Val1 present");
        assert_eq!(val1.voting_power, Some(0));
        assert_eq!(val1.rank, Some(1));

        let val_z = result
            .snapshots
            .iter()
            .find(|s| s.identity.moniker.as_deref() == Some("ValZ"))
            .expect("ValZ present");
        assert_eq!(val_z.voting_power, None);
        assert_eq!(val_z.rank, None);
    }

    #[test]
    fn active_membership_is_undetermined_without_a_set_size() {
        let consensus = consensus_set(vec![consensus_validator(PUBKEY_A, 100)]);
        let result = reconcile(&consensus, &[], &ReconcileOptions::default());
        assert_eq!(result.snapshots[0].rank, Some(1));
        assert_eq!(result.snapshots[0].active, None);
    }

    #[test]
    fn target_resolves_by_operator_moniker_or_address() {
        let consensus = consensus_set(vec![consensus_validator(PUBKEY_A, 100)]);
        let staking = vec![staking_validator("opX", PUBKEY_A, "Val1")];

        for hint in [
            "opX".to_string(),
            "Val1".to_string(),
            addr_for(PUBKEY_A).to_string(),
            addr_for(PUBKEY_A).to_string().to_lowercase(),
        ] {
            let opts = ReconcileOptions {
                active_set_size: None,
                target_hint: Some(hint.clone()),
            };
            let result = reconcile(&consensus, &staking, &opts);
            assert_eq!(result.target, TargetLookup::Found(0), "hint {hint:?}");
            assert!(result.target_snapshot().is_some());
        }
    }

    #[test]
    fn missing_target_is_not_found_not_an_error() {
        let consensus = consensus_set(vec![consensus_validator(PUBKEY_A, 100)]);
        let opts = ReconcileOptions {
            active_set_size: None,
            target_hint: Some("opNobody".to_string()),
        };
        let result = reconcile(&consensus, &[], &opts);
        assert_eq!(result.target, TargetLookup::NotFound);
        assert!(result.target_snapshot().is_none());
    }

    #[test]
    fn malformed_pubkey_skips_one_entry_and_reconciles_the_rest() {
        let consensus = consensus_set(vec![consensus_validator(PUBKEY_A, 100)]);
        let staking = vec![
            staking_validator("opBroken", "???", "Broken"),
            staking_validator("opX", PUBKEY_A, "Val1"),
        ];

        let result = reconcile(&consensus, &staking, &ReconcileOptions::default());
        assert_eq!(result.skipped_keys, 1);
        assert_eq!(result.snapshots.len(), 1);
        assert_eq!(
            result.snapshots[0].identity.moniker.as_deref(),
            Some("Val1")
        );
    }

    #[test]
    fn empty_inputs_produce_an_empty_result() {
        let consensus = ConsensusSet {
            height: None,
            validators: Vec::new(),
        };
        let result = reconcile(&consensus, &[], &ReconcileOptions::default());
        assert!(result.snapshots.is_empty());
        assert_eq!(result.height, None);
        assert_eq!(result.target, TargetLookup::Unset);
        assert_eq!(result.skipped_keys, 0);
    }

    #[test]
    fn snapshots_are_ordered_by_ascending_address() {
        let consensus = consensus_set(vec![
            consensus_validator(PUBKEY_C, 10),
            consensus_validator(PUBKEY_A, 30),
            consensus_validator(PUBKEY_B, 20),
        ]);
        let result = reconcile(&consensus, &[], &ReconcileOptions::default());
        let addrs: Vec<[u8; ADDR_LEN]> = result
            .snapshots
            .iter()
            .map(|s| *s.identity.consensus_address.as_bytes())
            .collect();
        let mut sorted = addrs.clone();
        sorted.sort_unstable();
        assert_eq!(addrs, sorted);
    }
}
