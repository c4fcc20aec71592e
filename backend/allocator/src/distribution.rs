//! Merkle commitment over a round's match amounts.
//!
//! ## Wire format
//!
//! Leaves are the ABI encoding of
//! `(uint256 index, address payoutAddress, uint256 matchAmountInToken, bytes32 projectId)`,
//! i.e. four 32-byte big-endian words with the address left-padded.
//!
//! ```text
//! leaf = keccak256(0x00 ‖ abi.encode(index, payoutAddress, matchAmount, projectId))
//! node = keccak256(0x01 ‖ min(a, b) ‖ max(a, b))
//! ```
//!
//! The tag byte separates leaves from internal nodes. Children are hashed
//! in sorted order, so a proof is just the list of sibling hashes, bottom
//! up. A node without a sibling at the end of an odd-length level is paired
//! with itself, and its proof step is its own hash.
//!
//! Leaves are ordered by `projectId` ascending and `index` is the position
//! in that order. A tree is never edited; new inputs mean a new tree.
//!
//! ## Compatibility
//!
//! This is not the OpenZeppelin `StandardMerkleTree` scheme, whose leaves
//! are `keccak256(keccak256(abi.encode(..)))` and whose nodes are untagged
//! sorted pairs. Roots and proofs from this module do not verify with
//! OpenZeppelin's `MerkleProof.verify`; an on-chain distributor must
//! re-implement the tagged hashing above.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::errors::{AllocatorError, Result};
use crate::types::{DistributionEntry, Hash, MatchingStatsData};

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

/// ABI-encoded leaf payload: four 32-byte words.
pub fn encode_leaf(entry: &DistributionEntry) -> [u8; 128] {
    let mut out = [0u8; 128];
    out[24..32].copy_from_slice(&entry.index.to_be_bytes());
    out[44..64].copy_from_slice(entry.payout_address.as_bytes());
    entry.match_amount_in_token.to_big_endian(&mut out[64..96]);
    out[96..128].copy_from_slice(entry.project_id.as_bytes());
    out
}

pub fn leaf_hash(entry: &DistributionEntry) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update([LEAF_TAG]);
    hasher.update(encode_leaf(entry));
    Hash(hasher.finalize().into())
}

fn node_hash(a: &Hash, b: &Hash) -> Hash {
    let (lo, hi) = match a.cmp(b) {
        Ordering::Greater => (b, a),
        _ => (a, b),
    };
    let mut hasher = Keccak256::new();
    hasher.update([NODE_TAG]);
    hasher.update(lo.as_bytes());
    hasher.update(hi.as_bytes());
    Hash(hasher.finalize().into())
}

/// Check that `entry` is committed under `root`.
pub fn verify(root: &Hash, entry: &DistributionEntry, proof: &[Hash]) -> bool {
    let computed = proof
        .iter()
        .fold(leaf_hash(entry), |acc, sibling| node_hash(&acc, sibling));
    &computed == root
}

/// A committed distribution: the ordered leaves and every level of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleDistribution {
    leaves: Vec<DistributionEntry>,
    /// `levels[0]` are the leaf hashes; the last level holds only the root.
    levels: Vec<Vec<Hash>>,
}

impl MerkleDistribution {
    /// Order `results` by project id, index them, and commit.
    pub fn build(mut results: Vec<MatchingStatsData>) -> Result<Self> {
        results.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        if let Some(w) = results.windows(2).find(|w| w[0].project_id == w[1].project_id) {
            return Err(AllocatorError::Validation(format!(
                "project {} appears more than once in the distribution",
                w[0].project_id
            )));
        }

        let leaves = results
            .into_iter()
            .enumerate()
            .map(|(index, r)| DistributionEntry {
                index: index as u64,
                payout_address: r.project_payout_address,
                match_amount_in_token: r.match_amount_in_token,
                project_id: r.project_id,
            })
            .collect();

        Self::from_leaves(leaves)
    }

    /// Rebuild the tree over an already indexed leaf array.
    pub fn from_leaves(leaves: Vec<DistributionEntry>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(AllocatorError::NoEligibleProjects);
        }
        if let Some((pos, e)) = leaves
            .iter()
            .enumerate()
            .find(|(pos, e)| e.index != *pos as u64)
        {
            return Err(AllocatorError::Validation(format!(
                "leaf at position {pos} carries index {}",
                e.index
            )));
        }

        let mut levels = vec![leaves.iter().map(leaf_hash).collect::<Vec<_>>()];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| node_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }

        Ok(MerkleDistribution { leaves, levels })
    }

    pub fn root(&self) -> Hash {
        // from_leaves guarantees a non-empty top level.
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaves(&self) -> &[DistributionEntry] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Sibling hashes from the leaf at `index` up to the root.
    pub fn proof_for(&self, index: u64) -> Option<Vec<Hash>> {
        let mut pos = usize::try_from(index).ok()?;
        if pos >= self.leaves.len() {
            return None;
        }

        let mut proof = Vec::with_capacity(self.levels.len().saturating_sub(1));
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = level.get(pos ^ 1).unwrap_or(&level[pos]);
            proof.push(*sibling);
            pos /= 2;
        }
        Some(proof)
    }

    /// The publishable artifact: root, leaves, and every leaf's proof.
    pub fn artifact(&self) -> DistributionArtifact {
        DistributionArtifact {
            root: self.root(),
            leaves: self.leaves.clone(),
            proofs: (0..self.leaves.len() as u64)
                .filter_map(|i| self.proof_for(i))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionArtifact {
    pub root: Hash,
    pub leaves: Vec<DistributionEntry>,
    /// `proofs[i]` belongs to `leaves[i]`.
    pub proofs: Vec<Vec<Hash>>,
}

/// Lifecycle of a round's distribution. Moves strictly forward, one step
/// at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Only summaries exist.
    Draft,
    /// Match amounts assigned.
    Computed,
    /// Tree built, root fixed.
    Committed,
    /// Root handed to the chain.
    Published,
}

impl RoundPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Computed => "computed",
            Self::Committed => "committed",
            Self::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "computed" => Some(Self::Computed),
            "committed" => Some(Self::Committed),
            "published" => Some(Self::Published),
            _ => None,
        }
    }

    fn next(&self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Computed),
            Self::Computed => Some(Self::Committed),
            Self::Committed => Some(Self::Published),
            Self::Published => None,
        }
    }

    pub fn advance_to(self, to: RoundPhase) -> Result<RoundPhase> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(AllocatorError::InvalidTransition(format!(
                "cannot move distribution from {} to {}",
                self.as_str(),
                to.as_str()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{project_id, stats};
    use primitive_types::U256;
    use proptest::prelude::*;

    fn sample(n: u8) -> Vec<MatchingStatsData> {
        (1..=n).rev().map(|i| stats(i, u64::from(i) * 100)).collect()
    }

    #[test]
    fn leaf_encoding_is_abi_layout() {
        let entry = DistributionEntry {
            index: 3,
            payout_address: crate::types::Address([0xaa; 20]),
            match_amount_in_token: U256::from(0x0102u64),
            project_id: project_id(7),
        };
        let enc = encode_leaf(&entry);
        assert_eq!(enc[31], 3);
        assert!(enc[..31].iter().all(|b| *b == 0));
        assert!(enc[32..44].iter().all(|b| *b == 0));
        assert!(enc[44..64].iter().all(|b| *b == 0xaa));
        assert_eq!(&enc[94..96], &[0x01, 0x02]);
        assert!(enc[96..].iter().all(|b| *b == 7));
    }

    #[test]
    fn indices_follow_project_id_order() {
        let tree = MerkleDistribution::build(sample(5)).unwrap();
        for (i, leaf) in tree.leaves().iter().enumerate() {
            assert_eq!(leaf.index, i as u64);
            assert_eq!(leaf.project_id, project_id(i as u8 + 1));
        }
    }

    #[test]
    fn single_leaf_root_is_the_leaf_hash() {
        let tree = MerkleDistribution::build(sample(1)).unwrap();
        assert_eq!(tree.root(), leaf_hash(&tree.leaves()[0]));
        assert_eq!(tree.proof_for(0).unwrap(), Vec::<Hash>::new());
    }

    #[test]
    fn odd_leaf_is_paired_with_itself() {
        let tree = MerkleDistribution::build(sample(3)).unwrap();
        let h: Vec<Hash> = tree.leaves().iter().map(leaf_hash).collect();
        let left = node_hash(&h[0], &h[1]);
        let right = node_hash(&h[2], &h[2]);
        assert_eq!(tree.root(), node_hash(&left, &right));
        assert_eq!(tree.proof_for(2).unwrap(), vec![h[2], left]);
    }

    #[test]
    fn leaf_and_node_hashing_are_domain_separated() {
        let tree = MerkleDistribution::build(sample(2)).unwrap();
        let h: Vec<Hash> = tree.leaves().iter().map(leaf_hash).collect();
        let mut untagged = Keccak256::new();
        let (lo, hi) = if h[0] < h[1] { (h[0], h[1]) } else { (h[1], h[0]) };
        untagged.update(lo.as_bytes());
        untagged.update(hi.as_bytes());
        assert_ne!(tree.root(), Hash(untagged.finalize().into()));
    }

    #[test]
    fn leaf_is_not_the_openzeppelin_double_hash() {
        let tree = MerkleDistribution::build(sample(1)).unwrap();
        let entry = &tree.leaves()[0];
        let inner: [u8; 32] = Keccak256::digest(encode_leaf(entry)).into();
        let standard = Hash(Keccak256::digest(inner).into());
        assert_ne!(leaf_hash(entry), standard);

        let mut tagged = vec![0x00];
        tagged.extend_from_slice(&encode_leaf(entry));
        assert_eq!(leaf_hash(entry), Hash(Keccak256::digest(&tagged).into()));
    }

    #[test]
    fn out_of_range_index_has_no_proof() {
        let tree = MerkleDistribution::build(sample(4)).unwrap();
        assert!(tree.proof_for(4).is_none());
        assert!(tree.proof_for(u64::MAX).is_none());
    }

    #[test]
    fn empty_results_cannot_be_committed() {
        assert!(matches!(
            MerkleDistribution::build(Vec::new()),
            Err(AllocatorError::NoEligibleProjects)
        ));
    }

    #[test]
    fn duplicate_project_is_rejected() {
        let mut results = sample(2);
        results.push(stats(1, 5));
        assert!(matches!(
            MerkleDistribution::build(results),
            Err(AllocatorError::Validation(_))
        ));
    }

    #[test]
    fn from_leaves_rejects_misnumbered_leaves() {
        let tree = MerkleDistribution::build(sample(3)).unwrap();
        let mut leaves = tree.leaves().to_vec();
        leaves.swap(0, 1);
        assert!(MerkleDistribution::from_leaves(leaves).is_err());
    }

    #[test]
    fn rebuild_from_stored_leaves_matches() {
        let tree = MerkleDistribution::build(sample(6)).unwrap();
        let again = MerkleDistribution::from_leaves(tree.leaves().to_vec()).unwrap();
        assert_eq!(tree.root(), again.root());
    }

    #[test]
    fn artifact_proofs_line_up_with_leaves() {
        let tree = MerkleDistribution::build(sample(5)).unwrap();
        let artifact = tree.artifact();
        assert_eq!(artifact.proofs.len(), artifact.leaves.len());
        for (leaf, proof) in artifact.leaves.iter().zip(&artifact.proofs) {
            assert!(verify(&artifact.root, leaf, proof));
        }
    }

    #[test]
    fn phases_only_move_forward_one_step() {
        assert_eq!(
            RoundPhase::Committed.advance_to(RoundPhase::Published).unwrap(),
            RoundPhase::Published
        );
        assert!(RoundPhase::Published.advance_to(RoundPhase::Committed).is_err());
        assert!(RoundPhase::Draft.advance_to(RoundPhase::Committed).is_err());
        assert!(RoundPhase::Committed.advance_to(RoundPhase::Committed).is_err());
        assert_eq!(RoundPhase::parse("published"), Some(RoundPhase::Published));
    }

    proptest! {
        #[test]
        fn every_proof_verifies_and_tampering_breaks_it(
            amounts in prop::collection::vec(0u64..u64::MAX, 1..40),
            field in 0usize..4,
        ) {
            let results: Vec<_> = amounts
                .iter()
                .enumerate()
                .map(|(i, a)| stats(i as u8 + 1, *a))
                .collect();
            let tree = MerkleDistribution::build(results.clone()).unwrap();
            let root = tree.root();

            for leaf in tree.leaves() {
                let proof = tree.proof_for(leaf.index).unwrap();
                prop_assert!(verify(&root, leaf, &proof));

                let mut forged = leaf.clone();
                match field {
                    0 => forged.index += 1,
                    1 => forged.payout_address.0[0] ^= 1,
                    2 => forged.match_amount_in_token = forged.match_amount_in_token + U256::one(),
                    _ => forged.project_id.0[31] ^= 1,
                }
                prop_assert!(!verify(&root, &forged, &proof));
            }

            // Same input, same order: same root.
            prop_assert_eq!(MerkleDistribution::build(results).unwrap().root(), root);
        }
    }
}
