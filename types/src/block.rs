//! Blocks and block headers.

use std::collections::BTreeMap;

use blsttc::Signature;
use serde::{Deserialize, Serialize};

use crate::{BlockVote, Timestamp, Transaction};

/// Identity and lifecycle timestamps of a block.
///
/// Timestamps are stamped at well-defined stages: `proposal_ts` when the
/// packer seals the block, `dist_ts` when it is enqueued for peer relay,
/// `commit_ts` and `recv_ts` when the aggregated signature lands and the
/// block moves to the committed pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: u64,
    pub base_id: u64,
    pub proposal_ts: Timestamp,
    pub dist_ts: Timestamp,
    pub commit_ts: Timestamp,
    pub recv_ts: Timestamp,
}

impl BlockHeader {
    pub fn new(id: u64, base_id: u64, proposal_ts: Timestamp) -> Self {
        Self {
            id,
            base_id,
            proposal_ts,
            dist_ts: Timestamp::EPOCH,
            commit_ts: Timestamp::EPOCH,
            recv_ts: Timestamp::EPOCH,
        }
    }
}

/// A sealed batch of transactions.
///
/// Votes accumulate in `votes` over the block's pending lifetime; once a
/// quorum of signature shares is merged, `tss_sig` holds the aggregated
/// threshold signature and the block is committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub tx_vec: Vec<Transaction>,
    pub votes: BTreeMap<u64, BlockVote>,
    pub tss_sig: Option<Signature>,
}

impl Block {
    /// Base id stamped on every packed block. The parent pointer is not
    /// wired to a real chain in this prototype; the field is opaque.
    pub const BASE_ID: u64 = 0xDEAD_BEEF;

    pub fn new(id: u64, proposal_ts: Timestamp) -> Self {
        Self {
            header: BlockHeader::new(id, Self::BASE_ID, proposal_ts),
            tx_vec: Vec::new(),
            votes: BTreeMap::new(),
            tss_sig: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.header.id
    }

    /// The message clients sign for a block: its id in little-endian bytes.
    pub fn vote_message(block_id: u64) -> [u8; 8] {
        block_id.to_le_bytes()
    }

    /// Insert a vote keyed by voter id.
    ///
    /// Re-insertion for a voter that already voted is a no-op (the first
    /// vote wins). Returns whether the vote was newly added.
    pub fn insert_vote(&mut self, vote: BlockVote) -> bool {
        use std::collections::btree_map::Entry;
        match self.votes.entry(vote.voter_id) {
            Entry::Vacant(slot) => {
                slot.insert(vote);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Whether the accumulated votes reach the quorum threshold.
    pub fn is_vote_enough(&self, threshold: usize) -> bool {
        self.votes.len() >= threshold
    }
}
