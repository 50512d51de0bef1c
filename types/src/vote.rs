//! Block votes carrying BLS signature shares.

use blsttc::SignatureShare;
use serde::{Deserialize, Serialize};

/// One client's BLS signature share over a block id.
///
/// At most one vote per `(block_id, voter_id)` pair is ever stored; later
/// copies of the same vote are ignored by [`crate::Block::insert_vote`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVote {
    pub block_id: u64,
    pub voter_id: u64,
    pub sig_share: SignatureShare,
}

impl BlockVote {
    pub fn new(block_id: u64, voter_id: u64, sig_share: SignatureShare) -> Self {
        Self {
            block_id,
            voter_id,
            sig_share,
        }
    }
}
