//! Dealer-style threshold key generation and signature-share aggregation.
//!
//! Signer ids are 1-based throughout the protocol; the share index inside
//! the BLS group is `signer_id - 1`. Aggregation of the same `t` shares is
//! deterministic, so two servers merging the same vote set produce
//! byte-identical group signatures.

use std::collections::BTreeMap;

use blsttc::{PublicKeySet, PublicKeyShare, SecretKeySet, SecretKeyShare, Signature, SignatureShare};
use rand::RngCore;

use crate::CryptoError;

/// Key material for one participant, produced by [`generate_shares`].
#[derive(Clone)]
pub struct KeyShare {
    /// 1-based signer id.
    pub signer_id: u64,
    pub secret: SecretKeyShare,
    pub public: PublicKeyShare,
}

/// Generate key shares for `n` participants where any `t` of them can
/// assemble the group signature.
///
/// This is single-dealer generation: the full secret polynomial exists on
/// the caller's side for the duration of the call. Adequate for a
/// permissioned deployment where the servers provision client keys.
pub fn generate_shares<R: RngCore>(
    t: usize,
    n: usize,
    rng: &mut R,
) -> Result<(PublicKeySet, Vec<KeyShare>), CryptoError> {
    if t == 0 || t > n {
        return Err(CryptoError::BadThreshold { t, n });
    }
    // blsttc's threshold parameter is the polynomial degree: t-1 means
    // t shares reconstruct.
    let sk_set = SecretKeySet::random(t - 1, rng);
    let pk_set = sk_set.public_keys();

    let shares = (0..n)
        .map(|index| KeyShare {
            signer_id: index as u64 + 1,
            secret: sk_set.secret_key_share(index),
            public: pk_set.public_key_share(index),
        })
        .collect();

    Ok((pk_set, shares))
}

/// Sign a message with a participant's secret share.
pub fn sign_share(secret: &SecretKeyShare, message: &[u8]) -> SignatureShare {
    secret.sign(message)
}

/// Verify a group signature against the group public key.
pub fn verify(pk_set: &PublicKeySet, signature: &Signature, message: &[u8]) -> bool {
    pk_set.public_key().verify(signature, message)
}

/// Accumulates signature shares over one message until `t` distinct
/// signers have contributed, then merges them into the group signature.
pub struct SigShareSet {
    threshold: usize,
    shares: BTreeMap<u64, SignatureShare>,
}

impl SigShareSet {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            shares: BTreeMap::new(),
        }
    }

    /// Add a share from a 1-based signer id. A second share from the same
    /// signer is ignored; returns whether the share was newly added.
    pub fn add_share(&mut self, signer_id: u64, share: SignatureShare) -> bool {
        use std::collections::btree_map::Entry;
        match self.shares.entry(signer_id) {
            Entry::Vacant(slot) => {
                slot.insert(share);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Whether enough distinct signers have contributed.
    pub fn is_enough(&self) -> bool {
        self.shares.len() >= self.threshold
    }

    /// Merge the accumulated shares into the group signature.
    pub fn combine(&self, pk_set: &PublicKeySet) -> Result<Signature, CryptoError> {
        if !self.is_enough() {
            return Err(CryptoError::NotEnoughShares {
                have: self.shares.len(),
                need: self.threshold,
            });
        }
        let indexed = self
            .shares
            .iter()
            .map(|(signer_id, share)| ((*signer_id - 1) as usize, share));
        Ok(pk_set.combine_signatures(indexed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share_set_for(msg: &[u8], signer_ids: &[u64], shares: &[KeyShare], t: usize) -> SigShareSet {
        let mut set = SigShareSet::new(t);
        for id in signer_ids {
            let key = &shares[(*id - 1) as usize];
            set.add_share(*id, sign_share(&key.secret, msg));
        }
        set
    }

    #[test]
    fn unanimous_scheme_combines_and_verifies() {
        let (pk_set, shares) = generate_shares(3, 3, &mut rand::thread_rng()).unwrap();
        let msg = b"block-42";
        let set = share_set_for(msg, &[1, 2, 3], &shares, 3);
        assert!(set.is_enough());
        let sig = set.combine(&pk_set).unwrap();
        assert!(verify(&pk_set, &sig, msg));
    }

    #[test]
    fn below_threshold_is_rejected() {
        let (pk_set, shares) = generate_shares(3, 3, &mut rand::thread_rng()).unwrap();
        let set = share_set_for(b"m", &[1, 2], &shares, 3);
        assert!(!set.is_enough());
        let err = set.combine(&pk_set).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::NotEnoughShares { have: 2, need: 3 }
        ));
    }

    #[test]
    fn duplicate_signer_does_not_count_twice() {
        let (_, shares) = generate_shares(2, 3, &mut rand::thread_rng()).unwrap();
        let mut set = SigShareSet::new(2);
        let share = sign_share(&shares[0].secret, b"m");
        assert!(set.add_share(1, share.clone()));
        assert!(!set.add_share(1, share));
        assert_eq!(set.len(), 1);
        assert!(!set.is_enough());
    }

    #[test]
    fn any_t_of_n_subset_produces_the_same_signature() {
        let (pk_set, shares) = generate_shares(2, 4, &mut rand::thread_rng()).unwrap();
        let msg = b"same message";
        let sig_a = share_set_for(msg, &[1, 2], &shares, 2)
            .combine(&pk_set)
            .unwrap();
        let sig_b = share_set_for(msg, &[3, 4], &shares, 2)
            .combine(&pk_set)
            .unwrap();
        let sig_c = share_set_for(msg, &[1, 2, 3, 4], &shares, 2)
            .combine(&pk_set)
            .unwrap();
        assert_eq!(sig_a, sig_b);
        assert_eq!(sig_a, sig_c);
        assert!(verify(&pk_set, &sig_a, msg));
    }

    #[test]
    fn signature_does_not_verify_for_other_message() {
        let (pk_set, shares) = generate_shares(2, 2, &mut rand::thread_rng()).unwrap();
        let sig = share_set_for(b"one", &[1, 2], &shares, 2)
            .combine(&pk_set)
            .unwrap();
        assert!(!verify(&pk_set, &sig, b"other"));
    }

    #[test]
    fn bad_threshold_is_rejected() {
        assert!(matches!(
            generate_shares(0, 3, &mut rand::thread_rng()),
            Err(CryptoError::BadThreshold { .. })
        ));
        assert!(matches!(
            generate_shares(4, 3, &mut rand::thread_rng()),
            Err(CryptoError::BadThreshold { .. })
        ));
    }
}
