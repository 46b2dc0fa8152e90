use super::*;

/// A work unit broadcast by a pool's `mining.notify`, plus the bookkeeping a
/// pool needs to validate shares against it: duplicate-share detection keyed
/// by the exact (extranonce1, extranonce2, ntime, nonce) tuple a miner
/// submitted.
#[derive(Debug)]
pub struct Job {
    pub job_id: JobId,
    pub prevhash: PrevHash,
    pub coinb1: String,
    pub coinb2: String,
    pub merkle_branches: Vec<stratum::MerkleNode>,
    pub version: Version,
    pub nbits: Nbits,
    pub ntime: Ntime,
    pub clean_jobs: bool,
    submitted_shares: Mutex<HashSet<String>>,
}

impl Job {
    pub fn from_notify(notify: Notify) -> Self {
        Self {
            job_id: notify.job_id,
            prevhash: notify.prevhash,
            coinb1: notify.coinb1,
            coinb2: notify.coinb2,
            merkle_branches: notify.merkle_branches,
            version: notify.version,
            nbits: notify.nbits,
            ntime: notify.ntime,
            clean_jobs: notify.clean_jobs,
            submitted_shares: Mutex::new(HashSet::new()),
        }
    }

    pub fn to_notify(&self) -> Notify {
        Notify {
            job_id: self.job_id,
            prevhash: self.prevhash,
            coinb1: self.coinb1.clone(),
            coinb2: self.coinb2.clone(),
            merkle_branches: self.merkle_branches.clone(),
            version: self.version,
            nbits: self.nbits,
            ntime: self.ntime,
            clean_jobs: self.clean_jobs,
        }
    }

    /// Records a share string, returning `true` if it had not been seen
    /// before (and so was just inserted) and `false` if this is a repeat --
    /// the caller should reject repeats with `DuplicateShare`.
    pub fn record_share(&self, share_key: &str) -> bool {
        self.submitted_shares.lock().insert(share_key.to_owned())
    }

    /// Reconstructs the coinbase transaction from its two halves plus the
    /// worker's extranonces, then folds in the merkle branches to get the
    /// merkle root for this share's candidate block.
    pub fn merkle_root(
        &self,
        extranonce1: &Extranonce,
        extranonce2: &Extranonce,
    ) -> stratum::Result<stratum::MerkleNode> {
        merkle_root(
            &self.coinb1,
            &self.coinb2,
            extranonce1,
            extranonce2,
            &self.merkle_branches,
        )
    }
}

/// Serializes the 80-byte block header little-endian, exactly as `nbits`,
/// `ntime`, and `nonce` arrive over the wire plus the Stratum-quirky
/// 4-byte-group-reversed `prevhash`.
pub fn header_bytes(
    version: Version,
    prevhash: PrevHash,
    merkle_root: stratum::MerkleNode,
    ntime: Ntime,
    nbits: Nbits,
    nonce: Nonce,
) -> [u8; 80] {
    let mut header = [0u8; 80];
    header[0..4].copy_from_slice(&(version.to_consensus() as u32).to_le_bytes());
    header[4..36].copy_from_slice(&prevhash.reversed());
    header[36..68].copy_from_slice(merkle_root.as_byte_array());
    header[68..72].copy_from_slice(&u32::from(ntime).to_le_bytes());
    header[72..76].copy_from_slice(&nbits.to_compact().to_consensus().to_le_bytes());
    header[76..80].copy_from_slice(&u32::from(nonce).to_le_bytes());
    header
}

/// `diff1 / headerHash`, where `headerHash` is double-SHA256 of the header
/// interpreted the same way a block hash is: reused directly from
/// `stratum::Difficulty`'s `From<BlockHash>`, which already does the
/// target-from-hash inversion this needs.
pub fn share_difficulty(header: &[u8; 80]) -> Difficulty {
    let hash = sha256d::Hash::hash(header);
    Difficulty::from(BlockHash::from_byte_array(hash.to_byte_array()))
}

/// The exact duplicate-detection key: `extraNonce1||extraNonce2||ntime||nonce`.
pub fn share_key(extranonce1: &Extranonce, extranonce2: &Extranonce, ntime: Ntime, nonce: Nonce) -> String {
    format!("{extranonce1}{extranonce2}{ntime}{nonce}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::from_notify(Notify {
            job_id: "bf".parse().unwrap(),
            prevhash: "4d16b6f85af6e2198f44ae2a6de67f78487ae5611b77c6c0440b921e00000000"
                .parse()
                .unwrap(),
            coinb1: "01000000".into(),
            coinb2: "072f736c7573682f0000000001".into(),
            merkle_branches: Vec::new(),
            version: "00000002".parse().unwrap(),
            nbits: "1c2ac4af".parse().unwrap(),
            ntime: "504e86b9".parse().unwrap(),
            clean_jobs: true,
        })
    }

    #[test]
    fn duplicate_share_rejected_on_second_submit() {
        let job = sample_job();
        let key = share_key(
            &"08000001".parse().unwrap(),
            &"0001".parse().unwrap(),
            "504e86ed".parse().unwrap(),
            "b2957c02".parse().unwrap(),
        );

        assert!(job.record_share(&key), "first submission is new");
        assert!(!job.record_share(&key), "second submission is a duplicate");
    }

    #[test]
    fn coinbase_hash_matches_empty_branch_merkle_root() {
        let coinb1 = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff20020862062f503253482f04b8864e5008";
        let n1: Extranonce = "08000001".parse().unwrap();
        let n2: Extranonce = "0001".parse().unwrap();
        let coinb2 = "072f736c7573682f000000000100f2052a010000001976a914d23fcdf86f7e756a64a7a9688ef9903327048ed988ac00000000";

        let root = merkle_root(coinb1, coinb2, &n1, &n2, &[]).unwrap();

        let coinbase_bin = hex::decode(format!("{coinb1}{n1}{n2}{coinb2}")).unwrap();
        let want = sha256d::Hash::hash(&coinbase_bin);

        assert_eq!(root.to_raw_hash(), want);
    }

    /// The coinbase hash is also checked against a known-good value (not just
    /// derived tautologically from the same algorithm), with empty merkle
    /// branches so the merkle root equals the coinbase hash directly.
    #[test]
    fn coinbase_hash_matches_known_value() {
        let coinb1 = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff20020862062f503253482f04b8864e5008";
        let n1: Extranonce = "08000001".parse().unwrap();
        let n2: Extranonce = "0001".parse().unwrap();
        let coinb2 = "072f736c7573682f000000000100f2052a010000001976a914d23fcdf86f7e756a64a7a9688ef9903327048ed988ac00000000";

        let root = merkle_root(coinb1, coinb2, &n1, &n2, &[]).unwrap();

        let expected: [u8; 32] =
            hex::decode("94f317184323c9965abd532450519e6db6859b53b0551c6b8702c1f300ec9b51")
                .unwrap()
                .try_into()
                .unwrap();

        assert_eq!(root.as_byte_array(), &expected);
    }

    #[test]
    fn header_round_trips_prevhash_reversal() {
        let job = sample_job();
        let root = job.merkle_root(&"08000001".parse().unwrap(), &"0001".parse().unwrap()).unwrap();
        let header = header_bytes(
            job.version,
            job.prevhash,
            root,
            job.ntime,
            job.nbits,
            "00000001".parse().unwrap(),
        );
        assert_eq!(header.len(), 80);
        // prevhash lands at offset 4..36, after the group-reversal.
        assert_eq!(&header[4..36], &job.prevhash.reversed());
    }

    #[test]
    fn share_difficulty_is_finite_and_positive() {
        let job = sample_job();
        let root = job.merkle_root(&"08000001".parse().unwrap(), &"0001".parse().unwrap()).unwrap();
        let header = header_bytes(
            job.version,
            job.prevhash,
            root,
            job.ntime,
            job.nbits,
            "00000001".parse().unwrap(),
        );
        let difficulty = share_difficulty(&header);
        assert!(difficulty.as_f64() > 0.0);
    }
}
