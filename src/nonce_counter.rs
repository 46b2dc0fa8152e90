use super::*;

/// Carves a pool's upstream ExtraNonce2 space into a server-controlled head
/// and a client-visible tail, so every downstream worker gets a disjoint
/// search space while the pool sees a single extranonce1/extranonce2 stream.
///
/// `extra2Size + extra3Size` must equal the upstream's advertised
/// extranonce2 size -- checked once, at bind time, not on every `next()`.
#[derive(Debug)]
pub struct NonceCounter {
    extranonce1_upstream: Extranonce,
    server_count: AtomicU32,
    extra2_size: usize,
    extra3_size: usize,
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display(
    "extra2_size ({extra2_size}) + extra3_size ({extra3_size}) != upstream extranonce2_size ({upstream_size})"
)]
pub struct SplitMismatch {
    extra2_size: usize,
    extra3_size: usize,
    upstream_size: usize,
}

impl NonceCounter {
    /// Validates the proxy's chosen split against what the upstream pool
    /// actually handed out, then seeds the counter. The seed is nonzero so
    /// the all-zero suffix -- reserved as the getwork sentinel -- is never
    /// emitted by `next()`.
    pub fn bind(
        extranonce1_upstream: Extranonce,
        upstream_extranonce2_size: usize,
        extra2_size: usize,
        extra3_size: usize,
    ) -> std::result::Result<Self, SplitMismatch> {
        if extra2_size + extra3_size != upstream_extranonce2_size {
            return Err(SplitMismatch {
                extra2_size,
                extra3_size,
                upstream_size: upstream_extranonce2_size,
            });
        }

        Ok(Self {
            extranonce1_upstream,
            server_count: AtomicU32::new(0),
            extra2_size,
            extra3_size,
        })
    }

    /// Allocates the next unique extranonce, handed to a newly subscribing
    /// worker. The suffix is the server counter's last `extra2_size` bytes,
    /// big-endian; the full value sent downstream is
    /// `extranonce1Upstream || suffix`.
    pub fn next(&self) -> Extranonce {
        let count = self.server_count.fetch_add(1, Ordering::SeqCst) + 1;
        let be = count.to_be_bytes();
        let suffix = &be[4 - self.extra2_size..];
        self.extranonce1_upstream
            .concat(&Extranonce::from_bytes(suffix.to_vec()))
    }

    /// The number of bytes the miner iterates itself (the downstream
    /// extranonce2). Reported in the `mining.subscribe` response.
    pub fn nonce2_size(&self) -> usize {
        self.extra3_size
    }

    /// Strips the upstream prefix off a downstream worker's full
    /// extranonce1, leaving the server-assigned tail. Used to reassemble the
    /// upstream nonce2 on submit: `nonce1_suffix(worker.extranonce1) ||
    /// extranonce2_from_miner`.
    pub fn nonce1_suffix(&self, downstream_extranonce1: &Extranonce) -> Option<Extranonce> {
        downstream_extranonce1.strip_prefix(&self.extranonce1_upstream)
    }

    pub fn extranonce1_upstream(&self) -> &Extranonce {
        &self.extranonce1_upstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> NonceCounter {
        NonceCounter::bind("08000001".parse().unwrap(), 4, 2, 2).unwrap()
    }

    #[test]
    fn bind_rejects_mismatched_split() {
        assert!(NonceCounter::bind("08000001".parse().unwrap(), 4, 2, 1).is_err());
    }

    #[test]
    fn next_partitions_nonce_space_from_a_shared_counter() {
        let counter = counter();

        let first = counter.next();
        let second = counter.next();

        assert_eq!(first.to_hex(), "080000010001");
        assert_eq!(second.to_hex(), "080000010002");
        assert_eq!(counter.nonce2_size(), 2);

        assert_eq!(
            counter.nonce1_suffix(&second).unwrap().to_hex(),
            "0002"
        );
    }

    #[test]
    fn next_never_emits_zero_suffix() {
        let counter = counter();
        for _ in 0..10 {
            let extranonce = counter.next();
            let (_, tail) = extranonce.split_tail(2).unwrap();
            assert_ne!(tail.as_bytes(), [0, 0]);
        }
    }

    #[test]
    fn next_values_have_constant_length_and_no_duplicates() {
        let counter = counter();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let extranonce = counter.next();
            assert_eq!(extranonce.len(), 6);
            assert!(seen.insert(extranonce.to_hex()), "duplicate extranonce emitted");
        }
    }
}
