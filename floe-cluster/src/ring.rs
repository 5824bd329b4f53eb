use std::hash::Hasher;

use fnv::FnvHasher;
use thiserror::Error;

/// Default partition table size. Configurable, but all peers in a cluster
/// must agree on the same size for co-located reducers to converge.
pub const RING_SIZE: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RingError {
    #[error("cannot build a ring from an empty term")]
    EmptyTerm,
}

/// A fixed-size partition table mapping `hash(key) mod size` to a peer,
/// computed deterministically from a sorted, deduplicated roster.
#[derive(Debug, Clone)]
pub struct Ring {
    slots: Vec<String>,
}

impl Ring {
    /// Builds a ring with the default `RING_SIZE` slots.
    pub fn new(term: &[String]) -> Result<Self, RingError> {
        Self::with_size(term, RING_SIZE)
    }

    /// Builds a ring with an explicit slot count; all peers must agree.
    pub fn with_size(term: &[String], size: usize) -> Result<Self, RingError> {
        if term.is_empty() {
            return Err(RingError::EmptyTerm);
        }
        let mut roster: Vec<String> = term.to_vec();
        roster.sort();
        roster.dedup();

        let slots = (0..size)
            .map(|i| roster[i % roster.len()].clone())
            .collect();
        Ok(Self { slots })
    }

    pub fn peer_for_key(&self, key: &str) -> &str {
        let slot = fnv64(key) as usize % self.slots.len();
        &self.slots[slot]
    }

    /// `"worker-<peer>-<graphType>-<graphName>"`, the mailbox name for the
    /// reducer responsible for `key`.
    pub fn reducer(&self, key: &str, graph_type: &str, graph_name: &str) -> String {
        format!(
            "worker-{}-{}-{}",
            self.peer_for_key(key),
            graph_type,
            graph_name
        )
    }
}

fn fnv64(key: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_term_is_rejected() {
        assert_eq!(Ring::new(&[]), Err(RingError::EmptyTerm));
    }

    #[test]
    fn reducer_is_stable_under_permutation_and_duplication() {
        let r1 = vec!["p1".to_string(), "p2".to_string(), "p3".to_string()];
        let r2 = vec!["p3".to_string(), "p1".to_string(), "p2".to_string()];
        let r3 = vec![
            "p1".to_string(),
            "p1".to_string(),
            "p2".to_string(),
            "p3".to_string(),
        ];

        let ring1 = Ring::new(&r1).unwrap();
        let ring2 = Ring::new(&r2).unwrap();
        let ring3 = Ring::new(&r3).unwrap();

        for key in ["a", "b", "long-event-key-1234", ""] {
            assert_eq!(
                ring1.reducer(key, "wc", "g"),
                ring2.reducer(key, "wc", "g")
            );
            assert_eq!(
                ring1.reducer(key, "wc", "g"),
                ring3.reducer(key, "wc", "g")
            );
        }
    }

    #[test]
    fn same_roster_yields_same_mapping_across_builds() {
        let roster = vec!["a".to_string(), "b".to_string()];
        let ring1 = Ring::new(&roster).unwrap();
        let ring2 = Ring::new(&roster).unwrap();
        for key in ["x", "y", "z"] {
            assert_eq!(ring1.peer_for_key(key), ring2.peer_for_key(key));
        }
    }

    #[test]
    fn custom_size_is_honored() {
        let roster = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ring = Ring::with_size(&roster, 6).unwrap();
        assert_eq!(ring.slots.len(), 6);
    }
}
