//! C4: weighted consistent-hash ring mapping a filename to an ordered list
//! of VOD keys.
//!
//! The original `consistenthash` package was not retained in the retrieval
//! pack (only its call sites in `original_source/lb/selector.go` survived),
//! so the ring below is built from the contract described in spec.md §4.3:
//! `replicas` virtual nodes per unit weight, ordered lookup starting at the
//! clockwise neighbour of `hash(key)`. Point hashing reuses `blake3`, the
//! teacher's content-hashing crate, rather than adding a new one.

use crate::types::VodKey;

pub struct HashRing {
    replicas: u32,
    ring: Vec<(u64, VodKey)>,
}

impl HashRing {
    pub fn new(replicas: u32) -> Self {
        Self {
            replicas,
            ring: Vec::new(),
        }
    }

    fn point_hash(key: &str, replica: u32) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(key.as_bytes());
        hasher.update(&replica.to_le_bytes());
        let hash = hasher.finalize();
        u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
    }

    /// Adds `key` with integer `weight`, inserting `replicas * weight`
    /// virtual nodes. A non-positive weight adds nothing.
    pub fn add(&mut self, key: VodKey, weight: i64) {
        if weight <= 0 {
            return;
        }
        let n = self.replicas as i64 * weight;
        for i in 0..n {
            let h = Self::point_hash(&key.0, i as u32);
            self.ring.push((h, key.clone()));
        }
        self.ring.sort_by_key(|(h, _)| *h);
    }

    /// Returns the ordered sequence of distinct VOD keys starting from the
    /// clockwise neighbour of `hash(name)`.
    pub fn get_items(&self, name: &str) -> Vec<VodKey> {
        if self.ring.is_empty() {
            return Vec::new();
        }
        let h = {
            let mut hasher = blake3::Hasher::new();
            hasher.update(name.as_bytes());
            let hash = hasher.finalize();
            u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
        };
        let start = self.ring.partition_point(|(rh, _)| *rh < h);

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for i in 0..self.ring.len() {
            let (_, k) = &self.ring[(start + i) % self.ring.len()];
            if seen.insert(k.clone()) {
                out.push(k.clone());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_items_returns_every_distinct_key_exactly_once() {
        let mut ring = HashRing::new(100);
        ring.add(VodKey::from("v1"), 1);
        ring.add(VodKey::from("v2"), 1);
        ring.add(VodKey::from("v3"), 1);
        let items = ring.get_items("a.mpg");
        assert_eq!(items.len(), 3);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![VodKey::from("v1"), VodKey::from("v2"), VodKey::from("v3")]
        );
    }

    #[test]
    fn lookup_is_deterministic_for_the_same_key() {
        let mut ring = HashRing::new(100);
        ring.add(VodKey::from("v1"), 1);
        ring.add(VodKey::from("v2"), 1);
        assert_eq!(ring.get_items("a.mpg"), ring.get_items("a.mpg"));
    }

    #[test]
    fn heavier_weight_appears_as_the_first_candidate_more_often() {
        let mut ring = HashRing::new(1000);
        ring.add(VodKey::from("heavy"), 10);
        ring.add(VodKey::from("light"), 1);
        let mut heavy_first = 0;
        for i in 0..200 {
            let name = format!("file-{i}.mpg");
            if ring.get_items(&name)[0] == VodKey::from("heavy") {
                heavy_first += 1;
            }
        }
        assert!(heavy_first > 100);
    }
}
