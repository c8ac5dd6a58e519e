// src/stats/topk.rs
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A key with its count, ordered so that the *worst* ranked item is the
/// greatest: lower count first, then larger key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Ranked<K> {
    count: u64,
    key: K,
}

impl<K: Ord> Ord for Ranked<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .count
            .cmp(&self.count)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl<K: Ord> PartialOrd for Ranked<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded top-K selection.
///
/// Holds at most `k` candidates in a heap whose root is the current worst,
/// so each offer is O(log k) and memory never grows past `k`. Ranking is
/// count descending, ties broken by key ascending.
#[derive(Debug, Clone)]
pub struct TopK<K: Ord> {
    k: usize,
    heap: BinaryHeap<Ranked<K>>,
}

impl<K: Ord> TopK<K> {
    pub fn new(k: usize) -> Self {
        TopK {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    /// Offer a key with its final count. Each key should be offered once.
    pub fn offer(&mut self, key: K, count: u64) {
        if self.k == 0 {
            return;
        }
        let candidate = Ranked { count, key };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return;
        }
        if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Best first.
    pub fn into_sorted(self) -> Vec<(K, u64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.key, r.count))
            .collect()
    }
}
