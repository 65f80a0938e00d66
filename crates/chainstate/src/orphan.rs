//! Blocks whose parent has not been seen yet.
//!
//! The pool is bounded by count and by age. When full, the oldest entry is
//! evicted first; expired entries are purged on every insert.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use btmd_consensus::{hash256_to_hex, Hash256};
use btmd_primitives::block::Block;

struct OrphanEntry {
    block: Arc<Block>,
    parent: Hash256,
    expires: Instant,
    seq: u64,
}

#[derive(Default)]
struct OrphanPool {
    orphans: HashMap<Hash256, OrphanEntry>,
    /// Parent hash to the orphans waiting on it, in arrival order.
    prev_orphans: HashMap<Hash256, Vec<Hash256>>,
    /// Arrival order; entries whose seq no longer matches are stale.
    order: VecDeque<(u64, Hash256)>,
    next_seq: u64,
}

impl OrphanPool {
    fn remove(&mut self, hash: &Hash256) -> Option<OrphanEntry> {
        let entry = self.orphans.remove(hash)?;
        if let Some(children) = self.prev_orphans.get_mut(&entry.parent) {
            children.retain(|child| child != hash);
            if children.is_empty() {
                self.prev_orphans.remove(&entry.parent);
            }
        }
        if self.order.len() > self.orphans.len().saturating_mul(2) + 16 {
            let orphans = &self.orphans;
            self.order
                .retain(|(seq, hash)| orphans.get(hash).is_some_and(|entry| entry.seq == *seq));
        }
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<Hash256> {
        while let Some((seq, hash)) = self.order.pop_front() {
            let live = self
                .orphans
                .get(&hash)
                .is_some_and(|entry| entry.seq == seq);
            if live {
                self.remove(&hash);
                return Some(hash);
            }
        }
        None
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<Hash256> = self
            .orphans
            .iter()
            .filter(|(_, entry)| entry.expires <= now)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &expired {
            self.remove(hash);
        }
        expired.len()
    }
}

pub struct OrphanManage {
    pool: Mutex<OrphanPool>,
    max_orphans: usize,
    ttl: Duration,
}

impl OrphanManage {
    pub fn new(max_orphans: usize, ttl: Duration) -> Self {
        Self {
            pool: Mutex::new(OrphanPool::default()),
            max_orphans: max_orphans.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, OrphanPool> {
        self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, block: Arc<Block>) {
        self.add_at(block, Instant::now());
    }

    /// Adding a block that is already pooled does nothing.
    pub fn add_at(&self, block: Arc<Block>, now: Instant) {
        let hash = block.hash();
        let parent = block.header.previous_block_hash;
        let mut pool = self.lock();
        if pool.orphans.contains_key(&hash) {
            return;
        }

        let purged = pool.purge_expired(now);
        if purged > 0 {
            btmd_log::log_debug!("purged {purged} expired orphan blocks");
        }
        while pool.orphans.len() >= self.max_orphans {
            match pool.evict_oldest() {
                Some(evicted) => {
                    btmd_log::log_debug!("orphan pool full, evicted {}", hash256_to_hex(&evicted))
                }
                None => break,
            }
        }

        let seq = pool.next_seq;
        pool.next_seq += 1;
        pool.order.push_back((seq, hash));
        pool.prev_orphans.entry(parent).or_default().push(hash);
        pool.orphans.insert(
            hash,
            OrphanEntry {
                block,
                parent,
                expires: now + self.ttl,
                seq,
            },
        );
        btmd_log::log_debug!(
            "orphan block {} height {} waiting on {} ({} pooled)",
            hash256_to_hex(&hash),
            pool.orphans[&hash].block.height(),
            hash256_to_hex(&parent),
            pool.orphans.len()
        );
    }

    pub fn exists(&self, hash: &Hash256) -> bool {
        self.lock().orphans.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<Arc<Block>> {
        self.lock().orphans.get(hash).map(|entry| Arc::clone(&entry.block))
    }

    pub fn remove(&self, hash: &Hash256) -> Option<Arc<Block>> {
        self.lock().remove(hash).map(|entry| entry.block)
    }

    /// Hashes of the orphans waiting on `parent`, in arrival order.
    pub fn children(&self, parent: &Hash256) -> Vec<Hash256> {
        self.lock()
            .prev_orphans
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Removes and returns the orphans waiting on `parent`, in arrival order.
    pub fn take_children(&self, parent: &Hash256) -> Vec<Arc<Block>> {
        let mut pool = self.lock();
        let Some(children) = pool.prev_orphans.get(parent).cloned() else {
            return Vec::new();
        };
        children
            .iter()
            .filter_map(|hash| pool.remove(hash).map(|entry| entry.block))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purge_expired(&self, now: Instant) -> usize {
        self.lock().purge_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btmd_primitives::block::BlockHeader;

    fn orphan(parent: u8, nonce: u64) -> Arc<Block> {
        Arc::new(Block {
            header: BlockHeader {
                version: 1,
                height: 7,
                previous_block_hash: [parent; 32],
                timestamp: 0,
                nonce,
                bits: 0x207f_ffff,
                transactions_merkle_root: [0u8; 32],
                transaction_status_hash: [0u8; 32],
            },
            transactions: Vec::new(),
        })
    }

    #[test]
    fn children_are_grouped_by_parent() {
        let pool = OrphanManage::new(16, Duration::from_secs(60));
        let a = orphan(1, 1);
        let b = orphan(1, 2);
        let c = orphan(2, 3);
        pool.add(Arc::clone(&a));
        pool.add(Arc::clone(&b));
        pool.add(Arc::clone(&c));
        pool.add(Arc::clone(&a));
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.children(&[1u8; 32]), vec![a.hash(), b.hash()]);

        let taken: Vec<_> = pool.take_children(&[1u8; 32]).iter().map(|b| b.hash()).collect();
        assert_eq!(taken, vec![a.hash(), b.hash()]);
        assert_eq!(pool.len(), 1);
        assert!(pool.children(&[1u8; 32]).is_empty());
        assert!(pool.exists(&c.hash()));
    }

    #[test]
    fn full_pool_evicts_oldest_first() {
        let pool = OrphanManage::new(2, Duration::from_secs(60));
        let first = orphan(1, 1);
        let second = orphan(1, 2);
        let third = orphan(3, 3);
        pool.add(Arc::clone(&first));
        pool.add(Arc::clone(&second));
        pool.add(Arc::clone(&third));
        assert_eq!(pool.len(), 2);
        assert!(!pool.exists(&first.hash()));
        assert!(pool.exists(&second.hash()));
        assert_eq!(pool.children(&[1u8; 32]), vec![second.hash()]);
    }

    #[test]
    fn removed_entries_do_not_count_as_oldest() {
        let pool = OrphanManage::new(2, Duration::from_secs(60));
        let first = orphan(1, 1);
        let second = orphan(1, 2);
        pool.add(Arc::clone(&first));
        pool.add(Arc::clone(&second));
        pool.remove(&first.hash());
        pool.add(Arc::clone(&first));
        pool.add(orphan(4, 4));
        assert!(!pool.exists(&second.hash()));
        assert!(pool.exists(&first.hash()));
    }

    #[test]
    fn expired_entries_are_purged() {
        let pool = OrphanManage::new(8, Duration::from_secs(10));
        let start = Instant::now();
        pool.add_at(orphan(1, 1), start);
        pool.add_at(orphan(1, 2), start + Duration::from_secs(5));
        assert_eq!(pool.purge_expired(start + Duration::from_secs(10)), 1);
        assert_eq!(pool.len(), 1);
        pool.add_at(orphan(2, 3), start + Duration::from_secs(20));
        assert_eq!(pool.len(), 1);
    }
}
