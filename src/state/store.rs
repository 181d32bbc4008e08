// Per-symbol state stores
// Sharded (DashMap) and single-lock (parking_lot) maps with LRU capacity

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Symbol -> state map owned by exactly one engine.
///
/// At most one mutator runs per symbol at a time. When a new symbol arrives
/// at `max_symbols`, the least-recently-touched symbol is evicted first.
pub trait SymbolStore<S>: Send + Sync {
    /// Run `f` against the symbol's state, creating it with `init` on first touch.
    fn with_state<R>(&self, symbol: &str, init: impl FnOnce() -> S, f: impl FnOnce(&mut S) -> R) -> R;

    /// Read-only access. Does not count as a touch for eviction.
    fn read<R>(&self, symbol: &str, f: impl FnOnce(&S) -> R) -> Option<R>;

    fn remove(&self, symbol: &str) -> bool;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, symbol: &str) -> bool {
        self.read(symbol, |_| ()).is_some()
    }

    fn max_symbols(&self) -> usize;
}

#[derive(Debug)]
struct Slot<S> {
    state: S,
    touched: u64,
}

// ============================================================================
// ShardedStore
// ============================================================================

/// DashMap-backed store. Unrelated symbols on different shards never contend.
///
/// Capacity is checked before insert without a global lock, so concurrent first
/// touches of new symbols can overshoot `max_symbols` by the number of racing threads.
/// A full store evicts the oldest `max_symbols / 16` symbols (at least one) in a
/// single scan, so steady churn costs one scan per batch rather than per insert.
pub struct ShardedStore<S> {
    label: &'static str,
    max_symbols: usize,
    clock: AtomicU64,
    slots: DashMap<String, Slot<S>>,
}

impl<S> ShardedStore<S> {
    pub fn new(label: &'static str, max_symbols: usize) -> Self {
        Self {
            label,
            max_symbols: max_symbols.max(1),
            clock: AtomicU64::new(0),
            slots: DashMap::new(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn eviction_batch(&self) -> usize {
        (self.max_symbols / 16).max(1)
    }

    fn evict_lru(&self) {
        // Collect first: removing while an iterator holds a shard guard deadlocks
        let mut aged: Vec<(u64, String)> = self
            .slots
            .iter()
            .map(|entry| (entry.value().touched, entry.key().clone()))
            .collect();
        let batch = self.eviction_batch().min(aged.len());
        if batch == 0 {
            return;
        }
        if batch < aged.len() {
            aged.select_nth_unstable_by_key(batch - 1, |(touched, _)| *touched);
        }

        for (_, symbol) in aged.drain(..batch) {
            self.slots.remove(&symbol);
        }
        debug!(store = self.label, evicted = batch, "Evicted least-recently-touched symbols");
    }
}

impl<S: Send + Sync> SymbolStore<S> for ShardedStore<S> {
    fn with_state<R>(&self, symbol: &str, init: impl FnOnce() -> S, f: impl FnOnce(&mut S) -> R) -> R {
        if let Some(mut slot) = self.slots.get_mut(symbol) {
            slot.touched = self.tick();
            return f(&mut slot.state);
        }

        while self.slots.len() >= self.max_symbols {
            let before = self.slots.len();
            self.evict_lru();
            if self.slots.len() >= before {
                break;
            }
        }

        let touched = self.tick();
        let mut slot = self
            .slots
            .entry(symbol.to_string())
            .or_insert_with(|| Slot { state: init(), touched });
        slot.touched = touched;
        f(&mut slot.state)
    }

    fn read<R>(&self, symbol: &str, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.slots.get(symbol).map(|slot| f(&slot.state))
    }

    fn remove(&self, symbol: &str) -> bool {
        self.slots.remove(symbol).is_some()
    }

    fn clear(&self) {
        self.slots.clear();
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn max_symbols(&self) -> usize {
        self.max_symbols
    }
}

// ============================================================================
// LockedStore
// ============================================================================

struct LockedInner<S> {
    clock: u64,
    slots: HashMap<String, Slot<S>>,
}

/// One mutex over the whole map. Correct but serializes every symbol.
pub struct LockedStore<S> {
    label: &'static str,
    max_symbols: usize,
    inner: Mutex<LockedInner<S>>,
}

impl<S> LockedStore<S> {
    pub fn new(label: &'static str, max_symbols: usize) -> Self {
        Self {
            label,
            max_symbols: max_symbols.max(1),
            inner: Mutex::new(LockedInner {
                clock: 0,
                slots: HashMap::new(),
            }),
        }
    }
}

impl<S: Send> SymbolStore<S> for LockedStore<S> {
    fn with_state<R>(&self, symbol: &str, init: impl FnOnce() -> S, f: impl FnOnce(&mut S) -> R) -> R {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let touched = inner.clock;

        if !inner.slots.contains_key(symbol) {
            while inner.slots.len() >= self.max_symbols {
                let victim = inner
                    .slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.touched)
                    .map(|(key, _)| key.clone());
                match victim {
                    Some(victim) => {
                        inner.slots.remove(&victim);
                        debug!(store = self.label, symbol = %victim, "Evicted least-recently-touched symbol");
                    }
                    None => break,
                }
            }
        }

        let slot = inner
            .slots
            .entry(symbol.to_string())
            .or_insert_with(|| Slot { state: init(), touched });
        slot.touched = touched;
        f(&mut slot.state)
    }

    fn read<R>(&self, symbol: &str, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.inner.lock().slots.get(symbol).map(|slot| f(&slot.state))
    }

    fn remove(&self, symbol: &str) -> bool {
        self.inner.lock().slots.remove(symbol).is_some()
    }

    fn clear(&self) {
        self.inner.lock().slots.clear();
    }

    fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    fn max_symbols(&self) -> usize {
        self.max_symbols
    }
}
