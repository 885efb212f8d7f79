//! Memoization of pure unary functions.
//!
//! A [`Memoizer`] owns one cache table. Wrapping a function with
//! [`Memoizer::memoize`] yields a [`Memoized`] whose [`Memoized::call`] computes
//! each distinct key at most once and afterwards answers from the table.
//!
//! Entries are never evicted: the table grows with the number of distinct keys
//! for as long as the memoizer or one of its wrapped functions is alive.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use clap::ValueEnum;
use log::{debug, trace};
use once_cell::sync::OnceCell;
use rayon::prelude::*;

/// What a memoized function promises when several callers ask for the same
/// missing key at the same time.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum Guarantee {
    /// The underlying function runs exactly once per key. Concurrent callers
    /// of a missing key wait on a per-key guard while one of them computes.
    /// If that computation fails, one of the waiting callers tries again.
    ///
    /// The underlying function must not call the same memoized function for
    /// the key it is computing: the caller would wait on its own guard forever.
    #[default]
    ExactlyOnce,
    /// The underlying function runs outside any lock, so concurrent callers of
    /// a missing key may all compute it. The first stored value wins and is
    /// what every caller gets back.
    AtLeastOnce,
}

/// Counters of a cache table.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Keys holding a value.
    pub entries: usize,
    /// Calls answered from the table.
    pub hits: u64,
    /// Calls that ran the underlying function successfully.
    pub misses: u64,
    /// Calls where the underlying function returned an error.
    pub failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.failures;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// A slot is created empty on first lookup and filled once. A failed
// computation leaves it empty until `EmptySlotCleanup` removes it.
type Slot<V> = Arc<OnceCell<V>>;

struct Table<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
    guarantee: Guarantee,
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new(guarantee: Guarantee) -> Self {
        Table {
            slots: Mutex::new(HashMap::new()),
            guarantee,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    // The map is only ever touched by single lookups, inserts and removals, so a
    // poisoned lock still guards a consistent map.
    fn slots(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.slots();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Slot::default();
        slots.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    fn get_or_try_compute<E>(
        &self,
        key: K,
        compute: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<V, E> {
        match self.guarantee {
            Guarantee::ExactlyOnce => self.compute_once(key, compute),
            Guarantee::AtLeastOnce => self.compute_then_store(key, compute),
        }
    }

    fn compute_once<E>(&self, key: K, compute: impl FnOnce(&K) -> Result<V, E>) -> Result<V, E> {
        let cleanup = EmptySlotCleanup {
            table: self,
            key: &key,
            slot: self.slot(&key),
        };
        let mut computed = false;
        let result = cleanup
            .slot
            .get_or_try_init(|| {
                computed = true;
                compute(&key)
            })
            .cloned();
        self.record(computed, result.is_ok());
        result
    }

    fn compute_then_store<E>(
        &self,
        key: K,
        compute: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<V, E> {
        let cached = self.slots().get(&key).and_then(|slot| slot.get().cloned());
        if let Some(value) = cached {
            self.record(false, true);
            return Ok(value);
        }

        let result = compute(&key);
        self.record(true, result.is_ok());
        let value = result?;
        // first stored value wins
        Ok(self.slot(&key).get_or_init(|| value).clone())
    }

    fn record(&self, computed: bool, succeeded: bool) {
        match (computed, succeeded) {
            (false, _) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!("memo hit");
            }
            (true, true) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("memo miss, value stored");
            }
            (true, false) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!("memo miss, computation failed and nothing was stored");
            }
        }
    }

    fn len(&self) -> usize {
        self.slots().values().filter(|slot| slot.get().is_some()).count()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.slots().get(key).is_some_and(|slot| slot.get().is_some())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// Removes the slot of `key` when it is left empty by a failed or panicking
// computation and no other caller is waiting on it. Slots are only cloned
// under the table lock, so a count of two (map and us) cannot grow meanwhile.
struct EmptySlotCleanup<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    table: &'a Table<K, V>,
    key: &'a K,
    slot: Slot<V>,
}

impl<K, V> Drop for EmptySlotCleanup<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if self.slot.get().is_some() {
            return;
        }
        let mut slots = self.table.slots();
        let unshared = slots
            .get(self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
        if unshared {
            slots.remove(self.key);
        }
    }
}

/// Handle to one cache table.
///
/// Cloning the handle shares the table; every call to [`Memoizer::new`]
/// creates an independent one. Functions wrapped by the same memoizer share
/// its table, so their keys must not collide unless sharing is intended.
pub struct Memoizer<K, V> {
    table: Arc<Table<K, V>>,
}

impl<K, V> Memoizer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a memoizer with an empty table and [`Guarantee::ExactlyOnce`].
    pub fn new() -> Self {
        Self::with_guarantee(Guarantee::default())
    }

    pub fn with_guarantee(guarantee: Guarantee) -> Self {
        debug!("new memoizer ({:?})", guarantee);
        Memoizer {
            table: Arc::new(Table::new(guarantee)),
        }
    }

    pub fn guarantee(&self) -> Guarantee {
        self.table.guarantee
    }

    /// Wrap `f` so that it is evaluated at most once per distinct key
    /// (see [`Guarantee`] for concurrent first calls).
    ///
    /// `f` must be pure: the first value computed for a key is returned for
    /// that key forever.
    pub fn memoize<F>(&self, f: F) -> Memoized<K, V, F>
    where
        F: Fn(&K) -> V,
    {
        Memoized {
            table: Arc::clone(&self.table),
            f,
        }
    }

    /// Wrap a fallible `f`. Only `Ok` values are stored; an error reaches the
    /// caller unchanged and the next call with that key computes again.
    pub fn memoize_fallible<F, E>(&self, f: F) -> Memoized<K, V, F>
    where
        F: Fn(&K) -> Result<V, E>,
    {
        Memoized {
            table: Arc::clone(&self.table),
            f,
        }
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.table.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.table.stats()
    }
}

impl<K, V> Default for Memoizer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for Memoizer<K, V> {
    fn clone(&self) -> Self {
        Memoizer {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K, V> fmt::Debug for Memoizer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("guarantee", &self.guarantee())
            .field("entries", &self.len())
            .finish()
    }
}

/// A function wrapped by a [`Memoizer`], bound to that memoizer's table.
pub struct Memoized<K, V, F> {
    table: Arc<Table<K, V>>,
    f: F,
}

impl<K, V, F> Memoized<K, V, F>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// The memoizer whose table backs this function.
    pub fn memoizer(&self) -> Memoizer<K, V> {
        Memoizer {
            table: Arc::clone(&self.table),
        }
    }

    /// Return the stored value for `key`, computing and storing it on a miss.
    pub fn call(&self, key: K) -> V
    where
        F: Fn(&K) -> V,
    {
        match self
            .table
            .get_or_try_compute(key, |k| Ok::<V, Infallible>((self.f)(k)))
        {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`Memoized::call`] for a function built with
    /// [`Memoizer::memoize_fallible`]. Errors are passed through and not stored.
    pub fn try_call<E>(&self, key: K) -> Result<V, E>
    where
        F: Fn(&K) -> Result<V, E>,
    {
        self.table.get_or_try_compute(key, |k| (self.f)(k))
    }

    /// Evaluate every key on the rayon thread pool. Results come back in the
    /// order of `keys`; duplicate keys still compute once under
    /// [`Guarantee::ExactlyOnce`].
    pub fn call_all(&self, keys: Vec<K>) -> Vec<V>
    where
        K: Send + Sync,
        V: Send + Sync,
        F: Fn(&K) -> V + Sync,
    {
        keys.into_par_iter().map(|key| self.call(key)).collect()
    }

    /// Turn the wrapped function into a plain closure taking the key by
    /// value, like [`Memoized::call`].
    pub fn into_fn(self) -> impl Fn(K) -> V
    where
        F: Fn(&K) -> V,
    {
        move |key| self.call(key)
    }
}

impl<K, V, F: Clone> Clone for Memoized<K, V, F> {
    fn clone(&self) -> Self {
        Memoized {
            table: Arc::clone(&self.table),
            f: self.f.clone(),
        }
    }
}
