//! `StrDict`: the public dictionary over the open-addressed core.
//!
//! Keys are byte strings or text strings (see [`AsKeyUnits`]); values
//! are shared `Rc<V>` handles. Iteration order is insertion order.
//! Mutating operations arm a debug re-entry check and release displaced
//! handles only after the table is consistent again, so a value
//! destructor can never observe a half-mutated dictionary.

use core::fmt;
use core::hash::BuildHasher;
use core::ptr::NonNull;
use std::cell::RefCell;
use std::collections::hash_map::RandomState;
use std::rc::Rc;

use crate::entry::Entry;
use crate::error::Error;
use crate::key::{AsKeyUnits, Key, KeyKind, KeyUnits, KeyView};
use crate::reentrancy::ReentryCheck;
use crate::table::{Core, Insertion};
use crate::text::TextBuf;

/// An insertion-ordered map from byte-string and text-string keys to
/// shared values.
///
/// Key data lives inline in per-entry heap blocks; the index is an
/// open-addressed offset table. `get`, `set` and friends accept
/// anything implementing [`AsKeyUnits`] — `&str`, `&[u8]`, byte
/// literals, [`TextBuf`], or a shared [`Key`]. Byte keys and text keys
/// with identical bytes are distinct.
pub struct StrDict<V, S = RandomState> {
    pub(crate) core: Core<V>,
    hasher: S,
    reentry: ReentryCheck,
}

thread_local! {
    // repr() recursion detection across nested Debug calls
    static REPR_STACK: RefCell<Vec<*const ()>> = const { RefCell::new(Vec::new()) };
}

/// The key object a fresh entry should retain: the caller's shared key
/// when one exists, a newly materialized text object for text keys, and
/// nothing for raw byte keys (materialized later on demand).
fn origin_for_new_entry(units: &KeyUnits<'_>) -> Option<Rc<Key>> {
    if let Some(rc) = units.origin {
        return Some(Rc::clone(rc));
    }
    match units.kind {
        KeyKind::Bytes => None,
        kind => Some(Rc::new(Key::Text(TextBuf::from_units(
            kind,
            units.unit_bytes(),
            units.len,
        )))),
    }
}

impl<V> StrDict<V> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::default())
    }

    /// A dictionary pre-sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Result<Self, Error> {
        let mut dict = Self::new();
        dict.reserve(capacity)?;
        Ok(dict)
    }

    /// Build a dictionary from key/value pairs, later pairs replacing
    /// earlier ones with the same key.
    pub fn from_pairs<K, I>(pairs: I) -> Result<Self, Error>
    where
        K: AsKeyUnits,
        I: IntoIterator<Item = (K, Rc<V>)>,
    {
        let mut dict = Self::new();
        dict.update_from_iter(pairs)?;
        Ok(dict)
    }
}

impl<V> Default for StrDict<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S: BuildHasher> StrDict<V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            core: Core::new(),
            hasher,
            reentry: ReentryCheck::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    #[inline]
    fn hash_units(&self, units: &[u8]) -> u64 {
        self.hasher.hash_one(units)
    }

    fn view<'k>(&self, units: &'k KeyUnits<'_>) -> KeyView<'k> {
        KeyView {
            kind: units.kind,
            len: units.len,
            units: units.unit_bytes(),
            origin: units
                .origin
                .and_then(|rc| NonNull::new(Rc::as_ptr(rc).cast_mut())),
            hash: self.hash_units(units.unit_bytes()),
        }
    }

    pub fn contains_key<K: AsKeyUnits + ?Sized>(&self, key: &K) -> bool {
        let units = key.as_key_units();
        self.core.find_existing(&self.view(&units)).is_some()
    }

    /// Look the key up and mint a fresh handle to its value.
    pub fn get<K: AsKeyUnits + ?Sized>(&self, key: &K) -> Option<Rc<V>> {
        let units = key.as_key_units();
        let slot = self.core.find_existing(&self.view(&units))?;
        Some(self.core.entry_at(slot).value_handle())
    }

    /// `get` with a fallback for missing keys.
    pub fn get_or<K: AsKeyUnits + ?Sized>(&self, key: &K, default: Rc<V>) -> Rc<V> {
        self.get(key).unwrap_or(default)
    }

    /// Insert or replace, handing back a fresh handle to the installed
    /// value. The dictionary is untouched if storage allocation fails.
    pub fn set<K: AsKeyUnits + ?Sized>(&mut self, key: &K, value: Rc<V>) -> Result<Rc<V>, Error> {
        let units = key.as_key_units();
        let view = self.view(&units);
        self.set_impl(&view, || origin_for_new_entry(&units), value, false)
    }

    /// Insert `default` only if the key is absent; returns the value
    /// that ends up stored (the existing one, or `default`).
    pub fn set_default<K: AsKeyUnits + ?Sized>(
        &mut self,
        key: &K,
        default: Rc<V>,
    ) -> Result<Rc<V>, Error> {
        let units = key.as_key_units();
        let view = self.view(&units);
        self.set_impl(&view, || origin_for_new_entry(&units), default, true)
    }

    fn set_impl(
        &mut self,
        view: &KeyView<'_>,
        make_origin: impl FnOnce() -> Option<Rc<Key>>,
        value: Rc<V>,
        keep_existing: bool,
    ) -> Result<Rc<V>, Error> {
        let displaced: Option<Rc<V>>;
        let installed: Rc<V>;
        {
            let _scope = self.reentry.armed();
            match self.core.find_insertion(view) {
                Insertion::Match { slot } => {
                    if keep_existing {
                        installed = self.core.entry_at(slot).value_handle();
                        displaced = Some(value);
                    } else {
                        installed = value.clone();
                        displaced = Some(self.core.entry_mut(slot).exchange_value(value));
                    }
                }
                Insertion::Tombstone { slot } => {
                    installed = value.clone();
                    self.core
                        .insert_tombstone(slot, view, make_origin(), value)?;
                    displaced = None;
                }
                Insertion::Fresh { probe } => {
                    installed = value.clone();
                    self.core.insert_fresh(probe, view, make_origin(), value)?;
                    displaced = None;
                }
            }
        }
        drop(displaced);
        Ok(installed)
    }

    /// Remove the key, handing its value back. `None` when absent.
    pub fn remove<K: AsKeyUnits + ?Sized>(&mut self, key: &K) -> Option<Rc<V>> {
        let entry;
        {
            let _scope = self.reentry.armed();
            let units = key.as_key_units();
            let slot = self.core.find_existing(&self.view(&units))?;
            entry = self.core.take_entry(slot);
        }
        Some(entry.into_value())
    }

    /// Remove and return the value, or the default when the key is
    /// absent, or `Error::MissingKey` when there is no default either.
    pub fn pop<K: AsKeyUnits + ?Sized>(
        &mut self,
        key: &K,
        default: Option<Rc<V>>,
    ) -> Result<Rc<V>, Error> {
        match self.remove(key) {
            Some(value) => Ok(value),
            None => default.ok_or(Error::MissingKey),
        }
    }

    /// Remove and return the oldest surviving insertion.
    pub fn pop_first(&mut self) -> Option<(Rc<Key>, Rc<V>)> {
        let key;
        let entry;
        {
            let _scope = self.reentry.armed();
            let slot = self.core.first_occupied()?;
            key = self.core.entry_at(slot).key_object();
            entry = self.core.take_entry(slot);
        }
        Some((key, entry.into_value()))
    }

    /// Drop every entry and shrink the index back to its minimum.
    pub fn clear(&mut self) {
        let drained;
        {
            let _scope = self.reentry.armed();
            drained = self.core.clear();
        }
        drop(drained);
    }

    /// Pre-size for `additional` more entries. Fails with
    /// `CapacityOverflow` when the bucket count would not be
    /// representable, leaving the dictionary unchanged.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let _scope = self.reentry.armed();
        let total = self
            .len()
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;
        self.core.reserve_total(total)
    }

    /// Deep copy: entry blocks are duplicated, value and key handles
    /// shared. The copy probes identically to the original.
    pub fn copy(&self) -> Result<Self, Error>
    where
        S: Clone,
    {
        Ok(Self {
            core: self.core.try_duplicate()?,
            hasher: self.hasher.clone(),
            reentry: ReentryCheck::new(),
        })
    }

    /// Key objects in insertion order.
    pub fn keys(&self) -> Vec<Rc<Key>> {
        self.core.occupied_entries().map(Entry::key_object).collect()
    }

    /// Value handles in insertion order.
    pub fn values(&self) -> Vec<Rc<V>> {
        self.core
            .occupied_entries()
            .map(Entry::value_handle)
            .collect()
    }

    /// Key/value pairs in insertion order.
    pub fn items(&self) -> Vec<(Rc<Key>, Rc<V>)> {
        self.iter().collect()
    }

    /// Iterate pairs in insertion order, minting handles as it goes.
    /// Borrowing the dictionary keeps mutation out for the iterator's
    /// lifetime.
    pub fn iter(&self) -> impl Iterator<Item = (Rc<Key>, Rc<V>)> + '_ {
        self.core
            .occupied_entries()
            .map(|entry| (entry.key_object(), entry.value_handle()))
    }

    /// Insert every pair of `other`, replacing existing keys. Cached
    /// key objects are shared with `other`'s entries rather than
    /// rebuilt.
    pub fn update<S2: BuildHasher>(&mut self, other: &StrDict<V, S2>) -> Result<(), Error> {
        self.reserve(other.len())?;
        for entry in other.core.occupied_entries() {
            let hash = self.hash_units(entry.unit_bytes());
            let view = entry.key_view_with(hash);
            let value = entry.value_handle();
            self.set_impl(
                &view,
                || {
                    entry.cached_key_ptr().map(|p| unsafe {
                        let raw = p.as_ptr().cast_const();
                        Rc::increment_strong_count(raw);
                        Rc::from_raw(raw)
                    })
                },
                value,
                false,
            )?;
        }
        Ok(())
    }

    /// Insert every pair of an iterator, replacing existing keys.
    pub fn update_from_iter<K, I>(&mut self, pairs: I) -> Result<(), Error>
    where
        K: AsKeyUnits,
        I: IntoIterator<Item = (K, Rc<V>)>,
    {
        let pairs = pairs.into_iter();
        self.reserve(pairs.size_hint().0)?;
        for (key, value) in pairs {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Insert every pair of a plain mapping, replacing existing keys.
    pub fn update_from_map<Q, S2>(
        &mut self,
        map: &hashbrown::HashMap<Q, V, S2>,
    ) -> Result<(), Error>
    where
        Q: AsKeyUnits,
        V: Clone,
    {
        self.reserve(map.len())?;
        for (key, value) in map {
            self.set(key, Rc::new(value.clone()))?;
        }
        Ok(())
    }

    /// Visit every stored value in insertion order, stopping at the
    /// visitor's first error.
    pub fn traverse<E, F>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&V) -> Result<(), E>,
    {
        for entry in self.core.occupied_entries() {
            visit(entry.value_ref())?;
        }
        Ok(())
    }

    /// Heap footprint in bytes: the container itself, both table
    /// vectors, and every inline entry block.
    pub fn allocated_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.core.allocated_bytes()
    }

    fn subset_of<S2: BuildHasher>(&self, other: &StrDict<V, S2>) -> bool
    where
        V: PartialEq,
    {
        for entry in self.core.occupied_entries() {
            let hash = other.hash_units(entry.unit_bytes());
            let view = entry.key_view_with(hash);
            match other.core.find_existing(&view) {
                Some(slot) => {
                    if other.core.entry_at(slot).value_ref() != entry.value_ref() {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

impl<V: fmt::Debug, S: BuildHasher> StrDict<V, S> {
    /// Display form: `strdict({key: value, ...})`, `strdict({...})`
    /// when the dictionary is reached again while already printing
    /// itself.
    pub fn repr(&self) -> String {
        if self.is_empty() {
            return String::from("strdict({})");
        }
        let address = self as *const Self as *const ();
        let already = REPR_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&address) {
                true
            } else {
                stack.push(address);
                false
            }
        });
        if already {
            return String::from("strdict({...})");
        }
        struct PopOnDrop;
        impl Drop for PopOnDrop {
            fn drop(&mut self) {
                REPR_STACK.with(|stack| {
                    stack.borrow_mut().pop();
                });
            }
        }
        let _pop = PopOnDrop;

        let mut out = String::from("strdict({");
        let mut first = true;
        for entry in self.core.occupied_entries() {
            if !first {
                out.push_str(", ");
            }
            first = false;
            let _ = entry.write_repr(&mut out);
        }
        out.push_str("})");
        out
    }
}

impl<V: fmt::Debug, S: BuildHasher> fmt::Debug for StrDict<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl<V, S, S2> PartialEq<StrDict<V, S2>> for StrDict<V, S>
where
    V: PartialEq,
    S: BuildHasher,
    S2: BuildHasher,
{
    fn eq(&self, other: &StrDict<V, S2>) -> bool {
        if self.len() != other.len() {
            return false;
        }
        // walk the side with fewer physical slots: fewer empty skips
        if self.core.slot_count() <= other.core.slot_count() {
            self.subset_of(other)
        } else {
            other.subset_of(self)
        }
    }
}

impl<V: Eq, S: BuildHasher> Eq for StrDict<V, S> {}

impl<Q, V, S, S2> PartialEq<hashbrown::HashMap<Q, V, S2>> for StrDict<V, S>
where
    Q: AsKeyUnits,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &hashbrown::HashMap<Q, V, S2>) -> bool {
        if self.len() != other.len() {
            return false;
        }
        for (key, value) in other {
            let units = key.as_key_units();
            match self.core.find_existing(&self.view(&units)) {
                Some(slot) => {
                    if self.core.entry_at(slot).value_ref() != value {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}
