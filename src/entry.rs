//! The per-pair heap block: handles, kind tag, and inline key bytes.
//!
//! Each occupied entry is one allocation laid out as a two-pointer
//! header (cached key object, value) followed by an inline region: the
//! LEB128-encoded code-unit count, the raw key units, and a trailing
//! NUL byte. The key kind rides in the low bits of the cached-key
//! pointer when the key object's alignment frees them, otherwise in a
//! leading byte of the inline region; both choices are compile-time
//! constants.
//!
//! Handles are retained the raw-count way: `Rc::into_raw` to store,
//! `Rc::increment_strong_count` + `Rc::from_raw` to mint clones out of
//! the block.

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};
use core::slice;
use std::alloc::{alloc, dealloc, Layout};
use std::rc::Rc;

use crate::error::Error;
use crate::key::{Key, KeyKind, KeyView};
use crate::leb128;

#[repr(C)]
struct Header<V> {
    cached_key: *const Key,
    value: *const V,
}

// `Key` holds pointers, so this is true on every supported target; the
// byte fallback keeps the layout well-defined if it ever is not.
const KIND_IN_POINTER: bool = mem::align_of::<Key>() >= 4;
const KIND_MASK: usize = if KIND_IN_POINTER { 0b11 } else { 0 };
const KIND_BYTE: usize = if KIND_IN_POINTER { 0 } else { 1 };

/// One occupied key/value record. Owns its heap block, one strong count
/// on the value, and one on the cached key object when present.
pub(crate) struct Entry<V> {
    block: NonNull<u8>,
    _owns: PhantomData<(Rc<Key>, Rc<V>)>,
}

impl<V> Entry<V> {
    fn layout_for(tail: usize) -> Result<Layout, Error> {
        let size = mem::size_of::<Header<V>>()
            .checked_add(tail)
            .ok_or(Error::CapacityOverflow)?;
        Layout::from_size_align(size, mem::align_of::<Header<V>>())
            .map_err(|_| Error::CapacityOverflow)
    }

    /// Allocate an entry for `view`'s key holding `value`.
    ///
    /// `origin` is the key object to retain as `cached_key`; it must be
    /// present for text kinds (text keys always have a host object) and
    /// may be absent for byte keys supplied through a raw buffer.
    pub(crate) fn new(
        view: &KeyView<'_>,
        origin: Option<Rc<Key>>,
        value: Rc<V>,
    ) -> Result<Self, Error> {
        debug_assert_eq!(view.units.len(), view.len * view.kind.unit_size());
        debug_assert!(view.kind == KeyKind::Bytes || origin.is_some());

        let enc = leb128::encode(view.len as u64);
        let tail = KIND_BYTE + enc.len() + view.units.len() + 1;
        let layout = Self::layout_for(tail)?;
        let block =
            NonNull::new(unsafe { alloc(layout) }).ok_or(Error::AllocationFailed)?;

        let key_ptr: *const Key = match origin {
            Some(rc) => Rc::into_raw(rc),
            None => ptr::null(),
        };
        assert_eq!(key_ptr as usize & KIND_MASK, 0, "key handle carries tag bits");
        let tagged = if KIND_IN_POINTER {
            // Bytes tags as 0, so a null cached_key stays null.
            key_ptr.cast::<u8>().wrapping_add(view.kind as usize).cast::<Key>()
        } else {
            key_ptr
        };

        unsafe {
            let hdr = block.as_ptr().cast::<Header<V>>();
            ptr::addr_of_mut!((*hdr).cached_key).write(tagged);
            ptr::addr_of_mut!((*hdr).value).write(Rc::into_raw(value));

            let mut p = block.as_ptr().add(mem::size_of::<Header<V>>());
            if !KIND_IN_POINTER {
                p.write(view.kind as u8);
                p = p.add(1);
            }
            ptr::copy_nonoverlapping(enc.as_bytes().as_ptr(), p, enc.len());
            p = p.add(enc.len());
            ptr::copy_nonoverlapping(view.units.as_ptr(), p, view.units.len());
            p = p.add(view.units.len());
            p.write(0);
        }
        Ok(Entry {
            block,
            _owns: PhantomData,
        })
    }

    #[inline]
    fn header(&self) -> *mut Header<V> {
        self.block.as_ptr().cast::<Header<V>>()
    }

    #[inline]
    fn raw_cached_key(&self) -> *const Key {
        unsafe { (*self.header()).cached_key }
    }

    #[inline]
    fn raw_value(&self) -> *const V {
        unsafe { (*self.header()).value }
    }

    #[inline]
    fn tail(&self) -> *const u8 {
        unsafe { self.block.as_ptr().add(mem::size_of::<Header<V>>()) }
    }

    pub(crate) fn kind(&self) -> KeyKind {
        if KIND_IN_POINTER {
            KeyKind::from_tag((self.raw_cached_key() as usize & KIND_MASK) as u8)
        } else {
            KeyKind::from_tag(unsafe { *self.tail() })
        }
    }

    fn len_header(&self) -> (usize, usize) {
        let (len, consumed) = unsafe { leb128::decode_raw(self.tail().add(KIND_BYTE)) };
        (len as usize, consumed)
    }

    /// Code-unit count of the inline key.
    pub(crate) fn len_units(&self) -> usize {
        self.len_header().0
    }

    /// The inline key units as raw bytes.
    pub(crate) fn unit_bytes(&self) -> &[u8] {
        let (len, consumed) = self.len_header();
        let bytes = len * self.kind().unit_size();
        unsafe { slice::from_raw_parts(self.tail().add(KIND_BYTE + consumed), bytes) }
    }

    /// The cached key object pointer with tag bits stripped; `None` for
    /// byte keys that have not been materialized.
    pub(crate) fn cached_key_ptr(&self) -> Option<NonNull<Key>> {
        let raw = self.raw_cached_key();
        let tag = raw as usize & KIND_MASK;
        NonNull::new(raw.cast::<u8>().wrapping_sub(tag).cast::<Key>().cast_mut())
    }

    pub(crate) fn value_ref(&self) -> &V {
        unsafe { &*self.raw_value() }
    }

    /// Mint a fresh owning handle to the stored value.
    pub(crate) fn value_handle(&self) -> Rc<V> {
        let p = self.raw_value();
        unsafe {
            Rc::increment_strong_count(p);
            Rc::from_raw(p)
        }
    }

    /// Swap the stored value handle for `new`, returning the old one.
    pub(crate) fn exchange_value(&mut self, new: Rc<V>) -> Rc<V> {
        unsafe {
            let hdr = self.header();
            let old = (*hdr).value;
            ptr::addr_of_mut!((*hdr).value).write(Rc::into_raw(new));
            Rc::from_raw(old)
        }
    }

    /// The host key object, as a fresh handle. Byte keys stored without
    /// one get materialized from the inline data and cached.
    ///
    /// The cache write goes through the block pointer and replaces a
    /// null handle with an equivalent materialized one, so shared
    /// observers of this entry see the same logical key before and
    /// after.
    pub(crate) fn key_object(&self) -> Rc<Key> {
        if let Some(p) = self.cached_key_ptr() {
            let raw = p.as_ptr().cast_const();
            return unsafe {
                Rc::increment_strong_count(raw);
                Rc::from_raw(raw)
            };
        }
        debug_assert_eq!(self.kind(), KeyKind::Bytes);
        let obj = Rc::new(Key::Bytes(self.unit_bytes().to_vec().into_boxed_slice()));
        let raw = Rc::into_raw(Rc::clone(&obj));
        assert_eq!(raw as usize & KIND_MASK, 0, "key handle carries tag bits");
        unsafe {
            let hdr = self.header();
            let tag = (*hdr).cached_key as usize & KIND_MASK;
            let tagged = raw.cast::<u8>().wrapping_add(tag).cast::<Key>();
            ptr::addr_of_mut!((*hdr).cached_key).write(tagged);
        }
        obj
    }

    /// Does this entry hold `view`'s key? Identity of the host key
    /// object short-circuits; otherwise kind, length, and unit bytes
    /// decide.
    pub(crate) fn matches(&self, view: &KeyView<'_>) -> bool {
        if let (Some(origin), Some(cached)) = (view.origin, self.cached_key_ptr()) {
            if origin == cached {
                return true;
            }
        }
        if self.kind() != view.kind || self.len_units() != view.len {
            return false;
        }
        self.unit_bytes() == view.units
    }

    /// Rebuild the probe view of this entry's key under `hash`.
    pub(crate) fn key_view_with(&self, hash: u64) -> KeyView<'_> {
        KeyView {
            kind: self.kind(),
            len: self.len_units(),
            units: self.unit_bytes(),
            origin: self.cached_key_ptr(),
            hash,
        }
    }

    /// Byte-for-byte copy of the block with both handles re-retained.
    pub(crate) fn duplicate(&self) -> Result<Self, Error> {
        let size = self.block_size();
        let layout = Self::layout_for(size - mem::size_of::<Header<V>>())?;
        let block =
            NonNull::new(unsafe { alloc(layout) }).ok_or(Error::AllocationFailed)?;
        unsafe {
            ptr::copy_nonoverlapping(self.block.as_ptr(), block.as_ptr(), size);
            Rc::increment_strong_count(self.raw_value());
            if let Some(k) = self.cached_key_ptr() {
                Rc::increment_strong_count(k.as_ptr().cast_const());
            }
        }
        Ok(Entry {
            block,
            _owns: PhantomData,
        })
    }

    /// Total size of the heap block in bytes.
    pub(crate) fn block_size(&self) -> usize {
        let (len, consumed) = self.len_header();
        mem::size_of::<Header<V>>() + KIND_BYTE + consumed + len * self.kind().unit_size() + 1
    }

    /// Consume the entry: release the block and the cached key, hand
    /// the value handle to the caller.
    pub(crate) fn into_value(self) -> Rc<V> {
        let this = ManuallyDrop::new(self);
        unsafe {
            let value = this.raw_value();
            let cached = this.cached_key_ptr();
            let size = this.block_size();
            let layout =
                Layout::from_size_align_unchecked(size, mem::align_of::<Header<V>>());
            dealloc(this.block.as_ptr(), layout);
            if let Some(k) = cached {
                drop(Rc::from_raw(k.as_ptr().cast_const()));
            }
            Rc::from_raw(value)
        }
    }
}

impl<V: fmt::Debug> Entry<V> {
    /// Write `key: value`: text keys in display form, byte keys
    /// ASCII-escaped, the value via `Debug`.
    pub(crate) fn write_repr(&self, out: &mut String) -> fmt::Result {
        use fmt::Write as _;
        match self.cached_key_ptr() {
            Some(p) => match unsafe { p.as_ref() } {
                Key::Text(t) => write!(out, "{t}")?,
                Key::Bytes(b) => write!(out, "{}", b.escape_ascii())?,
            },
            None => write!(out, "{}", self.unit_bytes().escape_ascii())?,
        }
        out.push_str(": ");
        write!(out, "{:?}", self.value_ref())
    }
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        unsafe {
            let value = self.raw_value();
            let cached = self.cached_key_ptr();
            let size = self.block_size();
            let layout =
                Layout::from_size_align_unchecked(size, mem::align_of::<Header<V>>());
            // Release the block first; the value destructor below may
            // run arbitrary user code.
            dealloc(self.block.as_ptr(), layout);
            if let Some(k) = cached {
                drop(Rc::from_raw(k.as_ptr().cast_const()));
            }
            drop(Rc::from_raw(value));
        }
    }
}
