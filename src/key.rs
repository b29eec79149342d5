//! Key normalization: kinds, host key objects, and the lookup view.
//!
//! Every public operation funnels its key argument through
//! [`AsKeyUnits`], which produces the canonical `(kind, unit bytes)`
//! description the table probes with. [`Key`] is the materialized,
//! reference-counted object handed back by `keys()`/`items()` and
//! retained inside entries.

use core::fmt;
use core::ptr::NonNull;
use std::borrow::Cow;
use std::rc::Rc;

use crate::text::{canonical_units, TextBuf};

/// The four key classes. The discriminant doubles as the tag stored in
/// entry pointer bits, and equals the unit width for the wide text
/// kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyKind {
    /// Opaque byte string.
    Bytes = 0,
    /// Text with 1-byte code units.
    Text1 = 1,
    /// Text with 2-byte code units.
    Text2 = 2,
    /// Text with 4-byte code units.
    Text4 = 3,
}

impl KeyKind {
    /// Bytes per code unit.
    #[inline]
    pub fn unit_size(self) -> usize {
        match self {
            KeyKind::Bytes | KeyKind::Text1 => 1,
            KeyKind::Text2 => 2,
            KeyKind::Text4 => 4,
        }
    }

    /// Decode a 2-bit tag.
    #[inline]
    pub(crate) fn from_tag(tag: u8) -> KeyKind {
        match tag & 0b11 {
            0 => KeyKind::Bytes,
            1 => KeyKind::Text1,
            2 => KeyKind::Text2,
            _ => KeyKind::Text4,
        }
    }
}

/// A materialized key object: what `keys()` and `items()` return, and
/// what an entry caches for identity-based matching.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bytes(Box<[u8]>),
    Text(TextBuf),
}

impl Key {
    /// The kind this key would probe as.
    pub fn kind(&self) -> KeyKind {
        match self {
            Key::Bytes(_) => KeyKind::Bytes,
            Key::Text(t) => t.kind(),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(TextBuf::from(s))
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key::Bytes(b.to_vec().into_boxed_slice())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bytes(b) => write!(f, "b\"{}\"", b.escape_ascii()),
            Key::Text(t) => fmt::Debug::fmt(t, f),
        }
    }
}

/// Borrowed, normalized key content: the kind, the code-unit count, the
/// raw unit bytes, and (when the caller already holds one) the host key
/// object for identity fast-path matching and entry retention.
pub struct KeyUnits<'a> {
    pub(crate) kind: KeyKind,
    pub(crate) len: usize,
    pub(crate) units: Cow<'a, [u8]>,
    pub(crate) origin: Option<&'a Rc<Key>>,
}

impl KeyUnits<'_> {
    #[inline]
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Code-unit count (not byte count).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn unit_bytes(&self) -> &[u8] {
        &self.units
    }
}

/// Types usable as dictionary keys: text strings, byte strings, and any
/// type exposing a contiguous byte buffer.
///
/// Implementations must be stable: the same value must always yield the
/// same `(kind, units)`. Byte-buffer keys produce `KeyKind::Bytes` with
/// no origin; the table stores them with an uncached key object that is
/// materialized on demand.
pub trait AsKeyUnits {
    fn as_key_units(&self) -> KeyUnits<'_>;
}

impl AsKeyUnits for str {
    fn as_key_units(&self) -> KeyUnits<'_> {
        if self.is_ascii() {
            KeyUnits {
                kind: KeyKind::Text1,
                len: self.len(),
                units: Cow::Borrowed(self.as_bytes()),
                origin: None,
            }
        } else {
            let (kind, len, units) = canonical_units(self);
            KeyUnits {
                kind,
                len,
                units: Cow::Owned(units),
                origin: None,
            }
        }
    }
}

impl AsKeyUnits for String {
    fn as_key_units(&self) -> KeyUnits<'_> {
        self.as_str().as_key_units()
    }
}

impl AsKeyUnits for [u8] {
    fn as_key_units(&self) -> KeyUnits<'_> {
        KeyUnits {
            kind: KeyKind::Bytes,
            len: self.len(),
            units: Cow::Borrowed(self),
            origin: None,
        }
    }
}

impl<const N: usize> AsKeyUnits for [u8; N] {
    fn as_key_units(&self) -> KeyUnits<'_> {
        self[..].as_key_units()
    }
}

impl AsKeyUnits for Vec<u8> {
    fn as_key_units(&self) -> KeyUnits<'_> {
        self[..].as_key_units()
    }
}

impl AsKeyUnits for TextBuf {
    fn as_key_units(&self) -> KeyUnits<'_> {
        KeyUnits {
            kind: self.kind(),
            len: self.len(),
            units: Cow::Borrowed(self.unit_bytes()),
            origin: None,
        }
    }
}

impl AsKeyUnits for Key {
    fn as_key_units(&self) -> KeyUnits<'_> {
        match self {
            Key::Bytes(b) => KeyUnits {
                kind: KeyKind::Bytes,
                len: b.len(),
                units: Cow::Borrowed(&b[..]),
                origin: None,
            },
            Key::Text(t) => t.as_key_units(),
        }
    }
}

impl AsKeyUnits for Rc<Key> {
    fn as_key_units(&self) -> KeyUnits<'_> {
        let mut units = (**self).as_key_units();
        units.origin = Some(self);
        units
    }
}

impl<T: AsKeyUnits + ?Sized> AsKeyUnits for &T {
    fn as_key_units(&self) -> KeyUnits<'_> {
        (**self).as_key_units()
    }
}

/// The transient probe descriptor: normalized key content plus the hash
/// computed by the owning table's hasher. `origin` is a borrowed host
/// key pointer used only for identity comparison and retention; the
/// caller keeps the pointee alive for the view's lifetime.
pub(crate) struct KeyView<'a> {
    pub(crate) kind: KeyKind,
    pub(crate) len: usize,
    pub(crate) units: &'a [u8],
    pub(crate) origin: Option<NonNull<Key>>,
    pub(crate) hash: u64,
}
