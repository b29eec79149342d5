//! strdict: an insertion-ordered map specialized for byte-string and
//! text-string keys.
//!
//! Keys are restricted to byte-like and text-like data, which lets each
//! entry store its key inline in a single heap block next to the two
//! reference-counted handles (cached key object, value). The index is
//! an open-addressed offset table over a dense, insertion-ordered entry
//! vector, so iteration is cache-friendly and ordered.
//!
//! Byte keys and text keys are distinct even when their bytes coincide:
//! `b"k"` and `"k"` can live side by side. Values are shared `Rc<V>`
//! handles; the whole structure is single-threaded.
//!
//! ```
//! use std::rc::Rc;
//! use strdict::StrDict;
//!
//! let mut d: StrDict<i32> = StrDict::new();
//! d.set("hello", Rc::new(1)).unwrap();
//! d.set(b"hello", Rc::new(2)).unwrap();
//! assert_eq!(d.len(), 2);
//! assert_eq!(*d.get(&"hello").unwrap(), 1);
//! assert_eq!(*d.get(b"hello").unwrap(), 2);
//! ```

mod dict;
mod dict_proptest;
mod entry;
mod error;
mod key;
mod leb128;
mod reentrancy;
mod table;
mod text;

pub use dict::StrDict;
pub use error::Error;
pub use key::{AsKeyUnits, Key, KeyKind, KeyUnits};
pub use text::TextBuf;
