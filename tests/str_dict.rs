// StrDict behavior suite (consolidated).
//
// Each test documents the behavior being verified and which invariants
// are assumed or asserted. The core invariants exercised:
// - Keying: byte keys and text keys never alias, even for equal bytes;
//   equal key content matches regardless of the input route.
// - Ordering: iteration, keys/values/items, and pop_first observe
//   insertion order; replacement keeps a key's position; removal
//   followed by rehash preserves the survivors' order.
// - Handles: get/set/remove mint and consume Rc handles; a handle
//   obtained before removal keeps the value alive afterwards.
// - Equality: content-based between dicts, and against a plain
//   hashbrown mapping.
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use strdict::{Error, Key, StrDict, TextBuf};

fn text_of(key: &Key) -> String {
    match key {
        Key::Text(t) => t.to_string(),
        Key::Bytes(b) => panic!("expected text key, got bytes {b:?}"),
    }
}

// Test: basic set/get/len/items flow.
// Assumes: set returns a handle to the installed value.
// Verifies: lookups hit, items() lists pairs in insertion order.
#[test]
fn set_get_and_items_in_order() {
    let mut d: StrDict<i32> = StrDict::new();
    let installed = d.set("hello", Rc::new(1)).unwrap();
    assert_eq!(*installed, 1);
    d.set("world", Rc::new(2)).unwrap();

    assert_eq!(d.len(), 2);
    assert!(!d.is_empty());
    assert_eq!(*d.get(&"hello").unwrap(), 1);
    assert_eq!(*d.get(&"world").unwrap(), 2);
    assert!(d.get(&"missing").is_none());

    let items: Vec<(String, i32)> = d
        .items()
        .into_iter()
        .map(|(k, v)| (text_of(&k), *v))
        .collect();
    assert_eq!(items, [("hello".into(), 1), ("world".into(), 2)]);
}

// Test: byte keys and text keys are distinct key spaces.
// Assumes: kind participates in matching before byte comparison.
// Verifies: b"k" and "k" coexist with independent values.
#[test]
fn bytes_and_text_are_distinct() {
    let mut d: StrDict<i32> = StrDict::new();
    d.set(b"k", Rc::new(10)).unwrap();
    d.set("k", Rc::new(20)).unwrap();

    assert_eq!(d.len(), 2);
    assert_eq!(*d.get(b"k").unwrap(), 10);
    assert_eq!(*d.get(&"k").unwrap(), 20);

    assert!(d.remove(b"k").is_some());
    assert_eq!(d.len(), 1);
    assert_eq!(*d.get(&"k").unwrap(), 20);
}

// Test: the empty byte string and empty text string are both valid
// keys and distinct from each other.
// Assumes: zero-length inline data is representable.
// Verifies: both inserts land; lookups do not cross kinds.
#[test]
fn empty_keys_are_distinct() {
    let mut d: StrDict<i32> = StrDict::new();
    d.set(b"", Rc::new(1)).unwrap();
    d.set("", Rc::new(2)).unwrap();
    assert_eq!(d.len(), 2);
    assert_eq!(*d.get(b"").unwrap(), 1);
    assert_eq!(*d.get(&"").unwrap(), 2);
}

// Test: removal of a prefix of insertions.
// Assumes: removal leaves later keys reachable (tombstoned chains).
// Verifies: survivors keep insertion order in keys().
#[test]
fn removal_preserves_survivor_order() {
    let mut d: StrDict<usize> = StrDict::new();
    for i in 0..100 {
        d.set(&i.to_string(), Rc::new(i)).unwrap();
    }
    for i in 0..50 {
        assert!(d.remove(&i.to_string()).is_some());
    }
    assert_eq!(d.len(), 50);
    let keys: Vec<String> = d.keys().iter().map(|k| text_of(k)).collect();
    let expected: Vec<String> = (50..100).map(|i| i.to_string()).collect();
    assert_eq!(keys, expected);
}

// Test: copy() independence.
// Assumes: copy duplicates entry blocks and shares value handles.
// Verifies: mutating the copy leaves the original untouched and vice
// versa.
#[test]
fn copy_is_independent() {
    let mut d: StrDict<i32> = StrDict::new();
    d.set("a", Rc::new(1)).unwrap();
    let mut c = d.copy().unwrap();
    assert!(c == d);

    c.set("a", Rc::new(2)).unwrap();
    assert_eq!(*d.get(&"a").unwrap(), 1);
    assert_eq!(*c.get(&"a").unwrap(), 2);

    d.set("b", Rc::new(3)).unwrap();
    assert!(c.get(&"b").is_none());
}

// Test: update pipeline over both source shapes.
// Assumes: update replaces existing keys in place, appends new ones.
// Verifies: final items and their order match the merge of both steps.
#[test]
fn update_from_pairs_then_map() {
    let mut d: StrDict<i32> = StrDict::new();
    d.update_from_iter([("a", Rc::new(1)), ("b", Rc::new(2))]).unwrap();

    let mut m = hashbrown::HashMap::new();
    m.insert("b", 3);
    m.insert("c", 4);
    d.update_from_map(&m).unwrap();

    let items: Vec<(String, i32)> = d
        .items()
        .into_iter()
        .map(|(k, v)| (text_of(&k), *v))
        .collect();
    assert_eq!(
        items,
        [("a".into(), 1), ("b".into(), 3), ("c".into(), 4)]
    );
}

// Test: dict-to-dict update shares cached key objects.
// Assumes: the destination retains the source's key objects.
// Verifies: merged content; keys() of both sides give the same object
// for a shared key.
#[test]
fn update_from_dict_shares_keys() {
    let mut a: StrDict<i32> = StrDict::new();
    let mut b: StrDict<i32> = StrDict::new();
    a.set("x", Rc::new(1)).unwrap();
    b.set("y", Rc::new(2)).unwrap();
    a.update(&b).unwrap();

    assert_eq!(a.len(), 2);
    assert_eq!(*a.get(&"y").unwrap(), 2);
    let a_y = a.keys().into_iter().find(|k| text_of(k) == "y").unwrap();
    let b_y = b.keys().into_iter().find(|k| text_of(k) == "y").unwrap();
    assert!(Rc::ptr_eq(&a_y, &b_y), "key object must be shared, not rebuilt");
}

// Test: equality against a plain mapping.
// Assumes: sizes gate first; values compare via PartialEq.
// Verifies: equal content matches; differing value or extra key does
// not.
#[test]
fn foreign_map_equality() {
    let mut d: StrDict<i32> = StrDict::new();
    d.set("x", Rc::new(1)).unwrap();

    let mut same = hashbrown::HashMap::new();
    same.insert("x", 1);
    assert!(d == same);

    let mut other_value = hashbrown::HashMap::new();
    other_value.insert("x", 2);
    assert!(!(d == other_value));

    let mut bigger = hashbrown::HashMap::new();
    bigger.insert("x", 1);
    bigger.insert("y", 2);
    assert!(!(d == bigger));
}

// Test: dict equality is content-based, not order-based.
// Assumes: equality probes the other side per key.
// Verifies: same pairs in different insertion orders compare equal.
#[test]
fn dict_equality_ignores_order() {
    let mut a: StrDict<i32> = StrDict::new();
    a.set("x", Rc::new(1)).unwrap();
    a.set("y", Rc::new(2)).unwrap();
    let mut b: StrDict<i32> = StrDict::new();
    b.set("y", Rc::new(2)).unwrap();
    b.set("x", Rc::new(1)).unwrap();

    assert!(a == b);
    b.set("y", Rc::new(3)).unwrap();
    assert!(a != b);
}

// Test: a key supplied as a raw byte buffer (no host object) matches a
// later lookup through a shared key object, and the reverse.
// Assumes: matching falls through identity to bytewise comparison.
// Verifies: both directions hit the same entry.
#[test]
fn raw_buffer_and_shared_key_interchange() {
    let mut d: StrDict<i32> = StrDict::new();
    let buf: Vec<u8> = b"payload".to_vec();
    d.set(&buf, Rc::new(1)).unwrap();

    let shared = Rc::new(Key::from(&b"payload"[..]));
    assert_eq!(*d.get(&shared).unwrap(), 1);

    let shared2 = Rc::new(Key::from(&b"other"[..]));
    d.set(&shared2, Rc::new(2)).unwrap();
    assert_eq!(*d.get(b"other").unwrap(), 2);
}

// Test: wide text keys round-trip through every input route.
// Assumes: canonical unit recoding is content-determined.
// Verifies: &str, TextBuf, and Rc<Key> lookups agree for 1/2/4-byte
// unit widths.
#[test]
fn wide_text_key_routes_agree() {
    let mut d: StrDict<i32> = StrDict::new();
    for (i, s) in ["caf\u{e9}", "\u{100}\u{101}", "a\u{1f980}b"].iter().enumerate() {
        d.set(*s, Rc::new(i as i32)).unwrap();
    }
    for (i, s) in ["caf\u{e9}", "\u{100}\u{101}", "a\u{1f980}b"].iter().enumerate() {
        assert_eq!(*d.get(*s).unwrap(), i as i32);
        assert_eq!(*d.get(&TextBuf::from(*s)).unwrap(), i as i32);
        assert_eq!(*d.get(&Rc::new(Key::from(*s))).unwrap(), i as i32);
    }
}

// Test: get_or and set_default.
// Assumes: set_default only inserts on a miss.
// Verifies: defaults returned on miss; existing values preserved.
#[test]
fn get_or_and_set_default() {
    let mut d: StrDict<i32> = StrDict::new();
    assert_eq!(*d.get_or(&"k", Rc::new(-1)), -1);

    let stored = d.set_default("k", Rc::new(5)).unwrap();
    assert_eq!(*stored, 5);
    let stored = d.set_default("k", Rc::new(9)).unwrap();
    assert_eq!(*stored, 5, "set_default must keep the existing value");
    assert_eq!(*d.get_or(&"k", Rc::new(-1)), 5);
}

// Test: pop semantics with and without a default.
// Assumes: remove expresses a miss as None; pop as MissingKey.
// Verifies: hit returns the value; miss returns default or error.
#[test]
fn pop_with_and_without_default() {
    let mut d: StrDict<i32> = StrDict::new();
    d.set("k", Rc::new(7)).unwrap();

    assert_eq!(*d.pop(&"k", None).unwrap(), 7);
    assert_eq!(d.pop(&"k", None), Err(Error::MissingKey));
    assert_eq!(*d.pop(&"k", Some(Rc::new(-1))).unwrap(), -1);
    assert!(d.is_empty());
}

// Test: pop_first drains in insertion order.
// Assumes: the first occupied slot is the oldest insertion.
// Verifies: FIFO order; None when empty.
#[test]
fn pop_first_is_fifo() {
    let mut d: StrDict<i32> = StrDict::new();
    for (i, k) in ["a", "b", "c"].iter().enumerate() {
        d.set(*k, Rc::new(i as i32)).unwrap();
    }
    let mut seen = Vec::new();
    while let Some((k, v)) = d.pop_first() {
        seen.push((text_of(&k), *v));
    }
    assert_eq!(seen, [("a".into(), 0), ("b".into(), 1), ("c".into(), 2)]);
    assert!(d.pop_first().is_none());
}

// Test: clear empties the dictionary and it remains usable.
// Assumes: clear resets the index to its minimum shape.
// Verifies: len 0, lookups miss, subsequent inserts work.
#[test]
fn clear_then_reuse() {
    let mut d: StrDict<i32> = StrDict::new();
    for i in 0..100 {
        d.set(&format!("k{i}"), Rc::new(i)).unwrap();
    }
    d.clear();
    assert_eq!(d.len(), 0);
    assert!(d.get(&"k0").is_none());
    assert!(!d.contains_key(&"k99"));

    d.set("again", Rc::new(1)).unwrap();
    assert_eq!(*d.get(&"again").unwrap(), 1);
}

// Test: repr forms.
// Assumes: text keys print raw, byte keys ASCII-escaped, values Debug.
// Verifies: empty, simple, and mixed-key dicts.
#[test]
fn repr_forms() {
    let mut d: StrDict<i32> = StrDict::new();
    assert_eq!(d.repr(), "strdict({})");

    d.set("a", Rc::new(1)).unwrap();
    d.set(b"raw\xff", Rc::new(2)).unwrap();
    assert_eq!(d.repr(), "strdict({a: 1, raw\\xff: 2})");
    assert_eq!(format!("{d:?}"), d.repr());
}

// Self-referential value used to drive repr back into its own dict.
struct Loopy(RefCell<Option<Rc<StrDict<Loopy>>>>);

impl fmt::Debug for Loopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.borrow() {
            Some(d) => f.write_str(&d.repr()),
            None => f.write_str("leaf"),
        }
    }
}

// Test: recursive repr detection.
// Assumes: a value's Debug may re-enter repr of the same dict.
// Verifies: the inner occurrence collapses to "strdict({...})".
#[test]
fn recursive_repr_collapses() {
    let mut d: StrDict<Loopy> = StrDict::new();
    d.set("self", Rc::new(Loopy(RefCell::new(None)))).unwrap();
    let d = Rc::new(d);
    let v = d.get(&"self").unwrap();
    *v.0.borrow_mut() = Some(Rc::clone(&d));

    assert_eq!(d.repr(), "strdict({self: strdict({...})})");
}

// Test: traverse visits all values in order and aborts on error.
// Assumes: the visitor's first Err propagates unchanged.
// Verifies: visit counts and early-exit behavior.
#[test]
fn traverse_visits_and_aborts() {
    let mut d: StrDict<i32> = StrDict::new();
    for (i, k) in ["a", "b", "c"].iter().enumerate() {
        d.set(*k, Rc::new(i as i32)).unwrap();
    }

    let mut seen = Vec::new();
    let ok: Result<(), ()> = d.traverse(|v| {
        seen.push(*v);
        Ok(())
    });
    ok.unwrap();
    assert_eq!(seen, [0, 1, 2]);

    let mut visited = 0;
    let res: Result<(), &str> = d.traverse(|v| {
        visited += 1;
        if *v == 1 {
            Err("stop")
        } else {
            Ok(())
        }
    });
    assert_eq!(res, Err("stop"));
    assert_eq!(visited, 2);
}

// Test: a value handle outlives removal.
// Assumes: Rc semantics; the entry held one strong count.
// Verifies: handle stays readable, counts balance out.
#[test]
fn handle_survives_removal() {
    let mut d: StrDict<String> = StrDict::new();
    d.set("k", Rc::new("payload".to_string())).unwrap();
    let handle = d.get(&"k").unwrap();
    assert_eq!(Rc::strong_count(&handle), 2);

    let removed = d.remove(&"k").unwrap();
    assert!(Rc::ptr_eq(&handle, &removed));
    drop(removed);
    assert_eq!(Rc::strong_count(&handle), 1);
    assert_eq!(*handle, "payload");
}

// Test: allocated_size reflects growth.
// Assumes: entry blocks and table vectors are counted.
// Verifies: monotonic increase with insertions; drop after clear.
#[test]
fn allocated_size_tracks_contents() {
    let mut d: StrDict<u64> = StrDict::new();
    let empty = d.allocated_size();
    for i in 0..1000u64 {
        d.set(&format!("key-{i}"), Rc::new(i)).unwrap();
    }
    let full = d.allocated_size();
    assert!(full > empty);
    d.clear();
    assert!(d.allocated_size() < full);
}

// Test: reserve overflow surfaces as CapacityOverflow.
// Assumes: bucket math is checked.
// Verifies: error reported, dictionary still usable.
#[test]
fn reserve_overflow_is_reported() {
    let mut d: StrDict<i32> = StrDict::new();
    assert_eq!(d.reserve(usize::MAX / 2), Err(Error::CapacityOverflow));
    d.set("still-works", Rc::new(1)).unwrap();
    assert_eq!(d.len(), 1);
}

// Test: with_capacity pre-sizes and from_pairs builds in order.
// Assumes: reserve picks a bucket count keeping load under 2/3.
// Verifies: constructor results match incremental construction.
#[test]
fn constructors() {
    let d: StrDict<i32> = StrDict::with_capacity(1000).unwrap();
    assert!(d.is_empty());

    let d = StrDict::from_pairs([
        ("a", Rc::new(1)),
        ("b", Rc::new(2)),
        ("a", Rc::new(3)),
    ])
    .unwrap();
    assert_eq!(d.len(), 2);
    assert_eq!(*d.get(&"a").unwrap(), 3);
    let keys: Vec<String> = d.keys().iter().map(|k| text_of(k)).collect();
    assert_eq!(keys, ["a", "b"]);
}

// Test: bulk insertion keeps order across many rehashes.
// Assumes: rebuilds preserve the dense vector's order.
// Verifies: 10k items iterate in insertion order; all retrievable.
#[test]
fn bulk_insert_keeps_order() {
    let mut d: StrDict<usize> = StrDict::new();
    for i in 0..10_000 {
        d.set(&format!("key-{i:05}"), Rc::new(i)).unwrap();
    }
    assert_eq!(d.len(), 10_000);
    for (i, (k, v)) in d.iter().enumerate() {
        assert_eq!(text_of(&k), format!("key-{i:05}"));
        assert_eq!(*v, i);
    }
    assert_eq!(*d.get(&"key-09999").unwrap(), 9_999);
}
