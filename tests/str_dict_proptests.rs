// Black-box property tests: only the public API, checked against plain
// std collections. The in-crate proptests cover structural invariants;
// these cover the observable contract.

use proptest::prelude::*;
use std::collections::HashMap;
use std::rc::Rc;
use strdict::{Key, StrDict, TextBuf};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum PoolKey {
    Text(String),
    Bytes(Vec<u8>),
}

fn arb_key() -> impl Strategy<Value = PoolKey> {
    prop_oneof![
        "[a-d]{0,4}".prop_map(PoolKey::Text),
        proptest::collection::vec(any::<u8>(), 0..5).prop_map(PoolKey::Bytes),
        proptest::sample::select(vec![
            PoolKey::Text(String::new()),
            PoolKey::Bytes(Vec::new()),
            PoolKey::Text("\u{e9}\u{100}".into()),
            PoolKey::Text("\u{1f980}".into()),
        ]),
    ]
}

fn set(d: &mut StrDict<i32>, k: &PoolKey, v: i32) {
    match k {
        PoolKey::Text(s) => d.set(s.as_str(), Rc::new(v)).unwrap(),
        PoolKey::Bytes(b) => d.set(&b[..], Rc::new(v)).unwrap(),
    };
}

fn get(d: &StrDict<i32>, k: &PoolKey) -> Option<i32> {
    match k {
        PoolKey::Text(s) => d.get(s.as_str()).map(|v| *v),
        PoolKey::Bytes(b) => d.get(&b[..]).map(|v| *v),
    }
}

fn model_key(key: &Key) -> PoolKey {
    match key {
        Key::Bytes(b) => PoolKey::Bytes(b.to_vec()),
        Key::Text(t) => PoolKey::Text(t.to_string()),
    }
}

// Property: for any pair list, the dict agrees with last-write-wins
// semantics, items() preserves first-insertion order, and a copy is
// equal while remaining independent.
proptest! {
    #[test]
    fn pairs_round_trip(pairs in proptest::collection::vec((arb_key(), any::<i32>()), 0..40)) {
        let mut d: StrDict<i32> = StrDict::new();
        let mut last: HashMap<PoolKey, i32> = HashMap::new();
        let mut order: Vec<PoolKey> = Vec::new();

        for (k, v) in &pairs {
            set(&mut d, k, *v);
            if last.insert(k.clone(), *v).is_none() {
                order.push(k.clone());
            }
        }

        prop_assert_eq!(d.len(), last.len());
        for (k, v) in &last {
            prop_assert_eq!(get(&d, k), Some(*v));
        }

        let got_order: Vec<PoolKey> = d.keys().iter().map(|k| model_key(k)).collect();
        prop_assert_eq!(&got_order, &order);

        let copy = d.copy().unwrap();
        prop_assert!(copy == d);

        // removing from the copy leaves the original intact
        let mut copy = copy;
        for k in &order {
            match k {
                PoolKey::Text(s) => copy.remove(s.as_str()),
                PoolKey::Bytes(b) => copy.remove(&b[..]),
            };
        }
        prop_assert!(copy.is_empty());
        prop_assert_eq!(d.len(), last.len());
    }
}

// Property: set-then-remove of every key leaves an empty dict with no
// stale hits, and clear() is equivalent.
proptest! {
    #[test]
    fn remove_all_empties(pairs in proptest::collection::vec((arb_key(), any::<i32>()), 0..40)) {
        let mut d: StrDict<i32> = StrDict::new();
        for (k, v) in &pairs {
            set(&mut d, k, *v);
        }
        let keys: Vec<PoolKey> = d.keys().iter().map(|k| model_key(k)).collect();
        for k in &keys {
            let removed = match k {
                PoolKey::Text(s) => d.remove(s.as_str()),
                PoolKey::Bytes(b) => d.remove(&b[..]),
            };
            prop_assert!(removed.is_some());
        }
        prop_assert!(d.is_empty());
        for (k, _) in &pairs {
            prop_assert_eq!(get(&d, k), None);
        }
    }
}

// Property: equality against a hashbrown mapping holds exactly when the
// content matches, independent of either side's iteration order.
proptest! {
    #[test]
    fn foreign_equality_matches_content(pairs in proptest::collection::vec(("[a-d]{0,4}", any::<i32>()), 0..20)) {
        let mut d: StrDict<i32> = StrDict::new();
        let mut m: hashbrown::HashMap<String, i32> = hashbrown::HashMap::new();
        for (k, v) in &pairs {
            d.set(k.as_str(), Rc::new(*v)).unwrap();
            m.insert(k.clone(), *v);
        }
        prop_assert!(d == m);

        m.insert("@not-a-generated-key".to_string(), 0);
        prop_assert!(!(d == m));
    }
}

// Property: a text key inserted through &str is retrievable through
// TextBuf and a shared Key object, and its UTF-8 bytes never alias it
// as a byte key.
proptest! {
    #[test]
    fn text_routes_agree_and_bytes_stay_distinct(s in "\\PC{0,6}") {
        let mut d: StrDict<i32> = StrDict::new();
        d.set(s.as_str(), Rc::new(1)).unwrap();

        prop_assert_eq!(d.get(&TextBuf::from(s.as_str())).map(|v| *v), Some(1));
        prop_assert_eq!(d.get(&Rc::new(Key::from(s.as_str()))).map(|v| *v), Some(1));

        // the same bytes as a byte key are a different key
        prop_assert!(!d.contains_key(s.as_bytes()));
        d.set(s.as_bytes(), Rc::new(2)).unwrap();
        prop_assert_eq!(d.len(), 2);
        prop_assert_eq!(d.get(s.as_str()).map(|v| *v), Some(1));
        prop_assert_eq!(d.get(s.as_bytes()).map(|v| *v), Some(2));
    }
}
