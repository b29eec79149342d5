#![cfg(test)]

// Property tests kept inside the crate so they can check structural
// invariants (offset reachability, load factor, slot accounting) after
// every operation, not just observable behavior.

use core::hash::{BuildHasher, Hasher};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::rc::Rc;

use crate::key::Key;
use crate::{Error, StrDict};

// Keys drawn from both families, including the empty ones and wide
// text, so kind-distinction is exercised continuously.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum PoolKey {
    Text(String),
    Bytes(Vec<u8>),
}

fn model_key(key: &Key) -> PoolKey {
    match key {
        Key::Bytes(b) => PoolKey::Bytes(b.to_vec()),
        Key::Text(t) => PoolKey::Text(t.to_string()),
    }
}

fn dset<S: BuildHasher>(d: &mut StrDict<i32, S>, k: &PoolKey, v: i32) -> Rc<i32> {
    match k {
        PoolKey::Text(s) => d.set(s.as_str(), Rc::new(v)).unwrap(),
        PoolKey::Bytes(b) => d.set(&b[..], Rc::new(v)).unwrap(),
    }
}

fn dset_default<S: BuildHasher>(d: &mut StrDict<i32, S>, k: &PoolKey, v: i32) -> Rc<i32> {
    match k {
        PoolKey::Text(s) => d.set_default(s.as_str(), Rc::new(v)).unwrap(),
        PoolKey::Bytes(b) => d.set_default(&b[..], Rc::new(v)).unwrap(),
    }
}

fn dget<S: BuildHasher>(d: &StrDict<i32, S>, k: &PoolKey) -> Option<Rc<i32>> {
    match k {
        PoolKey::Text(s) => d.get(s.as_str()),
        PoolKey::Bytes(b) => d.get(&b[..]),
    }
}

fn dremove<S: BuildHasher>(d: &mut StrDict<i32, S>, k: &PoolKey) -> Option<Rc<i32>> {
    match k {
        PoolKey::Text(s) => d.remove(s.as_str()),
        PoolKey::Bytes(b) => d.remove(&b[..]),
    }
}

fn dpop<S: BuildHasher>(
    d: &mut StrDict<i32, S>,
    k: &PoolKey,
    default: Option<Rc<i32>>,
) -> Result<Rc<i32>, Error> {
    match k {
        PoolKey::Text(s) => d.pop(s.as_str(), default),
        PoolKey::Bytes(b) => d.pop(&b[..], default),
    }
}

fn dcontains<S: BuildHasher>(d: &StrDict<i32, S>, k: &PoolKey) -> bool {
    match k {
        PoolKey::Text(s) => d.contains_key(s.as_str()),
        PoolKey::Bytes(b) => d.contains_key(&b[..]),
    }
}

#[derive(Clone, Debug)]
enum Op {
    Set(usize, i32),
    SetDefault(usize, i32),
    Remove(usize),
    Get(usize),
    Pop(usize, bool),
    PopFirst,
    Contains(usize),
    Items,
    Clear,
}

fn arb_pool() -> impl Strategy<Value = Vec<PoolKey>> {
    let text = "[a-c]{0,3}".prop_map(PoolKey::Text);
    let bytes = proptest::collection::vec(any::<u8>(), 0..4).prop_map(PoolKey::Bytes);
    let edge = proptest::sample::select(vec![
        PoolKey::Text(String::new()),
        PoolKey::Bytes(Vec::new()),
        PoolKey::Text("caf\u{e9}".into()),
        PoolKey::Text("\u{100}\u{101}".into()),
        PoolKey::Text("\u{1f980}".into()),
        PoolKey::Bytes(b"abc".to_vec()),
        PoolKey::Text("abc".into()),
    ]);
    proptest::collection::vec(prop_oneof![3 => text, 3 => bytes, 2 => edge], 1..=10)
}

fn arb_ops(pool_len: usize) -> impl Strategy<Value = Vec<Op>> {
    let idx = 0..pool_len;
    let op = prop_oneof![
        8 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Set(i, v)),
        3 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::SetDefault(i, v)),
        4 => idx.clone().prop_map(Op::Remove),
        4 => idx.clone().prop_map(Op::Get),
        2 => (idx.clone(), any::<bool>()).prop_map(|(i, b)| Op::Pop(i, b)),
        1 => Just(Op::PopFirst),
        3 => idx.clone().prop_map(Op::Contains),
        2 => Just(Op::Items),
        1 => Just(Op::Clear),
    ];
    proptest::collection::vec(op, 1..120)
}

fn arb_scenario() -> impl Strategy<Value = (Vec<PoolKey>, Vec<Op>)> {
    arb_pool().prop_flat_map(|pool| {
        let len = pool.len();
        arb_ops(len).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Ordered model: a Vec preserving insertion order, searched linearly.
struct Model {
    pairs: Vec<(PoolKey, i32)>,
}

impl Model {
    fn position(&self, k: &PoolKey) -> Option<usize> {
        self.pairs.iter().position(|(mk, _)| mk == k)
    }
}

fn run_ops<S: BuildHasher>(
    dict: &mut StrDict<i32, S>,
    pool: &[PoolKey],
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model = Model { pairs: Vec::new() };
    for op in ops {
        match op {
            Op::Set(i, v) => {
                let k = &pool[i];
                let installed = dset(dict, k, v);
                prop_assert_eq!(*installed, v);
                match model.position(k) {
                    Some(p) => model.pairs[p].1 = v,
                    None => model.pairs.push((k.clone(), v)),
                }
            }
            Op::SetDefault(i, v) => {
                let k = &pool[i];
                let stored = dset_default(dict, k, v);
                match model.position(k) {
                    Some(p) => prop_assert_eq!(*stored, model.pairs[p].1),
                    None => {
                        prop_assert_eq!(*stored, v);
                        model.pairs.push((k.clone(), v));
                    }
                }
            }
            Op::Remove(i) => {
                let k = &pool[i];
                let removed = dremove(dict, k);
                match model.position(k) {
                    Some(p) => {
                        let (_, mv) = model.pairs.remove(p);
                        prop_assert_eq!(removed.map(|r| *r), Some(mv));
                    }
                    None => prop_assert!(removed.is_none()),
                }
            }
            Op::Get(i) => {
                let k = &pool[i];
                let got = dget(dict, k).map(|r| *r);
                let expect = model.position(k).map(|p| model.pairs[p].1);
                prop_assert_eq!(got, expect);
            }
            Op::Pop(i, with_default) => {
                let k = &pool[i];
                let default = with_default.then(|| Rc::new(-999));
                let popped = dpop(dict, k, default);
                match model.position(k) {
                    Some(p) => {
                        let (_, mv) = model.pairs.remove(p);
                        prop_assert_eq!(popped.map(|r| *r), Ok(mv));
                    }
                    None if with_default => prop_assert_eq!(popped.map(|r| *r), Ok(-999)),
                    None => prop_assert_eq!(popped.map(|r| *r), Err(Error::MissingKey)),
                }
            }
            Op::PopFirst => {
                let popped = dict.pop_first();
                if model.pairs.is_empty() {
                    prop_assert!(popped.is_none());
                } else {
                    let (mk, mv) = model.pairs.remove(0);
                    let (k, v) = popped.expect("dict should match non-empty model");
                    prop_assert_eq!(model_key(&k), mk);
                    prop_assert_eq!(*v, mv);
                }
            }
            Op::Contains(i) => {
                let k = &pool[i];
                prop_assert_eq!(dcontains(dict, k), model.position(k).is_some());
            }
            Op::Items => {
                let got: Vec<(PoolKey, i32)> = dict
                    .items()
                    .into_iter()
                    .map(|(k, v)| (model_key(&k), *v))
                    .collect();
                prop_assert_eq!(&got, &model.pairs, "insertion order drifted");
            }
            Op::Clear => {
                dict.clear();
                model.pairs.clear();
            }
        }

        prop_assert_eq!(dict.len(), model.pairs.len());
        prop_assert_eq!(dict.is_empty(), model.pairs.is_empty());
        dict.core.check_invariants();
    }

    let final_items: Vec<(PoolKey, i32)> = dict
        .items()
        .into_iter()
        .map(|(k, v)| (model_key(&k), *v))
        .collect();
    prop_assert_eq!(final_items, model.pairs);
    Ok(())
}

// Property: state-machine equivalence against an insertion-ordered
// model, with structural invariants checked after every operation:
// - offsets stay a power of two >= 8, mask consistent, load < 2/3;
// - every indexed slot is reachable by probing its stored hash;
// - occupied accounting matches the live slot count;
// - byte and text keys with equal bytes never alias;
// - items()/pop_first() observe exact insertion order.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut dict: StrDict<i32> = StrDict::new();
        run_ops(&mut dict, &pool, ops)?;
    }
}

// Collision variant: a constant hasher forces every key onto one probe
// chain, stressing tombstone reuse and chain preservation.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let mut dict: StrDict<i32, ConstBuildHasher> =
            StrDict::with_hasher(ConstBuildHasher);
        run_ops(&mut dict, &pool, ops)?;
    }
}

// Property: update() merges with replace semantics and keeps the
// destination's insertion order for keys it already had; copy() is
// equal to, and independent from, its source.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_update_and_copy(
        left in proptest::collection::vec((arb_pool().prop_map(|p| p[0].clone()), any::<i32>()), 0..12),
        right in proptest::collection::vec((arb_pool().prop_map(|p| p[0].clone()), any::<i32>()), 0..12),
    ) {
        let mut a: StrDict<i32> = StrDict::new();
        let mut b: StrDict<i32> = StrDict::new();
        let mut model = Model { pairs: Vec::new() };
        let mut bmodel = Model { pairs: Vec::new() };

        for (k, v) in &left {
            dset(&mut a, k, *v);
            match model.position(k) {
                Some(p) => model.pairs[p].1 = *v,
                None => model.pairs.push((k.clone(), *v)),
            }
        }
        for (k, v) in &right {
            dset(&mut b, k, *v);
            match bmodel.position(k) {
                Some(p) => bmodel.pairs[p].1 = *v,
                None => bmodel.pairs.push((k.clone(), *v)),
            }
        }

        let snapshot = a.copy().unwrap();
        prop_assert!(snapshot == a);

        a.update(&b).unwrap();
        for (k, v) in &bmodel.pairs {
            match model.position(k) {
                Some(p) => model.pairs[p].1 = *v,
                None => model.pairs.push((k.clone(), *v)),
            }
        }

        let got: Vec<(PoolKey, i32)> = a
            .items()
            .into_iter()
            .map(|(k, v)| (model_key(&k), *v))
            .collect();
        prop_assert_eq!(got, model.pairs);
        a.core.check_invariants();

        // the earlier copy is unaffected by the update
        let snap_items: Vec<(PoolKey, i32)> = snapshot
            .items()
            .into_iter()
            .map(|(k, v)| (model_key(&k), *v))
            .collect();
        let left_model: Vec<(PoolKey, i32)> = {
            let mut m = Model { pairs: Vec::new() };
            for (k, v) in &left {
                match m.position(k) {
                    Some(p) => m.pairs[p].1 = *v,
                    None => m.pairs.push((k.clone(), *v)),
                }
            }
            m.pairs
        };
        prop_assert_eq!(snap_items, left_model);
    }
}
