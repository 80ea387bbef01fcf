//! A map of dense integer key to value, implemented as a vector.
//! Used with typed ids (FileId, BuildId) as the backing store of the graph
//! arena, so that cross-references between records are plain indices.

use std::marker::PhantomData;

pub trait Index: From<usize> {
    fn index(&self) -> usize;
}

pub struct DenseMap<K, V> {
    vec: Vec<V>,
    key_type: PhantomData<K>,
}

// Not derived: the derive would demand K: Debug for no reason.
impl<K, V: std::fmt::Debug> std::fmt::Debug for DenseMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.vec.fmt(f)
    }
}

// Not derived: the derive would demand K: Default for no reason.
impl<K, V> Default for DenseMap<K, V> {
    fn default() -> Self {
        DenseMap {
            vec: Vec::new(),
            key_type: PhantomData,
        }
    }
}

impl<K: Index, V> DenseMap<K, V> {
    pub fn new() -> Self {
        DenseMap {
            vec: Vec::new(),
            key_type: PhantomData,
        }
    }

    pub fn get(&self, k: K) -> &V {
        &self.vec[k.index()]
    }

    pub fn get_mut(&mut self, k: K) -> &mut V {
        &mut self.vec[k.index()]
    }

    pub fn lookup(&self, k: K) -> Option<&V> {
        self.vec.get(k.index())
    }

    pub fn next_id(&self) -> K {
        K::from(self.vec.len())
    }

    pub fn push(&mut self, val: V) -> K {
        let id = self.next_id();
        self.vec.push(val);
        id
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> {
        (0..self.vec.len()).map(K::from)
    }
}

impl<K: Index, V: Clone> DenseMap<K, V> {
    pub fn new_sized(n: K, default: V) -> Self {
        let mut m = Self::new();
        m.vec.resize(n.index(), default);
        m
    }

    pub fn set_grow(&mut self, k: K, v: V, default: V) {
        if k.index() >= self.vec.len() {
            self.vec.resize(k.index() + 1, default);
        }
        self.vec[k.index()] = v;
    }
}
