use rustc_hash::FxHashMap;

pub type FastMap<K, V> = FxHashMap<K, V>;
