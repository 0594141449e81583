//! Ordered `tx hash -> entries` maps, serialized as an array of pairs.
//!
//! `[{"txHash": "0x..", "txs": [..]}, ..]` keeps key order explicit on the
//! wire instead of relying on a consumer's JSON object ordering.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::primitives::Hash;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PairRef<'a, T> {
    tx_hash: &'a Hash,
    txs: &'a [T],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair<T> {
    tx_hash: Hash,
    txs: Vec<T>,
}

pub fn serialize<S, T>(map: &IndexMap<Hash, Vec<T>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    serializer.collect_seq(map.iter().map(|(tx_hash, txs)| PairRef { tx_hash, txs }))
}

/// Repeated keys are merged in arrival order.
pub fn deserialize<'de, D, T>(deserializer: D) -> Result<IndexMap<Hash, Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let pairs: Vec<Pair<T>> = Vec::deserialize(deserializer)?;
    let mut map: IndexMap<Hash, Vec<T>> = IndexMap::with_capacity(pairs.len());
    for pair in pairs {
        map.entry(pair.tx_hash).or_default().extend(pair.txs);
    }
    Ok(map)
}
