// EXECUTION SIDE-EFFECT RECORD
//
// One `ExeBlockData` exists per block while that block executes. Lists keep
// insertion order; the tx-hash maps keep first-insertion key order and the
// call order of entries under each key. Optional and empty fields are
// omitted when serialized so presence is distinguishable from absence.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Amount, Hash, NodeAddress, NodeId};

/// Ordered map from originating transaction hash to the entries it caused.
pub type TxMap<T> = IndexMap<Hash, Vec<T>>;

/// Position of a block in the consensus/settlement schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockType {
    Genesis,
    General,
    ConsensusBegin,
    ConsensusElection,
    ConsensusEnd,
    EpochBegin,
    EpochEnd,
    EndOfYear,
}

impl BlockType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Genesis => "genesis",
            Self::General => "general",
            Self::ConsensusBegin => "consensus_begin",
            Self::ConsensusElection => "consensus_election",
            Self::ConsensusEnd => "consensus_end",
            Self::EpochBegin => "epoch_begin",
            Self::EpochEnd => "epoch_end",
            Self::EndOfYear => "end_of_year",
        }
    }

    /// Blocks at which staking rewards or refunds are settled.
    pub fn is_settlement_boundary(&self) -> bool {
        matches!(self, Self::EpochEnd | Self::EndOfYear)
    }
}

/// Value moved by contract execution without a top-level transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedTransferTx {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/// Contract-to-contract call made while executing an outer transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedContractTx {
    pub from: Address,
    pub contract_address: Address,
    #[serde(with = "hex_bytes")]
    pub input: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocItem {
    pub address: Address,
    pub amount: Amount,
}

/// Genesis allocations, only recorded for block 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisData {
    #[serde(default)]
    pub alloc_item_list: Vec<AllocItem>,
}

impl GenesisData {
    pub fn add_alloc_item(&mut self, address: Address, amount: Amount) {
        self.alloc_item_list.push(AllocItem { address, amount });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceItem {
    /// Receiver of this share of the issuance
    pub address: Address,
    pub amount: Amount,
}

/// Inflationary issuance for one issuance cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalIssuanceData {
    /// Issuance cycle number
    pub additional_no: u32,
    /// Supply the rate is applied to
    pub additional_base: Amount,
    /// Rate in units of 1/10000
    pub additional_rate: u16,
    pub additional_amount: Amount,
    #[serde(default)]
    pub issuance_item_list: Vec<IssuanceItem>,
}

impl AdditionalIssuanceData {
    pub fn add_issuance_item(&mut self, address: Address, amount: Amount) {
        self.issuance_item_list.push(IssuanceItem { address, amount });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInfo {
    pub node_id: NodeId,
    /// Payout address
    pub miner_address: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardData {
    pub block_reward_amount: Amount,
    /// Staking reward for every candidate across the settlement cycle
    pub staking_reward_amount: Amount,
    #[serde(default)]
    pub candidate_info_list: Vec<CandidateInfo>,
}

/// Penalty for a validator that failed to produce its blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroSlashingItem {
    pub node_id: NodeId,
    /// Deducted from the validator's stake
    pub slashing_amount: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatedSignSlashingSetting {
    /// penalty = valid stake * ratio / 10000
    pub penalty_ratio_by_valid_stakings: u32,
    /// reporter reward = penalty * ratio / 100
    pub reward_ratio_by_penalties: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakingRefundItem {
    pub node_id: NodeId,
    pub node_address: NodeAddress,
    /// Settlement epoch whose last block actually returns the stake
    pub refund_epoch_no: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakingFrozenItem {
    pub node_id: NodeId,
    pub node_address: NodeAddress,
    /// Epoch the freeze ends
    pub frozen_epoch_no: u64,
    /// True when the node is frozen for recovery rather than for exit
    pub recovery: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictingReleaseItem {
    pub dest_address: Address,
    pub release_amount: Amount,
}

/// Side effects collected while executing one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExeBlockData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_data: Option<GenesisData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_issuance_data: Option<AdditionalIssuanceData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_data: Option<RewardData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zero_slashing_item_list: Vec<ZeroSlashingItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicated_sign_slashing_setting: Option<DuplicatedSignSlashingSetting>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unstaking_refund_item_list: Vec<UnstakingRefundItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub staking_frozen_item_list: Vec<StakingFrozenItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricting_release_item_list: Vec<RestrictingReleaseItem>,
    /// Value attached to a contract call or deployment, or moved by a
    /// contract's internal transfer.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty", with = "crate::tx_map")]
    pub embed_transfer_tx_map: TxMap<EmbedTransferTx>,
    /// Calls the outer transaction made into other contracts, built-ins
    /// included.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty", with = "crate::tx_map")]
    pub embed_contract_tx_map: TxMap<EmbedContractTx>,
}

impl ExeBlockData {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn embed_transfer_count(&self) -> usize {
        self.embed_transfer_tx_map.values().map(Vec::len).sum()
    }

    pub fn embed_contract_count(&self) -> usize {
        self.embed_contract_tx_map.values().map(Vec::len).sum()
    }
}

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExeBlockData {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let mut data = ExeBlockData::new();
        data.restricting_release_item_list.push(RestrictingReleaseItem {
            dest_address: a,
            release_amount: Amount(111),
        });
        data.embed_transfer_tx_map
            .entry(Hash::repeat_byte(9))
            .or_default()
            .push(EmbedTransferTx { from: a, to: b, amount: Amount(5) });
        data.embed_transfer_tx_map
            .entry(Hash::repeat_byte(1))
            .or_default()
            .push(EmbedTransferTx { from: b, to: a, amount: Amount(6) });
        data.embed_contract_tx_map
            .entry(Hash::repeat_byte(3))
            .or_default()
            .push(EmbedContractTx { from: a, contract_address: b, input: vec![1, 2, 3, 4, 5] });
        data
    }

    #[test]
    fn empty_record_serializes_to_empty_object() {
        let json = serde_json::to_string(&ExeBlockData::new()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn absent_fields_stay_absent() {
        let json = serde_json::to_value(sample()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("rewardData"));
        assert!(!obj.contains_key("additionalIssuanceData"));
        assert!(!obj.contains_key("zeroSlashingItemList"));
        assert!(obj.contains_key("restrictingReleaseItemList"));

        let back: ExeBlockData = serde_json::from_value(json).unwrap();
        assert!(back.reward_data.is_none());
        assert_eq!(back, sample());
    }

    #[test]
    fn tx_maps_keep_key_order_on_the_wire() {
        let json = serde_json::to_value(sample()).unwrap();
        let pairs = json["embedTransferTxMap"].as_array().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0]["txHash"], Hash::repeat_byte(9).to_hex());
        assert_eq!(pairs[1]["txHash"], Hash::repeat_byte(1).to_hex());
        assert_eq!(json["embedContractTxMap"][0]["txs"][0]["input"], "0x0102030405");
    }

    #[test]
    fn counts_cover_every_hash() {
        let mut data = sample();
        data.embed_transfer_tx_map
            .entry(Hash::repeat_byte(9))
            .or_default()
            .push(EmbedTransferTx { from: Address::zero(), to: Address::zero(), amount: Amount::ZERO });
        assert_eq!(data.embed_transfer_count(), 3);
        assert_eq!(data.embed_contract_count(), 1);
        assert!(!data.is_empty());
    }

    #[test]
    fn issuance_items_append_in_order() {
        let mut issuance = AdditionalIssuanceData {
            additional_no: 1,
            additional_base: Amount(1_000_000),
            additional_rate: 10,
            additional_amount: Amount(100_000),
            ..Default::default()
        };
        issuance.add_issuance_item(Address::repeat_byte(3), Amount(10_000));
        issuance.add_issuance_item(Address::repeat_byte(4), Amount(90_000));
        assert_eq!(issuance.issuance_item_list[0].amount, Amount(10_000));
        assert_eq!(issuance.issuance_item_list[1].address, Address::repeat_byte(4));
    }

    #[test]
    fn settlement_boundaries() {
        assert!(BlockType::EpochEnd.is_settlement_boundary());
        assert!(!BlockType::General.is_settlement_boundary());
        assert_eq!(serde_json::to_string(&BlockType::EndOfYear).unwrap(), "\"endOfYear\"");
    }
}
