//! Record types for the per-block execution side-effect collector.
//!
//! A block's side effects (slashing, unstaking refunds, restricting
//! releases, issuance, rewards, embedded transfers and contract calls) are
//! accumulated into one [`ExeBlockData`] while the block executes, then
//! handed off once for export.

pub mod primitives;
pub mod record;
pub mod tx_map;

pub use primitives::{Address, Amount, Hash, NodeAddress, NodeId, ParseError};
pub use record::{
    AdditionalIssuanceData, AllocItem, BlockType, CandidateInfo, DuplicatedSignSlashingSetting,
    EmbedContractTx, EmbedTransferTx, ExeBlockData, GenesisData, IssuanceItem,
    RestrictingReleaseItem, RewardData, StakingFrozenItem, TxMap, UnstakingRefundItem,
    ZeroSlashingItem,
};
