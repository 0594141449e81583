// BLOCK SIDE-EFFECT STORE
//
// Each block number moves through Absent -> Active -> Retrieved:
// - init:     Absent -> Active (no-op when Active or Retrieved)
// - collect:  Active -> Active (no-op otherwise)
// - pop:      Active -> Retrieved, handing the record out
//
// Retrieved markers are pruned oldest-first once there are more than
// `retired_capacity` of them. Pruning raises `retired_floor` past the pruned
// block number, and `init` refuses anything below the floor, so a popped
// block stays closed after its marker is gone.
//
// Every record lives in a DashMap shard and is only ever touched while that
// shard's lock is held, so a collect can never observe a half-popped record
// and a pop can never race an append.

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use exestats_types::{
    AdditionalIssuanceData, Address, Amount, DuplicatedSignSlashingSetting, EmbedContractTx,
    EmbedTransferTx, ExeBlockData, GenesisData, Hash, NodeAddress, NodeId,
    RestrictingReleaseItem, RewardData, StakingFrozenItem, UnstakingRefundItem,
    ZeroSlashingItem,
};

use crate::config::{CollectorConfig, SingletonPolicy};

/// Lifecycle position of one block number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Absent,
    Active,
    Retrieved,
}

/// How a second write to a once-per-block field was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SingletonConflict {
    Ignored,
    Replaced,
}

enum BlockSlot {
    Active(Box<ExeBlockData>),
    Retrieved,
}

/// Registry of in-flight collection records, keyed by block number.
///
/// Shared between the engine and every execution context, usually behind an
/// `Arc`. All operations take `&self`.
pub struct BlockStatsStore {
    enabled: AtomicBool,
    policy: SingletonPolicy,
    retired_capacity: usize,
    slots: DashMap<u64, BlockSlot>,
    /// Popped block numbers, oldest first
    retired: Mutex<VecDeque<u64>>,
    /// One past the highest pruned block number; 0 until something is pruned
    retired_floor: AtomicU64,
}

impl BlockStatsStore {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            policy: config.singleton_policy,
            retired_capacity: config.retired_capacity.max(1),
            slots: DashMap::new(),
            retired: Mutex::new(VecDeque::new()),
            retired_floor: AtomicU64::new(0),
        }
    }

    /// A store that never records anything.
    pub fn disabled() -> Self {
        Self::new(CollectorConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn singleton_policy(&self) -> SingletonPolicy {
        self.policy
    }

    /// Turns collection on or off. Turning it off discards every in-flight
    /// record. Popped blocks stay closed across the toggle.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        if was && !enabled {
            let dropped = self.active_count();
            self.slots.retain(|_, slot| matches!(slot, BlockSlot::Retrieved));
            info!("Block stats collection disabled, discarded {} in-flight records", dropped);
        } else if !was && enabled {
            info!("Block stats collection enabled");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Opens an empty record for `block_number`.
    ///
    /// An already active record is left untouched, and a block that has been
    /// popped is never reopened.
    pub fn init(&self, block_number: u64) {
        if !self.is_enabled() {
            return;
        }
        match self.slots.entry(block_number) {
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                // A concurrent disable may have emptied the registry since the
                // check above; the shard lock makes this re-check final.
                if !self.is_enabled() {
                    return;
                }
                if self.is_below_floor(block_number) {
                    warn!("Block {} was already popped, refusing to reopen its record", block_number);
                    return;
                }
                entry.insert(BlockSlot::Active(Box::default()));
                debug!("InitExeBlockData blockNumber={}", block_number);
            }
            dashmap::mapref::entry::Entry::Occupied(entry) => match entry.get() {
                BlockSlot::Active(_) => {
                    debug!("Record for block {} already active, keeping collected data", block_number);
                }
                BlockSlot::Retrieved => {
                    warn!("Block {} was already popped, refusing to reopen its record", block_number);
                }
            },
        }
    }

    /// Removes and returns the record for `block_number`.
    ///
    /// This is the only way a record leaves the store. A second call, or a
    /// call for a block that was never initialized, returns `None`.
    pub fn pop(&self, block_number: u64) -> Option<ExeBlockData> {
        if !self.is_enabled() {
            return None;
        }
        let data = {
            let mut slot = match self.slots.get_mut(&block_number) {
                Some(slot) => slot,
                None => {
                    debug!("PopExeBlockData: no record for block {}", block_number);
                    return None;
                }
            };
            match std::mem::replace(&mut *slot, BlockSlot::Retrieved) {
                BlockSlot::Active(data) => data,
                BlockSlot::Retrieved => {
                    debug!("PopExeBlockData: block {} already popped", block_number);
                    return None;
                }
            }
        };
        self.retire(block_number);
        debug!(
            "PopExeBlockData blockNumber={} restrictingRelease={} unstakingRefund={} embedTransfers={} embedContracts={}",
            block_number,
            data.restricting_release_item_list.len(),
            data.unstaking_refund_item_list.len(),
            data.embed_transfer_count(),
            data.embed_contract_count(),
        );
        Some(*data)
    }

    /// Snapshot of an active record, for diagnostics only. Export must go
    /// through [`pop`](Self::pop).
    pub fn peek(&self, block_number: u64) -> Option<ExeBlockData> {
        if !self.is_enabled() {
            return None;
        }
        match self.slots.get(&block_number).as_deref() {
            Some(BlockSlot::Active(data)) => Some((**data).clone()),
            _ => None,
        }
    }

    /// Blocks below the retirement floor report `Retrieved` even after
    /// their marker has been pruned.
    pub fn state(&self, block_number: u64) -> BlockState {
        match self.slots.get(&block_number).as_deref() {
            Some(BlockSlot::Active(_)) => BlockState::Active,
            Some(BlockSlot::Retrieved) => BlockState::Retrieved,
            None if self.is_below_floor(block_number) => BlockState::Retrieved,
            None => BlockState::Absent,
        }
    }

    /// Block numbers with an open record, ascending.
    pub fn active_blocks(&self) -> Vec<u64> {
        let mut blocks: Vec<u64> = self
            .slots
            .iter()
            .filter(|entry| matches!(entry.value(), BlockSlot::Active(_)))
            .map(|entry| *entry.key())
            .collect();
        blocks.sort_unstable();
        blocks
    }

    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| matches!(entry.value(), BlockSlot::Active(_)))
            .count()
    }

    fn is_below_floor(&self, block_number: u64) -> bool {
        block_number < self.retired_floor.load(Ordering::Acquire)
    }

    fn retire(&self, block_number: u64) {
        let mut retired = self.retired.lock();
        retired.push_back(block_number);
        while retired.len() > self.retired_capacity {
            if let Some(oldest) = retired.pop_front() {
                // Raise the floor before the marker goes.
                self.retired_floor
                    .fetch_max(oldest.saturating_add(1), Ordering::AcqRel);
                self.slots
                    .remove_if(&oldest, |_, slot| matches!(slot, BlockSlot::Retrieved));
            }
        }
    }

    /// Runs `mutate` against the active record for `block_number` while its
    /// shard lock is held. `None` when there was no active record.
    fn apply<R, F>(&self, block_number: u64, kind: &'static str, mutate: F) -> Option<R>
    where
        F: FnOnce(&mut ExeBlockData) -> R,
    {
        if !self.is_enabled() {
            return None;
        }
        let reason = match self.slots.get_mut(&block_number) {
            Some(mut slot) => match &mut *slot {
                BlockSlot::Active(data) => return Some(mutate(data)),
                BlockSlot::Retrieved => "already popped",
            },
            None => "no active record",
        };
        debug!("{}: block {} {}, dropping", kind, block_number, reason);
        None
    }

    fn set_singleton<T>(policy: SingletonPolicy, field: &mut Option<T>, value: T) -> Option<SingletonConflict> {
        if field.is_none() {
            *field = Some(value);
            return None;
        }
        match policy {
            SingletonPolicy::FirstWins => Some(SingletonConflict::Ignored),
            SingletonPolicy::LastWins => {
                *field = Some(value);
                Some(SingletonConflict::Replaced)
            }
        }
    }

    fn report_conflict(kind: &'static str, block_number: u64, conflict: Option<SingletonConflict>) {
        match conflict {
            Some(SingletonConflict::Ignored) => {
                warn!("{}: block {} already set, keeping the first value", kind, block_number)
            }
            Some(SingletonConflict::Replaced) => {
                warn!("{}: block {} already set, replaced by the latest value", kind, block_number)
            }
            None => {}
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // COLLECTION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn collect_genesis_data(&self, block_number: u64, genesis: GenesisData) {
        let policy = self.policy;
        debug!(
            "CollectGenesisData blockNumber={} allocItems={}",
            block_number,
            genesis.alloc_item_list.len()
        );
        let conflict = self
            .apply(block_number, "CollectGenesisData", |data| {
                Self::set_singleton(policy, &mut data.genesis_data, genesis)
            })
            .flatten();
        Self::report_conflict("CollectGenesisData", block_number, conflict);
    }

    pub fn collect_additional_issuance(&self, block_number: u64, issuance: AdditionalIssuanceData) {
        let policy = self.policy;
        debug!(
            "CollectAdditionalIssuance blockNumber={} additionalNo={} amount={}",
            block_number, issuance.additional_no, issuance.additional_amount
        );
        let conflict = self
            .apply(block_number, "CollectAdditionalIssuance", |data| {
                Self::set_singleton(policy, &mut data.additional_issuance_data, issuance)
            })
            .flatten();
        Self::report_conflict("CollectAdditionalIssuance", block_number, conflict);
    }

    pub fn collect_reward_data(&self, block_number: u64, reward: RewardData) {
        let policy = self.policy;
        debug!(
            "CollectRewardData blockNumber={} blockReward={} stakingReward={} candidates={}",
            block_number,
            reward.block_reward_amount,
            reward.staking_reward_amount,
            reward.candidate_info_list.len()
        );
        let conflict = self
            .apply(block_number, "CollectRewardData", |data| {
                Self::set_singleton(policy, &mut data.reward_data, reward)
            })
            .flatten();
        Self::report_conflict("CollectRewardData", block_number, conflict);
    }

    /// Replaces the block's whole zero-production slashing list.
    pub fn collect_zero_slashing_items(&self, block_number: u64, items: Vec<ZeroSlashingItem>) {
        debug!("CollectZeroSlashingItem blockNumber={} items={}", block_number, items.len());
        self.apply(block_number, "CollectZeroSlashingItem", |data| {
            data.zero_slashing_item_list = items;
        });
    }

    pub fn collect_duplicated_sign_slashing_setting(
        &self,
        block_number: u64,
        penalty_ratio_by_valid_stakings: u32,
        reward_ratio_by_penalties: u32,
    ) {
        let policy = self.policy;
        debug!(
            "CollectDuplicatedSignSlashingSetting blockNumber={} penaltyRatioByValidStakings={} rewardRatioByPenalties={}",
            block_number, penalty_ratio_by_valid_stakings, reward_ratio_by_penalties
        );
        let setting = DuplicatedSignSlashingSetting {
            penalty_ratio_by_valid_stakings,
            reward_ratio_by_penalties,
        };
        let conflict = self
            .apply(block_number, "CollectDuplicatedSignSlashingSetting", |data| {
                Self::set_singleton(policy, &mut data.duplicated_sign_slashing_setting, setting)
            })
            .flatten();
        Self::report_conflict("CollectDuplicatedSignSlashingSetting", block_number, conflict);
    }

    pub fn collect_unstaking_refund_item(
        &self,
        block_number: u64,
        node_id: NodeId,
        node_address: NodeAddress,
        refund_epoch_no: u64,
    ) {
        debug!(
            "CollectUnstakingRefundItem blockNumber={} nodeId={:?} nodeAddress={} refundEpochNo={}",
            block_number,
            node_id,
            node_address.to_hex(),
            refund_epoch_no
        );
        self.apply(block_number, "CollectUnstakingRefundItem", |data| {
            data.unstaking_refund_item_list.push(UnstakingRefundItem {
                node_id,
                node_address,
                refund_epoch_no,
            });
        });
    }

    pub fn collect_staking_frozen_item(
        &self,
        block_number: u64,
        node_id: NodeId,
        node_address: NodeAddress,
        frozen_epoch_no: u64,
        recovery: bool,
    ) {
        debug!(
            "CollectStakingFrozenItem blockNumber={} nodeId={:?} frozenEpochNo={} recovery={}",
            block_number, node_id, frozen_epoch_no, recovery
        );
        self.apply(block_number, "CollectStakingFrozenItem", |data| {
            data.staking_frozen_item_list.push(StakingFrozenItem {
                node_id,
                node_address,
                frozen_epoch_no,
                recovery,
            });
        });
    }

    pub fn collect_restricting_release_item(
        &self,
        block_number: u64,
        dest_address: Address,
        release_amount: Amount,
    ) {
        debug!(
            "CollectRestrictingReleaseItem blockNumber={} destAddress={} releaseAmount={}",
            block_number,
            dest_address.to_hex(),
            release_amount
        );
        self.apply(block_number, "CollectRestrictingReleaseItem", |data| {
            data.restricting_release_item_list.push(RestrictingReleaseItem {
                dest_address,
                release_amount,
            });
        });
    }

    pub fn collect_embed_transfer_tx(
        &self,
        block_number: u64,
        tx_hash: Hash,
        from: Address,
        to: Address,
        amount: Amount,
    ) {
        debug!(
            "CollectEmbedTransferTx blockNumber={} txHash={} from={} to={} amount={}",
            block_number,
            tx_hash.to_hex(),
            from.to_hex(),
            to.to_hex(),
            amount
        );
        self.apply(block_number, "CollectEmbedTransferTx", |data| {
            data.embed_transfer_tx_map
                .entry(tx_hash)
                .or_default()
                .push(EmbedTransferTx { from, to, amount });
        });
    }

    pub fn collect_embed_contract_tx(
        &self,
        block_number: u64,
        tx_hash: Hash,
        from: Address,
        contract_address: Address,
        input: Vec<u8>,
    ) {
        debug!(
            "CollectEmbedContractTx blockNumber={} txHash={} from={} contractAddress={} input=0x{}",
            block_number,
            tx_hash.to_hex(),
            from.to_hex(),
            contract_address.to_hex(),
            hex_prefix(&input)
        );
        self.apply(block_number, "CollectEmbedContractTx", |data| {
            data.embed_contract_tx_map
                .entry(tx_hash)
                .or_default()
                .push(EmbedContractTx { from, contract_address, input });
        });
    }
}

impl Default for BlockStatsStore {
    fn default() -> Self {
        Self::disabled()
    }
}

/// First bytes of a call input, enough to show the selector in logs.
fn hex_prefix(input: &[u8]) -> String {
    const SHOWN: usize = 16;
    let mut out = hex::encode(&input[..input.len().min(SHOWN)]);
    if input.len() > SHOWN {
        out.push_str("...");
    }
    out
}
