/// BLOCK LIFECYCLE INTEGRATION TESTS
///
/// These tests verify:
/// - A full init/collect/pop cycle returns exactly what was collected, in order
/// - Concurrent writers never lose an append
/// - Writers on different blocks never see each other's data
/// - A disabled store holds nothing

#[cfg(test)]
mod block_lifecycle_tests {
    use exestats_collector::{BlockState, BlockStatsStore, CollectorConfig};
    use exestats_types::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    fn address() -> Address {
        Address::parse_hex("0xc9e1c2b330cf7e759f2493c5c754b34d98b07f93").unwrap()
    }

    fn node_id() -> NodeId {
        NodeId::parse_hex(
            "0x362003c50ed3a523cdede37a001803b8f0fed27cb402b3d6127a1a96661ec202318f68f4c76d9b0bfbabfd551a178d4335eaeaa9b7981a4df30dfc8c0bfe3384",
        )
        .unwrap()
    }

    fn h(byte: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        Hash(bytes)
    }

    #[test]
    fn test_block_100_scenario() {
        let store = BlockStatsStore::new(CollectorConfig::enabled());
        let block = 100;
        let value = Amount(3_000_000_000_000_000_000_000);

        store.init(block);
        store.collect_restricting_release_item(block, address(), Amount(111));
        store.collect_unstaking_refund_item(block, node_id(), address(), 222);
        store.collect_unstaking_refund_item(block, node_id(), address(), 111);
        store.collect_duplicated_sign_slashing_setting(block, 2000, 60);
        store.collect_duplicated_sign_slashing_setting(block, 1, 1);

        let reward = RewardData {
            block_reward_amount: Amount(12),
            staking_reward_amount: Amount(12),
            candidate_info_list: vec![CandidateInfo { node_id: node_id(), miner_address: address() }],
        };
        store.collect_reward_data(block, reward.clone());

        let mut issuance = AdditionalIssuanceData {
            additional_no: 1,
            additional_base: Amount(1_000_000),
            additional_rate: 10,
            additional_amount: Amount(100_000),
            issuance_item_list: Vec::new(),
        };
        issuance.add_issuance_item(
            Address::parse_hex("0x1000000000000000000000000000000000000003").unwrap(),
            Amount(10_000),
        );
        store.collect_additional_issuance(block, issuance.clone());

        for _ in 0..3 {
            store.collect_embed_transfer_tx(block, h(0x01), address(), address(), value);
        }
        store.collect_embed_contract_tx(block, h(0x03), address(), address(), vec![1, 2, 3, 4, 5]);

        let data = store.pop(block).expect("record for block 100");

        assert_eq!(data.restricting_release_item_list.len(), 1);
        assert_eq!(data.restricting_release_item_list[0].release_amount, Amount(111));

        assert_eq!(data.unstaking_refund_item_list.len(), 2);
        assert_eq!(data.unstaking_refund_item_list[0].refund_epoch_no, 222);
        assert_eq!(data.unstaking_refund_item_list[1].refund_epoch_no, 111);

        let setting = data.duplicated_sign_slashing_setting.unwrap();
        assert_eq!(setting.penalty_ratio_by_valid_stakings, 2000);
        assert_eq!(setting.reward_ratio_by_penalties, 60);

        assert_eq!(data.reward_data, Some(reward));
        assert_eq!(data.additional_issuance_data, Some(issuance));

        let transfers = &data.embed_transfer_tx_map[&h(0x01)];
        assert_eq!(transfers.len(), 3);
        assert!(transfers.iter().all(|t| t.amount == value && t.from == address()));
        assert_eq!(data.embed_contract_tx_map[&h(0x03)].len(), 1);
        assert_eq!(data.embed_contract_tx_map[&h(0x03)][0].input, vec![1, 2, 3, 4, 5]);

        assert!(store.pop(block).is_none());
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let store = Arc::new(BlockStatsStore::new(CollectorConfig::enabled()));
        store.init(1);

        const WRITERS: u64 = 8;
        const PER_WRITER: u64 = 250;

        let handles: Vec<_> = (0..WRITERS)
            .map(|writer| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for seq in 0..PER_WRITER {
                        store.collect_unstaking_refund_item(
                            1,
                            NodeId::repeat_byte(writer as u8),
                            Address::zero(),
                            seq,
                        );
                        store.collect_embed_transfer_tx(
                            1,
                            h(writer as u8),
                            Address::zero(),
                            Address::zero(),
                            Amount(seq as u128),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let data = store.pop(1).unwrap();
        assert_eq!(data.unstaking_refund_item_list.len() as u64, WRITERS * PER_WRITER);
        assert_eq!(data.embed_transfer_count() as u64, WRITERS * PER_WRITER);

        // each writer's own sequence stays in call order
        for writer in 0..WRITERS {
            let epochs: Vec<u64> = data
                .unstaking_refund_item_list
                .iter()
                .filter(|item| item.node_id == NodeId::repeat_byte(writer as u8))
                .map(|item| item.refund_epoch_no)
                .collect();
            assert_eq!(epochs, (0..PER_WRITER).collect::<Vec<_>>());

            let amounts: Vec<u128> = data.embed_transfer_tx_map[&h(writer as u8)]
                .iter()
                .map(|t| t.amount.value())
                .collect();
            assert_eq!(amounts, (0..PER_WRITER as u128).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_distinct_blocks_do_not_interfere() {
        let store = Arc::new(BlockStatsStore::new(CollectorConfig::enabled()));
        let blocks: Vec<u64> = (1000..1016).collect();
        for &block in &blocks {
            store.init(block);
        }

        thread::scope(|scope| {
            for &block in &blocks {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..block % 7 + 1 {
                        store.collect_restricting_release_item(
                            block,
                            Address::from_low_u64_be(block),
                            Amount(i as u128),
                        );
                    }
                });
            }
        });

        for &block in &blocks {
            let data = store.pop(block).unwrap();
            assert_eq!(data.restricting_release_item_list.len() as u64, block % 7 + 1);
            assert!(data
                .restricting_release_item_list
                .iter()
                .all(|item| item.dest_address == Address::from_low_u64_be(block)));
        }
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_pop_racing_collectors_never_resurrects() {
        let store = Arc::new(BlockStatsStore::new(CollectorConfig::enabled()));
        store.init(77);

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..10_000u128 {
                    store.collect_restricting_release_item(77, Address::zero(), Amount(i));
                }
            })
        };
        let popped = store.pop(77).unwrap();
        writer.join().unwrap();

        // whatever landed before the pop is a contiguous prefix
        for (i, item) in popped.restricting_release_item_list.iter().enumerate() {
            assert_eq!(item.release_amount, Amount(i as u128));
        }
        assert_eq!(store.state(77), BlockState::Retrieved);
        assert!(store.pop(77).is_none());
    }

    #[test]
    fn test_disabled_store_stays_empty() {
        let store = BlockStatsStore::disabled();
        for block in 0..100 {
            store.init(block);
            store.collect_reward_data(block, RewardData::default());
            store.collect_embed_contract_tx(block, h(1), Address::zero(), Address::zero(), vec![1]);
        }
        for block in 0..100 {
            assert!(store.pop(block).is_none());
        }
        assert!(store.active_blocks().is_empty());
    }

    proptest! {
        #[test]
        fn prop_transfers_keep_call_order(calls in prop::collection::vec((0u8..4, any::<u64>()), 0..64)) {
            let store = BlockStatsStore::new(CollectorConfig::enabled());
            store.init(9);
            for (key, amount) in &calls {
                store.collect_embed_transfer_tx(9, h(*key), Address::zero(), Address::zero(), Amount::from(*amount));
            }
            let data = store.pop(9).unwrap();
            for key in 0u8..4 {
                let expected: Vec<u64> = calls.iter().filter(|(k, _)| *k == key).map(|(_, a)| *a).collect();
                let got: Vec<u64> = data
                    .embed_transfer_tx_map
                    .get(&h(key))
                    .map(|txs| txs.iter().map(|t| t.amount.value() as u64).collect())
                    .unwrap_or_default();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
