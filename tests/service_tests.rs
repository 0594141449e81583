/// SERVICE INTEGRATION TESTS
///
/// The engine-facing facade: begin and finish blocks, collect in between,
/// and check what reaches the broker.

#[cfg(test)]
mod service_tests {
    use exestats::export::{
        decode_payload, CollectingHandler, MemoryBroker, PublishOutcome, RetryPolicy, StatsConsumer,
    };
    use exestats::types::*;
    use exestats::{BlockStatsService, StatsConfig};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn config() -> StatsConfig {
        let mut config = StatsConfig::default();
        config.collector.enabled = true;
        config.exporter.retry = RetryPolicy { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 2 };
        config.consumer.retry = config.exporter.retry.clone();
        config
    }

    #[tokio::test]
    async fn test_finished_blocks_are_exported_once() {
        let broker = MemoryBroker::new();
        let service = BlockStatsService::start(&config(), Arc::new(broker.clone()));

        service.begin_block(7);
        let store = Arc::clone(service.store());
        let writer = tokio::task::spawn_blocking(move || {
            for i in 0..10u64 {
                store.collect_restricting_release_item(7, Address::from_low_u64_be(i), Amount(i as u128));
            }
        });
        writer.await.unwrap();

        assert_eq!(service.finish_block(7, Some(BlockType::General)), Some(PublishOutcome::Queued));
        assert_eq!(service.finish_block(7, Some(BlockType::General)), None);
        assert_eq!(service.finish_block(8, None), None);

        let stats = service.shutdown().await;
        assert_eq!(stats.published, 1);

        let messages = broker.messages(&config().exporter.topic);
        assert_eq!(messages.len(), 1);
        let payload = decode_payload(&messages[0].payload).unwrap();
        assert_eq!(payload.block_number, 7);
        let releases = &payload.data.restricting_release_item_list;
        assert_eq!(releases.len(), 10);
        assert_eq!(releases[9].release_amount, Amount(9));
    }

    #[tokio::test]
    async fn test_disabled_collector_exports_nothing() {
        let broker = MemoryBroker::new();
        let mut config = config();
        config.collector.enabled = false;
        let service = BlockStatsService::start(&config, Arc::new(broker.clone()));

        service.begin_block(1);
        service.store().collect_duplicated_sign_slashing_setting(1, 2000, 60);
        assert_eq!(service.finish_block(1, None), None);
        let stats = service.shutdown().await;
        assert_eq!(stats.queued, 0);
        assert_eq!(broker.topic_len(&config.exporter.topic), 0);
    }

    #[tokio::test]
    async fn test_consumer_reads_what_the_service_exported() {
        let broker = MemoryBroker::new();
        let config = config();
        let service = BlockStatsService::start(&config, Arc::new(broker.clone()));
        for block in 1..=3 {
            service.begin_block(block);
            service.store().collect_zero_slashing_items(
                block,
                vec![ZeroSlashingItem { node_id: NodeId::repeat_byte(block as u8), slashing_amount: Amount(block as u128) }],
            );
            service.finish_block(block, None);
        }
        service.shutdown().await;
        broker.close();

        let consumer = StatsConsumer::new(Arc::new(broker), config.consumer.clone());
        let mut handler = CollectingHandler::default();
        let stats = consumer.run(&mut handler, CancellationToken::new()).await;
        assert_eq!(stats.handled, 3);
        assert_eq!(
            handler.payloads[2].data.zero_slashing_item_list[0].node_id,
            NodeId::repeat_byte(3)
        );
    }
}
