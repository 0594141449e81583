use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use exestats::collector::BlockStatsStore;
use exestats::export::{
    decode_payload, HandlerError, MemoryBroker, Message, PayloadHandler, StatsConsumer, StatsPayload,
};
use exestats::types::*;
use exestats::{BlockStatsService, StatsConfig};

#[derive(Parser)]
#[command(name = "exestats")]
#[command(about = "Per-block execution side-effect stats", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). EXESTATS__* variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulated engine through the store, exporter, in-process broker and consumer
    Demo {
        /// Number of blocks to execute after genesis
        #[arg(long, default_value_t = 20)]
        blocks: u64,

        /// Blocks per settlement epoch
        #[arg(long, default_value_t = 10)]
        epoch: u64,
    },

    /// Decode a payload file and print a summary
    Decode {
        file: PathBuf,

        /// Print the whole payload as pretty JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = StatsConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Demo { blocks, epoch } => run_demo(config, blocks, epoch.max(1)).await?,
        Commands::Decode { file, json } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let payload = decode_payload(&bytes).with_context(|| format!("decoding {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{}", summarize(&payload));
            }
        }
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}

async fn run_demo(mut config: StatsConfig, blocks: u64, epoch: u64) -> Result<()> {
    if !config.collector.enabled {
        warn!("collector disabled in configuration, enabling it for the demo");
        config.collector.enabled = true;
    }

    let broker = MemoryBroker::new();
    let service = BlockStatsService::start(&config, Arc::new(broker.clone()));

    let cancel = CancellationToken::new();
    let consumer = StatsConsumer::new(Arc::new(broker.clone()), config.consumer.clone());
    let reader = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut handler = SummaryHandler::default();
            let stats = consumer.run(&mut handler, cancel).await;
            (handler, stats)
        })
    };
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    for block in 0..=blocks {
        let block_type = block_type_of(block, epoch);
        service.begin_block(block);
        execute_block(service.store(), block, block_type);
        service.finish_block(block, Some(block_type));
    }

    let exported = service.shutdown().await;
    broker.close();
    let (handler, consumed) = reader.await.context("consumer task")?;

    for line in &handler.lines {
        println!("{}", line);
    }
    info!(
        "demo finished: published={} dropped={} consumed={} decode_errors={}",
        exported.published, exported.dropped, consumed.handled, consumed.decode_errors
    );
    Ok(())
}

fn block_type_of(block: u64, epoch: u64) -> BlockType {
    if block == 0 {
        BlockType::Genesis
    } else if block % epoch == 0 {
        BlockType::EpochEnd
    } else if block % epoch == 1 {
        BlockType::EpochBegin
    } else {
        BlockType::General
    }
}

fn account(seed: u64) -> Address {
    Address::from_low_u64_be(0x1000 + seed)
}

fn validator(seed: u64) -> NodeId {
    NodeId::from_low_u64_be(0x2000 + seed)
}

/// Stands in for the execution engine: a handful of execution contexts
/// write into the store for `block` in parallel.
fn execute_block(store: &Arc<BlockStatsStore>, block: u64, block_type: BlockType) {
    if block_type == BlockType::Genesis {
        let mut genesis = GenesisData::default();
        for i in 0..4 {
            genesis.add_alloc_item(account(i), Amount(1_000_000_000_000_000_000_000));
        }
        store.collect_genesis_data(block, genesis);
        return;
    }

    std::thread::scope(|scope| {
        for context in 0..3u64 {
            let store = Arc::clone(store);
            scope.spawn(move || {
                let tx_hash = Hash::from_low_u64_be(block * 100 + context);
                store.collect_embed_transfer_tx(
                    block,
                    tx_hash,
                    account(context),
                    account(context + 1),
                    Amount(u128::from(block) * 1_000_000_000_000_000_000),
                );
                if context == 0 {
                    store.collect_embed_contract_tx(
                        block,
                        tx_hash,
                        account(context),
                        account(99),
                        vec![0xa9, 0x05, 0x9c, 0xbb],
                    );
                }
            });
        }
    });

    store.collect_restricting_release_item(block, account(block % 4), Amount(u128::from(block) * 10));

    if block_type == BlockType::EpochBegin {
        store.collect_duplicated_sign_slashing_setting(block, 2000, 60);
    }
    if block_type == BlockType::EpochEnd {
        store.collect_reward_data(
            block,
            RewardData {
                block_reward_amount: Amount(2_000_000_000_000_000_000),
                staking_reward_amount: Amount(50_000_000_000_000_000_000),
                candidate_info_list: (0..3)
                    .map(|i| CandidateInfo { node_id: validator(i), miner_address: account(i) })
                    .collect(),
            },
        );
        store.collect_unstaking_refund_item(block, validator(block % 3), account(block % 3), block / 10);
        store.collect_zero_slashing_items(
            block,
            vec![ZeroSlashingItem { node_id: validator(2), slashing_amount: Amount(1_000) }],
        );
    }
}

/// Keeps one summary line per payload, in arrival order.
#[derive(Default)]
struct SummaryHandler {
    lines: Vec<String>,
}

#[async_trait]
impl PayloadHandler for SummaryHandler {
    async fn handle(&mut self, message: &Message, payload: StatsPayload) -> Result<(), HandlerError> {
        if message.key != payload.block_number.to_string().into_bytes() {
            return Err(HandlerError(format!(
                "key {} does not match block {}",
                String::from_utf8_lossy(&message.key),
                payload.block_number
            )));
        }
        self.lines.push(summarize(&payload));
        Ok(())
    }
}

fn summarize(payload: &StatsPayload) -> String {
    let data = &payload.data;
    let block_type = payload.block_type.map(|t| t.name()).unwrap_or("-");
    format!(
        "block {:>6} {:<14} genesis={} reward={} dupSign={} zeroSlash={} refunds={} frozen={} releases={} transfers={} calls={}",
        payload.block_number,
        block_type,
        data.genesis_data.as_ref().map_or(0, |g| g.alloc_item_list.len()),
        data.reward_data.is_some(),
        data.duplicated_sign_slashing_setting.is_some(),
        data.zero_slashing_item_list.len(),
        data.unstaking_refund_item_list.len(),
        data.staking_frozen_item_list.len(),
        data.restricting_release_item_list.len(),
        data.embed_transfer_count(),
        data.embed_contract_count(),
    )
}
