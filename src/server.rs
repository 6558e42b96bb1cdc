use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::block::Block;
use crate::blockchain::Blockchain;
use crate::config::GLOBAL_CONFIG;
use crate::error::{ChainError, ChainResult};
use crate::memory_pool::{BlockInTransit, MemoryPool};
use crate::node::Nodes;
use crate::protocol::{read_message, write_message, Addr, BlockPayload, GetBlocks, GetData, Inv, Message, OpType, TxPayload, Version};
use crate::transactions::Transaction;
use crate::utils::hex_encode;
use crate::utxo_set::UTXOSet;

const NODE_VERSION: usize = 1;
pub const CENTRAL_NODE: &str = "localhost:2001";
pub const TRANSACTION_THRESHOLD: usize = 2;
const TCP_WRITE_TIMEOUT_MS: u64 = 1000;

/// All node-local mutable state, shared across connection-handler threads
/// behind one `Arc`. Replaces the teacher's scattered `Lazy` globals so a
/// node's state is constructed once, explicitly, and owned by the `Server`
/// that serves it.
pub struct NodeState {
    blockchain: Blockchain,
    utxo_set: UTXOSet,
    mempool: MemoryPool,
    nodes: Nodes,
    blocks_in_transit: BlockInTransit,
}

impl NodeState {
    #[must_use]
    pub fn new(blockchain: Blockchain) -> Self {
        let utxo_set = UTXOSet::new(blockchain.clone());
        let nodes = Nodes::new();
        if GLOBAL_CONFIG.get_node_addr() != CENTRAL_NODE {
            nodes.add_node(String::from(CENTRAL_NODE));
        }
        Self { blockchain, utxo_set, mempool: MemoryPool::new(), nodes, blocks_in_transit: BlockInTransit::new() }
    }

    pub const fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }
}

/// Accepts connections and dispatches each to its own handler thread, all
/// sharing one [`NodeState`].
pub struct Server {
    state: Arc<NodeState>,
}

impl Server {
    #[must_use]
    pub fn new(blockchain: Blockchain) -> Self {
        Self { state: Arc::new(NodeState::new(blockchain)) }
    }

    pub fn run(&self, addr: &str) -> ChainResult<()> {
        let listener = TcpListener::bind(addr).map_err(|e| ChainError::Protocol(e.to_string()))?;
        if addr != CENTRAL_NODE {
            let best_height = self.state.blockchain().get_best_height()?;
            send_version(&self.state, CENTRAL_NODE, best_height)?;
        }
        for stream in listener.incoming() {
            let state = Arc::clone(&self.state);
            match stream {
                Ok(stream) => {
                    thread::spawn(move || {
                        if let Err(e) = serve(&state, stream) {
                            warn!("connection handler failed: {e}");
                        }
                    });
                }
                Err(e) => error!("failed to accept connection: {e}"),
            }
        }
        Ok(())
    }
}

fn send_message(addr: &str, state: &NodeState, message: &Message) -> ChainResult<()> {
    info!("send {addr}: {message:?}");
    let stream = TcpStream::connect(addr);
    let Ok(mut stream) = stream else {
        error!("the peer {addr} is not reachable");
        state.nodes.evict_node(addr);
        return Ok(());
    };
    stream.set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT_MS))).map_err(|e| ChainError::Protocol(e.to_string()))?;
    write_message(&mut stream, message)
}

fn send_version(state: &NodeState, addr: &str, best_height: usize) -> ChainResult<()> {
    send_message(
        addr,
        state,
        &Message::Version(Version { addr_from: GLOBAL_CONFIG.get_node_addr(), version: NODE_VERSION, best_height }),
    )
}

fn send_get_blocks(state: &NodeState, addr: &str) -> ChainResult<()> {
    send_message(addr, state, &Message::GetBlocks(GetBlocks { addr_from: GLOBAL_CONFIG.get_node_addr() }))
}

fn send_get_data(state: &NodeState, addr: &str, op_type: OpType, id: &[u8]) -> ChainResult<()> {
    send_message(addr, state, &Message::GetData(GetData { addr_from: GLOBAL_CONFIG.get_node_addr(), op_type, id: id.to_vec() }))
}

fn send_inv(state: &NodeState, addr: &str, op_type: OpType, items: &[Vec<u8>]) -> ChainResult<()> {
    send_message(addr, state, &Message::Inv(Inv { addr_from: GLOBAL_CONFIG.get_node_addr(), op_type, items: items.to_vec() }))
}

fn send_block(state: &NodeState, addr: &str, block: &Block) -> ChainResult<()> {
    send_message(addr, state, &Message::Block(BlockPayload { addr_from: GLOBAL_CONFIG.get_node_addr(), block: block.serialize() }))
}

pub fn send_tx(addr: &str, state: &NodeState, tx: &Transaction) -> ChainResult<()> {
    send_message(addr, state, &Message::Tx(TxPayload { addr_from: GLOBAL_CONFIG.get_node_addr(), transaction: tx.serialize() }))
}

fn send_addr(state: &NodeState, addr: &str) -> ChainResult<()> {
    let addr_list = state.nodes.get_nodes().iter().map(crate::node::Node::get_addr).collect();
    send_message(addr, state, &Message::Addr(Addr { addr_list }))
}

/// Mines any pooled transactions into a new block once the mempool crosses
/// [`TRANSACTION_THRESHOLD`], holding `state.blockchain`'s update lock across
/// both the mine and the UTXO reindex so readers never see one without the
/// other.
///
/// Only mempool entries that currently verify are offered to the miner — a
/// transaction whose referenced output isn't on-chain yet (for instance, one
/// still waiting on a parent transaction also sitting in the mempool) is
/// left in the pool for a later round rather than aborting this one.
fn mine_pooled_transactions(state: &NodeState) -> ChainResult<Option<Block>> {
    if state.mempool.len() < TRANSACTION_THRESHOLD || !GLOBAL_CONFIG.is_miner() {
        return Ok(None);
    }
    let mining_address = GLOBAL_CONFIG.get_mining_addr().expect("is_miner implies a mining address is set");
    let mut txs: Vec<Transaction> = state
        .mempool
        .get_all()
        .into_iter()
        .filter(|tx| tx.verify(&state.blockchain).unwrap_or(false))
        .collect();
    if txs.is_empty() {
        return Ok(None);
    }
    let coinbase_tx = Transaction::new_coinbase_tx(&mining_address, "reward")?;
    txs.push(coinbase_tx);

    let _guard = state.blockchain.lock_for_update();
    let new_block = state.blockchain.mine_block(&txs)?;
    state.utxo_set.reindex()?;
    drop(_guard);

    info!("new block {} mined", new_block.get_hash_hex());
    for tx in &txs {
        state.mempool.remove(&tx.id_hex());
    }
    Ok(Some(new_block))
}

/// Receives one connection's stream of framed messages and dispatches each,
/// matching the teacher's `serve` shape but against [`NodeState`] and the new
/// command-prefixed framing.
pub fn serve(state: &Arc<NodeState>, stream: TcpStream) -> ChainResult<()> {
    let peer_addr = stream.peer_addr().map_err(|e| ChainError::Protocol(e.to_string()))?;
    let mut reader = BufReader::new(stream);
    let message = read_message(&mut reader)?;
    info!("received from {peer_addr}: {message:?}");
    match message {
        Message::Block(BlockPayload { addr_from, block }) => {
            let block = Block::deserialize(&block)?;
            {
                let _guard = state.blockchain.lock_for_update();
                state.blockchain.add_block(&block)?;
                state.utxo_set.update(&block)?;
            }
            info!("added block {}", block.get_hash_hex());
            if !state.blocks_in_transit.is_empty() {
                if let Some(block_hash) = state.blocks_in_transit.first() {
                    send_get_data(state, &addr_from, OpType::Block, &block_hash)?;
                    state.blocks_in_transit.remove(&block_hash);
                }
            }
        }
        Message::GetBlocks(GetBlocks { addr_from }) => {
            let hashes = state.blockchain.get_block_hashes();
            let hashes_bytes: Vec<Vec<u8>> =
                hashes.iter().map(|h| crate::utils::hex_decode(h)).collect::<ChainResult<Vec<_>>>()?;
            send_inv(state, &addr_from, OpType::Block, &hashes_bytes)?;
        }
        Message::GetData(GetData { addr_from, op_type, id }) => match op_type {
            OpType::Block => {
                let hash_hex = hex_encode(&id);
                if let Some(block) = state.blockchain.get_block(&hash_hex)? {
                    send_block(state, &addr_from, &block)?;
                } else {
                    error!("requested block {hash_hex} not found");
                }
            }
            OpType::Tx => {
                let txid_hex = hex_encode(&id);
                if let Some(tx) = state.mempool.get(&txid_hex) {
                    send_tx(&addr_from, state, &tx)?;
                } else {
                    error!("requested transaction {txid_hex} not found");
                }
            }
        },
        Message::Inv(Inv { addr_from, op_type, items }) => match op_type {
            OpType::Block => {
                state.blocks_in_transit.add_blocks(&items);
                if let Some(block_hash) = items.first() {
                    send_get_data(state, &addr_from, OpType::Block, block_hash)?;
                    state.blocks_in_transit.remove(block_hash);
                }
            }
            OpType::Tx => {
                if let Some(txid) = items.first() {
                    let txid_hex = hex_encode(txid);
                    if !state.mempool.contains(&txid_hex) {
                        send_get_data(state, &addr_from, OpType::Tx, txid)?;
                    }
                }
            }
        },
        Message::Tx(TxPayload { addr_from, transaction }) => {
            let tx = Transaction::deserialize(&transaction)?;
            let txid_hex = tx.id_hex();
            state.mempool.add(tx);

            let node_addr = GLOBAL_CONFIG.get_node_addr();
            if node_addr == CENTRAL_NODE {
                for node in state.nodes.get_nodes() {
                    if node.get_addr() == node_addr || node.get_addr() == addr_from {
                        continue;
                    }
                    send_inv(state, &node.get_addr(), OpType::Tx, &[crate::utils::hex_decode(&txid_hex)?])?;
                }
            }

            while state.mempool.len() >= TRANSACTION_THRESHOLD {
                let Some(new_block) = mine_pooled_transactions(state)? else {
                    break;
                };
                for node in state.nodes.get_nodes() {
                    if node.get_addr() == node_addr {
                        continue;
                    }
                    send_inv(state, &node.get_addr(), OpType::Block, &[new_block.get_hash().to_vec()])?;
                }
            }
        }
        Message::Version(Version { addr_from, version, best_height }) => {
            info!("version = {version}, best_height = {best_height}");
            let local_best_height = state.blockchain.get_best_height()?;
            if local_best_height < best_height {
                send_get_blocks(state, &addr_from)?;
            }
            if local_best_height > best_height {
                send_version(state, &addr_from, local_best_height)?;
            }
            if !state.nodes.node_is_known(&addr_from) {
                state.nodes.add_node(addr_from.clone());
                send_addr(state, &addr_from)?;
            }
        }
        Message::Addr(Addr { addr_list }) => {
            for addr in addr_list {
                state.nodes.add_node(addr);
            }
        }
    }
    Ok(())
}
