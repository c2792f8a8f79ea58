use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Blockchain, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::Nodes;
use crate::storage::{BlockInTransit, MemoryPool, UTXOSet};
use data_encoding::HEXLOWER;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const NODE_VERSION: usize = 1;

/// The bootstrap peer. It relays transactions and never mines.
pub const CENTRAL_NODE: &str = "localhost:3000";

/// A miner starts working once this many transactions sit in the mempool
pub const TRANSACTION_THRESHOLD: usize = 2;

// Wire framing: a 12-byte ASCII command, NUL-padded on the right, followed
// by a JSON body. One message per connection, read to end-of-stream.
const COMMAND_LENGTH: usize = 12;

const TCP_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Block,
    Tx,
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionPayload {
    version: usize,
    best_height: usize,
    addr_from: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddrPayload {
    addr_list: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetBlocksPayload {
    addr_from: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetDataPayload {
    addr_from: String,
    op_type: OpType,
    id: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InvPayload {
    addr_from: String,
    op_type: OpType,
    items: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockPayload {
    addr_from: String,
    block: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TxPayload {
    addr_from: String,
    transaction: Vec<u8>,
}

fn command_to_bytes(command: &str) -> [u8; COMMAND_LENGTH] {
    let mut bytes = [0u8; COMMAND_LENGTH];
    for (i, b) in command.bytes().enumerate() {
        bytes[i] = b;
    }
    bytes
}

fn bytes_to_command(bytes: &[u8]) -> String {
    let stripped: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0x00).collect();
    String::from_utf8_lossy(&stripped).to_string()
}

fn build_request<T: Serialize>(command: &str, payload: &T) -> Result<Vec<u8>> {
    let mut request = command_to_bytes(command).to_vec();
    let body = serde_json::to_vec(payload)
        .map_err(|e| BlockchainError::Serialization(format!("Failed to encode payload: {e}")))?;
    request.extend(body);
    Ok(request)
}

fn decode_payload<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| BlockchainError::MalformedMessage(format!("Failed to decode payload: {e}")))
}

// Shared node state, owned by the server and handed to every connection
// handler. Peer list, mempool and in-transit hashes each guard their own
// interior lock.
struct ServerState {
    known_nodes: Nodes,
    memory_pool: MemoryPool,
    blocks_in_transit: BlockInTransit,
}

/// The P2P server: accepts connections sequentially and handles each
/// message on its own thread.
pub struct Server {
    blockchain: Blockchain,
    state: Arc<ServerState>,
}

impl Server {
    pub fn new(blockchain: Blockchain) -> Server {
        Server {
            blockchain,
            state: Arc::new(ServerState {
                known_nodes: Nodes::new(CENTRAL_NODE),
                memory_pool: MemoryPool::new(),
                blocks_in_transit: BlockInTransit::new(),
            }),
        }
    }

    /// Bind, announce our height to the central node (unless we are it)
    /// and serve connections indefinitely
    pub fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).map_err(|e| {
            BlockchainError::PeerUnreachable(format!("Failed to bind to {addr}: {e}"))
        })?;
        info!("Node listening on {addr}");

        if addr != CENTRAL_NODE {
            let best_height = self.blockchain.get_best_height()?;
            if let Err(e) = Self::send_version(&self.state, CENTRAL_NODE, best_height) {
                warn!("Could not reach central node on startup: {e}");
            }
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let blockchain = self.blockchain.clone();
                    let state = Arc::clone(&self.state);
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(&blockchain, &state, stream) {
                            // A bad message drops; the listener lives on.
                            error!("Error handling connection: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    fn handle_connection(
        blockchain: &Blockchain,
        state: &ServerState,
        mut stream: TcpStream,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_millis(TCP_TIMEOUT_MS)))
            .map_err(|e| {
                BlockchainError::PeerUnreachable(format!("Failed to set read timeout: {e}"))
            })?;

        let mut request = vec![];
        stream
            .read_to_end(&mut request)
            .map_err(|e| BlockchainError::MalformedMessage(format!("Read failed: {e}")))?;
        drop(stream);

        if request.len() < COMMAND_LENGTH {
            return Err(BlockchainError::MalformedMessage(format!(
                "Message shorter than the {COMMAND_LENGTH}-byte command header"
            )));
        }

        let command = bytes_to_command(&request[..COMMAND_LENGTH]);
        let body = &request[COMMAND_LENGTH..];
        info!("Received {command} command");

        match command.as_str() {
            "version" => Self::handle_version(blockchain, state, decode_payload(body)?),
            "addr" => Self::handle_addr(state, decode_payload(body)?),
            "getblocks" => Self::handle_get_blocks(blockchain, state, decode_payload(body)?),
            "getdata" => Self::handle_get_data(blockchain, state, decode_payload(body)?),
            "inv" => Self::handle_inv(state, decode_payload(body)?),
            "block" => Self::handle_block(blockchain, state, decode_payload(body)?),
            "tx" => Self::handle_tx(blockchain, state, decode_payload(body)?),
            _ => Err(BlockchainError::MalformedMessage(format!(
                "Unknown command: {command}"
            ))),
        }
    }

    /// Height handshake: the lower node asks for blocks, the higher one
    /// replies with its own version. New senders join the peer list.
    fn handle_version(
        blockchain: &Blockchain,
        state: &ServerState,
        payload: VersionPayload,
    ) -> Result<()> {
        info!(
            "Version from {}: best_height={}",
            payload.addr_from, payload.best_height
        );

        let my_best_height = blockchain.get_best_height()?;
        if my_best_height < payload.best_height {
            Self::send_get_blocks(state, &payload.addr_from)?;
        } else if my_best_height > payload.best_height {
            Self::send_version(state, &payload.addr_from, my_best_height)?;
        }

        if !state.known_nodes.node_is_known(&payload.addr_from) {
            state.known_nodes.add_node(payload.addr_from);
        }
        Ok(())
    }

    fn handle_addr(state: &ServerState, payload: AddrPayload) -> Result<()> {
        for addr in payload.addr_list {
            state.known_nodes.add_node(addr);
        }
        info!("There are {} known nodes now", state.known_nodes.len());

        for node in state.known_nodes.get_nodes() {
            if let Err(e) = Self::send_get_blocks(state, &node.get_addr()) {
                warn!("Failed to request blocks from {}: {e}", node.get_addr());
            }
        }
        Ok(())
    }

    fn handle_get_blocks(
        blockchain: &Blockchain,
        state: &ServerState,
        payload: GetBlocksPayload,
    ) -> Result<()> {
        let blocks = blockchain.get_block_hashes();
        Self::send_inv(state, &payload.addr_from, OpType::Block, &blocks)
    }

    fn handle_get_data(
        blockchain: &Blockchain,
        state: &ServerState,
        payload: GetDataPayload,
    ) -> Result<()> {
        match payload.op_type {
            OpType::Block => {
                if let Some(block) = blockchain.get_block(&payload.id)? {
                    Self::send_block(state, &payload.addr_from, &block)?;
                } else {
                    info!("Block not found for requested hash");
                }
            }
            OpType::Tx => {
                let txid_hex = HEXLOWER.encode(&payload.id);
                if let Some(tx) = state.memory_pool.get(&txid_hex) {
                    Self::send_tx_to(state, &payload.addr_from, &tx)?;
                }
            }
        }
        Ok(())
    }

    fn handle_inv(state: &ServerState, payload: InvPayload) -> Result<()> {
        info!(
            "Received inventory with {} {:?} items",
            payload.items.len(),
            payload.op_type
        );
        match payload.op_type {
            OpType::Block => {
                state.blocks_in_transit.add_blocks(&payload.items);
                if let Some(block_hash) = payload.items.first() {
                    Self::send_get_data(state, &payload.addr_from, OpType::Block, block_hash)?;
                    state.blocks_in_transit.remove(block_hash);
                }
            }
            OpType::Tx => {
                if let Some(txid) = payload.items.first() {
                    let txid_hex = HEXLOWER.encode(txid);
                    if !state.memory_pool.contains(&txid_hex) {
                        Self::send_get_data(state, &payload.addr_from, OpType::Tx, txid)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Append a downloaded block, request the next one in transit, and
    /// rebuild the UTXO index once the download queue drains
    fn handle_block(
        blockchain: &Blockchain,
        state: &ServerState,
        payload: BlockPayload,
    ) -> Result<()> {
        let block = Block::deserialize(&payload.block)
            .map_err(|e| BlockchainError::MalformedMessage(format!("Bad block payload: {e}")))?;

        if !ProofOfWork::validate(&block) {
            warn!(
                "Dropping block {} with invalid proof of work",
                HEXLOWER.encode(block.get_hash())
            );
            return Ok(());
        }

        blockchain.add_block(&block)?;
        info!(
            "Added block {} from {}",
            HEXLOWER.encode(block.get_hash()),
            payload.addr_from
        );

        if !state.blocks_in_transit.is_empty() {
            if let Some(block_hash) = state.blocks_in_transit.first() {
                Self::send_get_data(state, &payload.addr_from, OpType::Block, &block_hash)?;
                state.blocks_in_transit.remove(&block_hash);
            }
        } else {
            let utxo_set = UTXOSet::new(blockchain.clone());
            utxo_set.reindex()?;
        }
        Ok(())
    }

    /// Pool an incoming transaction. The central node relays it as
    /// inventory; a miner node with a full enough pool seals blocks until
    /// the pool drains.
    fn handle_tx(blockchain: &Blockchain, state: &ServerState, payload: TxPayload) -> Result<()> {
        let tx = Transaction::deserialize(&payload.transaction).map_err(|e| {
            BlockchainError::MalformedMessage(format!("Bad transaction payload: {e}"))
        })?;
        let txid = tx.get_id_bytes();
        state.memory_pool.add(tx);

        let node_addr = GLOBAL_CONFIG.get_node_addr();
        if node_addr == CENTRAL_NODE {
            for node in state.known_nodes.get_nodes() {
                let addr = node.get_addr();
                if addr != node_addr && addr != payload.addr_from {
                    if let Err(e) =
                        Self::send_inv(state, &addr, OpType::Tx, &[txid.clone()])
                    {
                        warn!("Failed to relay transaction to {addr}: {e}");
                    }
                }
            }
        } else if state.memory_pool.len() >= TRANSACTION_THRESHOLD && GLOBAL_CONFIG.is_miner() {
            Self::mine_from_pool(blockchain, state)?;
        }
        Ok(())
    }

    // Mining runs on the thread handling the triggering tx message and
    // blocks it until the pool is drained.
    fn mine_from_pool(blockchain: &Blockchain, state: &ServerState) -> Result<()> {
        let mining_address = GLOBAL_CONFIG
            .get_mining_addr()
            .ok_or_else(|| BlockchainError::Wallet("Mining address not configured".to_string()))?;

        loop {
            let mut txs = vec![];
            for tx in state.memory_pool.get_all() {
                match tx.verify(blockchain) {
                    Ok(true) => txs.push(tx),
                    Ok(false) => {
                        warn!("Skipping transaction with a bad signature");
                    }
                    Err(e) => {
                        warn!("Skipping unverifiable transaction: {e}");
                    }
                }
            }

            if txs.is_empty() {
                info!("All transactions are invalid! Waiting for new ones...");
                return Ok(());
            }

            let coinbase_tx = Transaction::new_coinbase_tx(&mining_address)?;
            txs.push(coinbase_tx);

            let new_block = blockchain.mine_block(&txs)?;
            let utxo_set = UTXOSet::new(blockchain.clone());
            utxo_set.update(&new_block)?;
            info!("New block {} is mined!", HEXLOWER.encode(new_block.get_hash()));

            for tx in &txs {
                state.memory_pool.remove(&HEXLOWER.encode(tx.get_id()));
            }

            let node_addr = GLOBAL_CONFIG.get_node_addr();
            for node in state.known_nodes.get_nodes() {
                let addr = node.get_addr();
                if addr != node_addr {
                    if let Err(e) = Self::send_inv(
                        state,
                        &addr,
                        OpType::Block,
                        &[new_block.get_hash_bytes()],
                    ) {
                        warn!("Failed to announce block to {addr}: {e}");
                    }
                }
            }

            if state.memory_pool.is_empty() {
                return Ok(());
            }
        }
    }

    fn send_version(state: &ServerState, addr: &str, height: usize) -> Result<()> {
        let payload = VersionPayload {
            version: NODE_VERSION,
            best_height: height,
            addr_from: GLOBAL_CONFIG.get_node_addr(),
        };
        let request = build_request("version", &payload)?;
        Self::send_data(state, addr, &request)
    }

    fn send_get_blocks(state: &ServerState, addr: &str) -> Result<()> {
        let payload = GetBlocksPayload {
            addr_from: GLOBAL_CONFIG.get_node_addr(),
        };
        let request = build_request("getblocks", &payload)?;
        Self::send_data(state, addr, &request)
    }

    fn send_get_data(state: &ServerState, addr: &str, op_type: OpType, id: &[u8]) -> Result<()> {
        let payload = GetDataPayload {
            addr_from: GLOBAL_CONFIG.get_node_addr(),
            op_type,
            id: id.to_vec(),
        };
        let request = build_request("getdata", &payload)?;
        Self::send_data(state, addr, &request)
    }

    fn send_inv(state: &ServerState, addr: &str, op_type: OpType, items: &[Vec<u8>]) -> Result<()> {
        let payload = InvPayload {
            addr_from: GLOBAL_CONFIG.get_node_addr(),
            op_type,
            items: items.to_vec(),
        };
        let request = build_request("inv", &payload)?;
        Self::send_data(state, addr, &request)
    }

    fn send_block(state: &ServerState, addr: &str, block: &Block) -> Result<()> {
        let payload = BlockPayload {
            addr_from: GLOBAL_CONFIG.get_node_addr(),
            block: block.serialize()?,
        };
        let request = build_request("block", &payload)?;
        Self::send_data(state, addr, &request)
    }

    fn send_tx_to(state: &ServerState, addr: &str, tx: &Transaction) -> Result<()> {
        let payload = TxPayload {
            addr_from: GLOBAL_CONFIG.get_node_addr(),
            transaction: tx.serialize()?,
        };
        let request = build_request("tx", &payload)?;
        Self::send_data(state, addr, &request)
    }

    // One short-lived connection per message. A peer that cannot be
    // dialed or written is pruned from the known-node list.
    fn send_data(state: &ServerState, addr: &str, request: &[u8]) -> Result<()> {
        let mut stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{addr} is not available: {e}");
                state.known_nodes.evict_node(addr);
                return Err(BlockchainError::PeerUnreachable(addr.to_string()));
            }
        };

        stream
            .set_write_timeout(Some(Duration::from_millis(TCP_TIMEOUT_MS)))
            .map_err(|e| {
                BlockchainError::PeerUnreachable(format!("Failed to set write timeout: {e}"))
            })?;

        if let Err(e) = stream.write_all(request).and_then(|_| stream.flush()) {
            warn!("Write to {addr} failed: {e}");
            state.known_nodes.evict_node(addr);
            return Err(BlockchainError::PeerUnreachable(addr.to_string()));
        }
        Ok(())
    }
}

/// Forward a freshly built transaction to a node (used by `send` without
/// `--mine`)
pub fn send_tx(addr: &str, tx: &Transaction) -> Result<()> {
    let payload = TxPayload {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        transaction: tx.serialize()?,
    };
    let request = build_request("tx", &payload)?;

    let mut stream = TcpStream::connect(addr)
        .map_err(|_| BlockchainError::PeerUnreachable(addr.to_string()))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_TIMEOUT_MS)))
        .map_err(|e| {
            BlockchainError::PeerUnreachable(format!("Failed to set write timeout: {e}"))
        })?;
    stream
        .write_all(&request)
        .and_then(|_| stream.flush())
        .map_err(|_| BlockchainError::PeerUnreachable(addr.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes_are_nul_padded() {
        let bytes = command_to_bytes("version");
        assert_eq!(bytes.len(), COMMAND_LENGTH);
        assert_eq!(&bytes[..7], b"version");
        assert!(bytes[7..].iter().all(|b| *b == 0x00));
    }

    #[test]
    fn test_command_round_trip() {
        for command in ["version", "addr", "getblocks", "inv", "getdata", "block", "tx"] {
            let bytes = command_to_bytes(command);
            assert_eq!(bytes_to_command(&bytes), command);
        }
    }

    #[test]
    fn test_request_framing() {
        let payload = GetBlocksPayload {
            addr_from: "localhost:3001".to_string(),
        };
        let request = build_request("getblocks", &payload).unwrap();

        assert_eq!(bytes_to_command(&request[..COMMAND_LENGTH]), "getblocks");
        let decoded: GetBlocksPayload = decode_payload(&request[COMMAND_LENGTH..]).unwrap();
        assert_eq!(decoded.addr_from, "localhost:3001");
    }

    #[test]
    fn test_inv_payload_round_trip() {
        let payload = InvPayload {
            addr_from: "localhost:3000".to_string(),
            op_type: OpType::Block,
            items: vec![vec![1, 2, 3], vec![4, 5, 6]],
        };
        let request = build_request("inv", &payload).unwrap();
        let decoded: InvPayload = decode_payload(&request[COMMAND_LENGTH..]).unwrap();

        assert_eq!(decoded.op_type, OpType::Block);
        assert_eq!(decoded.items, payload.items);
    }

    #[test]
    fn test_garbage_payload_is_malformed() {
        let result: Result<InvPayload> = decode_payload(b"not json");
        assert!(matches!(
            result,
            Err(BlockchainError::MalformedMessage(_))
        ));
    }
}
