use anyhow::{Context, Result};
use log::LevelFilter;
use structopt::StructOpt;

use tinychain::config::GLOBAL_CONFIG;
use tinychain::error::ChainError;
use tinychain::server::{send_tx, NodeState, Server, CENTRAL_NODE};
use tinychain::transactions::Transaction;
use tinychain::utils::hex_encode;
use tinychain::utxo_set::UTXOSet;
use tinychain::wallet::{self, validate_address, ADDRESS_CHECK_SUM_LEN};
use tinychain::wallets::Wallets;
use tinychain::{base58_decode, blockchain::Blockchain};

const MINE_TRUE: usize = 1;

#[derive(Debug, StructOpt)]
#[structopt(name = "tinychain")]
struct Opt {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    #[structopt(name = "createblockchain", about = "Create a new blockchain")]
    CreateBlockchain {
        #[structopt(name = "address", help = "The address to send the genesis block reward to")]
        address: String,
    },
    #[structopt(name = "createwallet", about = "Create a new wallet")]
    CreateWallet,
    #[structopt(name = "getbalance", about = "Get the wallet balance of the target address")]
    GetBalance {
        #[structopt(name = "address", help = "The wallet address")]
        address: String,
    },
    #[structopt(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[structopt(name = "send", about = "Send value between addresses")]
    Send {
        #[structopt(name = "from", help = "Source wallet address")]
        from: String,
        #[structopt(name = "to", help = "Destination wallet address")]
        to: String,
        #[structopt(name = "amount", help = "Amount to send")]
        amount: i64,
        #[structopt(name = "mine", help = "Mine immediately on the same node", default_value = "0")]
        mine: usize,
    },
    #[structopt(name = "printchain", about = "Print all blocks in the chain")]
    PrintChain,
    #[structopt(name = "reindexutxo", about = "Rebuild the UTXO index")]
    ReindexUtxo,
    #[structopt(name = "startnode", about = "Start a node")]
    StartNode {
        #[structopt(name = "miner", help = "Enable mining mode and send reward to ADDRESS")]
        miner: Option<String>,
    },
}

/// Reports a validation-class [`ChainError`] to the user and exits nonzero,
/// matching the CLI's exit-code contract; any other error propagates as an
/// `anyhow` error out of `main`, also a nonzero exit.
fn fail_validation(err: &ChainError) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(1);
}

fn main() -> Result<()> {
    env_logger::builder().filter_level(LevelFilter::Info).init();
    let opt = Opt::from_args();
    match opt.command {
        Command::CreateBlockchain { address } => {
            if !validate_address(&address) {
                fail_validation(&ChainError::InvalidAddress(address));
            }
            let blockchain = match Blockchain::create(&address) {
                Ok(blockchain) => blockchain,
                Err(e @ ChainError::BlockchainExists) => fail_validation(&e),
                Err(e) => return Err(e).context("creating blockchain"),
            };
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex().context("reindexing UTXO set")?;
            println!("Done!");
        }
        Command::CreateWallet => {
            let mut wallets = Wallets::new().context("loading wallets")?;
            let address = wallets.create_wallet().context("creating wallet")?;
            println!("Your new address: {address}");
        }
        Command::GetBalance { address } => {
            if !validate_address(&address) {
                fail_validation(&ChainError::InvalidAddress(address));
            }
            let payload = base58_decode(&address).context("decoding address")?;
            let pub_key_hash = &payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN];

            let blockchain = Blockchain::new().context("opening blockchain")?;
            let utxo_set = UTXOSet::new(blockchain);
            let utxos = utxo_set.find_utxo(pub_key_hash).context("looking up UTXOs")?;
            let balance: i64 = utxos.iter().map(tinychain::transactions::TXOutput::get_value).sum();
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new().context("loading wallets")?;
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::Send { from, to, amount, mine } => {
            if !validate_address(&from) {
                fail_validation(&ChainError::InvalidAddress(from));
            }
            if !validate_address(&to) {
                fail_validation(&ChainError::InvalidAddress(to));
            }
            let blockchain = Blockchain::new().context("opening blockchain")?;
            let utxo_set = UTXOSet::new(blockchain.clone());

            let transaction = match Transaction::new_utxo_transaction(&from, &to, amount, &utxo_set) {
                Ok(tx) => tx,
                Err(e @ ChainError::InsufficientFunds) => fail_validation(&e),
                Err(e) => return Err(e.into()),
            };

            if mine == MINE_TRUE {
                let coinbase_tx = Transaction::new_coinbase_tx(&from, "reward")?;
                let _guard = blockchain.lock_for_update();
                let block = blockchain.mine_block(&[transaction, coinbase_tx]).context("mining block")?;
                utxo_set.update(&block).context("updating UTXO set")?;
            } else {
                let state = NodeState::new(blockchain);
                send_tx(CENTRAL_NODE, &state, &transaction).context("sending transaction")?;
            }
            println!("Success!");
        }
        Command::PrintChain => {
            let blockchain = Blockchain::new().context("opening blockchain")?;
            let mut block_iterator = blockchain.iterator();
            while let Some(block) = block_iterator.next() {
                println!("Pre block hash: {}", block.get_pre_block_hash_hex());
                println!("Cur block hash: {}", block.get_hash_hex());
                println!("Pre block timestamp: {}", block.get_timestamp());
                for tx in block.get_transactions() {
                    println!("- Transaction txid: {}", tx.id_hex());
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let pub_key_hash = wallet::hash_pub_key(input.get_pub_key());
                            let address = wallet::convert_address(&pub_key_hash);
                            println!("-- Input txid = {}, vout = {}, from = {address}", hex_encode(input.get_txid()), input.get_vout());
                        }
                    }
                    for output in tx.get_vout() {
                        let address = wallet::convert_address(output.get_pub_key_hash());
                        println!("-- Output value = {}, to = {address}", output.get_value());
                    }
                }
                println!();
            }
        }
        Command::ReindexUtxo => {
            let blockchain = Blockchain::new().context("opening blockchain")?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex().context("reindexing UTXO set")?;
            let count = utxo_set.count_transactions().context("counting UTXO transactions")?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
        Command::StartNode { miner } => {
            if let Some(addr) = miner {
                if !validate_address(&addr) {
                    fail_validation(&ChainError::InvalidAddress(addr));
                }
                println!("Mining is on. Address to receive rewards: {addr}");
                GLOBAL_CONFIG.set_mining_addr(addr);
            }
            let blockchain = Blockchain::new().context("opening blockchain")?;
            let socket_addr = GLOBAL_CONFIG.get_node_addr();
            Server::new(blockchain).run(&socket_addr)?;
        }
    }
    Ok(())
}
