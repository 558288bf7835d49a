//! External collaborators.
//!
//! The engine core never performs network or key-store I/O itself; it
//! calls these capabilities synchronously and treats every call as
//! fallible. Consumers wire in their own implementations; the crate
//! ships an Esplora-style chain client and a blocking webhook poster.

use crate::chain::ChainParams;
use crate::crypto::keys::PrivateKey;
use crate::tx::codec::Utxo;
use anyhow::Result;

pub mod esplora;
pub mod http;

/// The encrypted hot-wallet key store, addressed by account/index or
/// by the address a key controls.
pub trait WalletStore {
    fn key_for_account(&self, account: &str, index: u32) -> Result<PrivateKey>;

    fn key_for_address(&self, address: &str) -> Result<PrivateKey>;

    fn address_for_account(
        &self,
        account: &str,
        index: u32,
        params: &ChainParams,
    ) -> Result<String> {
        Ok(self
            .key_for_account(account, index)?
            .public_key()
            .address(params))
    }
}

/// Block-data source: balances, heights, confirmations, UTXO sets.
pub trait ChainSource {
    fn balance(&self, address: &str) -> Result<u64>;
    fn total_received(&self, address: &str) -> Result<u64>;
    fn total_sent(&self, address: &str) -> Result<u64>;
    fn block_height(&self) -> Result<u64>;
    fn tx_confirmations(&self, txid: &str) -> Result<u32>;
    fn utxos(&self, address: &str) -> Result<Vec<Utxo>>;
}

/// Hands a fully signed raw transaction to the network.
pub trait Broadcaster {
    /// Returns the txid reported by the network.
    fn broadcast(&self, raw_tx_hex: &str) -> Result<String>;
}

pub trait MailTransport {
    fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

pub trait HttpTransport {
    fn post_json(&self, url: &str, payload: &serde_json::Value) -> Result<()>;
}

/// Wall-clock seconds; injected so trigger state machines are testable.
pub trait Clock {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
