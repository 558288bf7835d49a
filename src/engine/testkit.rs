//! Test doubles for the collaborator traits.

use crate::collab::{Broadcaster, ChainSource, Clock, HttpTransport, MailTransport, WalletStore};
use crate::crypto::ec;
use crate::crypto::hashes::sha256;
use crate::crypto::keys::PrivateKey;
use crate::engine::action::Action;
use crate::engine::store::{self, MemoryStorage};
use crate::engine::trigger::Trigger;
use crate::engine::EngineContext;
use crate::error::EngineError;
use crate::tx::codec::{RawTransaction, Utxo};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;

pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn set(&self, t: i64) {
        self.now.store(t as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst) as i64
    }
}

#[derive(Default)]
pub struct MockChain {
    balances: RwLock<HashMap<String, u64>>,
    received: RwLock<HashMap<String, u64>>,
    sent: RwLock<HashMap<String, u64>>,
    height: AtomicU64,
    confirmations: RwLock<HashMap<String, u32>>,
    utxos: RwLock<HashMap<String, Vec<Utxo>>>,
    txid_counter: AtomicUsize,
}

impl MockChain {
    pub fn set_balance(&self, address: &str, value: u64) {
        self.balances
            .write()
            .unwrap()
            .insert(address.to_string(), value);
    }

    pub fn set_received(&self, address: &str, value: u64) {
        self.received
            .write()
            .unwrap()
            .insert(address.to_string(), value);
    }

    pub fn set_sent(&self, address: &str, value: u64) {
        self.sent
            .write()
            .unwrap()
            .insert(address.to_string(), value);
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_confirmations(&self, txid: &str, n: u32) {
        self.confirmations
            .write()
            .unwrap()
            .insert(txid.to_string(), n);
    }

    pub fn add_utxo(&self, address: &str, value: u64, confirmations: u32) {
        let counter = self.txid_counter.fetch_add(1, Ordering::SeqCst);
        let utxo = Utxo {
            address: address.to_string(),
            value,
            txid: format!("{counter:064x}"),
            vout: 0,
            confirmations,
        };
        self.utxos
            .write()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push(utxo);
    }
}

impl ChainSource for MockChain {
    fn balance(&self, address: &str) -> Result<u64> {
        Ok(*self.balances.read().unwrap().get(address).unwrap_or(&0))
    }

    fn total_received(&self, address: &str) -> Result<u64> {
        Ok(*self.received.read().unwrap().get(address).unwrap_or(&0))
    }

    fn total_sent(&self, address: &str) -> Result<u64> {
        Ok(*self.sent.read().unwrap().get(address).unwrap_or(&0))
    }

    fn block_height(&self) -> Result<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    fn tx_confirmations(&self, txid: &str) -> Result<u32> {
        Ok(*self.confirmations.read().unwrap().get(txid).unwrap_or(&0))
    }

    fn utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        Ok(self
            .utxos
            .read()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MockWallet {
    keys: RwLock<HashMap<String, PrivateKey>>,
}

impl MockWallet {
    /// Install a deterministic key for an account/index slot.
    pub fn install_key(&self, account: &str, index: u32) -> PrivateKey {
        let digest = sha256(format!("{account}/{index}").as_bytes());
        let secret = ec::umod(&ec::bytes_to_int(&digest), &ec::curve().n);
        let key = PrivateKey::from_scalar(secret, true).expect("test scalar in range");
        self.keys
            .write()
            .unwrap()
            .insert(format!("{account}/{index}"), key.clone());
        key
    }
}

impl WalletStore for MockWallet {
    fn key_for_account(&self, account: &str, index: u32) -> Result<PrivateKey> {
        self.keys
            .read()
            .unwrap()
            .get(&format!("{account}/{index}"))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no key for {account}/{index}"))
    }

    fn key_for_address(&self, address: &str) -> Result<PrivateKey> {
        let keys = self.keys.read().unwrap();
        keys.values()
            .find(|k| k.public_key().address(&crate::chain::MAINNET) == address)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no key controls {address}"))
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    raw: RwLock<Vec<String>>,
}

impl RecordingBroadcaster {
    pub fn last(&self) -> Option<String> {
        self.raw.read().unwrap().last().cloned()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, raw_tx_hex: &str) -> Result<String> {
        // Reject anything that is not a parseable transaction.
        let txid = RawTransaction::from_hex(raw_tx_hex)?.txid();
        self.raw.write().unwrap().push(raw_tx_hex.to_string());
        Ok(txid)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: RwLock<Vec<(String, String)>>,
    fail_next: AtomicBool,
}

impl RecordingMailer {
    pub fn sent_count(&self) -> usize {
        self.sent.read().unwrap().len()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl MailTransport for RecordingMailer {
    fn send_mail(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("smtp unavailable");
        }
        self.sent
            .write()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHttp {
    posts: RwLock<Vec<String>>,
    fail_next: AtomicBool,
}

impl RecordingHttp {
    pub fn post_count(&self) -> usize {
        self.posts.read().unwrap().len()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl HttpTransport for RecordingHttp {
    fn post_json(&self, url: &str, _payload: &serde_json::Value) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("endpoint unreachable");
        }
        self.posts.write().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Everything an engine test needs, wired to in-memory doubles.
pub struct TestHarness {
    pub storage: MemoryStorage,
    pub wallet: MockWallet,
    pub chain: MockChain,
    pub broadcaster: RecordingBroadcaster,
    pub mailer: RecordingMailer,
    pub http: RecordingHttp,
    pub clock: ManualClock,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            storage: MemoryStorage::new(),
            wallet: MockWallet::default(),
            chain: MockChain::default(),
            broadcaster: RecordingBroadcaster::default(),
            mailer: RecordingMailer::default(),
            http: RecordingHttp::default(),
            clock: ManualClock {
                now: AtomicU64::new(0),
            },
        }
    }

    pub fn context(&self) -> EngineContext<'_> {
        EngineContext {
            storage: &self.storage,
            wallet: &self.wallet,
            chain: &self.chain,
            broadcaster: &self.broadcaster,
            mailer: &self.mailer,
            http: &self.http,
            clock: &self.clock,
        }
    }

    pub fn save_trigger(&self, partial: serde_json::Value) -> Result<Trigger, EngineError> {
        store::save_trigger(&self.storage, partial)
    }

    pub fn save_action(&self, partial: serde_json::Value) -> Result<Action, EngineError> {
        store::save_action(&self.storage, partial)
    }

    pub fn get_trigger(&self, id: &str) -> Trigger {
        store::load_trigger(&self.storage, id).expect("trigger exists")
    }
}
