//! Engine facade flow over real file-backed storage.

use anyhow::Result;
use satwarden::collab::{
    Broadcaster, ChainSource, Clock, HttpTransport, MailTransport, WalletStore,
};
use satwarden::crypto::keys::PrivateKey;
use satwarden::engine::trigger::TriggerStatus;
use satwarden::tx::codec::{RawTransaction, Utxo};
use satwarden::{Collaborators, Engine, MAINNET};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

// ----------------------------------------------------------------------
// Minimal collaborator doubles for the public API
// ----------------------------------------------------------------------

#[derive(Clone, Default)]
struct SharedState {
    balance: Arc<AtomicU64>,
    utxos: Arc<RwLock<Vec<Utxo>>>,
    broadcasts: Arc<RwLock<Vec<String>>>,
    mails: Arc<RwLock<Vec<String>>>,
    now: Arc<AtomicU64>,
}

struct FixedWallet {
    key: PrivateKey,
}

impl WalletStore for FixedWallet {
    fn key_for_account(&self, _account: &str, _index: u32) -> Result<PrivateKey> {
        Ok(self.key.clone())
    }

    fn key_for_address(&self, _address: &str) -> Result<PrivateKey> {
        Ok(self.key.clone())
    }
}

struct FakeChain(SharedState);

impl ChainSource for FakeChain {
    fn balance(&self, _address: &str) -> Result<u64> {
        Ok(self.0.balance.load(Ordering::SeqCst))
    }

    fn total_received(&self, _address: &str) -> Result<u64> {
        Ok(self.0.balance.load(Ordering::SeqCst))
    }

    fn total_sent(&self, _address: &str) -> Result<u64> {
        Ok(0)
    }

    fn block_height(&self) -> Result<u64> {
        Ok(800_000)
    }

    fn tx_confirmations(&self, _txid: &str) -> Result<u32> {
        Ok(6)
    }

    fn utxos(&self, _address: &str) -> Result<Vec<Utxo>> {
        Ok(self.0.utxos.read().unwrap().clone())
    }
}

struct FakeBroadcaster(SharedState);

impl Broadcaster for FakeBroadcaster {
    fn broadcast(&self, raw_tx_hex: &str) -> Result<String> {
        let txid = RawTransaction::from_hex(raw_tx_hex)?.txid();
        self.0.broadcasts.write().unwrap().push(raw_tx_hex.to_string());
        Ok(txid)
    }
}

struct FakeMailer(SharedState);

impl MailTransport for FakeMailer {
    fn send_mail(&self, to: &str, _subject: &str, _body: &str) -> Result<()> {
        self.0.mails.write().unwrap().push(to.to_string());
        Ok(())
    }
}

struct NullHttp;

impl HttpTransport for NullHttp {
    fn post_json(&self, _url: &str, _payload: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

struct FakeClock(SharedState);

impl Clock for FakeClock {
    fn now(&self) -> i64 {
        self.0.now.load(Ordering::SeqCst) as i64
    }
}

fn engine_with(state: &SharedState) -> (Engine, tempfile::TempDir, PrivateKey) {
    let dir = tempfile::tempdir().unwrap();
    let key = PrivateKey::from_scalar(num_key(), true).unwrap();
    let engine = Engine::open(
        dir.path(),
        Collaborators {
            wallet: Box::new(FixedWallet { key: key.clone() }),
            chain: Box::new(FakeChain(state.clone())),
            broadcaster: Box::new(FakeBroadcaster(state.clone())),
            mailer: Box::new(FakeMailer(state.clone())),
            http: Box::new(NullHttp),
            clock: Box::new(FakeClock(state.clone())),
        },
    )
    .unwrap();
    (engine, dir, key)
}

fn num_key() -> num_bigint::BigInt {
    num_bigint::BigInt::from(55_555_555_555u64)
}

// ----------------------------------------------------------------------
// Flows
// ----------------------------------------------------------------------

#[test]
fn balance_trigger_sends_mail_once() {
    let state = SharedState::default();
    let (engine, _dir, _key) = engine_with(&state);

    engine
        .save_action(json!({
            "id": "warn-ops",
            "type": "send_mail",
            "to": "ops@example.com",
            "subject": "balance reached",
            "body": "threshold met"
        }))
        .unwrap();
    engine
        .save_trigger(json!({
            "id": "threshold",
            "type": "balance",
            "address": "1watched",
            "amount": 50_000,
            "actions": ["warn-ops"]
        }))
        .unwrap();

    state.balance.store(49_999, Ordering::SeqCst);
    let report = engine.check_triggers(None).unwrap();
    assert!(report.fired.is_empty());

    state.balance.store(50_000, Ordering::SeqCst);
    let report = engine.check_triggers(None).unwrap();
    assert_eq!(report.fired, vec!["threshold"]);
    assert_eq!(state.mails.read().unwrap().len(), 1);

    // Terminal now; nothing more happens without an explicit reset.
    engine.check_triggers(None).unwrap();
    assert_eq!(state.mails.read().unwrap().len(), 1);
    assert_eq!(
        engine.get_trigger("threshold").unwrap().status,
        TriggerStatus::Succeeded
    );

    engine.reset_trigger("threshold").unwrap();
    engine.check_triggers(None).unwrap();
    assert_eq!(state.mails.read().unwrap().len(), 2);
}

#[test]
fn http_trigger_activates_out_of_band_and_pays_out() {
    let state = SharedState::default();
    let (engine, _dir, key) = engine_with(&state);
    let source = key.public_key().address(&MAINNET);

    state.utxos.write().unwrap().push(Utxo {
        address: source,
        value: 40_000,
        txid: "11".repeat(32),
        vout: 0,
        confirmations: 2,
    });

    engine
        .save_action(json!({
            "id": "payout",
            "type": "send_transaction",
            "account": "hot",
            "miner_fee": 10_000,
            "payment": {"mode": "many", "distribution": {
                "1BitcoinEaterAddressDontSendf59kuE": 25.0,
                "1CounterpartyXXXXXXXXXXXXXXXUWLpVr": 75.0
            }}
        }))
        .unwrap();
    engine
        .save_trigger(json!({
            "id": "webhook-payout",
            "type": "http_post",
            "actions": ["payout"]
        }))
        .unwrap();

    // The poll loop never fires it.
    let report = engine.check_triggers(None).unwrap();
    assert!(report.fired.is_empty());

    // An inbound request does.
    assert!(engine.activate_trigger("webhook-payout").unwrap());

    let raw = state.broadcasts.read().unwrap().last().cloned().unwrap();
    let tx = RawTransaction::from_hex(&raw).unwrap();
    let mut values: Vec<u64> = tx.outputs.iter().map(|o| o.value).collect();
    values.sort();
    assert_eq!(values, vec![7_500, 22_500]);
}

#[test]
fn dead_mans_switch_via_engine() {
    let state = SharedState::default();
    let (engine, _dir, _key) = engine_with(&state);

    engine
        .save_action(json!({
            "id": "last-will",
            "type": "send_mail",
            "to": "heirs@example.com",
            "subject": "switch fired",
            "body": "so long"
        }))
        .unwrap();
    engine
        .save_trigger(json!({
            "id": "dms",
            "type": "dead_mans_switch",
            "timeout": 60,
            "notify": "owner@example.com",
            "actions": ["last-will"]
        }))
        .unwrap();

    state.now.store(1_000, Ordering::SeqCst);
    engine.arm_trigger("dms").unwrap();

    state.now.store(1_030, Ordering::SeqCst);
    assert!(engine.check_triggers(None).unwrap().fired.is_empty());

    state.now.store(1_060, Ordering::SeqCst);
    assert_eq!(engine.check_triggers(None).unwrap().fired, vec!["dms"]);

    // One warning to the owner, one final mail to the heirs.
    let mails = state.mails.read().unwrap();
    assert_eq!(
        *mails,
        vec!["owner@example.com".to_string(), "heirs@example.com".to_string()]
    );
}

#[test]
fn self_destruct_cleans_up_records() {
    let state = SharedState::default();
    let (engine, _dir, _key) = engine_with(&state);

    engine
        .save_action(json!({"id": "a1", "type": "command", "command": "true"}))
        .unwrap();
    engine
        .save_trigger(json!({
            "id": "short-lived",
            "type": "manual",
            "self_destruct": 500,
            "destruct_actions": true,
            "actions": ["a1"]
        }))
        .unwrap();

    state.now.store(500, Ordering::SeqCst);
    let report = engine.check_triggers(None).unwrap();
    assert_eq!(report.destroyed, vec!["short-lived"]);
    assert!(engine.get_trigger("short-lived").is_err());
    assert!(engine.get_action("a1").is_err());
    assert!(engine.list_triggers().unwrap().is_empty());
}
