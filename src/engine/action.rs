//! Action records: persisted effects executed on trigger activation.
//!
//! `run()` never panics or propagates: any resolvable failure is logged
//! and turned into `false`, and `true` is returned only once the effect
//! fully completed — for SendTransaction, only once the signed
//! transaction has been handed to the broadcaster.

use crate::chain::ChainParams;
use crate::engine::EngineContext;
use crate::tx::codec::{Output, Utxo};
use crate::tx::signer::make_custom_transaction;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

fn default_miner_fee() -> u64 {
    10_000
}

fn default_chain_name() -> String {
    "mainnet".to_string()
}

// ============================================================================
// Action Kinds
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Run a shell command and wait for it.
    Command { command: String },
    /// Start a long-running process without waiting.
    SpawnProcess { command: String },
    /// Build, sign and broadcast a transaction.
    SendTransaction(SendTxConfig),
    /// Expose a secret text/link only after activation.
    RevealSecret {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        link: Option<String>,
        #[serde(default)]
        revealed: bool,
    },
    SendMail {
        to: String,
        subject: String,
        body: String,
    },
    Webhook {
        url: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// How a SendTransaction splits the spendable coins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Payment {
    /// Everything (after fees) to one recipient.
    Single { recipient: String },
    /// Percentage distribution map; integer satoshi amounts, the last
    /// recipient absorbing the rounding remainder.
    Many { distribution: BTreeMap<String, f64> },
    /// Explicit address/amount list that must spend the budget exactly.
    Preloaded { outputs: Vec<PreloadedOutput> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreloadedOutput {
    pub address: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendTxConfig {
    /// Wallet account the spend is funded from.
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub index: u32,
    /// Spend from an explicit address instead of account/index.
    #[serde(default)]
    pub address: Option<String>,
    pub payment: Payment,
    /// Optional percentage carve-out sent to `fee_address`.
    #[serde(default)]
    pub fee_percent: f64,
    #[serde(default)]
    pub fee_address: Option<String>,
    /// Satoshis left to miners; keeps the signer's fee equality exact.
    #[serde(default = "default_miner_fee")]
    pub miner_fee: u64,
    #[serde(default)]
    pub op_return: Option<String>,
    #[serde(default = "default_chain_name")]
    pub chain: String,
}

// ============================================================================
// Action Records
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    /// Execute the effect; `false` on any resolvable failure, with the
    /// reason logged rather than propagated.
    pub fn run(&mut self, ctx: &EngineContext) -> bool {
        let id = self.id.clone();
        match self.execute(ctx) {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(action = %id, error = %e, "action failed");
                false
            }
        }
    }

    fn execute(&mut self, ctx: &EngineContext) -> Result<bool> {
        match &mut self.kind {
            ActionKind::Command { command } => run_command(command, false),
            ActionKind::SpawnProcess { command } => run_command(command, true),
            ActionKind::SendTransaction(config) => send_transaction(ctx, config),
            ActionKind::RevealSecret { revealed, .. } => {
                *revealed = true;
                Ok(true)
            }
            ActionKind::SendMail { to, subject, body } => {
                ctx.mailer.send_mail(to, subject, body)?;
                Ok(true)
            }
            ActionKind::Webhook { url, payload } => {
                ctx.http.post_json(url, payload)?;
                Ok(true)
            }
        }
    }

    /// The secret carried by a RevealSecret action, exposed only after
    /// the action has run.
    pub fn revealed_secret(&self) -> Option<serde_json::Value> {
        match &self.kind {
            ActionKind::RevealSecret {
                text,
                link,
                revealed: true,
            } => Some(serde_json::json!({ "text": text, "link": link })),
            _ => None,
        }
    }
}

fn run_command(command: &str, detach: bool) -> Result<bool> {
    let mut process = std::process::Command::new("sh");
    process.arg("-c").arg(command);
    if detach {
        let child = process.spawn()?;
        tracing::info!(pid = child.id(), %command, "process spawned");
        return Ok(true);
    }
    let output = process.output()?;
    if output.status.success() {
        Ok(true)
    } else {
        tracing::warn!(
            %command,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "command failed"
        );
        Ok(false)
    }
}

// ============================================================================
// SendTransaction
// ============================================================================

/// Integer-satoshi percentage split; the last recipient absorbs the
/// rounding remainder so the amounts always sum to `total` exactly.
pub fn split_distribution(
    total: u64,
    distribution: &BTreeMap<String, f64>,
) -> Result<Vec<(String, u64)>> {
    if distribution.is_empty() {
        anyhow::bail!("distribution map is empty");
    }
    if distribution.values().any(|p| *p <= 0.0) {
        anyhow::bail!("distribution percentages must be positive");
    }
    let sum: f64 = distribution.values().sum();
    if (sum - 100.0).abs() > 1e-6 {
        anyhow::bail!("distribution percentages sum to {sum}, expected 100");
    }
    let mut out = Vec::with_capacity(distribution.len());
    let mut assigned = 0u64;
    for (i, (address, pct)) in distribution.iter().enumerate() {
        let amount = if i == distribution.len() - 1 {
            total - assigned
        } else {
            ((total as f64) * pct / 100.0).floor() as u64
        };
        assigned += amount;
        out.push((address.clone(), amount));
    }
    Ok(out)
}

fn send_transaction(ctx: &EngineContext, config: &SendTxConfig) -> Result<bool> {
    let params = ChainParams::from_name(&config.chain)?;

    let (source_address, key) = match &config.address {
        Some(addr) => (addr.clone(), ctx.wallet.key_for_address(addr)?),
        None => {
            let key = ctx.wallet.key_for_account(&config.account, config.index)?;
            (key.public_key().address(&params), key)
        }
    };

    let utxos: Vec<Utxo> = ctx
        .chain
        .utxos(&source_address)?
        .into_iter()
        .filter(|u| u.confirmations > 0)
        .collect();
    if utxos.is_empty() {
        anyhow::bail!("no confirmed coins at {source_address}");
    }
    let spendable: u64 = utxos.iter().map(|u| u.value).sum();
    if spendable <= config.miner_fee {
        anyhow::bail!(
            "spendable {spendable} sat cannot cover the {} sat miner fee",
            config.miner_fee
        );
    }
    let mut budget = spendable - config.miner_fee;

    let mut outputs: Vec<Output> = Vec::new();
    if config.fee_percent > 0.0 {
        let fee_address = config
            .fee_address
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("fee_percent set without a fee_address"))?;
        let basis_points = (config.fee_percent * 100.0).round() as u64;
        let carve = ((budget as u128) * (basis_points as u128) / 10_000) as u64;
        if carve > 0 {
            outputs.push(Output::to_address(fee_address, carve));
            budget -= carve;
        }
    }

    match &config.payment {
        Payment::Single { recipient } => {
            outputs.push(Output::to_address(recipient.as_str(), budget));
        }
        Payment::Many { distribution } => {
            for (address, amount) in split_distribution(budget, distribution)? {
                outputs.push(Output::to_address(address, amount));
            }
        }
        Payment::Preloaded {
            outputs: preloaded,
        } => {
            let total: u64 = preloaded.iter().map(|o| o.amount).sum();
            if total != budget {
                anyhow::bail!("preloaded outputs spend {total} sat, budget is {budget} sat");
            }
            for output in preloaded {
                outputs.push(Output::to_address(output.address.as_str(), output.amount));
            }
        }
    }

    let keys = HashMap::from([(source_address.clone(), key)]);
    let op_return = config.op_return.as_ref().map(|s| s.as_bytes());
    let tx = make_custom_transaction(
        &keys,
        &utxos,
        &outputs,
        config.miner_fee,
        op_return,
        &params,
    )?;
    let txid = ctx.broadcaster.broadcast(&tx.to_hex())?;
    tracing::info!(%txid, from = %source_address, "transaction broadcast");
    Ok(true)
}

// ============================================================================
// Tests
// ============================================================================
