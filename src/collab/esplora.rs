//! Esplora-style REST chain client (mempool.space and compatibles).

use crate::collab::{Broadcaster, ChainSource};
use crate::tx::codec::Utxo;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

const MEMPOOL_MAINNET_API: &str = "https://mempool.space/api";
const MEMPOOL_TESTNET_API: &str = "https://mempool.space/testnet/api";

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UtxoResponse {
    pub txid: String,
    pub vout: u32,
    pub status: ConfirmationStatus,
    pub value: u64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationStatus {
    pub confirmed: bool,
    pub block_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AddressInfo {
    pub chain_stats: ChainStats,
}

#[derive(Debug, Deserialize)]
pub struct ChainStats {
    pub funded_txo_sum: u64,
    pub spent_txo_sum: u64,
}

// ============================================================================
// Client
// ============================================================================

pub struct EsploraClient {
    base_url: String,
    client: Client,
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    pub fn mainnet() -> Self {
        Self::new(MEMPOOL_MAINNET_API)
    }

    pub fn testnet() -> Self {
        Self::new(MEMPOOL_TESTNET_API)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("GET {url} failed"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("API error {status}: {body}");
        }
        response
            .json()
            .with_context(|| format!("failed to parse response from {url}"))
    }

    fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("GET {url} failed"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("API error {status}: {body}");
        }
        Ok(response.text()?.trim().to_string())
    }

    fn address_info(&self, address: &str) -> Result<AddressInfo> {
        self.get_json(&format!("/address/{address}"))
    }
}

impl ChainSource for EsploraClient {
    fn balance(&self, address: &str) -> Result<u64> {
        let info = self.address_info(address)?;
        Ok(info
            .chain_stats
            .funded_txo_sum
            .saturating_sub(info.chain_stats.spent_txo_sum))
    }

    fn total_received(&self, address: &str) -> Result<u64> {
        Ok(self.address_info(address)?.chain_stats.funded_txo_sum)
    }

    fn total_sent(&self, address: &str) -> Result<u64> {
        Ok(self.address_info(address)?.chain_stats.spent_txo_sum)
    }

    fn block_height(&self) -> Result<u64> {
        self.get_text("/blocks/tip/height")?
            .parse()
            .context("tip height is not a number")
    }

    fn tx_confirmations(&self, txid: &str) -> Result<u32> {
        let status: ConfirmationStatus = self.get_json(&format!("/tx/{txid}/status"))?;
        confirmations_from(&status, self.block_height()?)
    }

    fn utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let responses: Vec<UtxoResponse> = self.get_json(&format!("/address/{address}/utxo"))?;
        let tip = self.block_height()?;
        responses
            .into_iter()
            .map(|u| {
                Ok(Utxo {
                    address: address.to_string(),
                    value: u.value,
                    txid: u.txid,
                    vout: u.vout,
                    confirmations: confirmations_from(&u.status, tip)?,
                })
            })
            .collect()
    }
}

impl Broadcaster for EsploraClient {
    fn broadcast(&self, raw_tx_hex: &str) -> Result<String> {
        let url = format!("{}/tx", self.base_url);
        let response = self
            .client
            .post(&url)
            .body(raw_tx_hex.to_string())
            .send()
            .context("failed to broadcast transaction")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("broadcast failed {status}: {body}");
        }
        Ok(response.text()?.trim().to_string())
    }
}

fn confirmations_from(status: &ConfirmationStatus, tip: u64) -> Result<u32> {
    if !status.confirmed {
        return Ok(0);
    }
    let height = status
        .block_height
        .context("confirmed tx without a block height")?;
    Ok(tip.saturating_sub(height).saturating_add(1) as u32)
}
