//! Trigger records: persisted conditions with per-type state machines.
//!
//! The type tag is a closed enum; loading a record with an unknown tag
//! is a typed error, never a crash. Condition checks may mutate the
//! record (dead-man's-switch phases, recurring schedules), so the poll
//! loop persists every trigger it touches.

use crate::crypto::ecdsa::{verify_digest, Signature};
use crate::crypto::hashes::sha256d;
use crate::crypto::keys::PublicKey;
use crate::engine::{store, EngineContext};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Pending,
    Active,
    Disabled,
    Succeeded,
    Failed,
}

impl TriggerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TriggerStatus::Succeeded | TriggerStatus::Failed)
    }
}

fn default_status() -> TriggerStatus {
    TriggerStatus::Active
}

fn default_confirmations() -> u32 {
    1
}

fn default_warnings() -> Vec<f64> {
    vec![0.5, 0.75, 0.9]
}

// ============================================================================
// Trigger Kinds
// ============================================================================

/// The closed set of condition evaluators. Variant fields are the
/// type-specific persisted config/state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fires while the address balance is at or above the threshold.
    Balance { address: String, amount: u64 },
    /// Fires once the address has received at least this much in total.
    Received { address: String, amount: u64 },
    /// Fires once the address has sent at least this much in total.
    Sent { address: String, amount: u64 },
    /// Fires once the chain has buried the target height.
    BlockHeight {
        height: u64,
        #[serde(default)]
        confirmations: u64,
    },
    /// Fires once a transaction has enough confirmations.
    TxConfirmation {
        txid: String,
        #[serde(default = "default_confirmations")]
        confirmations: u32,
    },
    /// Fires once the clock passes a fixed instant.
    Timestamp { time: i64 },
    /// Fires on a fixed cadence inside a time window.
    Recurring {
        begin: i64,
        end: i64,
        interval: i64,
        #[serde(default)]
        next_activation: i64,
    },
    /// Fires when another trigger reaches a terminal status.
    TriggerStatus {
        watched_id: String,
        wanted_status: TriggerStatus,
    },
    /// Activated out of band by a correctly signed inbound message;
    /// never fires from the poll loop.
    SignedMessage {
        /// Any supported public-key text encoding.
        pubkey: String,
        #[serde(default)]
        message: Option<String>,
    },
    /// The inbound-request family: fulfilled only by direct activation.
    HttpGet,
    HttpPost,
    HttpDelete,
    HttpOptions,
    /// Armed countdown with staged warnings before it fires.
    DeadMansSwitch {
        /// Seconds from arming to activation.
        timeout: i64,
        #[serde(default)]
        phase: u8,
        #[serde(default)]
        activation_time: Option<i64>,
        /// Fractions of the timeout at which phases 2..=4 begin.
        #[serde(default = "default_warnings")]
        warnings: Vec<f64>,
        /// Mail recipient for phase-transition warnings.
        #[serde(default)]
        notify: Option<String>,
    },
    /// Operator-driven; never fires from the poll loop.
    Manual,
}

impl TriggerKind {
    pub fn is_http(&self) -> bool {
        matches!(
            self,
            TriggerKind::HttpGet
                | TriggerKind::HttpPost
                | TriggerKind::HttpDelete
                | TriggerKind::HttpOptions
        )
    }

    /// Kinds an inbound request may activate directly.
    pub fn is_out_of_band(&self) -> bool {
        self.is_http() || matches!(self, TriggerKind::SignedMessage { .. } | TriggerKind::Manual)
    }
}

// ============================================================================
// Trigger Records
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    #[serde(flatten)]
    pub kind: TriggerKind,
    #[serde(default = "default_status")]
    pub status: TriggerStatus,
    #[serde(default)]
    pub triggered: u32,
    #[serde(default)]
    pub multi: bool,
    /// Unix time at which the record deletes itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_destruct: Option<i64>,
    /// Whether self-destruction also deletes attached actions.
    #[serde(default)]
    pub destruct_actions: bool,
    /// Action ids run, in order, on activation.
    #[serde(default)]
    pub actions: Vec<String>,
}

enum Eval {
    No,
    Yes,
    RecurringEnded,
}

impl Trigger {
    /// Evaluate this trigger's condition against the collaborators.
    /// May advance per-type state (phases, schedules) as a side effect.
    pub fn conditions_fulfilled(&mut self, ctx: &EngineContext) -> Result<bool> {
        let now = ctx.clock.now();
        let id = self.id.clone();
        let eval = match &mut self.kind {
            TriggerKind::Balance { address, amount } => {
                if ctx.chain.balance(address)? >= *amount {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::Received { address, amount } => {
                if ctx.chain.total_received(address)? >= *amount {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::Sent { address, amount } => {
                if ctx.chain.total_sent(address)? >= *amount {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::BlockHeight {
                height,
                confirmations,
            } => {
                if ctx.chain.block_height()? >= *height + *confirmations {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::TxConfirmation {
                txid,
                confirmations,
            } => {
                if ctx.chain.tx_confirmations(txid)? >= *confirmations {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::Timestamp { time } => {
                if now >= *time {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::Recurring {
                begin,
                end,
                next_activation,
                ..
            } => {
                if *next_activation == 0 {
                    // Unset schedules start at the window begin.
                    *next_activation = *begin;
                }
                if now > *end {
                    Eval::RecurringEnded
                } else if *begin <= *next_activation && *next_activation <= now {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::TriggerStatus {
                watched_id,
                wanted_status,
            } => {
                let watched = store::load_trigger(ctx.storage, watched_id)?;
                if watched.status == *wanted_status && watched.status.is_terminal() {
                    Eval::Yes
                } else {
                    Eval::No
                }
            }
            TriggerKind::DeadMansSwitch {
                timeout,
                phase,
                activation_time,
                warnings,
                notify,
            } => {
                if *phase == 0 {
                    Eval::No
                } else if let Some(deadline) = *activation_time {
                    if now >= deadline {
                        *phase = 5;
                        Eval::Yes
                    } else {
                        let armed_at = deadline - *timeout;
                        let fraction = (now - armed_at) as f64 / *timeout as f64;
                        let target =
                            (1 + warnings.iter().filter(|w| fraction >= **w).count() as u8).min(4);
                        if target > *phase {
                            for step in (*phase + 1)..=target {
                                tracing::info!(trigger = %id, phase = step, "dead man's switch advanced");
                                if let Some(to) = notify.as_deref() {
                                    let subject =
                                        format!("dead man's switch '{id}' reached phase {step}");
                                    let body = format!(
                                        "{} seconds until activation",
                                        deadline - now
                                    );
                                    if let Err(e) = ctx.mailer.send_mail(to, &subject, &body) {
                                        tracing::warn!(trigger = %id, error = %e, "warning mail failed");
                                    }
                                }
                            }
                            *phase = target;
                        }
                        Eval::No
                    }
                } else {
                    Eval::No
                }
            }
            // Fulfilled only by direct inbound activation.
            TriggerKind::SignedMessage { .. }
            | TriggerKind::HttpGet
            | TriggerKind::HttpPost
            | TriggerKind::HttpDelete
            | TriggerKind::HttpOptions
            | TriggerKind::Manual => Eval::No,
        };

        match eval {
            Eval::Yes => Ok(true),
            Eval::No => Ok(false),
            Eval::RecurringEnded => {
                tracing::info!(trigger = %id, "recurring schedule ended");
                self.status = TriggerStatus::Succeeded;
                Ok(false)
            }
        }
    }

    /// Run every attached action in order; a failing action does not
    /// stop the ones after it, but marks this trigger Failed.
    pub fn activate(&mut self, ctx: &EngineContext) -> bool {
        let mut all_ok = true;
        for action_id in &self.actions {
            let ok = match store::load_action(ctx.storage, action_id) {
                Ok(mut action) => {
                    let ok = action.run(ctx);
                    if let Err(e) = store::persist_action(ctx.storage, &action) {
                        tracing::warn!(action = %action_id, error = %e, "failed to persist action state");
                    }
                    ok
                }
                Err(e) => {
                    tracing::warn!(trigger = %self.id, action = %action_id, error = %e, "action lookup failed");
                    false
                }
            };
            if !ok {
                all_ok = false;
            }
        }
        self.triggered = self.triggered.saturating_add(1);

        self.status = if !all_ok {
            TriggerStatus::Failed
        } else {
            match &mut self.kind {
                // Recurring re-arms by advancing its schedule until the
                // window closes, regardless of the multi flag.
                TriggerKind::Recurring {
                    end,
                    interval,
                    next_activation,
                    ..
                } => {
                    if *next_activation + *interval <= *end {
                        *next_activation += *interval;
                        TriggerStatus::Active
                    } else {
                        TriggerStatus::Succeeded
                    }
                }
                // HTTP triggers reset implicitly when multi-fire.
                TriggerKind::HttpGet
                | TriggerKind::HttpPost
                | TriggerKind::HttpDelete
                | TriggerKind::HttpOptions => {
                    if self.multi {
                        self.triggered = 0;
                        TriggerStatus::Active
                    } else {
                        TriggerStatus::Succeeded
                    }
                }
                // Everything else stays eligible only with multi, and
                // needs an explicit reset otherwise.
                _ => {
                    if self.multi {
                        TriggerStatus::Active
                    } else {
                        TriggerStatus::Succeeded
                    }
                }
            }
        };
        all_ok
    }

    /// Arm a dead man's switch: phase 1, deadline `now + timeout`.
    pub fn arm(&mut self, now: i64) -> Result<()> {
        match &mut self.kind {
            TriggerKind::DeadMansSwitch {
                timeout,
                phase,
                activation_time,
                ..
            } => {
                *phase = 1;
                *activation_time = Some(now + *timeout);
                Ok(())
            }
            _ => anyhow::bail!("trigger '{}' is not a dead man's switch", self.id),
        }
    }

    /// Explicit reset back to eligibility; re-arms a still-armed dead
    /// man's switch from `now`.
    pub fn reset(&mut self, now: i64) {
        self.status = TriggerStatus::Active;
        self.triggered = 0;
        let rearm = matches!(
            &self.kind,
            TriggerKind::DeadMansSwitch { phase, .. } if *phase >= 1 && *phase < 5
        );
        if rearm {
            let _ = self.arm(now);
        }
    }

    /// Check an inbound signed message against the configured key.
    pub fn verify_signed_message(&self, message: &str, signature_der_hex: &str) -> Result<bool> {
        let TriggerKind::SignedMessage {
            pubkey,
            message: expected,
        } = &self.kind
        else {
            anyhow::bail!("trigger '{}' is not a signed-message trigger", self.id);
        };
        if let Some(expected) = expected {
            if expected != message {
                return Ok(false);
            }
        }
        let (public, _) = PublicKey::decode_text(pubkey)?;
        let der = hex::decode(signature_der_hex)?;
        let signature = Signature::from_der(&der)?;
        let digest = sha256d(message.as_bytes());
        Ok(verify_digest(&public.point, &digest, &signature))
    }
}

// ============================================================================
// Tests
// ============================================================================
