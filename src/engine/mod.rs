//! The trigger/action engine.
//!
//! Persisted condition records (`trigger`) fire persisted effect
//! records (`action`) through a poll entry point (`scheduler`), all
//! stored one JSON document per id (`store`). The engine talks to the
//! outside world only through the collaborator traits in
//! [`crate::collab`].

pub mod action;
pub mod scheduler;
pub mod store;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testkit;

use crate::collab::{Broadcaster, ChainSource, Clock, HttpTransport, MailTransport, WalletStore};
use crate::engine::action::Action;
use crate::engine::scheduler::PollReport;
use crate::engine::store::{FileStorage, Storage};
use crate::engine::trigger::{Trigger, TriggerKind, TriggerStatus};
use crate::error::EngineError;
use anyhow::Result;
use std::path::Path;

/// Borrowed view of everything a trigger or action may touch while it
/// runs. Handed down through one poll pass at a time.
pub struct EngineContext<'a> {
    pub storage: &'a dyn Storage,
    pub wallet: &'a dyn WalletStore,
    pub chain: &'a dyn ChainSource,
    pub broadcaster: &'a dyn Broadcaster,
    pub mailer: &'a dyn MailTransport,
    pub http: &'a dyn HttpTransport,
    pub clock: &'a dyn Clock,
}

/// The owned collaborator set an [`Engine`] is wired with.
pub struct Collaborators {
    pub wallet: Box<dyn WalletStore>,
    pub chain: Box<dyn ChainSource>,
    pub broadcaster: Box<dyn Broadcaster>,
    pub mailer: Box<dyn MailTransport>,
    pub http: Box<dyn HttpTransport>,
    pub clock: Box<dyn Clock>,
}

/// Facade over storage, records and the poll loop. An external
/// scheduler calls [`Engine::check_triggers`] on a fixed cadence;
/// inbound HTTP handlers call the out-of-band activation entry points.
pub struct Engine {
    storage: Box<dyn Storage>,
    collab: Collaborators,
}

impl Engine {
    pub fn new(storage: Box<dyn Storage>, collab: Collaborators) -> Self {
        Self { storage, collab }
    }

    /// Engine over a state directory on disk.
    pub fn open(state_dir: impl AsRef<Path>, collab: Collaborators) -> Result<Self> {
        let storage = FileStorage::new(state_dir.as_ref().to_path_buf())?;
        Ok(Self::new(Box::new(storage), collab))
    }

    fn context(&self) -> EngineContext<'_> {
        EngineContext {
            storage: self.storage.as_ref(),
            wallet: self.collab.wallet.as_ref(),
            chain: self.collab.chain.as_ref(),
            broadcaster: self.collab.broadcaster.as_ref(),
            mailer: self.collab.mailer.as_ref(),
            http: self.collab.http.as_ref(),
            clock: self.collab.clock.as_ref(),
        }
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    pub fn save_trigger(&self, partial: serde_json::Value) -> Result<Trigger, EngineError> {
        store::save_trigger(self.storage.as_ref(), partial)
    }

    pub fn get_trigger(&self, id: &str) -> Result<Trigger, EngineError> {
        store::load_trigger(self.storage.as_ref(), id)
    }

    pub fn delete_trigger(&self, id: &str) -> Result<(), EngineError> {
        store::delete_trigger(self.storage.as_ref(), id)
    }

    pub fn list_triggers(&self) -> Result<Vec<String>, EngineError> {
        store::list_triggers(self.storage.as_ref())
    }

    pub fn save_action(&self, partial: serde_json::Value) -> Result<Action, EngineError> {
        store::save_action(self.storage.as_ref(), partial)
    }

    pub fn get_action(&self, id: &str) -> Result<Action, EngineError> {
        store::load_action(self.storage.as_ref(), id)
    }

    pub fn delete_action(&self, id: &str) -> Result<(), EngineError> {
        store::delete_action(self.storage.as_ref(), id)
    }

    pub fn list_actions(&self) -> Result<Vec<String>, EngineError> {
        store::list_actions(self.storage.as_ref())
    }

    // ------------------------------------------------------------------
    // Polling & Activation
    // ------------------------------------------------------------------

    /// One poll pass over all triggers, or a single id.
    pub fn check_triggers(&self, only: Option<&str>) -> Result<PollReport, EngineError> {
        scheduler::check_triggers(&self.context(), only)
    }

    /// Out-of-band activation for the HTTP-request family and Manual
    /// triggers. Overlapping calls for the same id may each activate;
    /// the condition-free kinds do not self-check.
    pub fn activate_trigger(&self, id: &str) -> Result<bool> {
        let mut trigger = store::load_trigger(self.storage.as_ref(), id)?;
        if !trigger.kind.is_out_of_band() {
            anyhow::bail!("trigger '{id}' cannot be activated out of band");
        }
        if matches!(trigger.kind, TriggerKind::SignedMessage { .. }) {
            anyhow::bail!("trigger '{id}' needs a signed message to activate");
        }
        if trigger.status != TriggerStatus::Active {
            tracing::warn!(trigger = %id, status = ?trigger.status, "refusing out-of-band activation");
            return Ok(false);
        }
        let ctx = self.context();
        let ok = trigger.activate(&ctx);
        store::persist_trigger(self.storage.as_ref(), &trigger)?;
        Ok(ok)
    }

    /// Activation gated on a correctly signed inbound message.
    pub fn activate_signed_message(
        &self,
        id: &str,
        message: &str,
        signature_der_hex: &str,
    ) -> Result<bool> {
        let mut trigger = store::load_trigger(self.storage.as_ref(), id)?;
        if !trigger.verify_signed_message(message, signature_der_hex)? {
            tracing::warn!(trigger = %id, "rejected signed-message activation");
            return Ok(false);
        }
        if trigger.status != TriggerStatus::Active {
            return Ok(false);
        }
        let ctx = self.context();
        let ok = trigger.activate(&ctx);
        store::persist_trigger(self.storage.as_ref(), &trigger)?;
        Ok(ok)
    }

    /// Arm a dead man's switch.
    pub fn arm_trigger(&self, id: &str) -> Result<()> {
        let mut trigger = store::load_trigger(self.storage.as_ref(), id)?;
        trigger.arm(self.collab.clock.now())?;
        store::persist_trigger(self.storage.as_ref(), &trigger)?;
        Ok(())
    }

    /// Explicitly reset a trigger back to eligibility.
    pub fn reset_trigger(&self, id: &str) -> Result<()> {
        let mut trigger = store::load_trigger(self.storage.as_ref(), id)?;
        trigger.reset(self.collab.clock.now());
        store::persist_trigger(self.storage.as_ref(), &trigger)?;
        Ok(())
    }
}
