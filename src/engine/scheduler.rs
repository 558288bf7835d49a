//! The poll pass: evaluate every Active trigger, one at a time, to
//! completion. One bad record never halts the loop.

use crate::engine::trigger::TriggerStatus;
use crate::engine::{store, EngineContext};
use crate::error::EngineError;

/// What a single `check_triggers` pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Active triggers whose condition was evaluated.
    pub checked: usize,
    /// Triggers that fired with every action succeeding.
    pub fired: Vec<String>,
    /// Triggers that fired but had at least one failing action.
    pub failed: Vec<String>,
    /// Triggers removed by self-destruct.
    pub destroyed: Vec<String>,
    /// Triggers skipped because of a record or collaborator error.
    pub errors: Vec<String>,
}

/// Evaluate all persisted triggers, or a single one by id.
///
/// Each trigger is processed to completion — condition check,
/// activation, action execution, persistence — before the next one.
pub fn check_triggers(
    ctx: &EngineContext,
    only: Option<&str>,
) -> Result<PollReport, EngineError> {
    let ids = match only {
        Some(id) => vec![id.to_string()],
        None => store::list_triggers(ctx.storage)?,
    };

    let mut report = PollReport::default();
    for id in ids {
        let mut trigger = match store::load_trigger(ctx.storage, &id) {
            Ok(trigger) => trigger,
            Err(e) => {
                tracing::warn!(trigger = %id, error = %e, "skipping unreadable trigger");
                report.errors.push(id);
                continue;
            }
        };

        // Self-destruct is independent of condition state.
        let now = ctx.clock.now();
        if let Some(deadline) = trigger.self_destruct {
            if now >= deadline {
                if trigger.destruct_actions {
                    for action_id in &trigger.actions {
                        if let Err(e) = store::delete_action(ctx.storage, action_id) {
                            tracing::warn!(action = %action_id, error = %e, "self-destruct could not delete action");
                        }
                    }
                }
                match store::delete_trigger(ctx.storage, &id) {
                    Ok(()) => {
                        tracing::info!(trigger = %id, "self-destructed");
                        report.destroyed.push(id);
                    }
                    Err(e) => {
                        tracing::warn!(trigger = %id, error = %e, "self-destruct failed");
                        report.errors.push(id);
                    }
                }
                continue;
            }
        }

        if trigger.status != TriggerStatus::Active {
            continue;
        }
        report.checked += 1;

        match trigger.conditions_fulfilled(ctx) {
            Ok(true) => {
                tracing::info!(trigger = %id, "conditions fulfilled");
                if trigger.activate(ctx) {
                    report.fired.push(id.clone());
                } else {
                    report.failed.push(id.clone());
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(trigger = %id, error = %e, "condition evaluation failed");
                report.errors.push(id.clone());
            }
        }

        // Condition checks may advance per-type state even when they
        // do not fire.
        if let Err(e) = store::persist_trigger(ctx.storage, &trigger) {
            tracing::warn!(trigger = %id, error = %e, "failed to persist trigger state");
        }
    }
    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================
