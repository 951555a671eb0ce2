//! Key state transitions
//!
//! `apply` is the only way a [`KeyState`] is created or advanced. It is pure:
//! authorization (signatures, commitments, anchors) is checked by the
//! validator before it is called.

use chrono::{DateTime, Utc};

use crate::error::WitnessError;
use crate::types::{EventKind, KeyEvent, KeyState, Threshold};

pub fn apply(
    state: Option<&KeyState>,
    event: &KeyEvent,
    now: DateTime<Utc>,
) -> Result<KeyState, WitnessError> {
    match (event.kind, state) {
        (EventKind::Icp | EventKind::Dip, None) => incept(event, now),
        (EventKind::Icp | EventKind::Dip, Some(existing)) => {
            Err(WitnessError::AlreadyIncepted(existing.prefix.clone()))
        }
        (EventKind::Rot, Some(current)) => {
            if current.is_delegated() {
                return Err(WitnessError::InvalidEvent(
                    "delegated identifiers rotate with drt".to_string(),
                ));
            }
            rotate(current, event, now)
        }
        (EventKind::Drt, Some(current)) => {
            if !current.is_delegated() {
                return Err(WitnessError::InvalidEvent(
                    "drt requires a delegated identifier".to_string(),
                ));
            }
            rotate(current, event, now)
        }
        (EventKind::Ixn, Some(current)) => interact(current, event, now),
        (EventKind::Rot | EventKind::Drt | EventKind::Ixn, None) => Err(
            WitnessError::InvalidEvent(format!("{} requires an incepted identifier", event.kind)),
        ),
    }
}

fn signing_threshold(event: &KeyEvent) -> Result<Threshold, WitnessError> {
    event
        .signing_threshold
        .clone()
        .ok_or_else(|| WitnessError::InvalidEvent(format!("{} event requires kt", event.kind)))
}

fn witness_threshold(event: &KeyEvent) -> Result<u32, WitnessError> {
    event
        .witness_threshold
        .ok_or_else(|| WitnessError::InvalidEvent(format!("{} event requires bt", event.kind)))
}

fn incept(event: &KeyEvent, now: DateTime<Utc>) -> Result<KeyState, WitnessError> {
    if event.sn != 0 {
        return Err(WitnessError::InvalidEvent(
            "inception must have sn 0".to_string(),
        ));
    }
    Ok(KeyState {
        prefix: event.prefix.clone(),
        sn: 0,
        digest: event.digest.clone(),
        last_event_kind: event.kind,
        signing_threshold: signing_threshold(event)?,
        keys: event.keys.clone(),
        next_key_digests: event.next_key_digests.clone(),
        witness_threshold: witness_threshold(event)?,
        witnesses: event.witnesses.clone(),
        delegator: event.delegator.clone(),
        updated_at: now,
    })
}

/// Checks `event` is the direct successor of `current`.
fn check_successor(current: &KeyState, event: &KeyEvent) -> Result<(), WitnessError> {
    if event.prefix != current.prefix {
        return Err(WitnessError::InvalidEvent(format!(
            "event for {} applied to state of {}",
            event.prefix, current.prefix
        )));
    }
    if event.sn != current.sn + 1 {
        return Err(WitnessError::InvalidEvent(format!(
            "expected sn {}, got {}",
            current.sn + 1,
            event.sn
        )));
    }
    match event.prior.as_deref() {
        Some(prior) if prior == current.digest => Ok(()),
        other => Err(WitnessError::PriorDigestMismatch {
            expected: current.digest.clone(),
            actual: other.unwrap_or_default().to_string(),
        }),
    }
}

fn rotate(
    current: &KeyState,
    event: &KeyEvent,
    now: DateTime<Utc>,
) -> Result<KeyState, WitnessError> {
    check_successor(current, event)?;
    Ok(KeyState {
        prefix: current.prefix.clone(),
        sn: event.sn,
        digest: event.digest.clone(),
        last_event_kind: event.kind,
        signing_threshold: signing_threshold(event)?,
        keys: event.keys.clone(),
        next_key_digests: event.next_key_digests.clone(),
        witness_threshold: witness_threshold(event)?,
        witnesses: event.witnesses.clone(),
        delegator: current.delegator.clone(),
        updated_at: now,
    })
}

fn interact(
    current: &KeyState,
    event: &KeyEvent,
    now: DateTime<Utc>,
) -> Result<KeyState, WitnessError> {
    check_successor(current, event)?;
    Ok(KeyState {
        sn: event.sn,
        digest: event.digest.clone(),
        last_event_kind: event.kind,
        updated_at: now,
        ..current.clone()
    })
}
