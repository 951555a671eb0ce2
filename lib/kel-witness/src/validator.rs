//! Event validation
//!
//! Classifies a signed event against the identifier's current state. The
//! validator is synchronous: everything it needs from storage (the digest
//! already settled at the event's sn, the keys that governed it, whether a
//! delegation anchor exists) is gathered by the caller into a
//! [`ValidationContext`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::WitnessIdentity;
use crate::crypto::{self, SignatureVerifier};
use crate::error::WitnessError;
use crate::machine;
use crate::types::{EscrowReason, EventKind, KeyEvent, KeyState, SignedKeyEvent, Threshold};

#[derive(Debug)]
pub enum Validation {
    Accepted(KeyState),
    Duplicate,
    Escrowed(EscrowReason),
    Rejected(WitnessError),
}

/// Signing authority established before some sn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub keys: Vec<String>,
    pub signing_threshold: Threshold,
    pub next_key_digests: Vec<String>,
}

impl Authority {
    /// Authority set by an establishment event; `None` for interactions.
    pub fn established_by(event: &KeyEvent) -> Option<Self> {
        if !event.kind.is_establishment() {
            return None;
        }
        Some(Self {
            keys: event.keys.clone(),
            signing_threshold: event.signing_threshold.clone()?,
            next_key_digests: event.next_key_digests.clone(),
        })
    }
}

/// Facts read from storage for one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Digest of the accepted event at this event's sn, when one exists
    pub settled_digest: Option<String>,
    /// Authority in force just before this event's sn. Only gathered when
    /// the event contradicts a settled one.
    pub prior_authority: Option<Authority>,
    /// Whether the delegator's log anchors this event (delegated kinds only)
    pub delegation_anchored: bool,
    pub now: DateTime<Utc>,
}

impl ValidationContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            settled_digest: None,
            prior_authority: None,
            delegation_anchored: false,
            now,
        }
    }
}

pub struct EventValidator {
    verifier: Arc<dyn SignatureVerifier>,
    identity: WitnessIdentity,
    require_designation: bool,
}

impl EventValidator {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        identity: WitnessIdentity,
        require_designation: bool,
    ) -> Self {
        Self {
            verifier,
            identity,
            require_designation,
        }
    }

    pub fn validate(
        &self,
        signed: &SignedKeyEvent,
        state: Option<&KeyState>,
        context: &ValidationContext,
    ) -> Validation {
        match self.check(signed, state, context) {
            Ok(validation) => validation,
            Err(e) => Validation::Rejected(e),
        }
    }

    fn check(
        &self,
        signed: &SignedKeyEvent,
        state: Option<&KeyState>,
        context: &ValidationContext,
    ) -> Result<Validation, WitnessError> {
        let event = &signed.event;

        event
            .validate_structure()
            .map_err(WitnessError::InvalidEvent)?;
        event.verify_digest()?;
        event.verify_prefix()?;

        if event.kind.is_establishment() {
            let threshold = event
                .signing_threshold
                .as_ref()
                .ok_or_else(|| WitnessError::InvalidEvent("missing kt".to_string()))?;
            self.verify_signatures(signed, &event.keys, threshold)?;
        }

        if event.kind.is_inception() {
            if let Some(existing) = state {
                return match context.settled_digest.as_deref() {
                    Some(settled) if settled == event.digest => Ok(Validation::Duplicate),
                    _ => Err(WitnessError::AlreadyIncepted(existing.prefix.clone())),
                };
            }
        } else {
            let Some(current) = state else {
                return Ok(Validation::Escrowed(EscrowReason::OutOfOrder));
            };
            if event.sn <= current.sn {
                if context.settled_digest.as_deref() == Some(event.digest.as_str()) {
                    return Ok(Validation::Duplicate);
                }
                // Only a contradiction the controller authorized is duplicity
                self.verify_prior_authority(signed, context.prior_authority.as_ref())?;
                return Err(WitnessError::ConflictingEvent {
                    prefix: event.prefix.clone(),
                    sn: event.sn,
                    accepted: context.settled_digest.clone().unwrap_or_default(),
                    submitted: event.digest.clone(),
                });
            }
            if event.sn > current.sn + 1 {
                return Ok(Validation::Escrowed(EscrowReason::OutOfOrder));
            }

            let prior = event.prior.as_deref().unwrap_or_default();
            if prior != current.digest {
                return Err(WitnessError::PriorDigestMismatch {
                    expected: current.digest.clone(),
                    actual: prior.to_string(),
                });
            }

            match event.kind {
                EventKind::Rot | EventKind::Drt => {
                    verify_commitment(&current.next_key_digests, event)?
                }
                EventKind::Ixn => {
                    self.verify_signatures(signed, &current.keys, &current.signing_threshold)?
                }
                EventKind::Icp | EventKind::Dip => {}
            }
        }

        if self.require_designation {
            self.verify_designation(event, state)?;
        }

        if event.kind.is_delegated() && !context.delegation_anchored {
            return Ok(Validation::Escrowed(EscrowReason::MissingDelegationAnchor));
        }

        let next = machine::apply(state, event, context.now)?;
        Ok(Validation::Accepted(next))
    }

    fn verify_signatures(
        &self,
        signed: &SignedKeyEvent,
        keys: &[String],
        threshold: &Threshold,
    ) -> Result<(), WitnessError> {
        crypto::verify_threshold(
            self.verifier.as_ref(),
            keys,
            threshold,
            &signed.event.signing_bytes()?,
            &signed.signatures,
        )
    }

    fn verify_prior_authority(
        &self,
        signed: &SignedKeyEvent,
        authority: Option<&Authority>,
    ) -> Result<(), WitnessError> {
        let event = &signed.event;
        let authority = authority.ok_or_else(|| {
            WitnessError::InvalidSignature(format!(
                "no signing authority known for {} before sn {}",
                event.prefix, event.sn
            ))
        })?;
        match event.kind {
            EventKind::Rot | EventKind::Drt => {
                verify_commitment(&authority.next_key_digests, event)
            }
            _ => self.verify_signatures(signed, &authority.keys, &authority.signing_threshold),
        }
    }

    fn verify_designation(
        &self,
        event: &KeyEvent,
        state: Option<&KeyState>,
    ) -> Result<(), WitnessError> {
        let witnesses = if event.kind.is_establishment() {
            &event.witnesses
        } else {
            match state {
                Some(current) => &current.witnesses,
                None => &event.witnesses,
            }
        };
        if witnesses.iter().any(|w| w == self.identity.aid()) {
            Ok(())
        } else {
            Err(WitnessError::NotDesignated(event.prefix.clone()))
        }
    }
}

/// A rotation must reveal exactly the keys committed to before it.
fn verify_commitment(next_key_digests: &[String], event: &KeyEvent) -> Result<(), WitnessError> {
    if next_key_digests.is_empty() {
        return Err(WitnessError::UnauthorizedRotation(format!(
            "{} has no next-key commitment",
            event.prefix
        )));
    }
    if event.keys.len() != next_key_digests.len() {
        return Err(WitnessError::UnauthorizedRotation(format!(
            "expected {} key(s), got {}",
            next_key_digests.len(),
            event.keys.len()
        )));
    }
    for (index, (key, commitment)) in event.keys.iter().zip(next_key_digests).enumerate() {
        if crypto::commit_key(key) != *commitment {
            return Err(WitnessError::UnauthorizedRotation(format!(
                "key {} does not match its commitment",
                index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::KeyEventBuilder;
    use crate::crypto::{P256Verifier, SoftwareKeyProvider};
    use crate::types::IndexedSignature;

    fn validator(require_designation: bool) -> EventValidator {
        let identity = WitnessIdentity::new(Arc::new(SoftwareKeyProvider::generate()));
        EventValidator::new(Arc::new(P256Verifier), identity, require_designation)
    }

    fn context() -> ValidationContext {
        ValidationContext::new(Utc::now())
    }

    fn accept(v: &EventValidator, signed: &SignedKeyEvent, state: Option<&KeyState>) -> KeyState {
        match v.validate(signed, state, &context()) {
            Validation::Accepted(next) => next,
            other => panic!("expected acceptance, got {:?}", other),
        }
    }

    #[test]
    fn test_inception_then_duplicate() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);
        assert_eq!(state.sn, 0);

        let settled = ValidationContext {
            settled_digest: Some(icp.event.digest.clone()),
            ..context()
        };
        assert!(matches!(
            v.validate(&icp, Some(&state), &settled),
            Validation::Duplicate
        ));
    }

    #[test]
    fn test_different_inception_for_existing_prefix() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);

        // Stored state settled a different inception for this prefix
        let other = KeyEventBuilder::new(1).incept().unwrap();
        let settled = ValidationContext {
            settled_digest: Some(icp.event.digest.clone()),
            ..context()
        };
        let mut forged_state = state.clone();
        forged_state.prefix = other.event.prefix.clone();
        assert!(matches!(
            v.validate(&other, Some(&forged_state), &settled),
            Validation::Rejected(WitnessError::AlreadyIncepted(_))
        ));
    }

    #[test]
    fn test_tampered_digest_rejected() {
        let v = validator(false);
        let mut icp = KeyEventBuilder::new(1).incept().unwrap();
        icp.event.seals.push(crate::types::Seal {
            i: "Ex".into(),
            s: 0,
            d: "Ey".into(),
        });
        assert!(matches!(
            v.validate(&icp, None, &context()),
            Validation::Rejected(WitnessError::InvalidDigest { .. })
        ));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let v = validator(false);
        let mut icp = KeyEventBuilder::new(1).incept().unwrap();
        let other = SoftwareKeyProvider::generate();
        icp.signatures = vec![IndexedSignature {
            index: 0,
            signature: crate::crypto::KeyProvider::sign(&other, b"junk").unwrap(),
        }];
        assert!(matches!(
            v.validate(&icp, None, &context()),
            Validation::Rejected(WitnessError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_ordering_outcomes() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);

        let ixn1 = builder.interact(vec![]).unwrap();
        let ixn2 = builder.interact(vec![]).unwrap();

        // Gap escrows before prior digest is considered
        assert!(matches!(
            v.validate(&ixn2, Some(&state), &context()),
            Validation::Escrowed(EscrowReason::OutOfOrder)
        ));
        // No state at all also escrows
        assert!(matches!(
            v.validate(&ixn1, None, &context()),
            Validation::Escrowed(EscrowReason::OutOfOrder)
        ));

        let state1 = accept(&v, &ixn1, Some(&state));
        assert_eq!(state1.sn, 1);
        let state2 = accept(&v, &ixn2, Some(&state1));
        assert_eq!(state2.sn, 2);
    }

    #[test]
    fn test_conflicting_event_at_settled_sn() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);
        let ixn = builder.interact(vec![]).unwrap();
        let state1 = accept(&v, &ixn, Some(&state));

        let seal = crate::types::Seal {
            i: "Eother".into(),
            s: 0,
            d: "Eother".into(),
        };
        let fork = KeyEvent::create_interaction(&icp.event, vec![seal]).unwrap();
        let fork = builder.sign(fork).unwrap();
        let settled = ValidationContext {
            settled_digest: Some(ixn.event.digest.clone()),
            prior_authority: Authority::established_by(&icp.event),
            ..context()
        };
        assert!(matches!(
            v.validate(&fork, Some(&state1), &settled),
            Validation::Rejected(WitnessError::ConflictingEvent { sn: 1, .. })
        ));
    }

    #[test]
    fn test_unauthorized_conflict_is_not_duplicity() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);
        let ixn = builder.interact(vec![]).unwrap();
        let state1 = accept(&v, &ixn, Some(&state));

        let seal = crate::types::Seal {
            i: "Eother".into(),
            s: 0,
            d: "Eother".into(),
        };
        let fork = KeyEvent::create_interaction(&icp.event, vec![seal]).unwrap();
        let settled = ValidationContext {
            settled_digest: Some(ixn.event.digest.clone()),
            prior_authority: Authority::established_by(&icp.event),
            ..context()
        };

        let unsigned = SignedKeyEvent {
            event: fork.clone(),
            signatures: vec![],
        };
        assert!(matches!(
            v.validate(&unsigned, Some(&state1), &settled),
            Validation::Rejected(WitnessError::InvalidSignature(_))
        ));

        let mut stranger = KeyEventBuilder::new(1);
        stranger.incept().unwrap();
        let foreign = stranger.sign(fork.clone()).unwrap();
        assert!(matches!(
            v.validate(&foreign, Some(&state1), &settled),
            Validation::Rejected(WitnessError::InvalidSignature(_))
        ));

        // Without the governing keys nothing can be attributed
        let signed = builder.sign(fork).unwrap();
        let unknown = ValidationContext {
            prior_authority: None,
            ..settled
        };
        assert!(matches!(
            v.validate(&signed, Some(&state1), &unknown),
            Validation::Rejected(WitnessError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_conflicting_rotation_must_match_prior_commitment() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);
        let ixn = builder.interact(vec![]).unwrap();
        let state1 = accept(&v, &ixn, Some(&state));

        let mut impostor = KeyEventBuilder::new(1);
        let keys = impostor.current_keys();
        impostor.incept().unwrap();
        let rot = KeyEvent::create_rotation(
            &icp.event,
            keys,
            Threshold::Simple(1),
            vec![],
            vec![],
            0,
        )
        .unwrap();
        let rot = impostor.sign(rot).unwrap();
        let settled = ValidationContext {
            settled_digest: Some(ixn.event.digest.clone()),
            prior_authority: Authority::established_by(&icp.event),
            ..context()
        };
        assert!(matches!(
            v.validate(&rot, Some(&state1), &settled),
            Validation::Rejected(WitnessError::UnauthorizedRotation(_))
        ));
    }

    #[test]
    fn test_prior_digest_mismatch() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);

        let mut ixn = KeyEvent::create_interaction(&icp.event, vec![]).unwrap();
        ixn.prior = Some(crate::crypto::digest(b"elsewhere"));
        ixn.saidify().unwrap();
        let ixn = builder.sign(ixn).unwrap();
        assert!(matches!(
            v.validate(&ixn, Some(&state), &context()),
            Validation::Rejected(WitnessError::PriorDigestMismatch { .. })
        ));
    }

    #[test]
    fn test_rotation_must_match_commitment() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);

        // Validly signed by keys nobody committed to
        let mut impostor = KeyEventBuilder::new(1);
        let keys = impostor.current_keys();
        impostor.incept().unwrap();
        let rot = KeyEvent::create_rotation(
            &icp.event,
            keys,
            Threshold::Simple(1),
            vec![],
            vec![],
            0,
        )
        .unwrap();
        let rot = impostor.sign(rot).unwrap();
        assert!(matches!(
            v.validate(&rot, Some(&state), &context()),
            Validation::Rejected(WitnessError::UnauthorizedRotation(_))
        ));

        let honest = builder.rotate().unwrap();
        let rotated = accept(&v, &honest, Some(&state));
        assert_eq!(rotated.keys, honest.event.keys);
    }

    #[test]
    fn test_interaction_signed_by_unknown_keys() {
        let v = validator(false);
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let state = accept(&v, &icp, None);

        let mut stale = KeyEventBuilder::new(1);
        let ixn = KeyEvent::create_interaction(&icp.event, vec![]).unwrap();
        stale.incept().unwrap();
        let ixn = stale.sign(ixn).unwrap();
        assert!(matches!(
            v.validate(&ixn, Some(&state), &context()),
            Validation::Rejected(WitnessError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_delegated_inception_waits_for_anchor() {
        let v = validator(false);
        let dip = KeyEventBuilder::new(1)
            .with_delegator("Edelegator")
            .incept()
            .unwrap();
        assert!(matches!(
            v.validate(&dip, None, &context()),
            Validation::Escrowed(EscrowReason::MissingDelegationAnchor)
        ));
        let anchored = ValidationContext {
            delegation_anchored: true,
            ..context()
        };
        assert!(matches!(
            v.validate(&dip, None, &anchored),
            Validation::Accepted(_)
        ));
    }

    #[test]
    fn test_designation() {
        let identity = WitnessIdentity::new(Arc::new(SoftwareKeyProvider::generate()));
        let v = EventValidator::new(Arc::new(P256Verifier), identity.clone(), true);

        let undesignated = KeyEventBuilder::new(1).incept().unwrap();
        assert!(matches!(
            v.validate(&undesignated, None, &context()),
            Validation::Rejected(WitnessError::NotDesignated(_))
        ));

        let designated = KeyEventBuilder::new(1)
            .with_witnesses(vec![identity.aid().to_string()], 1)
            .incept()
            .unwrap();
        assert!(matches!(
            v.validate(&designated, None, &context()),
            Validation::Accepted(_)
        ));
    }
}
