//! Controller-side event construction
//!
//! Holds current and pre-rotated signing keys for one identifier and
//! produces signed, chained events. Witnesses never create events; this is
//! used by clients and by tests exercising the witness.

use crate::crypto::{KeyProvider, SoftwareKeyProvider, commit_key};
use crate::error::WitnessError;
use crate::types::{IndexedSignature, KeyEvent, Seal, SignedKeyEvent, Threshold};

pub struct KeyEventBuilder {
    current: Vec<SoftwareKeyProvider>,
    next: Vec<SoftwareKeyProvider>,
    witnesses: Vec<String>,
    witness_threshold: u32,
    delegator: Option<String>,
    last_event: Option<KeyEvent>,
}

fn generate(count: usize) -> Vec<SoftwareKeyProvider> {
    (0..count).map(|_| SoftwareKeyProvider::generate()).collect()
}

fn public_keys(providers: &[SoftwareKeyProvider]) -> Vec<String> {
    providers.iter().map(|p| p.public_key()).collect()
}

fn commitments(providers: &[SoftwareKeyProvider]) -> Vec<String> {
    providers
        .iter()
        .map(|p| commit_key(&p.public_key()))
        .collect()
}

impl KeyEventBuilder {
    /// `key_count` keys per establishment event, all required to sign.
    pub fn new(key_count: usize) -> Self {
        let key_count = key_count.max(1);
        Self {
            current: generate(key_count),
            next: generate(key_count),
            witnesses: vec![],
            witness_threshold: 0,
            delegator: None,
            last_event: None,
        }
    }

    pub fn with_witnesses(mut self, witnesses: Vec<String>, witness_threshold: u32) -> Self {
        self.witnesses = witnesses;
        self.witness_threshold = witness_threshold;
        self
    }

    pub fn with_delegator(mut self, delegator: impl Into<String>) -> Self {
        self.delegator = Some(delegator.into());
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.last_event.as_ref().map(|e| e.prefix.as_str())
    }

    pub fn last_event(&self) -> Option<&KeyEvent> {
        self.last_event.as_ref()
    }

    pub fn current_keys(&self) -> Vec<String> {
        public_keys(&self.current)
    }

    fn threshold(&self) -> Threshold {
        Threshold::Simple(self.current.len() as u32)
    }

    fn previous(&self) -> Result<&KeyEvent, WitnessError> {
        self.last_event
            .as_ref()
            .ok_or_else(|| WitnessError::InvalidRequest("not yet incepted".to_string()))
    }

    /// Signs `event` with every current key.
    pub fn sign(&self, event: KeyEvent) -> Result<SignedKeyEvent, WitnessError> {
        let bytes = event.signing_bytes()?;
        let signatures = self
            .current
            .iter()
            .enumerate()
            .map(|(index, provider)| {
                Ok(IndexedSignature {
                    index: index as u32,
                    signature: provider.sign(&bytes)?,
                })
            })
            .collect::<Result<Vec<_>, WitnessError>>()?;
        Ok(SignedKeyEvent::new(event, signatures))
    }

    fn record(&mut self, event: KeyEvent) -> Result<SignedKeyEvent, WitnessError> {
        let signed = self.sign(event)?;
        self.last_event = Some(signed.event.clone());
        Ok(signed)
    }

    /// Creates an icp, or a dip when a delegator is set.
    pub fn incept(&mut self) -> Result<SignedKeyEvent, WitnessError> {
        if self.last_event.is_some() {
            return Err(WitnessError::InvalidRequest("already incepted".to_string()));
        }
        let event = match &self.delegator {
            Some(delegator) => KeyEvent::create_delegated_inception(
                public_keys(&self.current),
                self.threshold(),
                commitments(&self.next),
                self.witnesses.clone(),
                self.witness_threshold,
                delegator.clone(),
            )?,
            None => KeyEvent::create_inception(
                public_keys(&self.current),
                self.threshold(),
                commitments(&self.next),
                self.witnesses.clone(),
                self.witness_threshold,
                vec![],
            )?,
        };
        self.record(event)
    }

    /// Promotes the pre-rotated keys and commits to a fresh set.
    pub fn rotate(&mut self) -> Result<SignedKeyEvent, WitnessError> {
        let previous = self.previous()?.clone();
        let count = self.next.len();
        self.current = std::mem::replace(&mut self.next, generate(count));
        let keys = public_keys(&self.current);
        let next = commitments(&self.next);
        let event = if self.delegator.is_some() {
            KeyEvent::create_delegated_rotation(
                &previous,
                keys,
                self.threshold(),
                next,
                self.witnesses.clone(),
                self.witness_threshold,
            )?
        } else {
            KeyEvent::create_rotation(
                &previous,
                keys,
                self.threshold(),
                next,
                self.witnesses.clone(),
                self.witness_threshold,
            )?
        };
        self.record(event)
    }

    pub fn interact(&mut self, seals: Vec<Seal>) -> Result<SignedKeyEvent, WitnessError> {
        let event = KeyEvent::create_interaction(self.previous()?, seals)?;
        self.record(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{P256Verifier, verify_threshold};

    #[test]
    fn test_incept_rotate_interact_chain() {
        let mut builder = KeyEventBuilder::new(2);
        let icp = builder.incept().unwrap();
        assert_eq!(icp.signatures.len(), 2);
        assert_eq!(builder.prefix(), Some(icp.event.prefix.as_str()));

        let rot = builder.rotate().unwrap();
        assert_eq!(rot.event.sn, 1);
        assert_eq!(rot.event.prior.as_deref(), Some(icp.event.digest.as_str()));
        // Revealed keys match the inception's commitments
        let revealed: Vec<String> = rot.event.keys.iter().map(|k| commit_key(k)).collect();
        assert_eq!(revealed, icp.event.next_key_digests);

        let ixn = builder.interact(vec![]).unwrap();
        assert_eq!(ixn.event.sn, 2);
        assert!(ixn.event.verify_digest().is_ok());
    }

    #[test]
    fn test_signatures_verify() {
        let mut builder = KeyEventBuilder::new(1);
        let icp = builder.incept().unwrap();
        let bytes = icp.event.signing_bytes().unwrap();
        assert!(
            verify_threshold(
                &P256Verifier,
                &icp.event.keys,
                &Threshold::Simple(1),
                &bytes,
                &icp.signatures
            )
            .is_ok()
        );
    }

    #[test]
    fn test_requires_inception_first() {
        let mut builder = KeyEventBuilder::new(1);
        assert!(builder.interact(vec![]).is_err());
        assert!(builder.rotate().is_err());
        builder.incept().unwrap();
        assert!(builder.incept().is_err());
    }

    #[test]
    fn test_delegated_builder() {
        let mut builder = KeyEventBuilder::new(1).with_delegator("Edelegator");
        let dip = builder.incept().unwrap();
        assert_eq!(dip.event.kind, crate::types::EventKind::Dip);
        let drt = builder.rotate().unwrap();
        assert_eq!(drt.event.kind, crate::types::EventKind::Drt);
    }
}
