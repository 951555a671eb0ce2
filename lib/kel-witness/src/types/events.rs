//! Key event model & signatures

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::crypto::{self, DIGEST_LENGTH};
use crate::error::WitnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Icp, // Inception
    Rot, // Rotation
    Ixn, // Interaction
    Dip, // Delegated inception
    Drt, // Delegated rotation
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icp => "icp",
            Self::Rot => "rot",
            Self::Ixn => "ixn",
            Self::Dip => "dip",
            Self::Drt => "drt",
        }
    }

    pub fn is_inception(&self) -> bool {
        matches!(self, Self::Icp | Self::Dip)
    }

    /// Establishment events carry their own signing keys
    pub fn is_establishment(&self) -> bool {
        !matches!(self, Self::Ixn)
    }

    pub fn is_rotation(&self) -> bool {
        matches!(self, Self::Rot | Self::Drt)
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self, Self::Dip | Self::Drt)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = WitnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "icp" => Ok(Self::Icp),
            "rot" => Ok(Self::Rot),
            "ixn" => Ok(Self::Ixn),
            "dip" => Ok(Self::Dip),
            "drt" => Ok(Self::Drt),
            _ => Err(WitnessError::InvalidEvent(format!(
                "Unknown event kind: {}",
                s
            ))),
        }
    }
}

// ==================== Thresholds ====================

/// Signing threshold: a plain count, or weighted clauses where every clause
/// must reach a total weight of at least 1.
///
/// Weighted indices run across all clauses in order, so `[["1/2","1/2"],["1"]]`
/// covers keys 0, 1 and 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Simple(u32),
    Weighted(Vec<Vec<String>>),
}

fn parse_weight(weight: &str) -> Option<(u128, u128)> {
    let (num, den) = match weight.split_once('/') {
        Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
        None => (weight.trim().parse().ok()?, 1),
    };
    if den == 0 {
        return None;
    }
    Some((num, den))
}

fn gcd(a: u128, b: u128) -> u128 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Sums two fractions, saturating at 1. `None` when the sum does not fit.
fn add_fraction(acc: (u128, u128), weight: (u128, u128)) -> Option<(u128, u128)> {
    let num = acc
        .0
        .checked_mul(weight.1)?
        .checked_add(weight.0.checked_mul(acc.1)?)?;
    let den = acc.1.checked_mul(weight.1)?;
    if num >= den {
        return Some((1, 1));
    }
    let divisor = gcd(num, den).max(1);
    Some((num / divisor, den / divisor))
}

impl Threshold {
    /// Checks the threshold can be met by `key_count` keys.
    pub fn validate(&self, key_count: usize) -> Result<(), String> {
        match self {
            Self::Simple(n) => {
                if *n == 0 || *n as usize > key_count {
                    return Err(format!(
                        "threshold {} is unsatisfiable with {} key(s)",
                        n, key_count
                    ));
                }
            }
            Self::Weighted(clauses) => {
                let weights: usize = clauses.iter().map(Vec::len).sum();
                if clauses.is_empty() || weights != key_count {
                    return Err(format!(
                        "weighted threshold has {} weight(s) for {} key(s)",
                        weights, key_count
                    ));
                }
                for clause in clauses {
                    let mut total = (0, 1);
                    for weight in clause {
                        total = parse_weight(weight)
                            .and_then(|parsed| add_fraction(total, parsed))
                            .ok_or_else(|| format!("invalid weight '{}'", weight))?;
                    }
                    if total.0 < total.1 {
                        return Err("weighted clause cannot reach 1".to_string());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn is_satisfied(&self, signed: &BTreeSet<u32>) -> bool {
        match self {
            Self::Simple(n) => *n > 0 && signed.len() >= *n as usize,
            Self::Weighted(clauses) => {
                let mut index = 0u32;
                for clause in clauses {
                    let mut total = (0, 1);
                    for weight in clause {
                        if signed.contains(&index) {
                            let sum = parse_weight(weight)
                                .and_then(|parsed| add_fraction(total, parsed));
                            match sum {
                                Some(sum) => total = sum,
                                None => return false,
                            }
                        }
                        index += 1;
                    }
                    if total.0 < total.1 {
                        return false;
                    }
                }
                !clauses.is_empty()
            }
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(n) => write!(f, "{}", n),
            Self::Weighted(clauses) => {
                let rendered: Vec<String> = clauses
                    .iter()
                    .map(|c| format!("[{}]", c.join(",")))
                    .collect();
                write!(f, "[{}]", rendered.join(","))
            }
        }
    }
}

// ==================== Events ====================

/// Anchor committing to another identifier's event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seal {
    pub i: String,
    pub s: u64,
    pub d: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    #[serde(rename = "t")]
    pub kind: EventKind,
    /// Self-addressing digest of the canonical body
    #[serde(rename = "d")]
    pub digest: String,
    #[serde(rename = "i")]
    pub prefix: String,
    #[serde(rename = "s")]
    pub sn: u64,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub prior: Option<String>,
    #[serde(rename = "kt", default, skip_serializing_if = "Option::is_none")]
    pub signing_threshold: Option<Threshold>,
    #[serde(rename = "k", default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    /// Digests of the next signing keys
    #[serde(rename = "n", default, skip_serializing_if = "Vec::is_empty")]
    pub next_key_digests: Vec<String>,
    #[serde(rename = "bt", default, skip_serializing_if = "Option::is_none")]
    pub witness_threshold: Option<u32>,
    #[serde(rename = "b", default, skip_serializing_if = "Vec::is_empty")]
    pub witnesses: Vec<String>,
    #[serde(rename = "a", default, skip_serializing_if = "Vec::is_empty")]
    pub seals: Vec<Seal>,
    /// Only for dip events
    #[serde(rename = "di", default, skip_serializing_if = "Option::is_none")]
    pub delegator: Option<String>,
}

impl KeyEvent {
    /// Self-addressing inception: the prefix is the event's own digest.
    pub fn create_inception(
        keys: Vec<String>,
        signing_threshold: Threshold,
        next_key_digests: Vec<String>,
        witnesses: Vec<String>,
        witness_threshold: u32,
        seals: Vec<Seal>,
    ) -> Result<Self, WitnessError> {
        let mut icp = Self {
            kind: EventKind::Icp,
            digest: String::new(),
            prefix: String::new(),
            sn: 0,
            prior: None,
            signing_threshold: Some(signing_threshold),
            keys,
            next_key_digests,
            witness_threshold: Some(witness_threshold),
            witnesses,
            seals,
            delegator: None,
        };
        icp.saidify()?;
        Ok(icp)
    }

    /// Basic-prefix inception: the prefix is the single signing key.
    pub fn create_basic_inception(
        key: String,
        next_key_digests: Vec<String>,
        witnesses: Vec<String>,
        witness_threshold: u32,
    ) -> Result<Self, WitnessError> {
        let mut icp = Self {
            kind: EventKind::Icp,
            digest: String::new(),
            prefix: key.clone(),
            sn: 0,
            prior: None,
            signing_threshold: Some(Threshold::Simple(1)),
            keys: vec![key],
            next_key_digests,
            witness_threshold: Some(witness_threshold),
            witnesses,
            seals: vec![],
            delegator: None,
        };
        icp.saidify()?;
        Ok(icp)
    }

    pub fn create_delegated_inception(
        keys: Vec<String>,
        signing_threshold: Threshold,
        next_key_digests: Vec<String>,
        witnesses: Vec<String>,
        witness_threshold: u32,
        delegator: String,
    ) -> Result<Self, WitnessError> {
        let mut dip = Self {
            kind: EventKind::Dip,
            digest: String::new(),
            prefix: String::new(),
            sn: 0,
            prior: None,
            signing_threshold: Some(signing_threshold),
            keys,
            next_key_digests,
            witness_threshold: Some(witness_threshold),
            witnesses,
            seals: vec![],
            delegator: Some(delegator),
        };
        dip.saidify()?;
        Ok(dip)
    }

    pub fn create_rotation(
        previous_event: &Self,
        keys: Vec<String>,
        signing_threshold: Threshold,
        next_key_digests: Vec<String>,
        witnesses: Vec<String>,
        witness_threshold: u32,
    ) -> Result<Self, WitnessError> {
        Self::rotation_of(
            EventKind::Rot,
            previous_event,
            keys,
            signing_threshold,
            next_key_digests,
            witnesses,
            witness_threshold,
        )
    }

    pub fn create_delegated_rotation(
        previous_event: &Self,
        keys: Vec<String>,
        signing_threshold: Threshold,
        next_key_digests: Vec<String>,
        witnesses: Vec<String>,
        witness_threshold: u32,
    ) -> Result<Self, WitnessError> {
        Self::rotation_of(
            EventKind::Drt,
            previous_event,
            keys,
            signing_threshold,
            next_key_digests,
            witnesses,
            witness_threshold,
        )
    }

    fn rotation_of(
        kind: EventKind,
        previous_event: &Self,
        keys: Vec<String>,
        signing_threshold: Threshold,
        next_key_digests: Vec<String>,
        witnesses: Vec<String>,
        witness_threshold: u32,
    ) -> Result<Self, WitnessError> {
        let mut event = Self {
            kind,
            digest: String::new(),
            prefix: previous_event.prefix.clone(),
            sn: previous_event.sn + 1,
            prior: Some(previous_event.digest.clone()),
            signing_threshold: Some(signing_threshold),
            keys,
            next_key_digests,
            witness_threshold: Some(witness_threshold),
            witnesses,
            seals: vec![],
            delegator: None,
        };
        event.saidify()?;
        Ok(event)
    }

    pub fn create_interaction(previous_event: &Self, seals: Vec<Seal>) -> Result<Self, WitnessError> {
        let mut event = Self {
            kind: EventKind::Ixn,
            digest: String::new(),
            prefix: previous_event.prefix.clone(),
            sn: previous_event.sn + 1,
            prior: Some(previous_event.digest.clone()),
            signing_threshold: None,
            keys: vec![],
            next_key_digests: vec![],
            witness_threshold: None,
            witnesses: vec![],
            seals,
            delegator: None,
        };
        event.saidify()?;
        Ok(event)
    }

    /// True for an inception whose prefix is its own digest.
    pub fn is_self_addressing(&self) -> bool {
        self.kind.is_inception() && (self.prefix.is_empty() || self.prefix == self.digest)
    }

    /// The body the digest commits to: `d` (and `i`, when self-addressing)
    /// replaced by a fixed-width placeholder.
    pub fn canonical_body(&self) -> Result<Vec<u8>, WitnessError> {
        let placeholder = "#".repeat(DIGEST_LENGTH);
        let mut body = self.clone();
        if body.is_self_addressing() {
            body.prefix = placeholder.clone();
        }
        body.digest = placeholder;
        Ok(serde_json::to_vec(&body)?)
    }

    pub fn compute_digest(&self) -> Result<String, WitnessError> {
        Ok(crypto::digest(&self.canonical_body()?))
    }

    /// Sets `d`, and `i` for a self-addressing inception.
    pub fn saidify(&mut self) -> Result<(), WitnessError> {
        let self_addressing = self.is_self_addressing();
        let digest = self.compute_digest()?;
        if self_addressing {
            self.prefix = digest.clone();
        }
        self.digest = digest;
        Ok(())
    }

    pub fn verify_digest(&self) -> Result<(), WitnessError> {
        let expected = self.compute_digest()?;
        if expected != self.digest {
            return Err(WitnessError::InvalidDigest {
                expected,
                actual: self.digest.clone(),
            });
        }
        Ok(())
    }

    /// Inception prefixes must be self-certifying.
    pub fn verify_prefix(&self) -> Result<(), WitnessError> {
        if !self.kind.is_inception() || self.prefix == self.digest {
            return Ok(());
        }
        let basic = self.kind == EventKind::Icp
            && self.keys.len() == 1
            && self.keys.first() == Some(&self.prefix);
        if basic {
            Ok(())
        } else {
            Err(WitnessError::InvalidPrefix(format!(
                "{} is neither the event digest nor its sole signing key",
                self.prefix
            )))
        }
    }

    /// Bytes covered by controller signatures.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, WitnessError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn anchors(&self, seal: &Seal) -> bool {
        self.seals.contains(seal)
    }

    /// Validates that the event has the correct fields for its kind.
    /// Returns Ok(()) if valid, Err with description if invalid.
    pub fn validate_structure(&self) -> Result<(), String> {
        let require = |name: &str, present: bool| -> Result<(), String> {
            if present {
                Ok(())
            } else {
                Err(format!("{} event requires {}", self.kind, name))
            }
        };
        let forbid = |name: &str, present: bool| -> Result<(), String> {
            if present {
                Err(format!("{} event must not have {}", self.kind, name))
            } else {
                Ok(())
            }
        };
        let validate_digest = |name: &str, value: &str| -> Result<(), String> {
            if crypto::is_digest(value) {
                Ok(())
            } else {
                Err(format!("{} is not a valid digest", name))
            }
        };

        validate_digest("d", &self.digest)?;
        require("i", !self.prefix.is_empty())?;
        if let Some(ref prior) = self.prior {
            validate_digest("p", prior)?;
        }
        for next in &self.next_key_digests {
            validate_digest("n", next)?;
        }
        if let Some(ref delegator) = self.delegator {
            require("non-empty di", !delegator.is_empty())?;
        }

        match self.kind {
            EventKind::Icp | EventKind::Dip => {
                if self.sn != 0 {
                    return Err(format!("{} event requires s=0", self.kind));
                }
                forbid("p", self.prior.is_some())?;
                require("k", !self.keys.is_empty())?;
                require("kt", self.signing_threshold.is_some())?;
                require("bt", self.witness_threshold.is_some())?;
                if self.kind == EventKind::Dip {
                    require("di", self.delegator.is_some())?;
                } else {
                    forbid("di", self.delegator.is_some())?;
                }
            }
            EventKind::Rot | EventKind::Drt => {
                if self.sn == 0 {
                    return Err(format!("{} event requires s>0", self.kind));
                }
                require("p", self.prior.is_some())?;
                require("k", !self.keys.is_empty())?;
                require("kt", self.signing_threshold.is_some())?;
                require("bt", self.witness_threshold.is_some())?;
                forbid("di", self.delegator.is_some())?;
            }
            EventKind::Ixn => {
                if self.sn == 0 {
                    return Err(format!("{} event requires s>0", self.kind));
                }
                require("p", self.prior.is_some())?;
                forbid("k", !self.keys.is_empty())?;
                forbid("kt", self.signing_threshold.is_some())?;
                forbid("n", !self.next_key_digests.is_empty())?;
                forbid("b", !self.witnesses.is_empty())?;
                forbid("bt", self.witness_threshold.is_some())?;
                forbid("di", self.delegator.is_some())?;
            }
        }

        if let Some(ref threshold) = self.signing_threshold {
            threshold.validate(self.keys.len())?;
        }
        if let Some(bt) = self.witness_threshold {
            if bt as usize > self.witnesses.len() {
                return Err(format!(
                    "bt {} exceeds {} witness(es)",
                    bt,
                    self.witnesses.len()
                ));
            }
        }
        let distinct: BTreeSet<&String> = self.witnesses.iter().collect();
        forbid("duplicate witnesses", distinct.len() != self.witnesses.len())?;

        Ok(())
    }
}

/// Signature by the key at `index` of the governing key list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSignature {
    pub index: u32,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedKeyEvent {
    pub event: KeyEvent,
    pub signatures: Vec<IndexedSignature>,
}

impl SignedKeyEvent {
    pub fn new(event: KeyEvent, signatures: Vec<IndexedSignature>) -> Self {
        Self { event, signatures }
    }

    pub fn prefix(&self) -> &str {
        &self.event.prefix
    }

    pub fn digest(&self) -> &str {
        &self.event.digest
    }
}
