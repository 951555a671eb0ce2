//! Out-of-band introductions

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::WitnessError;
use crate::query::QueryService;
use crate::types::{Confidence, KeyState};

/// An introduction URL binding an AID to this witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Oobi {
    /// The witness introducing itself
    Witness { url: String, aid: String },
    /// A controller, reachable through this witness
    Controller {
        url: String,
        aid: String,
        witness: String,
    },
    /// A URL with no OOBI path, taken as-is
    WellKnown { url: String },
}

impl Oobi {
    pub fn url(&self) -> &str {
        match self {
            Self::Witness { url, .. } | Self::Controller { url, .. } | Self::WellKnown { url } => {
                url
            }
        }
    }
}

impl fmt::Display for Oobi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Witness { url, aid } => write!(f, "{}/oobi/{}", url, aid),
            Self::Controller { url, aid, witness } => {
                write!(f, "{}/oobi/{}/witness/{}", url, aid, witness)
            }
            Self::WellKnown { url } => write!(f, "{}", url),
        }
    }
}

impl FromStr for Oobi {
    type Err = WitnessError;

    /// Parses `{base}/oobi/{aid}` or `{base}/oobi/{aid}/witness/{witness}`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((base, path)) = s.split_once("/oobi/") else {
            return Ok(Self::WellKnown { url: s.to_string() });
        };
        let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();
        match parts.as_slice() {
            [aid] if !aid.is_empty() => Ok(Self::Witness {
                url: base.to_string(),
                aid: aid.to_string(),
            }),
            [aid, "witness", witness] if !aid.is_empty() && !witness.is_empty() => {
                Ok(Self::Controller {
                    url: base.to_string(),
                    aid: aid.to_string(),
                    witness: witness.to_string(),
                })
            }
            _ => Err(WitnessError::InvalidRequest(format!("malformed OOBI: {}", s))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub state: KeyState,
    pub introduction_url: String,
    pub receipt_count: usize,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIntroduction {
    pub aid: String,
    pub oobi: String,
    pub introduction_url: String,
}

pub struct OobiResolver {
    public_url: String,
    witness_aid: String,
    query: Arc<QueryService>,
}

impl OobiResolver {
    pub fn new(public_url: String, witness_aid: String, query: Arc<QueryService>) -> Self {
        Self {
            public_url,
            witness_aid,
            query,
        }
    }

    /// The witness's own OOBI, or a controller's OOBI via this witness.
    pub fn oobi_for(&self, aid: &str) -> Oobi {
        if aid == self.witness_aid {
            Oobi::Witness {
                url: self.public_url.clone(),
                aid: aid.to_string(),
            }
        } else {
            Oobi::Controller {
                url: self.public_url.clone(),
                aid: aid.to_string(),
                witness: self.witness_aid.clone(),
            }
        }
    }

    pub async fn resolve(&self, aid: &str) -> Result<Resolution, WitnessError> {
        let view = self.query.get_state_view(aid).await?;
        Ok(Resolution {
            introduction_url: self.oobi_for(aid).to_string(),
            state: view.state,
            receipt_count: view.receipt_count,
            confidence: view.confidence,
        })
    }

    pub fn resolve_self(&self) -> SelfIntroduction {
        SelfIntroduction {
            aid: self.witness_aid.clone(),
            oobi: self.oobi_for(&self.witness_aid).to_string(),
            introduction_url: format!("{}/introduce", self.public_url),
        }
    }
}
