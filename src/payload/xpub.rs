//! Extended public key sets
//!
//! One logical account is represented by up to two extended public keys,
//! one per derivation type. Balance lookups and sync lists work on this set.

use serde::{Deserialize, Serialize};

use super::account::DerivationType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XPub {
    pub address: String,
    pub derivation: DerivationType,
}

impl XPub {
    pub fn new(address: impl Into<String>, derivation: DerivationType) -> Self {
        Self {
            address: address.into(),
            derivation,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XPubs(Vec<XPub>);

impl XPubs {
    pub fn new(xpubs: Vec<XPub>) -> Self {
        Self(xpubs)
    }

    pub fn single(xpub: XPub) -> Self {
        Self(vec![xpub])
    }

    pub fn for_type(&self, derivation: DerivationType) -> Option<&XPub> {
        self.0.iter().find(|x| x.derivation == derivation)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.0.iter().any(|x| x.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &XPub> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into (legacy, segwit) key lists, the shape balance queries take.
    pub fn partition(&self) -> (Vec<String>, Vec<String>) {
        let mut legacy = Vec::new();
        let mut segwit = Vec::new();
        for xpub in &self.0 {
            match xpub.derivation {
                DerivationType::Legacy => legacy.push(xpub.address.clone()),
                DerivationType::SegwitBech32 => segwit.push(xpub.address.clone()),
            }
        }
        (legacy, segwit)
    }
}

impl IntoIterator for XPubs {
    type Item = XPub;
    type IntoIter = std::vec::IntoIter<XPub>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<XPub> for XPubs {
    fn from_iter<I: IntoIterator<Item = XPub>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
