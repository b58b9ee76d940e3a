//! Wallet account model
//!
//! Two serialized shapes exist:
//!
//! - single derivation (format 3): one legacy xpriv/xpub pair on the account
//! - multi derivation (format 4): a `derivations` list holding one entry per
//!   derivation type
//!
//! The shape is selected on deserialization by the presence of the
//! `derivations` field. Callers use the capability methods on [`Account`]
//! and never need to match on the shape.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use super::xpub::{XPub, XPubs};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DerivationType {
    #[serde(rename = "legacy")]
    Legacy,
    #[serde(rename = "bech32", alias = "segwit-bech32")]
    SegwitBech32,
}

impl DerivationType {
    pub const ALL: [DerivationType; 2] = [DerivationType::Legacy, DerivationType::SegwitBech32];

    /// BIP44 purpose constant of the tree this type lives in
    pub fn purpose(&self) -> u32 {
        match self {
            Self::Legacy => 44,
            Self::SegwitBech32 => 84,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::SegwitBech32 => "bech32",
        }
    }
}

impl fmt::Display for DerivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DerivationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "bech32" | "segwit-bech32" | "segwit" => Ok(Self::SegwitBech32),
            other => Err(format!("unknown derivation type '{}'", other)),
        }
    }
}

/// Extended public keys of the external (receive) and internal (change) chains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressCache {
    #[serde(rename = "receiveAccount", default)]
    pub receive_account: String,
    #[serde(rename = "changeAccount", default)]
    pub change_account: String,
}

/// A receive position handed out with a label, skipped by address selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressLabel {
    pub index: u32,
    pub label: String,
}

fn push_label(labels: &mut Vec<AddressLabel>, index: u32, label: &str) -> bool {
    if labels.iter().any(|l| l.index == index && l.label == label) {
        return false;
    }
    labels.push(AddressLabel {
        index,
        label: label.to_string(),
    });
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    #[serde(rename = "type")]
    pub derivation_type: DerivationType,
    pub purpose: u32,
    /// Ciphertext when the wallet is double encrypted
    pub xpriv: String,
    pub xpub: String,
    #[serde(default)]
    pub cache: AddressCache,
    #[serde(default)]
    pub address_labels: Vec<AddressLabel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Derivation {
    pub fn new(
        derivation_type: DerivationType,
        xpriv: String,
        xpub: String,
        cache: AddressCache,
    ) -> Self {
        Self {
            derivation_type,
            purpose: derivation_type.purpose(),
            xpriv,
            xpub,
            cache,
            address_labels: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Format 3 account: legacy keys only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyAccount {
    pub label: String,
    #[serde(default)]
    pub archived: bool,
    pub xpriv: String,
    pub xpub: String,
    #[serde(default)]
    pub address_labels: Vec<AddressLabel>,
    #[serde(default)]
    pub cache: AddressCache,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Format 4 account: one derivation per type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiDerivationAccount {
    pub label: String,
    #[serde(default)]
    pub archived: bool,
    /// `None` when the payload carried an empty or unknown value
    #[serde(
        rename = "default_derivation",
        default,
        deserialize_with = "lenient_derivation_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_derivation_type: Option<DerivationType>,
    pub derivations: Vec<Derivation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_derivation_type<'de, D>(deserializer: D) -> Result<Option<DerivationType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| DerivationType::from_str(&s).ok()))
}

impl MultiDerivationAccount {
    pub fn new(label: impl Into<String>, derivations: Vec<Derivation>) -> Self {
        let default_derivation_type = if derivations
            .iter()
            .any(|d| d.derivation_type == DerivationType::SegwitBech32)
        {
            Some(DerivationType::SegwitBech32)
        } else {
            Some(DerivationType::Legacy)
        };
        Self {
            label: label.into(),
            archived: false,
            default_derivation_type,
            derivations,
            extra: Map::new(),
        }
    }

    pub fn derivation(&self, derivation_type: DerivationType) -> Option<&Derivation> {
        self.derivations
            .iter()
            .find(|d| d.derivation_type == derivation_type)
    }

    pub fn derivation_mut(&mut self, derivation_type: DerivationType) -> Option<&mut Derivation> {
        self.derivations
            .iter_mut()
            .find(|d| d.derivation_type == derivation_type)
    }

    /// Insert or replace the entry for `derivation.derivation_type`,
    /// keeping legacy first.
    pub fn set_derivation(&mut self, derivation: Derivation) {
        match self.derivation_mut(derivation.derivation_type) {
            Some(existing) => *existing = derivation,
            None => {
                self.derivations.push(derivation);
                self.derivations
                    .sort_by_key(|d| d.derivation_type.purpose());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Account {
    Legacy(LegacyAccount),
    MultiDerivation(MultiDerivationAccount),
}

impl Account {
    pub fn label(&self) -> &str {
        match self {
            Self::Legacy(a) => &a.label,
            Self::MultiDerivation(a) => &a.label,
        }
    }

    pub fn is_archived(&self) -> bool {
        match self {
            Self::Legacy(a) => a.archived,
            Self::MultiDerivation(a) => a.archived,
        }
    }

    pub fn is_multi_derivation(&self) -> bool {
        matches!(self, Self::MultiDerivation(_))
    }

    /// The type used for new receive addresses. Falls back to the strongest
    /// derivation present when the stored value is missing.
    pub fn default_derivation_type(&self) -> DerivationType {
        match self {
            Self::Legacy(_) => DerivationType::Legacy,
            Self::MultiDerivation(a) => a.default_derivation_type.unwrap_or_else(|| {
                if a.derivation(DerivationType::SegwitBech32).is_some() {
                    DerivationType::SegwitBech32
                } else {
                    DerivationType::Legacy
                }
            }),
        }
    }

    pub fn xpub_for(&self, derivation_type: DerivationType) -> Option<&str> {
        match (self, derivation_type) {
            (Self::Legacy(a), DerivationType::Legacy) => Some(&a.xpub),
            (Self::Legacy(_), DerivationType::SegwitBech32) => None,
            (Self::MultiDerivation(a), t) => a.derivation(t).map(|d| d.xpub.as_str()),
        }
    }

    /// All stored xprivs (possibly ciphertext)
    pub fn xprivs(&self) -> Vec<&str> {
        match self {
            Self::Legacy(a) => vec![a.xpriv.as_str()],
            Self::MultiDerivation(a) => a.derivations.iter().map(|d| d.xpriv.as_str()).collect(),
        }
    }

    pub fn contains_xpub(&self, xpub: &str) -> bool {
        match self {
            Self::Legacy(a) => a.xpub == xpub,
            Self::MultiDerivation(a) => a.derivations.iter().any(|d| d.xpub == xpub),
        }
    }

    pub fn xpubs(&self) -> XPubs {
        match self {
            Self::Legacy(a) => XPubs::single(XPub::new(a.xpub.clone(), DerivationType::Legacy)),
            Self::MultiDerivation(a) => a
                .derivations
                .iter()
                .map(|d| XPub::new(d.xpub.clone(), d.derivation_type))
                .collect(),
        }
    }

    /// Exactly one legacy and one segwit derivation
    pub fn has_full_derivations(&self) -> bool {
        match self {
            Self::Legacy(_) => false,
            Self::MultiDerivation(a) => {
                a.derivations.len() == 2
                    && DerivationType::ALL.iter().all(|t| a.derivation(*t).is_some())
            }
        }
    }

    pub fn address_labels(&self, derivation_type: DerivationType) -> &[AddressLabel] {
        match (self, derivation_type) {
            (Self::Legacy(a), DerivationType::Legacy) => &a.address_labels,
            (Self::Legacy(_), DerivationType::SegwitBech32) => &[],
            (Self::MultiDerivation(a), t) => a
                .derivation(t)
                .map(|d| d.address_labels.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Record a reserved receive position. Returns false if the identical
    /// reservation already exists or the account lacks that derivation.
    pub fn reserve_address(&mut self, derivation_type: DerivationType, index: u32, label: &str) -> bool {
        match (self, derivation_type) {
            (Self::Legacy(a), DerivationType::Legacy) => push_label(&mut a.address_labels, index, label),
            (Self::Legacy(_), DerivationType::SegwitBech32) => false,
            (Self::MultiDerivation(a), t) => match a.derivation_mut(t) {
                Some(d) => push_label(&mut d.address_labels, index, label),
                None => false,
            },
        }
    }

    /// Single-derivation accounts gain one legacy entry built from their own
    /// fields; multi-derivation accounts come back unchanged.
    pub fn upgrade_to_multi_derivation(self) -> MultiDerivationAccount {
        match self {
            Self::MultiDerivation(a) => a,
            Self::Legacy(a) => MultiDerivationAccount {
                label: a.label,
                archived: a.archived,
                default_derivation_type: Some(DerivationType::Legacy),
                derivations: vec![Derivation {
                    derivation_type: DerivationType::Legacy,
                    purpose: DerivationType::Legacy.purpose(),
                    xpriv: a.xpriv,
                    xpub: a.xpub,
                    cache: a.cache,
                    address_labels: a.address_labels,
                    extra: Map::new(),
                }],
                extra: a.extra,
            },
        }
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        let label = label.into();
        match self {
            Self::Legacy(a) => Self::Legacy(LegacyAccount { label, ..a }),
            Self::MultiDerivation(a) => Self::MultiDerivation(MultiDerivationAccount { label, ..a }),
        }
    }

    pub fn with_archived(self, archived: bool) -> Self {
        match self {
            Self::Legacy(a) => Self::Legacy(LegacyAccount { archived, ..a }),
            Self::MultiDerivation(a) => {
                Self::MultiDerivation(MultiDerivationAccount { archived, ..a })
            }
        }
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Legacy(a) => a.serialize(serializer),
            Self::MultiDerivation(a) => a.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.get("derivations").is_some() {
            serde_json::from_value(value)
                .map(Self::MultiDerivation)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Self::Legacy)
                .map_err(D::Error::custom)
        }
    }
}
