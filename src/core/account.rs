use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const UNKNOWN_INSTITUTION: &str = "Unknown Institution";
pub const DEFAULT_ACCOUNT_TYPE: &str = "unknown";

/// A linked account as reported upstream. Fields the summaries do not look
/// at are carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub account_id: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_name: Option<String>,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub balances: Balances,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Account {
    pub fn institution(&self) -> &str {
        self.institution_name.as_deref().unwrap_or(UNKNOWN_INSTITUTION)
    }

    pub fn account_type(&self) -> &str {
        self.kind.as_deref().unwrap_or(DEFAULT_ACCOUNT_TYPE)
    }

    /// Sets the institution to the default one when upstream did not
    /// provide it.
    pub fn backfill_institution(&mut self) {
        if self.institution_name.is_none() {
            self.institution_name = Some(UNKNOWN_INSTITUTION.to_string());
        }
    }
}
