use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub transaction_id: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    /// Calendar date, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// The first element of the category path, which is the only level used
    /// for grouping.
    pub fn primary_category(&self) -> &str {
        self.category
            .as_ref()
            .and_then(|c| c.first())
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn txn(category: Value) -> Transaction {
        let mut raw = json!({
            "transaction_id": "t1",
            "account_id": "a1",
            "amount": 12.0,
            "date": "2024-01-15",
        });
        if !category.is_null() {
            raw["category"] = category;
        }
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn primary_category_is_first_element() {
        assert_eq!(txn(json!(["Food", "Restaurants"])).primary_category(), "Food");
    }

    #[test]
    fn missing_or_null_ids_read_as_empty() {
        let txn: Transaction =
            serde_json::from_value(json!({"transaction_id": null, "amount": 7})).unwrap();
        assert_eq!(txn.transaction_id, "");
        assert_eq!(txn.account_id, "");
        assert_eq!(txn.amount, Some(json!(7)));
    }

    #[test]
    fn primary_category_defaults() {
        assert_eq!(txn(Value::Null).primary_category(), UNCATEGORIZED);
        assert_eq!(txn(json!([])).primary_category(), UNCATEGORIZED);
    }
}
