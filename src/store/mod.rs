//! File-backed storage for linked accounts and transactions.
//!
//! Every user owns two JSON documents under the storage root,
//! `<user>_accounts.json` and `<user>_transactions.json`. Accounts accumulate
//! across links while transactions are replaced wholesale on every save.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

mod account;
mod txn;

const DATA_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid user id {0:?}")]
    InvalidUserId(String),
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataKind {
    Accounts,
    Transactions,
}

impl DataKind {
    const ALL: [DataKind; 2] = [DataKind::Accounts, DataKind::Transactions];

    fn as_str(&self) -> &'static str {
        match self {
            DataKind::Accounts => "accounts",
            DataKind::Transactions => "transactions",
        }
    }
}

#[derive(Debug)]
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_file(&self, user_id: &str, kind: DataKind) -> Result<PathBuf> {
        if user_id.is_empty()
            || user_id.contains(|c: char| c == '/' || c == '\\')
            || user_id.contains("..")
        {
            return Err(Error::InvalidUserId(user_id.to_string()));
        }

        Ok(self
            .root
            .join(format!("{}_{}.{}", user_id, kind.as_str(), DATA_EXTENSION)))
    }

    /// Deletes the persisted data of `user_id`, or every data file in the
    /// store when no user is given.
    #[tracing::instrument(skip(self))]
    pub fn clean_test_data(&self, user_id: Option<&str>) -> Result<()> {
        let result = match user_id {
            Some(user_id) => self.remove_user(user_id),
            None => self.remove_all(),
        };

        if let Err(err) = &result {
            error!("Error cleaning test data: {}", err);
        }

        result
    }

    fn remove_user(&self, user_id: &str) -> Result<()> {
        for kind in DataKind::ALL {
            let path = self.user_file(user_id, kind)?;
            if path.exists() {
                fs::remove_file(&path)?;
                info!("Removed {} data for user {}", kind.as_str(), user_id);
            }
        }

        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_data = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(DATA_EXTENSION);

            if is_data {
                fs::remove_file(&path)?;
                info!("Removed {}", path.display());
            }
        }

        Ok(())
    }
}

/// Converts stored records one at a time. Records that do not fit the model
/// are logged and left out instead of failing the whole document.
fn parse_records<T: DeserializeOwned>(records: Vec<Value>, kind: DataKind) -> Vec<T> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match serde_json::from_value(record) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Skipping malformed {} record at index {}: {}", kind.as_str(), i, err);
                None
            }
        })
        .collect()
}

/// Local time in ISO-8601 form with microseconds.
pub(crate) fn iso_timestamp() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Local time as `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn plain_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    use crate::core::{Account, Transaction};

    pub(crate) fn account(value: serde_json::Value) -> Account {
        serde_json::from_value(value).unwrap()
    }

    pub(crate) fn transaction(value: serde_json::Value) -> Transaction {
        serde_json::from_value(value).unwrap()
    }

    pub(crate) fn temp_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("data")).unwrap();
        (dir, store)
    }

    fn seed(store: &RecordStore, user_id: &str) {
        store
            .save_accounts(user_id, vec![account(json!({"account_id": "a1"}))])
            .unwrap();
        store
            .save_transactions(
                user_id,
                &[transaction(json!({
                    "transaction_id": "t1",
                    "account_id": "a1",
                    "date": "2024-01-15",
                }))],
            )
            .unwrap();
    }

    fn data_files(store: &RecordStore) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("data");
        RecordStore::new(&root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn file_names_are_deterministic() {
        let (_dir, store) = temp_store();
        assert_eq!(
            store.user_file("u1", DataKind::Accounts).unwrap(),
            store.root().join("u1_accounts.json")
        );
        assert_eq!(
            store.user_file("u1", DataKind::Transactions).unwrap(),
            store.root().join("u1_transactions.json")
        );
    }

    #[test]
    fn rejects_user_ids_escaping_root() {
        let (_dir, store) = temp_store();
        for bad in ["", "../u1", "a/b", "a\\b", ".."] {
            assert!(matches!(
                store.user_file(bad, DataKind::Accounts),
                Err(Error::InvalidUserId(_))
            ));
        }
    }

    #[test]
    fn clean_single_user_keeps_others() {
        let (_dir, store) = temp_store();
        seed(&store, "u1");
        seed(&store, "u2");

        store.clean_test_data(Some("u1")).unwrap();
        assert_eq!(
            data_files(&store),
            vec!["u2_accounts.json", "u2_transactions.json"]
        );
    }

    #[test]
    fn clean_all_empties_root() {
        let (_dir, store) = temp_store();
        seed(&store, "u1");
        seed(&store, "u2");
        seed(&store, "u3");

        store.clean_test_data(Some("u1")).unwrap();
        store.clean_test_data(None).unwrap();

        assert!(store.root().is_dir());
        assert!(data_files(&store).is_empty());
    }

    #[test]
    fn clean_missing_user_is_noop() {
        let (_dir, store) = temp_store();
        seed(&store, "u1");

        store.clean_test_data(Some("nobody")).unwrap();
        assert_eq!(data_files(&store).len(), 2);
    }

    #[test]
    fn clean_all_leaves_non_data_files() {
        let (_dir, store) = temp_store();
        seed(&store, "u1");
        fs::write(store.root().join("notes.txt"), "keep me").unwrap();

        store.clean_test_data(None).unwrap();
        assert_eq!(data_files(&store), vec!["notes.txt"]);
    }

    #[test]
    fn clean_user_reports_failures() {
        let (_dir, store) = temp_store();
        seed(&store, "u1");
        let path = store.root().join("u1_transactions.json");
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(
            store.clean_test_data(Some("u1")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn clean_all_reports_failures() {
        let (_dir, store) = temp_store();
        fs::remove_dir(store.root()).unwrap();

        assert!(matches!(store.clean_test_data(None), Err(Error::Io(_))));
    }

    #[test]
    fn timestamps_have_expected_shape() {
        let plain = plain_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&plain, "%Y-%m-%d %H:%M:%S").is_ok());

        let iso = iso_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&iso, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
    }
}
