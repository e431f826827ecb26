use std::collections::HashSet;
use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{iso_timestamp, parse_records, DataKind, RecordStore, Result};
use crate::core::Account;

#[derive(Debug, Serialize)]
struct AccountsDocument {
    last_updated: String,
    accounts: Vec<Account>,
}

#[derive(Debug, Deserialize)]
struct StoredAccounts {
    #[serde(default)]
    accounts: Vec<Value>,
}

impl RecordStore {
    fn read_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        let path = self.user_file(user_id, DataKind::Accounts)?;
        if !path.exists() {
            return Ok(vec![]);
        }

        let doc: StoredAccounts = serde_json::from_str(&fs::read_to_string(&path)?)?;
        Ok(parse_records(doc.accounts, DataKind::Accounts))
    }

    /// Merges `accounts` into the stored accounts of `user_id`. Accounts
    /// whose ID is already stored are ignored, stored entries are never
    /// updated.
    #[tracing::instrument(skip(self, accounts), fields(incoming = accounts.len()))]
    pub fn save_accounts(&self, user_id: &str, accounts: Vec<Account>) -> Result<()> {
        let path = self.user_file(user_id, DataKind::Accounts)?;
        let mut all = self.read_accounts(user_id)?;

        let mut known: HashSet<String> = all.iter().map(|a| a.account_id.clone()).collect();
        let mut added = 0;
        for account in accounts {
            if known.insert(account.account_id.clone()) {
                all.push(account);
                added += 1;
            } else {
                debug!("Account {} already stored, skipping", account.account_id);
            }
        }

        all.iter_mut().for_each(Account::backfill_institution);

        let doc = AccountsDocument {
            last_updated: iso_timestamp(),
            accounts: all,
        };
        fs::write(&path, serde_json::to_string_pretty(&doc)?)?;

        info!("Saved {} new accounts for user {}", added, user_id);
        info!("Total accounts: {}", doc.accounts.len());

        Ok(())
    }

    /// Returns the stored accounts of `user_id`, with the default institution
    /// filled in where missing. The file itself is left untouched.
    pub fn get_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        let mut accounts = self.read_accounts(user_id)?;
        accounts.iter_mut().for_each(Account::backfill_institution);

        Ok(accounts)
    }
}
