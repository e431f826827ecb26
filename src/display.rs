use std::io::Write;

use anyhow::Result;
use serde_json::Value;
use tabwriter::TabWriter;

use crate::core::Account;
use crate::summary::{AccountGroup, AccountSummary};

fn balance_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}

pub fn print_accounts<T: Write>(wr: T, accounts: &[Account]) -> Result<()> {
    let mut tw = TabWriter::new(wr);
    writeln!(tw, "Institution\tAccount\tAccount ID\tType\tBalance")?;

    for account in accounts.iter() {
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}",
            account.institution(),
            account.name,
            account.account_id,
            account.account_type(),
            balance_cell(account.balances.current.as_ref()),
        )?;
    }

    tw.flush()?;

    Ok(())
}

fn write_groups<T: Write>(
    tw: &mut TabWriter<T>,
    heading: &str,
    groups: &std::collections::BTreeMap<String, AccountGroup>,
) -> Result<()> {
    writeln!(tw, "{}\tAccounts\tBalance\tTransactions", heading)?;
    for (name, group) in groups {
        writeln!(
            tw,
            "{}\t{}\t{:.2}\t{}",
            name,
            group.accounts.len(),
            group.total_balance,
            group.recent_transactions.len(),
        )?;
    }

    Ok(())
}

pub fn print_summary<T: Write>(wr: T, summary: &AccountSummary) -> Result<()> {
    let mut tw = TabWriter::new(wr);

    writeln!(tw, "Total balance\t{:.2}", summary.total_balance)?;
    writeln!(
        tw,
        "Total transactions\t{:.2}",
        summary.total_recent_transactions
    )?;
    writeln!(tw)?;

    write_groups(&mut tw, "Institution", &summary.institutions)?;
    writeln!(tw)?;
    write_groups(&mut tw, "Type", &summary.account_types)?;
    writeln!(tw)?;

    writeln!(tw, "Category\tCount\tAmount")?;
    for (name, group) in &summary.categories {
        writeln!(tw, "{}\t{}\t{:.2}", name, group.count, group.total_amount)?;
    }

    tw.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::tests::{account, transaction};
    use crate::summary::summarize;

    fn render<F: FnOnce(&mut Vec<u8>) -> Result<()>>(f: F) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_account_rows() {
        let accounts = vec![
            account(json!({"account_id": "a1", "name": "Checking", "type": "depository", "institution_name": "Bank A", "balances": {"current": 100}})),
            account(json!({"account_id": "a2", "name": "Card"})),
        ];

        let out = render(|w| print_accounts(w, &accounts));
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Institution"));
        assert!(lines[1].contains("Bank A") && lines[1].contains("a1") && lines[1].ends_with("100"));
        assert!(lines[2].contains("Unknown Institution") && lines[2].contains("unknown"));
        assert!(lines[2].trim_end().ends_with('-'));
    }

    #[test]
    fn prints_summary_sections() {
        let accounts = vec![account(json!({
            "account_id": "a1",
            "type": "depository",
            "institution_name": "Bank A",
            "balances": {"current": 100},
        }))];
        let txns = vec![transaction(json!({
            "transaction_id": "t1",
            "account_id": "a1",
            "amount": 25.5,
            "date": "2024-01-15",
            "category": ["Food"],
        }))];
        let summary = summarize(&accounts, &txns).unwrap();

        let out = render(|w| print_summary(w, &summary));

        assert!(out.contains("100.00"));
        assert!(out.contains("25.50"));
        assert!(out.lines().any(|l| l.starts_with("Bank A")));
        assert!(out.lines().any(|l| l.starts_with("depository")));
        assert!(out.lines().any(|l| l.starts_with("Food") && l.contains('1')));
    }
}
