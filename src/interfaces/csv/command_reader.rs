use crate::domain::account::{AccountKind, OwnerId};
use crate::domain::money::{Amount, Balance};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// Where a scripted transfer sends funds. Card targets are resolved against
/// the local cache at execution time to decide internal vs other-bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    Card(String),
    Phone(String),
    International { recipient: String, country: String },
}

/// One operation from a command script.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Opens an account on the authority side.
    Provision {
        owner: OwnerId,
        number: String,
        kind: AccountKind,
        opening: Balance,
        currency: String,
    },
    /// Registers an account held at another institution, locally only.
    Link { owner: OwnerId, number: String },
    Deposit {
        owner: OwnerId,
        number: String,
        amount: Amount,
    },
    Transfer {
        owner: OwnerId,
        number: String,
        amount: Amount,
        target: TransferTarget,
    },
    /// Pulls the authoritative snapshot into the cache.
    Reconcile { owner: OwnerId },
}

impl Command {
    pub fn owner(&self) -> OwnerId {
        match self {
            Command::Provision { owner, .. }
            | Command::Link { owner, .. }
            | Command::Deposit { owner, .. }
            | Command::Transfer { owner, .. }
            | Command::Reconcile { owner } => *owner,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptRow {
    op: String,
    owner: i64,
    account: Option<String>,
    amount: Option<Decimal>,
    dest: Option<String>,
    kind: Option<AccountKind>,
    currency: Option<String>,
}

impl ScriptRow {
    fn account(&self) -> Result<String> {
        self.account
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| LedgerError::Validation(format!("{}: missing account", self.op)))
    }

    fn amount(&self) -> Result<Amount> {
        let raw = self
            .amount
            .ok_or_else(|| LedgerError::Validation(format!("{}: missing amount", self.op)))?;
        Amount::new(raw)
            .map_err(|_| LedgerError::Validation(format!("{}: amount must be positive", self.op)))
    }

    fn target(&self) -> Result<TransferTarget> {
        let raw = self
            .dest
            .clone()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| LedgerError::Validation("transfer: missing dest".to_string()))?;
        if let Some(number) = raw.strip_prefix("phone:") {
            return Ok(TransferTarget::Phone(number.to_string()));
        }
        if let Some(rest) = raw.strip_prefix("intl:") {
            let (recipient, country) = rest.split_once(':').ok_or_else(|| {
                LedgerError::Validation("transfer: intl dest needs recipient:country".to_string())
            })?;
            return Ok(TransferTarget::International {
                recipient: recipient.to_string(),
                country: country.to_string(),
            });
        }
        Ok(TransferTarget::Card(raw))
    }
}

impl TryFrom<ScriptRow> for Command {
    type Error = LedgerError;

    fn try_from(row: ScriptRow) -> Result<Self> {
        let owner = OwnerId(row.owner);
        match row.op.as_str() {
            "provision" => Ok(Command::Provision {
                owner,
                number: row.account()?,
                kind: row.kind.unwrap_or(AccountKind::Debit),
                opening: Balance::new(row.amount.unwrap_or(Decimal::ZERO)),
                currency: row.currency.clone().unwrap_or_else(|| "KZT".to_string()),
            }),
            "link" => Ok(Command::Link {
                owner,
                number: row.account()?,
            }),
            "deposit" => Ok(Command::Deposit {
                owner,
                number: row.account()?,
                amount: row.amount()?,
            }),
            "transfer" => Ok(Command::Transfer {
                owner,
                number: row.account()?,
                amount: row.amount()?,
                target: row.target()?,
            }),
            "reconcile" => Ok(Command::Reconcile { owner }),
            other => Err(LedgerError::Validation(format!("unknown op: {other}"))),
        }
    }
}

/// Reads ledger commands from a CSV source.
///
/// Wraps `csv::Reader` and yields an iterator of `Result<Command>`, trimming
/// whitespace and tolerating short records so scripts can omit trailing
/// columns.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and parses commands, streaming large scripts without
    /// loading them whole.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|row: std::result::Result<ScriptRow, csv::Error>| {
                row.map_err(LedgerError::from).and_then(Command::try_from)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "op, owner, account, amount, dest, kind, currency";

    fn parse(rows: &str) -> Vec<Result<Command>> {
        let data = format!("{HEADER}\n{rows}");
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    #[test]
    fn test_reader_full_script() {
        let results = parse(
            "provision, 1, 4400 1100 0000 0001, 1000.0, , debit, KZT\n\
             deposit, 1, 4400 1100 0000 0001, 50.0\n\
             transfer, 1, 4400 1100 0000 0001, 25.0, 5500 2200 0000 0002\n\
             reconcile, 1",
        );
        assert_eq!(results.len(), 4);

        let provision = results[0].as_ref().unwrap();
        assert!(matches!(
            provision,
            Command::Provision { kind: AccountKind::Debit, .. }
        ));
        let transfer = results[2].as_ref().unwrap();
        match transfer {
            Command::Transfer { amount, target, .. } => {
                assert_eq!(amount.value(), dec!(25.0));
                assert_eq!(
                    *target,
                    TransferTarget::Card("5500 2200 0000 0002".to_string())
                );
            }
            other => panic!("expected transfer, got {other:?}"),
        }
    }

    #[test]
    fn test_reader_dest_variants() {
        let results = parse(
            "transfer, 1, 1111, 10.0, phone:+77010000000\n\
             transfer, 1, 1111, 10.0, intl:John Smith:DE",
        );
        assert!(matches!(
            results[0].as_ref().unwrap(),
            Command::Transfer { target: TransferTarget::Phone(n), .. } if n == "+77010000000"
        ));
        assert!(matches!(
            results[1].as_ref().unwrap(),
            Command::Transfer { target: TransferTarget::International { country, .. }, .. }
                if country == "DE"
        ));
    }

    #[test]
    fn test_reader_rejects_bad_rows() {
        let results = parse(
            "teleport, 1, 1111, 10.0\n\
             transfer, 1, 1111, -5.0, 2222\n\
             deposit, 1, , 10.0",
        );
        assert!(results.iter().all(|r| r.is_err()));
    }
}
