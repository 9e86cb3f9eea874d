use crate::domain::account::{Account, AccountKind};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Flat CSV projection of a cached account.
#[derive(Serialize)]
struct AccountRow<'a> {
    owner: i64,
    id: i64,
    number: &'a str,
    kind: AccountKind,
    balance: Decimal,
    currency: &'a str,
}

impl<'a> From<&'a Account> for AccountRow<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            owner: account.owner.0,
            id: account.id.0,
            number: &account.number,
            kind: account.kind,
            balance: account.balance.value(),
            currency: &account.currency,
        }
    }
}

/// Writes account state as CSV to any `Write` sink.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts<'a, I>(&mut self, accounts: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Account>,
    {
        for account in accounts {
            self.writer.serialize(AccountRow::from(account))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountId, OwnerId};
    use crate::domain::money::Balance;
    use rust_decimal_macros::dec;

    #[test]
    fn test_writer_emits_header_and_rows() {
        let mut account = Account::new(
            AccountId(7),
            OwnerId(1),
            "4400 1100 0000 0001",
            AccountKind::Debit,
        );
        account.balance = Balance::new(dec!(1500.0));

        let mut buf = Vec::new();
        AccountWriter::new(&mut buf)
            .write_accounts([&account])
            .unwrap();

        let output = String::from_utf8(buf).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("owner,id,number,kind,balance,currency")
        );
        assert_eq!(
            lines.next(),
            Some("1,7,4400 1100 0000 0001,debit,1500.0,KZT")
        );
    }
}
