//! Accounts (C6): the five named cash buckets a deal holds, with audited
//! transfers.
//!
//! Grounded on the `accrual rate / basis / deferral` shape the teacher
//! repeats across its cash-management and reserve-account modules,
//! simplified to the one operation the waterfall actually needs: a
//! balance that only ever moves by an audited `transfer`.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Money;
use crate::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountName {
    InterestCollection,
    PrincipalCollection,
    InterestReserve,
    PrincipalReserve,
    Custodial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub name: AccountName,
    pub balance: Money,
}

/// One audited movement between two accounts, or between an account and
/// an external payee (`to == None` for a waterfall payment out of the
/// deal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub period: u32,
    pub from: AccountName,
    pub to: Option<AccountName>,
    pub amount: Money,
    pub memo: String,
}

/// The fixed set of five named accounts a deal holds (§3 Account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSet {
    pub interest_collection: Account,
    pub principal_collection: Account,
    pub interest_reserve: Account,
    pub principal_reserve: Account,
    pub custodial: Account,
    pub ledger: Vec<TransferRecord>,
}

impl AccountSet {
    pub fn new() -> Self {
        Self {
            interest_collection: Account { name: AccountName::InterestCollection, balance: Money::ZERO },
            principal_collection: Account { name: AccountName::PrincipalCollection, balance: Money::ZERO },
            interest_reserve: Account { name: AccountName::InterestReserve, balance: Money::ZERO },
            principal_reserve: Account { name: AccountName::PrincipalReserve, balance: Money::ZERO },
            custodial: Account { name: AccountName::Custodial, balance: Money::ZERO },
            ledger: Vec::new(),
        }
    }

    fn account_mut(&mut self, name: AccountName) -> &mut Account {
        match name {
            AccountName::InterestCollection => &mut self.interest_collection,
            AccountName::PrincipalCollection => &mut self.principal_collection,
            AccountName::InterestReserve => &mut self.interest_reserve,
            AccountName::PrincipalReserve => &mut self.principal_reserve,
            AccountName::Custodial => &mut self.custodial,
        }
    }

    pub fn balance(&self, name: AccountName) -> Money {
        match name {
            AccountName::InterestCollection => self.interest_collection.balance,
            AccountName::PrincipalCollection => self.principal_collection.balance,
            AccountName::InterestReserve => self.interest_reserve.balance,
            AccountName::PrincipalReserve => self.principal_reserve.balance,
            AccountName::Custodial => self.custodial.balance,
        }
    }

    /// Deposit cash into an account (e.g. collections received from the
    /// asset model). Never decreases any other balance.
    pub fn deposit(&mut self, period: u32, to: AccountName, amount: Money, memo: &str) -> EngineResult<()> {
        if amount < Money::ZERO {
            return Err(EngineError::BadInput {
                field: "amount".into(),
                reason: "deposit amount cannot be negative".into(),
            });
        }
        self.account_mut(to).balance += amount;
        self.ledger.push(TransferRecord {
            period,
            from: to,
            to: Some(to),
            amount,
            memo: memo.into(),
        });
        Ok(())
    }

    /// Move cash between two accounts, or out of the deal entirely when
    /// `to` is `None` (a waterfall payment to a tranche or fee payee).
    /// This is the only mutation surface the waterfall engine is given
    /// (the `EngineView` facade calls through to this verb exclusively).
    pub fn transfer(
        &mut self,
        period: u32,
        from: AccountName,
        to: Option<AccountName>,
        amount: Money,
        memo: &str,
    ) -> EngineResult<TransferRecord> {
        if amount < Money::ZERO {
            return Err(EngineError::BadInput {
                field: "amount".into(),
                reason: "transfer amount cannot be negative".into(),
            });
        }
        let available = self.balance(from);
        if amount > available {
            return Err(EngineError::InvariantBreach {
                period,
                component: "account".into(),
                detail: format!(
                    "transfer of {amount} from {from:?} exceeds available balance {available}"
                ),
            });
        }

        self.account_mut(from).balance -= amount;
        if let Some(dest) = to {
            self.account_mut(dest).balance += amount;
        }

        let record = TransferRecord { period, from, to, amount, memo: memo.into() };
        self.ledger.push(record.clone());
        Ok(record)
    }

    pub fn total_balance(&self) -> Money {
        self.interest_collection.balance
            + self.principal_collection.balance
            + self.interest_reserve.balance
            + self.principal_reserve.balance
            + self.custodial.balance
    }
}

impl Default for AccountSet {
    fn default() -> Self {
        Self::new()
    }
}
