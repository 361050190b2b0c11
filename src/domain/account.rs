use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Address, Amount, Balance};

/// Everything the ledger knows about one account.
/// An identifier that was never touched reads as `AccountRecord::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Tokens actually held. Negative while the account draws on its overdraft.
    pub stored_balance: Balance,
    /// How far `stored_balance` may go below zero.
    pub overdraft_limit: Amount,
    /// Spender -> amount this account lets them move on its behalf.
    pub allowances: BTreeMap<Address, Amount>,
    /// Blocks the account as the source of a transfer.
    pub transfer_paused: bool,
    /// Blocks the account as the destination of a transfer.
    pub receive_paused: bool,
}

impl AccountRecord {
    /// Balance the account may spend down to zero: stored balance plus credit line.
    pub fn spendable(&self) -> Balance {
        self.stored_balance + Balance::from(self.overdraft_limit)
    }

    /// How much of the overdraft line is currently drawn.
    pub fn utilized_overdraft(&self) -> Amount {
        if self.stored_balance >= 0 {
            0
        } else {
            Amount::try_from(self.stored_balance.unsigned_abs()).unwrap_or(Amount::MAX)
        }
    }

    pub fn allowance(&self, spender: &Address) -> Amount {
        self.allowances.get(spender).copied().unwrap_or(0)
    }

    /// Zero allowances are not kept, so an unset pair and a pair set to 0
    /// look the same.
    pub fn set_allowance(&mut self, spender: Address, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&spender);
        } else {
            self.allowances.insert(spender, amount);
        }
    }

    /// True if the account could be `stored_balance - amount` without
    /// breaching its overdraft limit.
    pub fn can_debit(&self, amount: Amount) -> bool {
        self.stored_balance - Balance::from(amount) >= -Balance::from(self.overdraft_limit)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
