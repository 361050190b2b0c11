use serde::{Deserialize, Serialize};

use super::{Address, Amount, Balance};

/// Result of auditing a ledger against its invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub total_supply: Amount,
    pub account_count: usize,
    /// Sum of stored balances over every account. Must equal `total_supply`.
    pub balance_sum: Balance,
    pub accounts_in_overdraft: usize,
    pub overdraft_utilized: Balance,
    pub paused_senders: usize,
    pub paused_receivers: usize,
    pub issues: Vec<IntegrityIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    SupplyMismatch {
        total_supply: Amount,
        balance_sum: Balance,
    },
    OverdraftExceeded {
        account: Address,
        stored_balance: Balance,
        overdraft_limit: Amount,
    },
    NullAccountHoldsValue {
        stored_balance: Balance,
    },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::SupplyMismatch {
                total_supply,
                balance_sum,
            } => write!(
                f,
                "balances sum to {} but total supply is {}",
                balance_sum, total_supply
            ),
            IntegrityIssue::OverdraftExceeded {
                account,
                stored_balance,
                overdraft_limit,
            } => write!(
                f,
                "{} holds {} with an overdraft limit of only {}",
                account, stored_balance, overdraft_limit
            ),
            IntegrityIssue::NullAccountHoldsValue { stored_balance } => {
                write!(f, "null account holds {}", stored_balance)
            }
        }
    }
}

impl IntegrityReport {
    /// True when supply is conserved, no account is past its overdraft
    /// limit and the null account holds nothing.
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn is_conserved(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i, IntegrityIssue::SupplyMismatch { .. }))
    }
}
