use thiserror::Error;

use super::{Address, Amount, Balance};

/// Broad class of a rejection. Callers branch on this instead of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller lacked permission or funds, or a participant is blocked.
    AccessRule,
    /// The request is well-formed but conflicts with current account state.
    StateConflict,
}

/// Why an operation was refused under the ledger's access rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessViolation {
    #[error("{caller} is not the ledger owner")]
    NotOwner { caller: Address },

    #[error("the null account cannot send or receive value")]
    NullAccount,

    #[error("transfers from {account} are paused")]
    SenderPaused { account: Address },

    #[error("transfers to {account} are paused")]
    RecipientPaused { account: Address },

    #[error("insufficient spendable balance in {account}: spendable {spendable}, required {required}")]
    InsufficientSpendable {
        account: Address,
        spendable: Balance,
        required: Amount,
    },

    #[error("insufficient allowance for {spender} on {owner}: allowed {allowed}, required {required}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowed: Amount,
        required: Amount,
    },

    #[error("arithmetic overflow on {account}")]
    Overflow { account: Address },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("access rule violated: {0}")]
    AccessRule(#[from] AccessViolation),

    #[error(
        "overdraft limit {requested} for {account} is below the {utilized} already drawn; repay first"
    )]
    StateConflict {
        account: Address,
        utilized: Amount,
        requested: Amount,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccessRule(_) => ErrorKind::AccessRule,
            LedgerError::StateConflict { .. } => ErrorKind::StateConflict,
        }
    }

    pub fn is_access_rule(&self) -> bool {
        self.kind() == ErrorKind::AccessRule
    }

    pub fn is_state_conflict(&self) -> bool {
        self.kind() == ErrorKind::StateConflict
    }
}
