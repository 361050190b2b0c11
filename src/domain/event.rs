use serde::{Deserialize, Serialize};

use super::{Address, Amount};

/// Notification emitted by a committed operation.
/// A rejected operation emits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: Amount,
    },
    OverdraftChanged {
        account: Address,
        changed_by: Address,
        new_limit: Amount,
    },
    TransferPaused {
        account: Address,
        changed_by: Address,
    },
    TransferUnpaused {
        account: Address,
        changed_by: Address,
    },
    ReceivePaused {
        account: Address,
        changed_by: Address,
    },
    ReceiveUnpaused {
        account: Address,
        changed_by: Address,
    },
}

impl LedgerEvent {
    /// Notification name as an indexer would see it.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Transfer { .. } => "Transfer",
            LedgerEvent::Approval { .. } => "Approval",
            LedgerEvent::OverdraftChanged { .. } => "OverdraftChanged",
            LedgerEvent::TransferPaused { .. } => "TransferPaused",
            LedgerEvent::TransferUnpaused { .. } => "TransferUnpaused",
            LedgerEvent::ReceivePaused { .. } => "ReceivePaused",
            LedgerEvent::ReceiveUnpaused { .. } => "ReceiveUnpaused",
        }
    }

    /// Accounts whose records may have changed with this notification.
    pub fn touched_accounts(&self) -> Vec<Address> {
        match self {
            LedgerEvent::Transfer { from, to, .. } => vec![*from, *to],
            LedgerEvent::Approval { owner, .. } => vec![*owner],
            LedgerEvent::OverdraftChanged { account, .. }
            | LedgerEvent::TransferPaused { account, .. }
            | LedgerEvent::TransferUnpaused { account, .. }
            | LedgerEvent::ReceivePaused { account, .. }
            | LedgerEvent::ReceiveUnpaused { account, .. } => vec![*account],
        }
    }

    /// True if `account` appears anywhere in the notification.
    pub fn involves(&self, account: &Address) -> bool {
        match self {
            LedgerEvent::Transfer { from, to, .. } => from == account || to == account,
            LedgerEvent::Approval { owner, spender, .. } => owner == account || spender == account,
            LedgerEvent::OverdraftChanged {
                account: a,
                changed_by,
                ..
            }
            | LedgerEvent::TransferPaused {
                account: a,
                changed_by,
            }
            | LedgerEvent::TransferUnpaused {
                account: a,
                changed_by,
            }
            | LedgerEvent::ReceivePaused {
                account: a,
                changed_by,
            }
            | LedgerEvent::ReceiveUnpaused {
                account: a,
                changed_by,
            } => a == account || changed_by == account,
        }
    }
}

impl std::fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEvent::Transfer { from, to, amount } => {
                write!(f, "Transfer({}, {}, {})", from, to, amount)
            }
            LedgerEvent::Approval {
                owner,
                spender,
                amount,
            } => write!(f, "Approval({}, {}, {})", owner, spender, amount),
            LedgerEvent::OverdraftChanged {
                account,
                changed_by,
                new_limit,
            } => write!(
                f,
                "OverdraftChanged({}, {}, {})",
                account, changed_by, new_limit
            ),
            LedgerEvent::TransferPaused {
                account,
                changed_by,
            }
            | LedgerEvent::TransferUnpaused {
                account,
                changed_by,
            }
            | LedgerEvent::ReceivePaused {
                account,
                changed_by,
            }
            | LedgerEvent::ReceiveUnpaused {
                account,
                changed_by,
            } => write!(f, "{}({}, {})", self.name(), account, changed_by),
        }
    }
}
