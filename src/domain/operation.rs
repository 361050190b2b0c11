use serde::{Deserialize, Serialize};

use super::{Address, Amount};

/// A mutating call, detached from whoever delivers it.
/// The caller identity travels alongside, never inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Transfer {
        to: Address,
        amount: Amount,
    },
    Approve {
        spender: Address,
        amount: Amount,
    },
    IncreaseApproval {
        spender: Address,
        delta: Amount,
    },
    DecreaseApproval {
        spender: Address,
        delta: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        amount: Amount,
    },
    EditOverdraft {
        account: Address,
        new_limit: Amount,
    },
    PauseTransfer {
        account: Address,
    },
    UnpauseTransfer {
        account: Address,
    },
    PauseReceive {
        account: Address,
    },
    UnpauseReceive {
        account: Address,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Transfer { .. } => "transfer",
            Operation::Approve { .. } => "approve",
            Operation::IncreaseApproval { .. } => "increase_approval",
            Operation::DecreaseApproval { .. } => "decrease_approval",
            Operation::TransferFrom { .. } => "transfer_from",
            Operation::EditOverdraft { .. } => "edit_overdraft",
            Operation::PauseTransfer { .. } => "pause_transfer",
            Operation::UnpauseTransfer { .. } => "unpause_transfer",
            Operation::PauseReceive { .. } => "pause_receive",
            Operation::UnpauseReceive { .. } => "unpause_receive",
        }
    }

    /// Owner-restricted operations.
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            Operation::EditOverdraft { .. }
                | Operation::PauseTransfer { .. }
                | Operation::UnpauseTransfer { .. }
                | Operation::PauseReceive { .. }
                | Operation::UnpauseReceive { .. }
        )
    }
}

/// An operation together with the identity submitting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub caller: Address,
    #[serde(flatten)]
    pub operation: Operation,
}
