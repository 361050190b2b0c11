use std::collections::BTreeMap;

use super::{
    AccessViolation, AccountRecord, Address, Amount, Balance, IntegrityIssue, IntegrityReport,
    LedgerError, LedgerEvent, Operation,
};

/// Default supply minted to the owner at genesis.
pub const DEFAULT_TOTAL_SUPPLY: Amount = 100;

static DEFAULT_RECORD: AccountRecord = AccountRecord {
    stored_balance: 0,
    overdraft_limit: 0,
    allowances: BTreeMap::new(),
    transfer_paused: false,
    receive_paused: false,
};

#[derive(Debug, Clone, Copy)]
enum PauseFlag {
    Transfer,
    Receive,
}

/// Fixed-supply ledger with per-account overdraft lines and pause flags.
///
/// Every mutating method either commits all of its effects and returns the
/// notifications it emitted, in order, or returns an error and leaves the
/// ledger untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    owner: Address,
    total_supply: Amount,
    /// Only records that differ from the default are kept.
    accounts: BTreeMap<Address, AccountRecord>,
}

impl Ledger {
    /// Create a ledger and mint the whole supply to `owner`.
    pub fn genesis(owner: Address, total_supply: Amount) -> Result<Self, LedgerError> {
        if owner.is_zero() {
            return Err(AccessViolation::NullAccount.into());
        }

        let mut ledger = Self {
            owner,
            total_supply,
            accounts: BTreeMap::new(),
        };
        ledger.update(owner, |r| r.stored_balance = Balance::from(total_supply));
        Ok(ledger)
    }

    /// Rebuild a ledger from stored parts. Fails if the parts break
    /// conservation or an overdraft bound.
    pub fn from_parts(
        owner: Address,
        total_supply: Amount,
        accounts: impl IntoIterator<Item = (Address, AccountRecord)>,
    ) -> Result<Self, Vec<IntegrityIssue>> {
        let ledger = Self {
            owner,
            total_supply,
            accounts: accounts
                .into_iter()
                .filter(|(_, record)| !record.is_default())
                .collect(),
        };

        let report = ledger.audit();
        if report.is_healthy() {
            Ok(ledger)
        } else {
            Err(report.issues)
        }
    }

    // ========================
    // Queries
    // ========================

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Stored balance plus overdraft limit.
    pub fn spendable_balance(&self, account: &Address) -> Balance {
        self.record(account).spendable()
    }

    pub fn stored_balance(&self, account: &Address) -> Balance {
        self.record(account).stored_balance
    }

    pub fn overdraft_limit(&self, account: &Address) -> Amount {
        self.record(account).overdraft_limit
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.record(owner).allowance(spender)
    }

    pub fn is_transfer_paused(&self, account: &Address) -> bool {
        self.record(account).transfer_paused
    }

    pub fn is_receive_paused(&self, account: &Address) -> bool {
        self.record(account).receive_paused
    }

    /// Full record for `account`; default values if it was never touched.
    pub fn account(&self, account: &Address) -> &AccountRecord {
        self.record(account)
    }

    /// Every account whose record differs from the default, ordered by address.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &AccountRecord)> {
        self.accounts.iter()
    }

    // ========================
    // Value movement
    // ========================

    pub fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.check_gates(caller, to)?;
        self.move_value(caller, to, amount)?;

        Ok(vec![LedgerEvent::Transfer {
            from: caller,
            to,
            amount,
        }])
    }

    /// Move `amount` from `from` to `to`, spending the caller's allowance.
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.check_gates(from, to)?;

        let allowed = self.allowance(&from, &caller);
        if allowed < amount {
            return Err(AccessViolation::InsufficientAllowance {
                owner: from,
                spender: caller,
                allowed,
                required: amount,
            }
            .into());
        }

        self.move_value(from, to, amount)?;
        self.update(from, |r| r.set_allowance(caller, allowed - amount));

        Ok(vec![LedgerEvent::Transfer { from, to, amount }])
    }

    // ========================
    // Allowances
    // ========================

    /// Record permission only: no balance check, the null spender is legal.
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.update(caller, |r| r.set_allowance(spender, amount));
        Ok(vec![LedgerEvent::Approval {
            owner: caller,
            spender,
            amount,
        }])
    }

    pub fn increase_approval(
        &mut self,
        caller: Address,
        spender: Address,
        delta: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let amount = self
            .allowance(&caller, &spender)
            .checked_add(delta)
            .ok_or(AccessViolation::Overflow { account: caller })?;
        self.approve(caller, spender, amount)
    }

    /// Underflow clamps to zero.
    pub fn decrease_approval(
        &mut self,
        caller: Address,
        spender: Address,
        delta: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let amount = self.allowance(&caller, &spender).saturating_sub(delta);
        self.approve(caller, spender, amount)
    }

    // ========================
    // Administration (owner only)
    // ========================

    pub fn edit_overdraft(
        &mut self,
        caller: Address,
        account: Address,
        new_limit: Amount,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.require_owner(caller)?;

        let utilized = self.record(&account).utilized_overdraft();
        if new_limit < utilized {
            return Err(LedgerError::StateConflict {
                account,
                utilized,
                requested: new_limit,
            });
        }

        self.update(account, |r| r.overdraft_limit = new_limit);
        Ok(vec![LedgerEvent::OverdraftChanged {
            account,
            changed_by: caller,
            new_limit,
        }])
    }

    pub fn pause_transfer(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.set_pause(caller, account, PauseFlag::Transfer, true)
    }

    pub fn unpause_transfer(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.set_pause(caller, account, PauseFlag::Transfer, false)
    }

    pub fn pause_receive(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.set_pause(caller, account, PauseFlag::Receive, true)
    }

    pub fn unpause_receive(
        &mut self,
        caller: Address,
        account: Address,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.set_pause(caller, account, PauseFlag::Receive, false)
    }

    /// Dispatch a transport-neutral operation on behalf of `caller`.
    pub fn apply(
        &mut self,
        caller: Address,
        operation: &Operation,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        match *operation {
            Operation::Transfer { to, amount } => self.transfer(caller, to, amount),
            Operation::Approve { spender, amount } => self.approve(caller, spender, amount),
            Operation::IncreaseApproval { spender, delta } => {
                self.increase_approval(caller, spender, delta)
            }
            Operation::DecreaseApproval { spender, delta } => {
                self.decrease_approval(caller, spender, delta)
            }
            Operation::TransferFrom { from, to, amount } => {
                self.transfer_from(caller, from, to, amount)
            }
            Operation::EditOverdraft { account, new_limit } => {
                self.edit_overdraft(caller, account, new_limit)
            }
            Operation::PauseTransfer { account } => self.pause_transfer(caller, account),
            Operation::UnpauseTransfer { account } => self.unpause_transfer(caller, account),
            Operation::PauseReceive { account } => self.pause_receive(caller, account),
            Operation::UnpauseReceive { account } => self.unpause_receive(caller, account),
        }
    }

    // ========================
    // Audit
    // ========================

    pub fn audit(&self) -> IntegrityReport {
        let mut issues = Vec::new();
        let mut balance_sum: Balance = 0;
        let mut accounts_in_overdraft = 0;
        let mut overdraft_utilized: Balance = 0;
        let mut paused_senders = 0;
        let mut paused_receivers = 0;

        for (address, record) in &self.accounts {
            balance_sum += record.stored_balance;

            if record.stored_balance < 0 {
                accounts_in_overdraft += 1;
                overdraft_utilized -= record.stored_balance;
            }
            if record.stored_balance < -Balance::from(record.overdraft_limit) {
                issues.push(IntegrityIssue::OverdraftExceeded {
                    account: *address,
                    stored_balance: record.stored_balance,
                    overdraft_limit: record.overdraft_limit,
                });
            }
            if address.is_zero() && record.stored_balance != 0 {
                issues.push(IntegrityIssue::NullAccountHoldsValue {
                    stored_balance: record.stored_balance,
                });
            }
            if record.transfer_paused {
                paused_senders += 1;
            }
            if record.receive_paused {
                paused_receivers += 1;
            }
        }

        if balance_sum != Balance::from(self.total_supply) {
            issues.insert(
                0,
                IntegrityIssue::SupplyMismatch {
                    total_supply: self.total_supply,
                    balance_sum,
                },
            );
        }

        IntegrityReport {
            total_supply: self.total_supply,
            account_count: self.accounts.len(),
            balance_sum,
            accounts_in_overdraft,
            overdraft_utilized,
            paused_senders,
            paused_receivers,
            issues,
        }
    }

    // ========================
    // Internals
    // ========================

    fn record(&self, account: &Address) -> &AccountRecord {
        self.accounts.get(account).unwrap_or(&DEFAULT_RECORD)
    }

    /// Mutate a record in place, dropping it again if it returns to default.
    fn update(&mut self, account: Address, f: impl FnOnce(&mut AccountRecord)) {
        let record = self.accounts.entry(account).or_default();
        f(record);
        if record.is_default() {
            self.accounts.remove(&account);
        }
    }

    /// Setting a flag to its current value still emits.
    fn set_pause(
        &mut self,
        caller: Address,
        account: Address,
        flag: PauseFlag,
        paused: bool,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.require_owner(caller)?;

        self.update(account, |r| match flag {
            PauseFlag::Transfer => r.transfer_paused = paused,
            PauseFlag::Receive => r.receive_paused = paused,
        });

        let changed_by = caller;
        let event = match (flag, paused) {
            (PauseFlag::Transfer, true) => LedgerEvent::TransferPaused { account, changed_by },
            (PauseFlag::Transfer, false) => LedgerEvent::TransferUnpaused { account, changed_by },
            (PauseFlag::Receive, true) => LedgerEvent::ReceivePaused { account, changed_by },
            (PauseFlag::Receive, false) => LedgerEvent::ReceiveUnpaused { account, changed_by },
        };
        Ok(vec![event])
    }

    fn require_owner(&self, caller: Address) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(AccessViolation::NotOwner { caller }.into());
        }
        Ok(())
    }

    /// Null-account exclusion and pause flags for a value movement.
    fn check_gates(&self, from: Address, to: Address) -> Result<(), LedgerError> {
        if from.is_zero() || to.is_zero() {
            return Err(AccessViolation::NullAccount.into());
        }
        if self.is_transfer_paused(&from) {
            return Err(AccessViolation::SenderPaused { account: from }.into());
        }
        if self.is_receive_paused(&to) {
            return Err(AccessViolation::RecipientPaused { account: to }.into());
        }
        Ok(())
    }

    /// Debit `from` and credit `to`. Validates everything before writing.
    fn move_value(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        let sender = self.record(&from);
        if !sender.can_debit(amount) {
            return Err(AccessViolation::InsufficientSpendable {
                account: from,
                spendable: sender.spendable(),
                required: amount,
            }
            .into());
        }

        if from == to {
            return Ok(());
        }

        let value = Balance::from(amount);
        let credited = self
            .record(&to)
            .stored_balance
            .checked_add(value)
            .ok_or(AccessViolation::Overflow { account: to })?;

        self.update(from, |r| r.stored_balance -= value);
        self.update(to, |r| r.stored_balance = credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;

    const OWNER: Address = Address::from_low_u8(1);
    const RECIPIENT: Address = Address::from_low_u8(2);
    const ANOTHER: Address = Address::from_low_u8(3);

    fn fresh() -> Ledger {
        Ledger::genesis(OWNER, DEFAULT_TOTAL_SUPPLY).unwrap()
    }

    #[test]
    fn test_genesis_mints_supply_to_owner() {
        let ledger = fresh();
        assert_eq!(ledger.total_supply(), 100);
        assert_eq!(ledger.spendable_balance(&OWNER), 100);
        assert_eq!(ledger.spendable_balance(&ANOTHER), 0);
        assert_eq!(ledger.owner(), OWNER);
        assert!(ledger.audit().is_healthy());
    }

    #[test]
    fn test_genesis_rejects_null_owner() {
        let result = Ledger::genesis(Address::ZERO, 100);
        assert!(matches!(
            result,
            Err(LedgerError::AccessRule(AccessViolation::NullAccount))
        ));
    }

    #[test]
    fn test_transfer_more_than_spendable_is_rejected() {
        let mut ledger = fresh();
        let before = ledger.clone();

        let err = ledger.transfer(OWNER, RECIPIENT, 101).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AccessRule);
        assert!(matches!(
            err,
            LedgerError::AccessRule(AccessViolation::InsufficientSpendable { required: 101, .. })
        ));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_transfer_moves_value_and_emits() {
        let mut ledger = fresh();

        let events = ledger.transfer(OWNER, RECIPIENT, 100).unwrap();

        assert_eq!(ledger.stored_balance(&OWNER), 0);
        assert_eq!(ledger.stored_balance(&RECIPIENT), 100);
        assert_eq!(
            events,
            vec![LedgerEvent::Transfer {
                from: OWNER,
                to: RECIPIENT,
                amount: 100
            }]
        );
    }

    #[test]
    fn test_transfer_to_null_account_is_rejected() {
        let mut ledger = fresh();
        let err = ledger.transfer(OWNER, Address::ZERO, 100).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccessRule(AccessViolation::NullAccount)
        ));
        assert_eq!(ledger.stored_balance(&OWNER), 100);
    }

    #[test]
    fn test_zero_amount_and_self_transfer() {
        let mut ledger = fresh();
        ledger.transfer(OWNER, RECIPIENT, 0).unwrap();
        ledger.transfer(OWNER, OWNER, 60).unwrap();
        assert_eq!(ledger.stored_balance(&OWNER), 100);
        assert_eq!(ledger.stored_balance(&RECIPIENT), 0);

        let err = ledger.transfer(OWNER, OWNER, 101).unwrap_err();
        assert!(err.is_access_rule());
    }

    #[test]
    fn test_approve_replaces_previous_amount() {
        let mut ledger = fresh();
        ledger.approve(OWNER, RECIPIENT, 1).unwrap();
        let events = ledger.approve(OWNER, RECIPIENT, 150).unwrap();

        assert_eq!(ledger.allowance(&OWNER, &RECIPIENT), 150);
        assert_eq!(
            events,
            vec![LedgerEvent::Approval {
                owner: OWNER,
                spender: RECIPIENT,
                amount: 150
            }]
        );
    }

    #[test]
    fn test_approve_null_spender_is_allowed() {
        let mut ledger = fresh();
        ledger.approve(OWNER, Address::ZERO, 100).unwrap();
        assert_eq!(ledger.allowance(&OWNER, &Address::ZERO), 100);
    }

    #[test]
    fn test_increase_and_decrease_approval() {
        let mut ledger = fresh();
        ledger.approve(OWNER, RECIPIENT, 100).unwrap();

        ledger.increase_approval(OWNER, RECIPIENT, 1).unwrap();
        assert_eq!(ledger.allowance(&OWNER, &RECIPIENT), 101);

        let events = ledger.decrease_approval(OWNER, RECIPIENT, 5).unwrap();
        assert_eq!(ledger.allowance(&OWNER, &RECIPIENT), 96);
        assert_eq!(
            events,
            vec![LedgerEvent::Approval {
                owner: OWNER,
                spender: RECIPIENT,
                amount: 96
            }]
        );

        let events = ledger.decrease_approval(OWNER, RECIPIENT, 1000).unwrap();
        assert_eq!(ledger.allowance(&OWNER, &RECIPIENT), 0);
        assert_eq!(
            events,
            vec![LedgerEvent::Approval {
                owner: OWNER,
                spender: RECIPIENT,
                amount: 0
            }]
        );
    }

    #[test]
    fn test_increase_approval_overflow_is_rejected() {
        let mut ledger = fresh();
        ledger.approve(OWNER, RECIPIENT, Amount::MAX).unwrap();
        let err = ledger.increase_approval(OWNER, RECIPIENT, 1).unwrap_err();
        assert!(err.is_access_rule());
        assert_eq!(ledger.allowance(&OWNER, &RECIPIENT), Amount::MAX);
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let mut ledger = fresh();
        ledger.approve(OWNER, RECIPIENT, 100).unwrap();

        let events = ledger.transfer_from(RECIPIENT, OWNER, ANOTHER, 100).unwrap();

        assert_eq!(ledger.stored_balance(&OWNER), 0);
        assert_eq!(ledger.stored_balance(&ANOTHER), 100);
        assert_eq!(ledger.allowance(&OWNER, &RECIPIENT), 0);
        assert_eq!(
            events,
            vec![LedgerEvent::Transfer {
                from: OWNER,
                to: ANOTHER,
                amount: 100
            }]
        );
    }

    #[test]
    fn test_transfer_from_rejections_leave_state_untouched() {
        let mut ledger = fresh();
        ledger.approve(OWNER, RECIPIENT, 99).unwrap();
        let before = ledger.clone();

        let err = ledger.transfer_from(RECIPIENT, OWNER, ANOTHER, 100).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccessRule(AccessViolation::InsufficientAllowance { allowed: 99, .. })
        ));

        ledger.approve(OWNER, RECIPIENT, 200).unwrap();
        let err = ledger.transfer_from(RECIPIENT, OWNER, ANOTHER, 101).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccessRule(AccessViolation::InsufficientSpendable { .. })
        ));
        assert_eq!(ledger.allowance(&OWNER, &RECIPIENT), 200);

        let err = ledger
            .transfer_from(RECIPIENT, OWNER, Address::ZERO, 1)
            .unwrap_err();
        assert!(err.is_access_rule());

        ledger.approve(OWNER, RECIPIENT, 99).unwrap();
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_edit_overdraft_extends_spendable() {
        let mut ledger = fresh();
        let before = ledger.spendable_balance(&OWNER);

        let events = ledger.edit_overdraft(OWNER, OWNER, 100).unwrap();

        assert_eq!(ledger.spendable_balance(&OWNER), before + 100);
        assert_eq!(ledger.stored_balance(&OWNER), 100);
        assert_eq!(
            events,
            vec![LedgerEvent::OverdraftChanged {
                account: OWNER,
                changed_by: OWNER,
                new_limit: 100
            }]
        );
    }

    #[test]
    fn test_overdraft_drawdown_and_conflicting_reduction() {
        let mut ledger = fresh();
        ledger.edit_overdraft(OWNER, OWNER, 100).unwrap();

        let spendable = ledger.spendable_balance(&OWNER) as Amount;
        ledger.transfer(OWNER, ANOTHER, spendable).unwrap();
        assert_eq!(ledger.stored_balance(&OWNER), -100);
        assert_eq!(ledger.spendable_balance(&OWNER), 0);
        assert!(ledger.audit().is_healthy());

        let before = ledger.clone();
        let err = ledger.edit_overdraft(OWNER, OWNER, 50).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(
            err,
            LedgerError::StateConflict {
                account: OWNER,
                utilized: 100,
                requested: 50
            }
        );
        assert_eq!(ledger, before);

        // Lowering to exactly the drawn amount is fine.
        ledger.edit_overdraft(OWNER, OWNER, 100).unwrap();
    }

    #[test]
    fn test_overdrawn_account_cannot_go_further() {
        let mut ledger = fresh();
        ledger.edit_overdraft(OWNER, ANOTHER, 10).unwrap();
        ledger.transfer(ANOTHER, RECIPIENT, 10).unwrap();
        assert_eq!(ledger.stored_balance(&ANOTHER), -10);

        let err = ledger.transfer(ANOTHER, RECIPIENT, 1).unwrap_err();
        assert!(err.is_access_rule());
        assert_eq!(ledger.audit().balance_sum, 100);
    }

    #[test]
    fn test_pause_receive_blocks_until_unpaused() {
        let mut ledger = fresh();
        let events = ledger.pause_receive(OWNER, RECIPIENT).unwrap();
        assert_eq!(
            events,
            vec![LedgerEvent::ReceivePaused {
                account: RECIPIENT,
                changed_by: OWNER
            }]
        );

        let err = ledger.transfer(OWNER, RECIPIENT, 50).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccessRule(AccessViolation::RecipientPaused { .. })
        ));

        ledger.unpause_receive(OWNER, RECIPIENT).unwrap();
        ledger.transfer(OWNER, RECIPIENT, 50).unwrap();
        assert_eq!(ledger.stored_balance(&RECIPIENT), 50);
    }

    #[test]
    fn test_pause_transfer_blocks_sender() {
        let mut ledger = fresh();
        ledger.pause_transfer(OWNER, OWNER).unwrap();
        let err = ledger.transfer(OWNER, RECIPIENT, 50).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccessRule(AccessViolation::SenderPaused { .. })
        ));

        ledger.approve(OWNER, RECIPIENT, 50).unwrap();
        let err = ledger.transfer_from(RECIPIENT, OWNER, ANOTHER, 50).unwrap_err();
        assert!(err.is_access_rule());

        let events = ledger.unpause_transfer(OWNER, OWNER).unwrap();
        assert_eq!(events[0].name(), "TransferUnpaused");
        ledger.transfer(OWNER, RECIPIENT, 50).unwrap();
    }

    #[test]
    fn test_pausing_is_idempotent() {
        let mut ledger = fresh();
        ledger.pause_receive(OWNER, RECIPIENT).unwrap();
        let snapshot = ledger.clone();
        let events = ledger.pause_receive(OWNER, RECIPIENT).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(ledger, snapshot);

        ledger.unpause_transfer(OWNER, ANOTHER).unwrap();
        ledger.unpause_transfer(OWNER, ANOTHER).unwrap();
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn test_non_owner_cannot_administer() {
        let mut ledger = fresh();
        let before = ledger.clone();

        for target in [OWNER, RECIPIENT, ANOTHER, Address::ZERO] {
            for result in [
                ledger.pause_receive(ANOTHER, target),
                ledger.pause_transfer(ANOTHER, target),
                ledger.unpause_receive(ANOTHER, target),
                ledger.unpause_transfer(ANOTHER, target),
                ledger.edit_overdraft(ANOTHER, target, 10),
            ] {
                let err = result.unwrap_err();
                assert_eq!(
                    err,
                    LedgerError::AccessRule(AccessViolation::NotOwner { caller: ANOTHER })
                );
            }
        }
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_apply_dispatches_operations() {
        let mut ledger = fresh();
        ledger
            .apply(
                OWNER,
                &Operation::EditOverdraft {
                    account: RECIPIENT,
                    new_limit: 5,
                },
            )
            .unwrap();
        let events = ledger
            .apply(
                RECIPIENT,
                &Operation::Transfer {
                    to: ANOTHER,
                    amount: 5,
                },
            )
            .unwrap();
        assert_eq!(events[0].name(), "Transfer");
        assert_eq!(ledger.stored_balance(&RECIPIENT), -5);
        assert_eq!(ledger.stored_balance(&ANOTHER), 5);
    }

    #[test]
    fn test_default_records_are_not_kept() {
        let mut ledger = fresh();
        ledger.approve(RECIPIENT, ANOTHER, 10).unwrap();
        ledger.approve(RECIPIENT, ANOTHER, 0).unwrap();
        ledger.pause_receive(OWNER, ANOTHER).unwrap();
        ledger.unpause_receive(OWNER, ANOTHER).unwrap();
        assert_eq!(ledger.accounts().count(), 1);
        assert!(ledger.account(&ANOTHER).is_default());
    }

    #[test]
    fn test_from_parts_rejects_broken_state() {
        let ledger = fresh();
        let restored = Ledger::from_parts(
            OWNER,
            100,
            ledger.accounts().map(|(a, r)| (*a, r.clone())),
        )
        .unwrap();
        assert_eq!(restored, ledger);

        let inflated = AccountRecord {
            stored_balance: 150,
            ..Default::default()
        };
        let issues = Ledger::from_parts(OWNER, 100, [(OWNER, inflated)]).unwrap_err();
        assert!(matches!(issues[0], IntegrityIssue::SupplyMismatch { .. }));

        let overdrawn = AccountRecord {
            stored_balance: -10,
            overdraft_limit: 5,
            ..Default::default()
        };
        let rich = AccountRecord {
            stored_balance: 110,
            ..Default::default()
        };
        let issues =
            Ledger::from_parts(OWNER, 100, [(OWNER, rich), (ANOTHER, overdrawn)]).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], IntegrityIssue::OverdraftExceeded { .. }));
    }

    #[test]
    fn test_null_account_with_value_is_unhealthy() {
        let owner = AccountRecord {
            stored_balance: 90,
            ..Default::default()
        };
        let null = AccountRecord {
            stored_balance: 10,
            ..Default::default()
        };
        let issues =
            Ledger::from_parts(OWNER, 100, [(OWNER, owner), (Address::ZERO, null)]).unwrap_err();

        // Supply is conserved; the only problem is where the value sits.
        assert_eq!(
            issues,
            vec![IntegrityIssue::NullAccountHoldsValue { stored_balance: 10 }]
        );
    }

    #[test]
    fn test_audit_reports_overdraft_usage() {
        let mut ledger = fresh();
        ledger.edit_overdraft(OWNER, ANOTHER, 30).unwrap();
        ledger.transfer(ANOTHER, RECIPIENT, 20).unwrap();
        ledger.pause_transfer(OWNER, RECIPIENT).unwrap();

        let report = ledger.audit();
        assert!(report.is_healthy());
        assert_eq!(report.balance_sum, 100);
        assert_eq!(report.accounts_in_overdraft, 1);
        assert_eq!(report.overdraft_utilized, 20);
        assert_eq!(report.paused_senders, 1);
        assert_eq!(report.paused_receivers, 0);
    }
}
