use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{AccountRecord, Address, Amount, Balance, LedgerEvent};
use crate::storage::{EventFilter, StoredEvent};

/// Full ledger snapshot: state plus the notification log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub owner: Address,
    pub total_supply: Amount,
    pub accounts: Vec<AccountEntry>,
    pub events: Vec<StoredEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub address: Address,
    pub spendable: Balance,
    #[serde(flatten)]
    pub record: AccountRecord,
}

/// Exporter for converting ledger data to various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export the notification log to CSV format, one row per notification.
    pub async fn export_events_csv<W: Write>(
        &self,
        writer: W,
        filter: &EventFilter,
    ) -> Result<usize> {
        let events = self.service.list_events(filter).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "sequence",
            "recorded_at",
            "operation_id",
            "caller",
            "event",
            "subject",
            "counterparty",
            "amount",
        ])?;

        for stored in &events {
            let (subject, counterparty, amount) = event_columns(&stored.event);
            csv_writer.write_record([
                stored.sequence.to_string(),
                stored.recorded_at.to_rfc3339(),
                stored.operation_id.to_string(),
                stored.caller.to_hex(),
                stored.event.name().to_string(),
                subject.to_hex(),
                counterparty.to_hex(),
                amount.map(|a| a.to_string()).unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(events.len())
    }

    /// Export the notification log as a JSON array.
    pub async fn export_events_json<W: Write>(
        &self,
        mut writer: W,
        filter: &EventFilter,
    ) -> Result<usize> {
        let events = self.service.list_events(filter).await?;
        serde_json::to_writer_pretty(&mut writer, &events)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(events.len())
    }

    /// Export every non-default account to CSV format
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.service.list_accounts().await;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "address",
            "stored_balance",
            "overdraft_limit",
            "spendable",
            "transfer_paused",
            "receive_paused",
            "allowances",
        ])?;

        for view in &accounts {
            let record = &view.record;
            csv_writer.write_record([
                view.address.to_hex(),
                record.stored_balance.to_string(),
                record.overdraft_limit.to_string(),
                view.spendable.to_string(),
                record.transfer_paused.to_string(),
                record.receive_paused.to_string(),
                record.allowances.len().to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(accounts.len())
    }

    /// Export every non-default account as a JSON array.
    pub async fn export_accounts_json<W: Write>(&self, mut writer: W) -> Result<usize> {
        let accounts = self.account_entries().await;
        serde_json::to_writer_pretty(&mut writer, &accounts)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(accounts.len())
    }

    /// Export full ledger as JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<LedgerSnapshot> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            owner: self.service.owner().await,
            total_supply: self.service.total_supply().await,
            accounts: self.account_entries().await,
            events: self.service.list_events(&EventFilter::default()).await?,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }

    async fn account_entries(&self) -> Vec<AccountEntry> {
        self.service
            .list_accounts()
            .await
            .into_iter()
            .map(|view| AccountEntry {
                address: view.address,
                spendable: view.spendable,
                record: view.record,
            })
            .collect()
    }
}

/// Flatten a notification into (subject, counterparty, amount) columns.
fn event_columns(event: &LedgerEvent) -> (Address, Address, Option<Amount>) {
    match event {
        LedgerEvent::Transfer { from, to, amount } => (*from, *to, Some(*amount)),
        LedgerEvent::Approval {
            owner,
            spender,
            amount,
        } => (*owner, *spender, Some(*amount)),
        LedgerEvent::OverdraftChanged {
            account,
            changed_by,
            new_limit,
        } => (*account, *changed_by, Some(*new_limit)),
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
        } => (*account, *changed_by, None),
    }
}
