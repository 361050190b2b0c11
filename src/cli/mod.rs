use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::{GenesisConfig, LedgerService, Receipt};
use crate::domain::{Address, Amount, DEFAULT_TOTAL_SUPPLY, format_units, parse_amount};
use crate::io::{BatchImporter, BatchOptions, Exporter, read_batch};
use crate::storage::EventFilter;

/// Overdraft Ledger - fixed-supply token ledger
#[derive(Parser)]
#[command(name = "overdraft-ledger")]
#[command(about = "A fixed-supply token ledger with overdraft lines and pause controls")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "ledger.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new ledger and mint the whole supply to the owner
    Init {
        /// Owner account; receives the supply and administers the ledger
        #[arg(long)]
        owner: Address,

        /// Total supply, fixed for the life of the ledger
        #[arg(long, default_value_t = DEFAULT_TOTAL_SUPPLY, value_parser = parse_amount)]
        supply: Amount,
    },

    /// Show the total supply
    Supply,

    /// Show the spendable balance of an account (stored balance + overdraft limit)
    Balance { account: Address },

    /// Show how much a spender may move on behalf of an owner
    Allowance { owner: Address, spender: Address },

    /// Show every field of one account
    Account { address: Address },

    /// List every account that differs from the default
    Accounts,

    /// Move value from the caller to another account
    Transfer {
        /// Identity submitting the operation
        #[arg(long)]
        caller: Address,

        to: Address,

        #[arg(value_parser = parse_amount)]
        amount: Amount,
    },

    /// Move value on behalf of another account, spending the caller's allowance
    TransferFrom {
        #[arg(long)]
        caller: Address,

        /// Account the value is taken from
        #[arg(long)]
        from: Address,

        to: Address,

        #[arg(value_parser = parse_amount)]
        amount: Amount,
    },

    /// Set a spender's allowance on the caller's account
    Approve {
        #[arg(long)]
        caller: Address,

        spender: Address,

        #[arg(value_parser = parse_amount)]
        amount: Amount,
    },

    /// Raise a spender's allowance
    IncreaseApproval {
        #[arg(long)]
        caller: Address,

        spender: Address,

        #[arg(value_parser = parse_amount)]
        delta: Amount,
    },

    /// Lower a spender's allowance (never below zero)
    DecreaseApproval {
        #[arg(long)]
        caller: Address,

        spender: Address,

        #[arg(value_parser = parse_amount)]
        delta: Amount,
    },

    /// Set an account's overdraft limit (owner only)
    Overdraft {
        #[arg(long)]
        caller: Address,

        account: Address,

        #[arg(value_parser = parse_amount)]
        limit: Amount,
    },

    /// Block an account from sending (owner only)
    PauseTransfer {
        #[arg(long)]
        caller: Address,

        account: Address,
    },

    /// Allow an account to send again (owner only)
    UnpauseTransfer {
        #[arg(long)]
        caller: Address,

        account: Address,
    },

    /// Block an account from receiving (owner only)
    PauseReceive {
        #[arg(long)]
        caller: Address,

        account: Address,
    },

    /// Allow an account to receive again (owner only)
    UnpauseReceive {
        #[arg(long)]
        caller: Address,

        account: Address,
    },

    /// List logged notifications
    Events {
        /// Only notifications involving this account
        #[arg(long)]
        account: Option<Address>,

        /// Only this notification kind (e.g. Transfer, Approval)
        #[arg(long)]
        kind: Option<String>,

        /// Show only the most recent N notifications
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: events, accounts, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: csv, json (default: csv for events/accounts, json for full)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Submit a JSON batch of operations in order
    Apply {
        /// Batch file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Validate without committing
        #[arg(long)]
        dry_run: bool,

        /// Continue after a rejected operation
        #[arg(long)]
        keep_going: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let Commands::Init { owner, supply } = self.command {
            let genesis = GenesisConfig::new(owner).with_total_supply(supply);
            LedgerService::init(&self.database, &genesis).await?;
            println!("Ledger initialized: {}", self.database);
            println!("  Owner:        {}", owner);
            println!("  Total supply: {}", format_units(supply.into()));
            return Ok(());
        }

        let service = LedgerService::connect(&self.database).await?;

        match self.command {
            // Handled before connecting.
            Commands::Init { .. } => {}

            Commands::Supply => {
                println!("{}", service.total_supply().await);
            }

            Commands::Balance { account } => {
                println!("{}", service.spendable_balance(&account).await);
            }

            Commands::Allowance { owner, spender } => {
                println!("{}", service.allowance(&owner, &spender).await);
            }

            Commands::Account { address } => {
                run_account_command(&service, address).await?;
            }

            Commands::Accounts => {
                run_accounts_command(&service).await?;
            }

            Commands::Transfer { caller, to, amount } => {
                let receipt = service.transfer(caller, to, amount).await?;
                print_receipt(&receipt);
            }

            Commands::TransferFrom {
                caller,
                from,
                to,
                amount,
            } => {
                let receipt = service.transfer_from(caller, from, to, amount).await?;
                print_receipt(&receipt);
            }

            Commands::Approve {
                caller,
                spender,
                amount,
            } => {
                let receipt = service.approve(caller, spender, amount).await?;
                print_receipt(&receipt);
            }

            Commands::IncreaseApproval {
                caller,
                spender,
                delta,
            } => {
                let receipt = service.increase_approval(caller, spender, delta).await?;
                print_receipt(&receipt);
            }

            Commands::DecreaseApproval {
                caller,
                spender,
                delta,
            } => {
                let receipt = service.decrease_approval(caller, spender, delta).await?;
                print_receipt(&receipt);
            }

            Commands::Overdraft {
                caller,
                account,
                limit,
            } => {
                let receipt = service.edit_overdraft(caller, account, limit).await?;
                print_receipt(&receipt);
            }

            Commands::PauseTransfer { caller, account } => {
                let receipt = service.pause_transfer(caller, account).await?;
                print_receipt(&receipt);
            }

            Commands::UnpauseTransfer { caller, account } => {
                let receipt = service.unpause_transfer(caller, account).await?;
                print_receipt(&receipt);
            }

            Commands::PauseReceive { caller, account } => {
                let receipt = service.pause_receive(caller, account).await?;
                print_receipt(&receipt);
            }

            Commands::UnpauseReceive { caller, account } => {
                let receipt = service.unpause_receive(caller, account).await?;
                print_receipt(&receipt);
            }

            Commands::Events {
                account,
                kind,
                limit,
            } => {
                let filter = EventFilter {
                    account,
                    kind,
                    limit,
                };
                run_events_command(&service, &filter).await?;
            }

            Commands::Check => {
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
                format,
            } => {
                run_export_command(&service, &export_type, output.as_deref(), format.as_deref())
                    .await?;
            }

            Commands::Apply {
                input,
                dry_run,
                keep_going,
            } => {
                let options = BatchOptions {
                    dry_run,
                    keep_going,
                };
                run_apply_command(&service, input.as_deref(), &options).await?;
            }
        }

        Ok(())
    }
}

fn print_receipt(receipt: &Receipt) {
    println!("Committed operation {}", receipt.operation_id);
    for stored in &receipt.events {
        println!("  #{:<6} {}", stored.sequence, stored.event);
    }
}

async fn run_account_command(service: &LedgerService, address: Address) -> Result<()> {
    let view = service.get_account(&address).await;
    let record = &view.record;

    println!("Account: {}", view.address);
    if view.address == service.owner().await {
        println!("  Role:            owner");
    }
    println!("  Stored balance:  {}", format_units(record.stored_balance));
    println!(
        "  Overdraft limit: {}",
        format_units(record.overdraft_limit.into())
    );
    println!(
        "  Overdraft drawn: {}",
        format_units(record.utilized_overdraft().into())
    );
    println!("  Spendable:       {}", format_units(view.spendable));
    println!(
        "  Sending:         {}",
        if record.transfer_paused { "paused" } else { "active" }
    );
    println!(
        "  Receiving:       {}",
        if record.receive_paused { "paused" } else { "active" }
    );

    if !record.allowances.is_empty() {
        println!();
        println!("  Allowances:");
        for (spender, amount) in &record.allowances {
            println!("    {} {:>20}", spender, format_units((*amount).into()));
        }
    }
    Ok(())
}

async fn run_accounts_command(service: &LedgerService) -> Result<()> {
    let accounts = service.list_accounts().await;
    if accounts.is_empty() {
        println!("No accounts found.");
        return Ok(());
    }

    println!(
        "{:<42} {:>14} {:>14} {:>14} FLAGS",
        "ACCOUNT", "STORED", "OVERDRAFT", "SPENDABLE"
    );
    println!("{}", "-".repeat(94));
    for view in accounts {
        let mut flags = Vec::new();
        if view.record.transfer_paused {
            flags.push("no-send");
        }
        if view.record.receive_paused {
            flags.push("no-receive");
        }
        println!(
            "{:<42} {:>14} {:>14} {:>14} {}",
            view.address.to_hex(),
            format_units(view.record.stored_balance),
            format_units(view.record.overdraft_limit.into()),
            format_units(view.spendable),
            flags.join(",")
        );
    }
    Ok(())
}

async fn run_events_command(service: &LedgerService, filter: &EventFilter) -> Result<()> {
    let events = service.list_events(filter).await?;
    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }

    println!("{:<8} {:<20} EVENT", "SEQ", "RECORDED");
    println!("{}", "-".repeat(70));
    for stored in events {
        println!(
            "{:<8} {:<20} {}",
            stored.sequence,
            stored.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            stored.event
        );
    }
    Ok(())
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await;
    let event_count = service.count_events().await?;

    println!("Accounts:            {}", report.account_count);
    println!("Events:              {}", event_count);
    println!(
        "Total supply:        {}",
        format_units(report.total_supply.into())
    );
    println!(
        "Sum of balances:     {}  {}",
        format_units(report.balance_sum),
        if report.is_conserved() { "OK" } else { "MISMATCH!" }
    );
    println!("In overdraft:        {}", report.accounts_in_overdraft);
    println!(
        "Overdraft drawn:     {}",
        format_units(report.overdraft_utilized)
    );
    println!("Paused senders:      {}", report.paused_senders);
    println!("Paused receivers:    {}", report.paused_receivers);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
    format: Option<&str>,
) -> Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let exporter = Exporter::new(service);
    let filter = EventFilter::default();

    let count = match (export_type, format.unwrap_or("")) {
        ("events", "" | "csv") => exporter.export_events_csv(writer, &filter).await?,
        ("events", "json") => exporter.export_events_json(writer, &filter).await?,
        ("accounts", "" | "csv") => exporter.export_accounts_csv(writer).await?,
        ("accounts", "json") => exporter.export_accounts_json(writer).await?,
        ("full", "" | "json") => {
            let snapshot = exporter.export_full_json(writer).await?;
            snapshot.accounts.len() + snapshot.events.len()
        }
        ("events" | "accounts" | "full", other) => {
            anyhow::bail!("Unsupported format '{}' for {} export", other, export_type)
        }
        (other, _) => anyhow::bail!(
            "Unknown export type '{}'. Valid types: events, accounts, full",
            other
        ),
    };

    if let Some(path) = output {
        eprintln!("Exported {} record(s) to {}", count, path);
    }
    Ok(())
}

async fn run_apply_command(
    service: &LedgerService,
    input: Option<&str>,
    options: &BatchOptions,
) -> Result<()> {
    let submissions = match input {
        Some(path) => read_batch(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path))?,
        ))?,
        None => read_batch(io::stdin().lock())?,
    };

    let result = BatchImporter::new(service)
        .apply(&submissions, options)
        .await?;

    let verb = if options.dry_run { "Would apply" } else { "Applied" };
    println!("{} {} of {} operation(s)", verb, result.applied, submissions.len());

    for rejection in &result.rejected {
        println!(
            "  [{}] {}{} rejected: {}",
            rejection.index,
            rejection.operation,
            if rejection.administrative { " (owner only)" } else { "" },
            rejection.error
        );
    }
    if result.stopped_early {
        println!("Stopped at the first rejection; use --keep-going to continue past it.");
    }

    if !result.rejected.is_empty() {
        anyhow::bail!("{} operation(s) rejected", result.rejected.len());
    }
    Ok(())
}
