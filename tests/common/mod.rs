// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use overdraft_ledger::application::{GenesisConfig, LedgerService};
use overdraft_ledger::domain::Address;
use tempfile::TempDir;

pub const OWNER: Address = Address::from_low_u8(1);
pub const ALICE: Address = Address::from_low_u8(2);
pub const BOB: Address = Address::from_low_u8(3);
pub const CAROL: Address = Address::from_low_u8(4);

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(&db_path(&temp_dir), &GenesisConfig::new(OWNER)).await?;
    Ok((service, temp_dir))
}

/// Path of the database file inside a test directory
pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_str().unwrap().to_string()
}

/// Owner pays `amount` to each of ALICE, BOB and CAROL.
pub async fn fund_holders(service: &LedgerService, amount: u64) -> Result<()> {
    for holder in [ALICE, BOB, CAROL] {
        service.transfer(OWNER, holder, amount).await?;
    }
    Ok(())
}
