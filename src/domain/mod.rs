mod account;
mod address;
mod error;
mod event;
mod integrity;
mod ledger;
mod operation;
mod units;

pub use account::*;
pub use address::*;
pub use error::*;
pub use event::*;
pub use integrity::*;
pub use ledger::*;
pub use operation::*;
pub use units::*;
