mod account;
mod history;
mod investment;
mod ledger;
mod money;
mod transaction;

pub use account::*;
pub use history::*;
pub use investment::*;
pub use ledger::*;
pub use money::*;
pub use transaction::*;
