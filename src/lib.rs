pub mod client;
pub mod config;
pub mod deployment;
pub mod entry;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod snapshot;
pub mod state;
pub mod submission;
pub mod ui;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
