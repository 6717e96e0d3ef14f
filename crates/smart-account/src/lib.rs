//! Validation and execution protocol for smart-contract accounts.
//!
//! A [`SmartAccount`] is validated and executed by a single trusted entry point, authorizes
//! operations with either its owner key or an owner-issued [`SessionKey`], and keeps a strictly
//! increasing nonce. Accounts are deployed lazily at deterministic addresses by an
//! [`AccountFactory`]. All state lives on a host [`Ledger`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use smart_account_abi as abi;

pub mod constants;

mod account;
pub use account::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod factory;
pub use factory::*;

mod handler;
pub use handler::*;

pub mod ledger;
pub use ledger::*;

mod operation;
pub use operation::*;

mod session;
pub use session::*;

mod storage;
pub use storage::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod validation;
pub use validation::*;

mod verifier;
pub use verifier::*;
