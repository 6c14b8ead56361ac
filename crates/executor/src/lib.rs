//! # Conduit Executor
//!
//! The call layer of Conduit. This is the only crate users need to import:
//! it re-exports the core definition types alongside the sessions that run
//! them.
//!
//! - [`Engine`] - Configuration, cached descriptors and observers
//! - [`Session`] - `call`, `call_mut`, `get`, `get_all`, `get_variants`
//! - [`DbSession`] / [`DbTransaction`] - Driver-backed sessions
//! - [`MockSession`] - Scripted session for tests, same pipeline
//! - [`GenSpec`] - Discriminator-based polymorphic mapping
//!
//! ## Quick Start
//!
//! ```text
//! use conduit_executor::*;
//!
//! struct GetPeople;
//!
//! impl Contract for GetPeople {
//!     fn definition() -> ContractDefinition {
//!         ContractDefinition::stored_call("GetPeople")
//!             .member(MemberDefinition::new("Team").required())
//!     }
//! }
//!
//! let engine = Engine::builder().config_file("conduit.toml")?.build()?;
//! let session = DbSession::new(engine, driver);
//!
//! // Runs usp_GetPeople @Team = 'core' and maps every row
//! let people: Vec<Person> = session.get_all::<GetPeople, Person>(&Args::new().with("Team", "core"))?;
//! ```
//!
//! ## Transactions
//!
//! ```text
//! let txn = session.begin_transaction()?;
//! txn.call::<Debit>(&debit)?;
//! txn.call::<Credit>(&credit)?;
//! txn.commit()?;
//! ```
//!
//! Dropping an uncommitted transaction rolls it back.

#![warn(missing_docs)]

mod binder;
mod engine;
mod genspec;
mod mapper;
mod mock;
mod notify;
mod session;
mod transaction;

pub mod testing;

// Test modules
#[cfg(test)]
mod tests;

// =============================================================================
// Public API - Everything users need is re-exported here
// =============================================================================

pub use engine::{Engine, EngineBuilder};
pub use genspec::{GenSpec, VariantRegistry, VariantRegistryBuilder};
pub use mock::{MockInvocation, MockResponse, MockSession, MockTransaction, MockTransactionEnd};
pub use notify::{
    CallCompleted, CallObserver, CallStarted, RowRejected, UnexpectedColumn, UnresolvedMember,
};
pub use session::{
    DbSession, PreparedCall, Session, SessionScope, TransactionSession, Transactional,
};
pub use transaction::DbTransaction;

// Re-export the core so users don't need conduit-core directly
pub use conduit_core::{
    unknown_member, Args, Arguments, Call, CallContext, CallKind, CallParameter, CallTarget,
    CancellationToken, Connection, ContextData, Contract, ContractDefinition, ContractDescriptor,
    Direction, Driver, EncryptionProvider, EngineConfig, Entity, EntityDefinition,
    EntityDescriptor, EnumStorage, EnumTransform, EnumType, EnumValue, Error, ErrorKind,
    Execution, FromValue, JsonTransform, MemberDefinition, MemberDescriptor, MemberLookup,
    Result, Row, RowStream, Transform, TransformContext, Value, CONFIG_FILE_NAME,
};
