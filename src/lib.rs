//! Conduit - contract-driven data access for relational backends
//!
//! A contract is a typed description of a stored procedure or view call.
//! Conduit resolves it once into a cached descriptor, binds caller values
//! into parameters (running enum, JSON and secure transforms), executes it
//! through an injected driver and maps result rows back into typed entities.
//!
//! # Quick Start
//!
//! ```ignore
//! use conduit::*;
//!
//! let engine = Engine::builder().config_file(CONFIG_FILE_NAME)?.build()?;
//! let session = DbSession::new(engine, driver);
//!
//! let mut args = Args::new().with("Name", "Ada");
//! session.call_mut::<CreatePerson>(&mut args)?;
//! let people: Vec<Person> = session.get_all::<GetPeople, Person>(&())?;
//! ```
//!
//! # Architecture
//!
//! Everything goes through a [`Session`]. [`DbSession`] and [`DbTransaction`]
//! talk to a [`Driver`]; [`MockSession`] answers from a script while
//! sharing the same descriptors, call contexts, binding and mapping.

// Re-export the public API from conduit-executor
pub use conduit_executor::*;
