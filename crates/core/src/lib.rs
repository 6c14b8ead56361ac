//! Core types and traits for Conduit
//!
//! This crate defines the foundational pieces of the contract pipeline:
//! - Value: Unified value enum for members, parameters and row cells
//! - Error: Error taxonomy (definition, binding, backend, mapping, configuration)
//! - EngineConfig: Process-wide configuration (`conduit.toml`)
//! - Contract / Entity: Declarative definitions and cached descriptors
//! - Transform: Per-member value conversion (enum, JSON, secure)
//! - CallContext: Ambient per-call metadata
//! - Driver: Boundary traits for the relational backend driver

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod context;
pub mod contract;
pub mod driver;
pub mod error;
pub mod transform;
pub mod value;

pub use cancel::CancellationToken;
pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use context::{CallContext, CallKind, CallTarget, ContextData, ContextScope};
pub use contract::{
    unknown_member, Args, Arguments, Contract, ContractDefinition, ContractDescriptor,
    DescriptorCache, DescriptorResolver, Entity, EntityDefinition, EntityDescriptor,
    MemberDefinition, MemberDescriptor,
};
pub use driver::{Call, CallParameter, Connection, Direction, Driver, Execution, Row, RowStream};
pub use error::{Error, ErrorKind, Result};
pub use transform::{
    EncryptionProvider, EnumStorage, EnumTransform, EnumType, InstanceKey, JsonTransform,
    MemberLookup, SecureTransform, Transform, TransformContext,
};
pub use value::{EnumValue, FromValue, Value};
