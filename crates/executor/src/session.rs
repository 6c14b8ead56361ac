//! Sessions: the surface contracts are invoked through.
//!
//! Every session runs the same pipeline:
//!
//! 1. resolve the contract descriptor (cached per engine)
//! 2. build a fresh [`CallContext`] from the session scope
//! 3. bind arguments into parameters (no connection is open yet)
//! 4. hand the [`PreparedCall`] to [`Session::execute`]
//! 5. shape the result: status, output write-back, mapped rows
//!
//! Only step 4 differs between implementations. [`DbSession`] opens a
//! driver connection per call, [`DbTransaction`] reuses its pinned
//! connection and [`MockSession`](crate::MockSession) answers from a
//! script, so call contexts, binding and mapping behave identically.
//!
//! # Usage
//!
//! ```text
//! let session = DbSession::new(engine, driver);
//!
//! let mut args = Args::new().with("Name", "Ada");
//! let status = session.call_mut::<CreatePerson>(&mut args)?;
//! let id = args.get("PersonId");
//!
//! let people: Vec<Person> = session.get_all::<ListPeople, Person>(&())?;
//! ```

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use conduit_core::{
    Arguments, CallContext, CallParameter, CancellationToken, Connection, ContextData,
    ContextScope, Contract, ContractDescriptor, Driver, Entity, Execution, Result,
};
use tracing::debug;
use uuid::Uuid;

use crate::binder;
use crate::engine::Engine;
use crate::genspec::GenSpec;
use crate::mapper::{self, RowMapper};
use crate::notify::{CallCompleted, CallStarted};
use crate::transaction::{DbTransaction, TransactionState};

// =============================================================================
// Scope and prepared calls
// =============================================================================

/// What every call issued through one session shares.
#[derive(Clone)]
pub struct SessionScope {
    connection_name: Option<String>,
    context_data: Arc<ContextData>,
    cancel: CancellationToken,
    strict_columns: Option<bool>,
}

impl SessionScope {
    /// Default scope: default connection, fresh context data.
    pub fn new() -> Self {
        Self {
            connection_name: None,
            context_data: Arc::new(ContextData::new()),
            cancel: CancellationToken::new(),
            strict_columns: None,
        }
    }

    /// Logical connection name.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection_name.as_deref()
    }

    /// Shared context data.
    pub fn context_data(&self) -> &Arc<ContextData> {
        &self.context_data
    }

    /// Cancellation token observed by calls.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Strict-columns override, if set.
    pub fn strict_columns(&self) -> Option<bool> {
        self.strict_columns
    }
}

impl Default for SessionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionScope")
            .field("connection_name", &self.connection_name)
            .field("context_entries", &self.context_data.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("strict_columns", &self.strict_columns)
            .finish()
    }
}

/// A resolved, bound call ready to execute.
#[derive(Debug)]
pub struct PreparedCall {
    contract: TypeId,
    descriptor: Arc<ContractDescriptor>,
    context: CallContext,
    parameters: Vec<CallParameter>,
}

impl PreparedCall {
    /// Contract descriptor.
    pub fn descriptor(&self) -> &ContractDescriptor {
        &self.descriptor
    }

    /// Context built for this call.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Bound parameters in declaration order.
    pub fn parameters(&self) -> &[CallParameter] {
        &self.parameters
    }

    /// Whether this call invokes contract `C`.
    pub fn is<C: Contract>(&self) -> bool {
        self.contract == TypeId::of::<C>()
    }

    pub(crate) fn contract_type(&self) -> TypeId {
        self.contract
    }
}

// =============================================================================
// Session trait
// =============================================================================

/// Issues contract calls.
///
/// Implementors supply the scope accessors and [`execute`](Session::execute);
/// everything else is provided and shared by all implementations.
pub trait Session: Sized {
    /// Engine the session was created from.
    fn engine(&self) -> &Arc<Engine>;

    /// Scope shared by this session's calls.
    fn scope(&self) -> &SessionScope;

    /// A session like this one with a different scope.
    fn rescoped(&self, scope: SessionScope) -> Self;

    /// Run a prepared call against the backend.
    fn execute(&self, call: &PreparedCall) -> Result<Execution>;

    /// Transaction every call of this session belongs to.
    fn transaction_id(&self) -> Option<Uuid> {
        None
    }

    /// Execute `C` and return the backend return value. Output parameters
    /// are discarded.
    fn call<C: Contract>(&self, args: &dyn Arguments) -> Result<i64> {
        let prepared = prepare::<C, Self>(self, args)?;
        complete(self, &prepared, |execution| Ok((execution.return_value, 0)))
    }

    /// Execute `C`, then write output parameters back onto `args`.
    ///
    /// Nothing is written when execution fails.
    fn call_mut<C: Contract>(&self, args: &mut dyn Arguments) -> Result<i64> {
        let prepared = prepare::<C, Self>(self, &*args)?;
        let notifier = self.engine().notifier();
        complete(self, &prepared, |execution| {
            binder::write_back(&prepared.descriptor, &execution, args, &prepared.context, notifier)?;
            Ok((execution.return_value, 0))
        })
    }

    /// Execute `C` and map the first row into a `T`. Remaining rows are
    /// drained and ignored.
    fn get<C: Contract, T: Entity>(&self, args: &dyn Arguments) -> Result<Option<T>> {
        let prepared = prepare::<C, Self>(self, args)?;
        let engine = self.engine();
        let cancel = self.scope().cancellation();
        complete(self, &prepared, |mut execution| {
            let mapper = RowMapper::new(
                engine.resolver(),
                engine.notifier(),
                &prepared.context,
                self.strict_columns(),
            );
            let found = mapper::collect_first(execution.rows.as_mut(), cancel, |row, index| {
                mapper.map_entity::<T>(row, index)
            })?;
            let rows = usize::from(found.is_some());
            Ok((found, rows))
        })
    }

    /// Execute `C` and map every row into a `T`, in row order.
    fn get_all<C: Contract, T: Entity>(&self, args: &dyn Arguments) -> Result<Vec<T>> {
        let prepared = prepare::<C, Self>(self, args)?;
        let engine = self.engine();
        let cancel = self.scope().cancellation();
        complete(self, &prepared, |mut execution| {
            let mapper = RowMapper::new(
                engine.resolver(),
                engine.notifier(),
                &prepared.context,
                self.strict_columns(),
            );
            let all = mapper::collect_all(execution.rows.as_mut(), &mapper, cancel, |row, index| {
                mapper.map_entity::<T>(row, index)
            })?;
            let rows = all.len();
            Ok((all, rows))
        })
    }

    /// Execute `C` and map every row into the GenSpec variant its
    /// discriminator selects.
    fn get_variants<C: Contract, G: GenSpec>(&self, args: &dyn Arguments) -> Result<Vec<G>> {
        let engine = self.engine();
        let registry = engine.variants::<G>()?;
        let prepared = prepare::<C, Self>(self, args)?;
        let cancel = self.scope().cancellation();
        let column = registry
            .column()
            .unwrap_or(engine.config().discriminator_column.as_str());
        complete(self, &prepared, |mut execution| {
            let mapper = RowMapper::new(
                engine.resolver(),
                engine.notifier(),
                &prepared.context,
                self.strict_columns(),
            )
            .with_discriminator(column);
            let all = mapper::collect_all(execution.rows.as_mut(), &mapper, cancel, |row, index| {
                mapper.map_variant(&registry, row, index)
            })?;
            let rows = all.len();
            Ok((all, rows))
        })
    }

    /// Session for another logical connection, sharing this session's
    /// context data.
    fn with_connection(&self, connection_name: impl Into<String>) -> Self {
        let mut scope = self.scope().clone();
        scope.connection_name = Some(connection_name.into());
        self.rescoped(scope)
    }

    /// Session for another logical connection with its own context data.
    fn with_context(&self, connection_name: impl Into<String>, data: Arc<ContextData>) -> Self {
        let mut scope = self.scope().clone();
        scope.connection_name = Some(connection_name.into());
        scope.context_data = data;
        self.rescoped(scope)
    }

    /// Session whose calls observe `token`.
    fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut scope = self.scope().clone();
        scope.cancel = token;
        self.rescoped(scope)
    }

    /// Session with the strict-columns setting overridden.
    fn with_strict_columns(&self, strict: bool) -> Self {
        let mut scope = self.scope().clone();
        scope.strict_columns = Some(strict);
        self.rescoped(scope)
    }

    /// Context data shared by this session's calls.
    fn context_data(&self) -> Arc<ContextData> {
        Arc::clone(self.scope().context_data())
    }

    /// Whether unmapped columns fail the call.
    fn strict_columns(&self) -> bool {
        self.scope()
            .strict_columns
            .unwrap_or(self.engine().config().strict_columns)
    }
}

/// Opens a transaction.
pub trait Transactional: Session {
    /// Session type whose calls run inside the transaction.
    type Transaction: TransactionSession;

    /// Begin a transaction. Every call through the returned session shares
    /// one connection and one transaction id.
    fn begin_transaction(&self) -> Result<Self::Transaction>;
}

/// A session bound to one transaction.
///
/// Dropping the last handle of an active transaction rolls it back.
pub trait TransactionSession: Session {
    /// Transaction id, shared by every call of the transaction.
    fn id(&self) -> Uuid;

    /// Commit. Later calls fail with `TransactionCompleted`.
    fn commit(&self) -> Result<()>;

    /// Roll back. Later calls fail with `TransactionCompleted`.
    fn rollback(&self) -> Result<()>;

    /// Whether the transaction is still open.
    fn is_active(&self) -> bool;
}

// =============================================================================
// Shared pipeline
// =============================================================================

fn prepare<C: Contract, S: Session>(session: &S, args: &dyn Arguments) -> Result<PreparedCall> {
    let scope = session.scope();
    scope.cancel.check()?;

    let descriptor = session.engine().contract::<C>()?;
    let context = CallContext::build(
        descriptor.target(),
        ContextScope {
            connection_name: scope.connection_name(),
            context_data: scope.context_data(),
            transaction_id: session.transaction_id(),
        },
    );
    let parameters = binder::bind(&descriptor, args, &context, &scope.cancel)?;

    Ok(PreparedCall {
        contract: TypeId::of::<C>(),
        descriptor,
        context,
        parameters,
    })
}

fn complete<S, R, F>(session: &S, prepared: &PreparedCall, finish: F) -> Result<R>
where
    S: Session,
    F: FnOnce(Execution) -> Result<(R, usize)>,
{
    let notifier = session.engine().notifier();
    let command = prepared.context.target().qualified_name();
    let started = Instant::now();
    notifier.call_started(&CallStarted {
        context: &prepared.context,
        command: &command,
        parameters: &prepared.parameters,
        started_at: Utc::now(),
    });

    let mut return_value = None;
    let outcome = session.execute(prepared).and_then(|execution| {
        return_value = Some(execution.return_value);
        finish(execution)
    });

    let (rows, error) = match &outcome {
        Ok((_, rows)) => (*rows, None),
        Err(e) => (0, Some(e)),
    };
    notifier.call_completed(&CallCompleted {
        context: &prepared.context,
        command: &command,
        return_value,
        rows,
        elapsed: started.elapsed(),
        error,
    });

    outcome.map(|(value, _)| value)
}

/// Bind `call`'s parameters on `connection` and execute it.
pub(crate) fn execute_on(
    connection: &mut dyn Connection,
    call: &PreparedCall,
    cancel: &CancellationToken,
) -> Result<Execution> {
    let mut command = connection.create_call(call.context.target())?;
    for parameter in &call.parameters {
        command.set_parameter(parameter)?;
    }
    cancel.check()?;
    command.execute()
}

// =============================================================================
// DbSession
// =============================================================================

/// Session backed by a driver. Each call opens (or takes from the driver's
/// pool) its own connection.
#[derive(Clone)]
pub struct DbSession {
    engine: Arc<Engine>,
    driver: Arc<dyn Driver>,
    scope: SessionScope,
}

impl DbSession {
    /// Create a session on the default connection.
    pub fn new(engine: Arc<Engine>, driver: Arc<dyn Driver>) -> Self {
        Self {
            engine,
            driver,
            scope: SessionScope::new(),
        }
    }
}

impl fmt::Debug for DbSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSession")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl Session for DbSession {
    fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn scope(&self) -> &SessionScope {
        &self.scope
    }

    fn rescoped(&self, scope: SessionScope) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            driver: Arc::clone(&self.driver),
            scope,
        }
    }

    fn execute(&self, call: &PreparedCall) -> Result<Execution> {
        self.scope.cancel.check()?;
        let mut connection = self.driver.open_connection(self.scope.connection_name())?;
        self.scope.cancel.check()?;
        execute_on(connection.as_mut(), call, &self.scope.cancel)
    }
}

impl Transactional for DbSession {
    type Transaction = DbTransaction;

    fn begin_transaction(&self) -> Result<DbTransaction> {
        self.scope.cancel.check()?;
        let mut connection = self.driver.open_connection(self.scope.connection_name())?;
        connection.begin_transaction()?;
        let state = TransactionState::new(Some(connection));
        debug!(
            target: "conduit::txn",
            transaction = %state.id(),
            connection = ?self.scope.connection_name(),
            "transaction started"
        );
        Ok(DbTransaction::new(Arc::clone(&self.engine), self.scope.clone(), state))
    }
}
