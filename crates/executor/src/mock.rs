//! Scripted test double for [`Session`].
//!
//! [`MockSession`] runs the real pipeline (descriptor resolution, call
//! context construction, binding, result mapping) and only replaces
//! execution: each contract answers with a registered [`MockResponse`].
//! Every execution is recorded as a [`MockInvocation`] so tests can assert
//! on the parameters and context a call was issued with.
//!
//! ```text
//! let mock = MockSession::new(engine);
//! mock.on::<ListPeople>(MockResponse::rows(vec![row]));
//!
//! let people: Vec<Person> = mock.get_all::<ListPeople, Person>(&())?;
//! assert_eq!(mock.invocations_of::<ListPeople>().len(), 1);
//! ```
//!
//! Contracts with no registered response return status `0` and no rows.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use conduit_core::{CallContext, CallParameter, Contract, Error, Execution, Result, Row, Value};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::engine::Engine;
use crate::session::{PreparedCall, Session, SessionScope, TransactionSession, Transactional};
use crate::transaction::{Outcome, TransactionState};

type Responder = Arc<dyn Fn(&MockInvocation) -> Result<Execution> + Send + Sync>;

#[derive(Clone)]
enum Response {
    Fixed {
        return_value: i64,
        outputs: HashMap<String, Value>,
        rows: Vec<Row>,
    },
    Backend {
        code: i32,
        message: String,
    },
    Dynamic(Responder),
}

/// Scripted answer for one contract.
#[derive(Clone)]
pub struct MockResponse {
    response: Response,
}

impl MockResponse {
    /// Return `return_value` with no rows.
    pub fn status(return_value: i64) -> Self {
        Self {
            response: Response::Fixed {
                return_value,
                outputs: HashMap::new(),
                rows: Vec::new(),
            },
        }
    }

    /// Return `rows` with status `0`.
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            response: Response::Fixed {
                return_value: 0,
                outputs: HashMap::new(),
                rows,
            },
        }
    }

    /// Fail with a backend error.
    pub fn backend_error(code: i32, message: impl Into<String>) -> Self {
        Self {
            response: Response::Backend {
                code,
                message: message.into(),
            },
        }
    }

    /// Compute the answer from the invocation.
    pub fn with<F>(respond: F) -> Self
    where
        F: Fn(&MockInvocation) -> Result<Execution> + Send + Sync + 'static,
    {
        Self {
            response: Response::Dynamic(Arc::new(respond)),
        }
    }

    /// Add an output parameter value. Ignored for error and computed
    /// responses.
    pub fn output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Response::Fixed { outputs, .. } = &mut self.response {
            outputs.insert(name.into(), value.into());
        }
        self
    }

    /// Override the return value. Ignored for error and computed responses.
    pub fn returning(mut self, value: i64) -> Self {
        if let Response::Fixed { return_value, .. } = &mut self.response {
            *return_value = value;
        }
        self
    }

    fn answer(&self, invocation: &MockInvocation) -> Result<Execution> {
        match &self.response {
            Response::Fixed {
                return_value,
                outputs,
                rows,
            } => Ok(Execution {
                return_value: *return_value,
                outputs: outputs.clone(),
                rows: Box::new(rows.clone().into_iter()),
            }),
            Response::Backend { code, message } => Err(Error::backend(*code, message.clone())),
            Response::Dynamic(respond) => respond(invocation),
        }
    }
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.response {
            Response::Fixed {
                return_value, rows, ..
            } => f
                .debug_struct("MockResponse")
                .field("return_value", return_value)
                .field("rows", &rows.len())
                .finish(),
            Response::Backend { code, .. } => {
                f.debug_struct("MockResponse").field("backend_error", code).finish()
            }
            Response::Dynamic(_) => f.write_str("MockResponse(dynamic)"),
        }
    }
}

/// One recorded execution.
#[derive(Debug, Clone)]
pub struct MockInvocation {
    contract: TypeId,
    /// Contract name
    pub contract_name: String,
    /// Context the call was built with
    pub context: CallContext,
    /// Bound parameters
    pub parameters: Vec<CallParameter>,
}

impl MockInvocation {
    /// Bound value of parameter `name`, matched case-insensitively.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }

    /// Whether this invocation was of contract `C`.
    pub fn is<C: Contract>(&self) -> bool {
        self.contract == TypeId::of::<C>()
    }
}

/// How a mock transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockTransactionEnd {
    /// Committed
    Committed,
    /// Rolled back explicitly
    RolledBack,
}

#[derive(Default)]
struct Script {
    responses: RwLock<FxHashMap<TypeId, MockResponse>>,
    invocations: Mutex<Vec<MockInvocation>>,
    transactions: Mutex<Vec<(Uuid, MockTransactionEnd)>>,
}

impl Script {
    fn run(&self, call: &PreparedCall) -> Result<Execution> {
        let invocation = MockInvocation {
            contract: call.contract_type(),
            contract_name: call.descriptor().name().to_string(),
            context: call.context().clone(),
            parameters: call.parameters().to_vec(),
        };
        let response = self.responses.read().get(&call.contract_type()).cloned();
        self.invocations.lock().push(invocation.clone());
        match response {
            Some(response) => response.answer(&invocation),
            None => Ok(Execution::status(0)),
        }
    }
}

// =============================================================================
// MockSession
// =============================================================================

/// Session whose calls are answered from a script.
#[derive(Clone)]
pub struct MockSession {
    engine: Arc<Engine>,
    scope: SessionScope,
    script: Arc<Script>,
}

impl MockSession {
    /// Create a mock sharing `engine`'s configuration and descriptors.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            scope: SessionScope::new(),
            script: Arc::new(Script::default()),
        }
    }

    /// Answer calls of contract `C` with `response`, replacing any
    /// previous response.
    pub fn on<C: Contract>(&self, response: MockResponse) -> &Self {
        self.script.responses.write().insert(TypeId::of::<C>(), response);
        self
    }

    /// Every recorded invocation, in order.
    pub fn invocations(&self) -> Vec<MockInvocation> {
        self.script.invocations.lock().clone()
    }

    /// Recorded invocations of contract `C`.
    pub fn invocations_of<C: Contract>(&self) -> Vec<MockInvocation> {
        self.script
            .invocations
            .lock()
            .iter()
            .filter(|i| i.is::<C>())
            .cloned()
            .collect()
    }

    /// Explicitly finished transactions, in order.
    pub fn transactions(&self) -> Vec<(Uuid, MockTransactionEnd)> {
        self.script.transactions.lock().clone()
    }

    /// Forget recorded invocations and transactions. Responses are kept.
    pub fn clear(&self) {
        self.script.invocations.lock().clear();
        self.script.transactions.lock().clear();
    }
}

impl fmt::Debug for MockSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSession")
            .field("scope", &self.scope)
            .field("responses", &self.script.responses.read().len())
            .field("invocations", &self.script.invocations.lock().len())
            .finish()
    }
}

impl Session for MockSession {
    fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn scope(&self) -> &SessionScope {
        &self.scope
    }

    fn rescoped(&self, scope: SessionScope) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            scope,
            script: Arc::clone(&self.script),
        }
    }

    fn execute(&self, call: &PreparedCall) -> Result<Execution> {
        self.scope.cancellation().check()?;
        self.script.run(call)
    }
}

impl Transactional for MockSession {
    type Transaction = MockTransaction;

    fn begin_transaction(&self) -> Result<MockTransaction> {
        self.scope.cancellation().check()?;
        Ok(MockTransaction {
            engine: Arc::clone(&self.engine),
            scope: self.scope.clone(),
            script: Arc::clone(&self.script),
            state: TransactionState::new(None),
        })
    }
}

// =============================================================================
// MockTransaction
// =============================================================================

/// Transaction on a [`MockSession`]. Follows the same lifecycle as a real
/// transaction.
#[derive(Clone)]
pub struct MockTransaction {
    engine: Arc<Engine>,
    scope: SessionScope,
    script: Arc<Script>,
    state: Arc<TransactionState>,
}

impl MockTransaction {
    fn finish(&self, outcome: Outcome) -> Result<()> {
        self.state.finish(outcome)?;
        let end = match outcome {
            Outcome::Commit => MockTransactionEnd::Committed,
            Outcome::Rollback => MockTransactionEnd::RolledBack,
        };
        self.script.transactions.lock().push((self.state.id(), end));
        Ok(())
    }
}

impl fmt::Debug for MockTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session for MockTransaction {
    fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn scope(&self) -> &SessionScope {
        &self.scope
    }

    fn rescoped(&self, scope: SessionScope) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            scope,
            script: Arc::clone(&self.script),
            state: Arc::clone(&self.state),
        }
    }

    // Responders run outside the transaction lock so they may call back
    // into the transaction, commit it or roll it back.
    fn execute(&self, call: &PreparedCall) -> Result<Execution> {
        self.state.ensure_active()?;
        self.scope.cancellation().check()?;
        self.script.run(call)
    }

    fn transaction_id(&self) -> Option<Uuid> {
        Some(self.state.id())
    }
}

impl TransactionSession for MockTransaction {
    fn id(&self) -> Uuid {
        self.state.id()
    }

    fn commit(&self) -> Result<()> {
        self.finish(Outcome::Commit)
    }

    fn rollback(&self) -> Result<()> {
        self.finish(Outcome::Rollback)
    }

    fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
