//! In-memory driver for tests.
//!
//! [`MemoryDriver`] implements the driver boundary without a database.
//! Calls are answered by responders registered per target object name and
//! every connection, transaction step and execution is recorded as a
//! [`DriverEvent`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use conduit_core::{
    Call, CallParameter, CallTarget, Connection, Driver, Error, Execution, Result, Row,
};
use parking_lot::Mutex;

type Responder = Arc<dyn Fn(&[CallParameter]) -> Result<Execution> + Send + Sync>;

/// Something the driver was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// A connection was opened
    Open {
        /// Connection number, starting at 1
        connection: usize,
        /// Logical connection name
        name: Option<String>,
    },
    /// A transaction began
    Begin {
        /// Connection number
        connection: usize,
    },
    /// A call executed
    Execute {
        /// Connection number
        connection: usize,
        /// Call target
        target: CallTarget,
        /// Parameters in binding order
        parameters: Vec<CallParameter>,
    },
    /// A transaction committed
    Commit {
        /// Connection number
        connection: usize,
    },
    /// A transaction rolled back
    Rollback {
        /// Connection number
        connection: usize,
    },
    /// A connection was released
    Close {
        /// Connection number
        connection: usize,
    },
}

#[derive(Default)]
struct State {
    responders: HashMap<String, Responder>,
    events: Vec<DriverEvent>,
    opened: usize,
    refuse_connections: Option<(i32, String)>,
}

/// Driver answering calls from registered responders.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<State>>,
}

impl MemoryDriver {
    /// Driver with no responders. Unanswered calls return status `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls to `target` (object name, prefix included) with `respond`.
    pub fn respond<F>(&self, target: &str, respond: F) -> &Self
    where
        F: Fn(&[CallParameter]) -> Result<Execution> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .responders
            .insert(target.to_ascii_lowercase(), Arc::new(respond));
        self
    }

    /// Answer calls to `target` with `rows`.
    pub fn respond_rows(&self, target: &str, rows: Vec<Row>) -> &Self {
        self.respond(target, move |_| Ok(Execution::rows(rows.clone())))
    }

    /// Answer calls to `target` with a status.
    pub fn respond_status(&self, target: &str, return_value: i64) -> &Self {
        self.respond(target, move |_| Ok(Execution::status(return_value)))
    }

    /// Fail calls to `target` with a backend error.
    pub fn fail(&self, target: &str, code: i32, message: &str) -> &Self {
        let message = message.to_string();
        self.respond(target, move |_| Err(Error::backend(code, message.clone())))
    }

    /// Fail every `open_connection` with a backend error.
    pub fn refuse_connections(&self, code: i32, message: &str) -> &Self {
        self.state.lock().refuse_connections = Some((code, message.to_string()));
        self
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<DriverEvent> {
        self.state.lock().events.clone()
    }

    /// Recorded executions as `(connection, target, parameters)`.
    pub fn executions(&self) -> Vec<(usize, CallTarget, Vec<CallParameter>)> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                DriverEvent::Execute {
                    connection,
                    target,
                    parameters,
                } => Some((*connection, target.clone(), parameters.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of connections opened.
    pub fn connections_opened(&self) -> usize {
        self.state.lock().opened
    }

    fn record(&self, event: DriverEvent) {
        self.state.lock().events.push(event);
    }
}

impl fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryDriver")
            .field("responders", &state.responders.len())
            .field("events", &state.events.len())
            .finish()
    }
}

impl Driver for MemoryDriver {
    fn open_connection(&self, name: Option<&str>) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        if let Some((code, message)) = &state.refuse_connections {
            return Err(Error::backend(*code, message.clone()));
        }
        state.opened += 1;
        let id = state.opened;
        state.events.push(DriverEvent::Open {
            connection: id,
            name: name.map(str::to_string),
        });
        Ok(Box::new(MemoryConnection {
            id,
            driver: self.clone(),
        }))
    }
}

struct MemoryConnection {
    id: usize,
    driver: MemoryDriver,
}

impl Connection for MemoryConnection {
    fn create_call(&mut self, target: &CallTarget) -> Result<Box<dyn Call + '_>> {
        Ok(Box::new(MemoryCall {
            connection: self,
            target: target.clone(),
            parameters: Vec::new(),
        }))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.driver.record(DriverEvent::Begin { connection: self.id });
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.driver.record(DriverEvent::Commit { connection: self.id });
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.driver.record(DriverEvent::Rollback { connection: self.id });
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.driver.record(DriverEvent::Close { connection: self.id });
    }
}

struct MemoryCall<'a> {
    connection: &'a mut MemoryConnection,
    target: CallTarget,
    parameters: Vec<CallParameter>,
}

impl Call for MemoryCall<'_> {
    fn set_parameter(&mut self, parameter: &CallParameter) -> Result<()> {
        self.parameters.push(parameter.clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<Execution> {
        let responder = {
            let mut state = self.connection.driver.state.lock();
            state.events.push(DriverEvent::Execute {
                connection: self.connection.id,
                target: self.target.clone(),
                parameters: self.parameters.clone(),
            });
            state
                .responders
                .get(&self.target.name.to_ascii_lowercase())
                .cloned()
        };
        match responder {
            Some(respond) => respond(&self.parameters),
            None => Ok(Execution::status(0)),
        }
    }
}
