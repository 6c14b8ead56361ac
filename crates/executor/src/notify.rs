//! Call lifecycle notifications.
//!
//! Every call reports its start and completion, plus advisory events raised
//! while binding outputs or mapping rows. Events go to `tracing` and to any
//! [`CallObserver`] registered on the engine. Observers are invoked
//! synchronously on the calling thread and must not block.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use conduit_core::{CallContext, CallParameter, Error};
use tracing::{debug, warn};

/// Emitted before a call's connection is opened.
#[derive(Debug)]
pub struct CallStarted<'a> {
    /// Context of the call
    pub context: &'a CallContext,
    /// Schema-qualified command text
    pub command: &'a str,
    /// Bound parameters
    pub parameters: &'a [CallParameter],
    /// Wall-clock start time
    pub started_at: DateTime<Utc>,
}

/// Emitted once a call finished, successfully or not.
#[derive(Debug)]
pub struct CallCompleted<'a> {
    /// Context of the call
    pub context: &'a CallContext,
    /// Schema-qualified command text
    pub command: &'a str,
    /// Backend return value, when execution succeeded
    pub return_value: Option<i64>,
    /// Rows mapped into results
    pub rows: usize,
    /// Time from start to completion
    pub elapsed: Duration,
    /// Failure, if the call failed
    pub error: Option<&'a Error>,
}

/// A result column no entity member maps.
#[derive(Debug)]
pub struct UnexpectedColumn<'a> {
    /// Context of the call
    pub context: &'a CallContext,
    /// Entity being populated
    pub entity: &'a str,
    /// Column name as returned
    pub column: &'a str,
    /// Zero-based row index
    pub row: usize,
}

/// A row skipped because it could not be mapped.
#[derive(Debug)]
pub struct RowRejected<'a> {
    /// Context of the call
    pub context: &'a CallContext,
    /// Zero-based row index
    pub row: usize,
    /// Why the row failed
    pub error: &'a Error,
}

/// An output value that could not be written back.
#[derive(Debug)]
pub struct UnresolvedMember<'a> {
    /// Context of the call
    pub context: &'a CallContext,
    /// Contract member
    pub member: &'a str,
    /// What went wrong
    pub reason: &'a str,
}

/// Receives call lifecycle events. Every method defaults to a no-op.
pub trait CallObserver: Send + Sync {
    /// A call is about to execute.
    fn call_started(&self, _event: &CallStarted<'_>) {}

    /// A call finished.
    fn call_completed(&self, _event: &CallCompleted<'_>) {}

    /// A row carried a column with no matching member.
    fn unexpected_column(&self, _event: &UnexpectedColumn<'_>) {}

    /// A row was skipped.
    fn row_rejected(&self, _event: &RowRejected<'_>) {}

    /// An output member could not be resolved or written.
    fn unresolved_member(&self, _event: &UnresolvedMember<'_>) {}
}

/// Fan-out of events to tracing and the registered observers.
#[derive(Clone, Default)]
pub(crate) struct Notifier {
    observers: Vec<Arc<dyn CallObserver>>,
}

impl Notifier {
    pub(crate) fn new(observers: Vec<Arc<dyn CallObserver>>) -> Self {
        Self { observers }
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn call_started(&self, event: &CallStarted<'_>) {
        debug!(
            target: "conduit::call",
            call_id = event.context.call_id(),
            command = event.command,
            parameters = event.parameters.len(),
            transaction = ?event.context.transaction_id(),
            "call started"
        );
        for observer in &self.observers {
            observer.call_started(event);
        }
    }

    pub(crate) fn call_completed(&self, event: &CallCompleted<'_>) {
        match event.error {
            None => debug!(
                target: "conduit::call",
                call_id = event.context.call_id(),
                command = event.command,
                return_value = ?event.return_value,
                rows = event.rows,
                elapsed_us = event.elapsed.as_micros() as u64,
                "call completed"
            ),
            Some(error) => debug!(
                target: "conduit::call",
                call_id = event.context.call_id(),
                command = event.command,
                elapsed_us = event.elapsed.as_micros() as u64,
                error = %error,
                "call failed"
            ),
        }
        for observer in &self.observers {
            observer.call_completed(event);
        }
    }

    pub(crate) fn unexpected_column(&self, event: &UnexpectedColumn<'_>) {
        warn!(
            target: "conduit::map",
            call_id = event.context.call_id(),
            entity = event.entity,
            column = event.column,
            row = event.row,
            "column has no matching member"
        );
        for observer in &self.observers {
            observer.unexpected_column(event);
        }
    }

    pub(crate) fn row_rejected(&self, event: &RowRejected<'_>) {
        warn!(
            target: "conduit::map",
            call_id = event.context.call_id(),
            row = event.row,
            error = %event.error,
            "row skipped"
        );
        for observer in &self.observers {
            observer.row_rejected(event);
        }
    }

    pub(crate) fn unresolved_member(&self, event: &UnresolvedMember<'_>) {
        warn!(
            target: "conduit::call",
            call_id = event.context.call_id(),
            member = event.member,
            reason = event.reason,
            "output member unresolved"
        );
        for observer in &self.observers {
            observer.unresolved_member(event);
        }
    }
}
