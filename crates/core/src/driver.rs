//! Driver boundary.
//!
//! The concrete network driver is an external collaborator. Conduit only
//! needs the primitives below: open a connection by logical name, create a
//! call against a resolved target, bind parameters, execute, and stream
//! rows back. Connection pooling is the driver's business.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::CallTarget;
use crate::error::Result;
use crate::value::Value;

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Input only
    #[default]
    In,
    /// Output only; bound as a placeholder
    Out,
    /// Input and output
    InOut,
}

impl Direction {
    /// Whether the caller supplies a value.
    pub fn is_input(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    /// Whether the backend hands a value back.
    pub fn is_output(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// One bound call parameter. Built per invocation and never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct CallParameter {
    /// Parameter name (the member's source name)
    pub name: String,
    /// Bound value (`Null` for output placeholders)
    pub value: Value,
    /// Direction
    pub direction: Direction,
    /// Whether a transform produced the value
    pub is_transformed: bool,
}

/// One result row.
#[derive(Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. Missing trailing values read as absent.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Create a row from `(column, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Column names in backend order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of a column, matched case-insensitively.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Value of a column, matched case-insensitively.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).and_then(|i| self.values.get(i))
    }

    /// Value at a column index.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.columns.iter().zip(self.values.iter()))
            .finish()
    }
}

/// Stream of rows produced by one execution.
pub trait RowStream: Send {
    /// Fetch the next row, `None` at end of stream.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

impl RowStream for std::vec::IntoIter<Row> {
    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.next())
    }
}

/// Outcome of executing a call.
pub struct Execution {
    /// Backend integer return value
    pub return_value: i64,
    /// Output parameter values by parameter name
    pub outputs: HashMap<String, Value>,
    /// Result rows
    pub rows: Box<dyn RowStream>,
}

impl Execution {
    /// An execution returning only a status.
    pub fn status(return_value: i64) -> Self {
        Self {
            return_value,
            outputs: HashMap::new(),
            rows: Box::new(Vec::new().into_iter()),
        }
    }

    /// An execution returning rows.
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            return_value: 0,
            outputs: HashMap::new(),
            rows: Box::new(rows.into_iter()),
        }
    }

    /// Output parameter value, matched case-insensitively.
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name).or_else(|| {
            self.outputs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("return_value", &self.return_value)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// A prepared call on a connection.
pub trait Call {
    /// Bind one parameter.
    fn set_parameter(&mut self, parameter: &CallParameter) -> Result<()>;

    /// Execute the call. Backend failures surface as [`Error::Backend`](crate::Error::Backend).
    fn execute(&mut self) -> Result<Execution>;
}

/// A live connection.
pub trait Connection: Send {
    /// Create a call against a resolved target.
    fn create_call(&mut self, target: &CallTarget) -> Result<Box<dyn Call + '_>>;

    /// Begin a transaction pinned to this connection.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<()>;
}

/// Connection factory, keyed by logical connection name.
pub trait Driver: Send + Sync {
    /// Open (or take from the driver's pool) a connection.
    fn open_connection(&self, name: Option<&str>) -> Result<Box<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::from_pairs([("PersonId", Value::Int(1)), ("Name", Value::from("Ada"))]);
        assert_eq!(row.get("personid"), Some(&Value::Int(1)));
        assert_eq!(row.get("NAME"), Some(&Value::from("Ada")));
        assert_eq!(row.get("Missing"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_row_exact_match_wins() {
        let row = Row::from_pairs([("name", Value::Int(1)), ("Name", Value::Int(2))]);
        assert_eq!(row.get("Name"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_direction_flags() {
        assert!(Direction::In.is_input() && !Direction::In.is_output());
        assert!(!Direction::Out.is_input() && Direction::Out.is_output());
        assert!(Direction::InOut.is_input() && Direction::InOut.is_output());
    }

    #[test]
    fn test_vec_row_stream() {
        let mut stream: Box<dyn RowStream> = Box::new(
            vec![
                Row::from_pairs([("A", Value::Int(1))]),
                Row::from_pairs([("A", Value::Int(2))]),
            ]
            .into_iter(),
        );
        assert_eq!(
            stream.next_row().unwrap().unwrap().get("A"),
            Some(&Value::Int(1))
        );
        assert!(stream.next_row().unwrap().is_some());
        assert!(stream.next_row().unwrap().is_none());
    }

    #[test]
    fn test_execution_output_lookup() {
        let mut exec = Execution::status(3);
        exec.outputs.insert("NewId".to_string(), Value::Int(9));
        assert_eq!(exec.output("newid"), Some(&Value::Int(9)));
        assert_eq!(exec.return_value, 3);
    }
}
