//! The generic execution contract.
//!
//! Drivers implement [`Connection`]; the engine never opens sockets itself.
//! Calls are blocking. A connection owns at most one open transaction.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Fully bound command text plus `(name, value)` bindings.
///
/// Names are stored without the `@` prefix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub text: String,
    pub parameters: Vec<(String, Value)>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// Bind a parameter.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.push((name.into(), value));
    }

    /// Look up a binding by name.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// A database connection.
///
/// Implementations must roll back an open transaction when dropped.
pub trait Connection: Send {
    /// Dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Run a command returning rows.
    fn query(&mut self, command: &Command) -> Result<Vec<Row>>;

    /// Run a command, returning the affected row count.
    fn execute(&mut self, command: &Command) -> Result<u64>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

/// Opens connections on demand.
pub trait ConnectionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn Connection>>;
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> Result<Box<dyn Connection>> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn Connection>> {
        self()
    }
}
