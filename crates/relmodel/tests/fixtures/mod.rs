//! Scripted in-memory connection shared by the integration tests.

#![allow(dead_code)]

use relmodel::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// What a [`MockConnection`] saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Query(Command),
    Execute(Command),
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
pub struct Script {
    pub events: Vec<Event>,
    queries: VecDeque<Result<Vec<Row>>>,
    executes: VecDeque<Result<u64>>,
    commit_error: Option<Error>,
    pub opened: usize,
}

/// Handle on the script shared by every connection a factory opens.
#[derive(Debug, Clone, Default)]
pub struct Mock {
    dialect: Dialect,
    script: Arc<Mutex<Script>>,
}

impl Mock {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            script: Arc::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the result of the next query.
    pub fn rows(&self, rows: Vec<Row>) -> &Self {
        self.lock().queries.push_back(Ok(rows));
        self
    }

    pub fn query_error(&self, message: &str) -> &Self {
        let err = Error::transport(self.dialect, message);
        self.lock().queries.push_back(Err(err));
        self
    }

    /// Queue the result of the next execute; unscripted executes affect one row.
    pub fn affected(&self, n: u64) -> &Self {
        self.lock().executes.push_back(Ok(n));
        self
    }

    pub fn execute_error(&self, message: &str) -> &Self {
        let err = Error::transport(self.dialect, message);
        self.lock().executes.push_back(Err(err));
        self
    }

    /// Make the next commit fail.
    pub fn commit_error(&self, message: &str) -> &Self {
        let err = Error::transport(self.dialect, message);
        self.lock().commit_error = Some(err);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Query(c) | Event::Execute(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.lock().opened
    }

    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        let mock = self.clone();
        Arc::new(move || -> Result<Box<dyn Connection>> {
            mock.lock().opened += 1;
            Ok(Box::new(MockConnection { mock: mock.clone() }))
        })
    }
}

pub struct MockConnection {
    mock: Mock,
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.mock.dialect
    }

    fn query(&mut self, command: &Command) -> Result<Vec<Row>> {
        let mut script = self.mock.lock();
        script.events.push(Event::Query(command.clone()));
        script.queries.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn execute(&mut self, command: &Command) -> Result<u64> {
        let mut script = self.mock.lock();
        script.events.push(Event::Execute(command.clone()));
        script.executes.pop_front().unwrap_or(Ok(1))
    }

    fn begin(&mut self) -> Result<()> {
        self.mock.lock().events.push(Event::Begin);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut script = self.mock.lock();
        match script.commit_error.take() {
            Some(err) => Err(err),
            None => {
                script.events.push(Event::Commit);
                Ok(())
            }
        }
    }

    fn rollback(&mut self) -> Result<()> {
        self.mock.lock().events.push(Event::Rollback);
        Ok(())
    }
}

/// Schema of a small school database.
pub fn school_schema() -> Vec<TableSchema> {
    vec![
        TableSchema::new("city")
            .column(Column::new("id", "int").primary_key())
            .column(Column::new("name", "varchar").max_length(80)),
        TableSchema::new("person")
            .column(Column::new("id", "int").primary_key())
            .column(Column::new("email", "varchar").max_length(120))
            .column(Column::new("name", "varchar").nullable())
            .column(Column::new("city", "int").nullable().references("city", "id"))
            .column(Column::new("code", "int").nullable().with_default("max"))
            .unique("uq_person_email", &["email"]),
        TableSchema::new("student")
            .column(Column::new("id", "int").primary_key().with_default("next"))
            .column(Column::new("person", "int").references("person", "id"))
            .column(Column::new("tutor", "int").nullable().references("person", "id")),
    ]
}

pub fn school_model(config: &Config) -> Arc<Model> {
    Arc::new(
        ModelBuilder::new(config.clone())
            .build_from_schema(school_schema())
            .unwrap(),
    )
}

/// A container over the school model talking to `mock`.
pub fn school_db(mock: &Mock, config: Config) -> Db {
    Db::new(school_model(&config), config, mock.factory())
}
