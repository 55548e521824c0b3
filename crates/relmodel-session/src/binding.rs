//! Parameter binding.
//!
//! Statements carry `@N` placeholders for positional values and `@name`
//! placeholders for named ones. Binding rewrites them into uniquely named
//! driver placeholders:
//!
//! 1. each named key, longest first, becomes a new positional index;
//! 2. positional indices, highest first, become `@_i`, or for a sequence
//!    value the comma-separated list `@_i_0, @_i_1, ...`.
//!
//! Placeholders match as whole tokens, so `@1` never matches inside `@10`
//! and `@person` never inside `@person_extra`. `@@name` system variables
//! are left alone. Any placeholder still unresolved afterwards is an error.

use regex::{Captures, Regex};
use relmodel_core::{Command, Error, Result, Statement, Value};
use std::sync::OnceLock;

fn leftover_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^@\w])@([A-Za-z0-9]\w*)")
            .unwrap_or_else(|e| unreachable!("placeholder pattern is valid: {e}"))
    })
}

fn token_regex(token: &str) -> Result<Regex> {
    Regex::new(&format!(r"(^|[^@\w])@{}\b", regex::escape(token)))
        .map_err(|e| Error::usage(format!("invalid parameter name '{token}': {e}")))
}

/// Rewrite `stmt` into a driver command.
pub fn bind(stmt: Statement) -> Result<Command> {
    let Statement {
        mut sql,
        mut parameters,
        named,
    } = stmt;

    let mut keys: Vec<&String> = named.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    for key in keys {
        let re = token_regex(key)?;
        if !re.is_match(&sql) {
            continue;
        }
        let index = parameters.len();
        sql = re.replace_all(&sql, |caps: &Captures<'_>| format!("{}@{index}", &caps[1])).into_owned();
        parameters.push(named[key].clone());
    }

    let mut command = Command::new(String::new());
    for (index, value) in parameters.into_iter().enumerate().rev() {
        let re = token_regex(&index.to_string())?;
        if !re.is_match(&sql) {
            continue;
        }
        let replacement = match value {
            Value::Array(items) if items.is_empty() => {
                let name = format!("_{index}_0");
                let placeholder = format!("@{name}");
                command.bind(name, Value::Null);
                placeholder
            }
            Value::Array(items) => {
                let mut placeholders = Vec::with_capacity(items.len());
                for (j, item) in items.into_iter().enumerate() {
                    let name = format!("_{index}_{j}");
                    placeholders.push(format!("@{name}"));
                    command.bind(name, item);
                }
                placeholders.join(", ")
            }
            scalar => {
                let name = format!("_{index}");
                command.bind(name.clone(), scalar);
                format!("@{name}")
            }
        };
        sql = re
            .replace_all(&sql, |caps: &Captures<'_>| format!("{}{replacement}", &caps[1]))
            .into_owned();
    }

    if let Some(caps) = leftover_regex().captures(&sql) {
        return Err(Error::MissingParameter(format!("@{}", &caps[1])));
    }

    tracing::trace!(bindings = command.parameters.len(), "Bound statement");
    command.text = sql;
    Ok(command)
}
