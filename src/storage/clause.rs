//! Select Clause
//!
//! Turns `select f1, f2 [from Table] [where a = ? and b > ?]` into a
//! field-extraction plan. Placeholders are positional and are bound to the
//! query arguments in order; a `null` argument only matches missing or
//! `null` fields under `=`.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::LazyLock;

static CLAUSE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*select\s+(?P<fields>.+?)(?:\s+from\s+(?P<table>[A-Za-z_][A-Za-z0-9_]*))?(?:\s+where\s+(?P<filter>.+?))?\s*$",
    )
    .expect("clause regex is valid")
});

static FIELD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("field name regex is valid")
});

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<field>[A-Za-z_][A-Za-z0-9_.]*)\s*(?P<op><=|>=|!=|<>|=|<|>)\s*\?$")
        .expect("condition regex is valid")
});

static AND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("conjunction regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: CompareOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectClause {
    pub fields: Vec<String>,
    pub table: Option<String>,
    pub conditions: Vec<Condition>,
}

impl SelectClause {
    pub fn parse(clause: &str) -> Result<Self> {
        let caps = CLAUSE_SHAPE
            .captures(clause)
            .ok_or_else(|| anyhow::anyhow!("Not a select clause: {}", clause))?;

        let mut fields = Vec::new();
        for raw in caps["fields"].split(',') {
            let name = raw.trim();
            if !FIELD_NAME.is_match(name) {
                return Err(anyhow::anyhow!("Invalid field name '{}' in clause", name));
            }
            fields.push(name.to_string());
        }

        let table = caps.name("table").map(|m| m.as_str().to_string());

        let mut conditions = Vec::new();
        if let Some(filter) = caps.name("filter") {
            for part in AND.split(filter.as_str()) {
                let part = part.trim();
                let cond = CONDITION
                    .captures(part)
                    .ok_or_else(|| anyhow::anyhow!("Unsupported condition '{}'", part))?;
                let op = CompareOp::parse(&cond["op"])
                    .ok_or_else(|| anyhow::anyhow!("Unsupported operator in '{}'", part))?;
                conditions.push(Condition {
                    field: cond["field"].to_string(),
                    op,
                });
            }
        }

        Ok(Self {
            fields,
            table,
            conditions,
        })
    }

    /// Number of positional arguments the clause expects.
    pub fn arity(&self) -> usize {
        self.conditions.len()
    }

    pub fn check_args(&self, args: &[Value]) -> Result<()> {
        if args.len() != self.arity() {
            return Err(anyhow::anyhow!(
                "Clause expects {} argument(s), got {}",
                self.arity(),
                args.len()
            ));
        }
        Ok(())
    }

    /// Whether a row of `table` passes every condition with `args` bound.
    pub fn matches(&self, table: &str, row: &Map<String, Value>, args: &[Value]) -> bool {
        if let Some(expected) = &self.table
            && !expected.eq_ignore_ascii_case(table)
        {
            return false;
        }

        self.conditions.iter().zip(args).all(|(cond, arg)| {
            let actual = lookup(row, &cond.field).unwrap_or(&Value::Null);
            compare(actual, cond.op, arg)
        })
    }

    pub fn project(&self, row: &Map<String, Value>) -> Vec<Value> {
        self.fields
            .iter()
            .map(|field| lookup(row, field).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

fn lookup<'a>(row: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    if expected.is_null() || actual.is_null() {
        let both_null = expected.is_null() && actual.is_null();
        return match op {
            CompareOp::Eq => both_null,
            CompareOp::Ne => !both_null,
            _ => false,
        };
    }

    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match (op, ordering) {
        (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
        (CompareOp::Eq, None) => actual == expected,
        (CompareOp::Ne, Some(o)) => o != Ordering::Equal,
        (CompareOp::Ne, None) => actual != expected,
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        (_, None) => false,
    }
}
