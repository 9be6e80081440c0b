//! Typed row filter produced by the data scope engine
//!
//! The persistence layer renders a [`Predicate`] with [`Predicate::to_sql`],
//! which never interpolates values. [`Predicate::render`] inlines quoted
//! literals and is meant for logs and assertions.

use std::fmt;

use serde::Serialize;

/// `alias.name`, or bare `name` when the alias is empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub alias: String,
    pub name: &'static str,
}

impl Column {
    pub fn new(alias: &str, name: &'static str) -> Self {
        Self {
            alias: alias.to_string(),
            name,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alias.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.alias, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    fn literal(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Text(v) => format!("'{}'", v.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Predicate {
    /// No restriction
    True,
    /// Matches nothing
    False,
    Eq {
        column: Column,
        value: Value,
    },
    /// Departments bound to any of the roles through `sys_role_dept`
    CustomDepts {
        column: Column,
        role_ids: Vec<i64>,
    },
    /// A department and every department whose ancestor chain contains it
    DeptSubtree {
        column: Column,
        dept_id: i64,
    },
    Or(Vec<Predicate>),
    And(Vec<Predicate>),
}

/// Parameterized SQL with its bind values in placeholder order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlFragment {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl Predicate {
    /// `column = 0`, which matches no department
    pub fn deny_all(dept_alias: &str) -> Self {
        Predicate::Eq {
            column: Column::new(dept_alias, "dept_id"),
            value: Value::Int(0),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Predicate::True)
    }

    /// OR of the parts, flattening nested ORs. A single part is returned
    /// as-is and any `True` part makes the whole disjunction `True`. No
    /// parts at all is `False`.
    pub fn any(parts: Vec<Predicate>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Predicate::True => return Predicate::True,
                Predicate::False => {}
                Predicate::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::False,
            1 => flat.remove(0),
            _ => Predicate::Or(flat),
        }
    }

    /// AND of the parts, dropping `True` parts; any `False` part wins
    pub fn all(parts: Vec<Predicate>) -> Self {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Predicate::True => {}
                Predicate::False => return Predicate::False,
                Predicate::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Predicate::True,
            1 => flat.remove(0),
            _ => Predicate::And(flat),
        }
    }

    /// Restrict an existing filter by this scope
    pub fn and(self, other: Predicate) -> Self {
        Predicate::all(vec![self, other])
    }

    /// Inline rendering; `True` renders as the empty string
    pub fn render(&self) -> String {
        match self {
            Predicate::True => String::new(),
            Predicate::False => "1 = 0".to_string(),
            Predicate::Eq { column, value } => format!("{} = {}", column, value.literal()),
            Predicate::CustomDepts { column, role_ids } => {
                let list: Vec<String> = role_ids.iter().map(i64::to_string).collect();
                format!(
                    "{} IN (SELECT dept_id FROM sys_role_dept WHERE role_id IN ({}))",
                    column,
                    list.join(", ")
                )
            }
            Predicate::DeptSubtree { column, dept_id } => format!(
                "{} IN (SELECT dept_id FROM sys_dept WHERE dept_id = {id} \
                 OR {id} = ANY(string_to_array(ancestors, ',')::bigint[]))",
                column,
                id = dept_id
            ),
            Predicate::Or(parts) => Self::join(parts, " OR ", |p| p.render()),
            Predicate::And(parts) => Self::join(parts, " AND ", |p| p.render()),
        }
    }

    /// Postgres rendering with `$n` placeholders starting at `first`
    pub fn to_sql(&self, first: usize) -> SqlFragment {
        let mut binds = Vec::new();
        let sql = self.write_sql(first, &mut binds);
        SqlFragment { sql, binds }
    }

    fn write_sql(&self, first: usize, binds: &mut Vec<Value>) -> String {
        let placeholder = |value: Value, binds: &mut Vec<Value>| {
            binds.push(value);
            format!("${}", first + binds.len() - 1)
        };

        match self {
            Predicate::True => String::new(),
            Predicate::False => "1 = 0".to_string(),
            Predicate::Eq { column, value } => {
                format!("{} = {}", column, placeholder(value.clone(), binds))
            }
            Predicate::CustomDepts { column, role_ids } => {
                let list: Vec<String> = role_ids
                    .iter()
                    .map(|id| placeholder(Value::Int(*id), binds))
                    .collect();
                format!(
                    "{} IN (SELECT dept_id FROM sys_role_dept WHERE role_id IN ({}))",
                    column,
                    list.join(", ")
                )
            }
            Predicate::DeptSubtree { column, dept_id } => {
                let p = placeholder(Value::Int(*dept_id), binds);
                format!(
                    "{} IN (SELECT dept_id FROM sys_dept WHERE dept_id = {p} \
                     OR {p} = ANY(string_to_array(ancestors, ',')::bigint[]))",
                    column,
                    p = p
                )
            }
            Predicate::Or(parts) => {
                Self::join(parts, " OR ", |part| part.write_sql(first, binds))
            }
            Predicate::And(parts) => {
                Self::join(parts, " AND ", |part| part.write_sql(first, binds))
            }
        }
    }

    /// Join children, parenthesizing compound ones
    fn join<F>(parts: &[Predicate], separator: &str, mut render: F) -> String
    where
        F: FnMut(&Predicate) -> String,
    {
        parts
            .iter()
            .filter(|part| !part.is_unrestricted())
            .map(|part| {
                let text = render(part);
                if matches!(part, Predicate::Or(_) | Predicate::And(_)) {
                    format!("({})", text)
                } else {
                    text
                }
            })
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
