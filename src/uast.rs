// src/uast.rs

use crate::error::QueryError;
use std::fmt;
use std::str::FromStr;

/// Language-independent syntactic role of a node. The discriminant is the
/// stable number written to the reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum Role {
    Identifier = 1,
    Qualified = 2,
    Operator = 3,
    Expression = 4,
    Statement = 5,
    Declaration = 6,
    Function = 7,
    Name = 8,
    Type = 9,
    Body = 10,
    Block = 11,
    Call = 12,
    Argument = 13,
    Parameter = 14,
    Receiver = 15,
    Return = 16,
    Import = 17,
    Module = 18,
    Comment = 19,
    Literal = 20,
    File = 21,
}

const ROLE_NAMES: &[(&str, Role)] = &[
    ("Identifier", Role::Identifier),
    ("Qualified", Role::Qualified),
    ("Operator", Role::Operator),
    ("Expression", Role::Expression),
    ("Statement", Role::Statement),
    ("Declaration", Role::Declaration),
    ("Function", Role::Function),
    ("Name", Role::Name),
    ("Type", Role::Type),
    ("Body", Role::Body),
    ("Block", Role::Block),
    ("Call", Role::Call),
    ("Argument", Role::Argument),
    ("Parameter", Role::Parameter),
    ("Receiver", Role::Receiver),
    ("Return", Role::Return),
    ("Import", Role::Import),
    ("Module", Role::Module),
    ("Comment", Role::Comment),
    ("Literal", Role::Literal),
    ("File", Role::File),
];

impl Role {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        ROLE_NAMES.iter().map(|(_, role)| *role).find(|role| role.code() == code)
    }

    pub fn name(self) -> &'static str {
        ROLE_NAMES
            .iter()
            .find(|(_, role)| *role == self)
            .map_or("Unknown", |(name, _)| name)
    }
}

impl FromStr for Role {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ROLE_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, role)| *role)
            .ok_or_else(|| QueryError::UnknownRole(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 1-based line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
}

impl Position {
    pub fn new(line: usize) -> Self {
        Self { line }
    }
}

/// A typed syntax tree node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Parser-specific node kind, e.g. `function_declaration`
    pub internal_type: String,
    pub roles: Vec<Role>,
    pub token: String,
    pub children: Vec<Node>,
    pub start_position: Option<Position>,
    pub end_position: Option<Position>,
}

impl Node {
    pub fn new(internal_type: impl Into<String>) -> Self {
        Self { internal_type: internal_type.into(), ..Self::default() }
    }

    pub fn with_roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    #[cfg(test)]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    #[cfg(test)]
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    #[cfg(test)]
    pub fn with_lines(mut self, start: usize, end: usize) -> Self {
        self.start_position = Some(Position::new(start));
        self.end_position = Some(Position::new(end));
        self
    }

    pub fn has_roles(&self, roles: &[Role]) -> bool {
        roles.iter().all(|role| self.roles.contains(role))
    }

    /// Calls `visit` for this node and every descendant, parents first.
    pub fn visit_each<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        for child in &self.children {
            child.visit_each(visit);
        }
    }
}
