// src/query.rs

//! Role-predicate path queries over [`Node`] trees.
//!
//! ```text
//! query     := path ('|' path)*
//! path      := step+
//! step      := ('/' | '//') '*' predicate?
//! predicate := '[' '@role' Name ('and' '@role' Name)* ']'
//! ```
//!
//! The queried node is the single child of an implicit document, so `/*[..]`
//! tests the node itself and `//*[..]` tests the node and all its descendants.

use crate::error::QueryError;
use crate::uast::{Node, Role};
use std::collections::HashSet;

/// Trees deeper than this are rejected instead of risking the stack.
pub const MAX_DEPTH: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    roles: Vec<Role>,
}

/// A compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    source: String,
    paths: Vec<Vec<Step>>,
}

impl Query {
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        let mut parser = QueryParser { src: source, pos: 0 };
        let mut paths = vec![parser.path()?];
        loop {
            parser.skip_ws();
            if !parser.eat("|") {
                break;
            }
            paths.push(parser.path()?);
        }
        parser.skip_ws();
        if parser.pos != source.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self { source: source.to_string(), paths })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the matching nodes under `root` in document order, each once.
    pub fn filter<'a>(&self, root: &'a Node) -> Result<Vec<&'a Node>, QueryError> {
        let mut order = Vec::new();
        preorder(root, 0, &mut order)?;

        let mut selected: HashSet<*const Node> = HashSet::new();
        for path in &self.paths {
            let mut context: Vec<&'a Node> = Vec::new();
            for (i, step) in path.iter().enumerate() {
                let mut next: Vec<&'a Node> = Vec::new();
                if i == 0 {
                    match step.axis {
                        Axis::Child => next.push(root),
                        Axis::DescendantOrSelf => next.extend(order.iter().copied()),
                    }
                } else {
                    for node in context.iter().copied() {
                        for child in &node.children {
                            match step.axis {
                                Axis::Child => next.push(child),
                                Axis::DescendantOrSelf => child.visit_each(&mut |n| next.push(n)),
                            }
                        }
                    }
                }
                let mut seen = HashSet::new();
                next.retain(|n| n.has_roles(&step.roles) && seen.insert(*n as *const Node));
                context = next;
            }
            selected.extend(context.iter().map(|n| *n as *const Node));
        }

        Ok(order
            .into_iter()
            .filter(|n| selected.contains(&(*n as *const Node)))
            .collect())
    }
}

fn preorder<'a>(node: &'a Node, depth: usize, out: &mut Vec<&'a Node>) -> Result<(), QueryError> {
    if depth >= MAX_DEPTH {
        return Err(QueryError::TooDeep { limit: MAX_DEPTH });
    }
    out.push(node);
    for child in &node.children {
        preorder(child, depth + 1, out)?;
    }
    Ok(())
}

struct QueryParser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> QueryParser<'s> {
    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn error(&self, message: &str) -> QueryError {
        QueryError::Syntax { position: self.pos, message: message.to_string() }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), QueryError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{token}'")))
        }
    }

    fn path(&mut self) -> Result<Vec<Step>, QueryError> {
        let mut steps = Vec::new();
        loop {
            self.skip_ws();
            let axis = if self.eat("//") {
                Axis::DescendantOrSelf
            } else if self.eat("/") {
                Axis::Child
            } else {
                break;
            };
            self.skip_ws();
            self.expect("*")?;
            self.skip_ws();
            let roles = if self.rest().starts_with('[') { self.predicate()? } else { Vec::new() };
            steps.push(Step { axis, roles });
        }
        if steps.is_empty() {
            return Err(self.error("expected '/' or '//'"));
        }
        Ok(steps)
    }

    fn predicate(&mut self) -> Result<Vec<Role>, QueryError> {
        self.expect("[")?;
        let mut roles = Vec::new();
        loop {
            self.skip_ws();
            self.expect("@role")?;
            let name_len = self
                .rest()
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(self.rest().len());
            if name_len == 0 {
                return Err(self.error("expected a role name"));
            }
            let name = &self.rest()[..name_len];
            roles.push(name.parse()?);
            self.pos += name_len;
            self.skip_ws();
            if self.eat("]") {
                return Ok(roles);
            }
            self.expect("and")?;
        }
    }
}
