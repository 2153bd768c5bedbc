// src/parser.rs

//! Parses source files with tree-sitter and converts the result into [`Node`]
//! trees with language-independent roles.

use crate::query::MAX_DEPTH;
use crate::uast::{Node, Position, Role};
use std::path::Path;
use tracing::debug;
use tree_sitter::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Go,
    Python,
    Rust,
}

impl Language {
    pub fn from_path(path: &str) -> Option<Self> {
        match Path::new(path).extension()?.to_str()? {
            "go" => Some(Self::Go),
            "py" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    fn is_function(self, kind: &str) -> bool {
        match self {
            Self::Go => matches!(kind, "function_declaration" | "method_declaration"),
            Self::Python => kind == "function_definition",
            Self::Rust => kind == "function_item",
        }
    }
}

/// Parses `source`; `None` when tree-sitter gives up.
pub fn parse(language: Language, source: &str) -> Option<Node> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&language.grammar()) {
        debug!("Failed to set {:?} language: {}", language, e);
        return None;
    }
    let tree = parser.parse(source, None)?;
    Some(convert(tree.root_node(), source.as_bytes(), language, Vec::new(), 0))
}

fn convert(
    node: tree_sitter::Node<'_>,
    source: &[u8],
    language: Language,
    mut roles: Vec<Role>,
    depth: usize,
) -> Node {
    let kind = node.kind();
    let is_function = language.is_function(kind);
    if is_function {
        roles = vec![Role::Function, Role::Declaration];
    } else if roles.is_empty() && kind.contains("identifier") {
        roles = vec![Role::Identifier];
    }

    let start = node.start_position();
    let end = node.end_position();
    let mut result = Node::new(kind).with_roles(&roles);
    result.start_position = Some(Position::new(start.row + 1));
    result.end_position = Some(Position::new(end.row + 1));
    if node.named_child_count() == 0 {
        result.token = node.utf8_text(source).unwrap_or_default().to_string();
    }
    if depth + 1 >= MAX_DEPTH {
        return result;
    }

    let name_id = if is_function { node.child_by_field_name("name").map(|n| n.id()) } else { None };
    let mut cursor = node.walk();
    result.children = node
        .named_children(&mut cursor)
        .map(|child| {
            let child_roles = if Some(child.id()) == name_id {
                vec![Role::Function, Role::Identifier, Role::Name]
            } else {
                Vec::new()
            };
            convert(child, source, language, child_roles, depth + 1)
        })
        .collect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShotnessConfig;

    fn names(tree: &Node) -> Vec<String> {
        let (structure, name) = ShotnessConfig::default().compile().unwrap();
        structure
            .filter(tree)
            .unwrap()
            .into_iter()
            .filter_map(|f| name.filter(f).unwrap().first().map(|n| n.token.clone()))
            .collect()
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path("cmd/main.go"), Some(Language::Go));
        assert_eq!(Language::from_path("a/b.py"), Some(Language::Python));
        assert_eq!(Language::from_path("src/lib.rs"), Some(Language::Rust));
        assert_eq!(Language::from_path("README.md"), None);
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn test_parse_go() {
        let source = "package main\n\nfunc foo() int {\n\treturn 1\n}\n\nfunc (s *S) bar() {\n}\n";
        let tree = parse(Language::Go, source).unwrap();
        assert_eq!(names(&tree), vec!["foo", "bar"]);

        let (structure, _) = ShotnessConfig::default().compile().unwrap();
        let functions = structure.filter(&tree).unwrap();
        assert_eq!(functions[0].start_position.unwrap().line, 3);
        assert_eq!(functions[0].end_position.unwrap().line, 5);
    }

    #[test]
    fn test_parse_python() {
        let source = "def foo():\n    def inner():\n        pass\n    return 1\n\nclass C:\n    def method(self):\n        pass\n";
        let tree = parse(Language::Python, source).unwrap();
        assert_eq!(names(&tree), vec!["foo", "inner", "method"]);
    }

    #[test]
    fn test_parse_rust() {
        let source = "fn alpha() {}\n\nimpl S {\n    fn beta(&self) -> u8 { 0 }\n}\n";
        let tree = parse(Language::Rust, source).unwrap();
        assert_eq!(names(&tree), vec!["alpha", "beta"]);
        assert!(tree.children.iter().any(|c| c.internal_type == "impl_item"));
    }
}
