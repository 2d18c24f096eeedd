//! Python syntax pre-check for exploitation payloads

use std::fmt;
use tracing::warn;
use tree_sitter::{Node, Parser};

/// First syntax problem found in a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSyntaxError {
    /// 1-based
    pub line: usize,
    pub message: String,
    pub text: String,
}

impl fmt::Display for ScriptSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Python SyntaxError: {} at line {}\nCode: {}",
            self.message, self.line, self.text
        )
    }
}

impl std::error::Error for ScriptSyntaxError {}

/// Parse `source` as Python without running it.
///
/// If the grammar cannot be loaded the check is skipped.
pub fn check_python_syntax(source: &str) -> Result<(), ScriptSyntaxError> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(tree_sitter_python::language()) {
        warn!("◆ PYTHON GRAMMAR UNAVAILABLE, SKIPPING SYNTAX CHECK: {}", e);
        return Ok(());
    }

    let Some(tree) = parser.parse(source, None) else {
        return Ok(());
    };
    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }

    let node = first_error(root).unwrap_or(root);
    let row = node.start_position().row;
    let message = if node.is_missing() {
        format!("missing '{}'", node.kind())
    } else {
        "invalid syntax".to_string()
    };

    Err(ScriptSyntaxError {
        line: row + 1,
        message,
        text: source.lines().nth(row).unwrap_or_default().trim().to_string(),
    })
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .find_map(first_error)
}
