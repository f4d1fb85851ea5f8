//! Jac Tools
//!
//! Helpers shared by the command line tools: logging setup and loading
//! parse trees produced by the external Jac parser.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use jac_ir::SyntaxNode;
use jac_runtime::RuntimeConfig;

/// Initialize logging with a default filter.
///
/// Use `RUST_LOG` environment variable to override the default filter.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,jac_tools=debug,jac_runtime=debug,jac_vm=info,jac_ir=info")
    });

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Read a JSON parse tree from disk.
pub fn load_tree(path: &Path) -> Result<SyntaxNode> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    SyntaxNode::from_json(&text).with_context(|| format!("parsing parse tree {}", path.display()))
}

/// Read a YAML runtime config, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    RuntimeConfig::from_yaml(&text).with_context(|| format!("loading config {}", path.display()))
}

/// Every node of `tree` carrying compiled code, in source order.
pub fn compiled_nodes(tree: &SyntaxNode) -> Vec<&SyntaxNode> {
    let mut out = Vec::new();
    collect_compiled(tree, &mut out);
    out
}

fn collect_compiled<'a>(node: &'a SyntaxNode, out: &mut Vec<&'a SyntaxNode>) {
    if node.bytecode.is_some() {
        out.push(node);
        // nested expressions are part of the enclosing code
        return;
    }
    for kid in &node.kid {
        collect_compiled(kid, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jac_ir::build::*;
    use jac_vm::compile_tree;
    use std::io::Write;

    #[test]
    fn test_load_tree_from_file() {
        let tree = program(vec![global_var("x", int(3))]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(tree.to_json().unwrap().as_bytes()).unwrap();
        let loaded = load_tree(file.path()).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn test_load_tree_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = load_tree(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing parse tree"));
    }

    #[test]
    fn test_load_config_defaults_and_yaml() {
        assert_eq!(load_config(None).unwrap(), RuntimeConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jac.yaml");
        fs::write(&path, "step_limit: 12\n").unwrap();
        assert_eq!(load_config(Some(&path)).unwrap().step_limit, 12);
    }

    #[test]
    fn test_compiled_nodes_are_outermost() {
        let mut tree = program(vec![global_var("x", add(int(1), mul(int(2), int(3))))]);
        compile_tree(&mut tree, false);
        let nodes = compiled_nodes(&tree);
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].source_text().contains('*'));
    }
}
