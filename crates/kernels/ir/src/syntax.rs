//! The parse tree handed to the runtime by the external parser.
//!
//! Every node carries its grammar rule (or token) name, a source location and
//! its children in source order. Terminals carry the literal token text.
//! The bytecode compiler decorates nodes with their compiled code in place.

use serde::{Deserialize, Serialize};

use jac_foundation::SourceLoc;

/// One node of the parse tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntaxNode {
    /// Grammar rule name (`expression`, `atom`, ...) or token name (`NAME`, `INT`, ...).
    pub name: String,
    #[serde(default)]
    pub loc: SourceLoc,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kid: Vec<SyntaxNode>,
    /// Literal text for terminals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Code attached by the bytecode compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<Vec<u8>>,
}

impl SyntaxNode {
    /// A rule node with the given children.
    pub fn rule(name: impl Into<String>, kid: Vec<SyntaxNode>) -> Self {
        let loc = kid.first().map(|k| k.loc.clone()).unwrap_or_default();
        Self {
            name: name.into(),
            loc,
            kid,
            token: None,
            bytecode: None,
        }
    }

    /// A terminal carrying `text`.
    pub fn token(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loc: SourceLoc::default(),
            kid: Vec::new(),
            token: Some(text.into()),
            bytecode: None,
        }
    }

    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.loc = loc;
        self
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_terminal(&self) -> bool {
        self.token.is_some()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Token text, or the empty string for rule nodes.
    pub fn text(&self) -> &str {
        self.token.as_deref().unwrap_or("")
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&SyntaxNode> {
        self.kid.iter().find(|k| k.name == name)
    }

    /// All direct children with the given name.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SyntaxNode> + 'a {
        self.kid.iter().filter(move |k| k.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Source text reconstructed from the terminals of this subtree.
    pub fn source_text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_tokens(&mut parts);
        parts.join(" ")
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.token {
            Some(text) => out.push(text),
            None => self.kid.iter().for_each(|k| k.collect_tokens(out)),
        }
    }

    /// Visit every node of the subtree, parents after children.
    pub fn walk_post_mut(&mut self, visit: &mut impl FnMut(&mut SyntaxNode)) {
        for kid in &mut self.kid {
            kid.walk_post_mut(visit);
        }
        visit(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip_keeps_locations() {
        let json = r#"{
            "name": "atom",
            "loc": {"line": 3, "col": 7, "file": "main.jac"},
            "kid": [{"name": "INT", "loc": {"line": 3, "col": 7, "file": "main.jac"}, "token": "42"}]
        }"#;
        let node = SyntaxNode::from_json(json).unwrap();
        assert_eq!(node.loc.line, 3);
        assert_eq!(node.kid[0].text(), "42");
        assert!(node.kid[0].is_terminal());
        assert!(!node.is_terminal());
        let back = SyntaxNode::from_json(&node.to_json().unwrap()).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_source_text_joins_terminals() {
        let node = SyntaxNode::rule(
            "arithmetic",
            vec![
                SyntaxNode::token("INT", "1"),
                SyntaxNode::token("PLUS", "+"),
                SyntaxNode::token("INT", "2"),
            ],
        );
        assert_eq!(node.source_text(), "1 + 2");
    }
}
