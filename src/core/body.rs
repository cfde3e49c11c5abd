//! MR-004: Configuration bodies.
//!
//! A body is a mapping whose keys are attributes or nested blocks depending
//! on the schema used to read it. Reading is best-effort: unknown keys are
//! ignored and malformed content becomes diagnostics next to whatever could
//! be extracted.
//!
//! Blocks without labels are written as a mapping (one block) or a sequence
//! of mappings (several). Labelled blocks nest one mapping level per label:
//!
//! ```yaml
//! ingress:                 # list block, two instances
//!   - from_port: 80
//!   - from_port: 443
//! setting:                 # map block, labelled "a"
//!   a: { value: "${var.a}" }
//! ```

use super::addrs::Reference;
use super::diagnostics::{Diagnostic, Diagnostics, Partial};
use super::expr::Expr;
use indexmap::IndexMap;
use serde_yaml_ng::{Mapping, Value};

/// Schema used to read a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySchema {
    pub attributes: Vec<AttributeSchema>,
    pub blocks: Vec<BlockHeaderSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderSchema {
    pub type_name: String,
    pub label_names: Vec<String>,
}

impl BodySchema {
    /// Schema with a single optional attribute.
    pub fn single_attribute(name: &str) -> Self {
        Self {
            attributes: vec![AttributeSchema {
                name: name.to_string(),
                required: false,
            }],
            blocks: Vec::new(),
        }
    }
}

/// An attribute extracted from a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: Expr,
}

/// A nested block extracted from a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub type_name: String,
    pub labels: Vec<String>,
    pub body: Body,
}

/// What a schema found in a body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyContent {
    pub attributes: IndexMap<String, Attribute>,
    pub blocks: Vec<Block>,
}

impl BodyContent {
    pub fn blocks_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks.iter().filter(move |b| b.type_name == type_name)
    }
}

/// Raw configuration body: ordered keys and their expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    entries: IndexMap<String, Expr>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a body from a YAML mapping. Non-string keys are skipped with a
    /// warning.
    pub fn from_mapping(mapping: &Mapping) -> Partial<Body> {
        let mut entries = IndexMap::new();
        let mut diags = Diagnostics::new();
        for (k, v) in mapping {
            match k {
                Value::String(key) => {
                    entries.insert(key.clone(), Expr::new(v.clone()));
                }
                other => diags.push(Diagnostic::warning(
                    "Ignored argument name",
                    format!("argument names must be strings, got {:?}", other),
                )),
            }
        }
        Partial::new(Self { entries }, diags)
    }

    pub fn insert(&mut self, name: &str, expr: Expr) {
        self.entries.insert(name.to_string(), expr);
    }

    /// Remove an entry, keeping the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<Expr> {
        self.entries.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Expr> {
        self.entries.iter()
    }

    /// Extract the attributes and blocks the schema declares.
    pub fn partial_content(&self, schema: &BodySchema) -> Partial<BodyContent> {
        let mut content = BodyContent::default();
        let mut diags = Diagnostics::new();

        for attr in &schema.attributes {
            match self.entries.get(&attr.name) {
                Some(expr) => {
                    content.attributes.insert(
                        attr.name.clone(),
                        Attribute {
                            name: attr.name.clone(),
                            expr: expr.clone(),
                        },
                    );
                }
                None if attr.required => diags.push(Diagnostic::error(
                    "Missing required argument",
                    format!("the argument \"{}\" is required", attr.name),
                )),
                None => {}
            }
        }

        for header in &schema.blocks {
            if let Some(expr) = self.entries.get(&header.type_name) {
                decode_blocks(
                    header,
                    expr.value(),
                    &mut Vec::new(),
                    &mut content.blocks,
                    &mut diags,
                );
            }
        }

        Partial::new(content, diags)
    }

    /// Every reference anywhere in the body, nested blocks included.
    pub fn references(&self) -> Partial<Vec<Reference>> {
        let mut refs = Vec::new();
        let mut diags = Diagnostics::new();
        for expr in self.entries.values() {
            let (r, d) = expr.references().into_parts();
            refs.extend(r);
            diags.extend(d);
        }
        Partial::new(refs, diags)
    }
}

fn decode_blocks(
    header: &BlockHeaderSchema,
    value: &Value,
    labels: &mut Vec<String>,
    out: &mut Vec<Block>,
    diags: &mut Diagnostics,
) {
    match value {
        Value::Null => {}
        Value::Sequence(items) => {
            for item in items {
                decode_blocks(header, item, labels, out, diags);
            }
        }
        Value::Mapping(mapping) if labels.len() < header.label_names.len() => {
            for (k, v) in mapping {
                let Value::String(label) = k else {
                    diags.push(Diagnostic::error(
                        "Invalid block label",
                        format!("labels of \"{}\" blocks must be strings", header.type_name),
                    ));
                    continue;
                };
                labels.push(label.clone());
                decode_blocks(header, v, labels, out, diags);
                labels.pop();
            }
        }
        Value::Mapping(mapping) => {
            let (body, d) = Body::from_mapping(mapping).into_parts();
            diags.extend(d);
            out.push(Block {
                type_name: header.type_name.clone(),
                labels: labels.clone(),
                body,
            });
        }
        Value::Tagged(tagged) => decode_blocks(header, &tagged.value, labels, out, diags),
        _ => diags.push(Diagnostic::error(
            "Unsupported block value",
            format!(
                "a \"{}\" block must be a mapping or a sequence of mappings",
                header.type_name
            ),
        )),
    }
}

impl From<IndexMap<String, Expr>> for Body {
    fn from(entries: IndexMap<String, Expr>) -> Self {
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(yaml: &str) -> Body {
        let mapping: Mapping = serde_yaml_ng::from_str(yaml).unwrap();
        let (body, diags) = Body::from_mapping(&mapping).into_parts();
        assert!(diags.is_empty());
        body
    }

    fn schema() -> BodySchema {
        BodySchema {
            attributes: vec![
                AttributeSchema {
                    name: "ami".to_string(),
                    required: true,
                },
                AttributeSchema {
                    name: "tags".to_string(),
                    required: false,
                },
            ],
            blocks: vec![
                BlockHeaderSchema {
                    type_name: "ingress".to_string(),
                    label_names: vec![],
                },
                BlockHeaderSchema {
                    type_name: "setting".to_string(),
                    label_names: vec!["key".to_string()],
                },
            ],
        }
    }

    #[test]
    fn test_mr004_attributes_and_unknown_keys() {
        let b = body(
            r#"
ami: "${data.aws_ami.ubuntu.id}"
unknown: 1
"#,
        );
        let (content, diags) = b.partial_content(&schema()).into_parts();
        assert!(diags.is_empty());
        assert_eq!(content.attributes.len(), 1);
        assert!(content.attributes.contains_key("ami"));
        assert!(content.blocks.is_empty());
    }

    #[test]
    fn test_mr004_missing_required_is_partial() {
        let b = body("tags: { Name: web }");
        let (content, diags) = b.partial_content(&schema()).into_parts();
        assert!(diags.has_errors());
        assert!(content.attributes.contains_key("tags"));
    }

    #[test]
    fn test_mr004_unlabelled_blocks() {
        let b = body(
            r#"
ami: x
ingress:
  - from_port: 80
  - from_port: 443
  - from_port: 22
"#,
        );
        let (content, _) = b.partial_content(&schema()).into_parts();
        assert_eq!(content.blocks_of_type("ingress").count(), 3);

        let single = body("ami: x\ningress: { from_port: 80 }");
        let (content, _) = single.partial_content(&schema()).into_parts();
        assert_eq!(content.blocks_of_type("ingress").count(), 1);
    }

    #[test]
    fn test_mr004_labelled_blocks() {
        let b = body(
            r#"
ami: x
setting:
  a: { value: 1 }
  b: { value: 2 }
"#,
        );
        let (content, _) = b.partial_content(&schema()).into_parts();
        let labels: Vec<&str> = content
            .blocks_of_type("setting")
            .map(|b| b.labels[0].as_str())
            .collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn test_mr004_malformed_block_keeps_rest() {
        let b = body(
            r#"
ami: x
ingress: 42
setting:
  a: { value: 1 }
"#,
        );
        let (content, diags) = b.partial_content(&schema()).into_parts();
        assert!(diags.has_errors());
        assert_eq!(content.blocks.len(), 1);
        assert_eq!(content.attributes.len(), 1);
    }

    #[test]
    fn test_mr004_references_walk_everything() {
        let b = body(
            r#"
ami: "${var.ami}"
ingress:
  - cidr_blocks: ["${aws_vpc.main.cidr_block}"]
"#,
        );
        let (refs, _) = b.references().into_parts();
        let names: Vec<String> = refs.iter().map(|r| r.to_string()).collect();
        assert_eq!(names, vec!["var.ami", "aws_vpc.main.cidr_block"]);
    }

    #[test]
    fn test_mr004_non_string_key() {
        let mapping: Mapping = serde_yaml_ng::from_str("1: x\nok: y").unwrap();
        let (b, diags) = Body::from_mapping(&mapping).into_parts();
        assert_eq!(b.len(), 1);
        assert!(b.get("ok").is_some());
        assert_eq!(diags.len(), 1);
        assert!(!diags.has_errors());
        assert!(diags
            .iter()
            .all(|d| d.severity == crate::core::diagnostics::Severity::Warning));
    }
}
