//! MR-003: Expressions and reference extraction.
//!
//! An expression is any YAML value. Strings are HCL templates: every
//! `${ ... }` interpolation and `%{ ... }` directive holds an expression
//! whose traversals (`var.x`, `aws_vpc.main.id`, `module.net["a"].vpc_id`)
//! are the references the expression depends on. Templates are parsed with
//! `hcl`; nothing is evaluated and only names are collected. Symbols bound by
//! `for` expressions and directives are not references inside their body.

use super::addrs::*;
use super::diagnostics::{Diagnostic, Diagnostics, Partial};
use hcl::expr::{Expression, ForExpr, ObjectKey, Operation, TraversalOperator};
use hcl::template::{Directive, Element, Template};
use hcl::Identifier;
use serde_yaml_ng::Value;

/// A configuration expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(Value);

impl Expr {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Direct references in this expression.
    pub fn references(&self) -> Partial<Vec<Reference>> {
        references_in_expr(self)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_string()))
    }
}

/// A root name followed by literal attribute and index steps, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traversal {
    pub root: String,
    pub steps: Vec<TraversalStep>,
}

// ============================================================================
// Reference extraction
// ============================================================================

/// Collect the references an expression mentions. Malformed references are
/// reported as error diagnostics and left out of the value.
pub fn references_in_expr(expr: &Expr) -> Partial<Vec<Reference>> {
    let mut refs = Vec::new();
    let mut diags = Diagnostics::new();
    collect_value(&expr.0, &mut refs, &mut diags);
    Partial::new(refs, diags)
}

/// Collect the references in a single template string.
pub fn references_in_template(template: &str) -> Partial<Vec<Reference>> {
    let mut refs = Vec::new();
    let mut diags = Diagnostics::new();
    collect_template(template, &mut refs, &mut diags);
    Partial::new(refs, diags)
}

fn collect_value(value: &Value, refs: &mut Vec<Reference>, diags: &mut Diagnostics) {
    match value {
        Value::String(s) => collect_template(s, refs, diags),
        Value::Sequence(items) => {
            for item in items {
                collect_value(item, refs, diags);
            }
        }
        Value::Mapping(map) => {
            for (k, v) in map {
                collect_value(k, refs, diags);
                collect_value(v, refs, diags);
            }
        }
        Value::Tagged(tagged) => collect_value(&tagged.value, refs, diags),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn collect_template(template: &str, refs: &mut Vec<Reference>, diags: &mut Diagnostics) {
    let (traversals, template_diags) = traversals_in_template(template).into_parts();
    diags.extend(template_diags);
    for traversal in traversals {
        match parse_ref(&traversal) {
            Ok(r) => refs.push(r),
            Err(d) => diags.push(d),
        }
    }
}

// ============================================================================
// Reference parsing
// ============================================================================

/// Interpret a traversal as a reference to a configuration object.
pub fn parse_ref(traversal: &Traversal) -> Result<Reference, Diagnostic> {
    let root = traversal.root.as_str();
    let steps = traversal.steps.as_slice();

    match root {
        "var" => {
            let (name, rest) = attr_name(root, steps, "an input variable name")?;
            Ok(Reference::new(
                Subject::InputVariable(InputVariable { name }),
                rest.to_vec(),
            ))
        }
        "local" => {
            let (name, rest) = attr_name(root, steps, "a local value name")?;
            Ok(other(OtherSubject::LocalValue(name), rest))
        }
        "path" => {
            let (name, rest) = attr_name(root, steps, "an attribute name")?;
            Ok(other(OtherSubject::PathAttr(name), rest))
        }
        "terraform" => {
            let (name, rest) = attr_name(root, steps, "an attribute name")?;
            Ok(other(OtherSubject::TerraformAttr(name), rest))
        }
        "count" => {
            let (name, rest) = attr_name(root, steps, "an attribute name")?;
            Ok(other(OtherSubject::CountAttr(name), rest))
        }
        "each" => {
            let (name, rest) = attr_name(root, steps, "an attribute name")?;
            Ok(other(OtherSubject::ForEachAttr(name), rest))
        }
        "self" => Ok(other(OtherSubject::SelfRef, steps)),
        "module" => {
            let (name, rest) = attr_name(root, steps, "a module call name")?;
            let (key, rest) = split_key(rest);
            let call = ModuleCallInstance { name, key };
            match rest.split_first() {
                Some((TraversalStep::Attr(output), rest)) => Ok(Reference::new(
                    Subject::ModuleCallOutput(AbsModuleCallOutput {
                        call,
                        name: output.clone(),
                    }),
                    rest.to_vec(),
                )),
                _ => Ok(other(OtherSubject::ModuleCall(call), rest)),
            }
        }
        "data" => {
            let (type_name, rest) = attr_name(root, steps, "a data source type")?;
            let (name, rest) = attr_name(root, rest, "a data source type and name")?;
            Ok(resource_ref(Resource::data(&type_name, &name), rest))
        }
        "template" | "lazy" | "arg" | "resource" | "ephemeral" => Err(Diagnostic::error(
            "Reserved symbol name",
            format!(
                "The symbol name \"{}\" is reserved and cannot be used as a reference.",
                root
            ),
        )),
        _ => {
            let (name, rest) = attr_name(root, steps, "a resource name")?;
            Ok(resource_ref(Resource::managed(root, &name), rest))
        }
    }
}

fn other(subject: OtherSubject, rest: &[TraversalStep]) -> Reference {
    Reference::new(Subject::Other(subject), rest.to_vec())
}

fn resource_ref(resource: Resource, rest: &[TraversalStep]) -> Reference {
    let (key, rest) = split_key(rest);
    Reference::new(
        Subject::ResourceInstance(resource.instance(key)),
        rest.to_vec(),
    )
}

fn split_key(steps: &[TraversalStep]) -> (Option<InstanceKey>, &[TraversalStep]) {
    match steps.split_first() {
        Some((TraversalStep::Index(key), rest)) => (Some(key.clone()), rest),
        _ => (None, steps),
    }
}

fn attr_name<'s>(
    root: &str,
    steps: &'s [TraversalStep],
    what: &str,
) -> Result<(String, &'s [TraversalStep]), Diagnostic> {
    match steps.split_first() {
        Some((TraversalStep::Attr(name), rest)) => Ok((name.clone(), rest)),
        _ => Err(Diagnostic::error(
            "Invalid reference",
            format!("\"{}\" must be followed by {}", root, what),
        )),
    }
}

// ============================================================================
// Template walking
// ============================================================================

/// Find the traversals in every interpolation and directive of a template.
/// A string that does not parse as a template yields one error diagnostic.
pub fn traversals_in_template(template: &str) -> Partial<Vec<Traversal>> {
    if !template.contains("${") && !template.contains("%{") {
        return Partial::ok(Vec::new());
    }

    let mut walker = Walker::default();
    let mut diags = Diagnostics::new();
    match template.parse::<Template>() {
        Ok(parsed) => walker.template(&parsed),
        Err(e) => diags.push(Diagnostic::error("Invalid template", e.to_string())),
    }
    diags.extend(walker.diags);
    Partial::new(walker.found, diags)
}

/// Parse a string consisting of exactly one traversal, e.g.
/// `aws_instance.web[0].tags`.
pub fn parse_traversal(s: &str) -> Option<Traversal> {
    let template: Template = format!("${{{}}}", s).parse().ok()?;
    let [Element::Interpolation(interpolation)] = template.elements() else {
        return None;
    };

    match &interpolation.expr {
        Expression::Variable(root) => Some(Traversal {
            root: root.as_str().to_string(),
            steps: Vec::new(),
        }),
        Expression::Traversal(traversal) => {
            let Expression::Variable(root) = &traversal.expr else {
                return None;
            };
            let steps = traversal
                .operators
                .iter()
                .map(literal_step)
                .collect::<Option<Vec<_>>>()?;
            Some(Traversal {
                root: root.as_str().to_string(),
                steps,
            })
        }
        _ => None,
    }
}

/// Collects traversals from an HCL syntax tree. `scope` holds the symbols
/// bound by the enclosing `for` expressions and directives.
#[derive(Default)]
struct Walker {
    scope: Vec<String>,
    found: Vec<Traversal>,
    diags: Diagnostics,
}

impl Walker {
    fn template(&mut self, template: &Template) {
        for element in template.elements() {
            match element {
                Element::Literal(_) => {}
                Element::Interpolation(interpolation) => self.expr(&interpolation.expr),
                Element::Directive(directive) => self.directive(directive),
            }
        }
    }

    fn directive(&mut self, directive: &Directive) {
        match directive {
            Directive::If(d) => {
                self.expr(&d.cond_expr);
                self.template(&d.true_template);
                if let Some(false_template) = &d.false_template {
                    self.template(false_template);
                }
            }
            Directive::For(d) => {
                self.expr(&d.collection_expr);
                let mark = self.bind(d.key_var.as_ref(), &d.value_var);
                self.template(&d.template);
                self.scope.truncate(mark);
            }
        }
    }

    fn expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Traversal(traversal) => self.traversal(traversal),
            Expression::Array(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            Expression::Object(object) => {
                for (key, value) in object {
                    if let ObjectKey::Expression(key) = key {
                        self.expr(key);
                    }
                    self.expr(value);
                }
            }
            Expression::TemplateExpr(template) => match Template::from_expr(template) {
                Ok(parsed) => self.template(&parsed),
                Err(e) => self
                    .diags
                    .push(Diagnostic::error("Invalid template", e.to_string())),
            },
            Expression::FuncCall(call) => {
                for arg in &call.args {
                    self.expr(arg);
                }
            }
            Expression::Parenthesis(inner) => self.expr(inner),
            Expression::Conditional(cond) => {
                self.expr(&cond.cond_expr);
                self.expr(&cond.true_expr);
                self.expr(&cond.false_expr);
            }
            Expression::Operation(op) => match &**op {
                Operation::Unary(unary) => self.expr(&unary.expr),
                Operation::Binary(binary) => {
                    self.expr(&binary.lhs_expr);
                    self.expr(&binary.rhs_expr);
                }
            },
            Expression::ForExpr(for_expr) => self.for_expr(for_expr),
            // Literals, and bare names: an object key, a loop symbol, or an
            // incomplete expression. None of those address an object.
            _ => {}
        }
    }

    fn for_expr(&mut self, for_expr: &ForExpr) {
        self.expr(&for_expr.collection_expr);
        let mark = self.bind(for_expr.key_var.as_ref(), &for_expr.value_var);
        if let Some(key_expr) = &for_expr.key_expr {
            self.expr(key_expr);
        }
        self.expr(&for_expr.value_expr);
        if let Some(cond_expr) = &for_expr.cond_expr {
            self.expr(cond_expr);
        }
        self.scope.truncate(mark);
    }

    /// Record the literal prefix of a traversal rooted at a free name, then
    /// walk the index expressions past it.
    fn traversal(&mut self, traversal: &hcl::expr::Traversal) {
        let steps: Vec<TraversalStep> = traversal
            .operators
            .iter()
            .map_while(literal_step)
            .collect();
        let rest = &traversal.operators[steps.len()..];

        match &traversal.expr {
            Expression::Variable(root) => {
                let root = root.as_str();
                if !steps.is_empty() && !self.scope.iter().any(|s| s == root) {
                    self.found.push(Traversal {
                        root: root.to_string(),
                        steps,
                    });
                }
            }
            other => self.expr(other),
        }

        for op in rest {
            if let TraversalOperator::Index(index) = op {
                self.expr(index);
            }
        }
    }

    fn bind(&mut self, key_var: Option<&Identifier>, value_var: &Identifier) -> usize {
        let mark = self.scope.len();
        if let Some(key_var) = key_var {
            self.scope.push(key_var.as_str().to_string());
        }
        self.scope.push(value_var.as_str().to_string());
        mark
    }
}

/// A traversal operator with a literal key. Splats and computed indexes
/// end the literal part of a traversal.
fn literal_step(op: &TraversalOperator) -> Option<TraversalStep> {
    match op {
        TraversalOperator::GetAttr(name) => Some(TraversalStep::Attr(name.as_str().to_string())),
        TraversalOperator::LegacyIndex(n) => i64::try_from(*n)
            .ok()
            .map(|n| TraversalStep::Index(InstanceKey::Int(n))),
        TraversalOperator::Index(index) => literal_key(index).map(TraversalStep::Index),
        _ => None,
    }
}

fn literal_key(expr: &Expression) -> Option<InstanceKey> {
    match expr {
        Expression::Number(n) => n.as_i64().map(InstanceKey::Int),
        Expression::String(s) => Some(InstanceKey::Str(s.clone())),
        Expression::TemplateExpr(template) => {
            let parsed = Template::from_expr(template).ok()?;
            parsed
                .elements()
                .iter()
                .map(|element| match element {
                    Element::Literal(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Option<String>>()
                .map(InstanceKey::Str)
        }
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(template: &str) -> Vec<String> {
        let (refs, diags) = references_in_template(template).into_parts();
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        refs.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_mr003_plain_string_has_no_refs() {
        assert!(refs("10.0.0.0/16").is_empty());
        assert!(refs("").is_empty());
    }

    #[test]
    fn test_mr003_simple_interpolation() {
        assert_eq!(refs("${var.base_cidr}"), vec!["var.base_cidr"]);
        assert_eq!(refs("vpc-${aws_vpc.main.id}-x"), vec!["aws_vpc.main.id"]);
    }

    #[test]
    fn test_mr003_subjects() {
        let (r, _) = references_in_template("${module.net[\"a\"].vpc_id.x}").into_parts();
        assert_eq!(
            r[0].subject,
            Subject::ModuleCallOutput(AbsModuleCallOutput {
                call: ModuleCallInstance {
                    name: "net".to_string(),
                    key: Some(InstanceKey::Str("a".to_string())),
                },
                name: "vpc_id".to_string(),
            })
        );
        assert_eq!(r[0].remaining, vec![TraversalStep::Attr("x".to_string())]);

        let (r, _) = references_in_template("${data.aws_ami.ubuntu.id}").into_parts();
        assert_eq!(
            r[0].subject,
            Subject::ResourceInstance(Resource::data("aws_ami", "ubuntu").instance(None))
        );

        let (r, _) = references_in_template("${aws_instance.web[3].tags[\"Name\"]}").into_parts();
        assert_eq!(
            r[0].subject,
            Subject::ResourceInstance(
                Resource::managed("aws_instance", "web").instance(Some(InstanceKey::Int(3)))
            )
        );
        assert_eq!(
            r[0].remaining,
            vec![
                TraversalStep::Attr("tags".to_string()),
                TraversalStep::Index(InstanceKey::Str("Name".to_string())),
            ]
        );
    }

    #[test]
    fn test_mr003_other_subjects() {
        let (r, _) =
            references_in_template("${path.module}/${terraform.workspace}/${count.index}/${each.key}/${local.name}/${self.id}/${module.net}")
                .into_parts();
        assert_eq!(r.len(), 7);
        assert!(r.iter().all(|r| matches!(r.subject, Subject::Other(_))));
        assert_eq!(r[6].subject, Subject::Other(OtherSubject::ModuleCall(ModuleCallInstance {
            name: "net".to_string(),
            key: None,
        })));
    }

    #[test]
    fn test_mr003_legacy_index() {
        assert_eq!(refs("${aws_instance.web.0.id}"), vec!["aws_instance.web[0].id"]);
    }

    #[test]
    fn test_mr003_function_calls_are_not_refs() {
        assert_eq!(
            refs("${cidrsubnet(var.cidr, 8, 1)}"),
            vec!["var.cidr"]
        );
        assert_eq!(refs("${provider::aws::arn_parse(var.arn)}"), vec!["var.arn"]);
        assert_eq!(refs("${length(var.list...)}"), vec!["var.list"]);
    }

    #[test]
    fn test_mr003_string_literals_inside_expressions() {
        assert_eq!(
            refs("${join(\",\", [var.a, \"x.y\", \"${var.b}\"])}"),
            vec!["var.a", "var.b"]
        );
    }

    #[test]
    fn test_mr003_escapes() {
        assert!(refs("$${var.literal}").is_empty());
        assert!(refs("%%{if}").is_empty());
    }

    #[test]
    fn test_mr003_directives() {
        assert_eq!(
            refs("%{ if var.enabled }on%{ else }${var.fallback}%{ endif }"),
            vec!["var.enabled", "var.fallback"]
        );
    }

    #[test]
    fn test_mr003_for_expression_symbols() {
        assert_eq!(
            refs("${[for s in var.subnets : s.cidr if s.public]}"),
            vec!["var.subnets"]
        );
        assert_eq!(
            refs("${{for k, v in var.tags : k => v.value}}"),
            vec!["var.tags"]
        );
    }

    #[test]
    fn test_mr003_for_symbols_scoped_in_nested_strings() {
        assert_eq!(
            refs("${[for s in var.subnets : \"${s.name}-x\"]}"),
            vec!["var.subnets"]
        );
        assert_eq!(
            refs("${[for s in var.subnets : \"${s.name}-${var.suffix}\"]}"),
            vec!["var.subnets", "var.suffix"]
        );
    }

    #[test]
    fn test_mr003_for_directive_symbols() {
        assert_eq!(
            refs("%{ for s in var.subnets }${s.cidr}%{ endfor }"),
            vec!["var.subnets"]
        );
        assert_eq!(
            refs("%{ for k, v in var.tags }${k}=${v.value},${var.sep}%{ endfor }"),
            vec!["var.tags", "var.sep"]
        );
    }

    #[test]
    fn test_mr003_for_symbols_end_with_their_scope() {
        // `s` is free again after the loop that bound it
        assert_eq!(
            refs("${[for s in var.list : s.id]} ${s.id}"),
            vec!["var.list", "s.id"]
        );
        assert_eq!(
            refs("%{ for s in var.list }${s.id}%{ endfor }${s.id}"),
            vec!["var.list", "s.id"]
        );
    }

    #[test]
    fn test_mr003_non_literal_index() {
        assert_eq!(
            refs("${aws_subnet.private[var.index].id}"),
            vec!["aws_subnet.private", "var.index"]
        );
    }

    #[test]
    fn test_mr003_splat() {
        assert_eq!(refs("${aws_instance.web[*].id}"), vec!["aws_instance.web"]);
        assert_eq!(refs("${aws_instance.web.*.private_ip}"), vec!["aws_instance.web"]);
    }

    #[test]
    fn test_mr003_object_keys_and_conditionals() {
        assert_eq!(
            refs("${{ name = var.name, size = var.big ? 10 : 1 }}"),
            vec!["var.name", "var.big"]
        );
        assert!(refs("${true ? null : false}").is_empty());
    }

    #[test]
    fn test_mr003_invalid_refs_become_diagnostics() {
        let (r, diags) = references_in_template("${aws_instance[0]} ${var.ok} ${template.x}").into_parts();
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].to_string(), "var.ok");
        assert_eq!(diags.len(), 2);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_mr003_expr_walks_collections() {
        let value: Value = serde_yaml_ng::from_str(
            r#"
Name: "${var.name}"
"${var.key}": 1
list: ["${aws_vpc.main.id}", 3, true, null]
"#,
        )
        .unwrap();
        let (r, _) = Expr::new(value).references().into_parts();
        let names: Vec<String> = r.iter().map(|r| r.to_string()).collect();
        assert_eq!(names, vec!["var.name", "var.key", "aws_vpc.main.id"]);
    }

    #[test]
    fn test_mr003_parse_traversal() {
        let t = parse_traversal("aws_instance.web[0].tags[\"a b\"]").unwrap();
        assert_eq!(t.root, "aws_instance");
        assert_eq!(t.steps.len(), 4);
        assert!(parse_traversal("var.x + 1").is_none());
        assert!(parse_traversal("0abc").is_none());
        assert!(parse_traversal("").is_none());
    }

    #[test]
    fn test_mr003_parse_traversal_keys() {
        let t = parse_traversal("module.net[\"a\\\"b\\u007F\"]").unwrap();
        assert_eq!(
            t.steps[1],
            TraversalStep::Index(InstanceKey::Str("a\"b\u{7f}".to_string()))
        );
        let t = parse_traversal("aws_instance.web.0").unwrap();
        assert_eq!(t.steps[1], TraversalStep::Index(InstanceKey::Int(0)));
        assert!(parse_traversal("aws_instance.web[*].id").is_none());
        assert!(parse_traversal("aws_instance.web[var.i]").is_none());
        assert!(parse_traversal("a} ${b").is_none());
    }

    #[test]
    fn test_mr003_unterminated_interpolation() {
        let (r, diags) = references_in_template("${var.a").into_parts();
        assert!(r.is_empty());
        assert!(diags.has_errors());
    }

    #[test]
    fn test_mr003_non_ascii_text() {
        assert_eq!(refs("héllo ${var.x} ✓"), vec!["var.x"]);
    }
}
