//! MR-007: YAML module parsing and validation.
//!
//! Parses module files into `ModuleConfig` and validates cross-references:
//! - `var.X` must name a declared variable
//! - `module.X` must name a declared module call
//! - resource references must name a declared resource
//! - call arguments must match the child module's variables
//! - `count` and `for_each` are mutually exclusive

use super::addrs::{OtherSubject, Reference, Resource, Subject, TraversalStep};
use super::body::Body;
use super::error::{LoadError, Result};
use super::expr::{self, Expr};
use super::schema::Provider;
use super::types::*;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml_ng::{Mapping, Value};
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Module the problem was found in (`root`, `module.net`, ...)
    pub module: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.module, self.message)
    }
}

// ============================================================================
// Raw YAML shape
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModuleFile {
    required_providers: IndexMap<String, RawRequiredProvider>,
    variables: IndexMap<String, Option<RawVariable>>,
    outputs: IndexMap<String, RawOutput>,
    modules: IndexMap<String, Mapping>,
    resources: IndexMap<String, Mapping>,
    data: IndexMap<String, Mapping>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRequiredProvider {
    Source(String),
    Detailed { source: String },
}

#[derive(Debug, Default, Deserialize)]
struct RawVariable {
    #[serde(rename = "type", default)]
    type_constraint: Option<String>,
    #[serde(default, deserialize_with = "present_value")]
    default: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    sensitive: bool,
}

/// A key that is present is `Some`, even when its value is null. An absent
/// key falls back to `None` through `#[serde(default)]`.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    value: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    sensitive: bool,
    #[serde(default)]
    depends_on: Vec<String>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a module file from disk.
pub fn parse_module_file(path: &Path) -> Result<ModuleConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_module(&content, &path.display().to_string())
}

/// Parse one module file from a string. `origin` names the source in errors.
pub fn parse_module(yaml: &str, origin: &str) -> Result<ModuleConfig> {
    if yaml.trim().is_empty() {
        return Ok(ModuleConfig::default());
    }
    let raw: RawModuleFile = serde_yaml_ng::from_str(yaml).map_err(|source| LoadError::Yaml {
        origin: origin.to_string(),
        source,
    })?;

    let mut module = ModuleConfig::default();

    for (local_name, rp) in raw.required_providers {
        let source = match rp {
            RawRequiredProvider::Source(s) | RawRequiredProvider::Detailed { source: s } => s,
        };
        module.required_providers.insert(local_name, source.parse()?);
    }

    for (name, raw_var) in raw.variables {
        let raw_var = raw_var.unwrap_or_default();
        module.variables.insert(
            name.clone(),
            Variable {
                name,
                type_constraint: raw_var.type_constraint,
                default: raw_var.default,
                description: raw_var.description,
                sensitive: raw_var.sensitive,
            },
        );
    }

    for (name, raw_out) in raw.outputs {
        module.outputs.insert(
            name.clone(),
            Output {
                name,
                expr: Expr::new(raw_out.value),
                description: raw_out.description,
                sensitive: raw_out.sensitive,
                depends_on: raw_out.depends_on,
            },
        );
    }

    for (name, mapping) in &raw.modules {
        let call = parse_module_call(name, mapping, origin)?;
        module.module_calls.insert(name.clone(), call);
    }

    for (key, mapping) in &raw.resources {
        let rc = parse_resource(key, mapping, false, &module, origin)?;
        module.managed_resources.insert(key.clone(), rc);
    }
    for (key, mapping) in &raw.data {
        let rc = parse_resource(key, mapping, true, &module, origin)?;
        module.data_resources.insert(key.clone(), rc);
    }

    Ok(module)
}

fn parse_module_call(name: &str, mapping: &Mapping, origin: &str) -> Result<ModuleCall> {
    let mut config = body_from_mapping(name, mapping);
    let invalid = |message: String| LoadError::Declaration {
        name: format!("module.{}", name),
        origin: origin.to_string(),
        message,
    };

    let source = meta_string(&mut config, "source")
        .map_err(invalid)?
        .ok_or_else(|| invalid("missing \"source\"".to_string()))?;
    let version = meta_string(&mut config, "version").map_err(invalid)?;
    let depends_on = meta_list(&mut config, "depends_on").map_err(invalid)?;
    let count = config.remove("count");
    let for_each = config.remove("for_each");
    config.remove("providers");

    Ok(ModuleCall {
        name: name.to_string(),
        source,
        version,
        config,
        count,
        for_each,
        depends_on,
    })
}

fn parse_resource(
    key: &str,
    mapping: &Mapping,
    data: bool,
    module: &ModuleConfig,
    origin: &str,
) -> Result<ResourceConfig> {
    let invalid = |message: String| LoadError::Declaration {
        name: if data {
            format!("data.{}", key)
        } else {
            key.to_string()
        },
        origin: origin.to_string(),
        message,
    };

    let (type_name, name) = split_resource_key(key)
        .ok_or_else(|| invalid("resource keys must be TYPE.NAME".to_string()))?;
    let addr = if data {
        Resource::data(type_name, name)
    } else {
        Resource::managed(type_name, name)
    };

    let mut config = body_from_mapping(key, mapping);
    let provider_config_ref = meta_string(&mut config, "provider")
        .map_err(invalid)?
        .map(|s| match s.split_once('.') {
            Some((local, alias)) => ProviderConfigRef {
                local_name: local.to_string(),
                alias: Some(alias.to_string()),
            },
            None => ProviderConfigRef {
                local_name: s,
                alias: None,
            },
        });
    let depends_on = meta_list(&mut config, "depends_on").map_err(invalid)?;
    let count = config.remove("count");
    let for_each = config.remove("for_each");
    config.remove("lifecycle");

    let local_name = provider_config_ref
        .as_ref()
        .map(|r| r.local_name.as_str())
        .unwrap_or_else(|| Provider::implied_local_name(type_name));
    let provider = module.provider_for_local_name(local_name);

    Ok(ResourceConfig {
        addr,
        provider,
        provider_config_ref,
        config,
        count,
        for_each,
        depends_on,
    })
}

fn split_resource_key(key: &str) -> Option<(&str, &str)> {
    let traversal = expr::parse_traversal(key)?;
    match traversal.steps.as_slice() {
        [TraversalStep::Attr(_)] => key.split_once('.'),
        _ => None,
    }
}

fn body_from_mapping(name: &str, mapping: &Mapping) -> Body {
    let (body, diags) = Body::from_mapping(mapping).into_parts();
    for d in &diags {
        tracing::warn!(declaration = name, "{}", d);
    }
    body
}

fn meta_string(body: &mut Body, key: &str) -> std::result::Result<Option<String>, String> {
    match body.remove(key).map(|e| e.value().clone()) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(format!("\"{}\" must be a string", key)),
    }
}

fn meta_list(body: &mut Body, key: &str) -> std::result::Result<Vec<String>, String> {
    match body.remove(key).map(|e| e.value().clone()) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(items)) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(format!("\"{}\" entries must be strings", key)),
            })
            .collect(),
        Some(_) => Err(format!("\"{}\" must be a list", key)),
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate every module of a loaded tree. Returns a list of errors
/// (empty = valid).
pub fn validate_config(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for node in config.walk() {
        validate_module(node, &mut errors);
    }
    errors
}

fn validate_module(node: &Config, errors: &mut Vec<ValidationError>) {
    let module = &node.module;
    let mut push = |message: String| {
        errors.push(ValidationError {
            module: node.display_path(),
            message,
        })
    };

    for (name, output) in &module.outputs {
        check_expr(module, &format!("output \"{}\"", name), &output.expr, &mut push);
        check_depends_on(module, &format!("output \"{}\"", name), &output.depends_on, &mut push);
    }

    for (name, call) in &module.module_calls {
        let context = format!("module \"{}\"", name);
        for (arg, expr) in call.config.iter() {
            check_expr(module, &format!("{} argument \"{}\"", context, arg), expr, &mut push);
        }
        check_repetition(&context, call.count.as_ref(), call.for_each.as_ref(), module, &mut push);
        check_depends_on(module, &context, &call.depends_on, &mut push);

        if let Some(child) = node.children.get(name) {
            for (arg, _) in call.config.iter() {
                if !child.module.variables.contains_key(arg) {
                    push(format!(
                        "{}: unsupported argument \"{}\" (no such variable in the child module)",
                        context, arg
                    ));
                }
            }
            for (var_name, var) in &child.module.variables {
                if var.is_required() && call.config.get(var_name).is_none() {
                    push(format!(
                        "{}: missing required argument \"{}\"",
                        context, var_name
                    ));
                }
            }
        }
    }

    for rc in module.resources() {
        let context = format!("resource \"{}\"", rc.addr);
        for (arg, expr) in rc.config.iter() {
            check_expr(module, &format!("{} argument \"{}\"", context, arg), expr, &mut push);
        }
        check_repetition(&context, rc.count.as_ref(), rc.for_each.as_ref(), module, &mut push);
        check_depends_on(module, &context, &rc.depends_on, &mut push);
    }
}

fn check_repetition(
    context: &str,
    count: Option<&Expr>,
    for_each: Option<&Expr>,
    module: &ModuleConfig,
    push: &mut impl FnMut(String),
) {
    if count.is_some() && for_each.is_some() {
        push(format!("{}: \"count\" and \"for_each\" are mutually exclusive", context));
    }
    for expr in count.into_iter().chain(for_each) {
        check_expr(module, context, expr, push);
    }
}

fn check_expr(module: &ModuleConfig, context: &str, expr: &Expr, push: &mut impl FnMut(String)) {
    let (refs, diags) = expr.references().into_parts();
    for d in diags {
        push(format!("{}: {}", context, d));
    }
    for r in &refs {
        if let Some(problem) = unresolved(module, r) {
            push(format!("{}: {}", context, problem));
        }
    }
}

fn check_depends_on(
    module: &ModuleConfig,
    context: &str,
    depends_on: &[String],
    push: &mut impl FnMut(String),
) {
    for dep in depends_on {
        match dep.parse::<Reference>() {
            Ok(r) => {
                if let Some(problem) = unresolved(module, &r) {
                    push(format!("{}: depends_on {}", context, problem));
                }
            }
            Err(e) => push(format!("{}: depends_on: {}", context, e)),
        }
    }
}

/// Describe why a reference does not resolve within `module`, if it doesn't.
fn unresolved(module: &ModuleConfig, r: &Reference) -> Option<String> {
    match &r.subject {
        Subject::InputVariable(v) if !module.variables.contains_key(&v.name) => {
            Some(format!("reference to undeclared input variable \"{}\"", v.name))
        }
        Subject::ModuleCallOutput(o) if !module.module_calls.contains_key(&o.call.name) => {
            Some(format!("reference to undeclared module \"{}\"", o.call.name))
        }
        Subject::Other(OtherSubject::ModuleCall(c)) if !module.module_calls.contains_key(&c.name) => {
            Some(format!("reference to undeclared module \"{}\"", c.name))
        }
        Subject::ResourceInstance(ri) if module.resource_by_addr(&ri.resource).is_none() => {
            Some(format!("reference to undeclared resource \"{}\"", ri.resource))
        }
        _ => None,
    }
}
