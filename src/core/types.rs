//! MR-006: Module configuration model.
//!
//! Declarations of one module (variables, outputs, module calls, resources)
//! and the static module tree that maps module instance addresses to them.
//! Everything here is built once per analysis session and then only read.

use super::addrs::{ModuleInstance, Resource, ResourceMode};
use super::body::Body;
use super::error::{LoadError, Result};
use super::expr::Expr;
use super::schema::Provider;
use indexmap::IndexMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Declarations
// ============================================================================

/// An input variable declaration. It has no expression: its value comes from
/// the calling module (or from outside, for the root module).
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub type_constraint: Option<String>,
    pub default: Option<serde_yaml_ng::Value>,
    pub description: Option<String>,
    pub sensitive: bool,
}

impl Variable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_constraint: None,
            default: None,
            description: None,
            sensitive: false,
        }
    }

    /// A caller must set a variable that has no default.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// An output value declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub expr: Expr,
    pub description: Option<String>,
    pub sensitive: bool,
    pub depends_on: Vec<String>,
}

/// A `module` call: instantiates a child module and sets its variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCall {
    pub name: String,
    pub source: String,
    pub version: Option<String>,
    /// Arguments, keyed by child variable name.
    pub config: Body,
    pub count: Option<Expr>,
    pub for_each: Option<Expr>,
    pub depends_on: Vec<String>,
}

impl ModuleCall {
    /// Whether `source` names a directory relative to the calling module.
    pub fn is_local_source(&self) -> bool {
        self.source.starts_with("./") || self.source.starts_with("../")
    }
}

/// The `provider` meta-argument of a resource: `aws` or `aws.west`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderConfigRef {
    pub local_name: String,
    pub alias: Option<String>,
}

impl fmt::Display for ProviderConfigRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alias {
            Some(ref alias) => write!(f, "{}.{}", self.local_name, alias),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// A managed resource or data resource declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    pub addr: Resource,
    /// Provider the resource belongs to, resolved when the module is parsed.
    pub provider: Provider,
    pub provider_config_ref: Option<ProviderConfigRef>,
    pub config: Body,
    pub count: Option<Expr>,
    pub for_each: Option<Expr>,
    pub depends_on: Vec<String>,
}

// ============================================================================
// Module
// ============================================================================

/// All declarations of one module, keyed by local name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleConfig {
    pub required_providers: IndexMap<String, Provider>,
    pub variables: IndexMap<String, Variable>,
    pub outputs: IndexMap<String, Output>,
    pub module_calls: IndexMap<String, ModuleCall>,
    /// Managed resources keyed by `TYPE.NAME`.
    pub managed_resources: IndexMap<String, ResourceConfig>,
    /// Data resources keyed by `TYPE.NAME`.
    pub data_resources: IndexMap<String, ResourceConfig>,
}

impl ModuleConfig {
    pub fn resource_by_addr(&self, addr: &Resource) -> Option<&ResourceConfig> {
        let key = addr.key();
        match addr.mode {
            ResourceMode::Managed => self.managed_resources.get(&key),
            ResourceMode::Data => self.data_resources.get(&key),
        }
    }

    /// All resources, managed first, in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.managed_resources
            .values()
            .chain(self.data_resources.values())
    }

    /// Fully qualified provider for a local provider name, falling back to
    /// the default namespace when `required_providers` does not declare it.
    pub fn provider_for_local_name(&self, local_name: &str) -> Provider {
        self.required_providers
            .get(local_name)
            .cloned()
            .unwrap_or_else(|| Provider::default_for(local_name))
    }

    /// Merge declarations from another file of the same module.
    pub fn merge(&mut self, other: ModuleConfig, origin: &str) -> Result<()> {
        merge_map(&mut self.required_providers, other.required_providers, "required provider", origin)?;
        merge_map(&mut self.variables, other.variables, "variable", origin)?;
        merge_map(&mut self.outputs, other.outputs, "output", origin)?;
        merge_map(&mut self.module_calls, other.module_calls, "module call", origin)?;
        merge_map(&mut self.managed_resources, other.managed_resources, "resource", origin)?;
        merge_map(&mut self.data_resources, other.data_resources, "data resource", origin)?;
        Ok(())
    }
}

fn merge_map<V>(
    into: &mut IndexMap<String, V>,
    from: IndexMap<String, V>,
    kind: &'static str,
    origin: &str,
) -> Result<()> {
    for (name, value) in from {
        if into.contains_key(&name) {
            return Err(LoadError::Duplicate {
                kind,
                name,
                origin: origin.to_string(),
            });
        }
        into.insert(name, value);
    }
    Ok(())
}

// ============================================================================
// Module tree
// ============================================================================

/// Static module tree. Every instance of a module call shares one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Call names from the root; empty for the root module.
    pub path: Vec<String>,
    /// Directory the module was loaded from, if it came from disk.
    pub source_dir: Option<PathBuf>,
    pub module: ModuleConfig,
    pub children: IndexMap<String, Config>,
}

impl Config {
    pub fn new(module: ModuleConfig) -> Self {
        Self {
            module,
            ..Self::default()
        }
    }

    /// Attach a child module under the call `name`.
    pub fn with_child(mut self, name: &str, child: Config) -> Self {
        self.add_child(name, child);
        self
    }

    pub fn add_child(&mut self, name: &str, mut child: Config) {
        let mut path = self.path.clone();
        path.push(name.to_string());
        child.set_path(path);
        self.children.insert(name.to_string(), child);
    }

    fn set_path(&mut self, path: Vec<String>) {
        for (name, child) in self.children.iter_mut() {
            let mut child_path = path.clone();
            child_path.push(name.clone());
            child.set_path(child_path);
        }
        self.path = path;
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Node at a static module path.
    pub fn descendent(&self, path: &[&str]) -> Option<&Config> {
        let mut current = self;
        for name in path {
            current = current.children.get(*name)?;
        }
        Some(current)
    }

    /// Node for a module instance; instance keys are ignored.
    pub fn descendent_for_instance(&self, addr: &ModuleInstance) -> Option<&Config> {
        self.descendent(&addr.module_path())
    }

    /// This node and all descendants, depth first.
    pub fn walk(&self) -> Vec<&Config> {
        let mut out = vec![self];
        for child in self.children.values() {
            out.extend(child.walk());
        }
        out
    }

    /// Display form of the static path (`root` for the root module).
    pub fn display_path(&self) -> String {
        if self.path.is_empty() {
            return "root".to_string();
        }
        self.path
            .iter()
            .map(|p| format!("module.{}", p))
            .collect::<Vec<_>>()
            .join(".")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::addrs::InstanceKey;

    fn variable_module(names: &[&str]) -> ModuleConfig {
        let mut m = ModuleConfig::default();
        for name in names {
            m.variables.insert(name.to_string(), Variable::new(name));
        }
        m
    }

    #[test]
    fn test_mr006_descendent_paths() {
        let leaf = Config::new(variable_module(&["x"]));
        let mid = Config::new(variable_module(&["cidr"])).with_child("leaf", leaf);
        let root = Config::new(ModuleConfig::default()).with_child("net", mid);

        let net = root.descendent(&["net"]).unwrap();
        assert_eq!(net.path, vec!["net"]);
        assert!(net.module.variables.contains_key("cidr"));

        let leaf = root.descendent(&["net", "leaf"]).unwrap();
        assert_eq!(leaf.path, vec!["net", "leaf"]);
        assert_eq!(leaf.display_path(), "module.net.module.leaf");
        assert!(root.descendent(&["nope"]).is_none());
        assert_eq!(root.display_path(), "root");
    }

    #[test]
    fn test_mr006_instance_keys_ignored() {
        let root = Config::new(ModuleConfig::default())
            .with_child("net", Config::new(variable_module(&["cidr"])));
        let a = ModuleInstance::root().child("net", Some(InstanceKey::Int(0)));
        let b = ModuleInstance::root().child("net", Some(InstanceKey::Str("x".to_string())));
        assert!(root.descendent_for_instance(&a).is_some());
        assert_eq!(
            root.descendent_for_instance(&a),
            root.descendent_for_instance(&b)
        );
        assert!(root.descendent_for_instance(&ModuleInstance::root()).unwrap().is_root());
    }

    #[test]
    fn test_mr006_walk_order() {
        let root = Config::new(ModuleConfig::default())
            .with_child(
                "a",
                Config::new(ModuleConfig::default())
                    .with_child("c", Config::new(ModuleConfig::default())),
            )
            .with_child("b", Config::new(ModuleConfig::default()));
        let paths: Vec<String> = root.walk().iter().map(|c| c.display_path()).collect();
        assert_eq!(paths, vec!["root", "module.a", "module.a.module.c", "module.b"]);
    }

    #[test]
    fn test_mr006_merge_rejects_duplicates() {
        let mut a = variable_module(&["x"]);
        let b = variable_module(&["y"]);
        a.merge(b, "b.yaml").unwrap();
        assert_eq!(a.variables.len(), 2);

        let dup = variable_module(&["x"]);
        let err = a.merge(dup, "c.yaml").unwrap_err();
        assert!(err.to_string().contains("duplicate variable \"x\" in c.yaml"));
    }

    #[test]
    fn test_mr006_provider_fallback() {
        let mut m = ModuleConfig::default();
        m.required_providers.insert(
            "aws".to_string(),
            "example.com/acme/aws".parse().unwrap(),
        );
        assert_eq!(
            m.provider_for_local_name("aws").to_string(),
            "example.com/acme/aws"
        );
        assert_eq!(
            m.provider_for_local_name("google").to_string(),
            "registry.terraform.io/hashicorp/google"
        );
    }

    #[test]
    fn test_mr006_variable_required() {
        let mut v = Variable::new("x");
        assert!(v.is_required());
        v.default = Some(serde_yaml_ng::Value::Null);
        assert!(!v.is_required());
    }
}
