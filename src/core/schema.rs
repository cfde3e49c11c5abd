//! MR-005: Provider identities and the provider schema registry.
//!
//! Schemas are read from the JSON document printed by the configuration
//! tool's `providers schema -json` command. Only the parts that describe a
//! resource body's shape are kept.

use super::addrs::ResourceMode;
use super::body::{self, BodySchema};
use super::error::{LoadError, ParseError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";
pub const DEFAULT_NAMESPACE: &str = "hashicorp";

// ============================================================================
// Provider identity
// ============================================================================

/// Fully qualified provider address, e.g.
/// `registry.terraform.io/hashicorp/aws`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Provider {
    pub hostname: String,
    pub namespace: String,
    pub type_name: String,
}

impl Provider {
    /// The provider a bare local name means when nothing declares it.
    pub fn default_for(type_name: &str) -> Self {
        Self {
            hostname: DEFAULT_REGISTRY_HOST.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            type_name: type_name.to_lowercase(),
        }
    }

    /// Local provider name implied by a resource type: the prefix before
    /// the first underscore (`aws_instance` → `aws`).
    pub fn implied_local_name(resource_type: &str) -> &str {
        resource_type.split('_').next().unwrap_or(resource_type)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.hostname, self.namespace, self.type_name)
    }
}

impl FromStr for Provider {
    type Err = ParseError;

    /// Parse `TYPE`, `NAMESPACE/TYPE` or `HOST/NAMESPACE/TYPE`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        for part in &parts {
            if part.is_empty() {
                return Err(ParseError::new("provider source", s, "empty segment"));
            }
            if !part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            {
                return Err(ParseError::new(
                    "provider source",
                    s,
                    format!("invalid characters in \"{}\"", part),
                ));
            }
        }
        let lower = |p: &str| p.to_lowercase();
        match parts.as_slice() {
            [t] => Ok(Self::default_for(t)),
            [ns, t] => Ok(Self {
                hostname: DEFAULT_REGISTRY_HOST.to_string(),
                namespace: lower(ns),
                type_name: lower(t),
            }),
            [host, ns, t] => Ok(Self {
                hostname: lower(host),
                namespace: lower(ns),
                type_name: lower(t),
            }),
            _ => Err(ParseError::new(
                "provider source",
                s,
                "expected at most HOST/NAMESPACE/TYPE",
            )),
        }
    }
}

// ============================================================================
// Schema tree
// ============================================================================

/// Attribute value type, decoded from its JSON type expression
/// (`"string"`, `["list", "string"]`, `["object", {...}]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum AttributeType {
    Primitive(String),
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Map(Box<AttributeType>),
    Object(IndexMap<String, AttributeType>),
    Tuple(Vec<AttributeType>),
    #[default]
    Dynamic,
}

impl AttributeType {
    /// A collection of values rather than a single value.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Set(_) | Self::Map(_) | Self::Tuple(_)
        )
    }

    /// Whether further traversal steps can apply to a value of this type.
    pub fn is_traversable(&self) -> bool {
        self.is_collection() || matches!(self, Self::Object(_) | Self::Dynamic)
    }
}

impl From<serde_json::Value> for AttributeType {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(s) if s == "dynamic" => Self::Dynamic,
            Value::String(s) => Self::Primitive(s),
            Value::Array(mut parts) if parts.len() == 2 => {
                let elem = parts.pop().unwrap_or_default();
                let kind = parts.pop().unwrap_or_default();
                match (kind.as_str(), elem) {
                    (Some("list"), e) => Self::List(Box::new(e.into())),
                    (Some("set"), e) => Self::Set(Box::new(e.into())),
                    (Some("map"), e) => Self::Map(Box::new(e.into())),
                    (Some("object"), Value::Object(attrs)) => {
                        Self::Object(attrs.into_iter().map(|(k, v)| (k, v.into())).collect())
                    }
                    (Some("tuple"), Value::Array(elems)) => {
                        Self::Tuple(elems.into_iter().map(Into::into).collect())
                    }
                    _ => Self::Dynamic,
                }
            }
            _ => Self::Dynamic,
        }
    }
}

/// One attribute in a block schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SchemaAttribute {
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// How instances of a nested block type are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    Single,
    Group,
    List,
    Set,
    Map,
}

/// A nested block type in a block schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NestedBlock {
    pub nesting_mode: NestingMode,
    #[serde(default)]
    pub block: BlockSchema,
    #[serde(default)]
    pub min_items: u64,
    #[serde(default)]
    pub max_items: u64,
}

/// Attributes and nested block types of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BlockSchema {
    #[serde(default)]
    pub attributes: IndexMap<String, SchemaAttribute>,
    #[serde(default)]
    pub block_types: IndexMap<String, NestedBlock>,
}

impl BlockSchema {
    /// The body schema for reading a body of this block. Computed-only
    /// attributes are still listed so they resolve as attributes.
    pub fn body_schema(&self) -> BodySchema {
        BodySchema {
            attributes: self
                .attributes
                .iter()
                .map(|(name, a)| body::AttributeSchema {
                    name: name.clone(),
                    required: a.required,
                })
                .collect(),
            blocks: self
                .block_types
                .iter()
                .map(|(name, nb)| body::BlockHeaderSchema {
                    type_name: name.clone(),
                    label_names: match nb.nesting_mode {
                        NestingMode::Map => vec!["key".to_string()],
                        _ => Vec::new(),
                    },
                })
                .collect(),
        }
    }
}

/// Schema for one resource or data source type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceTypeSchema {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub block: BlockSchema,
}

/// Everything one provider declares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderSchema {
    #[serde(default)]
    pub resource_schemas: IndexMap<String, ResourceTypeSchema>,
    #[serde(default)]
    pub data_source_schemas: IndexMap<String, ResourceTypeSchema>,
}

impl ProviderSchema {
    pub fn resource_type(&self, mode: ResourceMode, type_name: &str) -> Option<&ResourceTypeSchema> {
        match mode {
            ResourceMode::Managed => self.resource_schemas.get(type_name),
            ResourceMode::Data => self.data_source_schemas.get(type_name),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Deserialize)]
struct RawSchemas {
    #[serde(default)]
    provider_schemas: IndexMap<String, ProviderSchema>,
}

/// Read-only provider schema registry. A missing provider or type is a
/// normal outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct ProviderSchemas {
    providers: IndexMap<Provider, ProviderSchema>,
}

impl ProviderSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: Provider, schema: ProviderSchema) {
        self.providers.insert(provider, schema);
    }

    pub fn get(&self, provider: &Provider) -> Option<&ProviderSchema> {
        self.providers.get(provider)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.keys()
    }

    /// Parse a `providers schema -json` document.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSchemas = serde_json::from_str(json)?;
        let mut schemas = Self::new();
        for (addr, schema) in raw.provider_schemas {
            let provider: Provider = addr.parse()?;
            schemas.insert(provider, schema);
        }
        Ok(schemas)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AWS_SCHEMA: &str = r#"{
  "format_version": "1.0",
  "provider_schemas": {
    "registry.terraform.io/hashicorp/aws": {
      "resource_schemas": {
        "aws_instance": {
          "version": 1,
          "block": {
            "attributes": {
              "ami": { "type": "string", "required": true },
              "tags": { "type": ["map", "string"], "optional": true },
              "id": { "type": "string", "computed": true }
            },
            "block_types": {
              "ebs_block_device": {
                "nesting_mode": "set",
                "block": { "attributes": { "volume_size": { "type": "number", "optional": true } } }
              }
            }
          }
        }
      },
      "data_source_schemas": {
        "aws_ami": { "block": { "attributes": { "owners": { "type": ["list", "string"], "optional": true } } } }
      }
    }
  }
}"#;

    #[test]
    fn test_mr005_parse_provider_source() {
        let p: Provider = "aws".parse().unwrap();
        assert_eq!(p.to_string(), "registry.terraform.io/hashicorp/aws");
        let p: Provider = "Integrations/GitHub".parse().unwrap();
        assert_eq!(p.to_string(), "registry.terraform.io/integrations/github");
        let p: Provider = "example.com/acme/widget".parse().unwrap();
        assert_eq!(p.hostname, "example.com");
        assert!("a/b/c/d".parse::<Provider>().is_err());
        assert!("a//b".parse::<Provider>().is_err());
        assert!("a b".parse::<Provider>().is_err());
    }

    #[test]
    fn test_mr005_implied_local_name() {
        assert_eq!(Provider::implied_local_name("aws_instance"), "aws");
        assert_eq!(Provider::implied_local_name("random"), "random");
    }

    #[test]
    fn test_mr005_attribute_types() {
        let t: AttributeType = serde_json::json!(["list", ["object", {"a": "string"}]]).into();
        assert!(t.is_collection());
        let AttributeType::List(elem) = t else {
            panic!("expected list");
        };
        assert!(matches!(*elem, AttributeType::Object(_)));
        let s: AttributeType = serde_json::json!("string").into();
        assert!(!s.is_traversable());
        let d: AttributeType = serde_json::json!("dynamic").into();
        assert!(d.is_traversable());
    }

    #[test]
    fn test_mr005_registry_from_json() {
        let schemas = ProviderSchemas::from_json(AWS_SCHEMA).unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(
            schemas.providers().collect::<Vec<_>>(),
            vec![&Provider::default_for("aws")]
        );
        let aws = schemas.get(&Provider::default_for("aws")).unwrap();
        let inst = aws.resource_type(ResourceMode::Managed, "aws_instance").unwrap();
        assert_eq!(inst.version, 1);
        assert!(inst.block.attributes["ami"].required);
        assert_eq!(
            inst.block.block_types["ebs_block_device"].nesting_mode,
            NestingMode::Set
        );
        assert!(aws.resource_type(ResourceMode::Data, "aws_ami").is_some());
        assert!(aws.resource_type(ResourceMode::Managed, "aws_ami").is_none());
    }

    #[test]
    fn test_mr005_body_schema_labels_map_blocks() {
        let block: BlockSchema = serde_json::from_str(
            r#"{"block_types": {"setting": {"nesting_mode": "map", "block": {}}, "rule": {"nesting_mode": "list"}}}"#,
        )
        .unwrap();
        let bs = block.body_schema();
        assert_eq!(bs.blocks[0].label_names, vec!["key"]);
        assert!(bs.blocks[1].label_names.is_empty());
    }

    #[test]
    fn test_mr005_bad_json() {
        assert!(ProviderSchemas::from_json("{").is_err());
        assert!(ProviderSchemas::from_json(r#"{"provider_schemas": {"a/b/c/d": {}}}"#).is_err());
    }

    #[test]
    fn test_mr005_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.json");
        std::fs::write(&path, AWS_SCHEMA).unwrap();
        let schemas = ProviderSchemas::load(&path).unwrap();
        assert!(!schemas.is_empty());
        assert!(ProviderSchemas::load(&dir.path().join("missing.json")).is_err());
    }
}
