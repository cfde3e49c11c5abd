//! MR-001: Address model.
//!
//! Immutable value types that identify module instances and the objects a
//! reference can point at. All types compare structurally and can be used
//! as map keys.

use super::error::ParseError;
use super::expr;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Instance keys and traversal steps
// ============================================================================

/// Key selecting one instance of a `count` or `for_each` object, or one
/// element of a collection in a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "[{}]", i),
            Self::Str(s) => write!(f, "[\"{}\"]", QuotedStr(s)),
        }
    }
}

/// String contents escaped for an HCL quoted string.
struct QuotedStr<'a>(&'a str);

impl fmt::Display for QuotedStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = self.0.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                // `${` and `%{` would open a template sequence
                '$' | '%' if chars.peek() == Some(&'{') => write!(f, "{}{}", c, c)?,
                c if c.is_control() => write!(f, "\\u{:04X}", c as u32)?,
                c => write!(f, "{}", c)?,
            }
        }
        Ok(())
    }
}

/// One access step applied after a reference's subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TraversalStep {
    Attr(String),
    Index(InstanceKey),
}

impl fmt::Display for TraversalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attr(name) => write!(f, ".{}", name),
            Self::Index(key) => write!(f, "{}", key),
        }
    }
}

// ============================================================================
// Module instances
// ============================================================================

/// One call step in a module instance path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: Option<InstanceKey>,
}

impl fmt::Display for ModuleInstanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module.{}", self.name)?;
        if let Some(ref key) = self.key {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// Address of a module instance: the call steps from the root module.
/// The empty path is the root module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleInstance(Vec<ModuleInstanceStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn steps(&self) -> &[ModuleInstanceStep] {
        &self.0
    }

    /// Address of the instance created by calling `name` from this module.
    pub fn child(&self, name: &str, key: Option<InstanceKey>) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.to_string(),
            key,
        });
        Self(steps)
    }

    /// Split into the module containing the call and the call step itself.
    /// Returns `None` for the root module, which has no caller.
    pub fn call(&self) -> Option<(ModuleInstance, ModuleInstanceStep)> {
        let (last, parent) = self.0.split_last()?;
        Some((Self(parent.to_vec()), last.clone()))
    }

    /// Static module path (call names with instance keys dropped).
    pub fn module_path(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.name.as_str()).collect()
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleInstance {
    type Err = ParseError;

    /// Parse `module.a["x"].module.b`. The empty string and `root` both
    /// name the root module.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "root" {
            return Ok(Self::root());
        }
        let traversal = expr::parse_traversal(s)
            .ok_or_else(|| ParseError::new("module address", s, "not a traversal"))?;
        if traversal.root != "module" {
            return Err(ParseError::new(
                "module address",
                s,
                "must start with \"module.\"",
            ));
        }

        let mut steps = Vec::new();
        let mut rest = traversal.steps.as_slice();
        loop {
            let name = match rest.first() {
                Some(TraversalStep::Attr(name)) => name.clone(),
                _ => {
                    return Err(ParseError::new(
                        "module address",
                        s,
                        "expected a module call name after \"module\"",
                    ))
                }
            };
            rest = &rest[1..];
            let key = match rest.first() {
                Some(TraversalStep::Index(key)) => {
                    rest = &rest[1..];
                    Some(key.clone())
                }
                _ => None,
            };
            steps.push(ModuleInstanceStep { name, key });

            match rest.first() {
                None => break,
                Some(TraversalStep::Attr(kw)) if kw == "module" => rest = &rest[1..],
                Some(other) => {
                    return Err(ParseError::new(
                        "module address",
                        s,
                        format!("unexpected \"{}\"", other),
                    ))
                }
            }
        }
        Ok(Self(steps))
    }
}

// ============================================================================
// Reference subjects
// ============================================================================

/// Resource mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceMode {
    Managed,
    Data,
}

/// A resource declaration address within a module (`aws_vpc.main`,
/// `data.aws_ami.ubuntu`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
}

impl Resource {
    pub fn managed(type_name: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    pub fn data(type_name: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    /// The `TYPE.NAME` key used in a module's resource tables.
    pub fn key(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }

    pub fn instance(&self, key: Option<InstanceKey>) -> ResourceInstance {
        ResourceInstance {
            resource: self.clone(),
            key,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

/// One instance of a resource. Instance keys affect addressing only; all
/// instances share the resource's configuration and schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceInstance {
    pub resource: Resource,
    pub key: Option<InstanceKey>,
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        if let Some(ref key) = self.key {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// `var.NAME`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputVariable {
    pub name: String,
}

/// `module.NAME` or `module.NAME[KEY]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCallInstance {
    pub name: String,
    pub key: Option<InstanceKey>,
}

impl fmt::Display for ModuleCallInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module.{}", self.name)?;
        if let Some(ref key) = self.key {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// `module.CALL[KEY].OUTPUT`, seen from the calling module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbsModuleCallOutput {
    pub call: ModuleCallInstance,
    pub name: String,
}

/// Subjects the analyzer does not look into. None of them is derived from
/// other configuration expressions in a way the analyzer models.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OtherSubject {
    LocalValue(String),
    PathAttr(String),
    TerraformAttr(String),
    CountAttr(String),
    ForEachAttr(String),
    SelfRef,
    ModuleCall(ModuleCallInstance),
}

impl fmt::Display for OtherSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalValue(n) => write!(f, "local.{}", n),
            Self::PathAttr(n) => write!(f, "path.{}", n),
            Self::TerraformAttr(n) => write!(f, "terraform.{}", n),
            Self::CountAttr(n) => write!(f, "count.{}", n),
            Self::ForEachAttr(n) => write!(f, "each.{}", n),
            Self::SelfRef => write!(f, "self"),
            Self::ModuleCall(call) => write!(f, "{}", call),
        }
    }
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    InputVariable(InputVariable),
    ModuleCallOutput(AbsModuleCallOutput),
    ResourceInstance(ResourceInstance),
    Other(OtherSubject),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputVariable(v) => write!(f, "var.{}", v.name),
            Self::ModuleCallOutput(o) => write!(f, "{}.{}", o.call, o.name),
            Self::ResourceInstance(ri) => write!(f, "{}", ri),
            Self::Other(o) => write!(f, "{}", o),
        }
    }
}

/// A subject plus the traversal steps applied after it, e.g.
/// `aws_instance.web.tags["Name"]` is the resource instance `aws_instance.web`
/// with remaining steps `.tags["Name"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub subject: Subject,
    pub remaining: Vec<TraversalStep>,
}

impl Reference {
    pub fn new(subject: Subject, remaining: Vec<TraversalStep>) -> Self {
        Self { subject, remaining }
    }

    pub fn input_variable(name: &str) -> Self {
        Self::new(
            Subject::InputVariable(InputVariable {
                name: name.to_string(),
            }),
            Vec::new(),
        )
    }

    pub fn module_output(call: &str, key: Option<InstanceKey>, name: &str) -> Self {
        Self::new(
            Subject::ModuleCallOutput(AbsModuleCallOutput {
                call: ModuleCallInstance {
                    name: call.to_string(),
                    key,
                },
                name: name.to_string(),
            }),
            Vec::new(),
        )
    }

    pub fn resource_instance(instance: ResourceInstance) -> Self {
        Self::new(Subject::ResourceInstance(instance), Vec::new())
    }

    pub fn with_remaining(mut self, remaining: Vec<TraversalStep>) -> Self {
        self.remaining = remaining;
        self
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subject)?;
        for step in &self.remaining {
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let traversal = expr::parse_traversal(s)
            .ok_or_else(|| ParseError::new("reference", s, "not a traversal"))?;
        expr::parse_ref(&traversal)
            .map_err(|diag| ParseError::new("reference", s, diag.detail))
    }
}

// ============================================================================
// Tests
// ============================================================================
