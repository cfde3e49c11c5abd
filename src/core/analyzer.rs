//! MR-010: Meta-reference analysis.
//!
//! Given a reference found in some module, finds the references made by the
//! definition of the object it points at, and the module those must be
//! interpreted in. Only one hop is taken; a caller building the transitive
//! closure repeats the lookup on each result.
//!
//! Missing modules, declarations and schemas all yield an empty result.

use super::addrs::{
    AbsModuleCallOutput, InputVariable, ModuleInstance, Reference, ResourceInstance, Subject,
};
use super::body::BodySchema;
use super::narrow::narrow;
use super::schema::ProviderSchemas;
use super::types::{Config, ModuleConfig};
use tracing::debug;

/// Read-only view over a module tree and the provider schemas it uses.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer<'a> {
    config: &'a Config,
    provider_schemas: &'a ProviderSchemas,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a Config, provider_schemas: &'a ProviderSchemas) -> Self {
        Self {
            config,
            provider_schemas,
        }
    }

    /// Module declarations for a module instance; instance keys are ignored.
    pub fn module_config(&self, addr: &ModuleInstance) -> Option<&'a ModuleConfig> {
        self.config.descendent_for_instance(addr).map(|c| &c.module)
    }

    /// Direct references made by the definition of `reference`'s subject,
    /// where `reference` appeared in module `module_addr`.
    pub fn meta_references(
        &self,
        module_addr: &ModuleInstance,
        reference: &Reference,
    ) -> (ModuleInstance, Vec<Reference>) {
        match &reference.subject {
            Subject::InputVariable(var) => self.input_variable(module_addr, var),
            Subject::ModuleCallOutput(output) => self.module_output(module_addr, output),
            Subject::ResourceInstance(instance) => (
                module_addr.clone(),
                self.resource_instance(module_addr, instance, reference),
            ),
            Subject::Other(_) => (module_addr.clone(), Vec::new()),
        }
    }

    /// A variable's value is set by the call in the parent module.
    fn input_variable(
        &self,
        module_addr: &ModuleInstance,
        var: &InputVariable,
    ) -> (ModuleInstance, Vec<Reference>) {
        let Some((caller_addr, call_step)) = module_addr.call() else {
            // root variables come from outside the configuration
            return (module_addr.clone(), Vec::new());
        };
        let Some(caller) = self.module_config(&caller_addr) else {
            debug!(module = %caller_addr, "calling module not found");
            return (caller_addr, Vec::new());
        };
        let Some(call) = caller.module_calls.get(&call_step.name) else {
            debug!(module = %caller_addr, call = %call_step.name, "module call not found");
            return (caller_addr, Vec::new());
        };

        let (content, _diags) = call
            .config
            .partial_content(&BodySchema::single_attribute(&var.name))
            .into_parts();
        let refs = match content.attributes.get(&var.name) {
            Some(attr) => {
                let (refs, _diags) = attr.expr.references().into_parts();
                refs
            }
            None => Vec::new(),
        };
        (caller_addr, refs)
    }

    /// An output's value is defined inside the called module.
    fn module_output(
        &self,
        module_addr: &ModuleInstance,
        output: &AbsModuleCallOutput,
    ) -> (ModuleInstance, Vec<Reference>) {
        let callee_addr = module_addr.child(&output.call.name, output.call.key.clone());
        let Some(callee) = self.module_config(&callee_addr) else {
            debug!(module = %callee_addr, "called module not found");
            return (callee_addr, Vec::new());
        };
        let Some(decl) = callee.outputs.get(&output.name) else {
            debug!(module = %callee_addr, output = %output.name, "output not found");
            return (callee_addr, Vec::new());
        };
        let (refs, _diags) = decl.expr.references().into_parts();
        (callee_addr, refs)
    }

    fn resource_instance(
        &self,
        module_addr: &ModuleInstance,
        instance: &ResourceInstance,
        reference: &Reference,
    ) -> Vec<Reference> {
        let Some(module) = self.module_config(module_addr) else {
            debug!(module = %module_addr, "module not found");
            return Vec::new();
        };
        let Some(rc) = module.resource_by_addr(&instance.resource) else {
            debug!(module = %module_addr, resource = %instance.resource, "resource not found");
            return Vec::new();
        };
        let Some(schema) = self
            .provider_schemas
            .get(&rc.provider)
            .and_then(|p| p.resource_type(rc.addr.mode, &rc.addr.type_name))
        else {
            debug!(
                resource = %instance.resource,
                provider = %rc.provider,
                "no schema for resource type"
            );
            return Vec::new();
        };
        narrow(&rc.config, &schema.block, &reference.remaining)
    }
}
