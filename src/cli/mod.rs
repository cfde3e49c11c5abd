//! MR-011: CLI subcommands: validate, modules, refs.

use crate::core::addrs::{ModuleInstance, Reference};
use crate::core::analyzer::Analyzer;
use crate::core::schema::ProviderSchemas;
use crate::core::types::Config;
use crate::core::{loader, parser};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a module tree and check its references
    Validate {
        /// Root module directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// List the modules of a loaded tree
    Modules {
        /// Root module directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Show the references made by the definition behind a reference
    Refs {
        /// Root module directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Provider schemas (output of `providers schema -json`)
        #[arg(short, long)]
        schemas: Option<PathBuf>,

        /// Module instance the reference appears in (e.g. module.net["a"])
        #[arg(short, long, default_value = "")]
        module: String,

        /// The reference, e.g. var.cidr or aws_instance.web.ami
        reference: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { dir } => cmd_validate(&dir),
        Commands::Modules { dir } => cmd_modules(&dir),
        Commands::Refs {
            dir,
            schemas,
            module,
            reference,
            json,
        } => cmd_refs(&dir, schemas.as_deref(), &module, &reference, json),
    }
}

fn load(dir: &Path) -> Result<Config, String> {
    loader::load_config(dir).map_err(|e| e.to_string())
}

fn cmd_validate(dir: &Path) -> Result<(), String> {
    let config = load(dir)?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        let resources: usize = config
            .walk()
            .iter()
            .map(|c| c.module.resources().count())
            .sum();
        println!(
            "OK: {} ({} modules, {} resources)",
            dir.display(),
            config.walk().len(),
            resources
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

fn cmd_modules(dir: &Path) -> Result<(), String> {
    let config = load(dir)?;
    for node in config.walk() {
        let m = &node.module;
        println!(
            "{} ({} variables, {} outputs, {} calls, {} resources)",
            node.display_path(),
            m.variables.len(),
            m.outputs.len(),
            m.module_calls.len(),
            m.resources().count()
        );
    }
    Ok(())
}

fn cmd_refs(
    dir: &Path,
    schemas: Option<&Path>,
    module: &str,
    reference: &str,
    json: bool,
) -> Result<(), String> {
    let config = load(dir)?;
    let schemas = match schemas {
        Some(path) => ProviderSchemas::load(path).map_err(|e| e.to_string())?,
        None => ProviderSchemas::new(),
    };
    for provider in schemas.providers() {
        debug!(%provider, "provider schema loaded");
    }
    let module_addr: ModuleInstance = module.parse().map_err(|e| format!("{}", e))?;
    let reference: Reference = reference.parse().map_err(|e| format!("{}", e))?;

    let analyzer = Analyzer::new(&config, &schemas);
    let (result_module, refs) = analyzer.meta_references(&module_addr, &reference);
    println!("{}", render_refs(&result_module, &refs, json));
    Ok(())
}

fn module_label(addr: &ModuleInstance) -> String {
    if addr.is_root() {
        "<root>".to_string()
    } else {
        addr.to_string()
    }
}

fn render_refs(module: &ModuleInstance, refs: &[Reference], json: bool) -> String {
    if json {
        let value = serde_json::json!({
            "module": module.to_string(),
            "references": refs.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
        });
        return value.to_string();
    }
    let mut out = format!("module: {}", module_label(module));
    if refs.is_empty() {
        out.push_str("\n  (no references)");
    }
    for r in refs {
        out.push_str(&format!("\n  {}", r));
    }
    out
}
