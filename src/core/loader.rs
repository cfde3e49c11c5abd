//! MR-008: Module tree loading.
//!
//! A module is a directory of `*.yaml` / `*.yml` files. Files are read in
//! name order and merged. Module calls with a local source (`./x`, `../x`)
//! are loaded recursively; other sources are skipped.

use super::error::{LoadError, Result};
use super::parser::parse_module_file;
use super::types::{Config, ModuleConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Load the module tree rooted at `dir`.
pub fn load_config(dir: &Path) -> Result<Config> {
    let mut stack = Vec::new();
    load_node(dir, Vec::new(), &mut stack)
}

/// Load and merge the files of a single module directory.
pub fn load_module_dir(dir: &Path) -> Result<ModuleConfig> {
    let mut module = ModuleConfig::default();
    for path in module_files(dir)? {
        debug!(file = %path.display(), "parsing module file");
        let parsed = parse_module_file(&path)?;
        module.merge(parsed, &path.display().to_string())?;
    }
    Ok(module)
}

fn load_node(dir: &Path, path: Vec<String>, stack: &mut Vec<PathBuf>) -> Result<Config> {
    let canonical = dir.canonicalize().map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    if let Some(pos) = stack.iter().position(|p| *p == canonical) {
        let chain: Vec<String> = stack[pos..]
            .iter()
            .chain(std::iter::once(&canonical))
            .map(|p| p.display().to_string())
            .collect();
        return Err(LoadError::ModuleCycle(chain.join(" -> ")));
    }

    let module = load_module_dir(dir)?;
    let mut node = Config {
        path: path.clone(),
        source_dir: Some(canonical.clone()),
        module,
        children: Default::default(),
    };
    info!(
        module = %node.display_path(),
        dir = %canonical.display(),
        variables = node.module.variables.len(),
        outputs = node.module.outputs.len(),
        resources = node.module.resources().count(),
        "loaded module"
    );

    stack.push(canonical);
    let calls: Vec<(String, String, bool)> = node
        .module
        .module_calls
        .values()
        .map(|c| (c.name.clone(), c.source.clone(), c.is_local_source()))
        .collect();
    for (name, source, local) in calls {
        if !local {
            warn!(call = %name, source = %source, "skipping module call with non-local source");
            continue;
        }
        let mut child_path = path.clone();
        child_path.push(name.clone());
        let child = load_node(&dir.join(&source), child_path, stack)?;
        node.children.insert(name, child);
    }
    stack.pop();

    Ok(node)
}

fn module_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut files = Vec::new();
    for ext in ["yaml", "yml"] {
        for entry in glob::glob(&format!("{}/*.{}", base, ext))? {
            let path = entry.map_err(|e| LoadError::Io {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
