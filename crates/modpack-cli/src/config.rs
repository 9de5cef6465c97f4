//! `modpack.toml` loading.
//!
//! ```toml
//! [defaults]
//! game_version = "1.12.2"
//! loader_version = "recommended"
//!
//! [packs.example]
//! mods = ["Applied Energistics 2", 223794, { type = "direct", url = "https://..." }]
//! ```
//!
//! Every pack starts from `[defaults]`, then `packs/<name>.toml` next to the
//! config file, then its `[packs.<name>]` table; later tables win key by key.

use anyhow::{bail, Context, Result};
use modpack_pm::PackConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use toml::Value;

const PACK_DIR: &str = "packs";

/// Recursively overlay `overlay` onto `base`. Tables merge, anything else
/// replaces.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base), Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn read_table(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(value)
}

/// Relative output, cache and local paths are taken from the config directory
fn anchor(path: &mut Option<PathBuf>, dir: &Path) {
    if let Some(p) = path {
        let raw = p.to_string_lossy();
        if p.is_relative() && !raw.starts_with('~') && !raw.starts_with('$') {
            *p = dir.join(&*p);
        }
    }
}

fn build_pack(name: &str, value: Value, dir: &Path) -> Result<Option<PackConfig>> {
    let enabled = value.get("enabled").and_then(Value::as_bool).unwrap_or(true);
    if !enabled {
        log::info!("Pack '{}' is disabled, skipping", name);
        return Ok(None);
    }

    let mut config: PackConfig = value
        .try_into()
        .with_context(|| format!("Invalid configuration for pack '{}'", name))?;
    if config.name.is_empty() {
        config.name = name.to_string();
    }

    let mut output = Some(config.output.clone());
    anchor(&mut output, dir);
    if let Some(output) = output {
        config.output = output;
    }
    anchor(&mut config.cache_dir, dir);
    anchor(&mut config.local_base, dir);
    config.local_base.get_or_insert_with(|| dir.to_path_buf());

    Ok(Some(config))
}

/// Load every enabled pack, or only the ones named in `selected`
pub fn load_packs(path: &Path, selected: &[String]) -> Result<Vec<PackConfig>> {
    let root = read_table(path)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let defaults = root.get("defaults").cloned().unwrap_or_else(|| Value::Table(Default::default()));

    let mut tables: BTreeMap<String, Value> = BTreeMap::new();
    let pack_dir = dir.join(PACK_DIR);
    if pack_dir.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&pack_dir)
            .with_context(|| format!("Failed to list {}", pack_dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "toml"))
            .collect();
        files.sort();
        for file in files {
            if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                tables.insert(stem.to_string(), read_table(&file)?);
            }
        }
    }
    if let Some(Value::Table(packs)) = root.get("packs") {
        for (name, table) in packs {
            match tables.get_mut(name) {
                Some(existing) => merge(existing, table.clone()),
                None => {
                    tables.insert(name.clone(), table.clone());
                }
            }
        }
    }

    for name in selected {
        if !tables.contains_key(name) {
            bail!("No pack named '{}' in {}", name, path.display());
        }
    }

    let mut packs = Vec::new();
    for (name, table) in tables {
        if !selected.is_empty() && !selected.contains(&name) {
            continue;
        }
        let mut value = defaults.clone();
        merge(&mut value, table);
        if let Some(config) = build_pack(&name, value, &dir)? {
            packs.push(config);
        }
    }

    if packs.is_empty() {
        log::warn!("No enabled packs in {}", path.display());
    }
    Ok(packs)
}
