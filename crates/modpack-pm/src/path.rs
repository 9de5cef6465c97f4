//! Install-tree placement.
//!
//! Paths are relative to the pack root and always use `/`. Loaders go to
//! `loaders/`; mods are staged under `src/<dir>`, with `_CLIENT` or `_SERVER`
//! appended for one-sided entries, while `target_path` records where the file
//! lands in a finished installation.

use crate::entry::{Entry, PackageType};

pub const LOADER_DIR: &str = "loaders";
pub const SOURCE_DIR: &str = "src";
pub const MOD_DIR: &str = "mods";

/// Fill `path`, `file_path` and `target_path` from package type, side and
/// file name. `file_path` and `target_path` stay unset without a file name.
pub fn resolve_path(entry: &mut Entry) {
    let (path, target_dir) = match entry.package_type() {
        PackageType::Loader => (LOADER_DIR.to_string(), LOADER_DIR.to_string()),
        PackageType::Mod => {
            let base = entry
                .path
                .as_deref()
                .map(|p| p.trim_matches('/'))
                .filter(|p| !p.is_empty())
                .unwrap_or(MOD_DIR)
                .to_string();
            let mut staged = format!("{}/{}", SOURCE_DIR, base);
            if let Some(suffix) = entry.side().suffix() {
                staged.push('/');
                staged.push_str(suffix);
            }
            (staged, base)
        }
    };

    if let Some(file_name) = &entry.file_name {
        entry.file_path = Some(format!("{}/{}", path, file_name));
        entry.target_path = Some(format!("{}/{}", target_dir, file_name));
    }
    entry.path = Some(path);
}
