//! Raw declaration to [`Entry`].

use serde_json::Value;

use crate::entry::Entry;
use crate::provider::ProviderManager;
use crate::Result;

/// Short description of a raw declaration for log lines
fn describe(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn one raw declaration into an entry using the first matching provider.
///
/// Returns `Ok(None)` when no provider claims the declaration. Malformed
/// declarations of a claimed shape (bad side, bad pattern) are errors.
pub fn normalize_one(providers: &ProviderManager, raw: &Value) -> Result<Option<Entry>> {
    let Some(provider) = providers.find_matching(raw) else {
        return Ok(None);
    };
    let Some(decl) = provider.convert(raw) else {
        return Ok(None);
    };

    let entry = provider.entry(&decl)?;
    log::trace!("{} -> {} entry {}", describe(raw), provider.kind(), entry.label());
    Ok(Some(entry))
}

/// Normalize a pack's `mods` list, keeping declaration order. Unclaimed
/// declarations are skipped with a warning.
pub fn normalize(providers: &ProviderManager, mods: &[Value]) -> Result<Vec<Entry>> {
    let mut entries = Vec::with_capacity(mods.len());

    for raw in mods {
        match normalize_one(providers, raw)? {
            Some(entry) => entries.push(entry),
            None => log::warn!("No provider accepts declaration {}, skipping", describe(raw)),
        }
    }

    log::debug!("Normalized {} of {} declarations", entries.len(), mods.len());
    Ok(entries)
}
