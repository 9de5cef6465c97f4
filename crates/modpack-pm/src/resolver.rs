//! Duplicate merging and transitive dependency expansion.

use std::collections::{HashMap, VecDeque};

use crate::config::{DependencyPolicy, ResolutionMode};
use crate::entry::{DependencyKind, Entry, Side};
use crate::provider::ProviderManager;
use crate::Result;

/// Fold entries that share an identity into the first occurrence, keeping
/// declaration order. Entries without an identity are left alone.
pub fn merge_duplicates(entries: &mut Vec<Entry>) {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Entry> = Vec::with_capacity(entries.len());

    for entry in entries.drain(..) {
        match entry.identity() {
            Some(identity) => match first_seen.get(&identity) {
                Some(&index) => {
                    log::debug!("Merging duplicate declaration of {}", entry.label());
                    merged[index].merge_from(&entry);
                }
                None => {
                    first_seen.insert(identity, merged.len());
                    merged.push(entry);
                }
            },
            None => merged.push(entry),
        }
    }

    *entries = merged;
}

/// If an entry with `identity` already exists, widen its side to cover the
/// dependent and record the reverse edge. Returns whether one was found.
pub fn merge_into_existing(
    entries: &mut [Entry],
    identity: &str,
    kind: DependencyKind,
    dependent_name: &str,
    dependent_side: Side,
) -> bool {
    let Some(index) = entries.iter().position(|e| e.identity().as_deref() == Some(identity)) else {
        return false;
    };

    let existing = &mut entries[index];
    existing.add_provides(kind, dependent_name);
    let side = existing.side() | dependent_side;
    if existing.side != Some(side) {
        log::debug!("{}: side widened to {} by {}", existing.label(), side, dependent_name);
        existing.side = Some(side);
        widen_dependencies(entries, index);
    }
    true
}

/// Carry the side of `entries[root]` down its `depends` edges. Entries it
/// already pulled in were added with its old, narrower side.
fn widen_dependencies(entries: &mut [Entry], root: usize) {
    let mut queue: VecDeque<usize> = VecDeque::from([root]);

    while let Some(index) = queue.pop_front() {
        let side = entries[index].side();
        let names: Vec<String> = entries[index].dependency_names().map(str::to_string).collect();

        for name in names {
            let Some(dep) = entries.iter().position(|e| e.name.as_deref() == Some(name.as_str())) else {
                continue;
            };
            let widened = entries[dep].side() | side;
            if entries[dep].side != Some(widened) {
                log::debug!("{}: side widened to {}", entries[dep].label(), widened);
                entries[dep].side = Some(widened);
                queue.push_back(dep);
            }
        }
    }
}

/// Ask each entry's provider to expand its dependencies.
///
/// The entry list doubles as a FIFO work queue: new dependencies are appended
/// and, in [`ResolutionMode::FixedPoint`], expanded in turn once the cursor
/// reaches them. [`ResolutionMode::SinglePass`] stops at the entries present
/// when the pass started.
pub async fn resolve_dependencies(
    providers: &ProviderManager,
    entries: &mut Vec<Entry>,
    mode: ResolutionMode,
    policy: &DependencyPolicy,
) -> Result<()> {
    let initial = entries.len();
    let mut cursor = 0;

    while cursor < entries.len() {
        if mode == ResolutionMode::SinglePass && cursor >= initial {
            log::debug!(
                "Single pass: {} appended entries left unexpanded",
                entries.len() - initial
            );
            break;
        }

        let provider = providers.get(entries[cursor].kind)?;
        provider.resolve_dependencies(cursor, entries, policy).await?;
        cursor += 1;
    }

    log::debug!("Dependency resolution: {} declared, {} total", initial, entries.len());
    Ok(())
}
