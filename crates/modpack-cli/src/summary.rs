//! End-of-run report.

use console::style;
use modpack_pm::{ModpackError, PackOutcome, PackResult};

fn print_pack(result: &PackResult, dry_run: bool) {
    for entry in &result.entries {
        let location = entry.file_path.as_deref().unwrap_or("-");
        let marker = if entry.transient { style("+").dim() } else { style("-").green() };
        println!(
            "  {} {} {} {}",
            marker,
            style(entry.label()).cyan(),
            style(entry.side()).dim(),
            style(location).dim()
        );
    }

    if !result.features.is_empty() {
        println!("  {}", style("Features:").white().bold());
        for feature in &result.features {
            println!(
                "    {} ({})",
                style(&feature.name).yellow(),
                feature.entry_refs.join(", ")
            );
        }
    }

    if !dry_run {
        println!(
            "  {} files placed, {} from cache",
            result.downloads.len(),
            result.from_cache()
        );
    }
}

fn print_error(error: &ModpackError) {
    match error {
        ModpackError::MissingFields { stage, entries } => {
            eprintln!("  {} incomplete entries after {}", style("Error:").red().bold(), stage);
            for missing in entries {
                eprintln!("    {}\n      is missing {}", missing.entry, missing.keys.join(", "));
            }
        }
        other => eprintln!("  {} {}", style("Error:").red().bold(), other),
    }
}

/// Print every outcome; returns the number of failed packs
pub fn print_outcomes(outcomes: &[PackOutcome], dry_run: bool) -> usize {
    let mut failed = 0;

    for outcome in outcomes {
        match &outcome.result {
            Ok(result) => {
                println!(
                    "{} {} ({} entries)",
                    style("✓").green().bold(),
                    style(&outcome.name).bold(),
                    result.entries.len()
                );
                print_pack(result, dry_run);
            }
            Err(e) => {
                failed += 1;
                println!("{} {}", style("✗").red().bold(), style(&outcome.name).bold());
                print_error(e);
            }
        }
    }

    failed
}
