use anyhow::{Context, Result};
use std::io::BufRead;
use tracing::warn;

/// Column of the canonical log (1-based, split on `|`) holding hit damage.
const DAMAGE_COLUMN: usize = 5;

/// Sum the damage column over every `Type: hit` row.
///
/// Rows whose damage does not parse are reported and count as zero.
pub fn sum_hits<R: BufRead>(input: R) -> Result<i64> {
    let mut total: i64 = 0;

    for (number, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("read error at line {}", number + 1))?;
        if !line.contains("Type: hit") {
            continue;
        }

        let damage = line
            .split('|')
            .nth(DAMAGE_COLUMN - 1)
            .map(str::trim)
            .unwrap_or_default();
        match damage.parse::<i64>() {
            Ok(value) => total = total.saturating_add(value),
            Err(e) => warn!("Invalid number in line {}: {:?} ({})", number + 1, line, e),
        }
    }

    Ok(total)
}
