use crate::config::{AttackDedup, MergeConfig};
use crate::events::{CombatEvent, EventKind};

/// Pairs of digits OCR swaps often enough that they do not count as a difference.
const CONFUSABLE_DIGITS: &[(char, char)] = &[('6', '0')];

fn confusable(a: char, b: char) -> bool {
    CONFUSABLE_DIGITS
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
}

/// Whether two damage strings are plausibly the same reading.
///
/// Equal strings match. Otherwise lengths must agree and the share of
/// differing positions (confusable digit pairs excluded) must stay within
/// `max_mismatch_ratio`.
pub fn numbers_similar(a: &str, b: &str, max_mismatch_ratio: f64) -> bool {
    if a == b {
        return true;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len() != b.len() || a.is_empty() {
        return false;
    }

    let mismatches = a
        .iter()
        .zip(&b)
        .filter(|(x, y)| x != y && !confusable(**x, **y))
        .count();
    mismatches as f64 / a.len() as f64 <= max_mismatch_ratio
}

/// Folds per-frame event lists into one log, dropping frame stutter.
pub struct FrameMerger {
    config: MergeConfig,
}

impl FrameMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn similar(&self, a: &EventKind, b: &EventKind) -> bool {
        match (a, b) {
            (EventKind::Hit { damage: da, .. }, EventKind::Hit { damage: db, .. }) => {
                numbers_similar(da, db, self.config.max_mismatch_ratio)
            }
            (EventKind::Attack { .. }, EventKind::Attack { .. }) => match self.config.attack_dedup {
                AttackDedup::Never => false,
                AttackDedup::Exact => a == b,
            },
            _ => false,
        }
    }

    /// Append the genuinely new events of `next` to `canonical`.
    ///
    /// Each incoming event is checked against the last ⌊window_factor × len(next)⌋
    /// entries of the log as it stood before this frame, so events of the
    /// same frame never suppress each other.
    pub fn merge(&self, canonical: &mut Vec<CombatEvent>, next: Vec<CombatEvent>) {
        let window = (self.config.window_factor * next.len() as f64) as usize;
        let start = canonical.len().saturating_sub(window);
        let end = canonical.len();

        for event in next {
            let repeat = canonical[start..end]
                .iter()
                .rev()
                .any(|seen| self.similar(&seen.kind, &event.kind));
            if !repeat {
                canonical.push(event);
            }
        }
    }

    /// Left fold over frames in ascending frame order.
    pub fn merge_all<I>(&self, frames: I) -> Vec<CombatEvent>
    where
        I: IntoIterator<Item = Vec<CombatEvent>>,
    {
        let mut canonical = Vec::new();
        for frame in frames {
            self.merge(&mut canonical, frame);
        }
        canonical
    }
}
