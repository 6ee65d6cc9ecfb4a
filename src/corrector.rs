use tracing::debug;

use crate::align::{aligner_for, find_max_matching_index, FragmentAligner};
use crate::config::CorrectionConfig;
use crate::events::{parse_event, EventKind};

/// Fixed literal pieces of one combat-log sentence, in line order.
///
/// The first and last fragments are the anchors checked before any
/// correction is written.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    pub fragments: &'static [&'static str],
}

impl Template {
    fn anchors(&self) -> impl Iterator<Item = &'static str> {
        let first = self.fragments.first().copied();
        let last = self.fragments.last().copied();
        first.into_iter().chain(last)
    }
}

pub const HIT_DAMAGE: Template = Template {
    name: "hit damage",
    fragments: &["(Combat): You hit ", " for ", " points of ", " damage."],
};

pub const ATTACK_CRITICAL: Template = Template {
    name: "critical attack",
    fragments: &["(Combat): You attack ", ". You roll a ", " (+", "): you critical hit!"],
};

pub const ATTACK_HIT: Template = Template {
    name: "attack hit",
    fragments: &["(Combat): You attack ", ". You roll a ", " (+", "): you hit!"],
};

pub const ATTACK_MISS: Template = Template {
    name: "attack miss",
    fragments: &["(Combat): You attack ", ". You roll a ", "; you miss!"],
};

/// Tried in this order; the first template whose corrected line parses wins.
pub const TEMPLATES: [Template; 4] = [HIT_DAMAGE, ATTACK_CRITICAL, ATTACK_HIT, ATTACK_MISS];

/// Repairs literal scaffolding of OCR'd combat lines and classifies them.
pub struct LineCorrector {
    aligner: Box<dyn FragmentAligner>,
    anchor_threshold: f64,
}

impl LineCorrector {
    pub fn new(config: &CorrectionConfig) -> Self {
        Self {
            aligner: aligner_for(config.aligner),
            anchor_threshold: config.anchor_threshold,
        }
    }

    /// Write every fragment of `template` into `line`, each pass on top of the
    /// previous one. `None` when an anchor does not clear the threshold.
    pub fn apply_template(&self, template: &Template, line: &str) -> Option<String> {
        let anchored = template
            .anchors()
            .all(|anchor| find_max_matching_index(anchor, line) > self.anchor_threshold);
        if !anchored {
            return None;
        }

        let corrected = template
            .fragments
            .iter()
            .fold(line.to_string(), |acc, fragment| self.aligner.align(fragment, &acc));
        Some(corrected)
    }

    /// Corrected event for `line`, or `None` when nothing recognizable is left.
    pub fn correct(&self, line: &str) -> Option<EventKind> {
        for template in &TEMPLATES {
            let Some(corrected) = self.apply_template(template, line) else {
                continue;
            };
            if let Some(kind) = parse_event(&corrected) {
                debug!("corrected as {}: {:?} -> {:?}", template.name, line, corrected);
                return Some(kind);
            }
        }

        let raw = parse_event(line);
        if raw.is_none() {
            debug!("unrecognized combat line dropped: {:?}", line);
        }
        raw
    }
}

impl Default for LineCorrector {
    fn default() -> Self {
        Self::new(&CorrectionConfig::default())
    }
}
