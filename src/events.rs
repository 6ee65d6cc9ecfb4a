use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HIT_RE: Regex = Regex::new(
        r"^\(Combat\): You hit (.+?) for ([\d,]+) points of (.+?) damage\.?\s*$"
    )
    .expect("hit pattern");
    static ref ATTACK_RE: Regex = Regex::new(
        r"^\(Combat\): You attack (.+?)\. You roll a (\d+) \(\+(\d+)\): you (critical hit|hit|miss)!*\s*$"
    )
    .expect("attack pattern");
    static ref MISS_RE: Regex = Regex::new(
        r"^\(Combat\): You attack (.+?)\. You roll a (\d+); you miss!*\s*$"
    )
    .expect("miss pattern");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
    CriticalHit,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Miss => "miss",
            Outcome::CriticalHit => "critical hit",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "hit" => Some(Outcome::Hit),
            "miss" => Some(Outcome::Miss),
            "critical hit" => Some(Outcome::CriticalHit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Attack {
        target: String,
        roll: String,
        /// Absent on the short miss form, which prints no bonus.
        bonus: Option<String>,
        outcome: Outcome,
    },
    Hit {
        target: String,
        /// Digits only, thousands separators stripped.
        damage: String,
        damage_type: String,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Attack { .. } => "attack",
            EventKind::Hit { .. } => "hit",
        }
    }

    /// Extracted fields in log order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            EventKind::Attack {
                target,
                roll,
                bonus: Some(bonus),
                outcome,
            } => vec![target.as_str(), roll.as_str(), bonus.as_str(), outcome.as_str()],
            EventKind::Attack {
                target,
                roll,
                bonus: None,
                outcome,
            } => vec![target.as_str(), roll.as_str(), outcome.as_str()],
            EventKind::Hit {
                target,
                damage,
                damage_type,
            } => vec![target.as_str(), damage.as_str(), damage_type.as_str()],
        }
    }

    /// The clean combat-log sentence for this event.
    pub fn render(&self) -> String {
        match self {
            EventKind::Attack {
                target,
                roll,
                bonus: Some(bonus),
                outcome,
            } => format!(
                "(Combat): You attack {target}. You roll a {roll} (+{bonus}): you {}!",
                outcome.as_str()
            ),
            EventKind::Attack {
                target,
                roll,
                bonus: None,
                ..
            } => format!("(Combat): You attack {target}. You roll a {roll}; you miss!"),
            EventKind::Hit {
                target,
                damage,
                damage_type,
            } => format!(
                "(Combat): You hit {target} for {damage} points of {damage_type} damage."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombatEvent {
    pub frame: u64,
    pub timestamp: f64,
    pub kind: EventKind,
}

pub fn strip_separators(digits: &str) -> String {
    digits.chars().filter(|c| *c != ',').collect()
}

/// Classify a combat line. Hit damage is tried first, then attack rolls.
///
/// Patterns are anchored at both ends; lines matching neither yield `None`.
pub fn parse_event(line: &str) -> Option<EventKind> {
    if let Some(caps) = HIT_RE.captures(line) {
        return Some(EventKind::Hit {
            target: caps[1].to_string(),
            damage: strip_separators(&caps[2]),
            damage_type: caps[3].to_string(),
        });
    }
    if let Some(caps) = ATTACK_RE.captures(line) {
        return Some(EventKind::Attack {
            target: caps[1].to_string(),
            roll: caps[2].to_string(),
            bonus: Some(caps[3].to_string()),
            outcome: Outcome::from_word(&caps[4])?,
        });
    }
    if let Some(caps) = MISS_RE.captures(line) {
        return Some(EventKind::Attack {
            target: caps[1].to_string(),
            roll: caps[2].to_string(),
            bonus: None,
            outcome: Outcome::Miss,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_damage_separators_are_stripped() {
        let kind =
            parse_event("(Combat): You hit Goblin for 1,200 points of fire damage.").unwrap();
        assert_eq!(
            kind,
            EventKind::Hit {
                target: "Goblin".into(),
                damage: "1200".into(),
                damage_type: "fire".into(),
            }
        );

        let kind = parse_event("(Combat): You hit Rat for 12 points of cold damage.").unwrap();
        assert_eq!(kind.fields(), vec!["Rat", "12", "cold"]);
    }

    #[test]
    fn attack_roll_variants() {
        let hit = parse_event("(Combat): You attack Orc. You roll a 15 (+7): you hit!").unwrap();
        assert_eq!(hit.fields(), vec!["Orc", "15", "7", "hit"]);

        let crit = parse_event(
            "(Combat): You attack Ogre Mage. You roll a 20 (+11): you critical hit!",
        )
        .unwrap();
        assert_eq!(crit.fields(), vec!["Ogre Mage", "20", "11", "critical hit"]);

        let miss = parse_event("(Combat): You attack Orc. You roll a 3; you miss!").unwrap();
        assert_eq!(miss.fields(), vec!["Orc", "3", "miss"]);
        assert_eq!(miss.type_name(), "attack");
    }

    #[test]
    fn every_match_is_exactly_one_type() {
        let lines = [
            "(Combat): You hit Orc for 500 points of slashing damage.",
            "(Combat): You attack Orc. You roll a 15 (+7): you hit!",
            "(Combat): You attack Orc. You roll a 3; you miss!",
        ];
        for line in lines {
            let hits = HIT_RE.is_match(line) as u8;
            let attacks = (ATTACK_RE.is_match(line) || MISS_RE.is_match(line)) as u8;
            assert_eq!(hits + attacks, 1, "{line}");
        }
    }

    #[test]
    fn patterns_are_anchored() {
        assert!(parse_event("xx(Combat): You hit Orc for 5 points of fire damage.").is_none());
        assert!(parse_event("(Combat): You hit Orc for 5 points of fire damage. extra").is_none());
        assert!(parse_event("(Combat): You hit Orc for five points of fire damage.").is_none());
        assert!(parse_event("(Cornbat): You attack Orc. You roll a 3; you miss!").is_none());
    }

    #[test]
    fn render_round_trips_through_the_parser() {
        let line = "(Combat): You attack Orc. You roll a 15 (+7): you critical hit!";
        let kind = parse_event(line).unwrap();
        assert_eq!(kind.render(), line);
        assert_eq!(parse_event(&kind.render()), Some(kind));
    }
}
