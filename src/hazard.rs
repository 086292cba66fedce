//! Hazard rule table.
//!
//! Rules are evaluated in declaration order and the first one that matches
//! decides the level. Later rules are never consulted, even when they would
//! also match. No rule matching means `Low`.

use crate::{HazardLevel, SignalColor};

pub const VEHICLE_ON_TRACK: &str = "vehicle_on_track";
pub const ROCK: &str = "rock";
pub const RAIL_DAMAGE: &str = "rail_damage";
pub const PERSON: &str = "person";

/// One row of the hazard table.
pub struct HazardRule {
    pub name: &'static str,
    pub level: HazardLevel,
    applies: fn(&[String], SignalColor) -> bool,
}

impl HazardRule {
    pub fn applies(&self, labels: &[String], signal: SignalColor) -> bool {
        (self.applies)(labels, signal)
    }
}

impl std::fmt::Debug for HazardRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HazardRule")
            .field("name", &self.name)
            .field("level", &self.level)
            .finish()
    }
}

fn has(labels: &[String], label: &str) -> bool {
    labels.iter().any(|l| l == label)
}

fn vehicle_on_track_at_red(labels: &[String], signal: SignalColor) -> bool {
    has(labels, VEHICLE_ON_TRACK) && signal == SignalColor::Red
}

fn track_obstruction(labels: &[String], _signal: SignalColor) -> bool {
    has(labels, ROCK) || has(labels, RAIL_DAMAGE)
}

fn person_at_red(labels: &[String], signal: SignalColor) -> bool {
    has(labels, PERSON) && signal == SignalColor::Red
}

fn vehicle_on_track(labels: &[String], _signal: SignalColor) -> bool {
    has(labels, VEHICLE_ON_TRACK)
}

/// The ordered hazard table.
pub const HAZARD_RULES: &[HazardRule] = &[
    HazardRule {
        name: "vehicle_on_track_at_red",
        level: HazardLevel::High,
        applies: vehicle_on_track_at_red,
    },
    HazardRule {
        name: "track_obstruction",
        level: HazardLevel::High,
        applies: track_obstruction,
    },
    HazardRule {
        name: "person_at_red",
        level: HazardLevel::Medium,
        applies: person_at_red,
    },
    HazardRule {
        name: "vehicle_on_track",
        level: HazardLevel::Medium,
        applies: vehicle_on_track,
    },
];

/// First rule in [`HAZARD_RULES`] that matches, if any.
pub fn matching_rule(labels: &[String], signal: SignalColor) -> Option<&'static HazardRule> {
    HAZARD_RULES
        .iter()
        .find(|rule| rule.applies(labels, signal))
}

/// Hazard level for a set of detected labels and a resolved signal color.
pub fn assess_hazard(labels: &[String], signal: SignalColor) -> HazardLevel {
    match matching_rule(labels, signal) {
        Some(rule) => {
            log::debug!("hazard rule '{}' matched -> {}", rule.name, rule.level);
            rule.level
        }
        None => HazardLevel::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_matching_rule_wins() {
        let l = labels(&["rock", "vehicle_on_track"]);
        let rule = matching_rule(&l, SignalColor::Red).expect("rule");
        assert_eq!(rule.name, "vehicle_on_track_at_red");
        assert_eq!(assess_hazard(&l, SignalColor::Red), HazardLevel::High);

        let rule = matching_rule(&l, SignalColor::Green).expect("rule");
        assert_eq!(rule.name, "track_obstruction");
    }

    #[test]
    fn person_depends_on_red_signal() {
        let l = labels(&["person"]);
        assert_eq!(assess_hazard(&l, SignalColor::Red), HazardLevel::Medium);
        assert_eq!(assess_hazard(&l, SignalColor::Green), HazardLevel::Low);
        assert_eq!(assess_hazard(&l, SignalColor::Unknown), HazardLevel::Low);
    }

    #[test]
    fn empty_labels_default_to_low() {
        assert_eq!(assess_hazard(&[], SignalColor::Unknown), HazardLevel::Low);
        assert!(matching_rule(&[], SignalColor::Red).is_none());
    }

    #[test]
    fn obstructions_are_high_regardless_of_signal() {
        for signal in [SignalColor::Red, SignalColor::Green, SignalColor::Unknown] {
            assert_eq!(assess_hazard(&labels(&["rock"]), signal), HazardLevel::High);
            assert_eq!(
                assess_hazard(&labels(&["rail_damage"]), signal),
                HazardLevel::High
            );
        }
    }

    #[test]
    fn vehicle_on_track_without_red_is_medium() {
        let l = labels(&["vehicle_on_track"]);
        assert_eq!(assess_hazard(&l, SignalColor::Green), HazardLevel::Medium);
        assert_eq!(assess_hazard(&l, SignalColor::Red), HazardLevel::High);
    }

    #[test]
    fn person_at_red_loses_to_obstruction() {
        let l = labels(&["person", "rail_damage"]);
        assert_eq!(assess_hazard(&l, SignalColor::Red), HazardLevel::High);
    }

    #[test]
    fn membership_ignores_order_and_duplicates() {
        let a = labels(&["tree", "person", "person"]);
        let b = labels(&["person", "tree"]);
        assert_eq!(
            assess_hazard(&a, SignalColor::Red),
            assess_hazard(&b, SignalColor::Red)
        );
    }

    #[test]
    fn labels_are_case_sensitive() {
        let l = labels(&["Rock", "Vehicle_On_Track"]);
        assert_eq!(assess_hazard(&l, SignalColor::Red), HazardLevel::Low);
    }
}
