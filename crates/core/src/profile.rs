//! Score-vector to personality-profile derivation.
//!
//! Ties between equal top scores are resolved by [`Category::PRIORITY`],
//! never by map iteration order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::scoring::ScoreVector;

/// Known scoring categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
    /// Fallback for empty vectors and unrecognized category names.
    Balanced,
}

impl Category {
    /// Fixed tie-break order: earlier entries win equal scores.
    pub const PRIORITY: [Category; 5] = [
        Category::Openness,
        Category::Conscientiousness,
        Category::Extraversion,
        Category::Agreeableness,
        Category::Neuroticism,
    ];

    pub const DEFAULT: Category = Category::Balanced;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Openness => "openness",
            Category::Conscientiousness => "conscientiousness",
            Category::Extraversion => "extraversion",
            Category::Agreeableness => "agreeableness",
            Category::Neuroticism => "neuroticism",
            Category::Balanced => "balanced",
        }
    }

    /// Position in [`Category::PRIORITY`]; `None` for the default entry.
    #[must_use]
    pub fn priority(self) -> Option<usize> {
        Self::PRIORITY.iter().position(|c| *c == self)
    }

    #[must_use]
    pub fn profile(self) -> Profile {
        let (label, description) = match self {
            Category::Openness => (
                "The Explorer",
                "Curious and imaginative, drawn to new ideas, art and unfamiliar experiences.",
            ),
            Category::Conscientiousness => (
                "The Achiever",
                "Organized and dependable, plans ahead and follows through on commitments.",
            ),
            Category::Extraversion => (
                "The Energizer",
                "Outgoing and expressive, gains energy from people and shared activity.",
            ),
            Category::Agreeableness => (
                "The Harmonizer",
                "Warm and cooperative, values trust and looks after the people around them.",
            ),
            Category::Neuroticism => (
                "The Sensitive Soul",
                "Emotionally perceptive, feels deeply and notices stress others overlook.",
            ),
            Category::Balanced => (
                "The Balanced Mind",
                "No single trait dominates; adapts comfortably across many situations.",
            ),
        };
        Profile {
            category: self,
            label,
            description,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a category name is not one of the known categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::PRIORITY
            .iter()
            .chain(std::iter::once(&Category::Balanced))
            .find(|c| c.as_str() == normalized)
            .copied()
            .ok_or_else(|| UnknownCategory(s.to_owned()))
    }
}

/// Static label and description for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub category: Category,
    pub label: &'static str,
    pub description: &'static str,
}

impl Profile {
    /// Look up a profile by category name, falling back to the default entry.
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        name.parse::<Category>()
            .unwrap_or(Category::DEFAULT)
            .profile()
    }
}

//
// ─── DERIVATION ────────────────────────────────────────────────────────────────
//

fn rank_key(name: &str) -> (usize, &str) {
    let priority = name
        .parse::<Category>()
        .ok()
        .and_then(Category::priority)
        .unwrap_or(Category::PRIORITY.len());
    (priority, name)
}

/// Category names ordered by score descending, ties broken by priority.
///
/// Names that are not known categories sort after every known one and
/// among themselves by name.
#[must_use]
pub fn rank(scores: &ScoreVector) -> Vec<(String, i32)> {
    let mut entries: Vec<(String, i32)> = scores.iter().map(|(k, v)| (k.to_owned(), v)).collect();
    entries.sort_by(|(a_name, a_score), (b_name, b_score)| match b_score.cmp(a_score) {
        Ordering::Equal => rank_key(a_name).cmp(&rank_key(b_name)),
        other => other,
    });
    entries
}

/// Dominant profile for a score vector; empty vectors yield the default entry.
#[must_use]
pub fn derive(scores: &ScoreVector) -> Profile {
    rank(scores)
        .first()
        .map_or_else(|| Category::DEFAULT.profile(), |(name, _)| Profile::for_name(name))
}

/// Primary and (when a second category exists) secondary profiles.
#[must_use]
pub fn derive_pair(scores: &ScoreVector) -> (Profile, Option<Profile>) {
    let ranked = rank(scores);
    let primary = ranked
        .first()
        .map_or_else(|| Category::DEFAULT.profile(), |(name, _)| Profile::for_name(name));
    let secondary = ranked.get(1).map(|(name, _)| Profile::for_name(name));
    (primary, secondary)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(entries: &[(&str, i32)]) -> ScoreVector {
        entries.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn picks_highest_score() {
        let profile = derive(&scores(&[("openness", 1), ("extraversion", 4)]));
        assert_eq!(profile.category, Category::Extraversion);
        assert_eq!(profile.label, "The Energizer");
    }

    #[test]
    fn tie_goes_to_priority_order() {
        // Sorted-map iteration would put conscientiousness first; priority says openness.
        let tied = scores(&[("conscientiousness", 4), ("openness", 4)]);
        for _ in 0..10 {
            assert_eq!(derive(&tied).category, Category::Openness);
        }

        let tied = scores(&[("neuroticism", 2), ("agreeableness", 2)]);
        assert_eq!(derive(&tied).category, Category::Agreeableness);
    }

    #[test]
    fn empty_vector_falls_back_to_default() {
        assert_eq!(derive(&ScoreVector::new()).category, Category::Balanced);
    }

    #[test]
    fn unknown_top_category_falls_back_to_default() {
        let profile = derive(&scores(&[("creativity", 9), ("openness", 1)]));
        assert_eq!(profile.category, Category::Balanced);
    }

    #[test]
    fn known_category_beats_unknown_on_tie() {
        let profile = derive(&scores(&[("creativity", 3), ("neuroticism", 3)]));
        assert_eq!(profile.category, Category::Neuroticism);
    }

    #[test]
    fn derive_pair_returns_secondary() {
        let (primary, secondary) =
            derive_pair(&scores(&[("openness", 4), ("conscientiousness", 4), ("extraversion", 1)]));
        assert_eq!(primary.category, Category::Openness);
        assert_eq!(secondary.unwrap().category, Category::Conscientiousness);

        let (_, secondary) = derive_pair(&scores(&[("openness", 1)]));
        assert!(secondary.is_none());
    }

    #[test]
    fn category_names_parse_case_insensitively() {
        assert_eq!("Openness".parse::<Category>().unwrap(), Category::Openness);
        assert!("grit".parse::<Category>().is_err());
    }
}
