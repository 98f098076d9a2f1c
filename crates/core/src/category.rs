use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fuzzy::closest_match;

const FUZZY_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Food,
    Fuel,
    Utilities,
    Transportation,
    Groceries,
    Entertainment,
    Healthcare,
    Shopping,
    Services,
    #[default]
    Other,
}

/// Labels models and receipts use that are not enum values.
const SYNONYMS: &[(&str, ExpenseCategory)] = &[
    ("beverage", ExpenseCategory::Food),
    ("beverages", ExpenseCategory::Food),
    ("drinks", ExpenseCategory::Food),
    ("drink", ExpenseCategory::Food),
    ("restaurant", ExpenseCategory::Food),
    ("dining", ExpenseCategory::Food),
    ("takeout", ExpenseCategory::Food),
    ("fast food", ExpenseCategory::Food),
    ("clothing", ExpenseCategory::Shopping),
    ("clothes", ExpenseCategory::Shopping),
    ("apparel", ExpenseCategory::Shopping),
    ("fashion", ExpenseCategory::Shopping),
    ("accessories", ExpenseCategory::Shopping),
    ("stationery", ExpenseCategory::Shopping),
    ("office", ExpenseCategory::Shopping),
    ("office supplies", ExpenseCategory::Shopping),
    ("supplies", ExpenseCategory::Shopping),
    ("electronics", ExpenseCategory::Shopping),
    ("tech", ExpenseCategory::Shopping),
    ("technology", ExpenseCategory::Shopping),
    ("beauty", ExpenseCategory::Shopping),
    ("cosmetics", ExpenseCategory::Shopping),
    ("household", ExpenseCategory::Shopping),
    ("home", ExpenseCategory::Shopping),
    ("furniture", ExpenseCategory::Shopping),
    ("appliances", ExpenseCategory::Shopping),
    ("personal care", ExpenseCategory::Healthcare),
    ("hygiene", ExpenseCategory::Healthcare),
];

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 10] = [
        ExpenseCategory::Food,
        ExpenseCategory::Fuel,
        ExpenseCategory::Utilities,
        ExpenseCategory::Transportation,
        ExpenseCategory::Groceries,
        ExpenseCategory::Entertainment,
        ExpenseCategory::Healthcare,
        ExpenseCategory::Shopping,
        ExpenseCategory::Services,
        ExpenseCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseCategory::Food => "food",
            ExpenseCategory::Fuel => "fuel",
            ExpenseCategory::Utilities => "utilities",
            ExpenseCategory::Transportation => "transportation",
            ExpenseCategory::Groceries => "groceries",
            ExpenseCategory::Entertainment => "entertainment",
            ExpenseCategory::Healthcare => "healthcare",
            ExpenseCategory::Shopping => "shopping",
            ExpenseCategory::Services => "services",
            ExpenseCategory::Other => "other",
        }
    }

    /// Map a free-form label onto a category. Never fails: unknown labels
    /// become `Other`.
    pub fn from_label(label: &str) -> Self {
        let key = label.trim().to_lowercase();
        if key.is_empty() {
            return ExpenseCategory::Other;
        }
        if let Some(c) = Self::ALL.iter().find(|c| c.as_str() == key) {
            return *c;
        }
        if let Some((_, c)) = SYNONYMS.iter().find(|(s, _)| *s == key) {
            return *c;
        }
        let plural = pluralize(&key);
        if let Some(c) = Self::ALL.iter().find(|c| c.as_str() == plural) {
            return *c;
        }

        let candidates = Self::ALL
            .iter()
            .map(|c| (c.as_str(), *c))
            .chain(SYNONYMS.iter().copied());
        closest_match(&key, candidates, FUZZY_THRESHOLD).unwrap_or(ExpenseCategory::Other)
    }
}

fn pluralize(word: &str) -> String {
    match word.strip_suffix('y') {
        Some(stem) => format!("{stem}ies"),
        None => format!("{word}s"),
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_values_case_insensitive() {
        assert_eq!(ExpenseCategory::from_label("Groceries"), ExpenseCategory::Groceries);
        assert_eq!(ExpenseCategory::from_label("  FUEL "), ExpenseCategory::Fuel);
    }

    #[test]
    fn synonyms_map_to_parent_category() {
        assert_eq!(ExpenseCategory::from_label("beverages"), ExpenseCategory::Food);
        assert_eq!(ExpenseCategory::from_label("Office Supplies"), ExpenseCategory::Shopping);
        assert_eq!(ExpenseCategory::from_label("personal care"), ExpenseCategory::Healthcare);
        assert_eq!(ExpenseCategory::from_label("fast food"), ExpenseCategory::Food);
    }

    #[test]
    fn near_misses_are_fuzzy_matched() {
        assert_eq!(ExpenseCategory::from_label("groceris"), ExpenseCategory::Groceries);
        assert_eq!(ExpenseCategory::from_label("electronic"), ExpenseCategory::Shopping);
        assert_eq!(ExpenseCategory::from_label("utilitie"), ExpenseCategory::Utilities);
    }

    #[test]
    fn singular_forms_match_plural_values() {
        assert_eq!(ExpenseCategory::from_label("grocery"), ExpenseCategory::Groceries);
        assert_eq!(ExpenseCategory::from_label("service"), ExpenseCategory::Services);
    }

    #[test]
    fn unknown_becomes_other() {
        assert_eq!(ExpenseCategory::from_label("spaceship parts"), ExpenseCategory::Other);
        assert_eq!(ExpenseCategory::from_label(""), ExpenseCategory::Other);
    }

    #[test]
    fn display_matches_wire_value() {
        for c in ExpenseCategory::ALL {
            assert_eq!(c.to_string(), c.as_str());
        }
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ExpenseCategory::Transportation).unwrap();
        assert_eq!(json, "\"transportation\"");
    }
}
