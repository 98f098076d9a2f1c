use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fuzzy::closest_match;

const FUZZY_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    CreditCard,
    DebitCard,
    MobilePayment,
    BankTransfer,
    Check,
    Interac,
    Other,
}

const SYNONYMS: &[(&str, PaymentMethod)] = &[
    ("interac", PaymentMethod::Interac),
    ("visa", PaymentMethod::CreditCard),
    ("mastercard", PaymentMethod::CreditCard),
    ("master card", PaymentMethod::CreditCard),
    ("amex", PaymentMethod::CreditCard),
    ("american express", PaymentMethod::CreditCard),
    ("discover", PaymentMethod::CreditCard),
    ("credit", PaymentMethod::CreditCard),
    ("credit card", PaymentMethod::CreditCard),
    ("debit", PaymentMethod::DebitCard),
    ("debit card", PaymentMethod::DebitCard),
    ("e-transfer", PaymentMethod::BankTransfer),
    ("etransfer", PaymentMethod::BankTransfer),
    ("wire", PaymentMethod::BankTransfer),
    ("bank transfer", PaymentMethod::BankTransfer),
    ("apple pay", PaymentMethod::MobilePayment),
    ("google pay", PaymentMethod::MobilePayment),
    ("paypal", PaymentMethod::MobilePayment),
    ("venmo", PaymentMethod::MobilePayment),
    ("cash", PaymentMethod::Cash),
    ("cheque", PaymentMethod::Check),
    ("check", PaymentMethod::Check),
];

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 8] = [
        PaymentMethod::Cash,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::MobilePayment,
        PaymentMethod::BankTransfer,
        PaymentMethod::Check,
        PaymentMethod::Interac,
        PaymentMethod::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::MobilePayment => "mobile_payment",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Check => "check",
            PaymentMethod::Interac => "interac",
            PaymentMethod::Other => "other",
        }
    }

    /// Map a free-form payment label onto a method. Unknown labels become
    /// `Other`.
    pub fn from_label(label: &str) -> Self {
        let key = label.trim().to_lowercase();
        if key.is_empty() {
            return PaymentMethod::Other;
        }
        if let Some((_, m)) = SYNONYMS.iter().find(|(s, _)| *s == key) {
            return *m;
        }
        if let Some(m) = Self::ALL.iter().find(|m| m.as_str() == key) {
            return *m;
        }

        // "VISA ending 1234", "Paid by Interac Flash": a known keyword inside
        // a longer label. Longest keyword first so "debit card" beats "debit".
        let mut keywords: Vec<&(&str, PaymentMethod)> = SYNONYMS.iter().collect();
        keywords.sort_by_key(|(s, _)| std::cmp::Reverse(s.len()));
        if let Some((_, m)) = keywords.iter().find(|(s, _)| contains_word(&key, s)) {
            return *m;
        }

        let candidates = SYNONYMS
            .iter()
            .copied()
            .chain(Self::ALL.iter().map(|m| (m.as_str(), *m)));
        closest_match(&key, candidates, FUZZY_THRESHOLD).unwrap_or(PaymentMethod::Other)
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_brands_are_credit_cards() {
        assert_eq!(PaymentMethod::from_label("VISA"), PaymentMethod::CreditCard);
        assert_eq!(PaymentMethod::from_label("American Express"), PaymentMethod::CreditCard);
        assert_eq!(PaymentMethod::from_label("mastercard"), PaymentMethod::CreditCard);
    }

    #[test]
    fn interac_and_transfers() {
        assert_eq!(PaymentMethod::from_label("Interac"), PaymentMethod::Interac);
        assert_eq!(PaymentMethod::from_label("e-Transfer"), PaymentMethod::BankTransfer);
        assert_eq!(PaymentMethod::from_label("Apple Pay"), PaymentMethod::MobilePayment);
    }

    #[test]
    fn enum_values_pass_through() {
        assert_eq!(PaymentMethod::from_label("debit_card"), PaymentMethod::DebitCard);
        assert_eq!(PaymentMethod::from_label("bank_transfer"), PaymentMethod::BankTransfer);
    }

    #[test]
    fn keyword_inside_longer_label() {
        assert_eq!(PaymentMethod::from_label("VISA ending 1234"), PaymentMethod::CreditCard);
        assert_eq!(PaymentMethod::from_label("Paid by debit card"), PaymentMethod::DebitCard);
        assert_eq!(PaymentMethod::from_label("CASH TEND"), PaymentMethod::Cash);
    }

    #[test]
    fn keyword_must_be_a_whole_word() {
        // "cashier" is not cash.
        assert_eq!(PaymentMethod::from_label("cashier 7"), PaymentMethod::Other);
    }

    #[test]
    fn typos_are_fuzzy_matched() {
        assert_eq!(PaymentMethod::from_label("mastercrd"), PaymentMethod::CreditCard);
        assert_eq!(PaymentMethod::from_label("interak"), PaymentMethod::Interac);
    }

    #[test]
    fn unknown_becomes_other() {
        assert_eq!(PaymentMethod::from_label("bitcoin"), PaymentMethod::Other);
        assert_eq!(PaymentMethod::from_label(""), PaymentMethod::Other);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::MobilePayment).unwrap();
        assert_eq!(json, "\"mobile_payment\"");
    }
}
