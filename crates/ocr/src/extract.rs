use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use finvo_core::normalize::{parse_amount_str, parse_time};
use finvo_core::PaymentMethod;
use regex::Regex;
use rust_decimal::Decimal;

use crate::types::{ExtractedField, ReceiptHints};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_amount_label,
    r"(?i)\b(?:total|grand\s+total|amount\s+due|balance\s+due|total\s+due)\s*[:\$]?\s*\$?\s*([\d,]+\.\d{2})\b");
re!(re_subtotal,
    r"(?i)\bsub[\s-]?total\b\s*[:\$]?\s*\$?\s*([\d,]+\.\d{2})\b");
re!(re_tax,
    r"(?i)\b(?:tax|hst|gst|pst|qst|vat|sales\s*tax)\b[^\n$]{0,12}?[:\$]?\s*\$?\s*([\d,]*\.\d{2,3})(?:[^\d%]|$)");
re!(re_currency,
    r"\$\s*([\d,]+\.\d{2})");

re!(re_date_iso,
    r"\b(\d{4})-(\d{2})-(\d{2})\b");
re!(re_date_month_first,
    r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2}),?\s+(\d{4})\b");
re!(re_date_day_first,
    r"(?i)\b(\d{1,2})[\s-](jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[\s-],?\s*(\d{4})\b");
re!(re_date_numeric,
    r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2}|\d{4})\b");
re!(re_date_label,
    r"(?i)\b(?:date|dt|trans(?:action)?\s+date)\b");
// Dates that are not the purchase date: card expiry, return windows, coupons.
re!(re_date_noise,
    r"(?i)\b(?:exp(?:iry|ires)?|return(?:s)?\s+by|valid\s+(?:until|thru|through)|best\s+before|offer\s+ends)\b");

re!(re_time,
    r"(?i)\b(\d{1,2}:\d{2}(?::\d{2})?)\s?([ap]\.?m\.?)?(?:\W|$)");

re!(re_payment,
    r"(?i)\b(visa|mastercard|master\s*card|amex|american\s+express|discover|interac|debit|credit|cash|check|cheque|apple\s+pay|google\s+pay|e-?transfer)\b");

re!(re_phone,
    r"\(?\d{3}\)?[\s\-.]\d{3}[\s\-.]\d{4}");
re!(re_url,
    r"(?i)(https?://|www\.)\S+|\S+@\S+\.\w+");
re!(re_bare_amount,
    r"\d+[.,]\d{2}\b");
// Header lines that belong to the store block but are not its name.
re!(re_header_noise,
    r"(?i)\b(?:tel|phone|fax|cashier|server|clerk|store\s*#|store\s+no|receipt|invoice|order|table|register|reg|trans(?:action)?|gst\s*#|hst\s*#)\b");
re!(re_vendor_cue,
    r"(?i)^\s*(?:welcome\s+to|thank\s+you\s+for\s+(?:shopping|visiting|dining)\s+(?:at|with)|thanks\s+for\s+(?:shopping|visiting)\s+(?:at|with))\b\s*(.*?)[\s!.]*$");

// ── Public extraction API ─────────────────────────────────────────────────────

pub struct Extractor;

impl Extractor {
    /// Read receipt hints from raw OCR text.
    pub fn extract(ocr_text: &str) -> ReceiptHints {
        let vendor = Self::extract_vendor(ocr_text);
        let date = Self::extract_date(ocr_text);
        let time = Self::extract_time(ocr_text);
        let total = Self::extract_total(ocr_text);
        let subtotal = Self::extract_subtotal(ocr_text);
        let tax = Self::extract_tax(ocr_text);
        let payment_method = Self::extract_payment_method(ocr_text);

        // Aggregate confidence: weighted sum of key fields.
        let confidence = {
            let weighted = [
                (vendor.as_ref().map(|f| f.confidence), 0.25f32),
                (date.as_ref().map(|f| f.confidence), 0.30),
                (total.as_ref().map(|f| f.confidence), 0.35),
                (payment_method.as_ref().map(|f| f.confidence), 0.10),
            ];
            let (score, weight) = weighted.iter().fold((0.0f32, 0.0f32), |(s, w), (conf, fw)| {
                (s + conf.unwrap_or(0.0) * fw, w + fw)
            });
            if weight > 0.0 { score / weight } else { 0.0 }
        };

        ReceiptHints {
            vendor,
            date,
            time,
            subtotal,
            tax,
            total,
            payment_method,
            confidence,
        }
    }

    // ── Vendor ────────────────────────────────────────────────────────────────

    /// A "welcome to" / "thank you for shopping at" line names the store
    /// outright. Otherwise the name is the first wordy line of the header
    /// block, before addresses, phone numbers and register details.
    fn extract_vendor(text: &str) -> Option<ExtractedField<String>> {
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        for (i, line) in lines.iter().enumerate() {
            let Some(c) = re_vendor_cue().captures(line) else {
                continue;
            };
            let named = c.get(1).map_or("", |m| m.as_str().trim());
            let name = if named.is_empty() { lines.get(i + 1).copied() } else { Some(named) };
            if let Some(name) = name.filter(|n| looks_like_store_name(n)) {
                return Some(ExtractedField::new(name.to_string(), 0.80));
            }
        }

        let name = lines.iter().take(HEADER_LINES).copied().find(|l| looks_like_store_name(l))?;
        let shouting = name.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase);
        Some(ExtractedField::new(name.to_string(), if shouting { 0.65 } else { 0.50 }))
    }

    // ── Date / time ──────────────────────────────────────────────────────────

    /// Best-scoring date on the page. Lines carrying a date label or a
    /// clock time score higher; expiry and return-by lines are ignored.
    fn extract_date(text: &str) -> Option<ExtractedField<NaiveDate>> {
        text.lines()
            .filter(|line| !re_date_noise().is_match(line))
            .flat_map(|line| {
                let bonus = if re_date_label().is_match(line) {
                    0.08
                } else if re_time().is_match(line) {
                    0.04
                } else {
                    0.0
                };
                dates_in_line(line).into_iter().map(move |(d, conf)| (d, conf + bonus))
            })
            .fold(None, |best: Option<(NaiveDate, f32)>, cand| match best {
                Some((_, conf)) if conf >= cand.1 => best,
                _ => Some(cand),
            })
            .map(|(date, conf)| ExtractedField::new(date, conf.min(0.98)))
    }

    fn extract_time(text: &str) -> Option<ExtractedField<NaiveTime>> {
        re_time().captures_iter(text).find_map(|c| {
            let clock = c.get(1)?.as_str();
            let parsed = match c.get(2) {
                Some(m) => {
                    let meridiem = m.as_str().replace('.', "");
                    parse_time(&format!("{clock} {meridiem}"))
                }
                None => parse_time(clock),
            }?;
            Some(ExtractedField::new(parsed, 0.85))
        })
    }

    // ── Amounts ───────────────────────────────────────────────────────────────

    fn extract_total(text: &str) -> Option<ExtractedField<Decimal>> {
        // Prefer a labeled total over any raw dollar amount.
        if let Some(c) = re_amount_label().captures(text) {
            if let Some(amount) = parse_amount_str(c.get(1)?.as_str()) {
                return Some(ExtractedField::new(amount, 0.92));
            }
        }
        // Fall back to the largest dollar value on the page.
        re_currency()
            .captures_iter(text)
            .filter_map(|c| parse_amount_str(c.get(1)?.as_str()))
            .max()
            .map(|amount| ExtractedField::new(amount, 0.55))
    }

    fn extract_subtotal(text: &str) -> Option<ExtractedField<Decimal>> {
        let c = re_subtotal().captures(text)?;
        let amount = parse_amount_str(c.get(1)?.as_str())?;
        Some(ExtractedField::new(amount, 0.88))
    }

    fn extract_tax(text: &str) -> Option<ExtractedField<Decimal>> {
        let c = re_tax().captures(text)?;
        let amount = parse_amount_str(c.get(1)?.as_str())?;
        Some(ExtractedField::new(amount, 0.88))
    }

    // ── Payment method ────────────────────────────────────────────────────────

    fn extract_payment_method(text: &str) -> Option<ExtractedField<PaymentMethod>> {
        let c = re_payment().captures(text)?;
        let method = PaymentMethod::from_label(c.get(1)?.as_str());
        Some(ExtractedField::new(method, 0.90))
    }
}

// ── Vendor helpers ────────────────────────────────────────────────────────────

/// How far down the receipt the store name may appear.
const HEADER_LINES: usize = 6;

fn looks_like_store_name(line: &str) -> bool {
    let len = line.chars().count();
    if !(3..=40).contains(&len) || line.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    let visible = line.chars().filter(|c| !c.is_whitespace()).count();
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    if letters * 2 < visible {
        return false;
    }
    ![re_phone(), re_url(), re_bare_amount(), re_header_noise(), re_date_label(), re_date_numeric(), re_date_iso()]
        .iter()
        .any(|re| re.is_match(line))
}

// ── Date helpers ──────────────────────────────────────────────────────────────

/// Every date printed on one line, with a confidence by format.
fn dates_in_line(line: &str) -> Vec<(NaiveDate, f32)> {
    let mut found = Vec::new();
    for c in re_date_iso().captures_iter(line) {
        if let Some(d) = ymd(&c[1], &c[2], &c[3]) {
            found.push((d, 0.90));
        }
    }
    for c in re_date_month_first().captures_iter(line) {
        if let Some(d) = named_month(&c[1], &c[2], &c[3]) {
            found.push((d, 0.88));
        }
    }
    for c in re_date_day_first().captures_iter(line) {
        if let Some(d) = named_month(&c[2], &c[1], &c[3]) {
            found.push((d, 0.88));
        }
    }
    if found.is_empty() {
        for c in re_date_numeric().captures_iter(line) {
            if let Some(d) = numeric_date(&c[1], &c[2], &c[3]) {
                found.push((d, 0.72));
            }
        }
    }
    found
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn named_month(month: &str, day: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month_name_to_num(month)?, day.parse().ok()?)
}

/// Month first; day first only when the first part cannot be a month.
fn numeric_date(first: &str, second: &str, year: &str) -> Option<NaiveDate> {
    let (a, b): (u32, u32) = (first.parse().ok()?, second.parse().ok()?);
    let year: i32 = year.parse().ok()?;
    let year = if year < 100 { 2000 + year } else { year };
    NaiveDate::from_ymd_opt(year, a, b).or_else(|| NaiveDate::from_ymd_opt(year, b, a))
}

fn month_name_to_num(name: &str) -> Option<u32> {
    let key = name.to_lowercase();
    let abbr = key.get(..3)?;
    let n = match abbr {
        "jan" => 1, "feb" => 2, "mar" => 3, "apr" => 4,
        "may" => 5, "jun" => 6, "jul" => 7, "aug" => 8,
        "sep" => 9, "oct" => 10, "nov" => 11, "dec" => 12,
        _ => return None,
    };
    Some(n)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
