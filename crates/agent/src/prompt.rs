use finvo_core::{ExpenseCategory, FuelType, PaymentMethod};
use finvo_document::Document;
use serde_json::{Map, Value};

pub const SYSTEM_PROMPT: &str = r#"You are a financial document analyst. You read invoices and receipts and extract every visible value for personal expense tracking.

Work through the document in this order of importance.

1. Transaction financials. These are mandatory whenever the numbers are visible:
   - total_amount: "TOTAL 8.18", "Total: $15.47", "Amount Due: $45.99" give 8.18, 15.47, 45.99.
   - tax_amount: "TAX 10.00% .074" gives 0.074 (take the final number, never the rate). "GST: 1.25" and "HST 13%: 3.45" work the same way.
   - subtotal: "SUBTOTAL 7.44", "Sub Total: 12.50".
   - transaction_date in any format, and transaction_time as HH:MM or HH:MM:SS.
   Never leave these null when a matching number appears on the document.

2. Item prices. Pair every item name with its price: "HAND TOWEL 2.97" is an item HAND TOWEL with unit_price 2.97. Prices can sit beside, above or below the name, or in a separate column. Read quantities from forms like "2x ITEM @ 3.50" or "ITEM 1x 7.25" and fill total_price when shown.

3. Line items. List every product or service on the document in the "items" array.

4. Merchant and reference. Extract the business name and the invoice, receipt or transaction number.

5. Payment. Identify the payment method (one of: {payment_methods}) and the last four card digits when printed.

Fuel receipts: fill fuel_info with fuel_type (one of: {fuel_types}), gallons_filled and price_per_gallon.

Each entry in "items" uses exactly these keys:
  "item_name" (required), "quantity", "unit_price", "total_price", "category".
Use "item_name", not "name".

Valid categories: {categories}.
  food: restaurant meals, snacks, beverages, prepared food
  groceries: raw ingredients, supermarket and household food
  shopping: clothing, electronics, furniture, general retail
  fuel: gasoline, diesel, car fuel
  transportation: transit, parking, car services
  utilities: electricity, water, internet, phone
  healthcare: medical, pharmacy, personal care
  entertainment: movies, games, recreation
  services: professional services, repairs, maintenance
  other: anything else

Example item:
{"item_name": "HAND TOWEL", "quantity": 1, "unit_price": 5.99, "total_price": 5.99, "category": "shopping"}

Reply with one JSON object and nothing else. Top-level keys: merchant_name, transaction_date, transaction_time, total_amount, tax_amount, subtotal, items, fuel_info, invoice_number, payment_method, currency, confidence_score (0 to 1, your confidence in the extraction)."#;

const USER_TEMPLATE: &str = r#"Extract the complete financial data from this receipt or invoice.

{document_content}

Priorities:
1. Do not leave these null when they are visible: transaction_date, transaction_time, total_amount, tax_amount, subtotal.
2. Give every item its price. "PEANUTS 2.46" is item PEANUTS with unit_price 2.46.
3. For tax lines, ignore the percentage and take the final amount.

Extraction parameters:
- Extract fuel information: {extract_fuel_info}
- Extract line items: {extract_line_items}

Document metadata: {document_metadata}

Each item must follow this structure:
{"item_name": "PRODUCT NAME", "quantity": number_or_null, "unit_price": number_or_null, "total_price": number_or_null, "category": "category_or_null"}

Return the extracted information as a single JSON object with a populated "items" array."#;

pub fn system_prompt() -> String {
    let categories = vocabulary(ExpenseCategory::ALL.iter().map(|c| c.as_str()));
    let payment_methods = vocabulary(PaymentMethod::ALL.iter().map(|m| m.as_str()));
    let fuel_types = vocabulary(FuelType::ALL.iter().map(|t| t.as_str()));
    fill(
        SYSTEM_PROMPT,
        &[
            ("categories", categories.as_str()),
            ("payment_methods", payment_methods.as_str()),
            ("fuel_types", fuel_types.as_str()),
        ],
    )
}

fn vocabulary<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels.collect::<Vec<_>>().join(", ")
}

pub fn user_prompt(document_content: &str, extract_fuel_info: bool, extract_line_items: bool, metadata: &[&Map<String, Value>]) -> String {
    let metadata = Value::Array(metadata.iter().map(|m| Value::Object((*m).clone())).collect()).to_string();
    let fuel = extract_fuel_info.to_string();
    let items = extract_line_items.to_string();
    fill(
        USER_TEMPLATE,
        &[
            ("document_content", document_content),
            ("extract_fuel_info", fuel.as_str()),
            ("extract_line_items", items.as_str()),
            ("document_metadata", metadata.as_str()),
        ],
    )
}

/// Single pass over `template`: each `{name}` with a known name is
/// replaced, everything else (substituted text included) is copied as-is.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let hit = values.iter().find_map(|(name, value)| {
            tail.strip_prefix('{')
                .and_then(|t| t.strip_prefix(*name))
                .and_then(|t| t.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `Document {i} (Metadata: k=v, ...):` followed by the content, one block
/// per document, blocks separated by a blank line.
pub fn prepare_document_content(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let metadata = doc
                .metadata
                .iter()
                .map(|(k, v)| format!("{k}={}", display_value(v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Document {} (Metadata: {metadata}):\n{}", i + 1, doc.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
