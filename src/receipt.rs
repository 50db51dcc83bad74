//! Receipt model and fixed-width text layout.
//!
//! Money is carried as integer cents from the moment a request is parsed, so totals and the tax
//! split always add up to the cent. Rendering is a pure function of the priced receipt and the
//! layout.

use serde::{Deserialize, Deserializer};

use crate::error::ReceiptError;

/// Amount of money in cents.
pub type Cents = i64;

/// Body of a print request.
#[derive(Debug, Clone, Deserialize)]
pub struct PrintReceiptRequest {
    pub receipt_data: Receipt,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Receipt {
    pub items: Vec<ReceiptItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub product_id: String,
    pub quantity: u32,
    pub price: f64,
}

/// Point of sale clients send product ids both as strings and as numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Text(s)) => s,
        Some(Id::Integer(n)) => n.to_string(),
        Some(Id::Float(n)) => n.to_string(),
        None => String::new(),
    })
}

/// Convert a decimal price to cents, rejecting negative and non-finite values.
pub fn to_cents(price: f64) -> Option<Cents> {
    let cents = (price * 100.0).round();
    if !cents.is_finite() || cents < 0.0 || cents >= i64::MAX as f64 {
        return None;
    }
    Some(cents as Cents)
}

/// Format cents as a decimal amount with two fraction digits.
pub fn format_money(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// One item with its amounts resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub name: String,
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: Cents,
    pub line_total: Cents,
}

/// Grand total split into net amount and tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub total: Cents,
    pub net: Cents,
    pub tax: Cents,
}

impl Totals {
    /// Split a tax-inclusive `total` at `tax_rate`. `net + tax == total` always holds.
    pub fn split(total: Cents, tax_rate: f64) -> Totals {
        let net = (total as f64 / (1.0 + tax_rate)).round() as Cents;
        Totals {
            total,
            net,
            tax: total - net,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedReceipt {
    pub lines: Vec<PricedLine>,
    pub totals: Totals,
}

impl Receipt {
    /// Validate every item and compute line totals and the tax split.
    pub fn price(&self, tax_rate: f64) -> Result<PricedReceipt, ReceiptError> {
        if self.items.is_empty() {
            return Err(ReceiptError::Empty);
        }

        let mut lines = Vec::with_capacity(self.items.len());
        let mut total: Cents = 0;

        for (index, item) in self.items.iter().enumerate() {
            if item.quantity == 0 {
                return Err(ReceiptError::InvalidQuantity {
                    index,
                    name: item.name.clone(),
                });
            }
            let unit_price = match to_cents(item.price) {
                Some(cents) => cents,
                None if item.price.is_finite() && item.price >= 0.0 => {
                    return Err(ReceiptError::Overflow)
                }
                None => {
                    return Err(ReceiptError::InvalidPrice {
                        index,
                        name: item.name.clone(),
                    })
                }
            };
            let line_total = unit_price
                .checked_mul(Cents::from(item.quantity))
                .ok_or(ReceiptError::Overflow)?;
            total = total.checked_add(line_total).ok_or(ReceiptError::Overflow)?;

            lines.push(PricedLine {
                name: item.name.clone(),
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price,
                line_total,
            });
        }

        Ok(PricedReceipt {
            lines,
            totals: Totals::split(total, tax_rate),
        })
    }
}

/// Width of each item column, in characters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ColumnWidths {
    pub name: usize,
    pub product_id: usize,
    pub quantity: usize,
    pub price: usize,
    pub total: usize,
}

impl ColumnWidths {
    /// Width of a full item row.
    pub fn row_width(&self) -> usize {
        self.name + self.product_id + self.quantity + self.price + self.total
    }
}

impl Default for ColumnWidths {
    fn default() -> Self {
        ColumnWidths {
            name: 18,
            product_id: 8,
            quantity: 4,
            price: 9,
            total: 9,
        }
    }
}

/// Left-align `text` in `width` characters, truncating what does not fit.
pub fn pad_text(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat(' ').take(width - len));
    out
}

/// Right-align `text` in `width` characters. Text wider than the column is kept whole.
pub fn pad_number(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let mut out = String::with_capacity(width.max(len));
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(len)));
    out.push_str(text);
    out
}

/// Fixed-width receipt text layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLayout {
    pub line_width: usize,
    pub tax_rate: f64,
    pub columns: ColumnWidths,
    pub header: Vec<String>,
    pub footer: Vec<String>,
}

impl ReceiptLayout {
    /// A line of `-` the width of the paper.
    pub fn border_line(&self) -> String {
        "-".repeat(self.line_width)
    }

    fn centered(&self, text: &str) -> String {
        let text: String = text.chars().take(self.line_width).collect();
        let left = (self.line_width - text.chars().count()) / 2;
        format!("{}{}", " ".repeat(left), text)
    }

    fn row(&self, name: &str, id: &str, quantity: &str, price: &str, total: &str) -> String {
        let c = &self.columns;
        let mut row = String::with_capacity(self.line_width);
        row.push_str(&pad_text(name, c.name));
        row.push_str(&pad_text(id, c.product_id));
        row.push_str(&pad_number(quantity, c.quantity));
        row.push_str(&pad_number(price, c.price));
        row.push_str(&pad_number(total, c.total));
        row
    }

    fn summary_row(&self, label: &str, amount: Cents) -> String {
        let label_width = self.line_width.saturating_sub(self.columns.total);
        format!(
            "{}{}",
            pad_number(label, label_width),
            pad_number(&format_money(amount), self.columns.total)
        )
    }

    fn tax_label(&self) -> String {
        let percent = (self.tax_rate * 10_000.0).round() / 100.0;
        format!("Tax {}%", percent)
    }

    /// Lay the receipt out as lines of text, without line terminators.
    pub fn render_lines(&self, receipt: &PricedReceipt) -> Vec<String> {
        let mut lines = Vec::with_capacity(receipt.lines.len() + self.header.len() + 10);

        lines.extend(self.header.iter().map(|h| self.centered(h)));
        lines.push(self.border_line());
        lines.push(self.row("Item", "Id", "Qty", "Price", "Total"));
        lines.push(self.border_line());

        for line in &receipt.lines {
            lines.push(self.row(
                &line.name,
                &line.product_id,
                &line.quantity.to_string(),
                &format_money(line.unit_price),
                &format_money(line.line_total),
            ));
        }

        lines.push(self.border_line());
        lines.push(self.summary_row("Net", receipt.totals.net));
        lines.push(self.summary_row(&self.tax_label(), receipt.totals.tax));
        lines.push(self.summary_row("TOTAL", receipt.totals.total));
        lines.push(self.border_line());

        lines.extend(self.footer.iter().map(|f| self.centered(f)));
        lines
    }

    /// Lay the receipt out as a single newline-terminated text block.
    pub fn render(&self, receipt: &PricedReceipt) -> String {
        let mut text = String::new();
        for line in self.render_lines(receipt) {
            text.push_str(&line);
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ReceiptLayout {
        ReceiptLayout {
            line_width: 48,
            tax_rate: 0.19,
            columns: ColumnWidths::default(),
            header: vec!["Corner Shop".into()],
            footer: vec!["Thank you!".into()],
        }
    }

    fn item(name: &str, product_id: &str, quantity: u32, price: f64) -> ReceiptItem {
        ReceiptItem {
            name: name.into(),
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    fn sample() -> Receipt {
        Receipt {
            items: vec![item("Coffee", "1001", 2, 2.50), item("Croissant", "1002", 1, 1.00)],
        }
    }

    #[test]
    fn computes_totals_and_tax_split() {
        let priced = sample().price(0.19).unwrap();
        assert_eq!(priced.lines[0].line_total, 500);
        assert_eq!(priced.lines[1].line_total, 100);
        assert_eq!(
            priced.totals,
            Totals {
                total: 600,
                net: 504,
                tax: 96
            }
        );
    }

    #[test]
    fn split_always_adds_up() {
        for total in [0, 1, 99, 119, 600, 12_345, 999_999] {
            let totals = Totals::split(total, 0.19);
            assert_eq!(totals.net + totals.tax, total);
        }
    }

    #[test]
    fn formats_money() {
        assert_eq!(format_money(600), "6.00");
        assert_eq!(format_money(5), "0.05");
        assert_eq!(format_money(-96), "-0.96");
        assert_eq!(to_cents(2.5), Some(250));
        assert_eq!(to_cents(0.1 + 0.2), Some(30));
        assert_eq!(to_cents(-1.0), None);
        assert_eq!(to_cents(f64::NAN), None);
    }

    #[test]
    fn rejects_invalid_items() {
        assert_eq!(Receipt { items: vec![] }.price(0.19), Err(ReceiptError::Empty));
        assert_eq!(
            Receipt {
                items: vec![item("Tea", "1", 0, 1.0)]
            }
            .price(0.19),
            Err(ReceiptError::InvalidQuantity {
                index: 0,
                name: "Tea".into()
            })
        );
        assert_eq!(
            Receipt {
                items: vec![item("Tea", "1", 1, 1.0), item("Cake", "2", 1, -3.0)]
            }
            .price(0.19),
            Err(ReceiptError::InvalidPrice {
                index: 1,
                name: "Cake".into()
            })
        );
    }

    #[test]
    fn huge_price_is_an_overflow_not_an_invalid_price() {
        assert_eq!(to_cents(1e18), None);
        assert_eq!(
            Receipt {
                items: vec![item("Yacht", "9", 1, 1e18)]
            }
            .price(0.19),
            Err(ReceiptError::Overflow)
        );
        assert_eq!(
            Receipt {
                items: vec![item("Tea", "1", 1, f64::INFINITY)]
            }
            .price(0.19),
            Err(ReceiptError::InvalidPrice {
                index: 0,
                name: "Tea".into()
            })
        );
    }

    #[test]
    fn item_rows_fill_the_line_width() {
        let layout = layout();
        let lines = layout.render_lines(&sample().price(0.19).unwrap());

        assert_eq!(lines[0], format!("{}Corner Shop", " ".repeat(18)));
        assert_eq!(lines[1], "-".repeat(48));
        assert_eq!(
            lines[2],
            "Item              Id       Qty    Price    Total"
        );
        assert_eq!(
            lines[4],
            "Coffee            1001       2     2.50     5.00"
        );
        assert_eq!(
            lines[5],
            "Croissant         1002       1     1.00     1.00"
        );
        for line in &lines[1..lines.len() - 1] {
            assert_eq!(line.chars().count(), 48, "{:?}", line);
        }
    }

    #[test]
    fn renders_summary_rows() {
        let lines = layout().render_lines(&sample().price(0.19).unwrap());
        let n = lines.len();
        assert_eq!(lines[n - 5], format!("{:>39}{:>9}", "Net", "5.04"));
        assert_eq!(lines[n - 4], format!("{:>39}{:>9}", "Tax 19%", "0.96"));
        assert_eq!(lines[n - 3], format!("{:>39}{:>9}", "TOTAL", "6.00"));
        assert_eq!(lines[n - 1], format!("{}Thank you!", " ".repeat(19)));
    }

    #[test]
    fn truncates_long_names_but_never_amounts() {
        let receipt = Receipt {
            items: vec![
                item("Extra large oat milk cappuccino", "ABCDEFGHIJK", 1, 1.0),
                item("Gold bar", "9", 12_345, 99_999.99),
            ],
        };
        let lines = layout().render_lines(&receipt.price(0.19).unwrap());

        assert_eq!(&lines[4][..26], "Extra large oat miABCDEFGH");
        assert_eq!(lines[4].chars().count(), 48);

        assert!(lines[5].ends_with("1234499876.55"));
        assert!(lines[5].contains("12345"));
        assert!(lines[5].chars().count() > 48);
    }

    #[test]
    fn pads_multibyte_names_by_character() {
        assert_eq!(pad_text("Café", 6), "Café  ");
        assert_eq!(pad_text("Crème brûlée", 5), "Crème");
        assert_eq!(pad_number("1.00", 6), "  1.00");
        assert_eq!(pad_number("123456", 3), "123456");
    }

    #[test]
    fn rendering_is_idempotent() {
        let layout = layout();
        let priced = sample().price(0.19).unwrap();
        assert_eq!(layout.render(&priced), layout.render(&priced));
        assert!(layout.render(&priced).ends_with("Thank you!\n"));
    }

    #[test]
    fn parses_request_with_numeric_product_id() {
        let request: PrintReceiptRequest = serde_json::from_str(
            r#"{"receipt_data":{"items":[
                {"name":"Coffee","product_id":1001,"quantity":2,"price":2.5},
                {"name":"Water","product_id":"W-1","quantity":1,"price":1}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(request.receipt_data.items[0].product_id, "1001");
        assert_eq!(request.receipt_data.items[1].product_id, "W-1");
        assert_eq!(request.receipt_data.items[1].price, 1.0);
    }
}
