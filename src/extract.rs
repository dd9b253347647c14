//! Price table row extraction.
//!
//! Structural transform only: cells map to fields by column position and
//! text is kept as rendered. A missing cell yields an empty field.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

/// One row of the reference price table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: String,
    pub drug_name: String,
    pub producer: String,
    pub mnn: String,
    pub registration_number: String,
    pub price: Option<String>,
    pub currency: Option<String>,
}

impl Record {
    /// CSV header, in field order.
    pub const COLUMNS: [&'static str; 7] = [
        "id",
        "drug_name",
        "producer",
        "mnn",
        "registration_number",
        "price",
        "currency",
    ];
}

/// Compiled selectors for one table layout.
#[derive(Debug, Clone)]
pub struct RowExtractor {
    data_row: Selector,
    cells: [Selector; 5],
    price: Selector,
    currency: Selector,
}

impl RowExtractor {
    /// `data_row` is matched inside the table body; placeholder rows never
    /// match it.
    pub fn new(data_row: &str) -> Result<Self, String> {
        let parse = |s: &str| Selector::parse(s).map_err(|e| format!("{}: {:?}", s, e));
        Ok(Self {
            data_row: parse(data_row)?,
            cells: [
                parse("td:nth-child(1)")?,
                parse("td:nth-child(2)")?,
                parse("td:nth-child(3)")?,
                parse("td:nth-child(4)")?,
                parse("td:nth-child(5)")?,
            ],
            price: parse("td:nth-child(6) span")?,
            currency: parse("td:nth-child(6) span:nth-child(2)")?,
        })
    }

    /// Records for every data row in `tbody_markup` (the inner HTML of the
    /// table body), in document order.
    pub fn extract(&self, tbody_markup: &str) -> Vec<Record> {
        // Bare <tr> fragments are dropped by the HTML parser outside a table.
        let document = Html::parse_document(&format!(
            "<table><tbody>{}</tbody></table>",
            tbody_markup
        ));

        document
            .select(&self.data_row)
            .map(|row| self.record(row))
            .collect()
    }

    fn record(&self, row: ElementRef<'_>) -> Record {
        let [id, drug_name, producer, mnn, registration_number] =
            self.cells.each_ref().map(|sel| first_text(row, sel).unwrap_or_default());

        Record {
            id,
            drug_name,
            producer,
            mnn,
            registration_number,
            price: first_text(row, &self.price).map(|p| p.replace(' ', "")),
            currency: first_text(row, &self.currency),
        }
    }
}

fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
}
