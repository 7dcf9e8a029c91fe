use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optimapos_core::decimal::{checked_product, checked_sum, round_cost, round_currency};
use optimapos_core::{DocumentId, DomainError, DomainResult, Entity, LocationId, ProductId, UserId};
use optimapos_partners::PartnerRef;

use crate::document_type::InventoryDirection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub unit_price: Decimal,
}

impl DocumentLine {
    pub fn cost_total(&self) -> DomainResult<Decimal> {
        checked_product(self.quantity, self.unit_cost).map(round_currency)
    }

    pub fn price_total(&self) -> DomainResult<Decimal> {
        checked_product(self.quantity, self.unit_price).map(round_currency)
    }
}

/// Line as supplied by a caller; numbering and rounding happen on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub unit_price: Decimal,
}

impl LineInput {
    pub fn new(product_id: ProductId, quantity: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_cost: Decimal::ZERO,
            unit_price: Decimal::ZERO,
        }
    }

    pub fn with_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn with_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = unit_price;
        self
    }

    /// Build the stored line; `quantity` must already be validated.
    pub(crate) fn into_line(self, line_no: u32, quantity: Decimal) -> DomainResult<DocumentLine> {
        if self.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation(format!("line {line_no}: unit cost cannot be negative")));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation(format!("line {line_no}: unit price cannot be negative")));
        }
        let line = DocumentLine {
            line_no,
            product_id: self.product_id,
            quantity,
            unit_cost: round_cost(self.unit_cost),
            unit_price: round_currency(self.unit_price),
        };
        line.cost_total()?;
        line.price_total()?;
        Ok(line)
    }
}

impl From<&DocumentLine> for LineInput {
    fn from(line: &DocumentLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_cost: line.unit_cost,
            unit_price: line.unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub document_type: String,
    pub partner: Option<PartnerRef>,
    pub location_id: LocationId,
    pub target_location_id: Option<LocationId>,
    pub created_by: UserId,
    pub notes: Option<String>,
    pub lines: Vec<LineInput>,
}

impl NewDocument {
    pub fn new(document_type: impl Into<String>, location_id: LocationId, created_by: UserId) -> Self {
        Self {
            document_type: document_type.into(),
            partner: None,
            location_id,
            target_location_id: None,
            created_by,
            notes: None,
            lines: Vec::new(),
        }
    }

    pub fn with_partner(mut self, partner: PartnerRef) -> Self {
        self.partner = Some(partner);
        self
    }

    pub fn with_target(mut self, location_id: LocationId) -> Self {
        self.target_location_id = Some(location_id);
        self
    }

    pub fn with_line(mut self, line: LineInput) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Business document whose status drives stock effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub number: String,
    pub document_type: String,
    pub status: String,
    pub partner: Option<PartnerRef>,
    pub location_id: LocationId,
    pub target_location_id: Option<LocationId>,
    pub lines: Vec<DocumentLine>,
    pub created_by: UserId,
    pub notes: Option<String>,
    /// Customer credit currently booked for this document.
    pub credit_charged: Decimal,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn line(&self, line_no: u32) -> Option<&DocumentLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn total_cost(&self) -> DomainResult<Decimal> {
        sum_lines(&self.lines, DocumentLine::cost_total)
    }

    pub fn total_price(&self) -> DomainResult<Decimal> {
        sum_lines(&self.lines, DocumentLine::price_total)
    }

    /// Selling value for outgoing documents, cost value for everything else.
    pub fn total(&self, direction: InventoryDirection) -> DomainResult<Decimal> {
        match direction {
            InventoryDirection::Outgoing => self.total_price(),
            _ => self.total_cost(),
        }
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }
}

impl Entity for Document {
    type Id = DocumentId;

    fn id(&self) -> &DocumentId {
        &self.id
    }
}

fn sum_lines(
    lines: &[DocumentLine],
    total: impl Fn(&DocumentLine) -> DomainResult<Decimal>,
) -> DomainResult<Decimal> {
    checked_sum(lines.iter().map(total).collect::<DomainResult<Vec<_>>>()?)
}

/// Cost and price totals of `lines` must both fit a `Decimal`.
pub(crate) fn check_totals(lines: &[DocumentLine]) -> DomainResult<()> {
    sum_lines(lines, DocumentLine::cost_total)?;
    sum_lines(lines, DocumentLine::price_total)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn totals_round_per_line() {
        let p = ProductId::new();
        let doc = Document {
            id: DocumentId::new(),
            number: "SO000001".to_string(),
            document_type: "SO".to_string(),
            status: "draft".to_string(),
            partner: None,
            location_id: LocationId::new(),
            target_location_id: None,
            lines: vec![
                LineInput::new(p, dec!(3))
                    .with_cost(dec!(1.3333))
                    .with_price(dec!(2.005))
                    .into_line(1, dec!(3))
                    .unwrap(),
                LineInput::new(p, dec!(1))
                    .with_cost(dec!(0.5))
                    .with_price(dec!(1))
                    .into_line(2, dec!(1))
                    .unwrap(),
            ],
            created_by: UserId::new(),
            notes: None,
            credit_charged: Decimal::ZERO,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        // 3 * 1.3333 = 3.9999 -> 4.00; price 2.005 -> 2.01, 3 * 2.01 = 6.03
        assert_eq!(doc.total(InventoryDirection::Incoming).unwrap(), dec!(4.50));
        assert_eq!(doc.total(InventoryDirection::Outgoing).unwrap(), dec!(7.03));
    }

    #[test]
    fn line_total_out_of_range_is_rejected() {
        let huge = Decimal::from_i128_with_scale(10_i128.pow(20), 0);
        let err = LineInput::new(ProductId::new(), huge)
            .with_price(Decimal::from(10_000_000_000_i64))
            .into_line(1, huge)
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = LineInput::new(ProductId::new(), dec!(1))
            .with_price(dec!(-1))
            .into_line(1, dec!(1))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
