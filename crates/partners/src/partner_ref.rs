use serde::{Deserialize, Serialize};

use optimapos_core::{CustomerId, SupplierId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerKind {
    Customer,
    Supplier,
}

/// Reference to the counterparty of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum PartnerRef {
    Customer(CustomerId),
    Supplier(SupplierId),
}

impl PartnerRef {
    pub fn kind(&self) -> PartnerKind {
        match self {
            PartnerRef::Customer(_) => PartnerKind::Customer,
            PartnerRef::Supplier(_) => PartnerKind::Supplier,
        }
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        match self {
            PartnerRef::Customer(id) => Some(*id),
            PartnerRef::Supplier(_) => None,
        }
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        match self {
            PartnerRef::Supplier(id) => Some(*id),
            PartnerRef::Customer(_) => None,
        }
    }
}

impl core::fmt::Display for PartnerRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PartnerRef::Customer(id) => write!(f, "customer:{id}"),
            PartnerRef::Supplier(id) => write!(f, "supplier:{id}"),
        }
    }
}
