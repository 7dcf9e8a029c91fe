use serde::{Deserialize, Serialize};

use optimapos_core::{DomainError, DomainResult, Entity, LocationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Warehouse,
    Shop,
    /// Bookkeeping-only location (returns, scrap, in transit).
    Virtual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLocation {
    pub code: String,
    pub name: String,
    pub kind: LocationKind,
    /// `None` takes the configured default.
    pub allow_negative_stock: Option<bool>,
}

impl NewLocation {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: LocationKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            allow_negative_stock: None,
        }
    }

    pub fn allowing_negative_stock(mut self, allow: bool) -> Self {
        self.allow_negative_stock = Some(allow);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLocation {
    pub id: LocationId,
    pub code: String,
    pub name: String,
    pub kind: LocationKind,
    pub allow_negative_stock: bool,
    pub is_active: bool,
}

impl InventoryLocation {
    pub fn create(id: LocationId, input: NewLocation, default_allow_negative: bool) -> DomainResult<Self> {
        if input.code.trim().is_empty() {
            return Err(DomainError::validation("location code cannot be empty"));
        }
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        Ok(Self {
            id,
            code: input.code.trim().to_string(),
            name: input.name,
            kind: input.kind,
            allow_negative_stock: input.allow_negative_stock.unwrap_or(default_allow_negative),
            is_active: true,
        })
    }

    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::validation(format!(
                "location {} is inactive",
                self.code
            )));
        }
        Ok(())
    }
}

impl Entity for InventoryLocation {
    type Id = LocationId;

    fn id(&self) -> &LocationId {
        &self.id
    }
}
