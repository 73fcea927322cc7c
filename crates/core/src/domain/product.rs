use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Stable store-assigned identity of a product row.
pub type ProductId = i64;

/// A persistent inventory record.
///
/// Invariant: `stock` is never negative at rest. The store enforces this on
/// every write; `validate` re-checks it for rows entering the system through
/// seeds or fixtures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    pub stock: i64,
}

impl Product {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "product {} has an empty name",
                self.id
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(DomainError::InvariantViolation(format!(
                "product {} has an invalid price {}",
                self.id, self.price
            )));
        }
        if self.stock < 0 {
            return Err(DomainError::InvariantViolation(format!(
                "product {} has negative stock {}",
                self.id, self.stock
            )));
        }
        Ok(())
    }
}
