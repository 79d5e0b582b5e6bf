//! Request line items and the normalizer that turns them into a [`NormalizedBatch`].
//!
//! Clients send items as `{"id": .., "quantity": ..}` (older clients use `cantidad`),
//! with integers either as JSON numbers or numeric strings. Anything that does not
//! parse to a positive integer rejects the whole request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Integer field as it arrives on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInt {
    Int(i64),
    Text(String),
    Other(Value),
}

impl RawInt {
    fn as_i64(&self) -> Option<i64> {
        match self {
            RawInt::Int(v) => Some(*v),
            RawInt::Text(s) => s.trim().parse().ok(),
            RawInt::Other(_) => None,
        }
    }
}

impl From<i64> for RawInt {
    fn from(v: i64) -> Self {
        RawInt::Int(v)
    }
}

impl From<&Value> for RawInt {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_i64().map(RawInt::Int).unwrap_or_else(|| RawInt::Other(value.clone())),
            Value::String(s) => RawInt::Text(s.clone()),
            other => RawInt::Other(other.clone()),
        }
    }
}

/// One entry of the `items` array.
///
/// Decoding never fails: an entry that is not an object, or whose fields are
/// missing or mistyped, keeps `None` there and is rejected by [`normalize`]
/// with its index. `quantity` wins over `cantidad` when both are present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct RawLineItem {
    pub id: Option<RawInt>,
    pub quantity: Option<RawInt>,
}

impl RawLineItem {
    pub fn new(id: impl Into<RawInt>, quantity: impl Into<RawInt>) -> Self {
        Self { id: Some(id.into()), quantity: Some(quantity.into()) }
    }
}

impl From<Value> for RawLineItem {
    fn from(value: Value) -> Self {
        let Value::Object(fields) = value else {
            return Self { id: None, quantity: None };
        };
        let field = |name: &str| fields.get(name).filter(|v| !v.is_null()).map(RawInt::from);
        Self { id: field("id"), quantity: field("quantity").or_else(|| field("cantidad")) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("item {index} has an invalid product id; ids must be positive integers")]
    InvalidProductId { index: usize },
    #[error("item {index} has an invalid quantity; quantities must be positive integers")]
    InvalidQuantity { index: usize },
    #[error("combined quantity for product {product_id} is out of range")]
    QuantityOverflow { product_id: ProductId },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidProductId { .. } => "invalid_product_id",
            ValidationError::InvalidQuantity { .. } => "invalid_quantity",
            ValidationError::QuantityOverflow { .. } => "quantity_overflow",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Line items with unique product ids, iterated in ascending id order.
///
/// Ascending order is the lock order used by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    items: BTreeMap<ProductId, i64>,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quantity_of(&self, product_id: ProductId) -> Option<i64> {
        self.items.get(&product_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = LineItem> + '_ {
        self.items
            .iter()
            .map(|(product_id, quantity)| LineItem { product_id: *product_id, quantity: *quantity })
    }
}

/// Validates every raw item and merges duplicates by summing their quantities.
///
/// Fails on the first invalid entry; nothing is returned for the valid ones.
pub fn normalize(raw_items: &[RawLineItem]) -> Result<NormalizedBatch, ValidationError> {
    let mut items: BTreeMap<ProductId, i64> = BTreeMap::new();
    for (index, raw) in raw_items.iter().enumerate() {
        let id = raw
            .id
            .as_ref()
            .and_then(RawInt::as_i64)
            .filter(|v| *v > 0)
            .ok_or(ValidationError::InvalidProductId { index })?;
        let quantity = raw
            .quantity
            .as_ref()
            .and_then(RawInt::as_i64)
            .filter(|v| *v > 0)
            .ok_or(ValidationError::InvalidQuantity { index })?;
        let product_id = ProductId(id);
        let entry = items.entry(product_id).or_insert(0);
        *entry = entry
            .checked_add(quantity)
            .ok_or(ValidationError::QuantityOverflow { product_id })?;
    }
    Ok(NormalizedBatch { items })
}
