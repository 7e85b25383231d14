#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculationError {
    /// Prices of zero or below carry no information and would poison every
    /// downstream margin, so they are rejected before any computation runs.
    #[error("invalid price for {what}: {value}")]
    InvalidPrice { what: String, value: f64 },
}

impl CalculationError {
    pub fn invalid_price(what: impl Into<String>, value: f64) -> Self {
        CalculationError::InvalidPrice { what: what.into(), value }
    }
}
