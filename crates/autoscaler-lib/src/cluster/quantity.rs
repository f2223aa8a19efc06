//! Kubernetes CPU quantity parsing

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid CPU quantity {0:?}")]
pub struct InvalidQuantity(pub String);

/// Parse a CPU quantity into cores.
///
/// Accepts nano (`n`), micro (`u`) and milli (`m`) suffixes as emitted by
/// metrics-server and pod specs, or a plain decimal number of cores.
pub fn parse_cpu_quantity(quantity: &str) -> Result<f64, InvalidQuantity> {
    let trimmed = quantity.trim();
    let invalid = || InvalidQuantity(quantity.to_string());

    let (digits, divisor) = if let Some(value) = trimmed.strip_suffix('n') {
        (value, 1e9)
    } else if let Some(value) = trimmed.strip_suffix('u') {
        (value, 1e6)
    } else if let Some(value) = trimmed.strip_suffix('m') {
        (value, 1e3)
    } else {
        (trimmed, 1.0)
    };

    let value: f64 = digits.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }

    Ok(value / divisor)
}
