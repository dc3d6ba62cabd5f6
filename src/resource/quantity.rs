//! Kubernetes resource quantities.
//!
//! Quantities keep the string the user wrote (patches never rewrite it) and a
//! numeric value normalized to base units (cores for CPU, bytes for memory)
//! used for zero checks and limit/request comparison.

use std::fmt;

/// A resource quantity such as `500m`, `1.5`, `128Mi` or `1e3`
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    raw: String,
    value: Option<f64>,
}

impl Quantity {
    /// Wrap a quantity string, parsing its numeric value if possible
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let value = parse_quantity(&raw);
        Self { raw, value }
    }

    /// The quantity as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Normalized value in base units, `None` when the string is not a quantity
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Whether the string parsed as a quantity
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    /// Zero quantities are treated as absent by defaulting and validation
    pub fn is_zero(&self) -> bool {
        self.value == Some(0.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&k8s_openapi::apimachinery::pkg::api::resource::Quantity> for Quantity {
    fn from(q: &k8s_openapi::apimachinery::pkg::api::resource::Quantity) -> Self {
        Quantity::new(q.0.clone())
    }
}

/// Parse a quantity string into base units.
///
/// Accepts an optionally signed decimal number followed by a binary suffix
/// (`Ki`..`Ei`), a decimal SI suffix (`n u m k M G T P E`) or a decimal
/// exponent (`e3`, `E-2`). Negative amounts are not valid resource
/// quantities.
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let split = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '+' || c == '-'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    if !number.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let number: f64 = number.parse().ok()?;

    let multiplier = match suffix {
        "" => 1.0,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        other => {
            let exponent = other
                .strip_prefix('e')
                .or_else(|| other.strip_prefix('E'))?;
            10f64.powi(exponent.parse::<i32>().ok()?)
        }
    };

    let value = number * multiplier;
    (value >= 0.0).then_some(value)
}
