//! Backend-keyed resource validation
//!
//! The warehouse renders strftime table names, so its unit combinations
//! conflict at the template level and exactly one unit is allowed. The
//! analytical backend answers every unit with its own parameterized
//! query, so any non-empty subset combines. These are two distinct rule
//! sets on purpose.

use thiserror::Error;

use tablewatch_protocol::{Resource, ResourceError};

/// Why a resource failed validation
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Units that cannot be monitored together on this backend
    #[error("unit combination '{unit}' is not allowed: {reason}")]
    UnitCombination {
        /// The resource's unit string
        unit: String,
        /// Which rule it broke
        reason: &'static str,
    },

    /// URI template does not match the requested unit
    #[error("template '{uri}' does not fit unit '{unit}': {reason}")]
    Template {
        /// The resource's URI
        uri: String,
        /// The offending unit string
        unit: String,
        /// Which rule it broke
        reason: &'static str,
    },

    /// Unit list, timezone, or another field failed to parse
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Lookback window must cover at least one day
    #[error("span_in_days must be at least 1")]
    Span,
}

/// Checks shared by both backends
fn validate_common(resource: &Resource) -> Result<(), ValidationError> {
    resource.units()?;
    resource.offset()?;
    if resource.span_in_days == 0 {
        return Err(ValidationError::Span);
    }
    Ok(())
}

/// Validate a warehouse resource
///
/// # Errors
///
/// Rejects unit combinations, an hourly template without `%H`, and a
/// singular template with any date/hour placeholder.
pub fn validate_warehouse(resource: &Resource) -> Result<(), ValidationError> {
    validate_common(resource)?;
    let units = resource.units()?;

    if units.len() >= 2 {
        return Err(ValidationError::UnitCombination {
            unit: resource.unit.clone(),
            reason: "warehouse templates support exactly one unit",
        });
    }
    if units.hourly() && !resource.uri.contains("%H") {
        return Err(ValidationError::Template {
            uri: resource.uri.clone(),
            unit: resource.unit.clone(),
            reason: "hourly template needs an %H placeholder",
        });
    }
    if units.singular() && has_date_placeholder(&resource.uri) {
        return Err(ValidationError::Template {
            uri: resource.uri.clone(),
            unit: resource.unit.clone(),
            reason: "singular template must not embed date placeholders",
        });
    }
    Ok(())
}

/// Validate an analytical-db resource
///
/// # Errors
///
/// Rejects unparseable fields; any non-empty unit subset is allowed.
pub fn validate_analytical(resource: &Resource) -> Result<(), ValidationError> {
    validate_common(resource)
}

fn has_date_placeholder(uri: &str) -> bool {
    ["%Y", "%m", "%d", "%H"]
        .iter()
        .any(|placeholder| uri.contains(placeholder))
}
