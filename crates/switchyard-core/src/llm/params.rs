//! Effective generation parameter resolution.
//!
//! Merge order, lowest precedence first:
//! base defaults -> named profile -> caller overrides -> provider name
//! remapping -> constraint validation. A constraint violation is reported
//! as a `Validation` error before any network call is made.

use serde_json::Value;

use switchyard_types::error::{ErrorCategory, ErrorRecord};
use switchyard_types::llm::{GenerationParams, ModelConfig, ParameterConstraint, ParameterKind};

/// Profiles available on every provider unless its config overrides them.
pub const BUILTIN_PROFILES: [&str; 3] = ["creative", "precise", "balanced"];

/// Built-in sampling profile by name.
pub fn builtin_profile(name: &str) -> Option<GenerationParams> {
    let params = match name {
        "creative" => GenerationParams::new()
            .with("temperature", 0.9)
            .with("top_p", 0.95),
        "precise" => GenerationParams::new()
            .with("temperature", 0.2)
            .with("top_p", 0.5),
        "balanced" => GenerationParams::new()
            .with("temperature", 0.7)
            .with("top_p", 0.9),
        _ => return None,
    };
    Some(params)
}

/// Compute the parameters actually sent to a provider.
pub fn resolve_params(
    model: &ModelConfig,
    profile: Option<&str>,
    overrides: &GenerationParams,
) -> Result<GenerationParams, ErrorRecord> {
    let mut params = model.defaults.clone();

    if let Some(name) = profile {
        let profile_params = model
            .profiles
            .get(name)
            .cloned()
            .or_else(|| builtin_profile(name))
            .ok_or_else(|| {
                ErrorRecord::new(
                    ErrorCategory::Validation,
                    format!("unknown parameter profile '{name}'"),
                )
                .with_detail("profile", name)
            })?;
        params.merge(&profile_params);
    }

    params.merge(overrides);

    for (generic, specific) in &model.parameter_mapping {
        if let Some(value) = params.remove(generic) {
            params.insert(specific.clone(), value);
        }
    }

    for (name, constraint) in &model.constraints {
        if let Some(value) = params.get(name) {
            check_constraint(name, value, constraint)?;
        }
    }

    Ok(params)
}

fn check_constraint(
    name: &str,
    value: &Value,
    constraint: &ParameterConstraint,
) -> Result<(), ErrorRecord> {
    let violation = |reason: String| {
        ErrorRecord::new(
            ErrorCategory::Validation,
            format!("parameter '{name}' {reason}"),
        )
        .with_detail("parameter", name)
        .with_detail("value", value.clone())
    };

    if let Some(kind) = constraint.kind {
        let matches = match kind {
            ParameterKind::Integer => value.is_i64() || value.is_u64(),
            ParameterKind::Float => value.is_number(),
            ParameterKind::String => value.is_string(),
            ParameterKind::Boolean => value.is_boolean(),
        };
        if !matches {
            return Err(violation(format!("must be of type {kind}")));
        }
    }

    if let Some(allowed) = &constraint.allowed {
        if !allowed.contains(value) {
            return Err(violation("is not one of the allowed values".to_string()));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = constraint.min {
            if number < min {
                return Err(violation(format!("must be >= {min}, got {number}")));
            }
        }
        if let Some(max) = constraint.max {
            if number > max {
                return Err(violation(format!("must be <= {max}, got {number}")));
            }
        }
    } else if constraint.min.is_some() || constraint.max.is_some() {
        return Err(violation("must be numeric".to_string()));
    }

    Ok(())
}
