use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginRejection {
    #[error("origin not allowed: {origin}")]
    NotAllowed { origin: String },
}

/// Validates the Origin header of an upgrade request.
///
/// - A missing or empty Origin header is accepted.
/// - An empty trusted list accepts every origin.
/// - Otherwise the origin must match a trusted entry exactly.
pub fn validate_origin(
    origin_header: Option<&str>,
    trusted_origins: &[String],
) -> Result<(), OriginRejection> {
    let origin = match origin_header {
        None => return Ok(()),
        Some(o) if o.is_empty() => return Ok(()),
        Some(o) => o,
    };

    if trusted_origins.is_empty() || trusted_origins.iter().any(|t| t == origin) {
        return Ok(());
    }

    Err(OriginRejection::NotAllowed {
        origin: origin.to_string(),
    })
}
