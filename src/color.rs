/// Colour utilities for clients and projects.
use rand::RngExt;

use crate::error::RatecardError;

pub const DEFAULT_CLIENT_COLOUR: &str = "#3B82F6";
pub const DEFAULT_PROJECT_COLOUR: &str = "#10B981";

/// Validate if a string is a valid hex colour (e.g., #RRGGBB).
pub fn is_valid_hex(s: &str) -> bool {
    s.starts_with('#') && s.len() == 7 && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Generate a random colour from a predefined palette.
pub fn random_colour() -> String {
    const PALETTE: &[&str] = &[
        "#3B82F6", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#EC4899", "#14B8A6",
        "#F97316", "#6366F1", "#84CC16",
    ];
    let mut rng = rand::rng();
    PALETTE[rng.random_range(0..PALETTE.len())].to_string()
}

/// Resolves a `--colour` argument: absent gives the default, `random` picks
/// from the palette, anything else must be `#RRGGBB`.
pub fn resolve_colour(arg: Option<String>, default: &str) -> Result<String, RatecardError> {
    match arg.as_deref() {
        None => Ok(default.to_string()),
        Some("random") => Ok(random_colour()),
        Some(c) if is_valid_hex(c) => Ok(c.to_uppercase()),
        Some(c) => Err(RatecardError::InvalidColour(c.to_string())),
    }
}
