//! Common type definitions shared across the crate.
//!
//! All entity IDs are UUIDs wrapped in type aliases for better type safety:
//!
//! - [`UserId`]: Tenant user identifier
//! - [`TemplateId`]: Server template identifier
//! - [`DeploymentId`]: Deployment identifier
//! - [`TrialApplicationId`]: Trial application identifier

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type TemplateId = Uuid;
pub type DeploymentId = Uuid;
pub type TrialApplicationId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbrev_uuid_takes_first_eight_chars() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
