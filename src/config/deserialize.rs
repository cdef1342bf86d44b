// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Enforces a non-empty service list.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::ServiceConfig;

pub fn deserialize_services<'de, D>(deserializer: D) -> Result<NonEmpty<ServiceConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let services: Vec<ServiceConfig> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(services)
        .ok_or_else(|| serde::de::Error::custom("at least one service is required"))
}
