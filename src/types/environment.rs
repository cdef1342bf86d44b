// ABOUTME: Deployment environment name (production, staging, ...).
// ABOUTME: Shares the DNS-label rules of service names since it names lock files.

use super::service_name::{ServiceNameError, validate_label};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub type EnvironmentError = ServiceNameError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Environment(String);

impl Environment {
    pub fn new(value: &str) -> Result<Self, EnvironmentError> {
        validate_label(value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self("production".to_string())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Environment::new(&s).map_err(serde::de::Error::custom)
    }
}
