// ABOUTME: Service health check configuration.
// ABOUTME: A health check is either an HTTP GET expecting 2xx or a shell command.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthcheckConfig {
    /// HTTP endpoint, healthy on any 2xx response.
    Url(String),
    /// Shell command, healthy on exit status 0.
    Cmd(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Entry {
        #[serde(with = "serde_yaml::with::singleton_map")]
        health: HealthcheckConfig,
    }

    fn parse(yaml: &str) -> HealthcheckConfig {
        serde_yaml::from_str::<Entry>(yaml).unwrap().health
    }

    #[test]
    fn block_and_flow_maps_parse() {
        assert_eq!(
            parse("health:\n  url: http://127.0.0.1:8200/v1/sys/health\n"),
            HealthcheckConfig::Url("http://127.0.0.1:8200/v1/sys/health".to_string())
        );
        assert_eq!(
            parse("health: { cmd: \"vault status\" }\n"),
            HealthcheckConfig::Cmd("vault status".to_string())
        );
    }

    #[test]
    fn unknown_probe_kind_is_rejected() {
        assert!(serde_yaml::from_str::<Entry>("health:\n  tcp: 8200\n").is_err());
    }
}
