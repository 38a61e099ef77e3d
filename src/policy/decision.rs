//! Telemetry collection policy.
//!
//! Consulted before a payload is staged. Denied payloads are skipped, not
//! treated as errors.

use crate::config::Config;
use crate::log_event;
use crate::logging::structured::LogContext;
use crate::validation::tags::{TelemetryClass, TelemetryType};

/// Whether a telemetry type may be collected.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    Allowed,
    Denied(String), // reason
}

impl PolicyDecision {
    pub fn as_str(&self) -> &str {
        match self {
            PolicyDecision::Allowed => "allowed",
            PolicyDecision::Denied(_) => "denied",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }
}

/// Evaluate the collection policy for one telemetry type.
///
/// # Decision Tree
/// 1. Telemetry disabled -> Denied
/// 2. Type on the deny list -> Denied
/// 3. Non-empty allow list without the type -> Denied
/// 4. OPT-OUT class with opt-out collection disabled -> Denied
/// 5. OPT-IN class without opt-in consent -> Denied
/// 6. Otherwise -> Allowed
pub fn evaluate(
    config: &Config,
    telemetry_type: &TelemetryType,
    class: TelemetryClass,
) -> PolicyDecision {
    let decision = decide(config, telemetry_type.as_str(), class);

    let ctx = LogContext::component("policy").with("type", telemetry_type);
    match &decision {
        PolicyDecision::Allowed => log_event!(
            debug,
            ctx,
            "POLICY_DECISION",
            class = class,
            decision = decision.as_str()
        ),
        PolicyDecision::Denied(reason) => log_event!(
            info,
            ctx,
            "POLICY_DECISION",
            class = class,
            decision = decision.as_str(),
            reason = format!("{:?}", reason)
        ),
    }

    decision
}

fn decide(config: &Config, telemetry_type: &str, class: TelemetryClass) -> PolicyDecision {
    let policy = &config.classes;

    if !config.enabled {
        return PolicyDecision::Denied("telemetry is disabled".to_string());
    }
    if policy.deny.iter().any(|t| t == telemetry_type) {
        return PolicyDecision::Denied("type is on the deny list".to_string());
    }
    if !policy.allow.is_empty() && !policy.allow.iter().any(|t| t == telemetry_type) {
        return PolicyDecision::Denied("type is not on the allow list".to_string());
    }

    match class {
        TelemetryClass::Mandatory => PolicyDecision::Allowed,
        TelemetryClass::OptOut if policy.opt_out => PolicyDecision::Allowed,
        TelemetryClass::OptOut => {
            PolicyDecision::Denied("client opted out of OPT-OUT telemetry".to_string())
        }
        TelemetryClass::OptIn if policy.opt_in => PolicyDecision::Allowed,
        TelemetryClass::OptIn => {
            PolicyDecision::Denied("client has not opted in to OPT-IN telemetry".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(raw: &str) -> TelemetryType {
        TelemetryType::parse(raw).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::new("http://localhost");
        assert!(evaluate(&config, &ty("SLE-SERVER-Test"), TelemetryClass::Mandatory).is_allowed());
        assert!(evaluate(&config, &ty("SLE-SERVER-Test"), TelemetryClass::OptOut).is_allowed());

        let decision = evaluate(&config, &ty("SLE-SERVER-Test"), TelemetryClass::OptIn);
        assert_eq!(decision.as_str(), "denied");
    }

    #[test]
    fn test_disabled_denies_mandatory() {
        let mut config = Config::new("http://localhost");
        config.enabled = false;
        assert!(!evaluate(&config, &ty("SLE-SERVER-Test"), TelemetryClass::Mandatory).is_allowed());
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let mut config = Config::new("http://localhost");
        config.classes.allow = vec!["SLE-SERVER-Pkgs".to_string()];
        config.classes.deny = vec!["SLE-SERVER-Pkgs".to_string()];
        assert_eq!(
            evaluate(&config, &ty("SLE-SERVER-Pkgs"), TelemetryClass::Mandatory),
            PolicyDecision::Denied("type is on the deny list".to_string())
        );
    }

    #[test]
    fn test_allow_list_restricts() {
        let mut config = Config::new("http://localhost");
        config.classes.allow = vec!["SLE-SERVER-Pkgs".to_string()];
        assert!(evaluate(&config, &ty("SLE-SERVER-Pkgs"), TelemetryClass::OptOut).is_allowed());
        assert!(!evaluate(&config, &ty("SLE-SERVER-Other"), TelemetryClass::OptOut).is_allowed());
    }

    #[test]
    fn test_class_consent() {
        let mut config = Config::new("http://localhost");
        config.classes.opt_out = false;
        config.classes.opt_in = true;
        assert!(!evaluate(&config, &ty("SLE-SERVER-Test"), TelemetryClass::OptOut).is_allowed());
        assert!(evaluate(&config, &ty("SLE-SERVER-Test"), TelemetryClass::OptIn).is_allowed());
    }
}
