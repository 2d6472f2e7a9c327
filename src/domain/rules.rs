//! Access rules — blacklist/whitelist entries managed on the controller.
//!
//! The store itself lives upstream; this module is the console-side model and
//! the strict target validation performed before any network call.

use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Blacklist,
    Whitelist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    /// Authored through this console; mutable and deletable.
    Operator,
    /// Installed by the controller itself; read-only from here.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct AccessRule {
    pub id: String,
    pub ip: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub reason: String,
    /// `None` means permanent.
    pub expire_time: Option<DateTime<Utc>>,
    pub source: RuleSource,
    pub status: RuleStatus,
}

/// Payload for creating a rule upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessRule {
    pub ip: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub reason: String,
    pub expire_time: Option<DateTime<Utc>>,
    pub source: RuleSource,
    pub status: RuleStatus,
}

impl NewAccessRule {
    /// Assemble an operator-authored rule, filling the default reason for the
    /// rule kind when none was given. The target must already be validated.
    pub fn operator(
        ip: &str,
        kind: RuleKind,
        reason: Option<&str>,
        duration: RuleDuration,
        now: DateTime<Utc>,
    ) -> Self {
        let reason = match reason {
            Some(r) if !r.trim().is_empty() => r.to_string(),
            _ => default_reason(kind).to_string(),
        };
        Self {
            ip: ip.to_string(),
            kind,
            reason,
            expire_time: duration.expire_at(now),
            source: RuleSource::Operator,
            status: RuleStatus::Active,
        }
    }
}

pub fn default_reason(kind: RuleKind) -> &'static str {
    match kind {
        RuleKind::Blacklist => "manually blocked by operator",
        RuleKind::Whitelist => "manually trusted by operator",
    }
}

/// How long a new rule stays active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDuration {
    Permanent,
    OneHour,
    OneDay,
    OneWeek,
}

impl RuleDuration {
    pub fn expire_at(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Permanent => None,
            Self::OneHour => Some(now + Duration::hours(1)),
            Self::OneDay => Some(now + Duration::hours(24)),
            Self::OneWeek => Some(now + Duration::days(7)),
        }
    }
}

impl std::str::FromStr for RuleDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permanent" => Ok(Self::Permanent),
            "1h" => Ok(Self::OneHour),
            "24h" => Ok(Self::OneDay),
            "7d" => Ok(Self::OneWeek),
            other => Err(format!(
                "unknown duration '{other}' (expected permanent, 1h, 24h or 7d)"
            )),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target address is required")]
    EmptyAddress,
    #[error("'{0}' is not a valid IPv4 address")]
    InvalidIp(String),
    #[error("'{0}' is not a valid CIDR block")]
    InvalidCidr(String),
}

/// Validate a rule target before it goes anywhere near the network.
///
/// A literal address must be a strict dotted quad; a target containing `/`
/// must be dotted quad plus a 0–32 prefix length.
pub fn validate_target(target: &str) -> Result<(), ValidationError> {
    if target.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    if let Some((addr, prefix)) = target.split_once('/') {
        if !is_strict_ipv4(addr) || !is_prefix_len(prefix) {
            return Err(ValidationError::InvalidCidr(target.to_string()));
        }
        Ok(())
    } else if is_strict_ipv4(target) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIp(target.to_string()))
    }
}

fn is_strict_ipv4(s: &str) -> bool {
    let mut octets = 0;
    for part in s.split('.') {
        octets += 1;
        if octets > 4 || !is_decimal_octet(part, 255) {
            return false;
        }
    }
    octets == 4
}

fn is_prefix_len(s: &str) -> bool {
    is_decimal_octet(s, 32)
}

fn is_decimal_octet(s: &str, max: u16) -> bool {
    if s.is_empty() || s.len() > 3 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    // No leading zeros: "01" and "007" are rejected, "0" is fine.
    if s.len() > 1 && s.starts_with('0') {
        return false;
    }
    s.parse::<u16>().map(|v| v <= max).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        for target in ["192.168.1.100", "0.0.0.0", "255.255.255.255", "8.8.8.8"] {
            assert_eq!(validate_target(target), Ok(()), "{target}");
        }
    }

    #[test]
    fn accepts_cidr_blocks() {
        for target in ["10.0.0.0/8", "10.0.0.0/0", "192.168.0.0/24", "1.2.3.4/32"] {
            assert_eq!(validate_target(target), Ok(()), "{target}");
        }
    }

    #[test]
    fn rejects_empty_address() {
        assert_eq!(validate_target(""), Err(ValidationError::EmptyAddress));
    }

    #[test]
    fn rejects_malformed_addresses() {
        for target in [
            "256.1.1.1",
            "1.2.3",
            "1.2.3.4.5",
            "a.b.c.d",
            "01.2.3.4",
            "1.2.3.",
            " 1.2.3.4",
        ] {
            assert!(
                matches!(validate_target(target), Err(ValidationError::InvalidIp(_))),
                "{target}"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_prefix() {
        assert!(matches!(
            validate_target("10.0.0.0/40"),
            Err(ValidationError::InvalidCidr(_))
        ));
        assert!(matches!(
            validate_target("10.0.0.0/"),
            Err(ValidationError::InvalidCidr(_))
        ));
        assert!(matches!(
            validate_target("10.0.0.0/07"),
            Err(ValidationError::InvalidCidr(_))
        ));
        assert!(matches!(
            validate_target("299.0.0.0/8"),
            Err(ValidationError::InvalidCidr(_))
        ));
    }

    #[test]
    fn durations_resolve_to_expiry() {
        let now = Utc::now();
        assert_eq!(RuleDuration::Permanent.expire_at(now), None);
        assert_eq!(
            RuleDuration::OneHour.expire_at(now),
            Some(now + Duration::hours(1))
        );
        assert_eq!(
            RuleDuration::OneWeek.expire_at(now),
            Some(now + Duration::days(7))
        );
    }

    #[test]
    fn blank_reason_falls_back_to_default() {
        let rule = NewAccessRule::operator(
            "1.2.3.4",
            RuleKind::Blacklist,
            Some("   "),
            RuleDuration::Permanent,
            Utc::now(),
        );
        assert_eq!(rule.reason, default_reason(RuleKind::Blacklist));
        assert_eq!(rule.source, RuleSource::Operator);
        assert_eq!(rule.status, RuleStatus::Active);
    }
}
