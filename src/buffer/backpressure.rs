use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What `accept` does when the ingress queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicyKind {
    DropNewest,
    BlockWithTimeout,
}

impl FromStr for OverflowPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "drop-newest" | "drop" => Ok(OverflowPolicyKind::DropNewest),
            "block-with-timeout" | "block" => Ok(OverflowPolicyKind::BlockWithTimeout),
            other => Err(format!(
                "unknown overflow policy '{other}', expected drop-newest or block-with-timeout"
            )),
        }
    }
}

impl fmt::Display for OverflowPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicyKind::DropNewest => f.write_str("drop-newest"),
            OverflowPolicyKind::BlockWithTimeout => f.write_str("block-with-timeout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the incoming event.
    #[default]
    DropNewest,
    /// Wait for space up to the given duration, then discard.
    BlockWithTimeout(Duration),
}

impl OverflowPolicy {
    pub fn from_kind(kind: OverflowPolicyKind, block_timeout: Duration) -> Self {
        match kind {
            OverflowPolicyKind::DropNewest => OverflowPolicy::DropNewest,
            OverflowPolicyKind::BlockWithTimeout => OverflowPolicy::BlockWithTimeout(block_timeout),
        }
    }

    pub fn kind(&self) -> OverflowPolicyKind {
        match self {
            OverflowPolicy::DropNewest => OverflowPolicyKind::DropNewest,
            OverflowPolicy::BlockWithTimeout(_) => OverflowPolicyKind::BlockWithTimeout,
        }
    }
}
