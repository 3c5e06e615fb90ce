//! Rebate policies: which deposits qualify and how the payout is computed.
//!
//! Policies form an ordered list. Every policy whose rule matches a deposit is
//! a candidate and the **last** candidate wins, so a deployment lists its
//! catch-all first and narrower overrides after it.

use alloy_primitives::Address;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashSet;

use crate::rebate::errors::RebateError;

/// Payout formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RebateType {
    /// The configured flat amount
    Flat,
    /// Source-chain gas cost converted to the payout token, capped in USD
    GasFeeBased,
}

/// When a policy applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MatchRule {
    /// Every deposit
    All,
    /// Deposits of one of `tokens` (L1 addresses) created within `[start, end)`
    Tokens {
        tokens: HashSet<Address>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl MatchRule {
    pub(crate) fn matches(&self, created_at: DateTime<Utc>, l1_token: &Address) -> bool {
        match self {
            MatchRule::All => true,
            MatchRule::Tokens { tokens, start, end } => {
                (*start..*end).contains(&created_at) && tokens.contains(l1_token)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Policy {
    pub(crate) name: String,
    pub(crate) rule: MatchRule,
    /// Recipient must never have been paid and must have a zero nonce
    pub(crate) check_if_first: bool,
    /// Recipient must hold no native balance
    pub(crate) check_if_no_gas: bool,
    /// Minimum deposit value in USD; zero disables the check
    pub(crate) min_usd_equal: f64,
    pub(crate) rebate_type: RebateType,
}

impl Policy {
    /// Built-in catch-all used when no policy file is configured
    pub(crate) fn default_catch_all() -> Self {
        Policy {
            name: "Default".to_string(),
            rule: MatchRule::All,
            check_if_first: true,
            check_if_no_gas: true,
            min_usd_equal: 200.0,
            rebate_type: RebateType::Flat,
        }
    }
}

/// Policy as written in the JSON policy file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyEntry {
    name: String,
    #[serde(default)]
    match_all: bool,
    #[serde(default)]
    match_tokens: Vec<Address>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    check_if_first: bool,
    #[serde(default)]
    check_if_no_gas: bool,
    #[serde(default)]
    min_usd_equal: f64,
    rebate_type: RebateType,
}

impl From<PolicyEntry> for Policy {
    fn from(entry: PolicyEntry) -> Self {
        let rule = if entry.match_all {
            MatchRule::All
        } else {
            MatchRule::Tokens {
                tokens: entry.match_tokens.into_iter().collect(),
                start: entry.start.unwrap_or(DateTime::UNIX_EPOCH),
                end: entry.end.unwrap_or_else(default_window_end),
            }
        };
        Policy {
            name: entry.name,
            rule,
            check_if_first: entry.check_if_first,
            check_if_no_gas: entry.check_if_no_gas,
            min_usd_equal: entry.min_usd_equal,
            rebate_type: entry.rebate_type,
        }
    }
}

fn default_window_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2099, 12, 31, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Ordered policies with exactly one catch-all.
#[derive(Debug, Clone)]
pub(crate) struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    pub(crate) fn new(policies: Vec<Policy>) -> Result<Self, RebateError> {
        let catch_alls = policies
            .iter()
            .filter(|p| p.rule == MatchRule::All)
            .count();
        if catch_alls != 1 {
            return Err(RebateError::Config(format!(
                "expected exactly one catch-all policy, found {catch_alls}"
            )));
        }
        Ok(Self { policies })
    }

    /// Reads a JSON array of policies, or falls back to the built-in catch-all.
    pub(crate) fn load(path: Option<&str>) -> Result<Self, RebateError> {
        let Some(path) = path else {
            return Self::new(vec![Policy::default_catch_all()]);
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RebateError::Config(format!("cannot read policy file {path}: {e}")))?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<Self, RebateError> {
        let entries: Vec<PolicyEntry> = serde_json::from_str(raw)
            .map_err(|e| RebateError::Config(format!("invalid policy file: {e}")))?;
        Self::new(entries.into_iter().map(Policy::from).collect())
    }

    /// The last policy matching the deposit, if any.
    pub(crate) fn select(&self, created_at: DateTime<Utc>, l1_token: &Address) -> Option<&Policy> {
        self.policies
            .iter()
            .filter(|p| p.rule.matches(created_at, l1_token))
            .last()
    }

    pub(crate) fn len(&self) -> usize {
        self.policies.len()
    }
}
