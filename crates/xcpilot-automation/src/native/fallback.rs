//! Ordered fallback chains for native actions.
//!
//! A chain is a fixed list of tiers tried strictly in sequence. A tier either
//! completes, is rejected (the next tier may try), or fails outright (the chain
//! stops). Reordering or removing a tier is an edit to the tier list only.

use crate::envelope::ErrorEntry;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TapTier {
    /// AXPress through the accessibility tool, which checks the element
    /// advertises the action.
    ValidatedPress,
    /// AXPress issued directly via System Events, skipping that check.
    DirectPress,
    /// Synthesised click at the element's centre.
    CoordinateClick,
}

pub const TAP_TIERS: [TapTier; 3] = [
    TapTier::ValidatedPress,
    TapTier::DirectPress,
    TapTier::CoordinateClick,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTier {
    SetValue,
    /// Tap the element to focus it, then send keystrokes.
    FocusAndKeystroke,
}

pub const TYPE_TIERS: [TypeTier; 2] = [TypeTier::SetValue, TypeTier::FocusAndKeystroke];

pub trait Tier: Copy + Debug {
    fn method(&self) -> &'static str;
}

impl Tier for TapTier {
    fn method(&self) -> &'static str {
        match self {
            TapTier::ValidatedPress => "perform_action",
            TapTier::DirectPress => "AXPress",
            TapTier::CoordinateClick => "coordinate_click",
        }
    }
}

impl Tier for TypeTier {
    fn method(&self) -> &'static str {
        match self {
            TypeTier::SetValue => "AXSetValue",
            TypeTier::FocusAndKeystroke => "keystroke",
        }
    }
}

#[derive(Debug)]
pub enum TierOutcome {
    Completed(Value),
    Rejected(String),
    Failed(ErrorEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection<T> {
    pub tier: T,
    pub reason: String,
}

#[derive(Debug)]
pub enum ChainOutcome<T> {
    Completed {
        tier: T,
        data: Value,
        rejected: Vec<Rejection<T>>,
    },
    Failed {
        tier: T,
        error: ErrorEntry,
        rejected: Vec<Rejection<T>>,
    },
    Exhausted {
        rejected: Vec<Rejection<T>>,
    },
}

/// Human-readable notes for every tier that was passed over.
pub fn fallback_warnings<T: Tier>(rejected: &[Rejection<T>]) -> Vec<String> {
    rejected
        .iter()
        .map(|r| format!("{} rejected ({}); fell back to next strategy", r.tier.method(), r.reason))
        .collect()
}

pub async fn run_tiers<T, F, Fut>(tiers: &[T], mut attempt: F) -> ChainOutcome<T>
where
    T: Tier,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = TierOutcome>,
{
    let mut rejected = Vec::new();
    for &tier in tiers {
        tracing::debug!(?tier, "Attempting tier");
        match attempt(tier).await {
            TierOutcome::Completed(data) => {
                return ChainOutcome::Completed {
                    tier,
                    data,
                    rejected,
                };
            }
            TierOutcome::Rejected(reason) => {
                tracing::info!(?tier, %reason, "Tier rejected");
                rejected.push(Rejection { tier, reason });
            }
            TierOutcome::Failed(error) => {
                return ChainOutcome::Failed {
                    tier,
                    error,
                    rejected,
                };
            }
        }
    }
    ChainOutcome::Exhausted { rejected }
}
