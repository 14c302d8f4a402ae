use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlanGateError;

/// Subscription tier.
///
/// Declaration order is the tier order: `Free < Starter < Pro < Enterprise`.
/// "At least" checks compare positions in this order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    /// All tiers, lowest to highest.
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Starter, Tier::Pro, Tier::Enterprise];

    /// Lowercase name, as used in tags, routes and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Position in the tier order (0 = lowest).
    #[must_use]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// `true` if `self` grants everything `other` grants.
    #[must_use]
    pub fn is_at_least(&self, other: Tier) -> bool {
        self.index() >= other.index()
    }

    /// The next tier up, if any.
    #[must_use]
    pub fn next(&self) -> Option<Tier> {
        Tier::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = PlanGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == normalized)
            .ok_or_else(|| PlanGateError::BadRequest(format!("Unknown plan '{}'", s.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_tier() -> impl Strategy<Value = Tier> {
        prop::sample::select(Tier::ALL.to_vec())
    }

    #[test]
    fn test_order_is_fixed() {
        assert_eq!(Tier::Free.index(), 0);
        assert_eq!(Tier::Starter.index(), 1);
        assert_eq!(Tier::Pro.index(), 2);
        assert_eq!(Tier::Enterprise.index(), 3);
        assert!(Tier::Free < Tier::Enterprise);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Pro".parse::<Tier>().unwrap(), Tier::Pro);
        assert_eq!(" ENTERPRISE ".parse::<Tier>().unwrap(), Tier::Enterprise);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Tier::Starter).unwrap(), "\"starter\"");
        let tier: Tier = serde_json::from_str("\"enterprise\"").unwrap();
        assert_eq!(tier, Tier::Enterprise);
    }

    #[test]
    fn test_next() {
        assert_eq!(Tier::Free.next(), Some(Tier::Starter));
        assert_eq!(Tier::Pro.next(), Some(Tier::Enterprise));
        assert_eq!(Tier::Enterprise.next(), None);
    }

    proptest! {
        /// is_at_least agrees with the index order for every pair.
        #[test]
        fn is_at_least_matches_index_order(a in any_tier(), b in any_tier()) {
            prop_assert_eq!(a.is_at_least(b), a.index() >= b.index());
        }

        /// Enterprise satisfies every requirement.
        #[test]
        fn enterprise_is_at_least_everything(b in any_tier()) {
            prop_assert!(Tier::Enterprise.is_at_least(b));
        }

        /// Display and FromStr agree.
        #[test]
        fn display_parses_back(a in any_tier()) {
            prop_assert_eq!(a.to_string().parse::<Tier>().unwrap(), a);
        }
    }
}
