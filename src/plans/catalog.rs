//! Plan catalog: the ordered tiers and the CRM tags that mark membership.
//!
//! Plan membership lives in the CRM as tags on a contact. Every tier has one
//! canonical tag (written by signup and plan changes) and any number of
//! aliases that are recognized when reading.
//!
//! ```rust,ignore
//! use plangate::plans::{PlanCatalog, Tier};
//!
//! let catalog = PlanCatalog::builder()
//!     .tag_prefix("acme-plan-")
//!     .alias(Tier::Pro, "legacy-pro")
//!     .build();
//!
//! assert_eq!(catalog.tag_for_tier(Tier::Pro), "acme-plan-pro");
//! assert_eq!(catalog.tier_for_tag("LEGACY-PRO"), Some(Tier::Pro));
//! ```

use std::collections::HashMap;

use super::tier::Tier;

/// Default prefix for canonical plan tags.
pub const DEFAULT_TAG_PREFIX: &str = "siteoptz-plan-";

/// Static, ordered description of the subscription tiers.
#[derive(Clone, Debug)]
pub struct PlanCatalog {
    plans: Vec<PlanDetails>,
    /// Lowercased tag -> tier, covering canonical tags and aliases.
    tags: HashMap<String, Tier>,
}

/// Per-tier catalog entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanDetails {
    pub tier: Tier,
    /// Canonical CRM tag for this tier.
    pub tag: String,
    /// Additional tags that also mark membership.
    pub aliases: Vec<String>,
    pub display_name: String,
    /// Monthly price in whole USD. `None` means custom pricing.
    pub monthly_price_usd: Option<u32>,
    pub upgrade_to: Option<Tier>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PlanCatalog {
    #[must_use]
    pub fn builder() -> PlanCatalogBuilder {
        PlanCatalogBuilder::new()
    }

    /// Tiers from lowest to highest.
    #[must_use]
    pub fn tier_order(&self) -> &'static [Tier] {
        &Tier::ALL
    }

    /// Canonical tag for a tier.
    #[must_use]
    pub fn tag_for_tier(&self, tier: Tier) -> &str {
        &self.details(tier).tag
    }

    /// Tier marked by a tag, if the tag is a known plan tag.
    #[must_use]
    pub fn tier_for_tag(&self, tag: &str) -> Option<Tier> {
        self.tags.get(&tag.trim().to_ascii_lowercase()).copied()
    }

    /// Whether `tag` is any recognized plan tag.
    #[must_use]
    pub fn is_plan_tag(&self, tag: &str) -> bool {
        self.tier_for_tag(tag).is_some()
    }

    #[must_use]
    pub fn is_at_least(&self, a: Tier, b: Tier) -> bool {
        a.is_at_least(b)
    }

    /// Every recognized plan tag (canonical and aliases), in tier order.
    #[must_use]
    pub fn plan_tags(&self) -> Vec<&str> {
        self.plans
            .iter()
            .flat_map(|p| std::iter::once(p.tag.as_str()).chain(p.aliases.iter().map(String::as_str)))
            .collect()
    }

    #[must_use]
    pub fn details(&self, tier: Tier) -> &PlanDetails {
        // `plans` always holds one entry per tier, in tier order.
        &self.plans[tier.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanDetails> {
        self.plans.iter()
    }
}

/// Builder for [`PlanCatalog`].
#[derive(Debug)]
pub struct PlanCatalogBuilder {
    tag_prefix: String,
    default_aliases: bool,
    extra_aliases: Vec<(Tier, String)>,
    display_names: HashMap<Tier, String>,
    prices: HashMap<Tier, Option<u32>>,
}

impl Default for PlanCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanCatalogBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            default_aliases: true,
            extra_aliases: Vec::new(),
            display_names: HashMap::new(),
            prices: HashMap::new(),
        }
    }

    /// Prefix for canonical tags (`<prefix><tier>`).
    #[must_use]
    pub fn tag_prefix(mut self, prefix: &str) -> Self {
        self.tag_prefix = prefix.to_string();
        self
    }

    /// Do not register the `<tier>-plan` / `tier-<tier>` aliases.
    #[must_use]
    pub fn without_default_aliases(mut self) -> Self {
        self.default_aliases = false;
        self
    }

    /// Recognize an additional tag as membership of `tier`.
    #[must_use]
    pub fn alias(mut self, tier: Tier, tag: &str) -> Self {
        self.extra_aliases.push((tier, tag.to_string()));
        self
    }

    #[must_use]
    pub fn display_name(mut self, tier: Tier, name: &str) -> Self {
        self.display_names.insert(tier, name.to_string());
        self
    }

    #[must_use]
    pub fn monthly_price(mut self, tier: Tier, price_usd: Option<u32>) -> Self {
        self.prices.insert(tier, price_usd);
        self
    }

    #[must_use]
    pub fn build(self) -> PlanCatalog {
        let mut plans: Vec<PlanDetails> = Tier::ALL
            .into_iter()
            .map(|tier| {
                let name = tier.as_str();
                let aliases = if self.default_aliases {
                    vec![format!("{}-plan", name), format!("tier-{}", name)]
                } else {
                    Vec::new()
                };
                PlanDetails {
                    tier,
                    tag: format!("{}{}", self.tag_prefix, name).to_ascii_lowercase(),
                    aliases,
                    display_name: self
                        .display_names
                        .get(&tier)
                        .cloned()
                        .unwrap_or_else(|| default_display_name(tier).to_string()),
                    monthly_price_usd: self
                        .prices
                        .get(&tier)
                        .copied()
                        .unwrap_or_else(|| default_price(tier)),
                    upgrade_to: tier.next(),
                }
            })
            .collect();

        for (tier, alias) in self.extra_aliases {
            plans[tier.index()].aliases.push(alias.trim().to_ascii_lowercase());
        }

        let mut tags = HashMap::new();
        for plan in &plans {
            tags.insert(plan.tag.clone(), plan.tier);
            for alias in &plan.aliases {
                tags.insert(alias.clone(), plan.tier);
            }
        }

        PlanCatalog { plans, tags }
    }
}

fn default_display_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "Free",
        Tier::Starter => "Starter",
        Tier::Pro => "Pro",
        Tier::Enterprise => "Enterprise",
    }
}

fn default_price(tier: Tier) -> Option<u32> {
    match tier {
        Tier::Free => Some(0),
        Tier::Starter => Some(29),
        Tier::Pro => Some(99),
        Tier::Enterprise => None,
    }
}
