use std::sync::Arc;

use super::catalog::PlanCatalog;
use super::tier::Tier;

/// Derives a contact's tier from its tag set.
///
/// Tiers are tried highest first, so a contact that still carries an older,
/// lower plan tag after an upgrade resolves to the higher plan. Contacts
/// without any plan tag are on [`Tier::Free`].
#[derive(Clone, Debug, Default)]
pub struct PlanResolver {
    catalog: Arc<PlanCatalog>,
}

impl PlanResolver {
    #[must_use]
    pub fn new(catalog: Arc<PlanCatalog>) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn resolve<I, S>(&self, tags: I) -> Tier
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let present: Vec<Tier> = tags
            .into_iter()
            .filter_map(|tag| self.catalog.tier_for_tag(tag.as_ref()))
            .collect();

        self.catalog
            .tier_order()
            .iter()
            .rev()
            .find(|tier| present.contains(tier))
            .copied()
            .unwrap_or(Tier::Free)
    }
}
