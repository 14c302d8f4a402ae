//! Subscription tiers, the CRM tags that encode them, and tier resolution.

mod catalog;
mod changes;
mod dashboards;
mod resolver;
mod tier;

pub use catalog::{DEFAULT_TAG_PREFIX, PlanCatalog, PlanCatalogBuilder, PlanDetails};
pub use changes::{PlanChange, PlanChangeLog, PlanTransition};
pub use dashboards::{Dashboard, DashboardCatalog};
pub use resolver::PlanResolver;
pub use tier::Tier;
