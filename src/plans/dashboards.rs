//! Embedded analytics dashboards and the minimum tier for each.

use serde::Serialize;

use super::tier::Tier;

/// An embeddable third-party dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Lowest tier that may open this dashboard.
    pub min_tier: Tier,
    pub widgets: Vec<String>,
}

impl Dashboard {
    pub fn new(id: &str, name: &str, min_tier: Tier) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            min_tier,
            widgets: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    #[must_use]
    pub fn widgets<I, S>(mut self, widgets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.widgets.extend(widgets.into_iter().map(Into::into));
        self
    }
}

/// The set of dashboards the product can embed.
#[derive(Clone, Debug)]
pub struct DashboardCatalog {
    dashboards: Vec<Dashboard>,
}

impl DashboardCatalog {
    #[must_use]
    pub fn new(dashboards: Vec<Dashboard>) -> Self {
        Self { dashboards }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Dashboard> {
        self.dashboards.iter().find(|d| d.id == id)
    }

    /// Dashboards a session on `tier` may open.
    #[must_use]
    pub fn available_for(&self, tier: Tier) -> Vec<&Dashboard> {
        self.dashboards
            .iter()
            .filter(|d| tier.is_at_least(d.min_tier))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dashboards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dashboards.is_empty()
    }
}

impl Default for DashboardCatalog {
    fn default() -> Self {
        Self::new(vec![
            Dashboard::new("basic_analytics", "Basic Analytics", Tier::Free)
                .description("Basic usage statistics and performance metrics")
                .widgets(["usage_stats", "request_timeline", "error_rates"]),
            Dashboard::new("advanced_analytics", "Advanced Analytics", Tier::Starter)
                .description("Detailed analytics with API usage and scheduling")
                .widgets(["usage_stats", "api_calls", "scheduled_jobs", "performance_metrics"]),
            Dashboard::new("api_monitoring", "API Monitoring", Tier::Starter)
                .description("Monitor API calls, response times, and errors")
                .widgets(["api_requests", "response_times", "error_tracking", "rate_limits"]),
            Dashboard::new("comprehensive_analytics", "Comprehensive Analytics", Tier::Pro)
                .description("Full analytics suite with team collaboration")
                .widgets(["usage_stats", "team_activity", "project_metrics", "cost_analysis"]),
            Dashboard::new("team_dashboard", "Team Dashboard", Tier::Pro)
                .description("Team collaboration and project management")
                .widgets(["team_performance", "project_status", "collaboration_metrics"]),
            Dashboard::new("advanced_monitoring", "Advanced Monitoring", Tier::Pro)
                .description("Advanced system monitoring and alerts")
                .widgets(["system_health", "alert_management", "performance_trends"]),
            Dashboard::new("custom_reports", "Custom Reports", Tier::Pro)
                .description("Custom reporting and data visualization")
                .widgets(["custom_charts", "report_builder", "data_export"]),
            Dashboard::new("enterprise_overview", "Enterprise Overview", Tier::Enterprise)
                .description("Executive dashboard with key performance indicators")
                .widgets(["kpi_overview", "business_metrics", "executive_summary"]),
            Dashboard::new("operational_dashboard", "Operational Dashboard", Tier::Enterprise)
                .description("Real-time operational monitoring and management")
                .widgets(["system_status", "alert_center", "performance_monitoring"]),
            Dashboard::new("compliance_dashboard", "Compliance Dashboard", Tier::Enterprise)
                .description("Compliance monitoring and audit trails")
                .widgets(["compliance_status", "audit_logs", "security_metrics"]),
            Dashboard::new("multi_region_dashboard", "Multi-Region Dashboard", Tier::Enterprise)
                .description("Global performance and regional analytics")
                .widgets(["regional_performance", "global_metrics", "latency_monitoring"]),
        ])
    }
}
