use axum::Router;

use crate::app::AppContext;

/// A group of routes that share a prefix and the [`AppContext`] state.
///
/// ```ignore
/// struct PlanRoutes;
///
/// impl RouteModule for PlanRoutes {
///     fn routes(&self) -> Router<AppContext> {
///         Router::new().route("/{tier}/access", get(check_access))
///     }
///
///     fn prefix(&self) -> Option<&str> {
///         Some("/api/plans")
///     }
/// }
/// ```
pub trait RouteModule {
    /// Routes without state applied; the app supplies it when serving.
    fn routes(&self) -> Router<AppContext>;

    fn prefix(&self) -> Option<&str> {
        None
    }

    /// Nest or merge this module into `router`.
    fn register(self, router: Router<AppContext>) -> Router<AppContext>
    where
        Self: Sized,
    {
        let routes = self.routes();

        if let Some(prefix) = self.prefix() {
            router.nest(prefix, routes)
        } else {
            router.merge(routes)
        }
    }
}
