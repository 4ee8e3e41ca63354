//! Ordered route table

use super::route::Route;
use std::sync::Arc;

/// Routes in registration order; lookups return the first match
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. A duplicate key is kept but shadowed by the earlier route.
    pub fn add(&mut self, route: Route) -> Arc<Route> {
        if self.routes.iter().any(|r| r.key() == route.key()) {
            log::warn!(
                target: "lonewolf::router",
                "route key {:?} registered twice; the first registration wins",
                route.key()
            );
        }
        let route = Arc::new(route);
        self.routes.push(Arc::clone(&route));
        route
    }

    /// First route satisfying the predicate
    pub fn find<P>(&self, predicate: P) -> Option<Arc<Route>>
    where
        P: Fn(&Route) -> bool,
    {
        self.routes.iter().find(|r| predicate(r)).cloned()
    }

    /// First route whose key equals `key`
    pub fn find_by_key(&self, key: &str) -> Option<Arc<Route>> {
        self.find(|r| r.key() == key)
    }

    /// First route matching the location
    pub fn find_by_location(&self, location: &str) -> Option<Arc<Route>> {
        self.find(|r| r.matches(location))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }
}
