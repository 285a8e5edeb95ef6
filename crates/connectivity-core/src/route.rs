//! Path-prefix routing to backend destinations.
//!
//! Routing is an ordered, first-match rule table. Order is significant
//! because configured prefixes may be prefixes of one another
//! (`/app/events` vs `/app/events-v2`).
//!
//! | # | prefix | destination |
//! |---|--------|-------------|
//! | 1 | v1 events | [`RouteDestination::EventServiceV1`] |
//! | 2 | v2 events | [`RouteDestination::EventMesh`] when the mesh is enabled, else [`RouteDestination::EventServiceV2`] |
//! | 3 | event mesh | [`RouteDestination::EventMesh`] |
//! | 4 | app registry | [`RouteDestination::AppRegistry`] |
//!
//! Prefixes may contain the [`APPLICATION_PLACEHOLDER`], which is replaced
//! with the application name of the request before matching.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder substituted with the request's application name.
pub const APPLICATION_PLACEHOLDER: &str = "{application}";

/// Backend destination of a routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDestination {
    /// Event service, v1 events API.
    EventServiceV1,
    /// Event service, v2 events API (same backend as v1).
    EventServiceV2,
    /// Central event mesh ingress.
    EventMesh,
    /// Application registry (metadata) service.
    AppRegistry,
}

impl RouteDestination {
    /// Every destination, in route-table order.
    pub const ALL: [Self; 4] = [
        Self::EventServiceV1,
        Self::EventServiceV2,
        Self::EventMesh,
        Self::AppRegistry,
    ];

    /// Stable name used in logs and error bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventServiceV1 => "event_service_v1",
            Self::EventServiceV2 => "event_service_v2",
            Self::EventMesh => "event_mesh",
            Self::AppRegistry => "app_registry",
        }
    }
}

impl fmt::Display for RouteDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No prefix matched the request path.
    #[error("could not determine destination host for path {path}: requested resource not found")]
    NotFound {
        /// Path that failed to route.
        path: String,
    },
}

/// The four configured path prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePrefixes {
    /// v1 events prefix.
    pub event_service_v1: String,
    /// v2 events prefix.
    pub event_service_v2: String,
    /// Event mesh prefix.
    pub event_mesh: String,
    /// Application registry prefix.
    pub app_registry: String,
}

/// A single entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteRule {
    /// Path prefix, possibly containing [`APPLICATION_PLACEHOLDER`].
    prefix: String,
    /// Destination when the mesh is disabled (or the rule ignores the flag).
    destination: RouteDestination,
    /// Destination override applied when the mesh is enabled.
    mesh_override: Option<RouteDestination>,
}

impl RouteRule {
    fn matches(&self, path: &str, application: &str) -> bool {
        if self.prefix.contains(APPLICATION_PLACEHOLDER) {
            path.starts_with(&self.prefix.replace(APPLICATION_PLACEHOLDER, application))
        } else {
            path.starts_with(&self.prefix)
        }
    }

    fn destination(&self, mesh_enabled: bool) -> RouteDestination {
        match self.mesh_override {
            Some(destination) if mesh_enabled => destination,
            _ => self.destination,
        }
    }
}

/// Ordered first-match route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// Build the table from the configured prefixes.
    #[must_use]
    pub fn new(prefixes: &RoutePrefixes) -> Self {
        let rule = |prefix: &str, destination, mesh_override| RouteRule {
            prefix: prefix.to_owned(),
            destination,
            mesh_override,
        };

        Self {
            rules: vec![
                rule(&prefixes.event_service_v1, RouteDestination::EventServiceV1, None),
                rule(
                    &prefixes.event_service_v2,
                    RouteDestination::EventServiceV2,
                    Some(RouteDestination::EventMesh),
                ),
                rule(&prefixes.event_mesh, RouteDestination::EventMesh, None),
                rule(&prefixes.app_registry, RouteDestination::AppRegistry, None),
            ],
        }
    }

    /// Resolve the destination for a request path.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::NotFound`] when no prefix matches.
    pub fn route(
        &self,
        path: &str,
        application: &str,
        mesh_enabled: bool,
    ) -> Result<RouteDestination, RouteError> {
        self.rules
            .iter()
            .find(|rule| rule.matches(path, application))
            .map(|rule| rule.destination(mesh_enabled))
            .ok_or_else(|| RouteError::NotFound {
                path: path.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn literal_prefixes() -> RoutePrefixes {
        RoutePrefixes {
            event_service_v1: "/app1/v1/events".into(),
            event_service_v2: "/app1/v2/events".into(),
            event_mesh: "/app1/events".into(),
            app_registry: "/app1/v1/metadata".into(),
        }
    }

    fn templated_prefixes() -> RoutePrefixes {
        RoutePrefixes {
            event_service_v1: "/{application}/v1/events".into(),
            event_service_v2: "/{application}/v2/events".into(),
            event_mesh: "/{application}/events".into(),
            app_registry: "/{application}/v1/metadata".into(),
        }
    }

    #[test]
    fn v1_events_route_to_event_service_regardless_of_mesh() {
        let table = RouteTable::new(&literal_prefixes());
        for mesh in [true, false] {
            assert_eq!(
                table.route("/app1/v1/events", "app1", mesh),
                Ok(RouteDestination::EventServiceV1)
            );
        }
    }

    #[test]
    fn v2_events_depend_on_mesh_flag() {
        let table = RouteTable::new(&literal_prefixes());
        assert_eq!(
            table.route("/app1/v2/events", "app1", true),
            Ok(RouteDestination::EventMesh)
        );
        assert_eq!(
            table.route("/app1/v2/events", "app1", false),
            Ok(RouteDestination::EventServiceV2)
        );
    }

    #[test]
    fn event_mesh_prefix_routes_to_mesh() {
        let table = RouteTable::new(&literal_prefixes());
        assert_eq!(
            table.route("/app1/events/sub", "app1", false),
            Ok(RouteDestination::EventMesh)
        );
    }

    #[test]
    fn app_registry_prefix_routes_to_registry() {
        let table = RouteTable::new(&literal_prefixes());
        assert_eq!(
            table.route("/app1/v1/metadata/services", "app1", false),
            Ok(RouteDestination::AppRegistry)
        );
    }

    #[test]
    fn unknown_path_is_not_found() {
        let table = RouteTable::new(&literal_prefixes());
        assert_eq!(
            table.route("/app1/unknown", "app1", true),
            Err(RouteError::NotFound {
                path: "/app1/unknown".into()
            })
        );
    }

    #[test]
    fn first_match_wins_for_overlapping_prefixes() {
        let prefixes = RoutePrefixes {
            event_service_v1: "/a/events/v1".into(),
            event_service_v2: "/a/events/v2".into(),
            event_mesh: "/a/events".into(),
            app_registry: "/a".into(),
        };
        let table = RouteTable::new(&prefixes);
        assert_eq!(
            table.route("/a/events/v1/x", "a", true),
            Ok(RouteDestination::EventServiceV1)
        );
        assert_eq!(table.route("/a/events", "a", false), Ok(RouteDestination::EventMesh));
        assert_eq!(table.route("/a/other", "a", false), Ok(RouteDestination::AppRegistry));
    }

    #[test]
    fn placeholder_is_substituted_per_application() {
        let table = RouteTable::new(&templated_prefixes());
        assert_eq!(
            table.route("/shop/v1/events", "shop", false),
            Ok(RouteDestination::EventServiceV1)
        );
        assert!(table.route("/shop/v1/events", "other", false).is_err());
    }

    #[test]
    fn only_v2_events_follow_mesh_flag() {
        let table = RouteTable::new(&literal_prefixes());
        for mesh_enabled in [false, true] {
            assert_eq!(
                table.route("/app1/v1/events", "app1", mesh_enabled),
                Ok(RouteDestination::EventServiceV1)
            );
            assert_eq!(
                table.route("/app1/v1/metadata", "app1", mesh_enabled),
                Ok(RouteDestination::AppRegistry)
            );
        }
    }

    #[test]
    fn destination_display_is_snake_case() {
        assert_eq!(RouteDestination::AppRegistry.to_string(), "app_registry");
        assert_eq!(
            serde_json::to_value(RouteDestination::EventServiceV2).unwrap(),
            "event_service_v2"
        );
    }
}
