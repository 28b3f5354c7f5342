//! OpenShift route objects.
//!
//! `k8s-openapi` carries no route types, so only the fields the viewer needs
//! are modelled here and sent as a dynamic `route.openshift.io/v1` object.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};

/// API group of routes.
pub const ROUTE_GROUP: &str = "route.openshift.io";
/// API version of routes.
pub const ROUTE_VERSION: &str = "v1";
/// Kind of routes.
pub const ROUTE_KIND: &str = "Route";

/// An externally reachable route to a service port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired routing.
    pub spec: RouteSpec,
}

/// Routing target and TLS settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Host name, assigned by the platform when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Path prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Backend receiving the traffic.
    pub to: RouteTarget,
    /// Backend port.
    pub port: RoutePort,
    /// TLS termination.
    pub tls: RouteTls,
}

/// Backend of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Backend kind, always `Service` here.
    pub kind: String,
    /// Backend name.
    pub name: String,
}

/// Backend port of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    /// Port on the service.
    pub target_port: IntOrString,
}

/// TLS settings of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    /// Where TLS terminates.
    pub termination: String,
    /// Policy for plain-HTTP requests.
    pub insecure_edge_termination_policy: String,
}

impl RouteTls {
    /// Edge termination with plain HTTP redirected to HTTPS.
    #[must_use]
    pub fn edge_redirect() -> Self {
        Self {
            termination: "edge".to_owned(),
            insecure_edge_termination_policy: "Redirect".to_owned(),
        }
    }
}
