use serde::Serialize;
use std::fmt;
use workload_resolver_k8s_api::{labels::Map, Labels, Selector};

/// The Istio configuration kinds that are linked to workloads and services.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IstioKind {
    Gateway,
    AuthorizationPolicy,
    PeerAuthentication,
    Sidecar,
    RequestAuthentication,
    EnvoyFilter,
    VirtualService,
    DestinationRule,
}

/// An Istio configuration object, with its spec kept as raw JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct IstioObject {
    pub kind: IstioKind,
    pub name: String,
    pub namespace: String,
    pub spec: serde_json::Value,
}

/// Identifies an Istio object that applies to a workload or an app.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IstioReference {
    pub object_type: String,
    pub name: String,
    pub namespace: String,
}

// === impl IstioKind ===

impl IstioKind {
    /// The kinds that select workloads by label.
    pub const WORKLOAD_SELECTING: [Self; 6] = [
        Self::Gateway,
        Self::AuthorizationPolicy,
        Self::PeerAuthentication,
        Self::Sidecar,
        Self::RequestAuthentication,
        Self::EnvoyFilter,
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gateway => "Gateway",
            Self::AuthorizationPolicy => "AuthorizationPolicy",
            Self::PeerAuthentication => "PeerAuthentication",
            Self::Sidecar => "Sidecar",
            Self::RequestAuthentication => "RequestAuthentication",
            Self::EnvoyFilter => "EnvoyFilter",
            Self::VirtualService => "VirtualService",
            Self::DestinationRule => "DestinationRule",
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            Self::AuthorizationPolicy | Self::PeerAuthentication | Self::RequestAuthentication => {
                "security.istio.io"
            }
            _ => "networking.istio.io",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Self::EnvoyFilter => "v1alpha3",
            _ => "v1beta1",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Gateway => "gateways",
            Self::AuthorizationPolicy => "authorizationpolicies",
            Self::PeerAuthentication => "peerauthentications",
            Self::Sidecar => "sidecars",
            Self::RequestAuthentication => "requestauthentications",
            Self::EnvoyFilter => "envoyfilters",
            Self::VirtualService => "virtualservices",
            Self::DestinationRule => "destinationrules",
        }
    }
}

impl fmt::Display for IstioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

// === impl IstioObject ===

impl IstioObject {
    /// The labels the object uses to select workloads, if it selects any.
    pub fn workload_selector(&self) -> Option<Selector> {
        let labels = match self.kind {
            IstioKind::Gateway => self.spec.get("selector"),
            IstioKind::AuthorizationPolicy
            | IstioKind::PeerAuthentication
            | IstioKind::RequestAuthentication => self
                .spec
                .get("selector")
                .and_then(|s| s.get("matchLabels")),
            IstioKind::Sidecar | IstioKind::EnvoyFilter => self
                .spec
                .get("workloadSelector")
                .and_then(|s| s.get("labels")),
            IstioKind::VirtualService | IstioKind::DestinationRule => None,
        }?;
        let map = serde_json::from_value::<Map>(labels.clone()).ok()?;
        Some(Selector::from_map(map))
    }

    /// Whether the object explicitly selects a workload with these labels.
    /// Objects without a selector apply namespace-wide and are not linked.
    pub fn selects_workload(&self, labels: &Labels) -> bool {
        self.workload_selector()
            .is_some_and(|sel| !sel.is_empty() && sel.matches(labels))
    }

    /// Whether the object routes to, or configures traffic for, a service.
    pub fn refers_to_service(&self, service: &str, namespace: &str) -> bool {
        match self.kind {
            IstioKind::DestinationRule => self
                .spec
                .get("host")
                .and_then(|h| h.as_str())
                .is_some_and(|h| host_matches(h, service, namespace)),
            IstioKind::VirtualService => {
                let hosts = self.spec.get("hosts").and_then(|h| h.as_array());
                let in_hosts = hosts.into_iter().flatten().any(|h| {
                    h.as_str()
                        .is_some_and(|h| host_matches(h, service, namespace))
                });
                in_hosts || self.route_destinations().any(|h| host_matches(h, service, namespace))
            }
            _ => false,
        }
    }

    pub fn reference(&self) -> IstioReference {
        IstioReference {
            object_type: self.kind.kind().to_string(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    fn route_destinations(&self) -> impl Iterator<Item = &str> {
        ["http", "tcp", "tls"]
            .into_iter()
            .filter_map(move |proto| self.spec.get(proto).and_then(|r| r.as_array()))
            .flatten()
            .filter_map(|route| route.get("route").and_then(|r| r.as_array()))
            .flatten()
            .filter_map(|dst| dst.get("destination")?.get("host")?.as_str())
    }
}

/// Matches a host as written in Istio configuration against a service, in its
/// short, namespace-qualified or fully-qualified form.
fn host_matches(host: &str, service: &str, namespace: &str) -> bool {
    if host == service {
        return true;
    }
    let Some(rest) = host.strip_prefix(service).and_then(|h| h.strip_prefix('.')) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(namespace) else {
        return false;
    };
    rest.is_empty() || rest.starts_with(".svc")
}
