//! Declarative definitions of a viewer workload's platform resources.
//!
//! A viewer instance is made of one service, two routes and one deployment,
//! all labelled `app=<label>`. The builder only produces objects; creating
//! them is the lifecycle manager's job.

mod route;

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, HTTPGetAction, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

pub use route::{
    Route, RoutePort, RouteSpec, RouteTarget, RouteTls, ROUTE_GROUP, ROUTE_KIND, ROUTE_VERSION,
};

use crate::config::ImageConfig;
use crate::types::{InstanceLabel, APP_LABEL};

/// Port serving the archive as an API.
pub const API_PORT: i32 = 8080;
/// Port serving the web console.
pub const CONSOLE_PORT: i32 = 9000;
/// Environment variable carrying the archive URL into the fetch stage.
pub const ARCHIVE_ENV: &str = "ARCHIVE_URL";
/// Name of the fetch init container.
pub const FETCHER_CONTAINER: &str = "fetcher";

const DATA_VOLUME: &str = "archive-data";
const DATA_DIR: &str = "/must-gather/";
const IMAGE_POLICY_ANNOTATION: &str = "alpha.image.policy.openshift.io/resolve-names";
const FETCH_SCRIPT: &str = "set -uxo pipefail && umask 0000 && \
     curl -sL ${ARCHIVE_URL} | tar xvz -m --no-overwrite-dir --checkpoint=.100 && \
     mv */* .";

/// Name of the service of an instance.
#[must_use]
pub fn service_name(label: &InstanceLabel) -> String {
    label.as_str().to_owned()
}

/// Name of the API route of an instance.
#[must_use]
pub fn api_route_name(label: &InstanceLabel) -> String {
    format!("{label}-api")
}

/// Name of the console route of an instance.
#[must_use]
pub fn console_route_name(label: &InstanceLabel) -> String {
    format!("{label}-console")
}

/// Name of the deployment of an instance.
#[must_use]
pub fn deployment_name(label: &InstanceLabel) -> String {
    format!("{label}-viewer")
}

/// Archive URL passed to the fetch stage of a deployment, if any.
#[must_use]
pub fn archive_url_of(deployment: &Deployment) -> Option<String> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .init_containers
        .as_ref()?
        .iter()
        .filter(|c| c.name == FETCHER_CONTAINER)
        .flat_map(|c| c.env.iter().flatten())
        .find(|e| e.name == ARCHIVE_ENV)
        .and_then(|e| e.value.clone())
}

/// Builds the resources of one viewer instance.
#[derive(Debug, Clone)]
pub struct ResourceSetBuilder<'a> {
    images: &'a ImageConfig,
    label: &'a InstanceLabel,
    archive_url: &'a str,
}

impl<'a> ResourceSetBuilder<'a> {
    /// Create a builder for `label` serving `archive_url`.
    #[must_use]
    pub const fn new(images: &'a ImageConfig, label: &'a InstanceLabel, archive_url: &'a str) -> Self {
        Self {
            images,
            label,
            archive_url,
        }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(APP_LABEL.to_owned(), self.label.as_str().to_owned())])
    }

    fn metadata(&self, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            labels: Some(self.labels()),
            ..ObjectMeta::default()
        }
    }

    /// Service exposing the API and console ports of the instance's pods.
    #[must_use]
    pub fn service(&self) -> Service {
        let port = |name: &str, port: i32| ServicePort {
            name: Some(name.to_owned()),
            port,
            protocol: Some("TCP".to_owned()),
            ..ServicePort::default()
        };

        Service {
            metadata: self.metadata(service_name(self.label)),
            spec: Some(ServiceSpec {
                ports: Some(vec![port("api", API_PORT), port("console", CONSOLE_PORT)]),
                selector: Some(self.labels()),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    fn route(&self, name: String, path: Option<&str>, target_port: i32) -> Route {
        Route {
            metadata: self.metadata(name),
            spec: RouteSpec {
                host: None,
                path: path.map(str::to_owned),
                to: RouteTarget {
                    kind: "Service".to_owned(),
                    name: service_name(self.label),
                },
                port: RoutePort {
                    target_port: IntOrString::Int(target_port),
                },
                tls: RouteTls::edge_redirect(),
            },
        }
    }

    /// Route to the API port.
    #[must_use]
    pub fn api_route(&self) -> Route {
        self.route(api_route_name(self.label), None, API_PORT)
    }

    /// Route to the console port.
    #[must_use]
    pub fn console_route(&self) -> Route {
        self.route(console_route_name(self.label), Some("/"), CONSOLE_PORT)
    }

    /// Deployment running the fetch stage, the viewer and the console.
    ///
    /// The console talks to the viewer through `api_endpoint`, so the API
    /// route must exist first.
    #[must_use]
    pub fn deployment(&self, api_endpoint: &str) -> Deployment {
        let mut metadata = self.metadata(deployment_name(self.label));
        metadata.annotations = Some(BTreeMap::from([(
            IMAGE_POLICY_ANNOTATION.to_owned(),
            "*".to_owned(),
        )]));

        Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(self.labels()),
                    ..LabelSelector::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels()),
                        ..ObjectMeta::default()
                    }),
                    spec: Some(PodSpec {
                        init_containers: Some(vec![self.fetcher()]),
                        containers: vec![self.viewer(), self.console(api_endpoint)],
                        share_process_namespace: Some(true),
                        volumes: Some(vec![Volume {
                            name: DATA_VOLUME.to_owned(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Volume::default()
                        }]),
                        ..PodSpec::default()
                    }),
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        }
    }

    fn fetcher(&self) -> Container {
        Container {
            name: FETCHER_CONTAINER.to_owned(),
            image: Some(self.images.fetcher.clone()),
            command: Some(vec![
                "/bin/bash".to_owned(),
                "-c".to_owned(),
                FETCH_SCRIPT.to_owned(),
            ]),
            working_dir: Some(DATA_DIR.to_owned()),
            env: Some(vec![EnvVar {
                name: ARCHIVE_ENV.to_owned(),
                value: Some(self.archive_url.to_owned()),
                ..EnvVar::default()
            }]),
            volume_mounts: Some(vec![data_mount()]),
            ..Container::default()
        }
    }

    fn viewer(&self) -> Container {
        Container {
            name: "viewer".to_owned(),
            image: Some(self.images.viewer.clone()),
            ports: Some(vec![container_port(API_PORT)]),
            args: Some(
                ["--base-dir", DATA_DIR, "--kubeconfig", "/must-gather/kubeconfig"]
                    .map(str::to_owned)
                    .to_vec(),
            ),
            readiness_probe: Some(Probe {
                http_get: Some(HTTPGetAction {
                    path: Some("/version".to_owned()),
                    port: IntOrString::Int(API_PORT),
                    scheme: Some("HTTP".to_owned()),
                    ..HTTPGetAction::default()
                }),
                timeout_seconds: Some(1),
                period_seconds: Some(10),
                success_threshold: Some(1),
                failure_threshold: Some(3),
                ..Probe::default()
            }),
            resources: Some(requests()),
            volume_mounts: Some(vec![data_mount()]),
            ..Container::default()
        }
    }

    fn console(&self, api_endpoint: &str) -> Container {
        Container {
            name: "console".to_owned(),
            image: Some(self.images.console.clone()),
            ports: Some(vec![container_port(CONSOLE_PORT)]),
            args: Some(vec![
                "/opt/bridge/bin/bridge".to_owned(),
                "--public-dir=/opt/bridge/static".to_owned(),
                "--k8s-mode=off-cluster".to_owned(),
                format!("--k8s-mode-off-cluster-endpoint={api_endpoint}"),
                "--user-auth=disabled".to_owned(),
                "--k8s-auth=bearer-token".to_owned(),
                "--k8s-auth-bearer-token=dummy".to_owned(),
                "--user-settings-location=localstorage".to_owned(),
            ]),
            resources: Some(requests()),
            ..Container::default()
        }
    }
}

fn container_port(port: i32) -> ContainerPort {
    ContainerPort {
        name: Some("ui".to_owned()),
        container_port: port,
        protocol: Some("TCP".to_owned()),
        ..ContainerPort::default()
    }
}

fn data_mount() -> VolumeMount {
    VolumeMount {
        name: DATA_VOLUME.to_owned(),
        mount_path: DATA_DIR.to_owned(),
        ..VolumeMount::default()
    }
}

fn requests() -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_owned(), Quantity("100m".to_owned())),
            ("memory".to_owned(), Quantity("500Mi".to_owned())),
        ])),
        ..ResourceRequirements::default()
    }
}
