mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use proptest::prelude::*;

use common::{endpoints, service, subset, NAMESPACE};
use kds::builder::{build, BuildError, LISTENER_PORT, ROUTE_CONFIG_NAME};
use kds::node::ResourceVersion;
use kds::registry::{EndpointRecord, ServiceRecord};
use kds::resources::types::{DiscoveryType, DnsLookupFamily};
use kds::resources::{LbPolicy, Resource, ResourceBundle, ResourceKind};

fn only<'a>(bundle: &'a ResourceBundle, kind: ResourceKind) -> &'a Resource {
    let items = &bundle.resources(kind).items;
    assert_eq!(items.len(), 1, "expected exactly one {} resource", kind);
    items.values().next().unwrap()
}

#[test]
fn test_single_service_bundle() {
    let bundle = build(
        &[service("foo", "*")],
        &[endpoints("foo", &["10.1.1.0"], &[("", 80)])],
        "v1",
    )
    .unwrap();

    assert_eq!(bundle.version(), &ResourceVersion::from("v1"));
    for kind in ResourceKind::ALL {
        assert_eq!(bundle.resources(kind).version, "v1");
    }

    let Resource::Endpoints(cla) = only(&bundle, ResourceKind::Endpoints) else {
        panic!("not an endpoint assignment");
    };
    assert_eq!(cla.cluster_name, "foo");
    let backends: Vec<_> = cla
        .lb_endpoints()
        .map(|e| (e.endpoint.address.socket_address.address.as_str(), e.endpoint.address.socket_address.port_value))
        .collect();
    assert_eq!(backends, vec![("10.1.1.0", 80)]);

    let Resource::Cluster(cluster) = only(&bundle, ResourceKind::Clusters) else {
        panic!("not a cluster");
    };
    assert_eq!(cluster.name, "foo");
    assert_eq!(cluster.lb_policy, LbPolicy::RoundRobin);
    assert_eq!(cluster.discovery_type, DiscoveryType::Eds);
    assert_eq!(cluster.dns_lookup_family, DnsLookupFamily::V4Only);
    assert_eq!(cluster.connect_timeout, Duration::from_secs(1));

    let Resource::Route(table) = only(&bundle, ResourceKind::Routes) else {
        panic!("not a route table");
    };
    assert_eq!(table.name, ROUTE_CONFIG_NAME);
    assert_eq!(table.virtual_hosts.len(), 1);
    let vhost = &table.virtual_hosts[0];
    assert_eq!(vhost.name, "*");
    assert_eq!(vhost.domains, vec!["*".to_string()]);
    assert_eq!(vhost.routes.len(), 1);
    assert_eq!(vhost.routes[0].route_match.prefix, "/");
    assert_eq!(vhost.routes[0].route.cluster, "foo");

    let Resource::Listener(listener) = only(&bundle, ResourceKind::Listeners) else {
        panic!("not a listener");
    };
    assert_eq!(listener.address.socket_address.address, "0.0.0.0");
    assert_eq!(listener.address.socket_address.port_value, LISTENER_PORT);
    assert_eq!(listener.route_config_names().collect::<Vec<_>>(), vec![ROUTE_CONFIG_NAME]);
}

#[test]
fn test_listener_references_route_table_by_name() {
    let bundle = build(
        &[service("foo", "*")],
        &[endpoints("foo", &["10.1.1.0"], &[("", 80)])],
        "v1",
    )
    .unwrap();

    let json = serde_json::to_value(only(&bundle, ResourceKind::Listeners)).unwrap();
    let hcm = &json["filter_chains"][0]["filters"][0]["typed_config"];
    assert_eq!(hcm["rds"]["route_config_name"], ROUTE_CONFIG_NAME);
    assert!(hcm.get("route_config").is_none());

    let json = serde_json::to_value(only(&bundle, ResourceKind::Clusters)).unwrap();
    assert_eq!(json["@type"], "type.googleapis.com/envoy.api.v2.Cluster");
    assert_eq!(json["connect_timeout"], "1s");
    assert_eq!(json["type"], "EDS");
    assert_eq!(json["lb_policy"], "ROUND_ROBIN");
}

#[test]
fn test_named_port_suffixes_resource_name() {
    let bundle = build(
        &[service("foo", "*")],
        &[endpoints("foo", &["10.1.1.0"], &[("http", 80)])],
        "v1",
    )
    .unwrap();

    for kind in [ResourceKind::Endpoints, ResourceKind::Clusters] {
        let names: Vec<_> = bundle.resources(kind).names().collect();
        assert_eq!(names, vec!["foo__http"]);
    }
}

#[test]
fn test_every_port_exposed_without_selector() {
    let bundle = build(
        &[service("foo", "foo.example.com")],
        &[endpoints("foo", &["10.0.0.1", "10.0.0.2"], &[("http", 80), ("grpc", 9090)])],
        "3",
    )
    .unwrap();

    let names: Vec<_> = bundle.clusters.names().collect();
    assert_eq!(names, vec!["foo__grpc", "foo__http"]);
    let Resource::Route(table) = only(&bundle, ResourceKind::Routes) else {
        panic!("not a route table");
    };
    assert_eq!(table.virtual_hosts[0].routes.len(), 2);
}

#[test]
fn test_port_selector() {
    let svc = service("foo", "*").with_annotation("port", "grpc");
    let bundle = build(
        &[svc],
        &[endpoints("foo", &["10.0.0.1"], &[("http", 80), ("grpc", 9090)])],
        "3",
    )
    .unwrap();
    assert_eq!(bundle.clusters.names().collect::<Vec<_>>(), vec!["foo__grpc"]);

    // no port carries the selected name: first port wins
    let svc = service("foo", "*").with_annotation("port", "admin");
    let bundle = build(
        &[svc],
        &[endpoints("foo", &["10.0.0.1"], &[("http", 80), ("grpc", 9090)])],
        "3",
    )
    .unwrap();
    assert_eq!(bundle.clusters.names().collect::<Vec<_>>(), vec!["foo__http"]);
}

#[test]
fn test_routes_grouped_by_domain() {
    let services = vec![
        service("a", "shop.example.com"),
        service("b", "api.example.com"),
        service("c", "shop.example.com"),
    ];
    let eps = vec![
        endpoints("a", &["10.0.0.1"], &[("", 80)]),
        endpoints("b", &["10.0.0.2"], &[("", 80)]),
        endpoints("c", &["10.0.0.3"], &[("", 80)]),
    ];
    let bundle = build(&services, &eps, "9").unwrap();

    let Resource::Route(table) = only(&bundle, ResourceKind::Routes) else {
        panic!("not a route table");
    };
    let hosts: Vec<_> = table
        .virtual_hosts
        .iter()
        .map(|vh| (vh.name.as_str(), vh.routes.iter().map(|r| r.route.cluster.as_str()).collect::<Vec<_>>()))
        .collect();
    assert_eq!(
        hosts,
        vec![("api.example.com", vec!["b"]), ("shop.example.com", vec!["a", "c"])]
    );
    assert_eq!(bundle.listeners.len(), 1);
}

#[test]
fn test_idempotent() {
    let services = vec![service("foo", "*"), service("bar", "bar.local")];
    let eps = vec![
        endpoints("bar", &["10.0.0.9"], &[("http", 8080)]),
        endpoints("foo", &["10.1.1.0", "10.1.1.1"], &[("", 80)]),
    ];

    let first = build(&services, &eps, "42").unwrap();
    let second = build(&services, &eps, "42").unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_service_without_domain_contributes_nothing() {
    let services = vec![ServiceRecord::new("foo", NAMESPACE), service("bar", "*")];
    let eps = vec![
        endpoints("foo", &["10.0.0.1"], &[("", 80)]),
        endpoints("bar", &["10.0.0.2"], &[("", 80)]),
    ];
    let bundle = build(&services, &eps, "1").unwrap();
    assert_eq!(bundle.clusters.names().collect::<Vec<_>>(), vec!["bar"]);
    assert_eq!(bundle.endpoints.names().collect::<Vec<_>>(), vec!["bar"]);

    // empty annotation value counts as absent
    let services = vec![service("foo", "")];
    let bundle = build(&services, &eps[..1], "1").unwrap();
    assert!(bundle.is_empty());
}

#[test]
fn test_endpoints_without_service_are_ignored() {
    let bundle = build(&[], &[endpoints("foo", &["10.0.0.1"], &[("", 80)])], "1").unwrap();
    assert!(bundle.is_empty());
    assert_eq!(bundle.consistent(), Ok(()));
}

#[test]
fn test_nothing_routable_is_empty_bundle() {
    let bundle = build(&[], &[], "1").unwrap();
    assert!(bundle.is_empty());
    assert_eq!(bundle.version(), &ResourceVersion::from("1"));
}

#[test]
fn test_empty_subset_fails_whole_build() {
    let services = vec![service("good", "*"), service("bad", "bad.local")];
    let eps = vec![
        endpoints("good", &["10.0.0.1"], &[("", 80)]),
        EndpointRecord::new("bad", NAMESPACE),
    ];
    let err = build(&services, &eps, "1").unwrap_err();
    assert_eq!(
        err,
        BuildError::EmptyEndpointSubset {
            service: "bad".into()
        }
    );
}

#[test]
fn test_subset_without_ports_fails() {
    let eps = vec![EndpointRecord::new("foo", NAMESPACE).with_subset(subset(&["10.0.0.1"], &[]))];
    let err = build(&[service("foo", "*")], &eps, "1").unwrap_err();
    assert_eq!(err, BuildError::NoPort { service: "foo".into() });
}

#[test]
fn test_annotation_overrides() {
    let svc = service("foo", "*")
        .with_annotation("connect_timeout", "1.5s")
        .with_annotation("lb_policy", "LEAST_REQUEST");
    let bundle = build(&[svc], &[endpoints("foo", &["10.0.0.1"], &[("", 80)])], "1").unwrap();

    let Resource::Cluster(cluster) = only(&bundle, ResourceKind::Clusters) else {
        panic!("not a cluster");
    };
    assert_eq!(cluster.connect_timeout, Duration::from_millis(1500));
    assert_eq!(cluster.lb_policy, LbPolicy::LeastRequest);

    let json = serde_json::to_value(cluster).unwrap();
    assert_eq!(json["connect_timeout"], "1.500s");
}

#[test]
fn test_unknown_lb_policy_falls_back() {
    let svc = service("foo", "*").with_annotation("lb_policy", "least_request");
    let bundle = build(&[svc], &[endpoints("foo", &["10.0.0.1"], &[("", 80)])], "1").unwrap();
    let Resource::Cluster(cluster) = only(&bundle, ResourceKind::Clusters) else {
        panic!("not a cluster");
    };
    assert_eq!(cluster.lb_policy, LbPolicy::RoundRobin);
}

#[test]
fn test_malformed_timeout_fails_build() {
    let svc = service("foo", "*").with_annotation("connect_timeout", "10");
    let err = build(&[svc], &[endpoints("foo", &["10.0.0.1"], &[("", 80)])], "1").unwrap_err();
    assert!(matches!(err, BuildError::InvalidConnectTimeout { ref service, .. } if service == "foo"));
}

#[test]
fn test_addresses_merged_across_subsets() {
    let ep = EndpointRecord::new("foo", NAMESPACE)
        .with_subset(subset(&["10.0.0.1"], &[("http", 80)]))
        .with_subset(subset(&["10.0.0.2"], &[("http", 8080)]));
    let bundle = build(&[service("foo", "*")], &[ep], "1").unwrap();

    let Resource::Endpoints(cla) = only(&bundle, ResourceKind::Endpoints) else {
        panic!("not an endpoint assignment");
    };
    let ports: Vec<_> = cla.lb_endpoints().map(|e| e.endpoint.address.socket_address.port_value).collect();
    assert_eq!(ports, vec![80, 8080]);
}

#[test]
fn test_named_port_collision_is_rejected() {
    let services = [service("foo", "a.example.com"), service("foo__bar", "b.example.com")];
    let eps = [
        endpoints("foo", &["10.0.0.1"], &[("bar", 80)]),
        endpoints("foo__bar", &["10.9.9.9"], &[("", 9090)]),
    ];

    let err = build(&services, &eps, "1").unwrap_err();
    assert!(matches!(err, BuildError::DuplicateResource { ref name, .. } if name == "foo__bar"));
}

#[test]
fn test_same_name_in_two_namespaces_is_rejected() {
    let services = [
        service("foo", "a.example.com"),
        ServiceRecord::new("foo", "other").with_annotation("domains", "b.example.com"),
    ];
    let eps = [
        endpoints("foo", &["10.0.0.1"], &[("", 80)]),
        EndpointRecord::new("foo", "other").with_subset(subset(&["10.9.9.9"], &[("", 80)])),
    ];

    let err = build(&services, &eps, "1").unwrap_err();
    assert_eq!(
        err,
        BuildError::DuplicateResource {
            name: "foo".into(),
            first: "default/foo".into(),
            second: "other/foo".into(),
        }
    );
}

#[test]
fn test_service_joined_in_its_own_namespace() {
    let services = [service("foo", "foo.example.com"), ServiceRecord::new("foo", "other")];
    let eps = [endpoints("foo", &["10.0.0.1"], &[("", 80)])];

    let bundle = build(&services, &eps, "1").unwrap();
    assert_eq!(bundle.clusters.len(), 1);
    assert_eq!(bundle.endpoints.len(), 1);
}

fn arb_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["foo", "bar", "baz", "foo__http"]).prop_map(String::from)
}

/// Resource names and backend count the exposed records should yield,
/// worked out independently of the builder.
fn expected_resources(services: &[ServiceRecord], eps: &[EndpointRecord]) -> (BTreeSet<String>, usize) {
    let mut names = BTreeSet::new();
    let mut backends = 0;
    for ep in eps {
        let Some(svc) = services.iter().rev().find(|s| s.name == ep.name && s.namespace == ep.namespace) else {
            continue;
        };
        if svc.domain().is_none() {
            continue;
        }
        let selector = svc.annotation("port").filter(|p| !p.is_empty());
        for sub in &ep.subsets {
            let ports: Vec<_> = match selector {
                Some(sel) => sub.ports.iter().find(|p| p.name == sel).or(sub.ports.first()).into_iter().collect(),
                None => sub.ports.iter().collect(),
            };
            for port in ports {
                names.insert(if port.name.is_empty() {
                    ep.name.clone()
                } else {
                    format!("{}__{}", ep.name, port.name)
                });
                backends += sub.addresses.len();
            }
        }
    }
    (names, backends)
}

fn arb_service() -> impl Strategy<Value = ServiceRecord> {
    (
        arb_name(),
        prop::option::of(prop::sample::select(vec!["*", "a.example.com", "b.example.com", ""])),
        prop::option::of(prop::sample::select(vec!["http", "grpc", "admin"])),
        prop::option::of(prop::sample::select(vec!["250ms", "2s", "1m", "bogus", "5"])),
        prop::option::of(prop::sample::select(vec!["RING_HASH", "MAGLEV", "nope"])),
    )
        .prop_map(|(name, domain, port, timeout, lb)| {
            let mut svc = ServiceRecord::new(name, NAMESPACE);
            if let Some(d) = domain {
                svc = svc.with_annotation("domains", d);
            }
            if let Some(p) = port {
                svc = svc.with_annotation("port", p);
            }
            if let Some(t) = timeout {
                svc = svc.with_annotation("connect_timeout", t);
            }
            if let Some(l) = lb {
                svc = svc.with_annotation("lb_policy", l);
            }
            svc
        })
}

fn arb_endpoints() -> impl Strategy<Value = EndpointRecord> {
    let port = (prop::sample::select(vec!["", "http", "grpc"]), 1u16..65535);
    let sub = (
        prop::collection::vec(prop::sample::select(vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]), 0..3),
        prop::collection::vec(port, 0..3),
    );
    (arb_name(), prop::collection::vec(sub, 0..3)).prop_map(|(name, subsets)| {
        subsets.into_iter().fold(EndpointRecord::new(name, NAMESPACE), |ep, (ips, ports)| {
            ep.with_subset(subset(&ips, &ports))
        })
    })
}

proptest! {
    #[test]
    fn prop_built_bundles_are_consistent(
        services in prop::collection::vec(arb_service(), 0..5),
        eps in prop::collection::vec(arb_endpoints(), 0..5),
        version in "[0-9]{1,4}",
    ) {
        match build(&services, &eps, version.as_str()) {
            Ok(bundle) => {
                prop_assert_eq!(bundle.consistent(), Ok(()));
                for kind in ResourceKind::ALL {
                    prop_assert_eq!(bundle.resources(kind).version.as_str(), version.as_str());
                }

                let clusters: BTreeSet<_> = bundle.clusters.names().collect();
                let assignments: BTreeSet<_> = bundle.endpoints.names().collect();
                prop_assert_eq!(&clusters, &assignments);
                for resource in bundle.routes.items.values() {
                    if let Resource::Route(table) = resource {
                        for cluster in table.clusters() {
                            prop_assert!(clusters.contains(cluster));
                        }
                    }
                }
                prop_assert_eq!(bundle.routes.is_empty(), bundle.listeners.is_empty());

                // nothing exposed was dropped or merged away
                let (names, backends) = expected_resources(&services, &eps);
                let built: BTreeSet<String> = clusters.iter().map(|n| n.to_string()).collect();
                prop_assert_eq!(built, names);
                let built_backends: usize = bundle
                    .endpoints
                    .items
                    .values()
                    .map(|r| match r {
                        Resource::Endpoints(cla) => cla.lb_endpoints().count(),
                        _ => 0,
                    })
                    .sum();
                prop_assert_eq!(built_backends, backends);
            }
            Err(BuildError::Inconsistent(e)) => {
                prop_assert!(false, "builder produced an inconsistent bundle: {}", e);
            }
            Err(_) => {}
        }
    }

    #[test]
    fn prop_build_is_idempotent(
        services in prop::collection::vec(arb_service(), 0..4),
        eps in prop::collection::vec(arb_endpoints(), 0..4),
    ) {
        prop_assert_eq!(build(&services, &eps, "7"), build(&services, &eps, "7"));
    }
}
