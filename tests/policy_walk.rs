//! Hierarchy walks against a mocked Policy API
//!
//! Create/update must save parents before children, delete must remove
//! children before parents, and the fetch walk must rebuild the nesting.

mod common;

use common::client;
use serde_json::{json, Value};
use vmstate::policy::{PolicyResource, WalkOptions};
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const T0: &str = "/policy/api/v1/infra/tier-0s";

async fn mount_get(server: &MockServer, url: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(url))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Any list not mounted explicitly is empty; mount last
async fn mount_empty_lists(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(server)
        .await;
}

fn tier0() -> PolicyResource {
    PolicyResource::lookup("tier0").unwrap()
}

fn gateway_spec() -> Value {
    json!({
        "display_name": "t0-gw",
        "ha_mode": "ACTIVE_STANDBY",
        "locale_services": [{
            "display_name": "ls1",
            "interfaces": [{
                "display_name": "if1",
                "segment_id": "seg1",
                "edge_node_info": {"edge_cluster_id": "ec1", "edge_node_id": "en1"},
                "subnets": [{"ip_addresses": ["192.168.10.2"], "prefix_len": 24}]
            }],
            "bgp": {
                "local_as_num": "65000",
                "neighbors": [{
                    "display_name": "nb1",
                    "neighbor_address": "192.168.10.1",
                    "remote_as_num": "65001"
                }]
            }
        }]
    })
}

mod create_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_logs_parents_before_children() {
        let server = MockServer::start().await;
        let ls = format!("{}/t0-gw/locale-services/ls1", T0);

        Mock::given(method("PATCH"))
            .and(path(format!("{}/interfaces/if1", ls)))
            .and(body_partial_json(json!({
                "resource_type": "Tier0Interface",
                "segment_path": "/infra/segments/seg1",
                "edge_path": "/infra/sites/default/enforcement-points/default/edge-clusters/ec1/edge-nodes/en1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/bgp", ls)))
            .and(body_partial_json(json!({
                "resource_type": "BgpRoutingConfig",
                "id": "bgp",
                "local_as_num": "65000"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        // BGP is looked up by its fixed id before it exists
        Mock::given(method("GET"))
            .and(path(format!("{}/bgp", ls)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_message": "BGP not found"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        mount_get(&server, &format!("{}/t0-gw", T0), json!({"id": "t0-gw", "resource_type": "Tier0"})).await;
        mount_get(&server, &ls, json!({"id": "ls1", "resource_type": "LocaleServices"})).await;
        mount_get(&server, &format!("{}/interfaces/if1", ls), json!({"id": "if1"})).await;
        mount_get(&server, &format!("{}/bgp", ls), json!({"id": "bgp", "local_as_num": "65000"})).await;
        mount_get(&server, &format!("{}/bgp/neighbors/nb1", ls), json!({"id": "nb1"})).await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let log = tier0()
            .create_or_update(&client, &gateway_spec(), WalkOptions::default())
            .await;

        assert_eq!(
            log.resource_types(),
            vec!["tier0", "locale_services", "interfaces", "BGP", "neighbors"]
        );
        assert!(log.last_error().is_none());
        assert_eq!(log.find("BGP"), Some(&json!({"id": "bgp", "local_as_num": "65000"})));
    }

    #[tokio::test]
    async fn test_unchanged_objects_are_not_patched() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_get(
            &server,
            T0,
            json!({"results": [{
                "id": "t0-id",
                "display_name": "t0-gw",
                "resource_type": "Tier0",
                "ha_mode": "ACTIVE_STANDBY",
                "_revision": 4
            }]}),
        )
        .await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let spec = json!({"display_name": "t0-gw", "ha_mode": "ACTIVE_STANDBY"});
        let log = tier0()
            .create_or_update(&client, &spec, WalkOptions::default())
            .await;

        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_existing_id_is_reused_on_update() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path(format!("{}/t0-id", T0)))
            .and(body_partial_json(json!({"id": "t0-id", "ha_mode": "ACTIVE_ACTIVE", "_revision": 4})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_get(
            &server,
            T0,
            json!({"results": [{
                "id": "t0-id",
                "display_name": "t0-gw",
                "resource_type": "Tier0",
                "ha_mode": "ACTIVE_STANDBY",
                "_revision": 4
            }]}),
        )
        .await;
        mount_get(&server, &format!("{}/t0-id", T0), json!({"id": "t0-id", "_revision": 5})).await;

        let client = client(&server).await;
        let spec = json!({"display_name": "t0-gw", "ha_mode": "ACTIVE_ACTIVE"});
        let log = tier0()
            .create_or_update(&client, &spec, WalkOptions::default())
            .await;

        assert_eq!(log.resource_types(), vec!["tier0"]);
        assert_eq!(log.find("tier0"), Some(&json!({"id": "t0-id", "_revision": 5})));
    }

    #[tokio::test]
    async fn test_failure_stops_walk() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path(format!("{}/t0-gw", T0)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_message": "Invalid ha_mode"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let log = tier0()
            .create_or_update(&client, &gateway_spec(), WalkOptions::default())
            .await;

        assert_eq!(log.len(), 1);
        assert_eq!(log.last_error(), Some("Invalid ha_mode"));
        assert_eq!(
            serde_json::to_value(&log).unwrap(),
            json!([{"resourceType": "tier0", "error": "Invalid ha_mode"}])
        );
    }

    #[tokio::test]
    async fn test_missing_display_name_and_id() {
        let server = MockServer::start().await;
        let client = client(&server).await;

        let log = tier0()
            .create_or_update(&client, &json!({"ha_mode": "ACTIVE_STANDBY"}), WalkOptions::default())
            .await;

        assert_eq!(log.last_error(), Some("display_name or id is required"));
    }

    #[tokio::test]
    async fn test_duplicate_display_name() {
        let server = MockServer::start().await;
        mount_get(
            &server,
            T0,
            json!({"results": [
                {"id": "a", "display_name": "t0-gw"},
                {"id": "b", "display_name": "t0-gw"}
            ]}),
        )
        .await;

        let client = client(&server).await;
        let log = tier0()
            .create_or_update(&client, &json!({"display_name": "t0-gw"}), WalkOptions::default())
            .await;

        assert_eq!(
            log.last_error(),
            Some("More then one resource exist with same name")
        );
    }

    #[tokio::test]
    async fn test_absent_sub_resource_is_deleted() {
        let server = MockServer::start().await;
        let routes = format!("{}/t0-gw/static-routes", T0);

        mount_get(
            &server,
            T0,
            json!({"results": [{"id": "t0-gw", "display_name": "t0-gw", "resource_type": "Tier0"}]}),
        )
        .await;
        mount_get(
            &server,
            &routes,
            json!({"results": [{"id": "default-route", "display_name": "default-route"}]}),
        )
        .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/default-route", routes)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let spec = json!({
            "display_name": "t0-gw",
            "static_routes": [
                {"display_name": "default-route", "state": "absent"},
                {"display_name": "never-created", "state": "absent"}
            ]
        });
        let log = tier0()
            .create_or_update(&client, &spec, WalkOptions::default())
            .await;

        assert_eq!(log.resource_types(), vec!["static_routes"]);
        assert_eq!(
            log.entries()[0].results(),
            Some(&json!("default-route deleted successfully"))
        );
    }

    #[tokio::test]
    async fn test_tier1_resolves_tier0_and_nests_interfaces() {
        let server = MockServer::start().await;
        let t1 = "/policy/api/v1/infra/tier-1s/t1-gw";
        let ls = format!("{}/locale-services/ls1", t1);

        Mock::given(method("PATCH"))
            .and(path(t1))
            .and(body_partial_json(json!({
                "id": "t1-gw",
                "resource_type": "Tier1",
                "failover_mode": "PREEMPTIVE",
                "tier0_path": "/infra/tier-0s/t0-id"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(ls.as_str()))
            .and(body_partial_json(json!({"id": "ls1", "resource_type": "LocaleServices"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/interfaces/if1", ls)))
            .and(body_partial_json(json!({
                "id": "if1",
                "resource_type": "Tier1Interface",
                "segment_path": "/infra/segments/seg1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        mount_get(&server, T0, json!({"results": [{"id": "t0-id", "display_name": "t0-gw"}]})).await;
        mount_get(&server, t1, json!({"id": "t1-gw", "tier0_path": "/infra/tier-0s/t0-id"})).await;
        mount_get(&server, &ls, json!({"id": "ls1"})).await;
        mount_get(&server, &format!("{}/interfaces/if1", ls), json!({"id": "if1"})).await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let spec = json!({
            "display_name": "t1-gw",
            "failover_mode": "PREEMPTIVE",
            "tier0_display_name": "t0-gw",
            "locale_services": [{
                "display_name": "ls1",
                "interfaces": [{
                    "display_name": "if1",
                    "segment_id": "seg1",
                    "subnets": [{"ip_addresses": ["10.1.1.1"], "prefix_len": 24}]
                }]
            }]
        });
        let log = PolicyResource::lookup("tier1")
            .unwrap()
            .create_or_update(&client, &spec, WalkOptions::default())
            .await;

        assert!(log.last_error().is_none(), "{:?}", log.last_error());
        assert_eq!(log.resource_types(), vec!["tier1", "locale_services", "interfaces"]);
        assert_eq!(log.find("interfaces"), Some(&json!({"id": "if1"})));

        // The parent body carries neither the reference name nor nested items
        let requests = server.received_requests().await.unwrap();
        let tier1_patch = requests
            .iter()
            .find(|r| r.method.as_str() == "PATCH" && r.url.path() == t1)
            .unwrap();
        let body: Value = tier1_patch.body_json().unwrap();
        assert!(body.get("tier0_display_name").is_none());
        assert!(body.get("locale_services").is_none());
    }

    #[tokio::test]
    async fn test_children_first_logs_children_before_parent() {
        let server = MockServer::start().await;
        let seg = "/policy/api/v1/infra/segments/web";

        Mock::given(method("PATCH"))
            .and(path(seg))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/ports/p1", seg)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_get(&server, seg, json!({"id": "web"})).await;
        mount_get(&server, &format!("{}/ports/p1", seg), json!({"id": "p1"})).await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let spec = json!({
            "display_name": "web",
            "vlan_ids": ["100"],
            "segment_ports": [{"display_name": "p1", "admin_state": "UP"}]
        });
        let log = PolicyResource::lookup("segments")
            .unwrap()
            .create_or_update(&client, &spec, WalkOptions { children_first: true })
            .await;

        assert!(log.last_error().is_none());
        assert_eq!(log.resource_types(), vec!["segment_ports", "segments"]);

        // The port is written before its segment
        let requests = server.received_requests().await.unwrap();
        let patches: Vec<&str> = requests
            .iter()
            .filter(|r| r.method.as_str() == "PATCH")
            .map(|r| r.url.path())
            .collect();
        assert_eq!(patches, vec![format!("{}/ports/p1", seg).as_str(), seg]);
    }
}

mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_removes_children_first() {
        let server = MockServer::start().await;
        let ls = format!("{}/t0/locale-services/ls1", T0);

        mount_get(&server, &format!("{}/t0/static-routes", T0), json!({"results": [{"id": "sr1"}]})).await;
        mount_get(
            &server,
            &format!("{}/t0/static-routes/bfd-peers", T0),
            json!({"results": [{"id": "bfd1"}]}),
        )
        .await;
        mount_get(&server, &format!("{}/t0/locale-services", T0), json!({"results": [{"id": "ls1"}]})).await;
        mount_get(
            &server,
            &format!("{}/interfaces", ls),
            json!({"results": [{"id": "if1"}, {"id": "if2"}]}),
        )
        .await;
        mount_get(&server, &format!("{}/bgp/neighbors", ls), json!({"results": [{"id": "nb1"}]})).await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/bgp", ls)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path_regex(r"^/policy/api/v1/infra/tier-0s/.*"))
            .respond_with(ResponseTemplate::new(200))
            .expect(7)
            .mount(&server)
            .await;

        let client = client(&server).await;
        let log = tier0().delete(&client, "t0").await;

        assert_eq!(
            log.resource_types(),
            vec![
                "static_routes",
                "bfd_peers",
                "interfaces",
                "interfaces",
                "neighbors",
                "locale_services",
                "tier0"
            ]
        );
        assert_eq!(log.find("tier0"), Some(&json!("t0 deleted successfully")));
    }

    #[tokio::test]
    async fn test_delete_failure_is_logged() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/t0", T0)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_message": "Gateway is in use"
            })))
            .mount(&server)
            .await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let log = tier0().delete(&client, "t0").await;

        assert_eq!(log.resource_types(), vec!["tier0"]);
        assert_eq!(log.last_error(), Some("Gateway is in use"));
    }
}

mod hierarchy_tests {
    use super::*;

    #[tokio::test]
    async fn test_hierarchy_nests_children() {
        let server = MockServer::start().await;
        let ls = format!("{}/t0/locale-services/ls1", T0);

        mount_get(&server, &format!("{}/t0", T0), json!({"id": "t0", "display_name": "t0"})).await;
        mount_get(&server, &format!("{}/t0/static-routes", T0), json!({"results": [{"id": "sr1"}]})).await;
        mount_get(&server, &format!("{}/t0/static-routes/sr1", T0), json!({"id": "sr1", "network": "0.0.0.0/0"})).await;
        mount_get(&server, &format!("{}/t0/locale-services", T0), json!({"results": [{"id": "ls1"}]})).await;
        mount_get(&server, &ls, json!({"id": "ls1"})).await;
        mount_get(
            &server,
            &format!("{}/interfaces", ls),
            json!({"results": [{"id": "if1"}, {"id": "if2"}]}),
        )
        .await;
        mount_get(&server, &format!("{}/interfaces/if1", ls), json!({"id": "if1"})).await;
        mount_get(&server, &format!("{}/interfaces/if2", ls), json!({"id": "if2"})).await;
        mount_get(&server, &format!("{}/bgp", ls), json!({"id": "bgp", "enabled": true})).await;
        mount_get(&server, &format!("{}/bgp/neighbors", ls), json!({"results": [{"id": "nb1"}]})).await;
        mount_get(&server, &format!("{}/bgp/neighbors/nb1", ls), json!({"id": "nb1"})).await;
        mount_empty_lists(&server).await;

        let client = client(&server).await;
        let hierarchy = tier0().get_hierarchy(&client, "t0").await.unwrap();

        assert_eq!(
            hierarchy,
            json!({
                "tier0": {
                    "id": "t0",
                    "display_name": "t0",
                    "static_routes": {"id": "sr1", "network": "0.0.0.0/0"},
                    "locale_services": {
                        "id": "ls1",
                        "interfaces": [{"id": "if1"}, {"id": "if2"}],
                        "BGP": {
                            "id": "bgp",
                            "enabled": true,
                            "neighbors": {"id": "nb1"}
                        }
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_hierarchy_root_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/nope", T0)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_message": "The path=[/infra/tier-0s/nope] is invalid"
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let err = tier0().get_hierarchy(&client, "nope").await.unwrap_err();
        assert_eq!(err.message, "The path=[/infra/tier-0s/nope] is invalid");
    }

    #[tokio::test]
    async fn test_segment_hierarchy_with_ports() {
        let server = MockServer::start().await;
        let seg = "/policy/api/v1/infra/segments/web";

        mount_get(&server, seg, json!({"id": "web", "vlan_ids": ["100"]})).await;
        mount_get(&server, &format!("{}/ports", seg), json!({"results": [{"id": "p1"}]})).await;
        mount_get(&server, &format!("{}/ports/p1", seg), json!({"id": "p1", "admin_state": "UP"})).await;

        let client = client(&server).await;
        let segments = PolicyResource::lookup("segments").unwrap();
        let hierarchy = segments.get_hierarchy(&client, "web").await.unwrap();

        assert_eq!(
            hierarchy,
            json!({"segments": {
                "id": "web",
                "vlan_ids": ["100"],
                "segment_ports": {"id": "p1", "admin_state": "UP"}
            }})
        );
    }
}
