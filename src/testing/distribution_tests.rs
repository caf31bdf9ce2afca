//! Shard distribution collection end to end.

#[cfg(test)]
mod tests {
    use crate::metrics::distribution::DistributionCollector;
    use crate::metrics::{MetricsRegistry, ValueKind};
    use crate::testing::{init_tracing, MockServer, TestDeployment, DEPLOYMENT};
    use crate::types::ServerRole;
    use serde_json::json;
    use std::time::{Duration, Instant};

    const READ: &str = "/_api/agency/read";

    fn agency_tree() -> serde_json::Value {
        json!([{
            "arango": {
                "Plan": {"Collections": {
                    "shop": {
                        "2001": {
                            "name": "orders",
                            "writeConcern": 2,
                            "replicationFactor": 2,
                            "shards": {
                                "s10": ["PRMR-1", "PRMR-2"],
                                "s11": ["PRMR-2", "PRMR-1"]
                            }
                        }
                    }
                }},
                "Current": {"Collections": {
                    "shop": {
                        "2001": {
                            "s10": {"servers": ["PRMR-1", "PRMR-2"]},
                            "s11": {"servers": ["PRMR-2"]}
                        },
                        "9999": {"s99": {"servers": ["PRMR-1"]}}
                    }
                }}
            }
        }])
    }

    #[tokio::test]
    async fn test_collect_emits_report() {
        init_tracing();
        let cluster = MockServer::start().await;
        let agnt = MockServer::start().await;
        let prmr1 = MockServer::start().await;
        let prmr2 = MockServer::start().await;
        let prmr3 = MockServer::start().await;
        agnt.respond("POST", READ, 200, agency_tree());
        let deployment = TestDeployment::with_auth(
            &cluster,
            &[
                ("AGNT-1", ServerRole::Agent, &agnt),
                ("PRMR-1", ServerRole::DbServer, &prmr1),
                ("PRMR-2", ServerRole::DbServer, &prmr2),
                ("PRMR-3", ServerRole::DbServer, &prmr3),
            ],
        );
        let collector = DistributionCollector::new(deployment.cache.clone());
        let registry = MetricsRegistry::new();

        let report = collector.collect(&registry).await.unwrap();

        assert_eq!(report.totals.planned, 4);
        assert_eq!(report.totals.current, 3);
        assert_eq!(report.totals.leader, 2);
        assert_eq!(collector.errors(), 0);

        let d = DEPLOYMENT;
        assert_eq!(registry.get("cluster_server_shards", &[d, "PRMR-2", "Current"]), Some(2.0));
        assert_eq!(registry.get("cluster_server_shards", &[d, "PRMR-3", "Planned"]), Some(0.0));
        assert_eq!(
            registry.get("cluster_server_shards", &[d, "PRMR-1", "PercentageLeader"]),
            Some(0.5)
        );
        assert_eq!(registry.get("cluster_shards", &[d, "Shards", "Planned"]), Some(4.0));
        assert_eq!(
            registry.get("cluster_collection_config", &[d, "shop", "orders", "WriteConcern"]),
            Some(2.0)
        );
        assert_eq!(
            registry.get(
                "cluster_shard_conditions",
                &[d, "shop", "orders", "s11", "AtMinReplicationFactor"]
            ),
            None
        );
        assert_eq!(
            registry.get("cluster_shard_conditions", &[d, "shop", "orders", "s11", "Offline"]),
            Some(1.0)
        );
        assert_eq!(
            registry.get(
                "cluster_shard_distribution",
                &[d, "shop", "orders", "s10", "PRMR-1", "true"]
            ),
            Some(1.0)
        );
        assert_eq!(registry.get("cluster_distribution_errors_total", &[d]), Some(0.0));
        assert_eq!(
            registry.kind("cluster_distribution_errors_total"),
            Some(ValueKind::Counter)
        );

        // Current entries for unplanned collections are ignored.
        assert!(report.placements.iter().all(|p| p.shard != "s99"));

        let reads = agnt.requests_to("POST", READ);
        assert_eq!(reads.len(), 1);
        assert!(reads[0].authorization.is_some());
    }

    #[tokio::test]
    async fn test_collect_retries_transient_agency_failure() {
        let cluster = MockServer::start().await;
        let agnt = MockServer::start().await;
        agnt.respond("POST", READ, 503, json!({"error": true, "errorMessage": "no leader"}));
        agnt.respond("POST", READ, 200, agency_tree());
        let deployment = TestDeployment::new(&cluster, &[("AGNT-1", ServerRole::Agent, &agnt)]);
        let collector = DistributionCollector::new(deployment.cache.clone());
        let registry = MetricsRegistry::new();

        let report = collector.collect(&registry).await.unwrap();

        assert_eq!(report.totals.planned, 4);
        assert_eq!(agnt.requests_to("POST", READ).len(), 2);
        assert_eq!(collector.errors(), 0);
    }

    #[tokio::test]
    async fn test_collect_without_agents_fails_fast() {
        let cluster = MockServer::start().await;
        let deployment = TestDeployment::new(&cluster, &[]);
        let collector = DistributionCollector::new(deployment.cache.clone())
            .with_budget(Duration::from_secs(30));
        let registry = MetricsRegistry::new();

        let started = Instant::now();
        let err = collector.collect(&registry).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err.root(), crate::error::Error::Config(_)));
        assert_eq!(collector.errors(), 1);
        assert_eq!(
            registry.get("cluster_distribution_errors_total", &[DEPLOYMENT]),
            Some(1.0)
        );
        assert!(registry.series("cluster_server_shards").is_empty());
    }

    #[tokio::test]
    async fn test_collect_gives_up_within_budget() {
        let cluster = MockServer::start().await;
        let agnt = MockServer::start().await;
        agnt.respond("POST", READ, 503, json!({"error": true, "errorMessage": "no leader"}));
        let deployment = TestDeployment::new(&cluster, &[("AGNT-1", ServerRole::Agent, &agnt)]);
        let collector = DistributionCollector::new(deployment.cache.clone())
            .with_budget(Duration::from_secs(2));
        let registry = MetricsRegistry::new();

        let started = Instant::now();
        let err = collector.collect(&registry).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(err.status(), Some(503));
        assert_eq!(collector.errors(), 1);
        assert!(agnt.requests_to("POST", READ).len() >= 2);
    }
}
