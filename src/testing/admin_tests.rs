//! Administrative endpoints against a mock server.

#[cfg(test)]
mod tests {
    use crate::admin::{AdminClient, CompactOptions, LicenseStatus};
    use crate::testing::{MockServer, TestDeployment};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    async fn admin(cluster: &MockServer) -> (TestDeployment, AdminClient) {
        cluster.serve_version();
        let deployment = TestDeployment::new(cluster, &[]);
        let client = deployment.cache.get_cluster().await.unwrap();
        (deployment, AdminClient::new(client))
    }

    #[tokio::test]
    async fn test_compact() {
        let cluster = MockServer::start().await;
        cluster.respond("PUT", "/_admin/compact", 200, json!({"error": false, "code": 200}));
        let (_deployment, admin) = admin(&cluster).await;

        admin
            .compact(CompactOptions {
                change_level: false,
                compact_bottom_most_level: true,
            })
            .await
            .unwrap();

        let body = cluster.requests_to("PUT", "/_admin/compact")[0].json();
        assert_eq!(body, json!({"changeLevel": false, "compactBottomMostLevel": true}));
    }

    #[tokio::test]
    async fn test_license_roundtrip() {
        let cluster = MockServer::start().await;
        cluster.respond(
            "GET",
            "/_admin/license",
            200,
            json!({"features": {"expires": 1_792_411_200}, "version": 1, "status": "expiring"}),
        );
        cluster.respond("PUT", "/_admin/license", 201, json!({"result": {"code": 201}}));
        let (_deployment, admin) = admin(&cluster).await;

        let license = admin.license().await.unwrap();
        assert_eq!(license.status, LicenseStatus::Expiring);

        admin.set_license("JD4E...", true).await.unwrap();
        let put = &cluster.requests_to("PUT", "/_admin/license")[0];
        assert_eq!(put.query.as_deref(), Some("force=true"));
        assert_eq!(put.json(), json!("JD4E..."));
    }

    #[tokio::test]
    async fn test_key_reloads() {
        let cluster = MockServer::start().await;
        cluster.respond(
            "POST",
            "/_admin/server/encryption",
            200,
            json!({"error": false, "code": 200, "result": {"encryption-keys": [{"sha256": "aa"}]}}),
        );
        cluster.respond(
            "GET",
            "/_admin/server/jwt",
            200,
            json!({"error": false, "code": 200, "result": {"active": {"sha256": "bb"}, "passive": [{"sha256": "cc"}]}}),
        );
        let (_deployment, admin) = admin(&cluster).await;

        let keys = admin.refresh_encryption().await.unwrap();
        assert_eq!(keys.keys[0].sha256.as_deref(), Some("aa"));

        let jwt = admin.jwt().await.unwrap();
        assert_eq!(jwt.passive.len(), 1);

        cluster.respond(
            "POST",
            "/_admin/server/jwt",
            200,
            json!({"error": false, "code": 200, "result": {"active": {"sha256": "dd"}, "passive": []}}),
        );
        let reloaded = admin.refresh_jwt().await.unwrap();
        assert_eq!(reloaded.active.unwrap().sha256.as_deref(), Some("dd"));
        assert!(reloaded.passive.is_empty());

        let err = admin.encryption().await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_cleanup_expired_jobs() {
        let cluster = MockServer::start().await;
        cluster.respond("DELETE", "/_api/job/expired", 200, json!({"result": true}));
        let (_deployment, admin) = admin(&cluster).await;

        let before = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        admin.cleanup_expired_jobs(before).await.unwrap();

        let request = &cluster.requests_to("DELETE", "/_api/job/expired")[0];
        assert_eq!(request.query.as_deref(), Some("stamp=1792411200"));
    }

    #[tokio::test]
    async fn test_inventory() {
        let cluster = MockServer::start().await;
        cluster.respond(
            "GET",
            "/_db/shop/_api/replication/clusterInventory",
            200,
            json!({"collections": [{"parameters": {"name": "orders"}}], "views": [], "tick": "42"}),
        );
        let (_deployment, admin) = admin(&cluster).await;

        let inventory = admin.inventory("shop").await.unwrap();
        assert_eq!(inventory.collections.len(), 1);
        assert_eq!(inventory.tick.as_deref(), Some("42"));
    }
}
