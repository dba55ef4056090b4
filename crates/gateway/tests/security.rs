pub mod fixtures;

use chrono::{Duration, Utc};
use filegate_gateway::prelude::*;
use fixtures::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

#[tokio::test]
async fn test_share_levels_are_ordered() {
    let h = setup_gateway().await;
    h.acl.grant("owner", "admin").await.unwrap();
    h.gateway.write("owner", "scratch", "reports/q1.txt", b"v1").await.unwrap();

    h.acl.share_file("reports/q1.txt", "bob", SharePermission::Viewer, "owner").await.unwrap();
    h.acl.share_file("/reports/q1.txt", "alice", SharePermission::Editor, "owner").await.unwrap();

    assert_eq!(h.gateway.read("bob", "scratch", "reports/q1.txt").await.unwrap(), b"v1");
    let err = h.gateway.write("bob", "scratch", "reports/q1.txt", b"bob").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    h.gateway.write("alice", "scratch", "reports/q1.txt", b"v2").await.unwrap();
    let err = h.gateway.delete("alice", "scratch", "reports/q1.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    assert_eq!(h.gateway.read("bob", "scratch", "reports/q1.txt").await.unwrap(), b"v2");
    assert_eq!(h.acl.shares_for_path("reports\\q1.txt").await.unwrap().len(), 2);
    assert_eq!(h.acl.shares_for_user("BOB").await.unwrap()[0].level, SharePermission::Viewer);
}

#[tokio::test]
async fn test_read_only_policy_rejects_mutations() {
    let h = setup_gateway().await;
    h.acl.grant("auditor", "admin").await.unwrap();
    h.gateway.write("auditor", "scratch", "ledger.csv", b"1,2").await.unwrap();

    h.policies.set_policy(SandboxPolicy {
        read_only: true,
        ..SandboxDefaults::default().policy_for("auditor")
    });

    assert_eq!(h.gateway.read("auditor", "scratch", "ledger.csv").await.unwrap(), b"1,2");
    assert_eq!(h.gateway.list("auditor", "scratch", "", false).await.unwrap(), vec!["ledger.csv"]);

    let err = h.gateway.write("auditor", "scratch", "ledger.csv", b"x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    let err = h.gateway.delete("auditor", "scratch", "ledger.csv").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(h.gateway.exists("auditor", "scratch", "ledger.csv").await.unwrap());
}

#[tokio::test]
async fn test_proxy_audits_every_decision() {
    let h = setup_gateway().await;
    h.acl.grant("alice", "read").await.unwrap();

    let denied = h.gateway.write("alice", "scratch", "a.txt", b"a").await;
    assert!(denied.is_err());
    let failed = h.gateway.read("alice", "scratch", "missing.txt").await.unwrap_err();
    assert_eq!(failed.kind(), ErrorKind::NotFound);

    let records = h.audit.records();
    let statuses: Vec<AuditStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![AuditStatus::Denied, AuditStatus::Allowed, AuditStatus::Failed]);

    assert_eq!(records[0].action, "write");
    assert!(records[0].reason.as_deref().unwrap().contains("access denied"));
    assert_eq!(records[1].resource_path, "/missing.txt");
    assert_eq!(records[2].backend_id, "scratch");
    assert!(records.iter().all(|r| r.id.len() == 12));

    let since = Utc::now() - Duration::minutes(1);
    assert_eq!(h.gateway.proxy().audit_trail_for_user("ALICE", since).await.unwrap().len(), 3);
    assert_eq!(
        h.gateway.proxy().audit_trail_between(since, Utc::now()).await.unwrap().len(),
        3
    );
    assert!(h.gateway.proxy().audit_trail_between(Utc::now(), since).await.is_err());
}

#[tokio::test]
async fn test_action_never_runs_when_denied() {
    let h = setup_gateway().await;
    let proxy = h.gateway.proxy();
    let flag = AtomicBool::new(false);
    let ran = &flag;

    let result: Result<(), GatewayError> = proxy
        .execute_secure("delete", "scratch", "/a.txt", "mallory", || async move {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Unauthorized);
    assert!(!flag.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_audit_failure_does_not_change_outcome() {
    let h = setup_gateway().await;
    h.acl.grant("alice", "admin").await.unwrap();
    let proxy = SecurityProxy::new(h.gateway.proxy().sandbox().clone(), Arc::new(FailingAudit));

    let value = proxy
        .execute_secure("read", "scratch", "/a.txt", "alice", || async { Ok::<_, GatewayError>(42) })
        .await
        .unwrap();
    assert_eq!(value, 42);

    let err = proxy
        .execute_secure("read", "scratch", "../a.txt", "alice", || async { Ok::<_, GatewayError>(0) })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_failed_envelopes_are_audited_but_returned() {
    let h = setup_gateway().await;
    h.acl.grant("alice", "admin").await.unwrap();

    let result = h
        .gateway
        .execute("alice", "scratch", "readfile", &params(json!({ "path": "nope.txt" })))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorKind::NotFound));
    assert_eq!(result.operation, "read");

    let last = h.audit.records().pop().unwrap();
    assert_eq!(last.status, AuditStatus::Failed);
    assert_eq!(last.resource_path, "/nope.txt");

    let err = h
        .gateway
        .execute("alice", "scratch", "format", &params(json!({ "path": "/" })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_listing_authorizes_the_listed_directory() {
    let h = setup_gateway().await;
    h.acl.grant("owner", "admin").await.unwrap();
    h.gateway.write("owner", "scratch", "public/readme.txt", b"hi").await.unwrap();
    h.gateway.write("owner", "scratch", "secret/keys.txt", b"k").await.unwrap();
    h.acl.share_file("public", "eve", SharePermission::Viewer, "owner").await.unwrap();

    let listed = h
        .gateway
        .execute("eve", "scratch", "ls", &params(json!({ "directory": "public" })))
        .await
        .unwrap();
    assert_eq!(listed.payload.unwrap()["entries"], json!(["public/readme.txt"]));

    let err = h
        .gateway
        .execute("eve", "scratch", "ls", &params(json!({ "path": "public", "directory": "secret" })))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let last = h.audit.records().pop().unwrap();
    assert_eq!(last.status, AuditStatus::Denied);
    assert_eq!(last.resource_path, "secret");
}

#[tokio::test]
async fn test_revoke_during_permission_load_takes_effect() {
    let permissions = Arc::new(SlowPermissions::new(StdDuration::from_millis(100)));
    permissions.inner.add_permission("mallory", "admin").await.unwrap();
    let acl = Arc::new(AccessControl::new(permissions, Arc::new(InMemoryShares::new())));

    let check = tokio::spawn({
        let acl = Arc::clone(&acl);
        async move { acl.has_access("mallory", "/x", "delete").await }
    });
    tokio::time::sleep(StdDuration::from_millis(20)).await;
    assert!(acl.revoke("mallory", "admin").await.unwrap());

    check.await.unwrap().unwrap();
    assert!(!acl.has_access("mallory", "/x", "delete").await.unwrap());
    assert!(acl.permissions("mallory").await.unwrap().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_parent_segments_are_always_unauthorized(
        prefix in "[a-z]{0,6}",
        suffix in "[a-z]{0,6}",
        backslash in any::<bool>(),
    ) {
        let sep = if backslash { "\\" } else { "/" };
        let path = format!("{prefix}{sep}..{sep}{suffix}");
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        let err = runtime.block_on(async {
            let h = setup_gateway().await;
            h.acl.grant("root", "admin").await.unwrap();
            h.gateway.read("root", "scratch", &path).await.unwrap_err()
        });
        prop_assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
