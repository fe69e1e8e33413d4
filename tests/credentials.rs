//! End-to-end credential lifecycle tests.
//!
//! These run the real manager, codec and Argon2id hasher against the
//! in-memory store, with the cheapest hash parameters argon2 accepts.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use keymint::models::{ApiKeys, CreateApiKey, McpTokens};
use keymint::secret::{Hasher, HasherConfig, SECRET_LEN};
use keymint::store::MemoryStore;
use keymint::token::TokenParts;
use keymint::{ApiKeyManager, CredentialError, CredentialManager, McpTokenManager};
use tokio_test::{assert_err, assert_ok};

fn hasher() -> Hasher {
    Hasher::new(HasherConfig::minimal()).unwrap()
}

fn api_keys() -> ApiKeyManager<MemoryStore<ApiKeys>> {
    CredentialManager::new(MemoryStore::new(), hasher())
}

fn mcp_tokens() -> McpTokenManager<MemoryStore<McpTokens>> {
    CredentialManager::new(MemoryStore::new(), hasher())
}

fn request(name: &str, workloads: &[&str]) -> CreateApiKey {
    CreateApiKey {
        name: Some(name.to_string()),
        authorized_workload_ids: workloads.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// API key walkthrough
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_api_key_issue_validate_delete() {
    let manager = api_keys();

    let issued = assert_ok!(manager.create(123, request("ci", &["*"])).await);
    let id = issued.credential.id;
    let token = issued.token.as_str().to_string();

    let expected_prefix = format!("ok1-123-{id}-");
    assert!(token.starts_with(&expected_prefix), "token: {token}");
    let secret = &token[expected_prefix.len()..];
    assert_eq!(secret.len(), SECRET_LEN);

    let record = assert_ok!(manager.validate(&token).await);
    assert_eq!(record.owner_id, 123);
    assert_eq!(record.id, id);
    assert_eq!(record.metadata.display_name.as_deref(), Some("ci"));

    let wrong_secret = format!("ok1-123-{id}-wrongsecret");
    let err = assert_err!(manager.validate(&wrong_secret).await);
    assert!(matches!(err, CredentialError::InvalidCredential));

    let wrong_kind = format!("ok2-123-{id}-{secret}");
    let err = assert_err!(manager.validate(&wrong_kind).await);
    assert!(matches!(err, CredentialError::WrongPrefix { .. }));

    assert_ok!(manager.delete(123, id).await);
    let err = assert_err!(manager.validate(&token).await);
    assert!(matches!(err, CredentialError::InvalidCredential));
}

#[tokio::test]
async fn test_unknown_and_mismatch_are_indistinguishable() {
    let manager = api_keys();
    let issued = manager.create(1, request("a", &["*"])).await.unwrap();
    let id = issued.credential.id;

    let unknown = assert_err!(manager.validate(&format!("ok1-1-{}-whatever", id + 100)).await);
    let mismatch = assert_err!(manager.validate(&format!("ok1-1-{id}-whatever")).await);

    assert_eq!(unknown.kind(), mismatch.kind());
    assert_eq!(unknown.to_string(), mismatch.to_string());
    assert_eq!(unknown.public(), mismatch.public());
}

#[tokio::test]
async fn test_owner_field_is_checked() {
    let manager = api_keys();
    let issued = manager.create(10, request("a", &["*"])).await.unwrap();
    let parts = TokenParts::parse(&issued.token).unwrap();

    let tampered = format!("ok1-11-{}-{}", parts.credential_id, parts.secret);
    let err = assert_err!(manager.validate(&tampered).await);
    assert!(matches!(err, CredentialError::InvalidCredential));
}

#[tokio::test]
async fn test_malformed_tokens() {
    let manager = api_keys();
    for token in ["", "ok1", "ok1-1-2", "ok1-1-2-", "ok1-x-2-abc", "ok1-+1-2-abc"] {
        let err = assert_err!(manager.validate(token).await);
        assert!(
            matches!(err, CredentialError::MalformedToken),
            "{token:?} gave {err:?}"
        );
    }
}

#[tokio::test]
async fn test_empty_workload_list_rejected() {
    let manager = api_keys();
    let err = assert_err!(manager.create(1, request("none", &[])).await);
    assert!(matches!(err, CredentialError::Validation(_)));
    assert!(manager.store().is_empty());
}

#[tokio::test]
async fn test_hash_uses_configured_cost() {
    let manager = api_keys();
    let issued = manager.create(1, request("a", &["*"])).await.unwrap();
    assert!(issued.credential.hashed_secret.starts_with("$argon2id$"));
    assert!(issued.credential.hashed_secret.contains("m=8,t=1,p=1"));
}

// ═══════════════════════════════════════════════════════════════════════════
// last_used_at throttling
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_last_used_written_once_within_window() {
    let manager = api_keys();
    let issued = manager.create(1, request("a", &["*"])).await.unwrap();
    assert!(issued.credential.last_used_at.is_none());

    let first = manager.validate(&issued.token).await.unwrap();
    let second = manager.validate(&issued.token).await.unwrap();

    assert_eq!(manager.store().last_used_writes(), 1);
    assert!(first.last_used_at.is_some());
    assert_eq!(first.last_used_at, second.last_used_at);
}

#[tokio::test]
async fn test_last_used_written_again_after_window() {
    let manager = api_keys();
    let issued = manager.create(1, request("a", &["*"])).await.unwrap();
    let id = issued.credential.id;

    let first = manager.validate(&issued.token).await.unwrap();
    assert!(manager.store().backdate_last_used(id, Duration::minutes(2)));
    let second = manager.validate(&issued.token).await.unwrap();

    assert_eq!(manager.store().last_used_writes(), 2);
    assert!(second.last_used_at >= first.last_used_at);
}

#[tokio::test]
async fn test_concurrent_validations_write_once() {
    let manager = api_keys();
    let issued = manager.create(1, request("a", &["*"])).await.unwrap();

    let (a, b, c) = tokio::join!(
        manager.validate(&issued.token),
        manager.validate(&issued.token),
        manager.validate(&issued.token),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_ok!(c);
    assert_eq!(manager.store().last_used_writes(), 1);
}

#[tokio::test]
async fn test_failed_validation_does_not_touch() {
    let manager = api_keys();
    let issued = manager.create(1, request("a", &["*"])).await.unwrap();
    let id = issued.credential.id;

    let _ = manager.validate(&format!("ok1-1-{id}-nope")).await;
    assert_eq!(manager.store().last_used_writes(), 0);
}

#[tokio::test]
async fn test_returned_last_used_matches_stored_value() {
    let manager = api_keys();
    let issued = manager.create(1, request("a", &["*"])).await.unwrap();
    let id = issued.credential.id;

    let record = manager.validate(&issued.token).await.unwrap();
    let returned = record.last_used_at.unwrap();
    // timestamptz keeps microseconds; anything finer would not read back.
    assert_eq!(returned.timestamp_subsec_nanos() % 1_000, 0);

    let stored = manager.get(1, id).await.unwrap();
    assert_eq!(stored.last_used_at, Some(returned));
    let admin = manager.admin().get(id).await.unwrap();
    assert_eq!(admin.last_used_at, Some(returned));
}

// ═══════════════════════════════════════════════════════════════════════════
// Deadlines
// ═══════════════════════════════════════════════════════════════════════════

// Costly enough that one hash outlasts a millisecond deadline on any machine.
fn slow_hasher() -> Hasher {
    Hasher::new(HasherConfig {
        memory_kib: 32 * 1024,
        iterations: 2,
        parallelism: 1,
    })
    .unwrap()
}

#[tokio::test]
async fn test_create_past_deadline_leaves_nothing() {
    let manager: ApiKeyManager<MemoryStore<ApiKeys>> =
        CredentialManager::new(MemoryStore::new(), slow_hasher())
            .with_deadline(StdDuration::from_millis(1));

    let err = assert_err!(manager.create(1, request("slow", &["*"])).await);
    assert!(matches!(err, CredentialError::Unavailable(_)), "{err:?}");
    assert!(!err.is_rejection());
    assert_eq!(err.public().status, 503);
    assert!(manager.store().is_empty());
}

#[tokio::test]
async fn test_validate_past_deadline_writes_nothing() {
    let store = MemoryStore::<ApiKeys>::new();
    let issuer: ApiKeyManager<MemoryStore<ApiKeys>> =
        CredentialManager::new(store.clone(), slow_hasher());
    let issued = issuer.create(1, request("slow", &["*"])).await.unwrap();

    let validator: ApiKeyManager<MemoryStore<ApiKeys>> =
        CredentialManager::new(store.clone(), slow_hasher())
            .with_deadline(StdDuration::from_millis(1));
    let err = assert_err!(validator.validate(&issued.token).await);
    assert!(matches!(err, CredentialError::Unavailable(_)), "{err:?}");

    assert_eq!(store.last_used_writes(), 0);
    let record = issuer.get(1, issued.credential.id).await.unwrap();
    assert!(record.last_used_at.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// Expiry
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_expired_key_rejected_with_correct_secret() {
    let manager = api_keys();
    let mut req = request("short", &["*"]);
    req.expires_at = Some(Utc::now() + Duration::hours(1));
    let issued = manager.create(1, req).await.unwrap();
    let id = issued.credential.id;

    assert_ok!(manager.validate(&issued.token).await);

    assert!(manager
        .store()
        .set_expires_at(id, Some(Utc::now() - Duration::seconds(1))));
    let err = assert_err!(manager.validate(&issued.token).await);
    assert!(matches!(err, CredentialError::Expired));
}

#[tokio::test]
async fn test_expiry_checked_after_secret() {
    let manager = api_keys();
    let mut req = request("old", &["*"]);
    req.expires_at = Some(Utc::now() - Duration::days(1));
    let issued = manager.create(1, req).await.unwrap();
    let id = issued.credential.id;

    let err = assert_err!(manager.validate(&format!("ok1-1-{id}-wrong")).await);
    assert!(matches!(err, CredentialError::InvalidCredential));

    let err = assert_err!(manager.validate(&issued.token).await);
    assert!(matches!(err, CredentialError::Expired));
    assert_eq!(manager.store().last_used_writes(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// Scope
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_scope_after_validation() {
    let manager = api_keys();
    let wildcard = manager.create(1, request("all", &["*"])).await.unwrap();
    let listed = manager.create(1, request("two", &["w1", "w2"])).await.unwrap();

    let all = manager.validate(&wildcard.token).await.unwrap();
    assert!(all.authorizes("w1"));
    assert!(all.authorizes("w3"));

    let two = manager.validate(&listed.token).await.unwrap();
    assert!(two.authorizes("w1"));
    assert!(two.authorizes("w2"));
    assert!(!two.authorizes("w3"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Cross-kind rejection
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_tokens_do_not_cross_kinds() {
    let keys = api_keys();
    let tokens = mcp_tokens();

    let key = keys.create(1, request("k", &["*"])).await.unwrap();
    let token = tokens.create(1, ()).await.unwrap();

    assert!(token.token.starts_with("mt1-1-"));

    let err = assert_err!(keys.validate(&token.token).await);
    assert!(matches!(err, CredentialError::WrongPrefix { .. }));
    let err = assert_err!(tokens.validate(&key.token).await);
    assert!(matches!(err, CredentialError::WrongPrefix { .. }));

    assert_ok!(keys.validate(&key.token).await);
    assert_ok!(tokens.validate(&token.token).await);
}

// ═══════════════════════════════════════════════════════════════════════════
// Owner-scoped reads and deletes
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_list_newest_first_without_secrets() {
    let manager = api_keys();
    let a = manager.create(7, request("a", &["*"])).await.unwrap();
    let b = manager.create(7, request("b", &["*"])).await.unwrap();
    manager.create(8, request("other", &["*"])).await.unwrap();

    let listed = manager.list(7).await.unwrap();
    let ids: Vec<i64> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![b.credential.id, a.credential.id]);

    let json = serde_json::to_string(&listed).unwrap();
    assert!(!json.contains("hashed_secret"));
    assert!(!json.contains("$argon2id$"));
    let secret = TokenParts::parse(&a.token).unwrap().secret.to_string();
    assert!(!json.contains(&secret));
}

#[tokio::test]
async fn test_get_is_owner_scoped() {
    let manager = api_keys();
    let issued = manager.create(7, request("a", &["*"])).await.unwrap();
    let id = issued.credential.id;

    assert_ok!(manager.get(7, id).await);
    let err = assert_err!(manager.get(8, id).await);
    assert!(matches!(err, CredentialError::NotFound));
}

#[tokio::test]
async fn test_api_key_delete_missing_is_not_found() {
    let manager = api_keys();
    let issued = manager.create(7, request("a", &["*"])).await.unwrap();
    let id = issued.credential.id;

    let err = assert_err!(manager.delete(8, id).await);
    assert!(matches!(err, CredentialError::NotFound));
    assert_ok!(manager.validate(&issued.token).await);

    assert_ok!(manager.delete(7, id).await);
    let err = assert_err!(manager.delete(7, id).await);
    assert!(matches!(err, CredentialError::NotFound));
}

#[tokio::test]
async fn test_mcp_token_delete_is_idempotent() {
    let manager = mcp_tokens();
    let issued = manager.create(7, ()).await.unwrap();
    let id = issued.credential.id;

    assert_ok!(manager.delete(7, id).await);
    assert_ok!(manager.delete(7, id).await);
    assert_ok!(manager.delete(7, 9999).await);

    let err = assert_err!(manager.validate(&issued.token).await);
    assert!(matches!(err, CredentialError::InvalidCredential));
}

// ═══════════════════════════════════════════════════════════════════════════
// Admin handle
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_admin_operations_span_owners() {
    let manager = api_keys();
    let a = manager.create(1, request("a", &["*"])).await.unwrap();
    let b = manager.create(2, request("b", &["w1"])).await.unwrap();
    let admin = manager.admin();

    let all = admin.list().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, b.credential.id);

    let fetched = admin.get(a.credential.id).await.unwrap();
    assert_eq!(fetched.owner_id, 1);

    assert_ok!(admin.touch_last_used(a.credential.id).await);
    assert!(admin.get(a.credential.id).await.unwrap().last_used_at.is_some());

    assert_ok!(admin.delete(b.credential.id).await);
    let err = assert_err!(admin.get(b.credential.id).await);
    assert!(matches!(err, CredentialError::NotFound));
    let err = assert_err!(admin.delete(b.credential.id).await);
    assert!(matches!(err, CredentialError::NotFound));
    let err = assert_err!(admin.touch_last_used(b.credential.id).await);
    assert!(matches!(err, CredentialError::NotFound));
}

#[tokio::test]
async fn test_admin_mcp_delete_missing_succeeds() {
    let manager = mcp_tokens();
    assert_ok!(manager.admin().delete(42).await);
}

// ═══════════════════════════════════════════════════════════════════════════
// Caller-facing errors
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_all_rejections_share_public_rendering() {
    let manager = api_keys();
    let mut req = request("old", &["*"]);
    req.expires_at = Some(Utc::now() - Duration::days(1));
    let expired = manager.create(1, req).await.unwrap();
    let id = expired.credential.id;

    let errors = vec![
        manager.validate("garbage").await.unwrap_err(),
        manager.validate("mt1-1-1-abc").await.unwrap_err(),
        manager.validate(&format!("ok1-1-{id}-abc")).await.unwrap_err(),
        manager.validate(&expired.token).await.unwrap_err(),
    ];

    let kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec!["malformed_token", "wrong_prefix", "invalid_credential", "expired"]
    );

    let public = errors[0].public();
    for e in &errors {
        assert_eq!(e.public(), public);
    }
    assert_eq!(public.to_json()["error"]["message"], "invalid credential");
}
