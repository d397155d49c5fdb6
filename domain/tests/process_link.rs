//! Scenario tests for the link pipeline against the in-memory adapters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use domain::adapters::memory::{
    self, Enrollment, Fixtures, FolderRecord, InMemoryStore, ProgramSeed, TagRecord,
    WebhookRecord,
};
use domain::{
    Blocklist, Clock, DomainRecord, ErrorCode, LinkProcessor, LinkRef, LinkRequest, LinkService,
    NormalizedLink, PipelineConfig, PlanTier, PlatformDomain, ProcessError, ProcessOptions,
    RegisteredDomain, Rejection, StoreError, TestVariant, WorkspaceContext,
};

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap()
}

fn domain(id: &str, slug: &str, ws: &str, primary: bool) -> DomainRecord {
    DomainRecord {
        id: id.into(),
        slug: slug.into(),
        workspace_id: ws.into(),
        primary,
    }
}

fn link(domain: &str, key: &str, ws: &str, external_id: Option<&str>) -> LinkRef {
    LinkRef {
        domain: domain.into(),
        key: key.into(),
        workspace_id: Some(ws.into()),
        external_id: external_id.map(String::from),
    }
}

fn fixtures() -> Fixtures {
    Fixtures {
        domains: vec![
            domain("dom_acme", "acme.com", "ws_1", true),
            domain("dom_go", "go.acme.com", "ws_1", false),
            domain("dom_free_link", "free.link", "ws_free", false),
            domain("dom_mine", "mine.io", "ws_free", true),
        ],
        registered_domains: vec![RegisteredDomain {
            domain_id: "dom_free_link".into(),
            slug: "free.link".into(),
        }],
        links: vec![
            link("acme.com", "taken", "ws_1", Some("ext-1")),
            link("git.new", "team", "ws_2", None),
            link("git.new", "mine", "ws_1", None),
        ],
        tags: vec![TagRecord {
            id: "t1".into(),
            name: "news".into(),
            workspace_id: "ws_1".into(),
        }],
        webhooks: vec![WebhookRecord {
            id: "wh_1".into(),
            workspace_id: "ws_1".into(),
        }],
        programs: vec![
            ProgramSeed {
                id: "prog_1".into(),
                workspace_id: "ws_1".into(),
                default_folder_id: Some("fold_prog".into()),
                enrollments: vec![Enrollment {
                    partner_id: "p_1".into(),
                    tenant_id: Some("ten_1".into()),
                }],
            },
            ProgramSeed {
                id: "prog_other".into(),
                workspace_id: "ws_2".into(),
                default_folder_id: None,
                enrollments: vec![],
            },
        ],
        folders: vec![FolderRecord {
            id: "fold_1".into(),
            workspace_id: "ws_1".into(),
            writers: vec!["user_1".into()],
        }],
        users: vec!["user_1".into(), "user_2".into()],
        blacklisted_domains: vec!["evil.com".into()],
    }
}

fn test_config() -> PipelineConfig {
    let mut cfg = PipelineConfig {
        storage_enabled: true,
        storage_base_url: Some("https://assets.test".into()),
        ..PipelineConfig::default()
    };
    cfg.platform_domains
        .push(PlatformDomain::restricted("d.co", &["a.com"]));
    cfg
}

struct Harness {
    store: Arc<InMemoryStore>,
    processor: LinkProcessor,
}

fn harness_with(config: PipelineConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new(config.clone(), fixtures()));
    let deps = memory::collaborators(store.clone(), Arc::new(FixedClock(now())));
    Harness {
        store,
        processor: LinkProcessor::new(config, deps),
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

fn opts(ws: &str, plan: PlanTier) -> ProcessOptions {
    ProcessOptions::for_workspace(WorkspaceContext::new(ws, plan))
}

fn request(url: &str) -> LinkRequest {
    LinkRequest::new(url)
}

fn with_key(url: &str, key: &str) -> LinkRequest {
    let mut req = request(url);
    req.key = Some(key.into());
    req
}

async fn accept(h: &Harness, req: LinkRequest, opts: &ProcessOptions) -> NormalizedLink {
    match h.processor.process(req, opts).await {
        Ok(link) => link,
        Err(e) => panic!("expected acceptance, got {e:?}"),
    }
}

async fn reject(h: &Harness, req: LinkRequest, opts: &ProcessOptions) -> Rejection {
    match h.processor.process(req, opts).await {
        Err(ProcessError::Rejected(r)) => r,
        other => panic!("expected rejection, got {other:?}"),
    }
}

// --- destination -----------------------------------------------------------

#[tokio::test]
async fn missing_url_rejected_unless_root_key() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);
    for key in [None, Some("abc"), Some("team/alice")] {
        let req = LinkRequest {
            key: key.map(String::from),
            ..LinkRequest::default()
        };
        assert_eq!(reject(&h, req, &pro).await.code, ErrorCode::MissingUrl);
    }

    let root = LinkRequest {
        key: Some("_root".into()),
        ..LinkRequest::default()
    };
    let link = accept(&h, root, &opts("ws_1", PlanTier::Business)).await;
    assert_eq!(link.key, "_root");
    assert_eq!(link.url, None);
    assert_eq!(link.domain, "acme.com");
}

#[tokio::test]
async fn invalid_url_rejected() {
    let h = harness();
    let err = reject(&h, request("not a url"), &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(err.code, ErrorCode::InvalidUrl);
}

#[tokio::test]
async fn utm_tags_merge_into_destination() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = request("https://a.co/x");
    req.utm.utm_source = Some("foo".into());
    let link = accept(&h, req, &pro).await;
    assert_eq!(link.url.as_deref(), Some("https://a.co/x?utm_source=foo"));

    let mut again = request("https://a.co/x?utm_source=foo");
    again.utm.utm_source = Some("bar".into());
    let link = accept(&h, again, &pro).await;
    assert_eq!(link.url.as_deref(), Some("https://a.co/x?utm_source=bar"));
}

#[tokio::test]
async fn scheme_less_destination_is_promoted() {
    let h = harness();
    let link = accept(&h, request("example.com/landing"), &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(link.url.as_deref(), Some("https://example.com/landing"));
}

// --- plan policy -----------------------------------------------------------

#[tokio::test]
async fn free_root_redirect_is_restricted() {
    let h = harness();
    let err = reject(
        &h,
        with_key("https://example.com", "_root"),
        &opts("ws_free", PlanTier::Free),
    )
    .await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    // No workspace counts as free.
    let err = reject(
        &h,
        with_key("https://example.com", "_root"),
        &ProcessOptions::default(),
    )
    .await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);
}

#[tokio::test]
async fn pro_features_blocked_on_free_tier() {
    let h = harness();
    let mut req = request("https://example.com");
    req.password = Some("hunter2".into());
    let err = reject(&h, req, &opts("ws_free", PlanTier::Free)).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);
    assert!(err.message.contains("password protection"), "{}", err.message);
}

#[tokio::test]
async fn ab_testing_needs_conversion_tracking() {
    let h = harness();
    let mut req = request("https://example.com");
    req.test_variants = Some(vec![TestVariant {
        url: "https://example.com/b".into(),
        percentage: 50.0,
    }]);
    let err = reject(&h, req.clone(), &opts("ws_1", PlanTier::Business)).await;
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);

    let err = reject(&h, req.clone(), &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    req.track_conversion = true;
    accept(&h, req, &opts("ws_1", PlanTier::Business)).await;
}

// --- domains ---------------------------------------------------------------

#[tokio::test]
async fn domain_defaults_to_primary_then_platform_default() {
    let h = harness();
    let link = accept(&h, request("https://example.com"), &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(link.domain, "acme.com");
    assert_eq!(link.key.len(), 7);

    let link = accept(&h, request("https://example.com"), &opts("ws_empty", PlanTier::Pro)).await;
    assert_eq!(link.domain, "dub.sh");
}

#[tokio::test]
async fn restricted_domain_enforces_allowlist() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = request("https://b.com");
    req.domain = Some("d.co".into());
    let err = reject(&h, req, &pro).await;
    assert_eq!(err.code, ErrorCode::DisallowedDestination);
    assert!(err.message.contains("\"a.com\""), "{}", err.message);

    let mut req = request("https://docs.a.com/page");
    req.domain = Some("d.co".into());
    let link = accept(&h, req, &pro).await;
    assert_eq!(link.domain, "d.co");
}

#[tokio::test]
async fn subdirectory_requires_parent_ownership() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = with_key("https://github.com/alice", "team/alice");
    req.domain = Some("git.new".into());
    let err = reject(&h, req, &pro).await;
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert!(err.message.contains("git.new/team/"), "{}", err.message);

    let mut req = with_key("https://github.com/me", "mine/repo");
    req.domain = Some("git.new".into());
    let link = accept(&h, req, &pro).await;
    assert_eq!(link.key, "mine/repo");
}

#[tokio::test]
async fn unowned_domain_rejected() {
    let h = harness();
    let mut req = request("https://example.com");
    req.domain = Some("someone-else.com".into());
    let err = reject(&h, req, &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(err.code, ErrorCode::DomainNotOwned);
}

#[tokio::test]
async fn registered_link_domain_needs_pro() {
    let h = harness();
    let mut req = request("https://example.com");
    req.domain = Some("free.link".into());
    let err = reject(&h, req.clone(), &opts("ws_free", PlanTier::Free)).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    let link = accept(&h, req, &opts("ws_free", PlanTier::Pro)).await;
    assert_eq!(link.domain, "free.link");
}

#[tokio::test]
async fn flagship_domain_checks() {
    let h = harness();

    let mut req = request("https://example.com");
    req.domain = Some("dub.link".into());
    let err = reject(&h, req, &opts("ws_free", PlanTier::Free)).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    let mut req = request("https://example.com");
    req.domain = Some("dub.sh".into());
    let err = reject(&h, req, &opts("ws_1", PlanTier::Pro).with_user("ghost")).await;
    assert_eq!(err.code, ErrorCode::SessionExpired);

    for url in ["https://www.evil.com/x", "https://cdn.evil.com/payload"] {
        let mut req = request(url);
        req.domain = Some("dub.sh".into());
        let err = reject(&h, req, &opts("ws_1", PlanTier::Pro).with_user("user_1")).await;
        assert_eq!(err.code, ErrorCode::MaliciousUrl, "{url}");
    }
}

// --- keys ------------------------------------------------------------------

#[tokio::test]
async fn supplied_keys_are_normalized_and_checked() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);

    let err = reject(&h, with_key("https://example.com", "bad key"), &pro).await;
    assert_eq!(err.code, ErrorCode::InvalidKey);

    let err = reject(&h, with_key("https://example.com", "taken"), &pro).await;
    assert_eq!(err.code, ErrorCode::Conflict);

    let link = accept(&h, with_key("https://example.com", "/launch//day/"), &pro).await;
    assert_eq!(link.key, "launch/day");
}

#[tokio::test]
async fn short_flagship_keys_need_pro() {
    let h = harness();
    let mut req = with_key("https://example.com", "abc");
    req.domain = Some("dub.sh".into());
    let err = reject(&h, req.clone(), &opts("ws_free", PlanTier::Free)).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    accept(&h, req, &opts("ws_1", PlanTier::Pro)).await;
}

#[tokio::test]
async fn generated_keys_honor_prefix_and_length() {
    let h = harness();
    let mut req = request("https://example.com");
    req.prefix = Some("promo".into());
    req.key_length = Some(4);
    let link = accept(&h, req, &opts("ws_1", PlanTier::Pro)).await;
    assert!(link.key.starts_with("promo/"), "{}", link.key);
    assert_eq!(link.key.len(), "promo/".len() + 4);
}

#[tokio::test]
async fn requested_key_length_is_bounded() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);
    for len in [0, 2, 191, usize::MAX] {
        let mut req = request("https://example.com");
        req.key_length = Some(len);
        let err = reject(&h, req, &pro).await;
        assert_eq!(err.code, ErrorCode::InvalidKey, "{len}");
        assert_eq!(err.message, "Invalid key length.");
    }

    let req: LinkRequest = serde_json::from_value(serde_json::json!({
        "url": "https://example.com",
        "keyLength": 18446744073709551615u64,
    }))
    .unwrap();
    assert_eq!(reject(&h, req, &pro).await.code, ErrorCode::InvalidKey);

    let mut req = request("https://example.com");
    req.key_length = Some(190);
    assert_eq!(accept(&h, req, &pro).await.key.len(), 190);
}

#[tokio::test]
async fn generated_prefix_needs_parent_ownership() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = request("https://github.com/alice");
    req.domain = Some("git.new".into());
    req.prefix = Some("team".into());
    let err = reject(&h, req, &pro).await;
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert!(err.message.contains("git.new/team/"), "{}", err.message);

    let mut req = request("https://github.com/me");
    req.domain = Some("git.new".into());
    req.prefix = Some("mine".into());
    let link = accept(&h, req, &pro).await;
    assert!(link.key.starts_with("mine/"), "{}", link.key);
}

// --- references ------------------------------------------------------------

#[tokio::test]
async fn external_id_must_be_unique_unless_skipped() {
    let h = harness();
    let mut req = request("https://example.com");
    req.external_id = Some("ext-1".into());

    let err = reject(&h, req.clone(), &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(err.code, ErrorCode::Conflict);

    let mut skip = opts("ws_1", PlanTier::Pro);
    skip.skip_external_id_checks = true;
    accept(&h, req, &skip).await;
}

#[tokio::test]
async fn tag_references_are_validated() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = request("https://example.com");
    req.tag_ids = Some(vec!["t1".into(), "t9".into()]);
    let err = reject(&h, req, &pro).await;
    assert_eq!(err.code, ErrorCode::InvalidReference);
    assert_eq!(err.message, "Invalid tagIds detected: t9");

    let mut req = request("https://example.com");
    req.tag_names = Some(vec!["news".into(), "sports".into()]);
    let err = reject(&h, req, &pro).await;
    assert_eq!(err.message, "Invalid tagNames detected: sports");

    let mut req = request("https://example.com");
    req.tag_id = Some("t1".into());
    let link = accept(&h, req, &pro).await;
    assert_eq!(link.tag_ids, Some(vec!["t1".to_string()]));

    let mut req = request("https://example.com");
    req.tag_ids = Some(vec!["t1".into()]);
    let err = reject(&h, req, &ProcessOptions::default()).await;
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn folder_references_are_validated() {
    let h = harness();
    let mut req = request("https://example.com");
    req.folder_id = Some("fold_1".into());

    let err = reject(&h, req.clone(), &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = reject(&h, req.clone(), &opts("ws_free", PlanTier::Free).with_user("user_1")).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    let err = reject(&h, req.clone(), &opts("ws_1", PlanTier::Pro).with_user("user_2")).await;
    assert_eq!(err.code, ErrorCode::Forbidden);

    let link = accept(&h, req, &opts("ws_1", PlanTier::Pro).with_user("user_1")).await;
    assert_eq!(link.folder_id.as_deref(), Some("fold_1"));
    assert_eq!(link.user_id.as_deref(), Some("user_1"));
}

#[tokio::test]
async fn folder_checks_can_be_skipped() {
    let h = harness();
    let mut req = request("https://example.com");
    req.folder_id = Some("fold_1".into());

    let mut edit = opts("ws_1", PlanTier::Pro).with_user("user_2");
    let err = reject(&h, req.clone(), &edit).await;
    assert_eq!(err.code, ErrorCode::Forbidden);

    edit.skip_folder_checks = true;
    let link = accept(&h, req, &edit).await;
    assert_eq!(link.folder_id.as_deref(), Some("fold_1"));
}

#[tokio::test]
async fn program_checks_can_be_skipped() {
    let h = harness();
    let mut req = request("https://example.com");
    req.program_id = Some("prog_other".into());
    req.tenant_id = Some("ten_1".into());

    let mut skip = opts("ws_1", PlanTier::Pro);
    skip.skip_program_checks = true;
    let link = accept(&h, req, &skip).await;
    assert_eq!(link.program_id.as_deref(), Some("prog_other"));
    assert_eq!(link.partner_id, None);
    assert_eq!(link.folder_id, None);
}

#[tokio::test]
async fn program_resolves_partner_and_default_folder() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = request("https://example.com");
    req.program_id = Some("prog_1".into());
    req.tenant_id = Some("ten_1".into());
    let link = accept(&h, req.clone(), &pro).await;
    assert_eq!(link.partner_id.as_deref(), Some("p_1"));
    assert_eq!(link.folder_id.as_deref(), Some("fold_prog"));

    req.partner_id = Some("p_explicit".into());
    let link = accept(&h, req, &pro).await;
    assert_eq!(link.partner_id.as_deref(), Some("p_explicit"));

    let mut req = request("https://example.com");
    req.program_id = Some("prog_other".into());
    let err = reject(&h, req, &pro).await;
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn webhooks_need_business_tier_and_valid_ids() {
    let h = harness();
    let mut req = request("https://example.com");
    req.webhook_ids = Some(vec!["wh_1".into()]);
    let err = reject(&h, req, &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    let mut req = request("https://example.com");
    req.webhook_ids = Some(vec!["wh_404".into()]);
    let err = reject(&h, req, &opts("ws_1", PlanTier::Pro)).await;
    assert_eq!(err.code, ErrorCode::PlanRestriction);

    let mut req = request("https://example.com");
    req.webhook_ids = Some(vec!["wh_1".into(), "wh_1".into(), "wh_404".into()]);
    let err = reject(&h, req, &opts("ws_1", PlanTier::Business)).await;
    assert_eq!(err.code, ErrorCode::InvalidReference);
    assert_eq!(err.message, "Invalid webhookIds detected: wh_404");

    let mut req = request("https://example.com");
    req.webhook_ids = Some(vec!["wh_1".into(), "wh_1".into()]);
    let link = accept(&h, req, &opts("ws_1", PlanTier::Business)).await;
    assert_eq!(link.webhook_ids, Some(vec!["wh_1".to_string()]));
}

#[tokio::test]
async fn bulk_mode_only_checks_preview_images() {
    let h = harness();
    let business = opts("ws_1", PlanTier::Business).bulk();

    let mut req = request("https://example.com");
    req.proxy = true;
    req.image = Some("https://cdn.example.com/card.png".into());
    let err = reject(&h, req, &business).await;
    assert_eq!(err.code, ErrorCode::Unsupported);

    let mut req = request("https://example.com");
    req.proxy = true;
    req.image = Some("https://assets.test/card.png".into());
    req.tag_ids = Some(vec!["unknown".into()]);
    accept(&h, req, &business).await;
}

#[tokio::test]
async fn proxy_requires_storage_capability() {
    let h = harness_with(PipelineConfig::default());
    let mut req = request("https://example.com");
    req.proxy = true;
    let err = reject(&h, req, &opts("ws_1", PlanTier::Business)).await;
    assert_eq!(err.code, ErrorCode::InvalidConfiguration);
}

// --- temporal --------------------------------------------------------------

#[tokio::test]
async fn expiration_and_test_dates_are_parsed() {
    let h = harness();
    let business = opts("ws_1", PlanTier::Business);

    let mut req = request("https://example.com");
    req.expires_at = Some("in 2 days".into());
    req.expired_url = Some("example.com/expired".into());
    req.track_conversion = true;
    req.test_completed_at = Some("2026-02-01T00:00:00Z".into());
    let link = accept(&h, req, &business).await;
    assert_eq!(
        link.expires_at,
        Some(Utc.with_ymd_and_hms(2026, 1, 12, 12, 0, 0).unwrap())
    );
    assert_eq!(link.expired_url.as_deref(), Some("https://example.com/expired"));
    assert_eq!(
        link.test_completed_at,
        Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap())
    );

    let mut req = request("https://example.com");
    req.expires_at = Some("someday".into());
    assert_eq!(reject(&h, req, &business).await.code, ErrorCode::InvalidDate);

    let mut req = request("https://example.com");
    req.expires_at = Some("2026-06-01".into());
    req.expired_url = Some("not a url".into());
    assert_eq!(reject(&h, req, &business).await.code, ErrorCode::InvalidUrl);

    let mut req = request("https://example.com");
    req.test_completed_at = Some("whenever".into());
    assert_eq!(reject(&h, req, &business).await.code, ErrorCode::InvalidDate);
}

// --- whole-pipeline properties ---------------------------------------------

#[tokio::test]
async fn identical_requests_produce_identical_links() {
    let h = harness();
    let pro = opts("ws_1", PlanTier::Pro);
    let mut req = with_key("https://example.com/a", "same");
    req.tag_names = Some(vec!["news".into()]);
    req.utm.utm_campaign = Some("spring".into());

    let first = accept(&h, req.clone(), &pro).await;
    let second = accept(&h, req, &pro).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn normalized_link_round_trips_as_edit() {
    let h = harness();
    let service = LinkService::new(h.processor.clone());
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = with_key("https://example.com", "promo");
    req.external_id = Some("ext-9".into());
    let created = service.create(req, &pro).await.expect("created");

    let err = reject(&h, created.to_request(), &pro).await;
    assert_eq!(err.code, ErrorCode::Conflict);

    let mut edit = pro.clone();
    edit.skip_key_checks = true;
    edit.skip_external_id_checks = true;
    let again = accept(&h, created.to_request(), &edit).await;
    assert_eq!(again, created);
}

#[tokio::test]
async fn service_update_skips_unchanged_checks() {
    let h = harness();
    let service = LinkService::new(h.processor.clone());
    let pro = opts("ws_1", PlanTier::Pro);

    let mut req = with_key("https://example.com", "edit-me");
    req.external_id = Some("ext-edit".into());
    let created = service.create(req, &pro).await.expect("created");

    let mut payload = created.to_request();
    payload.url = Some("https://example.org/new".into());
    let updated = service.update(&created, payload, &pro).await.expect("updated");
    assert_eq!(updated.url.as_deref(), Some("https://example.org/new"));

    let rows = h.store.links().unwrap();
    assert_eq!(rows.iter().filter(|l| l.key == "edit-me").count(), 1);
}

#[tokio::test]
async fn store_constraint_violation_becomes_conflict() {
    let h = harness();
    let service = LinkService::new(h.processor.clone());
    let mut racing = opts("ws_1", PlanTier::Pro);
    racing.skip_key_checks = true;

    service
        .create(with_key("https://example.com", "raced"), &racing)
        .await
        .expect("first writer wins");
    let err = service
        .create(with_key("https://example.com", "raced"), &racing)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::Conflict));
}

struct DownBlocklist;

#[async_trait]
impl Blocklist for DownBlocklist {
    async fn is_blacklisted(&self, _domain: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("edge config timeout".into()))
    }
}

#[tokio::test]
async fn collaborator_faults_are_not_rejections() {
    let config = test_config();
    let store = Arc::new(InMemoryStore::new(config.clone(), fixtures()));
    let mut deps = memory::collaborators(store, Arc::new(FixedClock(now())));
    deps.blocklist = Arc::new(DownBlocklist);
    let processor = LinkProcessor::new(config, deps);

    let mut req = request("https://example.com");
    req.domain = Some("dub.sh".into());
    let err = processor
        .process(req, &opts("ws_1", PlanTier::Pro))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Store(StoreError::Unavailable(_))));
}
