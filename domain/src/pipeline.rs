//! The ordered validation pipeline.
//!
//! A request moves through [`Stage::ORDER`]; each stage either updates the
//! working [`Draft`] or rejects it, and the first rejection ends the run.
//! After the last stage the draft is finalized into a [`NormalizedLink`].

use chrono::{DateTime, Utc};
use tracing::{debug, debug_span, error, info, warn, Instrument};

use crate::{
    domains, keys, plan, references, temporal, validate, Collaborators, DomainRecord, LinkRequest,
    NormalizedLink, PipelineConfig, ProcessError, WorkspaceContext,
};

/// Who is asking and which checks the caller has already done.
#[derive(Clone, Debug, Default)]
pub struct ProcessOptions {
    pub workspace: Option<WorkspaceContext>,
    /// Acting user.
    pub user_id: Option<String>,
    /// Bulk creation: reference checks are done by the caller in aggregate.
    pub bulk: bool,
    /// Only when the key does not change (editing a link).
    pub skip_key_checks: bool,
    /// Only when the external id does not change (editing a link).
    pub skip_external_id_checks: bool,
    /// Update/upsert flows that verified the folder already.
    pub skip_folder_checks: bool,
    /// The program was validated by the caller.
    pub skip_program_checks: bool,
}

impl ProcessOptions {
    pub fn for_workspace(workspace: WorkspaceContext) -> Self {
        Self {
            workspace: Some(workspace),
            ..Self::default()
        }
    }

    pub fn with_user<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn bulk(mut self) -> Self {
        self.bulk = true;
        self
    }
}

/// Validation stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Destination,
    PlanPolicy,
    Domain,
    Key,
    References,
    Temporal,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::Destination,
        Stage::PlanPolicy,
        Stage::Domain,
        Stage::Key,
        Stage::References,
        Stage::Temporal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Destination => "destination",
            Stage::PlanPolicy => "plan_policy",
            Stage::Domain => "domain",
            Stage::Key => "key",
            Stage::References => "references",
            Stage::Temporal => "temporal",
        }
    }
}

/// Working state of one invocation. Stages fill in the resolved fields; the
/// original request stays available for pass-through fields.
#[derive(Debug)]
pub(crate) struct Draft {
    pub request: LinkRequest,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub key: Option<String>,
    pub domains: Vec<DomainRecord>,
    pub tag_ids: Option<Vec<String>>,
    pub partner_id: Option<String>,
    pub webhook_ids: Option<Vec<String>>,
    pub program_folder_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired_url: Option<String>,
    pub test_completed_at: Option<DateTime<Utc>>,
}

impl Draft {
    pub(crate) fn new(request: LinkRequest) -> Self {
        Self {
            url: request.url.clone(),
            domain: request.domain.clone(),
            key: request.key.clone(),
            domains: Vec::new(),
            tag_ids: request.combined_tag_ids(),
            partner_id: request.partner_id.clone().filter(|p| !p.is_empty()),
            webhook_ids: request.webhook_ids.clone(),
            program_folder_id: None,
            expires_at: None,
            expired_url: request.expired_url.clone(),
            test_completed_at: None,
            request,
        }
    }
}

/// Read-only inputs shared by every stage.
pub(crate) struct StageContext<'a> {
    pub config: &'a PipelineConfig,
    pub deps: &'a Collaborators,
    pub opts: &'a ProcessOptions,
}

impl StageContext<'_> {
    pub fn workspace(&self) -> Option<&WorkspaceContext> {
        self.opts.workspace.as_ref()
    }
}

/// Runs the pipeline over one request at a time. Holds no per-request state.
#[derive(Clone)]
pub struct LinkProcessor {
    config: PipelineConfig,
    deps: Collaborators,
}

impl LinkProcessor {
    pub fn new(config: PipelineConfig, deps: Collaborators) -> Self {
        Self { config, deps }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.deps
    }

    /// Validate and normalize `payload`.
    pub async fn process(
        &self,
        payload: LinkRequest,
        opts: &ProcessOptions,
    ) -> Result<NormalizedLink, ProcessError> {
        let span = debug_span!(
            "process_link",
            workspace = opts.workspace.as_ref().map(|w| w.id.as_str()).unwrap_or("-"),
            bulk = opts.bulk,
        );
        async move {
            let cx = StageContext {
                config: &self.config,
                deps: &self.deps,
                opts,
            };
            let mut draft = Draft::new(payload);
            for stage in Stage::ORDER {
                debug!(stage = stage.as_str(), "running stage");
                if let Err(err) = run_stage(stage, &cx, &mut draft).await {
                    match &err {
                        ProcessError::Rejected(r) => warn!(
                            stage = stage.as_str(),
                            code = r.code.as_str(),
                            message = %r.message,
                            "link rejected"
                        ),
                        ProcessError::Store(e) => {
                            error!(stage = stage.as_str(), err = ?e, "collaborator failure")
                        }
                    }
                    return Err(err);
                }
            }
            let link = finalize(draft, opts);
            info!(domain = %link.domain, key = %link.key, "link accepted");
            Ok(link)
        }
        .instrument(span)
        .await
    }
}

/// Dispatch one stage.
pub(crate) async fn run_stage(
    stage: Stage,
    cx: &StageContext<'_>,
    draft: &mut Draft,
) -> Result<(), ProcessError> {
    match stage {
        Stage::Destination => validate::normalize_destination(draft)?,
        Stage::PlanPolicy => plan::enforce(cx.workspace(), draft)?,
        Stage::Domain => domains::resolve(cx, draft).await?,
        Stage::Key => keys::allocate(cx, draft).await?,
        Stage::References => references::check(cx, draft).await?,
        Stage::Temporal => temporal::parse_fields(cx, draft)?,
    }
    Ok(())
}

/// Assemble the output record. Transient fields (`shortLink`, `qrCode`,
/// `keyLength`, `prefix`, UTM tags) are dropped here.
pub(crate) fn finalize(draft: Draft, opts: &ProcessOptions) -> NormalizedLink {
    let Draft {
        request,
        url,
        domain,
        key,
        tag_ids,
        partner_id,
        webhook_ids,
        program_folder_id,
        expires_at,
        expired_url,
        test_completed_at,
        ..
    } = draft;

    let folder_id = request
        .folder_id
        .clone()
        .filter(|f| !f.is_empty())
        .or(program_folder_id);

    NormalizedLink {
        domain: domain.unwrap_or_default(),
        key: key.unwrap_or_default(),
        url,
        project_id: opts.workspace.as_ref().map(|w| w.id.clone()),
        // Keep an existing creator unless an acting user is supplied.
        user_id: opts.user_id.clone().or(request.user_id),
        partner_id,
        program_id: request.program_id,
        tenant_id: request.tenant_id,
        external_id: request.external_id,
        folder_id,
        tag_ids,
        tag_names: request.tag_names,
        webhook_ids,
        title: request.title,
        description: request.description,
        image: request.image,
        comments: request.comments,
        proxy: request.proxy,
        password: request.password,
        rewrite: request.rewrite,
        do_index: request.do_index,
        ios: request.ios,
        android: request.android,
        geo: request.geo,
        expires_at,
        expired_url: if expires_at.is_some() { expired_url } else { request.expired_url },
        track_conversion: request.track_conversion,
        test_variants: request.test_variants,
        test_completed_at,
        extra: request.extra,
    }
}
