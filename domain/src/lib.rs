//! Domain library for the link-processing pipeline.
//!
//! Holds the domain types, the collaborator ports (traits), the rejection
//! taxonomy and the pipeline stages that turn an untrusted [`LinkRequest`]
//! into a [`NormalizedLink`]. Persistence, key generation, blocklists and
//! folder permissions are reached only through the ports defined here; the
//! in-memory adapters under [`adapters`] back tests and local runs.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod adapters;
pub mod base62;
pub mod config;
pub mod domains;
pub mod keys;
pub mod pipeline;
pub mod plan;
pub mod references;
pub mod request;
pub mod service;
pub mod temporal;
pub mod validate;

pub use config::{PipelineConfig, PlatformDomain, PlatformDomainKind};
pub use pipeline::{LinkProcessor, ProcessOptions, Stage};
pub use request::{LinkRequest, NormalizedLink, TestVariant, UtmTags};
pub use service::LinkService;

/// The key that denotes a domain's own root redirect.
pub const ROOT_KEY: &str = "_root";

/// Workspace plan tier. Everything from `Business` upwards is "business+".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Business,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Business => "business",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "pro" => Some(PlanTier::Pro),
            "business" => Some(PlanTier::Business),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }

    pub fn is_business_plus(&self) -> bool {
        *self >= PlanTier::Business
    }
}

/// Read-only projection of the workspace that owns the link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceContext {
    pub id: String,
    pub plan: PlanTier,
}

impl WorkspaceContext {
    pub fn new<S: Into<String>>(id: S, plan: PlanTier) -> Self {
        Self {
            id: id.into(),
            plan,
        }
    }
}

/// Plan of an optional workspace; a missing workspace is treated as free.
pub(crate) fn plan_of(workspace: Option<&WorkspaceContext>) -> PlanTier {
    workspace.map_or(PlanTier::Free, |ws| ws.plan)
}

/// A domain registered by a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub id: String,
    pub slug: String,
    pub workspace_id: String,
    #[serde(default)]
    pub primary: bool,
}

/// A `.link` domain the platform registered on behalf of a workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredDomain {
    pub domain_id: String,
    pub slug: String,
}

/// Minimal view of an existing link, as needed for ownership checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRef {
    pub domain: String,
    pub key: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// An affiliate program, with the partners whose enrollment matched the
/// tenant filter of the lookup (empty when no filter was applied).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramRecord {
    pub id: String,
    pub workspace_id: String,
    pub default_folder_id: Option<String>,
    pub enrolled_partner_ids: Vec<String>,
}

/// How tags are referenced by a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagLookup {
    Ids(Vec<String>),
    Names(Vec<String>),
}

impl TagLookup {
    pub fn identifiers(&self) -> &[String] {
        match self {
            TagLookup::Ids(ids) => ids,
            TagLookup::Names(names) => names,
        }
    }

    /// Field name the caller used, for error messages.
    pub fn field(&self) -> &'static str {
        match self {
            TagLookup::Ids(_) => "tagIds",
            TagLookup::Names(_) => "tagNames",
        }
    }
}

/// Fixed rejection taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidUrl,
    MissingUrl,
    PlanRestriction,
    InvalidConfiguration,
    SessionExpired,
    MaliciousUrl,
    DisallowedDestination,
    Forbidden,
    DomainNotOwned,
    InvalidKey,
    Conflict,
    InvalidReference,
    NotFound,
    Unsupported,
    InvalidDate,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 15] = [
        ErrorCode::InvalidUrl,
        ErrorCode::MissingUrl,
        ErrorCode::PlanRestriction,
        ErrorCode::InvalidConfiguration,
        ErrorCode::SessionExpired,
        ErrorCode::MaliciousUrl,
        ErrorCode::DisallowedDestination,
        ErrorCode::Forbidden,
        ErrorCode::DomainNotOwned,
        ErrorCode::InvalidKey,
        ErrorCode::Conflict,
        ErrorCode::InvalidReference,
        ErrorCode::NotFound,
        ErrorCode::Unsupported,
        ErrorCode::InvalidDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::MissingUrl => "missing_url",
            ErrorCode::PlanRestriction => "plan_restriction",
            ErrorCode::InvalidConfiguration => "invalid_configuration",
            ErrorCode::SessionExpired => "session_expired",
            ErrorCode::MaliciousUrl => "malicious_url",
            ErrorCode::DisallowedDestination => "disallowed_destination",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::DomainNotOwned => "domain_not_owned",
            ErrorCode::InvalidKey => "invalid_key",
            ErrorCode::Conflict => "conflict",
            ErrorCode::InvalidReference => "invalid_reference",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Unsupported => "unsupported",
            ErrorCode::InvalidDate => "invalid_date",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == s)
    }

    /// Transport-level code a caller would surface for this rejection.
    pub fn api_code(&self) -> &'static str {
        match self {
            ErrorCode::MissingUrl | ErrorCode::InvalidConfiguration => "bad_request",
            ErrorCode::PlanRestriction | ErrorCode::Forbidden | ErrorCode::DomainNotOwned => {
                "forbidden"
            }
            ErrorCode::SessionExpired | ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::InvalidUrl
            | ErrorCode::MaliciousUrl
            | ErrorCode::DisallowedDestination
            | ErrorCode::InvalidKey
            | ErrorCode::InvalidReference
            | ErrorCode::Unsupported
            | ErrorCode::InvalidDate => "unprocessable_entity",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal, structured rejection of a link request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Rejection {}

/// Outcome of a collaborator policy check (key availability, folder access).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(Rejection),
}

/// Faults raised by collaborators. These are not validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unique constraint violated on {field}")]
    UniqueViolation { field: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// Error returned by the pipeline and the service layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("link rejected: {0}")]
    Rejected(Rejection),
    #[error(transparent)]
    Store(StoreError),
}

impl ProcessError {
    /// The rejection, if this is a validation failure.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ProcessError::Rejected(r) => Some(r),
            ProcessError::Store(_) => None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.rejection().map(|r| r.code)
    }
}

impl From<Rejection> for ProcessError {
    fn from(r: Rejection) -> Self {
        ProcessError::Rejected(r)
    }
}

/// Store-level unique constraint failures become `Conflict` rejections; every
/// other store fault stays a collaborator fault.
impl From<StoreError> for ProcessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation { field } => {
                let message = match field.as_str() {
                    "key" => "Duplicate key: This short link already exists.".to_string(),
                    "external_id" => {
                        "A link with this externalId already exists in this workspace.".to_string()
                    }
                    other => format!("A link with this {} already exists.", other),
                };
                ProcessError::Rejected(Rejection::new(ErrorCode::Conflict, message))
            }
            other => ProcessError::Store(other),
        }
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Data store port: every lookup the pipeline performs, plus the writes the
/// service layer needs.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Domains owned by a workspace.
    async fn workspace_domains(&self, workspace_id: &str) -> Result<Vec<DomainRecord>, StoreError>;
    async fn find_link(&self, domain: &str, key: &str) -> Result<Option<LinkRef>, StoreError>;
    async fn external_id_exists(
        &self,
        workspace_id: &str,
        external_id: &str,
    ) -> Result<bool, StoreError>;
    /// Returns the subset of the requested identifiers that exist.
    async fn find_tags(
        &self,
        workspace_id: &str,
        lookup: &TagLookup,
    ) -> Result<Vec<String>, StoreError>;
    /// Returns the subset of the requested webhook ids that exist.
    async fn find_webhooks(
        &self,
        workspace_id: &str,
        ids: &[String],
    ) -> Result<Vec<String>, StoreError>;
    /// Looks up a program; when `tenant_id` is given, only partners enrolled
    /// with that tenant are projected into the record.
    async fn find_program(
        &self,
        program_id: &str,
        tenant_id: Option<&str>,
    ) -> Result<Option<ProgramRecord>, StoreError>;
    async fn registered_domain(
        &self,
        domain_id: &str,
    ) -> Result<Option<RegisteredDomain>, StoreError>;
    /// Uniqueness and reserved-word checks for a normalized key.
    async fn check_key(
        &self,
        domain: &str,
        key: &str,
        workspace: Option<&WorkspaceContext>,
    ) -> Result<Verdict, StoreError>;
    /// Persist a new link. Fails with `UniqueViolation` on key or external id clashes.
    async fn insert_link(&self, link: &NormalizedLink) -> Result<(), StoreError>;
    /// Replace the link stored under `domain`/`key`.
    async fn replace_link(
        &self,
        domain: &str,
        key: &str,
        link: &NormalizedLink,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Returns a key that is available on `domain`.
    async fn random_key(
        &self,
        domain: &str,
        prefix: Option<&str>,
        length: Option<usize>,
    ) -> Result<String, StoreError>;
}

#[async_trait]
pub trait Blocklist: Send + Sync {
    async fn is_blacklisted(&self, domain: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait FolderAccess: Send + Sync {
    async fn verify(
        &self,
        workspace: &WorkspaceContext,
        user_id: &str,
        folder_id: &str,
        permission: &str,
    ) -> Result<Verdict, StoreError>;
}

/// Everything the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn LinkStore>,
    pub identity: Arc<dyn IdentityService>,
    pub keys: Arc<dyn KeyGenerator>,
    pub blocklist: Arc<dyn Blocklist>,
    pub folders: Arc<dyn FolderAccess>,
    pub clock: Arc<dyn Clock>,
}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - link pipeline loaded", pkg, ver)
}
