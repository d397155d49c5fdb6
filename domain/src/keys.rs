//! Short-key normalization, availability rules and generation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::base62::random_string;
use crate::pipeline::{Draft, StageContext};
use crate::{
    plan_of, ErrorCode, KeyGenerator, LinkStore, PipelineConfig, PlanTier, ProcessError,
    Rejection, StoreError, Verdict, WorkspaceContext, ROOT_KEY,
};

/// Shortest `keyLength` a request may ask for.
pub const MIN_GENERATED_KEY_LENGTH: usize = 3;

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(c, '-' | '_' | '.' | '/')
        || (!c.is_ascii() && !c.is_whitespace() && !c.is_control())
}

/// Normalize a caller-supplied key. Returns `None` when the key is unusable.
///
/// `_root` passes through. Otherwise: only letters, digits, `-`, `_`, `.`,
/// `/` and non-ASCII symbols; no leading `_`; outer slashes removed and
/// repeated slashes collapsed; lower-cased on case-insensitive domains.
pub fn process_key(config: &PipelineConfig, domain: &str, key: &str) -> Option<String> {
    if key == ROOT_KEY {
        return Some(key.to_string());
    }
    if key.is_empty() || !key.chars().all(is_key_char) {
        return None;
    }
    let collapsed = key
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if collapsed.is_empty() || collapsed.starts_with('_') {
        return None;
    }
    if config.is_case_insensitive(domain) {
        Some(collapsed.to_lowercase())
    } else {
        Some(collapsed)
    }
}

/// Availability rules for a normalized key; `exists` says whether a link
/// already uses it on `domain`.
pub fn standard_key_checks(
    config: &PipelineConfig,
    domain: &str,
    key: &str,
    workspace: Option<&WorkspaceContext>,
    exists: bool,
) -> Verdict {
    let duplicate = || {
        Verdict::Deny(Rejection::new(
            ErrorCode::Conflict,
            "Duplicate key: This short link already exists.",
        ))
    };

    if key.is_empty() {
        return Verdict::Deny(Rejection::new(ErrorCode::InvalidKey, "Key cannot be empty."));
    }
    if exists {
        return duplicate();
    }
    if config.is_flagship(domain) {
        if config.reserved_keys.iter().any(|r| r.eq_ignore_ascii_case(key)) {
            return duplicate();
        }
        let len = key.chars().count();
        if len <= config.premium_key_max_length && plan_of(workspace) == PlanTier::Free {
            return Verdict::Deny(Rejection::new(
                ErrorCode::PlanRestriction,
                format!(
                    "You can only use keys that are {} characters or less on a Pro plan and above. Upgrade to Pro to register a {}-character key.",
                    config.premium_key_max_length, len
                ),
            ));
        }
    }
    Verdict::Allow
}

/// Key stage: generate a key, or normalize and check the supplied one.
pub(crate) async fn allocate(cx: &StageContext<'_>, draft: &mut Draft) -> Result<(), ProcessError> {
    let domain = draft.domain.clone().unwrap_or_default();
    let supplied = draft.key.clone().filter(|k| !k.is_empty());

    let Some(key) = supplied else {
        let length = draft.request.key_length;
        if let Some(len) = length {
            if !(MIN_GENERATED_KEY_LENGTH..=cx.config.max_key_length).contains(&len) {
                return Err(Rejection::new(ErrorCode::InvalidKey, "Invalid key length.").into());
            }
        }
        let key = cx
            .deps
            .keys
            .random_key(
                &domain,
                draft.request.prefix.as_deref(),
                length,
            )
            .await?;
        debug!(key = %key, "generated key");
        draft.key = Some(key);
        return Ok(());
    };

    if cx.opts.skip_key_checks {
        draft.key = Some(key);
        return Ok(());
    }

    let key = process_key(cx.config, &domain, &key)
        .ok_or_else(|| Rejection::new(ErrorCode::InvalidKey, "Invalid key."))?;

    match cx.deps.store.check_key(&domain, &key, cx.workspace()).await? {
        Verdict::Allow => {
            draft.key = Some(key);
            Ok(())
        }
        Verdict::Deny(rejection) => Err(rejection.into()),
    }
}

/// Draws random base62 keys until one is free on the domain.
pub struct RandomKeyGenerator {
    store: Arc<dyn LinkStore>,
    default_length: usize,
}

impl RandomKeyGenerator {
    /// Upper bound on draws before giving up.
    const MAX_ATTEMPTS: usize = 100;

    pub fn new(store: Arc<dyn LinkStore>, default_length: usize) -> Self {
        Self {
            store,
            default_length,
        }
    }

    fn candidate(prefix: Option<&str>, length: usize) -> String {
        let body = random_string(&mut rand::thread_rng(), length);
        match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
            Some(p) => format!("{}/{}", p, body),
            None => body,
        }
    }
}

#[async_trait]
impl KeyGenerator for RandomKeyGenerator {
    async fn random_key(
        &self,
        domain: &str,
        prefix: Option<&str>,
        length: Option<usize>,
    ) -> Result<String, StoreError> {
        let length = length.filter(|l| *l > 0).unwrap_or(self.default_length);
        for _ in 0..Self::MAX_ATTEMPTS {
            let key = Self::candidate(prefix, length);
            if self.store.find_link(domain, &key).await?.is_none() {
                return Ok(key);
            }
        }
        Err(StoreError::Backend("failed to generate unique key".into()))
    }
}
