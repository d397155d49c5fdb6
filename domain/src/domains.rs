//! Domain resolution and access checks.
//!
//! The target domain is classified once and exactly one rule set applies:
//! flagship platform domains, other platform-owned domains (hostname
//! allowlist and subdirectory ownership), or workspace-owned domains.

use tracing::debug;

use crate::pipeline::{Draft, StageContext};
use crate::validate::{apex_domain, hostname_without_www};
use crate::{
    plan_of, DomainRecord, ErrorCode, PlanTier, PlatformDomainKind, ProcessError, Rejection,
    ROOT_KEY,
};

/// Pick the domain for a request that named none.
pub fn default_domain<'a>(domains: &'a [DomainRecord], fallback: &'a str) -> &'a str {
    domains
        .iter()
        .find(|d| d.primary)
        .map(|d| d.slug.as_str())
        .unwrap_or(fallback)
}

/// Rejection for a destination outside a restricted domain's allowlist.
pub fn disallowed_destination(domain: &str, allowed: &[String]) -> Rejection {
    let noun = if allowed.len() == 1 { "domain" } else { "domains" };
    let listed = allowed
        .iter()
        .map(|h| format!("\"{}\"", h))
        .collect::<Vec<_>>()
        .join(", ");
    Rejection::new(
        ErrorCode::DisallowedDestination,
        format!(
            "Invalid destination URL. You can only create {} short links for URLs with the {} {}.",
            domain, noun, listed
        ),
    )
}

/// Domain stage.
pub(crate) async fn resolve(cx: &StageContext<'_>, draft: &mut Draft) -> Result<(), ProcessError> {
    let workspace = cx.workspace();
    if let Some(ws) = workspace {
        draft.domains = cx.deps.store.workspace_domains(&ws.id).await?;
    }

    let domain = match draft.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => d.to_lowercase(),
        None => default_domain(&draft.domains, &cx.config.default_domain).to_string(),
    };
    debug!(domain = %domain, "resolved domain");
    draft.domain = Some(domain.clone());

    let key = draft.key.clone().unwrap_or_default();
    let url = draft.url.clone();

    match cx.config.platform_domain(&domain).map(|d| d.kind.clone()) {
        Some(PlatformDomainKind::Flagship { requires_pro }) => {
            if requires_pro && plan_of(workspace) == PlanTier::Free {
                return Err(Rejection::new(
                    ErrorCode::PlanRestriction,
                    format!(
                        "You can only use {} on a Pro plan and above. Upgrade to Pro to use this domain.",
                        domain
                    ),
                )
                .into());
            }

            if let Some(user_id) = cx.opts.user_id.as_deref() {
                if !cx.deps.identity.user_exists(user_id).await? {
                    return Err(Rejection::new(
                        ErrorCode::SessionExpired,
                        "Session expired. Please log in again.",
                    )
                    .into());
                }
            }

            if let Some(url) = url.as_deref() {
                if is_malicious(cx, url).await? {
                    return Err(
                        Rejection::new(ErrorCode::MaliciousUrl, "Malicious URL detected").into(),
                    );
                }
            }
        }
        Some(PlatformDomainKind::Restricted { allowed_hostnames }) => {
            if let (Some(allowed), Some(url)) = (allowed_hostnames, url.as_deref()) {
                if key != ROOT_KEY {
                    let host = hostname_without_www(url).unwrap_or_default();
                    let apex = apex_domain(url).unwrap_or_default();
                    if !allowed.contains(&host) && !allowed.contains(&apex) {
                        return Err(disallowed_destination(&domain, &allowed).into());
                    }
                }
            }

            let parent_key = subdirectory_parent(&key, draft.request.prefix.as_deref());
            if let Some(parent_key) = parent_key.filter(|_| !cx.opts.skip_key_checks) {
                let parent = cx.deps.store.find_link(&domain, parent_key).await?;
                let owner = parent.and_then(|l| l.workspace_id);
                if owner.as_deref() != workspace.map(|w| w.id.as_str()) {
                    return Err(Rejection::new(
                        ErrorCode::Forbidden,
                        format!(
                            "You do not have access to create links in the {}/{}/ subdirectory.",
                            domain, parent_key
                        ),
                    )
                    .into());
                }
            }
        }
        None => {
            let Some(record) = draft.domains.iter().find(|d| d.slug == domain) else {
                return Err(Rejection::new(
                    ErrorCode::DomainNotOwned,
                    "Domain does not belong to workspace.",
                )
                .into());
            };

            let free = workspace.is_some_and(|w| w.plan == PlanTier::Free);
            if domain.ends_with(".link") && free {
                if cx.deps.store.registered_domain(&record.id).await?.is_some() {
                    return Err(Rejection::new(
                        ErrorCode::PlanRestriction,
                        "You can only use your free .link domain on a Pro plan and above. Upgrade to Pro to use this domain.",
                    )
                    .into());
                }
            }
        }
    }

    Ok(())
}

/// First path segment a key will live under: from the key itself, or from
/// the prefix when the key is still to be generated.
pub fn subdirectory_parent<'a>(key: &'a str, prefix: Option<&'a str>) -> Option<&'a str> {
    if key.contains('/') {
        return key.split('/').find(|s| !s.is_empty());
    }
    if !key.is_empty() {
        return None;
    }
    prefix?.split('/').find(|s| !s.is_empty())
}

/// Blocklist check on the destination's hostname and registrable domain.
async fn is_malicious(cx: &StageContext<'_>, url: &str) -> Result<bool, ProcessError> {
    let Some(host) = hostname_without_www(url) else {
        return Ok(false);
    };
    if cx.deps.blocklist.is_blacklisted(&host).await? {
        return Ok(true);
    }
    match apex_domain(url) {
        Some(apex) if apex != host => Ok(cx.deps.blocklist.is_blacklisted(&apex).await?),
        _ => Ok(false),
    }
}
