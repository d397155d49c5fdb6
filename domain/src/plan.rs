//! Plan policy gate: feature predicates by tier.
//!
//! Each predicate is a pure function over the request; the first one that
//! matches a feature the tier lacks becomes a `PlanRestriction`.

use crate::pipeline::Draft;
use crate::{plan_of, ErrorCode, LinkRequest, PlanTier, Rejection, WorkspaceContext, ROOT_KEY};

/// A gated feature and how to detect it on a request.
pub struct FeatureGate {
    pub feature: &'static str,
    pub used_by: fn(&LinkRequest) -> bool,
}

fn non_empty(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(|v| !v.is_empty())
}

fn uses_ab_testing(r: &LinkRequest) -> bool {
    r.test_variants.is_some() || non_empty(&r.test_completed_at)
}
fn uses_proxy(r: &LinkRequest) -> bool {
    r.proxy
}
fn uses_password(r: &LinkRequest) -> bool {
    non_empty(&r.password)
}
fn uses_rewrite(r: &LinkRequest) -> bool {
    r.rewrite
}
fn uses_expiration(r: &LinkRequest) -> bool {
    non_empty(&r.expires_at)
}
fn uses_ios(r: &LinkRequest) -> bool {
    non_empty(&r.ios)
}
fn uses_android(r: &LinkRequest) -> bool {
    non_empty(&r.android)
}
fn uses_geo(r: &LinkRequest) -> bool {
    r.geo.is_some()
}
fn uses_indexing(r: &LinkRequest) -> bool {
    r.do_index
}

pub const BUSINESS_FEATURES: &[FeatureGate] = &[FeatureGate {
    feature: "A/B testing",
    used_by: uses_ab_testing,
}];

pub const PRO_FEATURES: &[FeatureGate] = &[
    FeatureGate {
        feature: "custom social media cards",
        used_by: uses_proxy,
    },
    FeatureGate {
        feature: "password protection",
        used_by: uses_password,
    },
    FeatureGate {
        feature: "link cloaking",
        used_by: uses_rewrite,
    },
    FeatureGate {
        feature: "link expiration",
        used_by: uses_expiration,
    },
    FeatureGate {
        feature: "iOS targeting",
        used_by: uses_ios,
    },
    FeatureGate {
        feature: "Android targeting",
        used_by: uses_android,
    },
    FeatureGate {
        feature: "geo targeting",
        used_by: uses_geo,
    },
    FeatureGate {
        feature: "search engine indexing",
        used_by: uses_indexing,
    },
];

/// First gate in `gates` the request trips, if any.
pub fn first_violation<'a>(gates: &'a [FeatureGate], request: &LinkRequest) -> Option<&'a FeatureGate> {
    gates.iter().find(|gate| (gate.used_by)(request))
}

fn business_check(request: &LinkRequest) -> Result<(), Rejection> {
    match first_violation(BUSINESS_FEATURES, request) {
        Some(gate) => Err(Rejection::new(
            ErrorCode::PlanRestriction,
            format!(
                "You can only use {} on a Business plan and above. Upgrade to Business to use this feature.",
                gate.feature
            ),
        )),
        None => Ok(()),
    }
}

fn pro_check(request: &LinkRequest) -> Result<(), Rejection> {
    match first_violation(PRO_FEATURES, request) {
        Some(gate) => Err(Rejection::new(
            ErrorCode::PlanRestriction,
            format!(
                "You can only use {} on a Pro plan and above. Upgrade to Pro to use this feature.",
                gate.feature
            ),
        )),
        None => Ok(()),
    }
}

/// Tier gating for a request. A missing workspace counts as free.
pub fn check_plan(
    workspace: Option<&WorkspaceContext>,
    request: &LinkRequest,
    key: Option<&str>,
    has_url: bool,
) -> Result<(), Rejection> {
    match plan_of(workspace) {
        PlanTier::Free => {
            if key == Some(ROOT_KEY) && has_url {
                return Err(Rejection::new(
                    ErrorCode::PlanRestriction,
                    "You can only set a redirect for a root domain link on a Pro plan and above. Upgrade to Pro to use this feature.",
                ));
            }
            business_check(request)?;
            pro_check(request)
        }
        PlanTier::Pro => business_check(request),
        PlanTier::Business | PlanTier::Enterprise => Ok(()),
    }
}

/// A/B testing needs conversion tracking, regardless of tier.
pub fn check_conversion_tracking(request: &LinkRequest) -> Result<(), Rejection> {
    if !request.track_conversion && request.test_variants.is_some() {
        return Err(Rejection::new(
            ErrorCode::InvalidConfiguration,
            "Conversion tracking must be enabled to use A/B testing.",
        ));
    }
    Ok(())
}

/// Plan policy stage.
pub(crate) fn enforce(
    workspace: Option<&WorkspaceContext>,
    draft: &Draft,
) -> Result<(), Rejection> {
    check_plan(
        workspace,
        &draft.request,
        draft.key.as_deref(),
        draft.url.is_some(),
    )?;
    check_conversion_tracking(&draft.request)
}
