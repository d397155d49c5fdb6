//! External-id uniqueness and reference checks (tags, folder, program,
//! webhooks), plus the preview-image capability checks.

use crate::pipeline::{Draft, StageContext};
use crate::{ErrorCode, PlanTier, ProcessError, Rejection, TagLookup, Verdict, WorkspaceContext};

/// Permission a user needs on a folder to put links in it.
pub const FOLDER_WRITE_PERMISSION: &str = "folders.links.write";

/// Requested identifiers that the store did not return, in request order.
pub fn missing<'a>(requested: &'a [String], found: &[String]) -> Vec<&'a str> {
    requested
        .iter()
        .filter(|id| !found.contains(id))
        .map(String::as_str)
        .collect()
}

/// Drop repeated ids, keeping first occurrences.
pub fn dedupe(ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }
    out
}

fn workspace_required(what: &str) -> Rejection {
    Rejection::new(
        ErrorCode::NotFound,
        format!("Workspace not found. You can't add {} to a link without a workspace.", what),
    )
}

/// References stage.
pub(crate) async fn check(cx: &StageContext<'_>, draft: &mut Draft) -> Result<(), ProcessError> {
    let workspace = cx.workspace();

    if let (Some(external_id), Some(ws)) = (draft.request.external_id.as_deref(), workspace) {
        if !external_id.is_empty()
            && !cx.opts.skip_external_id_checks
            && cx.deps.store.external_id_exists(&ws.id, external_id).await?
        {
            return Err(Rejection::new(
                ErrorCode::Conflict,
                "A link with this externalId already exists in this workspace.",
            )
            .into());
        }
    }

    if cx.opts.bulk {
        let image = draft.request.image.as_deref();
        if draft.request.proxy && image.is_some_and(|img| cx.config.is_not_hosted_image(img)) {
            return Err(Rejection::new(
                ErrorCode::Unsupported,
                "You cannot upload custom link preview images with bulk link creation.",
            )
            .into());
        }
    } else {
        check_tags(cx, draft).await?;
        check_folder(cx, draft).await?;
        check_program(cx, draft).await?;
        check_webhooks(cx, draft).await?;
    }

    if draft.request.proxy && !cx.config.storage_enabled {
        return Err(Rejection::new(
            ErrorCode::InvalidConfiguration,
            "Missing storage access key.",
        )
        .into());
    }

    Ok(())
}

fn tag_lookup(draft: &Draft) -> Option<TagLookup> {
    match (&draft.tag_ids, &draft.request.tag_names) {
        (Some(ids), _) if !ids.is_empty() => Some(TagLookup::Ids(ids.clone())),
        (_, Some(names)) if !names.is_empty() => Some(TagLookup::Names(names.clone())),
        _ => None,
    }
}

async fn check_tags(cx: &StageContext<'_>, draft: &Draft) -> Result<(), ProcessError> {
    let Some(lookup) = tag_lookup(draft) else {
        return Ok(());
    };
    let ws = cx.workspace().ok_or_else(|| workspace_required("tags"))?;

    let found = cx.deps.store.find_tags(&ws.id, &lookup).await?;
    let absent = missing(lookup.identifiers(), &found);
    if !absent.is_empty() {
        return Err(Rejection::new(
            ErrorCode::InvalidReference,
            format!("Invalid {} detected: {}", lookup.field(), absent.join(", ")),
        )
        .into());
    }
    Ok(())
}

async fn check_folder(cx: &StageContext<'_>, draft: &Draft) -> Result<(), ProcessError> {
    let Some(folder_id) = draft.request.folder_id.as_deref().filter(|f| !f.is_empty()) else {
        return Ok(());
    };
    if cx.opts.skip_folder_checks {
        return Ok(());
    }

    let (Some(ws), Some(user_id)) = (cx.workspace(), cx.opts.user_id.as_deref()) else {
        return Err(Rejection::new(
            ErrorCode::NotFound,
            "Workspace or user ID not found. You can't add a folder to a link without a workspace or user ID.",
        )
        .into());
    };

    if ws.plan == PlanTier::Free {
        return Err(Rejection::new(
            ErrorCode::PlanRestriction,
            "You can't add a folder to a link on a free plan.",
        )
        .into());
    }

    match cx
        .deps
        .folders
        .verify(ws, user_id, folder_id, FOLDER_WRITE_PERMISSION)
        .await?
    {
        Verdict::Allow => Ok(()),
        Verdict::Deny(rejection) => Err(rejection.into()),
    }
}

async fn check_program(cx: &StageContext<'_>, draft: &mut Draft) -> Result<(), ProcessError> {
    let Some(program_id) = draft.request.program_id.clone().filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    if cx.opts.skip_program_checks {
        return Ok(());
    }

    // Only resolve a partner through the tenant when none was given.
    let tenant = match (&draft.partner_id, draft.request.tenant_id.as_deref()) {
        (None, Some(t)) if !t.is_empty() => Some(t),
        _ => None,
    };

    let program = cx.deps.store.find_program(&program_id, tenant).await?;
    let owned = |ws: Option<&WorkspaceContext>, owner: &str| ws.is_some_and(|w| w.id == owner);
    let Some(program) = program.filter(|p| owned(cx.workspace(), &p.workspace_id)) else {
        return Err(Rejection::new(ErrorCode::NotFound, "Program not found.").into());
    };

    if draft.partner_id.is_none() {
        draft.partner_id = program.enrolled_partner_ids.into_iter().next();
    }
    draft.program_folder_id = program.default_folder_id;
    Ok(())
}

async fn check_webhooks(cx: &StageContext<'_>, draft: &mut Draft) -> Result<(), ProcessError> {
    let Some(requested) = draft.webhook_ids.as_ref().filter(|ids| !ids.is_empty()) else {
        return Ok(());
    };

    let ws = match cx.workspace() {
        Some(ws) if ws.plan.is_business_plus() => ws,
        _ => {
            return Err(Rejection::new(
                ErrorCode::PlanRestriction,
                "You can only use webhooks on a Business plan and above. Upgrade to Business to use this feature.",
            )
            .into())
        }
    };

    let ids = dedupe(requested);
    let found = cx.deps.store.find_webhooks(&ws.id, &ids).await?;
    let absent = missing(&ids, &found);
    if !absent.is_empty() {
        return Err(Rejection::new(
            ErrorCode::InvalidReference,
            format!("Invalid webhookIds detected: {}", absent.join(", ")),
        )
        .into());
    }

    draft.webhook_ids = Some(ids);
    Ok(())
}
