//! Request and output shapes of the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One arm of an A/B test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestVariant {
    pub url: String,
    pub percentage: f64,
}

/// UTM fields accepted on the request. They are merged into the destination
/// URL and never persisted as separate fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

impl UtmTags {
    /// Non-empty tags in canonical order.
    pub fn present(&self) -> Vec<(&'static str, &str)> {
        [
            ("utm_source", &self.utm_source),
            ("utm_medium", &self.utm_medium),
            ("utm_campaign", &self.utm_campaign),
            ("utm_term", &self.utm_term),
            ("utm_content", &self.utm_content),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        })
        .collect()
    }
}

/// Untrusted link create/update payload.
///
/// Unknown fields are kept in `extra` and passed through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub key_length: Option<usize>,
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Legacy single-tag field.
    #[serde(default)]
    pub tag_id: Option<String>,
    #[serde(default)]
    pub tag_ids: Option<Vec<String>>,
    #[serde(default)]
    pub tag_names: Option<Vec<String>>,
    #[serde(default)]
    pub webhook_ids: Option<Vec<String>>,
    /// Creator of an existing link (edit flows).
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,

    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub rewrite: bool,
    #[serde(default)]
    pub do_index: bool,
    #[serde(default)]
    pub ios: Option<String>,
    #[serde(default)]
    pub android: Option<String>,
    #[serde(default)]
    pub geo: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub expired_url: Option<String>,
    #[serde(default)]
    pub track_conversion: bool,
    #[serde(default)]
    pub test_variants: Option<Vec<TestVariant>>,
    #[serde(default)]
    pub test_completed_at: Option<String>,

    /// Presentation-only fields echoed back by clients.
    #[serde(default)]
    pub short_link: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,

    #[serde(flatten)]
    pub utm: UtmTags,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl LinkRequest {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// `tagIds` wins when present, otherwise the legacy `tagId`.
    pub fn combined_tag_ids(&self) -> Option<Vec<String>> {
        if let Some(ids) = &self.tag_ids {
            return Some(ids.clone());
        }
        self.tag_id.as_ref().map(|id| vec![id.clone()])
    }
}

/// Fully validated link record. Nothing downstream needs to re-check it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedLink {
    pub domain: String,
    pub key: String,
    /// Absent only for root links without a redirect.
    pub url: Option<String>,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub partner_id: Option<String>,
    pub program_id: Option<String>,
    pub tenant_id: Option<String>,
    pub external_id: Option<String>,
    pub folder_id: Option<String>,
    pub tag_ids: Option<Vec<String>>,
    pub tag_names: Option<Vec<String>>,
    pub webhook_ids: Option<Vec<String>>,

    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub comments: Option<String>,

    pub proxy: bool,
    pub password: Option<String>,
    pub rewrite: bool,
    pub do_index: bool,
    pub ios: Option<String>,
    pub android: Option<String>,
    pub geo: Option<BTreeMap<String, String>>,

    pub expires_at: Option<DateTime<Utc>>,
    pub expired_url: Option<String>,
    pub track_conversion: bool,
    pub test_variants: Option<Vec<TestVariant>>,
    pub test_completed_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NormalizedLink {
    /// Convert back into a request, e.g. to re-validate an edited link.
    pub fn to_request(&self) -> LinkRequest {
        let stamp = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
        LinkRequest {
            url: self.url.clone(),
            domain: Some(self.domain.clone()),
            key: Some(self.key.clone()),
            external_id: self.external_id.clone(),
            tenant_id: self.tenant_id.clone(),
            partner_id: self.partner_id.clone(),
            program_id: self.program_id.clone(),
            folder_id: self.folder_id.clone(),
            tag_ids: self.tag_ids.clone(),
            tag_names: self.tag_names.clone(),
            webhook_ids: self.webhook_ids.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            image: self.image.clone(),
            comments: self.comments.clone(),
            proxy: self.proxy,
            password: self.password.clone(),
            rewrite: self.rewrite,
            do_index: self.do_index,
            ios: self.ios.clone(),
            android: self.android.clone(),
            geo: self.geo.clone(),
            expires_at: self.expires_at.as_ref().map(stamp),
            expired_url: self.expired_url.clone(),
            track_conversion: self.track_conversion,
            test_variants: self.test_variants.clone(),
            test_completed_at: self.test_completed_at.as_ref().map(stamp),
            extra: self.extra.clone(),
            ..LinkRequest::default()
        }
    }
}
