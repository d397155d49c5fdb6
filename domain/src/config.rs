//! Pipeline configuration: platform-owned domains and capability flags.

use serde::{Deserialize, Serialize};

/// How a platform-owned domain is treated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlatformDomainKind {
    /// General-purpose short domain; destinations are screened against the
    /// blocklist.
    Flagship {
        #[serde(default, rename = "requiresPro")]
        requires_pro: bool,
    },
    /// Brand domain that may only redirect to a fixed set of hostnames.
    Restricted {
        #[serde(default, rename = "allowedHostnames")]
        allowed_hostnames: Option<Vec<String>>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDomain {
    pub slug: String,
    #[serde(flatten)]
    pub kind: PlatformDomainKind,
}

impl PlatformDomain {
    pub fn flagship<S: Into<String>>(slug: S, requires_pro: bool) -> Self {
        Self {
            slug: slug.into(),
            kind: PlatformDomainKind::Flagship { requires_pro },
        }
    }

    pub fn restricted<S: Into<String>>(slug: S, allowed_hostnames: &[&str]) -> Self {
        Self {
            slug: slug.into(),
            kind: PlatformDomainKind::Restricted {
                allowed_hostnames: Some(allowed_hostnames.iter().map(|h| h.to_string()).collect()),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Used when the request names no domain and the workspace has no primary one.
    pub default_domain: String,
    pub platform_domains: Vec<PlatformDomain>,
    /// Domains whose keys are matched case-insensitively (stored lower-cased).
    pub case_insensitive_domains: Vec<String>,
    /// Keys that can never be claimed on flagship domains.
    pub reserved_keys: Vec<String>,
    /// Keys up to this many characters on flagship domains need Pro.
    pub premium_key_max_length: usize,
    /// Length of generated keys when the request does not ask for one.
    pub default_key_length: usize,
    /// Longest `keyLength` a request may ask for.
    pub max_key_length: usize,
    /// Whether custom preview images can be stored.
    pub storage_enabled: bool,
    /// Images under this prefix are already hosted by the platform.
    pub storage_base_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_domain: "dub.sh".into(),
            platform_domains: vec![
                PlatformDomain::flagship("dub.sh", false),
                PlatformDomain::flagship("dub.link", true),
                PlatformDomain::restricted("chatg.pt", &["chatgpt.com", "openai.com"]),
                PlatformDomain::restricted("spti.fi", &["spotify.com"]),
                PlatformDomain::restricted("git.new", &["github.com", "gitlab.com"]),
                PlatformDomain::restricted("cal.link", &["cal.com"]),
                PlatformDomain::restricted("fig.page", &["figma.com"]),
                PlatformDomain::restricted("ggl.link", &["google.com", "youtube.com"]),
                PlatformDomain {
                    slug: "loooooooong.com".into(),
                    kind: PlatformDomainKind::Restricted {
                        allowed_hostnames: None,
                    },
                },
            ],
            case_insensitive_domains: Vec::new(),
            reserved_keys: [
                "admin", "api", "app", "dashboard", "help", "home", "links", "login", "pricing",
                "register", "settings", "signin", "signup", "welcome",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            premium_key_max_length: 3,
            default_key_length: 7,
            max_key_length: 190,
            storage_enabled: false,
            storage_base_url: None,
        }
    }
}

impl PipelineConfig {
    pub fn platform_domain(&self, slug: &str) -> Option<&PlatformDomain> {
        self.platform_domains
            .iter()
            .find(|d| d.slug.eq_ignore_ascii_case(slug))
    }

    pub fn is_flagship(&self, slug: &str) -> bool {
        matches!(
            self.platform_domain(slug).map(|d| &d.kind),
            Some(PlatformDomainKind::Flagship { .. })
        )
    }

    pub fn is_case_insensitive(&self, slug: &str) -> bool {
        self.case_insensitive_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(slug))
    }

    /// True when `image` would have to be uploaded by us.
    pub fn is_not_hosted_image(&self, image: &str) -> bool {
        match &self.storage_base_url {
            Some(base) => !image.starts_with(base.as_str()),
            None => true,
        }
    }
}
