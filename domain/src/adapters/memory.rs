use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::keys::{standard_key_checks, RandomKeyGenerator};
use crate::{
    Blocklist, Clock, Collaborators, DomainRecord, ErrorCode, FolderAccess, IdentityService,
    LinkRef, LinkStore, NormalizedLink, PipelineConfig, ProgramRecord, RegisteredDomain,
    Rejection, StoreError, TagLookup, Verdict, WorkspaceContext,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub id: String,
    pub name: String,
    pub workspace_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRecord {
    pub id: String,
    pub workspace_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub partner_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSeed {
    pub id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub default_folder_id: Option<String>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: String,
    pub workspace_id: String,
    /// Users allowed to write links into the folder.
    #[serde(default)]
    pub writers: Vec<String>,
}

/// Seed data for [`InMemoryStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixtures {
    pub domains: Vec<DomainRecord>,
    pub registered_domains: Vec<RegisteredDomain>,
    pub links: Vec<LinkRef>,
    pub tags: Vec<TagRecord>,
    pub webhooks: Vec<WebhookRecord>,
    pub programs: Vec<ProgramSeed>,
    pub folders: Vec<FolderRecord>,
    pub users: Vec<String>,
    pub blacklisted_domains: Vec<String>,
}

/// Simple in-memory store for tests. Every port call takes the one mutex.
pub struct InMemoryStore {
    config: PipelineConfig,
    state: Mutex<Fixtures>,
}

impl InMemoryStore {
    pub fn new(config: PipelineConfig, fixtures: Fixtures) -> Self {
        Self {
            config,
            state: Mutex::new(fixtures),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Fixtures>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".into()))
    }

    /// Stored links, in insertion order.
    pub fn links(&self) -> Result<Vec<LinkRef>, StoreError> {
        Ok(self.lock()?.links.clone())
    }

    fn link_ref(link: &NormalizedLink) -> LinkRef {
        LinkRef {
            domain: link.domain.clone(),
            key: link.key.clone(),
            workspace_id: link.project_id.clone(),
            external_id: link.external_id.clone(),
        }
    }

    /// Unique constraints on (domain, key) and (workspace, external id),
    /// ignoring the row at `skip`.
    fn check_unique(
        links: &[LinkRef],
        candidate: &LinkRef,
        skip: Option<usize>,
    ) -> Result<(), StoreError> {
        for (idx, existing) in links.iter().enumerate() {
            if Some(idx) == skip {
                continue;
            }
            if existing.domain == candidate.domain && existing.key == candidate.key {
                return Err(StoreError::UniqueViolation {
                    field: "key".into(),
                });
            }
            if candidate.external_id.is_some()
                && candidate.workspace_id.is_some()
                && existing.external_id == candidate.external_id
                && existing.workspace_id == candidate.workspace_id
            {
                return Err(StoreError::UniqueViolation {
                    field: "external_id".into(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LinkStore for InMemoryStore {
    async fn workspace_domains(&self, workspace_id: &str) -> Result<Vec<DomainRecord>, StoreError> {
        Ok(self
            .lock()?
            .domains
            .iter()
            .filter(|d| d.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn find_link(&self, domain: &str, key: &str) -> Result<Option<LinkRef>, StoreError> {
        Ok(self
            .lock()?
            .links
            .iter()
            .find(|l| l.domain.eq_ignore_ascii_case(domain) && l.key == key)
            .cloned())
    }

    async fn external_id_exists(
        &self,
        workspace_id: &str,
        external_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.lock()?.links.iter().any(|l| {
            l.workspace_id.as_deref() == Some(workspace_id)
                && l.external_id.as_deref() == Some(external_id)
        }))
    }

    async fn find_tags(
        &self,
        workspace_id: &str,
        lookup: &TagLookup,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        let in_workspace = state.tags.iter().filter(|t| t.workspace_id == workspace_id);
        Ok(match lookup {
            TagLookup::Ids(ids) => in_workspace
                .filter(|t| ids.contains(&t.id))
                .map(|t| t.id.clone())
                .collect(),
            TagLookup::Names(names) => in_workspace
                .filter(|t| names.contains(&t.name))
                .map(|t| t.name.clone())
                .collect(),
        })
    }

    async fn find_webhooks(
        &self,
        workspace_id: &str,
        ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()?
            .webhooks
            .iter()
            .filter(|w| w.workspace_id == workspace_id && ids.contains(&w.id))
            .map(|w| w.id.clone())
            .collect())
    }

    async fn find_program(
        &self,
        program_id: &str,
        tenant_id: Option<&str>,
    ) -> Result<Option<ProgramRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state.programs.iter().find(|p| p.id == program_id).map(|p| {
            let enrolled_partner_ids = match tenant_id {
                Some(tenant) => p
                    .enrollments
                    .iter()
                    .filter(|e| e.tenant_id.as_deref() == Some(tenant))
                    .map(|e| e.partner_id.clone())
                    .collect(),
                None => Vec::new(),
            };
            ProgramRecord {
                id: p.id.clone(),
                workspace_id: p.workspace_id.clone(),
                default_folder_id: p.default_folder_id.clone(),
                enrolled_partner_ids,
            }
        }))
    }

    async fn registered_domain(
        &self,
        domain_id: &str,
    ) -> Result<Option<RegisteredDomain>, StoreError> {
        Ok(self
            .lock()?
            .registered_domains
            .iter()
            .find(|r| r.domain_id == domain_id)
            .cloned())
    }

    async fn check_key(
        &self,
        domain: &str,
        key: &str,
        workspace: Option<&WorkspaceContext>,
    ) -> Result<Verdict, StoreError> {
        let exists = self.find_link(domain, key).await?.is_some();
        Ok(standard_key_checks(&self.config, domain, key, workspace, exists))
    }

    async fn insert_link(&self, link: &NormalizedLink) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let row = Self::link_ref(link);
        Self::check_unique(&state.links, &row, None)?;
        state.links.push(row);
        Ok(())
    }

    async fn replace_link(
        &self,
        domain: &str,
        key: &str,
        link: &NormalizedLink,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let idx = state
            .links
            .iter()
            .position(|l| l.domain == domain && l.key == key)
            .ok_or_else(|| StoreError::NotFound(format!("link {}/{}", domain, key)))?;
        let row = Self::link_ref(link);
        Self::check_unique(&state.links, &row, Some(idx))?;
        state.links[idx] = row;
        Ok(())
    }
}

#[async_trait]
impl IdentityService for InMemoryStore {
    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.users.iter().any(|u| u == user_id))
    }
}

#[async_trait]
impl Blocklist for InMemoryStore {
    async fn is_blacklisted(&self, domain: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .blacklisted_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain)))
    }
}

#[async_trait]
impl FolderAccess for InMemoryStore {
    async fn verify(
        &self,
        workspace: &WorkspaceContext,
        user_id: &str,
        folder_id: &str,
        _permission: &str,
    ) -> Result<Verdict, StoreError> {
        let state = self.lock()?;
        let folder = state
            .folders
            .iter()
            .find(|f| f.id == folder_id && f.workspace_id == workspace.id);
        Ok(match folder {
            None => Verdict::Deny(Rejection::new(ErrorCode::NotFound, "Folder not found.")),
            Some(f) if f.writers.iter().any(|w| w == user_id) => Verdict::Allow,
            Some(_) => Verdict::Deny(Rejection::new(
                ErrorCode::Forbidden,
                "You are not allowed to perform this action on this folder.",
            )),
        })
    }
}

/// Wire every port to one in-memory store.
pub fn collaborators(store: Arc<InMemoryStore>, clock: Arc<dyn Clock>) -> Collaborators {
    let key_length = store.config.default_key_length;
    Collaborators {
        keys: Arc::new(RandomKeyGenerator::new(store.clone(), key_length)),
        identity: store.clone(),
        blocklist: store.clone(),
        folders: store.clone(),
        store,
        clock,
    }
}
