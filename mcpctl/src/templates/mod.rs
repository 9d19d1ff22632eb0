//! Template registry: the read-side catalog of deployable server types.

pub mod schema;

use crate::db::models::templates::ServerTemplate;
use crate::db::storage::Storage;
use crate::errors::Result;
use crate::types::{TemplateId, UserId, abbrev_uuid};
use std::sync::Arc;
use tracing::instrument;

/// Read-only catalog over the `server_templates` table.
///
/// Visibility policy lives here: a template with an empty allow-list is
/// public; otherwise only listed users see it. Not-found is `None`, never an
/// error — the caller decides whether absence is exceptional.
pub struct TemplateRegistry<S: Storage> {
    store: Arc<S>,
}

impl<S: Storage> TemplateRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Active templates visible to `user_id`. Without a user, only public
    /// templates are returned.
    #[instrument(skip(self))]
    pub async fn list_templates(&self, user_id: Option<UserId>) -> Result<Vec<ServerTemplate>> {
        let templates = self.store.list_templates().await?;
        Ok(templates
            .into_iter()
            .filter(|t| match user_id {
                Some(user) => self.can_user_access_template(user, t),
                None => t.is_public(),
            })
            .collect())
    }

    #[instrument(skip(self), fields(template_id = %abbrev_uuid(&id)))]
    pub async fn get_template(&self, id: TemplateId) -> Result<Option<ServerTemplate>> {
        Ok(self.store.get_template(id).await?)
    }

    pub async fn get_template_by_name(&self, name: &str) -> Result<Option<ServerTemplate>> {
        Ok(self.store.get_template_by_name(name).await?)
    }

    /// Empty allow-list means public.
    pub fn can_user_access_template(&self, user_id: UserId, template: &ServerTemplate) -> bool {
        template.is_public() || template.allowed_user_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemoryStorage, template_create_request_fixture, template_fixture};
    use uuid::Uuid;

    #[tokio::test]
    async fn allow_listed_templates_are_hidden_from_other_users() {
        let store = Arc::new(MemoryStorage::new());
        let allowed_user = Uuid::new_v4();
        let other_user = Uuid::new_v4();

        store.seed_template(template_fixture("public-mcp"));
        let mut restricted = template_fixture("restricted-mcp");
        restricted.allowed_user_ids = vec![allowed_user];
        store.seed_template(restricted);

        let registry = TemplateRegistry::new(store);

        let for_allowed = registry.list_templates(Some(allowed_user)).await.unwrap();
        assert_eq!(for_allowed.len(), 2);

        let for_other = registry.list_templates(Some(other_user)).await.unwrap();
        assert_eq!(for_other.len(), 1);
        assert_eq!(for_other[0].name, "public-mcp");

        // Anonymous listing sees public templates only
        let anonymous = registry.list_templates(None).await.unwrap();
        assert_eq!(anonymous.len(), 1);
    }

    #[tokio::test]
    async fn missing_template_is_none_not_an_error() {
        let registry = TemplateRegistry::new(Arc::new(MemoryStorage::new()));
        assert!(registry.get_template(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn created_templates_are_immediately_resolvable() {
        let store = Arc::new(MemoryStorage::new());
        let created = store
            .create_template(template_create_request_fixture("emailbison-mcp"))
            .await
            .unwrap();

        let registry = TemplateRegistry::new(store);
        let by_id = registry.get_template(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "emailbison-mcp");

        let by_name = registry.get_template_by_name("emailbison-mcp").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
    }

    #[tokio::test]
    async fn inactive_templates_are_not_listed() {
        let store = Arc::new(MemoryStorage::new());
        let mut inactive = template_fixture("retired-mcp");
        inactive.active = false;
        store.seed_template(inactive);

        let registry = TemplateRegistry::new(store);
        assert!(registry.list_templates(None).await.unwrap().is_empty());
    }
}
