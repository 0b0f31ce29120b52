//! Access to the secret that stages rendered proxy configuration.

use crate::{
    core::CONTROLLER_NAME,
    k8s::{self, Api, NamespacedName, ObjectMeta, PostParams, ResourceExt, Secret},
};

/// The secret operations needed to stage configuration.
#[async_trait::async_trait]
pub trait SecretApi: Send + Sync {
    async fn get(&self, id: &NamespacedName) -> Result<Secret, k8s::Error>;

    async fn create(&self, secret: &Secret) -> Result<Secret, k8s::Error>;
}

#[async_trait::async_trait]
impl SecretApi for k8s::Client {
    async fn get(&self, id: &NamespacedName) -> Result<Secret, k8s::Error> {
        Api::<Secret>::namespaced(self.clone(), &id.namespace)
            .get(&id.name)
            .await
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, k8s::Error> {
        let ns = secret.namespace().unwrap_or_default();
        let params = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..Default::default()
        };
        Api::<Secret>::namespaced(self.clone(), &ns)
            .create(&params, secret)
            .await
    }
}

/// Fetches the config secret, creating an empty one if it does not exist.
///
/// Returns the secret and whether it was created by this call. The returned
/// secret always has a `data` map, even when nothing has been stored yet.
///
/// The read and the create are not atomic. When two callers race to create
/// the same secret, the loser's create fails with a conflict that is returned
/// as-is.
pub async fn get_or_create<A>(api: &A, id: &NamespacedName) -> Result<(Secret, bool), k8s::Error>
where
    A: SecretApi + ?Sized,
{
    match api.get(id).await {
        Ok(mut secret) => {
            secret.data.get_or_insert_with(Default::default);
            Ok((secret, false))
        }
        Err(error) if k8s::is_not_found(&error) => {
            tracing::debug!(secret = %id, "Creating config secret");
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(id.name.clone()),
                    namespace: Some(id.namespace.clone()),
                    ..Default::default()
                },
                data: Some(Default::default()),
                ..Default::default()
            };
            let mut secret = api.create(&secret).await?;
            secret.data.get_or_insert_with(Default::default);
            Ok((secret, true))
        }
        Err(error) => Err(error),
    }
}
