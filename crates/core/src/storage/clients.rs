use anyhow::Context;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientRow {
    pub id: Uuid,
    pub name: String,
}

pub async fn list_active_clients(pool: &sqlx::PgPool) -> anyhow::Result<Vec<ClientRow>> {
    sqlx::query_as::<_, ClientRow>(
        "SELECT id, name FROM clients WHERE active = TRUE ORDER BY created_at, id",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    .context("select active clients failed")
}

/// Active clients only. Deactivated tenants look the same as unknown ones.
pub async fn client_exists(pool: &sqlx::PgPool, client_id: Uuid) -> anyhow::Result<bool> {
    let found: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM clients WHERE id = $1 AND active = TRUE)",
    )
    .persistent(false)
    .bind(client_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("client lookup failed (client_id={client_id})"))?;
    Ok(found)
}
