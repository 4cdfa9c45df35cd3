use crate::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::db::init_pool;
use crate::service::session::SessionService;

#[derive(Debug, Clone, Copy)]
pub struct CleanSessionsResult {
    pub sessions_deleted: u64,
}

pub async fn clean_expired_sessions(config: &Config) -> Result<CleanSessionsResult, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let repo = PostgresRepository { pool: pool.clone() };
    let result = SessionService::new(&repo)
        .clean_expired_sessions()
        .await
        .map_err(|err| format!("Failed to clean expired sessions: {err:?}"));

    pool.close().await;

    Ok(CleanSessionsResult {
        sessions_deleted: result?,
    })
}
