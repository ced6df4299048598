use rocket_db_pools::sqlx::{self, PgPool, migrate::Migrator};
use rocket_db_pools::Database;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Pool backing [`PgMemberStore`](crate::store::PgMemberStore) when
/// `INGEST_STORE=postgres`.
#[derive(Database)]
#[database("members_db")]
pub struct MembersDb(sqlx::PgPool);

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}
