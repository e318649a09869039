use deadpool_postgres::Pool;

mod migrations;
mod pool;

pub mod error;
pub mod repo;

use error::DbError;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Clone)]
pub struct Db {
    pub(crate) pool: Pool,
}

impl Db {
    pub async fn get_client(&self) -> DbResult<deadpool_postgres::Client> {
        Ok(self.pool.get().await?)
    }
}
