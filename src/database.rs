use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use std::sync::{Mutex, MutexGuard};
use tokio::task;

pub struct Database {
    connection: Mutex<Connection>,
    path: String,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url).to_string();

        // Ensure the data directory exists
        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let open_path = db_path.clone();
        let connection = task::spawn_blocking(move || -> Result<Connection, Box<dyn std::error::Error + Send + Sync>> {
            let conn = Connection::open(&open_path)?;
            // Memberships and throttles are removed together with their user
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(conn)
        }).await??;

        Ok(Database {
            connection: Mutex::new(connection),
            path: db_path,
        })
    }

    pub async fn migrate(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let migrations = Migrations::new(vec![
            M::up(include_str!("../migrations/001_initial_schema.sql")),
        ]);

        let mut conn = self.lock()?;
        migrations.to_latest(&mut conn)?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let conn = self.lock()?;
        let _result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(())
    }

    pub fn get_connection(&self) -> &Mutex<Connection> {
        &self.connection
    }

    /// Filesystem path of the database, shared with the session store.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Box<dyn std::error::Error + Send + Sync>> {
        self.connection
            .lock()
            .map_err(|_| "database connection lock poisoned".into())
    }
}
