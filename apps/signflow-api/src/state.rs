//! Application state for the SignFlow API

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::notifier::{LogNotifier, Notifier};
use crate::storage::{FileStore, LocalFileStore};

pub struct AppState {
    pub db: SqlitePool,
    pub notifier: Arc<dyn Notifier>,
    pub files: Arc<dyn FileStore>,
    /// Base URL embedded in signing/public-form links.
    pub base_url: String,
    /// When set, a failed file delete fails the document delete instead
    /// of being logged and swallowed.
    pub strict_file_delete: bool,
    // saveLayout is a destructive replace; interleaved saves on one
    // document must not race. One async mutex per document id.
    layout_locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    /// Environment-driven construction for the server binary.
    pub async fn new() -> Result<Self> {
        let db_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            std::fs::create_dir_all("data").ok();
            "sqlite:data/signflow.db?mode=rwc".to_string()
        });

        tracing::info!("Connecting to database: {}", db_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let files_root = std::env::var("FILES_DIR").unwrap_or_else(|_| "data/files".to_string());
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3002".to_string());
        let strict_file_delete = std::env::var("STRICT_FILE_DELETE")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);

        let files = Arc::new(LocalFileStore::new(
            files_root,
            format!("{}/files", base_url.trim_end_matches('/')),
        ));

        let state = Self::with_parts(pool, Arc::new(LogNotifier), files, base_url);
        state.strict(strict_file_delete).migrate().await
    }

    /// Assemble state from explicit collaborators. Tests use this with
    /// an in-memory pool, a memory file store, and a scripted notifier.
    pub fn with_parts(
        db: SqlitePool,
        notifier: Arc<dyn Notifier>,
        files: Arc<dyn FileStore>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            notifier,
            files,
            base_url: base_url.into(),
            strict_file_delete: false,
            layout_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn strict(mut self, strict_file_delete: bool) -> Self {
        self.strict_file_delete = strict_file_delete;
        self
    }

    pub async fn migrate(self) -> Result<Self> {
        Self::run_migrations(&self.db).await?;
        Ok(self)
    }

    /// The advisory lock serializing layout replacement for one document.
    pub fn layout_lock(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.layout_locks.lock().expect("layout lock registry poisoned");
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drops the lock entry for a document that no longer exists, so the
    /// registry does not grow for the lifetime of the process.
    pub fn forget_layout_lock(&self, document_id: &str) {
        let mut locks = self.layout_locks.lock().expect("layout lock registry poisoned");
        locks.remove(document_id);
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT,
                company TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(owner_id, email)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS widgets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                widget_type TEXT NOT NULL,
                label TEXT NOT NULL DEFAULT '',
                placeholder TEXT,
                required INTEGER NOT NULL DEFAULT 0,
                options_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                note TEXT,
                scenario TEXT NOT NULL DEFAULT 'self',
                status TEXT NOT NULL DEFAULT 'pending',
                file_path TEXT NOT NULL,
                file_url TEXT NOT NULL,
                send_in_order INTEGER NOT NULL DEFAULT 0,
                automatic_reminders INTEGER NOT NULL DEFAULT 0,
                reminder_interval_days INTEGER,
                completion_deadline_days INTEGER,
                allow_field_changes INTEGER NOT NULL DEFAULT 0,
                require_otp INTEGER NOT NULL DEFAULT 0,
                notify_on_signature INTEGER NOT NULL DEFAULT 0,
                is_public INTEGER NOT NULL DEFAULT 0,
                public_token TEXT UNIQUE,
                public_form_config_json TEXT,
                public_enabled_at TEXT,
                folder_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_signers (
                document_id TEXT NOT NULL,
                contact_id TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'signer',
                PRIMARY KEY (document_id, contact_id, role)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_fields (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                widget_id TEXT,
                field_type TEXT NOT NULL,
                label TEXT NOT NULL DEFAULT '',
                page INTEGER NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                width REAL NOT NULL,
                height REAL NOT NULL,
                scale REAL NOT NULL DEFAULT 1.0,
                is_stamp INTEGER NOT NULL DEFAULT 0,
                signature_type TEXT,
                required INTEGER NOT NULL DEFAULT 0,
                recipient_id TEXT,
                value TEXT,
                signature_data TEXT,
                completion_forced INTEGER NOT NULL DEFAULT 0,
                is_completed INTEGER NOT NULL DEFAULT 0,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fields_document ON document_fields(document_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signing_sessions (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                contact_id TEXT NOT NULL,
                session_token TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'pending',
                signed_at TEXT,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_document ON signing_sessions(document_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS public_form_submissions (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                submitter_name TEXT NOT NULL,
                submitter_email TEXT,
                submitter_phone TEXT,
                field_data_json TEXT NOT NULL DEFAULT '{}',
                submitted_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saved_signatures (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                signature_type TEXT NOT NULL DEFAULT 'drawn',
                image_path TEXT NOT NULL,
                image_url TEXT NOT NULL,
                font TEXT,
                color TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        tracing::info!("Migrations complete");
        Ok(())
    }
}
