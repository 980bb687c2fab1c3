//! SQLite-based store implementation

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use warden_api::{Instance, Template};
use warden_util::{InstanceKey, TenantId};

use crate::{AuditEvent, MetadataPatch, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Instance resources, one row per instance
            CREATE TABLE IF NOT EXISTS instances (
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                revision INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                running INTEGER NOT NULL,
                persistent INTEGER NOT NULL,
                tenant TEXT NOT NULL,
                tenant_email TEXT NOT NULL,
                template TEXT NOT NULL,
                pretty_name TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (namespace, name)
            );

            -- Policy templates
            CREATE TABLE IF NOT EXISTS templates (
                name TEXT PRIMARY KEY,
                pretty_name TEXT NOT NULL,
                delete_after TEXT NOT NULL,
                inactivity_timeout TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_instances_template ON instances(template);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

type InstanceRow = (
    String, // namespace
    String, // name
    u64,    // revision
    String, // created_at
    bool,   // running
    bool,   // persistent
    String, // tenant
    String, // tenant_email
    String, // template
    String, // pretty_name
    String, // metadata_json
);

const INSTANCE_COLUMNS: &str = "namespace, name, revision, created_at, running, persistent, \
     tenant, tenant_email, template, pretty_name, metadata_json";

fn read_instance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InstanceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn instance_from_row(row: InstanceRow) -> StoreResult<Instance> {
    let (
        namespace,
        name,
        revision,
        created_at,
        running,
        persistent,
        tenant,
        tenant_email,
        template,
        pretty_name,
        metadata_json,
    ) = row;

    let created_at: DateTime<Utc> = created_at.parse().map_err(|_| {
        StoreError::Serialization(format!(
            "unparseable created_at for {namespace}/{name}: {created_at:?}"
        ))
    })?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)?;

    Ok(Instance {
        key: InstanceKey::new(namespace, name),
        revision,
        created_at,
        running,
        persistent,
        tenant: TenantId::new(tenant),
        tenant_email,
        template,
        pretty_name,
        metadata,
    })
}

impl SqliteStore {
    /// Read, revision-check, patch and write one instance row inside a
    /// single transaction.
    fn apply_patch(
        &self,
        key: &InstanceKey,
        expected_revision: u64,
        patch: &MetadataPatch,
        set_running: Option<bool>,
    ) -> StoreResult<Instance> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE namespace = ? AND name = ?"),
                params![key.namespace, key.name],
                read_instance_row,
            )
            .optional()?;

        let mut instance = match row {
            Some(row) => instance_from_row(row)?,
            None => return Err(StoreError::NotFound(key.to_string())),
        };

        if instance.revision != expected_revision {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: expected_revision,
                found: instance.revision,
            });
        }

        patch.apply_to(&mut instance.metadata);
        instance.revision += 1;
        if let Some(running) = set_running {
            instance.running = running;
        }

        let metadata_json = serde_json::to_string(&instance.metadata)?;
        tx.execute(
            "UPDATE instances SET revision = ?, running = ?, metadata_json = ? \
             WHERE namespace = ? AND name = ?",
            params![
                instance.revision,
                instance.running,
                metadata_json,
                key.namespace,
                key.name
            ],
        )?;

        tx.commit()?;

        debug!(instance = %key, revision = instance.revision, "Instance patched");
        Ok(instance)
    }
}

impl Store for SqliteStore {
    fn get_instance(&self, key: &InstanceKey) -> StoreResult<Option<Instance>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE namespace = ? AND name = ?"),
                params![key.namespace, key.name],
                read_instance_row,
            )
            .optional()?;

        row.map(instance_from_row).transpose()
    }

    fn list_instances(&self) -> StoreResult<Vec<Instance>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances ORDER BY namespace, name"
        ))?;

        let rows = stmt.query_map([], read_instance_row)?;

        let mut instances = Vec::new();
        for row in rows {
            instances.push(instance_from_row(row?)?);
        }
        Ok(instances)
    }

    fn create_instance(&self, instance: &Instance) -> StoreResult<Instance> {
        let conn = self.conn.lock().unwrap();
        let metadata_json = serde_json::to_string(&instance.metadata)?;

        conn.execute(
            "INSERT INTO instances (namespace, name, revision, created_at, running, persistent, \
             tenant, tenant_email, template, pretty_name, metadata_json) \
             VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                instance.key.namespace,
                instance.key.name,
                instance.created_at.to_rfc3339(),
                instance.running,
                instance.persistent,
                instance.tenant.as_str(),
                instance.tenant_email,
                instance.template,
                instance.pretty_name,
                metadata_json,
            ],
        )?;

        debug!(instance = %instance.key, "Instance created");

        let mut created = instance.clone();
        created.revision = 1;
        Ok(created)
    }

    fn patch_metadata(
        &self,
        key: &InstanceKey,
        expected_revision: u64,
        patch: &MetadataPatch,
    ) -> StoreResult<Instance> {
        self.apply_patch(key, expected_revision, patch, None)
    }

    fn stop_instance(
        &self,
        key: &InstanceKey,
        expected_revision: u64,
        patch: &MetadataPatch,
    ) -> StoreResult<Instance> {
        self.apply_patch(key, expected_revision, patch, Some(false))
    }

    fn delete_instance(&self, key: &InstanceKey) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM instances WHERE namespace = ? AND name = ?",
            params![key.namespace, key.name],
        )?;

        debug!(instance = %key, deleted = deleted > 0, "Instance deleted");
        Ok(())
    }

    fn get_template(&self, name: &str) -> StoreResult<Option<Template>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT name, pretty_name, delete_after, inactivity_timeout, metadata_json \
                 FROM templates WHERE name = ?",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((name, pretty_name, delete_after, inactivity_timeout, metadata_json)) => {
                let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)?;
                Ok(Some(Template {
                    name,
                    pretty_name,
                    delete_after,
                    inactivity_timeout,
                    metadata,
                }))
            }
        }
    }

    fn put_template(&self, template: &Template) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let metadata_json = serde_json::to_string(&template.metadata)?;

        conn.execute(
            "INSERT OR REPLACE INTO templates \
             (name, pretty_name, delete_after, inactivity_timeout, metadata_json) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                template.name,
                template.pretty_name,
                template.delete_after,
                template.inactivity_timeout,
                metadata_json,
            ],
        )?;

        Ok(())
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = timestamp_str
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| warden_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }
        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}
