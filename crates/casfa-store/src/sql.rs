//! SQLite-backed store implementations, behind the `sql-storage`
//! feature. Conditional puts/updates are expressed as single
//! parameterized `UPDATE ... WHERE` statements whose affected-row count
//! stands in for the boolean CAS result.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::auth_code_store::AuthCodeStore;
use crate::delegate_store::{ChildPage, DelegateStore, RotateTokensInput};
use crate::error::{StoreError, StoreResult};
use crate::model::{AuthCode, Cursor, Delegate, GrantedPermissions, ScopeSetNode, ROOT_SENTINEL};
use crate::scope_set_store::ScopeSetStore;

fn depots_to_csv(depots: &Option<Vec<String>>) -> Option<String> {
    depots.as_ref().map(|d| d.join(","))
}

fn depots_from_csv(csv: Option<String>) -> Option<Vec<String>> {
    csv.filter(|s| !s.is_empty())
        .map(|s| s.split(',').map(str::to_string).collect())
}

/// `sqlx::SqlitePool`-backed [`DelegateStore`].
pub struct SqliteDelegateStore {
    pool: SqlitePool,
}

impl SqliteDelegateStore {
    /// Wrap an already-connected pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run the schema migration, creating the `delegates` table and its
    /// parent-id index if they do not already exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS delegates (
                delegate_id TEXT PRIMARY KEY,
                realm TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                chain TEXT NOT NULL,
                depth INTEGER NOT NULL,
                can_upload INTEGER NOT NULL,
                can_manage_depot INTEGER NOT NULL,
                delegated_depots TEXT,
                scope_node_hash TEXT,
                scope_set_node_id TEXT,
                expires_at INTEGER,
                is_revoked INTEGER NOT NULL,
                revoked_at INTEGER,
                revoked_by TEXT,
                created_at INTEGER NOT NULL,
                current_rt_hash TEXT NOT NULL,
                current_at_hash TEXT NOT NULL,
                at_expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_delegates_parent ON delegates(parent_id, delegate_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_delegates_realm_root ON delegates(realm, parent_id) WHERE parent_id = 'ROOT';
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn row_to_delegate(row: &sqlx::sqlite::SqliteRow) -> Result<Delegate, sqlx::Error> {
        let chain_csv: String = row.try_get("chain")?;
        Ok(Delegate {
            delegate_id: row.try_get("delegate_id")?,
            realm: row.try_get("realm")?,
            parent_id: row.try_get("parent_id")?,
            chain: chain_csv.split(',').map(str::to_string).collect(),
            depth: row.try_get::<i64, _>("depth")? as u32,
            can_upload: row.try_get::<i64, _>("can_upload")? != 0,
            can_manage_depot: row.try_get::<i64, _>("can_manage_depot")? != 0,
            delegated_depots: depots_from_csv(row.try_get("delegated_depots")?),
            scope_node_hash: row.try_get("scope_node_hash")?,
            scope_set_node_id: row.try_get("scope_set_node_id")?,
            expires_at: row.try_get("expires_at")?,
            is_revoked: row.try_get::<i64, _>("is_revoked")? != 0,
            revoked_at: row.try_get("revoked_at")?,
            revoked_by: row.try_get("revoked_by")?,
            created_at: row.try_get("created_at")?,
            current_rt_hash: row.try_get("current_rt_hash")?,
            current_at_hash: row.try_get("current_at_hash")?,
            at_expires_at: row.try_get("at_expires_at")?,
        })
    }
}

#[async_trait]
impl DelegateStore for SqliteDelegateStore {
    async fn create(&self, d: &Delegate) -> StoreResult<bool> {
        let chain_csv = d.chain.join(",");
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO delegates
               (delegate_id, realm, parent_id, chain, depth, can_upload, can_manage_depot,
                delegated_depots, scope_node_hash, scope_set_node_id, expires_at, is_revoked,
                revoked_at, revoked_by, created_at, current_rt_hash, current_at_hash, at_expires_at)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(&d.delegate_id)
        .bind(&d.realm)
        .bind(&d.parent_id)
        .bind(&chain_csv)
        .bind(d.depth as i64)
        .bind(d.can_upload as i64)
        .bind(d.can_manage_depot as i64)
        .bind(depots_to_csv(&d.delegated_depots))
        .bind(&d.scope_node_hash)
        .bind(&d.scope_set_node_id)
        .bind(d.expires_at)
        .bind(d.is_revoked as i64)
        .bind(d.revoked_at)
        .bind(&d.revoked_by)
        .bind(d.created_at)
        .bind(&d.current_rt_hash)
        .bind(&d.current_at_hash)
        .bind(d.at_expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, delegate_id: &str) -> StoreResult<Option<Delegate>> {
        let row = sqlx::query("SELECT * FROM delegates WHERE delegate_id = ?")
            .bind(delegate_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        row.as_ref()
            .map(Self::row_to_delegate)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn rotate_tokens(&self, input: RotateTokensInput) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"UPDATE delegates SET current_rt_hash = ?, current_at_hash = ?, at_expires_at = ?
               WHERE delegate_id = ? AND current_rt_hash = ?"#,
        )
        .bind(&input.new_rt_hash)
        .bind(&input.new_at_hash)
        .bind(input.new_at_expires_at)
        .bind(&input.delegate_id)
        .bind(&input.expected_rt_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            warn!(delegate_id = %input.delegate_id, "rotate_tokens: CAS mismatch or missing row");
        }
        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, delegate_id: &str, by: &str, now_ms: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE delegates SET is_revoked = 1, revoked_at = ?, revoked_by = ? WHERE delegate_id = ? AND is_revoked = 0",
        )
        .bind(now_ms)
        .bind(by)
        .bind(delegate_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        if result.rows_affected() == 1 {
            debug!(delegate_id, by, "revoked delegate");
        }
        Ok(result.rows_affected() == 1)
    }

    async fn list_children(
        &self,
        parent_id: &str,
        limit: u32,
        cursor: Option<Cursor>,
    ) -> StoreResult<ChildPage> {
        let offset: i64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let rows = sqlx::query(
            "SELECT * FROM delegates WHERE parent_id = ? ORDER BY delegate_id LIMIT ? OFFSET ?",
        )
        .bind(parent_id)
        .bind(limit as i64 + 1)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let has_more = rows.len() as u32 > limit;
        let mut items: Vec<Delegate> = rows
            .iter()
            .take(limit as usize)
            .map(Self::row_to_delegate)
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        items.truncate(limit as usize);
        let next_cursor = has_more.then(|| (offset + limit as i64).to_string());
        Ok(ChildPage { items, next_cursor })
    }

    async fn get_or_create_root(
        &self,
        realm: &str,
        proposed: &Delegate,
    ) -> StoreResult<(Delegate, bool)> {
        let existing = sqlx::query("SELECT * FROM delegates WHERE realm = ? AND parent_id = ?")
            .bind(realm)
            .bind(ROOT_SENTINEL)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Some(row) = existing {
            let delegate = Self::row_to_delegate(&row).map_err(|e| StoreError::Serialization(e.to_string()))?;
            return Ok((delegate, false));
        }
        if self.create(proposed).await? {
            return Ok((proposed.clone(), true));
        }
        let row = sqlx::query("SELECT * FROM delegates WHERE realm = ? AND parent_id = ?")
            .bind(realm)
            .bind(ROOT_SENTINEL)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let delegate = Self::row_to_delegate(&row).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok((delegate, false))
    }
}

/// `sqlx::SqlitePool`-backed [`AuthCodeStore`].
pub struct SqliteAuthCodeStore {
    pool: SqlitePool,
}

impl SqliteAuthCodeStore {
    /// Wrap an already-connected pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run the schema migration for the `auth_codes` table.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                user_id TEXT NOT NULL,
                realm TEXT NOT NULL,
                scopes TEXT NOT NULL,
                code_challenge TEXT NOT NULL,
                code_challenge_method TEXT NOT NULL,
                can_upload INTEGER NOT NULL,
                can_manage_depot INTEGER NOT NULL,
                delegated_depots TEXT,
                scope_node_hash TEXT,
                expires_in INTEGER,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                used INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuthCodeStore for SqliteAuthCodeStore {
    async fn create(&self, record: &AuthCode) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO auth_codes
               (code, client_id, redirect_uri, user_id, realm, scopes, code_challenge,
                code_challenge_method, can_upload, can_manage_depot, delegated_depots,
                scope_node_hash, expires_in, created_at, expires_at, used)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,0)"#,
        )
        .bind(&record.code)
        .bind(&record.client_id)
        .bind(&record.redirect_uri)
        .bind(&record.user_id)
        .bind(&record.realm)
        .bind(record.scopes.join(","))
        .bind(&record.code_challenge)
        .bind(&record.code_challenge_method)
        .bind(record.granted_permissions.can_upload as i64)
        .bind(record.granted_permissions.can_manage_depot as i64)
        .bind(depots_to_csv(&record.granted_permissions.delegated_depots))
        .bind(&record.granted_permissions.scope_node_hash)
        .bind(record.granted_permissions.expires_in)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn consume(&self, code: &str, now_ms: i64) -> StoreResult<Option<AuthCode>> {
        let result = sqlx::query(
            "UPDATE auth_codes SET used = 1 WHERE code = ? AND used = 0 AND expires_at > ?",
        )
        .bind(code)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        if result.rows_affected() != 1 {
            return Ok(None);
        }
        let row = sqlx::query("SELECT * FROM auth_codes WHERE code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let scopes_csv: String = row.try_get("scopes").map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(AuthCode {
            code: row.try_get("code").map_err(|e| StoreError::Serialization(e.to_string()))?,
            client_id: row.try_get("client_id").map_err(|e| StoreError::Serialization(e.to_string()))?,
            redirect_uri: row.try_get("redirect_uri").map_err(|e| StoreError::Serialization(e.to_string()))?,
            user_id: row.try_get("user_id").map_err(|e| StoreError::Serialization(e.to_string()))?,
            realm: row.try_get("realm").map_err(|e| StoreError::Serialization(e.to_string()))?,
            scopes: scopes_csv.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            code_challenge: row.try_get("code_challenge").map_err(|e| StoreError::Serialization(e.to_string()))?,
            code_challenge_method: row.try_get("code_challenge_method").map_err(|e| StoreError::Serialization(e.to_string()))?,
            granted_permissions: GrantedPermissions {
                can_upload: row.try_get::<i64, _>("can_upload").map_err(|e| StoreError::Serialization(e.to_string()))? != 0,
                can_manage_depot: row.try_get::<i64, _>("can_manage_depot").map_err(|e| StoreError::Serialization(e.to_string()))? != 0,
                delegated_depots: depots_from_csv(row.try_get("delegated_depots").map_err(|e| StoreError::Serialization(e.to_string()))?),
                scope_node_hash: row.try_get("scope_node_hash").map_err(|e| StoreError::Serialization(e.to_string()))?,
                expires_in: row.try_get("expires_in").map_err(|e| StoreError::Serialization(e.to_string()))?,
            },
            created_at: row.try_get("created_at").map_err(|e| StoreError::Serialization(e.to_string()))?,
            expires_at: row.try_get("expires_at").map_err(|e| StoreError::Serialization(e.to_string()))?,
            used: true,
        }))
    }
}

/// `sqlx::SqlitePool`-backed [`ScopeSetStore`].
pub struct SqliteScopeSetStore {
    pool: SqlitePool,
}

impl SqliteScopeSetStore {
    /// Wrap an already-connected pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run the schema migration for the `scope_sets` table.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS scope_sets (
                id TEXT PRIMARY KEY,
                children TEXT NOT NULL,
                ref_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ScopeSetStore for SqliteScopeSetStore {
    async fn create_or_increment(&self, id: &str, children: &[String], now_ms: i64) -> StoreResult<ScopeSetNode> {
        sqlx::query(
            r#"INSERT INTO scope_sets (id, children, ref_count, created_at) VALUES (?, ?, 1, ?)
               ON CONFLICT(id) DO UPDATE SET ref_count = ref_count + 1"#,
        )
        .bind(id)
        .bind(children.join(","))
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        self.get(id)
            .await?
            .ok_or_else(|| StoreError::Backend("scope set vanished after upsert".to_string()))
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ScopeSetNode>> {
        let row = sqlx::query("SELECT * FROM scope_sets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let Some(row) = row else { return Ok(None) };
        let children_csv: String = row.try_get("children").map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(ScopeSetNode {
            id: row.try_get("id").map_err(|e| StoreError::Serialization(e.to_string()))?,
            children: children_csv.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            ref_count: row.try_get::<i64, _>("ref_count").map_err(|e| StoreError::Serialization(e.to_string()))? as u64,
            created_at: row.try_get("created_at").map_err(|e| StoreError::Serialization(e.to_string()))?,
        }))
    }
}
