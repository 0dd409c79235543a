use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use desk_core::redis::get_connection;
use desk_core::schema::notifications;
use desk_core::types::{Notification, Scope};
use desk_core::DeskContext;
use serde::Deserialize;
use uuid::Uuid;

/// Ingestion payload supplied by external producers. Title and body fall
/// back to kind-specific defaults when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNotification {
    pub user_id: Uuid,
    #[serde(default)]
    pub store_id: Option<Uuid>,
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

pub struct NotificationService {
    ctx: DeskContext,
}

impl NotificationService {
    pub fn new(ctx: DeskContext) -> Self {
        Self { ctx }
    }

    /// Number of unread notifications in scope. The Redis counter is the
    /// fast path; a miss falls through to a Postgres COUNT and backfills
    /// the key. Cached values are clamped so a drifted counter can never
    /// surface as negative.
    pub async fn unread_count(&self, scope: Scope) -> Result<i64> {
        if let Some(cached) = self.read_cached_count(&scope).await {
            return Ok(clamp_count(cached));
        }

        let count = self.count_unread_in_db(&scope).await?;
        self.backfill_cached_count(&scope, count).await;
        Ok(count)
    }

    /// Transition every currently-unread notification in scope to read,
    /// returning the number of rows changed. A second call with nothing
    /// unread returns 0. Notifications created concurrently with the
    /// UPDATE are not part of its snapshot and stay unread.
    pub async fn mark_all_read(&self, scope: Scope) -> Result<usize> {
        let mut conn = self.ctx.db_pool.get().await?;
        let now = Utc::now();

        // Update statements cannot be boxed, so the optional store filter
        // is a branch.
        let changed = match scope.store_id {
            Some(store_id) => {
                diesel::update(notifications::table)
                    .filter(notifications::user_id.eq(scope.user_id))
                    .filter(notifications::store_id.eq(store_id))
                    .filter(notifications::read_at.is_null())
                    .set(notifications::read_at.eq(Some(now)))
                    .execute(&mut conn)
                    .await?
            }
            None => {
                diesel::update(notifications::table)
                    .filter(notifications::user_id.eq(scope.user_id))
                    .filter(notifications::read_at.is_null())
                    .set(notifications::read_at.eq(Some(now)))
                    .execute(&mut conn)
                    .await?
            }
        };

        // Drop the scope's counters; the next read repopulates them from
        // the database.
        self.invalidate_cached_counts(&scope).await;

        tracing::debug!(
            "Marked {} notifications read for user {} (store: {:?})",
            changed,
            scope.user_id,
            scope.store_id
        );

        Ok(changed)
    }

    /// Store a notification and bump the unread counters. Counter failures
    /// are logged, not propagated: the row is the source of truth and the
    /// counters self-heal on the next read-through.
    pub async fn create(&self, req: CreateNotification) -> Result<Notification> {
        let (title, body) = resolve_content(&req);
        let created_at = Utc::now();

        let mut conn = self.ctx.db_pool.get().await?;
        let id: i64 = diesel::insert_into(notifications::table)
            .values((
                notifications::user_id.eq(req.user_id),
                notifications::store_id.eq(req.store_id),
                notifications::kind.eq(&req.kind),
                notifications::title.eq(&title),
                notifications::body.eq(&body),
                notifications::data.eq(req.data.as_ref()),
                notifications::created_at.eq(created_at),
            ))
            .returning(notifications::id)
            .get_result(&mut conn)
            .await?;

        let scope = Scope::new(req.user_id, req.store_id);
        if let Err(e) = self.increment_cached_counts(&scope).await {
            tracing::warn!("Failed to bump unread counters for {}: {}", req.user_id, e);
        }

        Ok(Notification {
            id,
            user_id: req.user_id,
            store_id: req.store_id,
            kind: req.kind,
            title,
            body,
            data: req.data,
            read_at: None,
            created_at,
        })
    }

    async fn count_unread_in_db(&self, scope: &Scope) -> Result<i64> {
        let mut conn = self.ctx.db_pool.get().await?;

        let mut query = notifications::table
            .filter(notifications::user_id.eq(scope.user_id))
            .filter(notifications::read_at.is_null())
            .into_boxed();
        if let Some(store_id) = scope.store_id {
            query = query.filter(notifications::store_id.eq(store_id));
        }

        let count: i64 = query.count().get_result(&mut conn).await?;
        Ok(count)
    }

    async fn read_cached_count(&self, scope: &Scope) -> Option<i64> {
        let mut conn = get_connection(&self.ctx.redis_pool).await.ok()?;
        redis::cmd("GET")
            .arg(scope.counter_key())
            .query_async::<Option<i64>>(&mut conn)
            .await
            .ok()
            .flatten()
    }

    async fn backfill_cached_count(&self, scope: &Scope, count: i64) {
        let mut conn = match get_connection(&self.ctx.redis_pool).await {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("Skipping counter backfill: {}", e);
                return;
            }
        };

        if let Err(e) = redis::cmd("SET")
            .arg(scope.counter_key())
            .arg(count)
            .query_async::<()>(&mut conn)
            .await
        {
            tracing::debug!("Failed to backfill unread counter: {}", e);
        }
    }

    async fn increment_cached_counts(&self, scope: &Scope) -> Result<()> {
        let mut conn = get_connection(&self.ctx.redis_pool).await?;

        redis::cmd("INCR")
            .arg(scope.total_unread_key())
            .query_async::<i64>(&mut conn)
            .await?;

        if let Some(store_key) = scope.store_unread_key() {
            redis::cmd("INCR")
                .arg(&store_key)
                .query_async::<i64>(&mut conn)
                .await?;

            // Index the store counter so a user-wide invalidation can
            // find it.
            redis::cmd("SADD")
                .arg(scope.store_index_key())
                .arg(&store_key)
                .query_async::<i64>(&mut conn)
                .await?;
        }

        Ok(())
    }

    async fn invalidate_cached_counts(&self, scope: &Scope) {
        let mut conn = match get_connection(&self.ctx.redis_pool).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to invalidate unread counters: {}", e);
                return;
            }
        };

        // A user-wide invalidation must also remove every tracked
        // per-store counter, or a later scoped read would see a stale
        // nonzero value after everything was marked read.
        let tracked = if scope.store_id.is_none() {
            redis::cmd("SMEMBERS")
                .arg(scope.store_index_key())
                .query_async::<Vec<String>>(&mut conn)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to list tracked store counters: {}", e);
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        let mut del = redis::cmd("DEL");
        for key in invalidation_keys(scope, tracked) {
            del.arg(key);
        }

        if let Err(e) = del.query_async::<i64>(&mut conn).await {
            tracing::warn!("Failed to invalidate unread counters: {}", e);
        }
    }
}

/// A cached counter can drift below zero; the reported count never does.
fn clamp_count(raw: i64) -> i64 {
    raw.max(0)
}

/// Counter keys made stale by a mark-all-read over `scope`. A store-scoped
/// pass stales that store's counter and the user total; a user-wide pass
/// stales the total, every tracked store counter, and the index itself.
fn invalidation_keys(scope: &Scope, tracked_store_keys: Vec<String>) -> Vec<String> {
    let mut keys = vec![scope.total_unread_key()];
    match scope.store_unread_key() {
        Some(store_key) => keys.push(store_key),
        None => {
            keys.extend(tracked_store_keys);
            keys.push(scope.store_index_key());
        }
    }
    keys
}

/// Title/body pair for a notification, preferring producer-supplied values
/// over the per-kind defaults.
fn resolve_content(req: &CreateNotification) -> (String, String) {
    let (default_title, default_body) = default_content(&req.kind);
    (
        req.title.clone().unwrap_or_else(|| default_title.to_string()),
        req.body.clone().unwrap_or_else(|| default_body.to_string()),
    )
}

fn default_content(kind: &str) -> (&'static str, &'static str) {
    match kind {
        "ticket.created" => ("New Ticket", "A new support ticket was opened"),
        "ticket.assigned" => ("Ticket Assigned", "A ticket was assigned to you"),
        "ticket.replied" => ("New Reply", "A ticket you follow has a new reply"),
        "call.missed" => ("Missed Call", "You have a missed call"),
        _ => {
            tracing::debug!("No default content for notification kind: {}", kind);
            ("Notification", "You have a new notification")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str, title: Option<&str>, body: Option<&str>) -> CreateNotification {
        CreateNotification {
            user_id: Uuid::new_v4(),
            store_id: None,
            kind: kind.to_string(),
            title: title.map(|s| s.to_string()),
            body: body.map(|s| s.to_string()),
            data: None,
        }
    }

    #[test]
    fn known_kinds_get_specific_defaults() {
        let (title, body) = resolve_content(&request("ticket.assigned", None, None));
        assert_eq!(title, "Ticket Assigned");
        assert_eq!(body, "A ticket was assigned to you");

        let (title, _) = resolve_content(&request("call.missed", None, None));
        assert_eq!(title, "Missed Call");
    }

    #[test]
    fn unknown_kinds_fall_back_to_generic_content() {
        let (title, body) = resolve_content(&request("billing.overdue", None, None));
        assert_eq!(title, "Notification");
        assert_eq!(body, "You have a new notification");
    }

    #[test]
    fn producer_content_wins_over_defaults() {
        let (title, body) = resolve_content(&request(
            "ticket.created",
            Some("Order #42 question"),
            Some("Customer asked about shipping"),
        ));
        assert_eq!(title, "Order #42 question");
        assert_eq!(body, "Customer asked about shipping");
    }

    #[test]
    fn cached_counts_clamp_negative_drift_to_zero() {
        assert_eq!(clamp_count(-3), 0);
        assert_eq!(clamp_count(0), 0);
        assert_eq!(clamp_count(7), 7);
    }

    #[test]
    fn user_wide_invalidation_covers_store_counters() {
        let user = Uuid::new_v4();
        let store = Uuid::new_v4();

        // `create` with a store tracks its counter key in the index; a
        // user-wide mark-all-read must remove that counter too, so a
        // later store-scoped read cannot return a stale nonzero count.
        let store_key = Scope::new(user, Some(store)).store_unread_key().unwrap();
        let user_wide = Scope::new(user, None);

        let keys = invalidation_keys(&user_wide, vec![store_key.clone()]);
        assert!(keys.contains(&user_wide.total_unread_key()));
        assert!(keys.contains(&store_key));
        assert!(keys.contains(&user_wide.store_index_key()));
    }

    #[test]
    fn scoped_invalidation_covers_its_store_and_the_total() {
        let scope = Scope::new(Uuid::new_v4(), Some(Uuid::new_v4()));

        let keys = invalidation_keys(&scope, Vec::new());
        assert_eq!(
            keys,
            vec![scope.total_unread_key(), scope.store_unread_key().unwrap()]
        );
    }

    #[test]
    fn mark_all_read_statement_filters_to_unread_rows() {
        // The UPDATE only matches rows with a null read_at, so running it
        // again right away matches nothing and reports zero rows changed.
        let scope = Scope::new(Uuid::new_v4(), None);
        let statement = diesel::update(notifications::table)
            .filter(notifications::user_id.eq(scope.user_id))
            .filter(notifications::read_at.is_null())
            .set(notifications::read_at.eq(Some(Utc::now())));

        let sql = diesel::debug_query::<diesel::pg::Pg, _>(&statement).to_string();
        assert!(sql.contains(r#""read_at" IS NULL"#), "unexpected SQL: {}", sql);
    }

    #[test]
    fn scoped_mark_all_read_statement_also_filters_by_store() {
        let scope = Scope::new(Uuid::new_v4(), Some(Uuid::new_v4()));
        let statement = diesel::update(notifications::table)
            .filter(notifications::user_id.eq(scope.user_id))
            .filter(notifications::store_id.eq(scope.store_id.unwrap()))
            .filter(notifications::read_at.is_null())
            .set(notifications::read_at.eq(Some(Utc::now())));

        let sql = diesel::debug_query::<diesel::pg::Pg, _>(&statement).to_string();
        assert!(sql.contains(r#""store_id""#), "unexpected SQL: {}", sql);
        assert!(sql.contains(r#""read_at" IS NULL"#), "unexpected SQL: {}", sql);
    }
}
