//! The `Events` sub-container — the append-only notification engine.
//! The hardest component: save+notify, get/cleanup, and
//! the long-lived subscription state machine in [`stream`].

mod stream;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::clock::Clock;
use crate::config::ContainerOptions;
use crate::error::StoreError;
use crate::ids::{ChannelId, EventId};
use crate::json::{from_json, to_json};
use crate::model::Event;

pub use stream::{EventStream, StartingPoint};

#[derive(Clone)]
pub struct Events {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    options: Arc<ContainerOptions>,
}

/// `events_{channelType}_{channelID}`. Stable and collision-free
/// under the id-uniqueness invariant; safe to pass straight to
/// `LISTEN`/`UNLISTEN` because `channel_id` is always a UUID.
pub(crate) fn channel_name(channel_type: &str, channel_id: ChannelId) -> String {
    format!("events_{channel_type}_{channel_id}")
}

impl Events {
    pub(crate) fn new(pool: PgPool, clock: Arc<dyn Clock>, options: Arc<ContainerOptions>) -> Self {
        Self { pool, clock, options }
    }

    /// Insert at-most-once under retry (`ON CONFLICT DO NOTHING`), then
    /// notify the event's channel with its id as payload. A
    /// publish failure after a successful insert is surfaced to the caller;
    /// subscribers still converge because `Stream` always reads the backlog
    /// before going live.
    pub async fn save(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events (id, type, channel_type, channel_id, data, timestamp, \"end\")
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(event.id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.channel_type)
        .bind(event.channel_id.as_uuid())
        .bind(to_json(&event.data)?)
        .bind(event.timestamp)
        .bind(event.end)
        .execute(&self.pool)
        .await?;

        let channel = channel_name(&event.channel_type, event.channel_id);
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&channel)
            .bind(event.id.to_string())
            .execute(&self.pool)
            .await?;

        info!(event_id = %event.id, channel, "event saved and published");
        Ok(())
    }

    /// `EventNotFound` on a missing or malformed id.
    pub async fn get(&self, id: &str) -> Result<Event, StoreError> {
        let id = EventId::parse(id).map_err(|_| StoreError::EventNotFound(id.to_string()))?;
        self.get_by_id(id).await
    }

    pub async fn get_by_id(&self, id: EventId) -> Result<Event, StoreError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: uuid::Uuid,
            #[sqlx(rename = "type")]
            event_type: String,
            channel_type: String,
            channel_id: uuid::Uuid,
            data: crate::model::Tree,
            timestamp: DateTime<Utc>,
            #[sqlx(rename = "end")]
            end: bool,
        }
        let row: Option<Row> = sqlx::query_as("SELECT * FROM events WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| StoreError::EventNotFound(id.to_string()))?;
        Ok(Event {
            id: EventId::from(row.id),
            event_type: row.event_type,
            channel_type: row.channel_type,
            channel_id: ChannelId::from(row.channel_id),
            data: from_json(row.data)?,
            timestamp: row.timestamp,
            end: row.end,
        })
    }

    /// Delete every event with timestamp strictly before `threshold`.
    /// Unconditional success if none match.
    pub async fn cleanup(&self, threshold: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE timestamp < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        info!(deleted = result.rows_affected(), "events cleaned up");
        Ok(())
    }

    /// Subscribe to a `(channelType, channelID)` channel. Returns
    /// once the dedicated `LISTEN` connection is in place and the backlog
    /// has begun streaming into the returned handle's event receiver.
    pub async fn stream(
        &self,
        channel_type: impl Into<String>,
        channel_id: ChannelId,
        start: StartingPoint,
    ) -> Result<EventStream, StoreError> {
        stream::spawn(
            self.pool.clone(),
            self.clock.clone(),
            self.options.clone(),
            channel_type.into(),
            channel_id,
            start,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> Events {
        crate::test_support::init_tracing();
        let pool = PgPool::connect(&test_url().unwrap()).await.unwrap();
        Events::new(pool, Arc::new(crate::clock::SystemClock), Arc::new(ContainerOptions::default()))
    }

    async fn connect_with_clock(clock: Arc<dyn Clock>) -> Events {
        crate::test_support::init_tracing();
        let pool = PgPool::connect(&test_url().unwrap()).await.unwrap();
        Events::new(pool, clock, Arc::new(ContainerOptions::default()))
    }

    fn event(channel_type: &str, channel_id: ChannelId, end: bool) -> Event {
        Event {
            id: EventId::new(),
            event_type: "status_changed".into(),
            channel_type: channel_type.into(),
            channel_id,
            data: serde_json::json!({"value": "0"}),
            timestamp: Utc::now(),
            end,
        }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn save_is_idempotent_by_id() {
        let events = connect().await;
        let e = event("changesets", ChannelId::new(), false);
        events.save(&e).await.unwrap();
        events.save(&e).await.unwrap();

        let fetched = events.get_by_id(e.id).await.unwrap();
        assert_eq!(fetched.id, e.id);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn cleanup_removes_only_entries_older_than_threshold() {
        let events = connect().await;
        let channel_id = ChannelId::new();
        let mut old = event("changesets", channel_id, false);
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        let recent = event("changesets", channel_id, false);

        events.save(&old).await.unwrap();
        events.save(&recent).await.unwrap();

        events.cleanup(Utc::now() - chrono::Duration::hours(1)).await.unwrap();

        assert!(matches!(events.get_by_id(old.id).await, Err(StoreError::EventNotFound(_))));
        assert!(events.get_by_id(recent.id).await.is_ok());
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn stream_delivers_seeded_backlog_in_order() {
        let events = connect().await;
        let channel_id = ChannelId::new();
        let mut seeded = Vec::new();
        for _ in 0..3 {
            let e = event("changesets", channel_id, false);
            events.save(&e).await.unwrap();
            seeded.push(e.id);
        }

        let mut stream = events.stream("changesets", channel_id, StartingPoint::Recent).await.unwrap();
        let mut received = Vec::new();
        for _ in 0..3 {
            let e = tokio::time::timeout(std::time::Duration::from_secs(5), stream.events.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(e.id);
        }
        assert_eq!(received, seeded);
        stream.stop().await;
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn stream_delivers_end_marker_then_terminates() {
        let events = connect().await;
        let channel_id = ChannelId::new();
        let e = event("changesets", channel_id, true);
        events.save(&e).await.unwrap();

        let mut stream = events.stream("changesets", channel_id, StartingPoint::Recent).await.unwrap();
        let received = tokio::time::timeout(std::time::Duration::from_secs(5), stream.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, e.id);
        assert!(received.end);
        stream.stop().await;
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn recency_window_excludes_events_older_than_threshold() {
        use crate::clock::test_support::FixedClock;

        let now = Utc::now();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now));
        let events = connect_with_clock(clock).await;
        let channel_id = ChannelId::new();

        let mut stale = event("changesets", channel_id, false);
        stale.timestamp = now - chrono::Duration::minutes(10);
        let fresh = event("changesets", channel_id, false);

        events.save(&stale).await.unwrap();
        events.save(&fresh).await.unwrap();

        // Default recently_queued_events_threshold is 5 minutes, so only
        // `fresh` falls inside the backlog window at a fixed "now".
        let mut stream = events.stream("changesets", channel_id, StartingPoint::Recent).await.unwrap();
        let first = tokio::time::timeout(std::time::Duration::from_secs(5), stream.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, fresh.id);

        let nothing_else = tokio::time::timeout(std::time::Duration::from_millis(300), stream.events.recv()).await;
        assert!(nothing_else.is_err(), "stale event must not be delivered from the recency window");
        stream.stop().await;
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn starting_event_id_ignores_recency_window() {
        let events = connect().await;
        let channel_id = ChannelId::new();

        let mut old = event("changesets", channel_id, false);
        old.timestamp = Utc::now() - chrono::Duration::hours(1);
        events.save(&old).await.unwrap();
        let after = event("changesets", channel_id, false);
        events.save(&after).await.unwrap();

        // `old` is well outside the default 5-minute recency window, but an
        // explicit `startingEventID` overrides that window entirely (§9 Open
        // Questions): backlog = everything strictly after `old.id`.
        let mut stream = events
            .stream("changesets", channel_id, StartingPoint::After(old.id))
            .await
            .unwrap();
        let received = tokio::time::timeout(std::time::Duration::from_secs(5), stream.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.id, after.id);
        stream.stop().await;
    }
}
