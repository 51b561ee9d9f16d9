//! `Events::stream` — the subscription state machine.
//!
//! ```text
//!   START ─► ACQUIRE_CONN ─► SUBSCRIBE ─► READ_BACKLOG ─► MAYBE_END_EARLY ─┐
//!                                                                          ▼
//!    ┌──── LIVE_LOOP ◄── DRAIN_NOTIFY ◄── WAIT_NOTIFY ◄────────────────────┘
//!    │
//!    └──► FLUSH_BATCH ──► LIVE_LOOP
//!   TERMINAL: caller-end, context-cancel, fatal-db-error
//! ```

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::ContainerOptions;
use crate::error::StoreError;
use crate::ids::{ChannelId, EventId};
use crate::json::from_json;
use crate::model::{Event, Tree};

use super::channel_name;

/// Where a subscription should start reading the backlog from.
#[derive(Debug, Clone, Copy)]
pub enum StartingPoint {
    /// No `startingEventID`: backlog is the recency window.
    Recent,
    /// Strictly greater than this id.
    After(EventId),
    /// Greater than or equal to this id (the inclusive variant).
    From(EventId),
}

/// A live subscription handle. Drop it, or call [`EventStream::stop`], to
/// request termination; the background task tears down its `LISTEN` and
/// releases its dedicated connection on every exit path.
pub struct EventStream {
    pub events: mpsc::Receiver<Event>,
    pub errors: mpsc::Receiver<StoreError>,
    end: mpsc::Sender<()>,
}

impl EventStream {
    /// Ask the stream to stop.
    pub async fn stop(&self) {
        let _ = self.end.send(()).await;
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    id: uuid::Uuid,
    #[sqlx(rename = "type")]
    event_type: String,
    channel_type: String,
    channel_id: uuid::Uuid,
    data: Tree,
    timestamp: DateTime<Utc>,
    #[sqlx(rename = "end")]
    end: bool,
}

fn row_to_event(row: Row) -> Result<Event, StoreError> {
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

pub(super) async fn spawn(
    pool: PgPool,
    clock: Arc<dyn Clock>,
    options: Arc<ContainerOptions>,
    channel_type: String,
    channel_id: ChannelId,
    start: StartingPoint,
) -> Result<EventStream, StoreError> {
    let channel = channel_name(&channel_type, channel_id);

    // ACQUIRE_CONN + SUBSCRIBE, strictly before READ_BACKLOG (contract 1):
    // any notification racing the backlog query is deduplicated on intake
    // instead of lost.
    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen(&channel).await?;

    let (events_tx, events_rx) = mpsc::channel(128);
    let (errors_tx, errors_rx) = mpsc::channel(8);
    let (end_tx, end_rx) = mpsc::channel(1);

    tokio::spawn(run(
        pool,
        listener,
        clock,
        options,
        channel,
        channel_type,
        channel_id,
        start,
        events_tx,
        errors_tx,
        end_rx,
    ));

    Ok(EventStream {
        events: events_rx,
        errors: errors_rx,
        end: end_tx,
    })
}

/// Send one event to the sink, racing it against the caller's end-signal
/// (contract 6(a)): a `stop()` that arrives while the sink's bounded channel
/// is full must be observed immediately rather than waiting for buffer
/// space to free up.
async fn send_event(
    events_tx: &mpsc::Sender<Event>,
    end_rx: &mut mpsc::Receiver<()>,
    event: Event,
) -> ControlFlow<()> {
    tokio::select! {
        biased;

        _ = end_rx.recv() => ControlFlow::Break(()),
        result = events_tx.send(event) => match result {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        },
    }
}

async fn run(
    pool: PgPool,
    mut listener: PgListener,
    clock: Arc<dyn Clock>,
    options: Arc<ContainerOptions>,
    channel: String,
    channel_type: String,
    channel_id: ChannelId,
    start: StartingPoint,
    events_tx: mpsc::Sender<Event>,
    errors_tx: mpsc::Sender<StoreError>,
    mut end_rx: mpsc::Receiver<()>,
) {
    let mut seen: HashSet<EventId> = HashSet::new();

    let backlog = match fetch_backlog(&pool, &channel_type, channel_id, start, clock.as_ref(), &options).await {
        Ok(backlog) => backlog,
        Err(e) => {
            let _ = errors_tx.send(e).await;
            shutdown(&mut listener, &channel).await;
            return;
        }
    };

    let backlog_was_empty = backlog.is_empty();
    for event in &backlog {
        seen.insert(event.id);
    }
    for event in backlog {
        if send_event(&events_tx, &mut end_rx, event).await.is_break() {
            shutdown(&mut listener, &channel).await;
            return;
        }
    }

    // MAYBE_END_EARLY (contract 3): only a fresh subscription with an empty
    // backlog probes the latest event for the terminal marker; a supplied
    // `startingEventID` or a non-empty backlog always streams first.
    if matches!(start, StartingPoint::Recent) && backlog_was_empty {
        match latest_event(&pool, &channel_type, channel_id).await {
            Ok(Some(event)) if event.end => {
                if send_event(&events_tx, &mut end_rx, event).await.is_continue() {
                    let _ = end_rx.recv().await;
                }
                shutdown(&mut listener, &channel).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = errors_tx.send(e).await;
                shutdown(&mut listener, &channel).await;
                return;
            }
        }
    }

    run_live_loop(&pool, &mut listener, &options, &channel, &mut seen, events_tx, errors_tx, &mut end_rx).await;
}

async fn run_live_loop(
    pool: &PgPool,
    listener: &mut PgListener,
    options: &ContainerOptions,
    channel: &str,
    seen: &mut HashSet<EventId>,
    events_tx: mpsc::Sender<Event>,
    errors_tx: mpsc::Sender<StoreError>,
    end_rx: &mut mpsc::Receiver<()>,
) {
    let mut pending: HashSet<EventId> = HashSet::new();
    let mut flush_at = Instant::now() + options.flush_queue_wait_time;

    loop {
        tokio::select! {
            biased;

            _ = end_rx.recv() => {
                debug!(channel, "stream stopped by caller end-signal");
                break;
            }
            notification = listener.recv() => {
                match notification {
                    Ok(notification) => {
                        if let Ok(uuid) = notification.payload().parse::<uuid::Uuid>() {
                            let id = EventId::from(uuid);
                            if !seen.contains(&id) {
                                pending.insert(id);
                            }
                        }
                    }
                    Err(e) => {
                        let _ = errors_tx.send(StoreError::Database(e)).await;
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(options.end_signal_wait_time) => {}
        }

        if !pending.is_empty() && Instant::now() >= flush_at {
            match flush_batch(pool, &pending).await {
                Ok(events) => {
                    for event in events {
                        pending.remove(&event.id);
                        seen.insert(event.id);
                        if send_event(&events_tx, end_rx, event).await.is_break() {
                            shutdown(listener, channel).await;
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = errors_tx.send(e).await;
                    break;
                }
            }
            flush_at = Instant::now() + options.flush_queue_wait_time;
        }
    }

    shutdown(listener, channel).await;
}

async fn shutdown(listener: &mut PgListener, channel: &str) {
    if let Err(e) = listener.unlisten(channel).await {
        warn!(error = %e, channel, "UNLISTEN failed on stream teardown");
    }
}

async fn fetch_backlog(
    pool: &PgPool,
    channel_type: &str,
    channel_id: ChannelId,
    start: StartingPoint,
    clock: &dyn Clock,
    options: &ContainerOptions,
) -> Result<Vec<Event>, StoreError> {
    let rows: Vec<Row> = match start {
        StartingPoint::Recent => {
            let since = clock.now() - options.recently_queued_events_threshold;
            sqlx::query_as(
                "SELECT * FROM events WHERE channel_type = $1 AND channel_id = $2 AND timestamp > $3 ORDER BY id ASC",
            )
            .bind(channel_type)
            .bind(channel_id.as_uuid())
            .bind(since)
            .fetch_all(pool)
            .await?
        }
        StartingPoint::After(id) => {
            sqlx::query_as(
                "SELECT * FROM events WHERE channel_type = $1 AND channel_id = $2 AND id > $3 ORDER BY id ASC",
            )
            .bind(channel_type)
            .bind(channel_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_all(pool)
            .await?
        }
        StartingPoint::From(id) => {
            sqlx::query_as(
                "SELECT * FROM events WHERE channel_type = $1 AND channel_id = $2 AND id >= $3 ORDER BY id ASC",
            )
            .bind(channel_type)
            .bind(channel_id.as_uuid())
            .bind(id.as_uuid())
            .fetch_all(pool)
            .await?
        }
    };
    rows.into_iter().map(row_to_event).collect()
}

async fn latest_event(pool: &PgPool, channel_type: &str, channel_id: ChannelId) -> Result<Option<Event>, StoreError> {
    let row: Option<Row> = sqlx::query_as(
        "SELECT * FROM events WHERE channel_type = $1 AND channel_id = $2 ORDER BY id DESC LIMIT 1",
    )
    .bind(channel_type)
    .bind(channel_id.as_uuid())
    .fetch_optional(pool)
    .await?;
    row.map(row_to_event).transpose()
}

async fn flush_batch(pool: &PgPool, pending: &HashSet<EventId>) -> Result<Vec<Event>, StoreError> {
    let ids: Vec<uuid::Uuid> = pending.iter().map(|id| id.as_uuid()).collect();
    let rows: Vec<Row> = sqlx::query_as("SELECT * FROM events WHERE id = ANY($1) ORDER BY id ASC")
        .bind(&ids)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(row_to_event).collect()
}
