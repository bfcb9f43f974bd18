//! # Draft Autosave
//!
//! Debounced persistence of in-progress draft orders.
//!
//! ## Coalescing Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  edit ──touch──▶ pending set ──(quiet for `debounce`)──▶ flush          │
//! │                      ▲                                                  │
//! │                      └── every further edit reschedules the window      │
//! │                                                                         │
//! │  A burst of edits to one draft costs one write, not one per keystroke. │
//! │  flush_now() forces the write immediately (teardown, checkout).         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The task only re-derives and persists totals; item writes are already
//! durable when `touch` is called, so a crash inside the window loses
//! nothing but a totals recomputation.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::pool::Database;

/// Default quiet window before a touched draft is flushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

enum Command {
    Touch(String),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the background autosave task.
#[derive(Debug, Clone)]
pub struct DraftAutosave {
    tx: mpsc::UnboundedSender<Command>,
}

impl DraftAutosave {
    /// Spawns the autosave task.
    pub fn spawn(db: Database, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(db, debounce, rx));
        DraftAutosave { tx }
    }

    /// Marks a draft as edited, (re)scheduling its flush.
    pub fn touch(&self, order_number: &str) {
        // A closed channel means the task is gone; edits are still durable.
        let _ = self.tx.send(Command::Touch(order_number.to_string()));
    }

    /// Flushes every pending draft immediately and waits for completion.
    pub async fn flush_now(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Stops the task after a final flush.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

async fn run(db: Database, debounce: Duration, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending: HashSet<String> = HashSet::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Touch(number)) => {
                    pending.insert(number);
                    deadline = Some(Instant::now() + debounce);
                }
                Some(Command::Flush(ack)) => {
                    flush(&db, &mut pending).await;
                    deadline = None;
                    let _ = ack.send(());
                }
                Some(Command::Shutdown) | None => {
                    flush(&db, &mut pending).await;
                    break;
                }
            },
            _ = async { tokio::time::sleep_until(deadline.unwrap()) }, if deadline.is_some() => {
                flush(&db, &mut pending).await;
                deadline = None;
            }
        }
    }
}

async fn flush(db: &Database, pending: &mut HashSet<String>) {
    if pending.is_empty() {
        return;
    }

    debug!(count = pending.len(), "Flushing touched drafts");
    let orders = db.orders();
    for number in pending.drain() {
        if let Err(e) = orders.recompute_totals(&number).await {
            // The draft may have been paid or deleted since the touch
            warn!(number = %number, error = %e, "Autosave flush skipped draft");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query(
            r#"
            INSERT INTO products (server_id, name, category_id, price_cents, tax_rate_bps,
                                  is_prepared, track_inventory, unit, updated_at)
            VALUES (1, 'Espresso', NULL, 300, 0, 0, 0, 'unit', ?1)
            "#,
        )
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_flush_now_persists_totals() {
        let db = test_db().await;
        let orders = db.orders();
        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        orders.add_item(&draft.number, 1).await.unwrap();

        // Desync the stored totals to prove the flush recomputes them
        sqlx::query("UPDATE orders SET total_cents = 0, subtotal_cents = 0 WHERE number = ?1")
            .bind(&draft.number)
            .execute(db.pool())
            .await
            .unwrap();

        let autosave = DraftAutosave::spawn(db.clone(), Duration::from_secs(60));
        autosave.touch(&draft.number);
        autosave.flush_now().await;

        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.total_cents, 300);
        autosave.shutdown();
    }

    // Real time rather than `start_paused`: sqlx runs SQLite work on blocking
    // threads, so a paused clock auto-advances past the pool acquire timeout
    // before any connection can open.
    #[tokio::test]
    async fn test_debounce_coalesces_edits() {
        let db = test_db().await;
        let orders = db.orders();
        let draft = orders.create_draft("reg-1", "SAA-AAA", None).await.unwrap();
        orders.add_item(&draft.number, 1).await.unwrap();

        sqlx::query("UPDATE orders SET total_cents = 0 WHERE number = ?1")
            .bind(&draft.number)
            .execute(db.pool())
            .await
            .unwrap();

        let autosave = DraftAutosave::spawn(db.clone(), Duration::from_millis(100));
        autosave.touch(&draft.number);
        autosave.touch(&draft.number);
        autosave.touch(&draft.number);

        // Before the window elapses nothing is written
        tokio::time::sleep(Duration::from_millis(50)).await;
        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.total_cents, 0);

        // After the quiet window the single coalesced flush lands
        tokio::time::sleep(Duration::from_millis(200)).await;
        let order = orders.get(&draft.number).await.unwrap().unwrap();
        assert_eq!(order.total_cents, 300);
        autosave.shutdown();
    }
}
