use chrono::Utc;
use log::*;
use ticket_settlement_engine::{db_types::OrderSession, events::EventProducers, SettlementFlowApi, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::cache::{CheckoutLinkStore, MemoryCache};

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every tick it cancels pending sessions whose checkout token has expired (releasing their
/// reserved points) and sweeps expired checkout links out of the cache.
pub fn start_expiry_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    links: CheckoutLinkStore<MemoryCache>,
    interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        let api = SettlementFlowApi::new(db, producers);
        info!("🕰️ Stale session expiry worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running stale session expiry job");
            let now = Utc::now();
            match api.expire_stale_sessions(now).await {
                Ok(expired) => {
                    if !expired.is_empty() {
                        info!("🕰️ {} sessions expired: {}", expired.len(), session_list(&expired));
                        for session in &expired {
                            links.remove_link(session.order_session_id.as_str());
                        }
                    }
                },
                Err(e) => {
                    error!("🕰️ Error running stale session expiry job: {e}");
                },
            }
            links.sweep(now);
        }
    })
}

fn session_list(sessions: &[OrderSession]) -> String {
    sessions
        .iter()
        .map(|s| format!("[{}] customer_id: {}", s.order_session_id, s.customer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
