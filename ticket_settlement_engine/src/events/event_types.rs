use crate::db_types::{OrderSession, OrderSessionStatus};

/// Emitted exactly once per order session, on its first transition to `Paid`. The referral reward
/// hook hangs off this event.
#[derive(Debug, Clone)]
pub struct OrderPaidEvent {
    pub order_session: OrderSession,
}

impl OrderPaidEvent {
    pub fn new(order_session: OrderSession) -> Self {
        Self { order_session }
    }
}

#[derive(Debug, Clone)]
pub struct OrderCancelledEvent {
    pub order_session: OrderSession,
    pub status: OrderSessionStatus,
}

impl OrderCancelledEvent {
    pub fn new(order_session: OrderSession) -> Self {
        let status = order_session.status;
        Self { order_session, status }
    }
}
