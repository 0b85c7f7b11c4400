//! End-to-end settlement flow tests against a real SQLite database: checkout, webhook paid
//! transition, duplicate-delivery classification, cancellation and referral rewards.

use futures_util::future::join_all;
use ticket_settlement_engine::{
    db_types::{BasketLine, NewOrderSession, OrderSessionId, OrderSessionStatus, PointsConfigSnapshot, PointsReservationState, ReferralClaimStatus, WebhookEventStatus},
    events::EventProducers,
    helpers::{delivery_fingerprint, CryptoPaymentEvent, FiatPaymentEvent, PaymentNotification},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    CheckoutRequest,
    OrderFlowError,
    ReferralApi,
    ReferralManagement,
    RewardDecision,
    RewardTemplate,
    SettlementDatabase,
    SettlementDatabaseError,
    SettlementFlowApi,
    SqliteDatabase,
    WebhookEventClaim,
    WebhookOutcome,
};
use tss_common::MinorUnits;

async fn new_api() -> SettlementFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database connection");
    SettlementFlowApi::new(db, EventProducers::default())
}

fn checkout_request() -> CheckoutRequest {
    let config = PointsConfigSnapshot::new(MinorUnits::from(100)).earns(["ticket"]).redeems(["ticket"]);
    CheckoutRequest { config, available_points: 9, use_points: true }
}

fn new_session(id: &str) -> NewOrderSession {
    NewOrderSession::new(
        OrderSessionId::from(id.to_string()),
        "tenant-1".to_string(),
        "guild-1".to_string(),
        "cust-1".to_string(),
    )
    .with_lines(vec![
        BasketLine::new("ticket", MinorUnits::from(500)).with_product("p1"),
        BasketLine::new("merch", MinorUnits::from(500)).with_product("p2"),
    ])
    .with_customer_email("buyer@example.com")
}

fn paid_notification() -> PaymentNotification {
    PaymentNotification::Fiat(FiatPaymentEvent {
        status: "paid".to_string(),
        amount: Some(MinorUnits::from(500)),
        currency: Some("GBP".to_string()),
        provider_ref: Some("ch_1".to_string()),
    })
}

#[tokio::test]
async fn checkout_stores_breakdown_and_reserves_points() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-1"), &checkout_request()).await.unwrap();
    assert_eq!(session.status, OrderSessionStatus::PendingPayment);
    assert_eq!(session.subtotal, MinorUnits::from(1000));
    // only the ticket line is redeemable: pool 500 caps the 9 available points at 5
    assert_eq!(session.points_reserved, 5);
    assert_eq!(session.points_discount, MinorUnits::from(500));
    assert_eq!(session.points_reservation_state, PointsReservationState::Reserved);
    assert_eq!(session.total, MinorUnits::from(500));

    // checkout is idempotent by order_session_id
    let again = api.checkout_order(new_session("os-1"), &checkout_request()).await.unwrap();
    assert_eq!(again.id, session.id);
}

#[tokio::test]
async fn first_paid_webhook_transitions_replay_is_duplicate() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-2"), &checkout_request()).await.unwrap();
    let id = session.order_session_id.clone();

    let outcome = api.process_payment_notification(&id, &paid_notification()).await.unwrap();
    let paid = match outcome {
        WebhookOutcome::Paid(order) => order,
        other => panic!("Expected Paid outcome, got {other:?}"),
    };
    assert_eq!(paid.status, OrderSessionStatus::Paid);
    assert_eq!(paid.points_reservation_state, PointsReservationState::Captured);

    // the provider retries the identical delivery
    let replay = api.process_payment_notification(&id, &paid_notification()).await.unwrap();
    assert!(matches!(replay, WebhookOutcome::Duplicate));

    let stored = api.db().fetch_order_session(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderSessionStatus::Paid);
}

#[tokio::test]
async fn concurrent_replays_yield_exactly_one_paid_transition() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-3"), &checkout_request()).await.unwrap();
    let id = session.order_session_id.clone();

    let notification = paid_notification();
    let deliveries = (0..4).map(|_| api.process_payment_notification(&id, &notification));
    let outcomes = join_all(deliveries).await;
    let paid_count = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(WebhookOutcome::Paid(_))))
        .count();
    assert_eq!(paid_count, 1, "exactly one delivery may win the claim");
}

#[tokio::test]
async fn amount_corrected_delivery_is_not_deduplicated() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-4"), &checkout_request()).await.unwrap();
    let id = session.order_session_id.clone();

    let original = PaymentNotification::Crypto(CryptoPaymentEvent {
        status: None,
        amount_settled: Some(MinorUnits::from(400)),
        confirmations: Some(1),
        txid: Some("tx-1".to_string()),
    });
    let corrected = PaymentNotification::Crypto(CryptoPaymentEvent {
        status: None,
        amount_settled: Some(MinorUnits::from(500)),
        confirmations: Some(1),
        txid: Some("tx-1".to_string()),
    });
    assert!(matches!(
        api.process_payment_notification(&id, &original).await.unwrap(),
        WebhookOutcome::Paid(_)
    ));
    // the corrected amount fingerprints differently, so it is a fresh event; the session is
    // already paid, which is a conflict rather than a silent dedup
    let result = api.process_payment_notification(&id, &corrected).await;
    assert!(matches!(
        result,
        Err(OrderFlowError::DatabaseError(SettlementDatabaseError::SessionAlreadyTerminal { .. }))
    ));
}

#[tokio::test]
async fn non_paid_signal_is_ignored() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-5"), &checkout_request()).await.unwrap();
    let id = session.order_session_id.clone();
    let failed = PaymentNotification::Fiat(FiatPaymentEvent {
        status: "failed".to_string(),
        amount: Some(MinorUnits::from(500)),
        currency: None,
        provider_ref: None,
    });
    let outcome = api.process_payment_notification(&id, &failed).await.unwrap();
    match outcome {
        WebhookOutcome::Ignored { status } => assert_eq!(status, "failed"),
        other => panic!("Expected Ignored outcome, got {other:?}"),
    }
    let stored = api.db().fetch_order_session(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderSessionStatus::PendingPayment);
}

#[tokio::test]
async fn cancel_releases_reserved_points_and_keeps_totals() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-6"), &checkout_request()).await.unwrap();
    let id = session.order_session_id.clone();

    let cancelled = api.cancel_session(&id, "customer asked").await.unwrap();
    assert_eq!(cancelled.status, OrderSessionStatus::Cancelled);
    assert_eq!(cancelled.points_reservation_state, PointsReservationState::Released);
    // totals untouched for audit
    assert_eq!(cancelled.total, session.total);
    assert_eq!(cancelled.points_discount, session.points_discount);

    // cancelling again is a descriptive conflict, not a no-op
    let again = api.cancel_session(&id, "double tap").await;
    assert!(matches!(
        again,
        Err(OrderFlowError::DatabaseError(SettlementDatabaseError::SessionAlreadyTerminal { .. }))
    ));
}

#[tokio::test]
async fn referral_reward_is_issued_exactly_once() {
    let api = new_api().await;
    let referrals = ReferralApi::new(api.db().clone());
    let template = RewardTemplate("{referrer_email} gets {points} pts for {referred_email}".to_string());

    let claim = referrals
        .create_claim_from_command("discord-9", "Referrer@Example.com", "BUYER@example.com")
        .await
        .unwrap();
    assert_eq!(claim.status, ReferralClaimStatus::Pending);

    let session = api.checkout_order(new_session("os-7"), &checkout_request()).await.unwrap();
    let paid = match api.process_payment_notification(&session.order_session_id, &paid_notification()).await.unwrap() {
        WebhookOutcome::Paid(order) => order,
        other => panic!("Expected Paid outcome, got {other:?}"),
    };

    let decision = referrals.process_paid_order_reward(&paid, &template).await.unwrap();
    let rewarded = match decision {
        RewardDecision::Rewarded { claim, message } => {
            assert!(message.contains("referrer@example.com"));
            claim
        },
        other => panic!("Expected Rewarded decision, got {other:?}"),
    };
    assert_eq!(rewarded.status, ReferralClaimStatus::Rewarded);

    // a second pass (e.g. operator replaying the hook) finds no pending claim
    let second = referrals.process_paid_order_reward(&paid, &template).await.unwrap();
    assert!(matches!(second, RewardDecision::NoMatchingClaim));
}

#[tokio::test]
async fn self_referral_is_blocked() {
    let api = new_api().await;
    let referrals = ReferralApi::new(api.db().clone());
    let claim = referrals
        .create_claim_from_command("discord-1", "Same@Example.com", "same@example.COM")
        .await
        .unwrap();
    assert_eq!(claim.status, ReferralClaimStatus::SelfBlocked);
    // and it never matches a paid order
    let found = referrals.db().fetch_pending_claim_for_email("same@example.com").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn order_without_email_is_not_applicable() {
    let api = new_api().await;
    let referrals = ReferralApi::new(api.db().clone());
    let template = RewardTemplate("unused".to_string());
    let mut new = new_session("os-8");
    new.customer_email = None;
    let session = api.checkout_order(new, &checkout_request()).await.unwrap();
    let decision = referrals.process_paid_order_reward(&session, &template).await.unwrap();
    match decision {
        RewardDecision::NotApplicable { reason } => assert_eq!(reason, "no_customer_email"),
        other => panic!("Expected NotApplicable decision, got {other:?}"),
    }
}

#[tokio::test]
async fn expiry_sweep_cancels_token_expired_sessions() {
    let api = new_api().await;
    let mut new = new_session("os-9");
    new.checkout_token_expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(5));
    api.checkout_order(new, &checkout_request()).await.unwrap();

    let mut fresh = new_session("os-10");
    fresh.checkout_token_expires_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
    api.checkout_order(fresh, &checkout_request()).await.unwrap();

    let expired = api.expire_stale_sessions(chrono::Utc::now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_session_id, OrderSessionId::from("os-9".to_string()));
    assert_eq!(expired[0].status, OrderSessionStatus::Cancelled);

    let fresh_stored =
        api.db().fetch_order_session(&OrderSessionId::from("os-10".to_string())).await.unwrap().unwrap();
    assert_eq!(fresh_stored.status, OrderSessionStatus::PendingPayment);
}

#[tokio::test]
async fn failed_transition_marks_ledger_event_failed() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-11"), &checkout_request()).await.unwrap();
    let id = session.order_session_id.clone();
    api.cancel_session(&id, "cancelled before payment").await.unwrap();

    // a paid webhook arriving after cancellation claims the fingerprint but cannot transition
    let result = api.process_payment_notification(&id, &paid_notification()).await;
    assert!(matches!(
        result,
        Err(OrderFlowError::DatabaseError(SettlementDatabaseError::SessionAlreadyTerminal { .. }))
    ));
    let fingerprint = delivery_fingerprint(&id, &paid_notification());
    let mut conn = api.db().pool().acquire().await.unwrap();
    let event: ticket_settlement_engine::db_types::WebhookEvent =
        sqlx::query_as("SELECT * FROM webhook_events WHERE delivery_fingerprint = $1")
            .bind(&fingerprint)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
    assert_eq!(event.status, WebhookEventStatus::Failed);
}

#[tokio::test]
async fn provider_retry_after_failed_attempt_completes_payment() {
    let api = new_api().await;
    let session = api.checkout_order(new_session("os-12"), &checkout_request()).await.unwrap();
    let id = session.order_session_id.clone();

    // an earlier delivery claimed the fingerprint, then processing died before the transition
    let fingerprint = delivery_fingerprint(&id, &paid_notification());
    let event = match api.db().claim_webhook_event(&id, &fingerprint).await.unwrap() {
        WebhookEventClaim::Claimed(event) => event,
        other => panic!("Expected a fresh claim, got {other:?}"),
    };
    api.db().mark_webhook_event(event.id, WebhookEventStatus::Failed).await.unwrap();

    // the provider retries the identical delivery; the failed row is re-claimed, not deduplicated,
    // and the payment completes
    let retry = api.process_payment_notification(&id, &paid_notification()).await.unwrap();
    let paid = match retry {
        WebhookOutcome::Paid(order) => order,
        other => panic!("Expected Paid outcome on retry, got {other:?}"),
    };
    assert_eq!(paid.status, OrderSessionStatus::Paid);

    // once processed, further replays are plain duplicates again
    let replay = api.process_payment_notification(&id, &paid_notification()).await.unwrap();
    assert!(matches!(replay, WebhookOutcome::Duplicate));
}
