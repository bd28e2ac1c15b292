mod common;

use billing_backend::entities::{
    BillingCycle, BillingMethod, ChangeStatus, PaymentStatus, SubscriptionStatus,
};
use billing_backend::error::AppError;
use billing_backend::models::UpgradeRequest;
use billing_backend::services::proration;
use chrono::Duration;
use common::{Fixture, at};
use serde_json::json;
use uuid::Uuid;

fn upgrade_to(subscription_id: i64, plan: &str, cycle: BillingCycle, method: BillingMethod) -> UpgradeRequest {
    UpgradeRequest {
        subscription_id,
        to_plan_id: plan.to_string(),
        to_cycle: cycle,
        billing_method: method,
        credit_card: None,
    }
}

#[tokio::test]
async fn test_prorated_upgrade_charges_difference_and_defers_swap() {
    let fx = Fixture::new();
    let (owner, _, sub) = fx
        .subscribed(
            "basic",
            BillingCycle::Monthly,
            BillingMethod::Pix,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 5, 31)),
        )
        .await;

    let resp = fx
        .upgrade()
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap();

    assert_eq!(resp.proration_cents, 5667);
    assert_eq!(resp.status, ChangeStatus::Processing);
    assert!(resp.pix.is_some());

    let charges = fx.gateway.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].value_cents, 5667);

    let payment_id = resp.payment_id.unwrap();
    let payments = fx.store.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].gateway_payment_id, payment_id);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    assert_eq!(payments[0].amount_cents, 5667);

    // nothing swapped until the charge is paid
    let unchanged = fx.store.subscription(sub.id);
    assert_eq!(unchanged.plan_id, "basic");
    assert_eq!(unchanged.gateway_subscription_id, sub.gateway_subscription_id);
    assert!(fx.gateway.calls_to("cancel_subscription").is_empty());
}

#[tokio::test]
async fn test_confirmed_upgrade_charge_swaps_plan_once() {
    let fx = Fixture::new();
    let (owner, _, sub) = fx
        .subscribed(
            "basic",
            BillingCycle::Monthly,
            BillingMethod::Pix,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 5, 31)),
        )
        .await;
    let resp = fx
        .upgrade()
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap();
    let payment_id = resp.payment_id.unwrap();

    let webhook = fx.webhook("secret");
    let paid = at(2024, 5, 12);
    for event in ["PAYMENT_CONFIRMED", "PAYMENT_RECEIVED"] {
        let ack = webhook
            .ingest_at(
                json!({
                    "event": event,
                    "payment": { "id": payment_id, "value": 56.67, "billingType": "PIX" }
                }),
                paid,
            )
            .await
            .unwrap();
        assert!(ack.error.is_none());
    }

    let change = fx.store.change(resp.change_id);
    assert_eq!(change.status, ChangeStatus::Done);
    assert_eq!(change.processed_at, Some(paid));

    let swapped = fx.store.subscription(sub.id);
    assert_eq!(swapped.plan_id, "pro");
    assert_eq!(swapped.status, SubscriptionStatus::Active);
    assert_eq!(swapped.current_period_start, paid);
    assert_ne!(swapped.gateway_subscription_id, sub.gateway_subscription_id);

    // old subscription cancelled once, one replacement created
    assert_eq!(fx.gateway.calls_to("cancel_subscription").len(), 1);
    let created = fx.gateway.created_subscriptions();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].value_cents, 9000);
    assert_eq!(
        created[0].next_due_date,
        BillingCycle::Monthly.period_end(paid).date_naive()
    );

    let payments = fx.store.payments();
    assert_eq!(payments[0].status, PaymentStatus::Confirmed);
}

#[tokio::test]
async fn test_zero_charge_upgrade_completes_without_payment() {
    let fx = Fixture::new();
    // 480.00 semester credit covers a 90.00 month
    let (owner, _, sub) = fx
        .subscribed(
            "pro",
            BillingCycle::Semiannual,
            BillingMethod::Pix,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 11, 1)),
        )
        .await;

    let resp = fx
        .upgrade()
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 2),
        )
        .await
        .unwrap();

    assert_eq!(resp.status, ChangeStatus::Done);
    assert_eq!(resp.proration_cents, 0);
    assert!(resp.payment_id.is_none());
    assert!(fx.store.payments().is_empty());
    assert!(fx.gateway.charges().is_empty());

    let swapped = fx.store.subscription(sub.id);
    assert_eq!(swapped.cycle, BillingCycle::Monthly);
    assert_eq!(swapped.current_period_start, at(2024, 5, 2));
    assert_eq!(swapped.current_period_end, at(2024, 6, 2));
    assert_eq!(fx.store.change(resp.change_id).status, ChangeStatus::Done);
}

#[tokio::test]
async fn test_settled_card_charge_swaps_immediately() {
    let fx = Fixture::new();
    fx.gateway.set_charge_status("CONFIRMED");
    let (owner, _, sub) = fx
        .subscribed(
            "basic",
            BillingCycle::Monthly,
            BillingMethod::CreditCard,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 5, 31)),
        )
        .await;

    let resp = fx
        .upgrade()
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::CreditCard),
            at(2024, 5, 11),
        )
        .await
        .unwrap();

    assert_eq!(resp.status, ChangeStatus::Done);
    let swapped = fx.store.subscription(sub.id);
    assert_eq!(swapped.plan_id, "pro");
    assert_eq!(swapped.card_token.as_deref(), Some("tok_stored"));

    // a late webhook for the same charge does not swap again
    let ack = fx
        .webhook("secret")
        .ingest_at(
            json!({"event": "PAYMENT_CONFIRMED", "payment": {"id": resp.payment_id.unwrap()}}),
            at(2024, 5, 11),
        )
        .await
        .unwrap();
    assert!(ack.error.is_none());
    assert_eq!(fx.gateway.created_subscriptions().len(), 1);
    assert_eq!(fx.store.subscription(sub.id).version, swapped.version);
}

#[tokio::test]
async fn test_overdue_upgrade_charge_keeps_change_open() {
    let fx = Fixture::new();
    let (owner, _, sub) = fx
        .subscribed(
            "basic",
            BillingCycle::Monthly,
            BillingMethod::Pix,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 5, 31)),
        )
        .await;
    let resp = fx
        .upgrade()
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap();

    fx.webhook("secret")
        .ingest_at(
            json!({"event": "PAYMENT_OVERDUE", "payment": {"id": resp.payment_id.unwrap()}}),
            at(2024, 5, 13),
        )
        .await
        .unwrap();

    let change = fx.store.change(resp.change_id);
    assert_eq!(change.status, ChangeStatus::Processing);
    assert_eq!(fx.store.payments()[0].status, PaymentStatus::Overdue);
    let unchanged = fx.store.subscription(sub.id);
    assert_eq!(unchanged.status, SubscriptionStatus::Active);
    assert_eq!(unchanged.plan_id, "basic");
}

#[tokio::test]
async fn test_late_payment_of_overdue_upgrade_charge_swaps_plan() {
    let fx = Fixture::new();
    let (owner, _, sub) = fx
        .subscribed(
            "basic",
            BillingCycle::Monthly,
            BillingMethod::Pix,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 5, 31)),
        )
        .await;
    let resp = fx
        .upgrade()
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap();
    let payment_id = resp.payment_id.unwrap();
    let webhook = fx.webhook("secret");

    webhook
        .ingest_at(
            json!({"event": "PAYMENT_OVERDUE", "payment": {"id": payment_id}}),
            at(2024, 5, 13),
        )
        .await
        .unwrap();
    let ack = webhook
        .ingest_at(
            json!({"event": "PAYMENT_RECEIVED", "payment": {"id": payment_id, "billingType": "PIX"}}),
            at(2024, 5, 15),
        )
        .await
        .unwrap();
    assert!(ack.error.is_none());

    assert_eq!(fx.store.change(resp.change_id).status, ChangeStatus::Done);
    assert_eq!(fx.store.payments()[0].status, PaymentStatus::Confirmed);
    let swapped = fx.store.subscription(sub.id);
    assert_eq!(swapped.plan_id, "pro");
    assert_eq!(swapped.current_period_start, at(2024, 5, 15));
}

#[tokio::test]
async fn test_refunded_upgrade_charge_fails_change() {
    let fx = Fixture::new();
    let (owner, _, sub) = fx
        .subscribed(
            "basic",
            BillingCycle::Monthly,
            BillingMethod::Pix,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 5, 31)),
        )
        .await;
    let resp = fx
        .upgrade()
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap();

    fx.webhook("secret")
        .ingest_at(
            json!({"event": "PAYMENT_REFUNDED", "payment": {"id": resp.payment_id.unwrap()}}),
            at(2024, 5, 14),
        )
        .await
        .unwrap();

    let change = fx.store.change(resp.change_id);
    assert_eq!(change.status, ChangeStatus::Failed);
    assert_eq!(change.failure_reason.as_deref(), Some("Upgrade charge refunded"));
    assert_eq!(fx.store.payments()[0].status, PaymentStatus::Refunded);
    assert_eq!(fx.store.subscription(sub.id).plan_id, "basic");
}

#[tokio::test]
async fn test_upgrade_guards() {
    let fx = Fixture::new();
    let (owner, _, sub) = fx
        .subscribed(
            "basic",
            BillingCycle::Monthly,
            BillingMethod::Pix,
            SubscriptionStatus::Active,
            (at(2024, 5, 1), at(2024, 5, 31)),
        )
        .await;
    let upgrade = fx.upgrade();

    let err = upgrade
        .upgrade_at(
            Uuid::new_v4(),
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied));

    let err = upgrade
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "basic", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    // card upgrade of a PIX tenant needs card data
    let err = upgrade
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::CreditCard),
            at(2024, 5, 11),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    upgrade
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Monthly, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap();
    let err = upgrade
        .upgrade_at(
            owner,
            upgrade_to(sub.id, "pro", BillingCycle::Semiannual, BillingMethod::Pix),
            at(2024, 5, 11),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("in progress")));
    assert_eq!(fx.gateway.charges().len(), 1);
}

#[test]
fn test_charge_never_decreases_towards_period_end() {
    let start = at(2024, 5, 1);
    let end = at(2024, 5, 31);
    let mut previous = 0;
    for hour in 0..=(30 * 24) {
        let now = start + Duration::hours(hour);
        let p = proration::compute(5000, 9000, start, end, now);
        assert!(p.charge_cents >= previous);
        assert!(p.charge_cents >= 0);
        previous = p.charge_cents;
    }
    assert_eq!(previous, 9000);
}
