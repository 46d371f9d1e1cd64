mod common;

use tiket_server::auth::Role;
use tiket_server::models::transaction::TransactionStatus;
use tiket_server::services::transactions::{self, PurchaseRequest, RegisterFreeRequest};
use tiket_server::services::webhook;
use tiket_server::utils::error::AppError;

use common::{app_state, seed_event, seed_ticket_type, seed_user, signed_notification};

#[tokio::test]
async fn settlement_issues_tickets_once_and_redelivery_is_a_no_op() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Konser Akbar", true).await;
    let ticket_type = seed_ticket_type(&state, &event, 150_000, 10).await;

    let purchase = transactions::purchase(
        &state,
        &buyer,
        PurchaseRequest {
            ticket_type_id: ticket_type.id,
            quantity: 2,
        },
    )
    .await
    .unwrap();
    let order_id = purchase.transaction.order_id.clone();
    assert!(order_id.starts_with("ORD-"));
    assert_eq!(purchase.transaction.status, TransactionStatus::Pending);
    assert_eq!(purchase.snap_token, format!("snap-{order_id}"));

    // nothing is issued or reserved before payment
    assert_eq!(
        state.store.find_ticket_type(ticket_type.id).await.unwrap().unwrap().quota,
        10
    );

    let notification = signed_notification(&order_id, "settlement", "300000.00");
    let ack = webhook::handle_notification(&state, notification.clone())
        .await
        .unwrap();
    assert!(ack.applied);
    assert_eq!(ack.status, TransactionStatus::Paid);
    assert_eq!(ack.tickets_issued, 2);

    let redelivered = webhook::handle_notification(&state, notification).await.unwrap();
    assert!(!redelivered.applied);
    assert_eq!(redelivered.status, TransactionStatus::Paid);

    let stored = state
        .store
        .find_transaction_by_order(&order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_type.as_deref(), Some("bank_transfer"));
    assert_eq!(
        state.store.tickets_for_transaction(stored.id).await.unwrap().len(),
        2
    );
    assert_eq!(
        state.store.find_ticket_type(ticket_type.id).await.unwrap().unwrap().quota,
        8
    );
}

#[tokio::test]
async fn late_failure_after_payment_is_acknowledged_without_change() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Teater", true).await;
    let ticket_type = seed_ticket_type(&state, &event, 50_000, 5).await;
    let purchase = transactions::purchase(
        &state,
        &buyer,
        PurchaseRequest {
            ticket_type_id: ticket_type.id,
            quantity: 1,
        },
    )
    .await
    .unwrap();
    let order_id = purchase.transaction.order_id;

    webhook::handle_notification(&state, signed_notification(&order_id, "settlement", "50000.00"))
        .await
        .unwrap();
    let ack = webhook::handle_notification(&state, signed_notification(&order_id, "expire", "50000.00"))
        .await
        .unwrap();

    assert!(!ack.applied);
    assert_eq!(ack.status, TransactionStatus::Paid);
}

#[tokio::test]
async fn forged_or_unknown_notifications_are_refused() {
    let state = app_state();

    let mut forged = signed_notification("ORD-1-ABCDEFGH", "settlement", "10000.00");
    forged.gross_amount = "1.00".to_string();
    let err = webhook::handle_notification(&state, forged).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(_)));

    let unknown = signed_notification("ORD-1-ABCDEFGH", "settlement", "10000.00");
    let err = webhook::handle_notification(&state, unknown).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn last_unit_goes_to_exactly_one_of_two_confirmations() {
    let state = app_state();
    let admin = seed_user(&state, "admin", Role::Admin).await;
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let first = seed_user(&state, "first", Role::User).await;
    let second = seed_user(&state, "second", Role::User).await;
    let event = seed_event(&state, &eo, "Meet and Greet", true).await;
    let ticket_type = seed_ticket_type(&state, &event, 75_000, 1).await;

    let mut pending = Vec::new();
    for buyer in [&first, &second] {
        let purchase = transactions::purchase(
            &state,
            buyer,
            PurchaseRequest {
                ticket_type_id: ticket_type.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();
        pending.push(purchase.transaction);
    }

    let approved = transactions::approve(&state, &admin, pending[0].id).await.unwrap();
    assert_eq!(approved.transaction.status, TransactionStatus::Paid);
    assert_eq!(approved.tickets.len(), 1);

    let ack = webhook::handle_notification(
        &state,
        signed_notification(&pending[1].order_id, "settlement", "75000.00"),
    )
    .await;
    assert!(matches!(ack, Err(AppError::Conflict { .. })));

    let loser = state.store.find_transaction(pending[1].id).await.unwrap().unwrap();
    assert_eq!(loser.status, TransactionStatus::Pending);
    assert!(state.store.tickets_for_transaction(loser.id).await.unwrap().is_empty());
    assert_eq!(
        state.store.find_ticket_type(ticket_type.id).await.unwrap().unwrap().quota,
        0
    );
}

#[tokio::test]
async fn cancelled_transaction_cannot_be_approved() {
    let state = app_state();
    let admin = seed_user(&state, "admin", Role::Admin).await;
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Gala", true).await;
    let ticket_type = seed_ticket_type(&state, &event, 20_000, 3).await;
    let purchase = transactions::purchase(
        &state,
        &buyer,
        PurchaseRequest {
            ticket_type_id: ticket_type.id,
            quantity: 1,
        },
    )
    .await
    .unwrap();

    let cancelled = transactions::cancel(&state, &buyer, purchase.transaction.id)
        .await
        .unwrap();
    assert_eq!(cancelled.transaction.status, TransactionStatus::Expired);

    let err = transactions::approve(&state, &admin, purchase.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = transactions::approve(&state, &eo, purchase.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn free_registration_rules() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let free_event = seed_event(&state, &eo, "Kajian", false).await;
    let free_type = seed_ticket_type(&state, &free_event, 0, 10).await;
    let paid_event = seed_event(&state, &eo, "Konser", true).await;
    let paid_type = seed_ticket_type(&state, &paid_event, 100_000, 10).await;

    let registration = transactions::register_free(
        &state,
        &buyer,
        RegisterFreeRequest {
            ticket_type_id: free_type.id,
            quantity: 3,
        },
    )
    .await
    .unwrap();
    assert!(registration.transaction.order_id.starts_with("FREE-"));
    assert_eq!(registration.transaction.status, TransactionStatus::Free);
    assert_eq!(registration.tickets.len(), 3);

    let again = transactions::register_free(
        &state,
        &buyer,
        RegisterFreeRequest {
            ticket_type_id: free_type.id,
            quantity: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(again, AppError::Conflict { .. }));

    let paid = transactions::register_free(
        &state,
        &buyer,
        RegisterFreeRequest {
            ticket_type_id: paid_type.id,
            quantity: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(paid, AppError::ValidationError(_)));

    let too_many = transactions::register_free(
        &state,
        &buyer,
        RegisterFreeRequest {
            ticket_type_id: free_type.id,
            quantity: 6,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(too_many, AppError::InvalidInput(_)));

    let check = transactions::can_register(&state, &buyer, free_event.id).await.unwrap();
    assert!(check.is_registered);
    assert!(!check.can_register);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_free_registrations_never_oversell() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let event = seed_event(&state, &eo, "Open House", false).await;
    let ticket_type = seed_ticket_type(&state, &event, 0, 3).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let buyer = seed_user(&state, &format!("guest{i}"), Role::User).await;
        let state = state.clone();
        let ticket_type_id = ticket_type.id;
        handles.push(tokio::spawn(async move {
            transactions::register_free(
                &state,
                &buyer,
                RegisterFreeRequest {
                    ticket_type_id,
                    quantity: 1,
                },
            )
            .await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AppError::Conflict { .. }) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(
        state.store.find_ticket_type(ticket_type.id).await.unwrap().unwrap().quota,
        0
    );
}

#[tokio::test]
async fn settled_purchase_blocks_later_free_registration() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Bazar Kampus", false).await;
    let paid_type = seed_ticket_type(&state, &event, 35_000, 10).await;
    let free_type = seed_ticket_type(&state, &event, 0, 10).await;

    let purchase = transactions::purchase(
        &state,
        &buyer,
        PurchaseRequest {
            ticket_type_id: paid_type.id,
            quantity: 1,
        },
    )
    .await
    .unwrap();
    let ack = webhook::handle_notification(
        &state,
        signed_notification(&purchase.transaction.order_id, "settlement", "35000.00"),
    )
    .await
    .unwrap();
    assert_eq!(ack.status, TransactionStatus::Paid);

    let err = transactions::register_free(
        &state,
        &buyer,
        RegisterFreeRequest {
            ticket_type_id: free_type.id,
            quantity: 1,
        },
    )
    .await
    .unwrap_err();
    match err {
        AppError::Conflict { message, .. } => {
            assert_eq!(message, "You are already registered for this event")
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(
        state.store.find_ticket_type(free_type.id).await.unwrap().unwrap().quota,
        10
    );
}

#[tokio::test]
async fn oversized_total_is_rejected_before_the_gateway() {
    let state = app_state();
    let eo = seed_user(&state, "eo", Role::Eo).await;
    let buyer = seed_user(&state, "buyer", Role::User).await;
    let event = seed_event(&state, &eo, "Lelang Amal", true).await;
    let ticket_type = seed_ticket_type(&state, &event, 600_000_000_000, 5).await;

    let err = transactions::purchase(
        &state,
        &buyer,
        PurchaseRequest {
            ticket_type_id: ticket_type.id,
            quantity: 2,
        },
    )
    .await
    .unwrap_err();
    match err {
        AppError::InvalidInput(fields) => assert!(fields.contains("quantity")),
        other => panic!("expected invalid input, got {other:?}"),
    }
    let open = state
        .store
        .list_transactions(Default::default())
        .await
        .unwrap();
    assert!(open.is_empty());
}
