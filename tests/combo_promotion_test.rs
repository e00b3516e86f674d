//! Combo promotion status refresher: batch flips from the date window and
//! usage cap before list views, with per-request freshness only.

mod common;

use chrono::Duration;
use common::{combo_fixture, test_now, TestApp};
use storefront_api::entities::promotion::PromotionStatus;

#[tokio::test]
async fn listing_refreshes_expired_combos() {
    let app = TestApp::new().await;

    let mut expired = combo_fixture("Breakfast Set");
    expired.end_date = test_now() - Duration::days(1);
    expired.status = PromotionStatus::Active;
    let expired = app.seed_combo_promotion(expired).await;

    let fresh = app.seed_combo_promotion(combo_fixture("Afternoon Set")).await;

    let listed = app.state.combo_promotion_service.list().await.unwrap();
    assert_eq!(listed.len(), 2);

    let find = |id| listed.iter().find(|c| c.id == id).unwrap();
    assert_eq!(find(expired.id).status, PromotionStatus::Inactive);
    assert_eq!(find(fresh.id).status, PromotionStatus::Active);
}

#[tokio::test]
async fn refresh_respects_the_usage_cap() {
    let app = TestApp::new().await;

    let mut capped = combo_fixture("Lunch Set");
    capped.usage_limit = 5;
    capped.used_count = 5;
    capped.status = PromotionStatus::Active;
    let capped = app.seed_combo_promotion(capped).await;

    let changed = app
        .state
        .combo_promotion_service
        .refresh_statuses()
        .await
        .unwrap();
    assert_eq!(changed, 1);

    let reloaded = app.state.combo_promotion_service.get(capped.id).await.unwrap();
    assert_eq!(reloaded.status, PromotionStatus::Inactive);
}

#[tokio::test]
async fn refresh_reactivates_combos_back_inside_their_window() {
    let app = TestApp::new().await;

    let mut dormant = combo_fixture("Evening Set");
    dormant.status = PromotionStatus::Inactive;
    let dormant = app.seed_combo_promotion(dormant).await;

    app.state.combo_promotion_service.refresh_statuses().await.unwrap();

    let reloaded = app.state.combo_promotion_service.get(dormant.id).await.unwrap();
    assert_eq!(reloaded.status, PromotionStatus::Active);
}

#[tokio::test]
async fn individual_lookups_do_not_refresh() {
    let app = TestApp::new().await;

    let mut stale = combo_fixture("Weekend Set");
    stale.end_date = test_now() - Duration::days(1);
    stale.status = PromotionStatus::Active;
    let stale = app.seed_combo_promotion(stale).await;

    // Freshness is a list-view concern; a bare lookup returns the stored row.
    let fetched = app.state.combo_promotion_service.get(stale.id).await.unwrap();
    assert_eq!(fetched.status, PromotionStatus::Active);

    app.state.combo_promotion_service.list().await.unwrap();

    let fetched = app.state.combo_promotion_service.get(stale.id).await.unwrap();
    assert_eq!(fetched.status, PromotionStatus::Inactive);
}

#[tokio::test]
async fn combo_items_are_readable_for_the_admin_surface() {
    let app = TestApp::new().await;

    let combo = app.seed_combo_promotion(combo_fixture("Picnic Set")).await;
    let product_a = uuid::Uuid::new_v4();
    let product_b = uuid::Uuid::new_v4();
    app.seed_combo_item(combo.id, product_a, 2).await;
    app.seed_combo_item(combo.id, product_b, 1).await;

    let items = app.state.combo_promotion_service.items(combo.id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().any(|i| i.product_id == product_a && i.required_quantity == 2));
    assert!(items.iter().any(|i| i.product_id == product_b && i.required_quantity == 1));
}
