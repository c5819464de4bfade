//! 批次库存服务端到端测试（内存存储）

mod support;

use batch_stock::domain::{
    BatchBase, BatchFilter, BatchMutation, BatchPageQuery, OrderKey, RecipeEdge, Scope,
    StockDirection,
};
use chrono::{TimeDelta, Utc};
use rust_decimal::Decimal;
use stockpile_common::{Cursor, PageDirection, PageRequest, UserId};

use support::*;

const ACTOR: UserId = UserId(7);

fn mutation(sku: &str, id: Option<i64>, quantity: &str, unit_id: i64) -> BatchMutation {
    BatchMutation {
        sku: sku.to_string(),
        id,
        quantity: dec(quantity),
        unit_id,
        reason: None,
        comment: None,
        retailer_id: None,
    }
}

fn with_reason(mut request: BatchMutation, reason: &str) -> BatchMutation {
    request.reason = Some(reason.to_string());
    request
}

fn batch(id: i64, sku: &str, quantity: &str, unit_id: i64) -> BatchBase {
    BatchBase {
        id,
        sku: sku.to_string(),
        quantity: dec(quantity),
        unit_id,
        expires_at: date(2026, 12, 31),
    }
}

fn sku_a_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.add_variant(meta("SKU-A", U_G, "0.5", 30));
    store
}

#[tokio::test]
async fn test_increment_creates_batch_in_standard_unit() {
    let h = harness(sku_a_store(), InMemoryRecipes::default()).await;

    h.service
        .increment(
            WAREHOUSE,
            ACTOR,
            vec![with_reason(mutation("SKU-A", None, "10", U_KG), "RESTOCK")],
        )
        .await
        .unwrap();

    let batches = h.store.batches_of("SKU-A");
    assert_eq!(batches.len(), 1);
    let created = &batches[0];
    assert_eq!(created.quantity, Decimal::from(10_000));
    assert_eq!(created.unit_id, U_G);
    let expected_expiry = Utc::now().date_naive() + TimeDelta::days(30);
    assert!((created.expires_at - expected_expiry).num_days().abs() <= 1);

    let audits = h.store.audits();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].batch_id, None);
    assert_eq!(audits[0].quantity, Decimal::from(10_000));
    assert_eq!(audits[0].cost, Decimal::from(5_000));
    assert_eq!(audits[0].direction, StockDirection::Inbound);
    assert_eq!(audits[0].reason, "RESTOCK");
    assert_eq!(audits[0].actor, ACTOR);
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_decrement_converts_and_records_reason() {
    let store = sku_a_store();
    store.add_batch(WAREHOUSE, batch(42, "SKU-A", "5000", U_G));
    let h = harness(store, InMemoryRecipes::default()).await;

    h.service
        .decrement(
            WAREHOUSE,
            ACTOR,
            vec![with_reason(mutation("SKU-A", Some(42), "1", U_KG), "SALE")],
        )
        .await
        .unwrap();

    assert_eq!(h.store.batch(42).unwrap().quantity, Decimal::from(4_000));
    let audits = h.store.audits();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].batch_id, Some(42));
    assert_eq!(audits[0].quantity, Decimal::from(1_000));
    assert_eq!(audits[0].direction, StockDirection::Outbound);
    assert_eq!(audits[0].reason, "SALE");
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_decrement_underflow_leaves_no_trace() {
    let store = sku_a_store();
    store.add_batch(WAREHOUSE, batch(42, "SKU-A", "5000", U_G));
    let h = harness(store, InMemoryRecipes::default()).await;

    let err = h
        .service
        .decrement(
            WAREHOUSE,
            ACTOR,
            vec![with_reason(mutation("SKU-A", Some(42), "10", U_KG), "SALE")],
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INSUFFICIENT_QUANTITY");
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.store.batch(42).unwrap().quantity, Decimal::from(5_000));
    assert!(h.store.audits().is_empty());
    assert_eq!(h.store.commits(), 0);
    assert_eq!(h.store.rollbacks(), 1);
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_recipe_increment_consumes_ingredient() {
    let store = InMemoryStore::new();
    store.add_variant(meta("COMP", U_PIECE, "3", 10));
    store.add_batch(WAREHOUSE, batch(7, "ING", "100", U_G));
    let recipes = InMemoryRecipes::default().with_edge(
        RecipeEdge {
            result_sku: "COMP".into(),
            ingredient_sku: "ING".into(),
            quantity: Decimal::from(2),
            unit_id: U_G,
        },
        meta("ING", U_G, "0.25", 90),
    );
    let h = harness(store, recipes).await;

    h.service
        .increment_with_recipe(WAREHOUSE, ACTOR, vec![mutation("COMP", None, "5", U_PIECE)])
        .await
        .unwrap();

    let comp = h.store.batches_of("COMP");
    assert_eq!(comp.len(), 1);
    assert_eq!(comp[0].quantity, Decimal::from(5));
    assert_eq!(h.store.batch(7).unwrap().quantity, Decimal::from(90));

    let audits = h.store.audits();
    let reasons: Vec<&str> = audits.iter().map(|a| a.reason.as_str()).collect();
    assert_eq!(reasons, vec!["RESTOCK", "RECIPE_USE"]);
    let usage = &audits[1];
    assert_eq!(usage.batch_id, Some(7));
    assert_eq!(usage.quantity, Decimal::from(10));
    assert_eq!(usage.direction, StockDirection::Outbound);
    // 原料成本取原料自身单价
    assert_eq!(usage.cost, dec("2.5"));
    assert_eq!(usage.comment.as_deref(), Some("Used for COMP"));

    // 批次变化量之和等于流水有符号数量之和
    let audited: Decimal = audits.iter().map(|a| a.signed_quantity()).sum();
    assert_eq!(audited, Decimal::from(5 - 10));
    assert_eq!(h.store.commits(), 1);
}

#[tokio::test]
async fn test_recipe_shortage_rolls_back_everything() {
    let store = InMemoryStore::new();
    store.add_variant(meta("COMP", U_PIECE, "3", 10));
    store.add_batch(WAREHOUSE, batch(7, "ING", "4", U_G));
    let recipes = InMemoryRecipes::default().with_edge(
        RecipeEdge {
            result_sku: "COMP".into(),
            ingredient_sku: "ING".into(),
            quantity: Decimal::from(2),
            unit_id: U_G,
        },
        meta("ING", U_G, "0.25", 90),
    );
    let h = harness(store, recipes).await;

    let err = h
        .service
        .increment_with_recipe(WAREHOUSE, ACTOR, vec![mutation("COMP", None, "5", U_PIECE)])
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INSUFFICIENT_INGREDIENT");
    assert!(h.store.batches_of("COMP").is_empty());
    assert_eq!(h.store.batch(7).unwrap().quantity, Decimal::from(4));
    assert!(h.store.audits().is_empty());
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_recipe_uses_ingredient_restocked_in_same_call() {
    let store = InMemoryStore::new();
    store.add_variant(meta("COMP", U_PIECE, "3", 10));
    store.add_variant(meta("ING", U_G, "0.25", 90));
    store.add_batch(WAREHOUSE, batch(7, "ING", "0", U_G));
    let recipes = InMemoryRecipes::default().with_edge(
        RecipeEdge {
            result_sku: "COMP".into(),
            ingredient_sku: "ING".into(),
            quantity: Decimal::from(2),
            unit_id: U_G,
        },
        meta("ING", U_G, "0.25", 90),
    );
    let h = harness(store, recipes).await;

    // 空批次先补货，再被同一次调用的配方扣减
    h.service
        .increment_with_recipe(
            WAREHOUSE,
            ACTOR,
            vec![
                mutation("ING", Some(7), "100", U_G),
                mutation("COMP", None, "5", U_PIECE),
            ],
        )
        .await
        .unwrap();

    assert_eq!(h.store.batch(7).unwrap().quantity, Decimal::from(90));
    let comp = h.store.batches_of("COMP");
    assert_eq!(comp.len(), 1);
    assert_eq!(comp[0].quantity, Decimal::from(5));

    let audits = h.store.audits();
    let usage = audits
        .iter()
        .find(|a| a.reason == "RECIPE_USE")
        .unwrap();
    assert_eq!(usage.batch_id, Some(7));
    assert_eq!(usage.quantity, Decimal::from(10));
    let audited: Decimal = audits
        .iter()
        .filter(|a| a.batch_id == Some(7))
        .map(|a| a.signed_quantity())
        .sum();
    assert_eq!(audited, Decimal::from(90));
    assert_eq!(h.store.commits(), 1);
}

#[tokio::test]
async fn test_concurrent_decrements_serialize() {
    let store = sku_a_store();
    store.add_batch(WAREHOUSE, batch(42, "SKU-A", "5", U_G));
    let h = harness(store, InMemoryRecipes::default()).await;

    let spawn_decrement = || {
        let service = h.service.clone();
        tokio::spawn(async move {
            service
                .decrement(
                    WAREHOUSE,
                    ACTOR,
                    vec![mutation("SKU-A", Some(42), "3", U_G)],
                )
                .await
        })
    };
    let (first, second) = tokio::join!(spawn_decrement(), spawn_decrement());
    let results = [first.unwrap(), second.unwrap()];

    let committed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1);
    let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(failure.code(), "INSUFFICIENT_QUANTITY");

    assert_eq!(h.store.batch(42).unwrap().quantity, Decimal::from(2));
    assert_eq!(h.store.audits().len(), 1);
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_missing_conversion_is_rejected() {
    let store = sku_a_store();
    store.add_batch(WAREHOUSE, batch(42, "SKU-A", "5000", U_G));
    let h = harness(store, InMemoryRecipes::default()).await;

    let err = h
        .service
        .decrement(
            WAREHOUSE,
            ACTOR,
            vec![mutation("SKU-A", Some(42), "1", U_PIECE)],
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "UNIT_CONVERSION_MISSING");
    assert_eq!(h.store.batch(42).unwrap().quantity, Decimal::from(5_000));
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_batch_of_other_scope_is_not_found() {
    let store = sku_a_store();
    store.add_batch(Scope::Warehouse(2), batch(42, "SKU-A", "5000", U_G));
    let h = harness(store, InMemoryRecipes::default()).await;

    let err = h
        .service
        .decrement(WAREHOUSE, ACTOR, vec![mutation("SKU-A", Some(42), "1", U_G)])
        .await
        .unwrap_err();

    assert_eq!(err.code(), "BATCH_NOT_FOUND");
    assert_eq!(h.store.batch(42).unwrap().quantity, Decimal::from(5_000));
}

#[tokio::test]
async fn test_batch_deleted_before_write_rolls_back() {
    let store = sku_a_store();
    store.add_batch(WAREHOUSE, batch(42, "SKU-A", "5000", U_G));
    store.vanish_on_apply(42);
    let h = harness(store, InMemoryRecipes::default()).await;

    let err = h
        .service
        .decrement(WAREHOUSE, ACTOR, vec![mutation("SKU-A", Some(42), "1", U_G)])
        .await
        .unwrap_err();

    assert_eq!(err.code(), "BATCH_MISSING");
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.store.batch(42).unwrap().quantity, Decimal::from(5_000));
    assert!(h.store.audits().is_empty());
    assert_eq!(h.store.commits(), 0);
    assert_eq!(h.store.rollbacks(), 1);
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_invalid_request_takes_no_locks() {
    let h = harness(sku_a_store(), InMemoryRecipes::default()).await;

    let err = h
        .service
        .increment(WAREHOUSE, ACTOR, vec![mutation("SKU-A", None, "0", U_G)])
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_INPUT");
    assert_eq!(h.store.rollbacks(), 0);
    assert_eq!(h.store.commits(), 0);
    assert_eq!(h.locks.held_keys(), 0);
}

#[tokio::test]
async fn test_forward_pagination_over_25_batches() {
    let store = sku_a_store();
    for i in 0..25i64 {
        let mut row = batch(100 + i, "SKU-A", "1", U_G);
        // 相邻两行共用过期日，验证 id 作为次序键
        row.expires_at = date(2027, 1, 1) + TimeDelta::days(i / 2);
        store.add_batch(WAREHOUSE, row);
    }
    let h = harness(store, InMemoryRecipes::default()).await;

    let mut sizes = Vec::new();
    let mut has_next = Vec::new();
    let mut seen: Vec<OrderKey> = Vec::new();
    let mut request = PageRequest::first(10);
    loop {
        let query = BatchPageQuery::new(BatchFilter::default(), request.clone()).unwrap();
        let page = h.service.list(WAREHOUSE, query).await.unwrap();
        sizes.push(page.items.len());
        has_next.push(page.has_next);

        if let Some(raw) = page.next_cursor.as_deref() {
            let decoded = OrderKey::from_cursor(&Cursor::decode(raw).unwrap()).unwrap();
            assert_eq!(decoded, page.items.last().unwrap().order_key());
        }
        seen.extend(page.items.iter().map(|view| view.order_key()));

        match page.next_cursor {
            Some(raw) => request = PageRequest::after(10, Cursor::decode(&raw).unwrap()),
            None => break,
        }
    }

    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(has_next, vec![true, true, false]);
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted);
    sorted.dedup();
    assert_eq!(sorted.len(), 25);
}

fn page_ids(page: &stockpile_common::Page<batch_stock::domain::BatchView>) -> Vec<i64> {
    page.items.iter().map(|view| view.id).collect()
}

fn cursor_of(raw: &Option<String>) -> Cursor {
    Cursor::decode(raw.as_deref().unwrap()).unwrap()
}

fn warehouse_with_25_batches() -> InMemoryStore {
    let store = sku_a_store();
    for i in 0..25i64 {
        let mut row = batch(100 + i, "SKU-A", "1", U_G);
        row.expires_at = date(2027, 1, 1) + TimeDelta::days(i / 2);
        store.add_batch(WAREHOUSE, row);
    }
    store
}

#[tokio::test]
async fn test_backward_page_returns_previous_rows_in_order() {
    let h = harness(warehouse_with_25_batches(), InMemoryRecipes::default()).await;
    let list = |request: PageRequest| {
        let service = h.service.clone();
        async move {
            let query = BatchPageQuery::new(BatchFilter::default(), request).unwrap();
            service.list(WAREHOUSE, query).await.unwrap()
        }
    };

    let first = list(PageRequest::first(10)).await;
    let second = list(PageRequest::after(10, cursor_of(&first.next_cursor))).await;
    assert_eq!(page_ids(&second), (110..120).collect::<Vec<_>>());
    assert!(second.has_prev);

    let back = list(
        PageRequest::after(10, cursor_of(&second.prev_cursor))
            .with_direction(PageDirection::Backward),
    )
    .await;
    assert_eq!(page_ids(&back), page_ids(&first));
    assert!(back.has_next);
    assert!(!back.has_prev);
    assert!(back.prev_cursor.is_none());
}

#[tokio::test]
async fn test_refresh_page_includes_cursor_row() {
    let h = harness(warehouse_with_25_batches(), InMemoryRecipes::default()).await;

    let first = h
        .service
        .list(
            WAREHOUSE,
            BatchPageQuery::new(BatchFilter::default(), PageRequest::first(10)).unwrap(),
        )
        .await
        .unwrap();
    let second = h
        .service
        .list(
            WAREHOUSE,
            BatchPageQuery::new(
                BatchFilter::default(),
                PageRequest::after(10, cursor_of(&first.next_cursor)),
            )
            .unwrap(),
        )
        .await
        .unwrap();

    // 以本页首行为游标重新拉取同一页
    let anchor = second.items[0].order_key().to_cursor();
    let refreshed = h
        .service
        .list(
            WAREHOUSE,
            BatchPageQuery::new(
                BatchFilter::default(),
                PageRequest::after(10, anchor).with_direction(PageDirection::Refresh),
            )
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(page_ids(&refreshed), page_ids(&second));
    assert!(refreshed.has_next);
    assert!(refreshed.has_prev);
}

#[tokio::test]
async fn test_retailer_listing_is_newest_expiry_first() {
    let retailer = Scope::Retailer(5);
    let store = sku_a_store();
    for i in 0..5i64 {
        let mut row = batch(200 + i, "SKU-A", "1", U_G);
        row.expires_at = date(2027, 1, 1) + TimeDelta::days(i / 2);
        store.add_batch(retailer, row);
    }
    store.add_batch(WAREHOUSE, batch(999, "SKU-A", "1", U_G));
    let h = harness(store, InMemoryRecipes::default()).await;
    let list = |request: PageRequest| {
        let service = h.service.clone();
        async move {
            let query = BatchPageQuery::new(BatchFilter::default(), request).unwrap();
            service.list(retailer, query).await.unwrap()
        }
    };

    let first = list(PageRequest::first(2)).await;
    assert_eq!(page_ids(&first), vec![204, 203]);
    assert!(first.has_next);
    assert!(!first.has_prev);

    let second = list(PageRequest::after(2, cursor_of(&first.next_cursor))).await;
    assert_eq!(page_ids(&second), vec![202, 201]);

    let third = list(PageRequest::after(2, cursor_of(&second.next_cursor))).await;
    assert_eq!(page_ids(&third), vec![200]);
    assert!(!third.has_next);

    let back = list(
        PageRequest::after(2, cursor_of(&second.prev_cursor)).with_direction(PageDirection::Backward),
    )
    .await;
    assert_eq!(page_ids(&back), vec![204, 203]);
    assert!(!back.has_prev);
}

#[tokio::test]
async fn test_get_by_id_outside_scope_is_not_found() {
    let store = sku_a_store();
    store.add_batch(WAREHOUSE, batch(42, "SKU-A", "5000", U_G));
    let h = harness(store, InMemoryRecipes::default()).await;

    let view = h.service.get_by_id(WAREHOUSE, 42, None).await.unwrap();
    assert_eq!(view.quantity, Decimal::from(5_000));

    let err = h
        .service
        .get_by_id(Scope::Retailer(1), 42, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BATCH_NOT_FOUND");
}
