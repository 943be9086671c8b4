//! Tests for the queue engine.

use super::*;
use crate::model::QueueDefinition;
use norq_store::InMemoryStore;
use serde_json::json;

fn work_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "description": { "type": "string" },
            "quantity": { "type": "number" }
        },
        "required": ["description", "quantity"]
    })
}

fn test_registry() -> ModelRegistry {
    ModelRegistry::new(vec![
        QueueDefinition::new("q"),
        QueueDefinition::new("other"),
        QueueDefinition::new("work").with_schema(work_schema()),
    ])
    .unwrap()
}

/// Engine over a fresh in-memory store, plus a handle to that store
fn create_engine() -> (QueueEngine, InMemoryStore) {
    let store = InMemoryStore::new();
    let engine = QueueEngine::new(test_registry(), Arc::new(store.clone()));
    (engine, store)
}

fn values(documents: &[Document]) -> Vec<Value> {
    documents
        .iter()
        .map(|document| document.to_value().unwrap())
        .collect()
}

async fn push_ids(engine: &QueueEngine, queue: &str, ids: &[&str]) {
    for id in ids {
        engine.push(queue, json!({ "_id": id })).await.unwrap();
    }
}

// ============================================================================
// Push Tests
// ============================================================================

mod push {
    use super::*;

    #[tokio::test]
    async fn test_push_then_get_round_trip() {
        let (engine, _) = create_engine();

        let receipt = engine
            .push("q", json!({"description": "x", "nested": {"n": [1, 2]}}))
            .await
            .unwrap();

        let id = receipt.id.as_str().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok(), "generated id is not a uuid: {id}");
        assert_eq!(receipt.status, vec![Reply::Integer(1), Reply::ok()]);

        let document = engine.get("q", &id).await.unwrap().unwrap();
        assert_eq!(
            document.to_value().unwrap(),
            json!({"_id": id, "description": "x", "nested": {"n": [1, 2]}})
        );
    }

    #[tokio::test]
    async fn test_receipt_serializes_with_raw_replies() {
        let (engine, _) = create_engine();

        let receipt = engine.push("q", json!({"_id": "a"})).await.unwrap();

        assert_eq!(
            serde_json::to_value(&receipt).unwrap(),
            json!({"_id": "a", "status": [1, "OK"]})
        );
    }

    #[tokio::test]
    async fn test_supplied_ids_are_kept() {
        let (engine, _) = create_engine();

        let receipt = engine.push("q", json!({"_id": 42, "n": 1})).await.unwrap();
        assert_eq!(receipt.id, json!(42));
        assert_eq!(
            engine.get("q", "42").await.unwrap().unwrap().to_value().unwrap(),
            json!({"_id": 42, "n": 1})
        );
    }

    #[tokio::test]
    async fn test_null_and_empty_ids_are_generated() {
        let (engine, _) = create_engine();

        for payload in [json!({"_id": null}), json!({"_id": ""})] {
            let receipt = engine.push("q", payload).await.unwrap();
            let id = receipt.id.as_str().unwrap();
            assert!(Uuid::parse_str(id).is_ok());
        }
        assert_eq!(engine.size("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_text_payload_is_parsed() {
        let (engine, _) = create_engine();

        let receipt = engine.push("q", r#"{"_id":"t","v":true}"#).await.unwrap();
        assert_eq!(receipt.id, json!("t"));
        assert_eq!(
            engine.get("q", "t").await.unwrap().unwrap().to_value().unwrap(),
            json!({"_id": "t", "v": true})
        );
    }

    #[tokio::test]
    async fn test_non_object_payloads_are_rejected() {
        let (engine, _) = create_engine();

        let cases: Vec<Payload> = vec![
            Payload::from("{broken"),
            Payload::from("[1, 2]"),
            Payload::from(json!(null)),
            Payload::from(json!([{"_id": "a"}])),
            Payload::from(json!("text")),
        ];
        for payload in cases {
            let result = engine.push("q", payload.clone()).await;
            assert!(
                matches!(result, Err(NorqError::DataNotObject)),
                "{payload:?} should be rejected"
            );
        }
        assert_eq!(engine.size("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_id_type_is_rejected() {
        let (engine, _) = create_engine();

        let result = engine.push("q", json!({"_id": {"nested": true}})).await;

        assert!(matches!(result, Err(NorqError::InvalidId { .. })));
        assert_eq!(engine.size("q").await.unwrap(), 0);
    }

    /// Verify the schema scenario: a valid push lands, an invalid one reports
    /// every violation and leaves the queue unchanged.
    #[tokio::test]
    async fn test_schema_validation_precedes_mutation() {
        let (engine, store) = create_engine();

        engine
            .push("work", json!({"description": "x", "quantity": 1}))
            .await
            .unwrap();
        assert_eq!(engine.size("work").await.unwrap(), 1);

        let error = engine
            .push("work", json!({"quantity": "bad"}))
            .await
            .unwrap_err();

        let NorqError::SchemaValidation { queue_name, issues } = error else {
            panic!("expected schema validation error");
        };
        assert_eq!(queue_name, "work");
        assert_eq!(issues.len(), 2, "unexpected issues: {issues:?}");
        assert!(issues.iter().any(|issue| issue.message.contains("description")));
        assert!(issues.iter().any(|issue| issue.property == "/quantity"));

        assert_eq!(engine.size("work").await.unwrap(), 1);
        assert_eq!(store.key_count().await, 2);
    }

    /// Verify that a duplicate id is refused and its value key rolled back.
    #[tokio::test]
    async fn test_duplicate_id_is_rejected_and_rolled_back() {
        let (engine, _) = create_engine();
        engine.push("q", json!({"_id": "a", "v": 1})).await.unwrap();

        let error = engine
            .push("q", json!({"_id": "a", "v": 2}))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            NorqError::InsertRejected { ref id, reply: Reply::Integer(0), .. } if id == "a"
        ));
        assert_eq!(error.name(), "BackingStoreError");
        assert_eq!(engine.size("q").await.unwrap(), 1);
        assert!(engine.get("q", "a").await.unwrap().is_none());
    }
}

// ============================================================================
// Queue Resolution Tests
// ============================================================================

mod queue_resolution {
    use super::*;

    fn assert_not_found<T: std::fmt::Debug>(result: NorqResult<T>) {
        assert!(
            matches!(result, Err(NorqError::QueueNotFound { ref queue_name }) if queue_name == "nope"),
            "expected QueueNotFound, got {result:?}"
        );
    }

    /// Verify that every operation rejects an unknown queue.
    #[tokio::test]
    async fn test_unknown_queue_is_rejected_by_every_operation() {
        let (engine, store) = create_engine();

        assert_not_found(engine.push("nope", "{not json").await);
        assert_not_found(engine.peek("nope").await);
        assert_not_found(engine.pop("nope").await);
        assert_not_found(engine.size("nope").await);
        assert_not_found(engine.range("nope", 0, -1).await);
        assert_not_found(engine.head("nope", 0).await);
        assert_not_found(engine.tail("nope", 0).await);
        assert_not_found(engine.page("nope", 0, 0).await);
        assert_not_found(engine.get("nope", "a").await);
        assert_not_found(engine.set("nope", "a", json!([])).await);
        assert_not_found(engine.remove("nope", "a").await);
        assert_not_found(engine.flush(FlushTarget::from("nope")).await);
        assert_not_found(engine.definition("nope"));

        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_definition_of_known_queue() {
        let (engine, _) = create_engine();

        let definition = engine.definition("work").unwrap();
        assert_eq!(definition.name, "work");
        assert_eq!(definition.schema, Some(work_schema()));
    }

    /// Verify that a swapped registry takes effect while sharing the store.
    #[tokio::test]
    async fn test_with_registry_swaps_model() {
        let (engine, _) = create_engine();
        engine.push("q", json!({"_id": "a"})).await.unwrap();

        let swapped = engine.with_registry(
            ModelRegistry::new(vec![QueueDefinition::new("q"), QueueDefinition::new("fresh")])
                .unwrap(),
        );

        assert!(swapped.size("fresh").await.is_ok());
        assert!(swapped.size("work").await.is_err());
        assert_eq!(swapped.size("q").await.unwrap(), 1);
        assert!(engine.size("fresh").await.is_err());
    }
}

// ============================================================================
// Window Tests
// ============================================================================

mod windows {
    use super::*;

    #[tokio::test]
    async fn test_range_returns_push_order() {
        let (engine, _) = create_engine();
        push_ids(&engine, "q", &["e", "d", "c", "b", "a"]).await;

        let documents = engine.range("q", 0, 4).await.unwrap();

        assert_eq!(
            values(&documents),
            vec![
                json!({"_id": "e"}),
                json!({"_id": "d"}),
                json!({"_id": "c"}),
                json!({"_id": "b"}),
                json!({"_id": "a"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_range_with_negative_positions() {
        let (engine, _) = create_engine();
        push_ids(&engine, "q", &["a", "b", "c"]).await;

        let documents = engine.range("q", -2, -1).await.unwrap();
        assert_eq!(values(&documents), vec![json!({"_id": "b"}), json!({"_id": "c"})]);
    }

    #[tokio::test]
    async fn test_head() {
        let (engine, _) = create_engine();
        assert!(engine.head("q", 3).await.unwrap().is_empty());

        push_ids(&engine, "q", &["a", "b", "c"]).await;

        assert!(engine.head("q", 0).await.unwrap().is_empty());
        assert_eq!(
            values(&engine.head("q", 2).await.unwrap()),
            vec![json!({"_id": "a"}), json!({"_id": "b"})]
        );
        assert_eq!(engine.head("q", u64::MAX).await.unwrap().len(), 3);
    }

    /// Verify that tail returns the newest documents first.
    #[tokio::test]
    async fn test_tail_is_reversed() {
        let (engine, _) = create_engine();
        push_ids(&engine, "q", &["a", "b", "c", "d"]).await;

        assert_eq!(
            values(&engine.tail("q", 2).await.unwrap()),
            vec![json!({"_id": "d"}), json!({"_id": "c"})]
        );
        assert!(engine.tail("q", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tail_larger_than_queue_returns_everything() {
        let (engine, _) = create_engine();
        assert!(engine.tail("q", 5).await.unwrap().is_empty());

        push_ids(&engine, "q", &["a", "b"]).await;

        assert_eq!(
            values(&engine.tail("q", 10).await.unwrap()),
            vec![json!({"_id": "b"}), json!({"_id": "a"})]
        );
    }

    #[tokio::test]
    async fn test_pages_are_one_indexed() {
        let (engine, _) = create_engine();
        push_ids(&engine, "q", &["a", "b", "c", "d", "e"]).await;

        assert_eq!(
            values(&engine.page("q", 1, 2).await.unwrap()),
            vec![json!({"_id": "a"}), json!({"_id": "b"})]
        );
        assert_eq!(
            values(&engine.page("q", 3, 2).await.unwrap()),
            vec![json!({"_id": "e"})]
        );
        assert!(engine.page("q", 4, 2).await.unwrap().is_empty());
        assert!(engine.page("q", 0, 2).await.unwrap().is_empty());
        assert!(engine.page("q", 1, 0).await.unwrap().is_empty());
        assert!(engine.page("q", u64::MAX, u64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_range_skips_missing_values() {
        let (engine, store) = create_engine();
        push_ids(&engine, "q", &["a", "b", "c"]).await;
        store.value_delete(&["q:b".to_string()]).await.unwrap();

        let documents = engine.range("q", 0, -1).await.unwrap();
        assert_eq!(values(&documents), vec![json!({"_id": "a"}), json!({"_id": "c"})]);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_reported() {
        let (engine, store) = create_engine();
        store.ordered_insert("q", 1, "bad").await.unwrap();
        store.value_set("q:bad", "not json").await.unwrap();

        assert!(matches!(
            engine.range("q", 0, -1).await,
            Err(NorqError::CorruptDocument { ref key }) if key == "q:bad"
        ));
        assert!(matches!(
            engine.get("q", "bad").await,
            Err(NorqError::CorruptDocument { .. })
        ));
    }

    /// Verify that store type errors surface as backing store errors.
    #[tokio::test]
    async fn test_wrong_type_is_a_store_error() {
        let (engine, store) = create_engine();
        store.value_set("q", "plain").await.unwrap();

        let error = engine.size("q").await.unwrap_err();
        assert!(matches!(error, NorqError::Store(StoreError::WrongType { .. })));
        assert_eq!(error.name(), "BackingStoreError");
    }
}

// ============================================================================
// Peek, Pop and Remove Tests
// ============================================================================

mod consumption {
    use super::*;

    #[tokio::test]
    async fn test_peek_does_not_remove() {
        let (engine, _) = create_engine();
        assert!(engine.peek("q").await.unwrap().is_none());

        push_ids(&engine, "q", &["a", "b"]).await;

        let first = engine.peek("q").await.unwrap().unwrap();
        assert_eq!(first.to_value().unwrap(), json!({"_id": "a"}));
        assert_eq!(engine.size("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pop_removes_oldest() {
        let (engine, store) = create_engine();
        push_ids(&engine, "q", &["a", "b"]).await;

        let popped = engine.pop("q").await.unwrap().unwrap();
        assert_eq!(popped.to_value().unwrap(), json!({"_id": "a"}));
        assert_eq!(engine.size("q").await.unwrap(), 1);
        assert!(!store.contains_key("q:a").await);

        let popped = engine.pop("q").await.unwrap().unwrap();
        assert_eq!(popped.to_value().unwrap(), json!({"_id": "b"}));
        assert!(engine.pop("q").await.unwrap().is_none());
        assert_eq!(store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_then_get_is_absent() {
        let (engine, _) = create_engine();
        engine.push("q", json!({"_id": "a"})).await.unwrap();

        let replies = engine.remove("q", "a").await.unwrap();

        assert_eq!(replies, vec![Reply::Integer(1), Reply::Integer(1)]);
        assert!(engine.get("q", "a").await.unwrap().is_none());
        assert_eq!(engine.size("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_absent_id_is_a_no_op() {
        let (engine, _) = create_engine();

        let replies = engine.remove("q", "ghost").await.unwrap();
        assert_eq!(replies, vec![Reply::Integer(0), Reply::Integer(0)]);
    }
}

// ============================================================================
// Set Tests
// ============================================================================

mod set {
    use super::*;

    /// Verify that set overwrites in place without changing position.
    #[tokio::test]
    async fn test_set_never_reorders() {
        let (engine, _) = create_engine();
        push_ids(&engine, "q", &["a", "b", "c"]).await;

        let receipt = engine
            .set("q", "a", json!({"_id": "a", "updated": true}))
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&receipt).unwrap(),
            json!({"_id": "a", "status": "OK"})
        );
        assert_eq!(
            values(&engine.range("q", 0, -1).await.unwrap()),
            vec![
                json!({"_id": "a", "updated": true}),
                json!({"_id": "b"}),
                json!({"_id": "c"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_mismatched_id_is_rejected() {
        let (engine, _) = create_engine();

        let result = engine.set("q", "5", json!({"_id": 7})).await;
        assert!(matches!(result, Err(NorqError::InvalidId { ref id }) if id == "5"));

        let result = engine.set("q", "5", json!({"value": 1})).await;
        assert!(matches!(result, Err(NorqError::InvalidId { .. })));
    }

    #[tokio::test]
    async fn test_numeric_id_matches_its_rendering() {
        let (engine, _) = create_engine();

        engine.set("q", "5", json!({"_id": 5})).await.unwrap();
        assert!(engine.get("q", "5").await.unwrap().is_some());
    }

    /// Verify that set on a never-pushed id creates an unindexed value.
    #[tokio::test]
    async fn test_set_does_not_touch_the_index() {
        let (engine, _) = create_engine();

        engine.set("q", "solo", json!({"_id": "solo"})).await.unwrap();

        assert!(engine.get("q", "solo").await.unwrap().is_some());
        assert_eq!(engine.size("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_validates_payload_and_schema() {
        let (engine, _) = create_engine();

        assert!(matches!(
            engine.set("q", "a", "nope").await,
            Err(NorqError::DataNotObject)
        ));
        assert!(matches!(
            engine.set("work", "a", json!({"_id": "a"})).await,
            Err(NorqError::SchemaValidation { .. })
        ));
    }
}

// ============================================================================
// Flush Tests
// ============================================================================

mod flush {
    use super::*;

    #[tokio::test]
    async fn test_flush_queue_leaves_other_queues() {
        let (engine, store) = create_engine();
        push_ids(&engine, "q", &["a", "b"]).await;
        push_ids(&engine, "other", &["x"]).await;

        let outcome = engine.flush(FlushTarget::from("q")).await.unwrap();

        assert_eq!(outcome, FlushOutcome::Queue(2));
        assert_eq!(engine.size("q").await.unwrap(), 0);
        assert!(!store.contains_key("q").await);
        assert_eq!(engine.size("other").await.unwrap(), 1);
        assert!(store.contains_key("other:x").await);
    }

    #[tokio::test]
    async fn test_flush_all() {
        let (engine, store) = create_engine();
        push_ids(&engine, "q", &["a"]).await;
        push_ids(&engine, "other", &["x"]).await;

        let outcome = engine.flush(FlushTarget::All).await.unwrap();

        assert_eq!(outcome, FlushOutcome::All(true));
        assert_eq!(store.key_count().await, 0);
        assert_eq!(serde_json::to_value(outcome).unwrap(), json!(true));
    }

    #[test]
    fn test_flush_target_parsing() {
        assert_eq!(FlushTarget::from("all"), FlushTarget::All);
        assert_eq!(FlushTarget::from("q"), FlushTarget::Queue("q".to_string()));
    }
}

// ============================================================================
// Score Clock Tests
// ============================================================================

mod score_clock {
    use super::*;

    #[test]
    fn test_scores_follow_the_wall_clock() {
        let clock = ScoreClock::new();
        assert_eq!(clock.next_after(100), 100);
        assert_eq!(clock.next_after(250), 250);
    }

    /// Verify that scores never repeat or go backwards.
    #[test]
    fn test_scores_are_strictly_increasing() {
        let clock = ScoreClock::new();
        assert_eq!(clock.next_after(100), 100);
        assert_eq!(clock.next_after(100), 101);
        assert_eq!(clock.next_after(50), 102);
    }

    #[test]
    fn test_real_clock_is_monotonic() {
        let clock = ScoreClock::new();
        let scores: Vec<Score> = (0..100).map(|_| clock.next()).collect();
        assert!(scores.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

// ============================================================================
// Store Failure Tests
// ============================================================================

mod store_failures {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub TestStore {}

        #[async_trait]
        impl Store for TestStore {
            async fn ordered_insert(&self, key: &str, score: Score, member: &str) -> Result<i64, StoreError>;
            async fn ordered_range(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>, StoreError>;
            async fn ordered_cardinality(&self, key: &str) -> Result<u64, StoreError>;
            async fn ordered_remove(&self, key: &str, member: &str) -> Result<i64, StoreError>;
            async fn value_set(&self, key: &str, value: &str) -> Result<Reply, StoreError>;
            async fn value_get(&self, key: &str) -> Result<Option<String>, StoreError>;
            async fn value_multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;
            async fn value_delete(&self, keys: &[String]) -> Result<i64, StoreError>;
            async fn execute_atomic(&self, ops: Vec<BatchOp>) -> Result<Vec<Reply>, StoreError>;
            async fn flush_all(&self) -> Result<(), StoreError>;
            async fn ping(&self) -> Result<(), StoreError>;
            fn provider_type(&self) -> ProviderType;
        }
    }

    fn engine_with(store: MockTestStore) -> QueueEngine {
        QueueEngine::new(test_registry(), Arc::new(store))
    }

    /// Verify that a rejected insert triggers exactly one compensating delete.
    #[tokio::test]
    async fn test_rejected_insert_rolls_back_value() {
        let mut store = MockTestStore::new();
        store
            .expect_execute_atomic()
            .times(1)
            .returning(|_| Ok(vec![Reply::Integer(0), Reply::ok()]));
        store
            .expect_value_delete()
            .withf(|keys: &[String]| keys == ["q:a".to_string()])
            .times(1)
            .returning(|_| Ok(1));

        let error = engine_with(store)
            .push("q", json!({"_id": "a"}))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            NorqError::InsertRejected { reply: Reply::Integer(0), .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_rollback_still_reports_rejection() {
        let mut store = MockTestStore::new();
        store
            .expect_execute_atomic()
            .returning(|_| Ok(vec![Reply::Integer(0), Reply::ok()]));
        store.expect_value_delete().times(1).returning(|_| {
            Err(StoreError::ConnectionFailed {
                message: "gone".to_string(),
            })
        });

        let result = engine_with(store).push("q", json!({"_id": "a"})).await;
        assert!(matches!(result, Err(NorqError::InsertRejected { .. })));
    }

    #[tokio::test]
    async fn test_batch_failure_is_surfaced() {
        let mut store = MockTestStore::new();
        store.expect_execute_atomic().returning(|_| {
            Err(StoreError::ConnectionFailed {
                message: "refused".to_string(),
            })
        });

        let error = engine_with(store)
            .push("q", json!({"_id": "a"}))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            NorqError::Store(StoreError::ConnectionFailed { .. })
        ));
        assert!(error.is_transient());
    }

    /// Verify that the push batch pairs the index insert with the value write.
    #[tokio::test]
    async fn test_push_batch_shape() {
        let mut store = MockTestStore::new();
        store
            .expect_execute_atomic()
            .withf(|ops: &Vec<BatchOp>| {
                matches!(
                    ops.as_slice(),
                    [
                        BatchOp::OrderedInsert { key, member, .. },
                        BatchOp::ValueSet { key: value_key, value },
                    ] if key == "q" && member == "a" && value_key == "q:a" && value == r#"{"_id":"a"}"#
                )
            })
            .times(1)
            .returning(|_| Ok(vec![Reply::Integer(1), Reply::ok()]));

        let receipt = engine_with(store)
            .push("q", json!({"_id": "a"}))
            .await
            .unwrap();
        assert_eq!(receipt.id, json!("a"));
    }

    #[tokio::test]
    async fn test_unknown_queue_never_reaches_the_store() {
        // No expectations: any store call would panic
        let engine = engine_with(MockTestStore::new());

        assert!(matches!(
            engine.push("nope", json!({})).await,
            Err(NorqError::QueueNotFound { .. })
        ));
        assert!(matches!(
            engine.flush(FlushTarget::from("nope")).await,
            Err(NorqError::QueueNotFound { .. })
        ));
    }
}
