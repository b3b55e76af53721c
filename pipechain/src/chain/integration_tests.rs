//! End-to-end tests across compilation, run tracking and local execution.

#[cfg(test)]
mod tests {
    use crate::chain::{Barrier, CompileRequest};
    use crate::config::{InMemoryConfigService, RETRY_TASK_PATH};
    use crate::dispatch::{BatchRequest, ChainStatus, TaskExecutionService, TaskRunner};
    use crate::graph::ExecutionGraphBuilder;
    use crate::run::{LoadOptions, ResultStatus, RunState};
    use crate::testing::{
        diamond_config, fan_in_config, sample_config, FlakyHandler, RecordingExecutionService,
        RecordingHandler, TestEngine,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn register_recorder(engine: &TestEngine, nodes: &[&str]) -> Arc<RecordingHandler> {
        let recorder = Arc::new(RecordingHandler::new());
        for node in nodes {
            engine.registry.register_arc(format!("tasks.{node}"), recorder.clone());
        }
        recorder
    }

    fn position(paths: &[String], path: &str) -> usize {
        paths.iter().position(|p| p == path).unwrap()
    }

    #[tokio::test]
    async fn test_fan_in_compiles_to_six_steps() {
        let config = fan_in_config("fan-in");
        let graph = ExecutionGraphBuilder::build(&config).unwrap();
        assert_eq!(
            graph.chainable_groups().into_inner(),
            vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]
        );

        let engine = TestEngine::new();
        let chain = engine
            .compiler
            .compile(CompileRequest::fresh("fan-in", config))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(chain.len(), 6);
        assert_eq!(chain.barriers().map(Barrier::len).collect::<Vec<_>>(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_retry_loads_deadletter_at_ceiling() {
        let engine = TestEngine::new();
        let mut first = RunState::create(
            engine.cache.clone(),
            "p",
            sample_config("p").with_max_retry(2),
            Some("e-1".into()),
            60,
            2,
            None,
        );
        first.load(LoadOptions::default()).await;
        assert!(first.good_to_go());

        let mut good_to_go = Vec::new();
        for _ in 0..3 {
            let mut retry = RunState::for_execution(engine.cache.clone(), "p", "e-1");
            retry.load(LoadOptions::retry()).await;
            good_to_go.push(retry.good_to_go());
        }
        assert_eq!(good_to_go, vec![true, false, false]);

        let result = engine.results().load("e-1").await.unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
    }

    #[tokio::test]
    async fn test_batch_of_twelve_splits_five_five_two() {
        let service = Arc::new(RecordingExecutionService::new());
        let runner = TaskRunner::new(service.clone(), &TestEngine::new().settings);
        let payloads: Vec<Value> = (0..12).map(|i| json!({ "id": i })).collect();

        let count = runner
            .publish_batch(BatchRequest::new("tasks.bulk", "bulk-q", payloads))
            .await
            .unwrap();

        assert_eq!(count, 3);
        let sizes: Vec<usize> = service
            .published()
            .iter()
            .map(|sig| sig.event().get("tasks").and_then(Value::as_array).map_or(0, Vec::len))
            .collect();
        assert_eq!(sizes, vec![5, 5, 2]);
    }

    #[tokio::test]
    async fn test_compile_retry_honours_cached_count() {
        let engine = TestEngine::new();
        let chain = engine
            .compiler
            .compile(CompileRequest::fresh("p", sample_config("p").with_max_retry(2)))
            .await
            .unwrap()
            .unwrap();

        let (retry, run) = engine
            .compiler
            .compile_run(CompileRequest::retry("p", chain.execution_id.clone()))
            .await
            .unwrap();
        assert!(retry.is_some());
        assert_eq!(run.retry_count(), 1);

        let retry = engine
            .compiler
            .compile(CompileRequest::retry("p", chain.execution_id.clone()))
            .await
            .unwrap();
        assert!(retry.is_none());

        let result = engine.results().load(&chain.execution_id).await.unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.result, json!("Pipeline retried and failed 2 times."));
    }

    #[tokio::test]
    async fn test_local_execution_runs_barriers_in_order() {
        let engine = TestEngine::new();
        let recorder = register_recorder(&engine, &["a", "b", "c", "d"]);

        let chain = engine
            .compiler
            .compile(CompileRequest::fresh("d", diamond_config("d")))
            .await
            .unwrap()
            .unwrap();
        engine.service.submit(chain.clone()).await.unwrap();
        engine.service.wait_idle().await;

        let outcomes = engine.service.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_completed());

        let paths = recorder.task_paths();
        assert_eq!(paths.len(), 4);
        assert!(position(&paths, "tasks.a") < position(&paths, "tasks.b"));
        assert!(position(&paths, "tasks.a") < position(&paths, "tasks.c"));
        assert!(position(&paths, "tasks.b") < position(&paths, "tasks.d"));
        assert!(position(&paths, "tasks.c") < position(&paths, "tasks.d"));

        let result = engine.results().load(&chain.execution_id).await.unwrap();
        assert_eq!(result.status, ResultStatus::Success);
    }

    #[tokio::test]
    async fn test_failed_task_is_retried_until_success() {
        let engine = TestEngine::new();
        let recorder = register_recorder(&engine, &["a"]);
        let flaky = Arc::new(FlakyHandler::new(1));
        engine.registry.register_arc("tasks.b", flaky.clone());

        let chain = engine
            .compiler
            .compile(CompileRequest::fresh("p", sample_config("p")))
            .await
            .unwrap()
            .unwrap();
        engine.service.submit(chain.clone()).await.unwrap();
        engine.service.wait_idle().await;

        let outcomes = engine.service.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].status, ChainStatus::Failed { step: 2, .. }));
        assert!(outcomes[1].is_completed());
        assert!(outcomes.iter().all(|o| o.execution_id == chain.execution_id));

        assert_eq!(flaky.call_count(), 2);
        assert_eq!(recorder.call_count(), 2);

        let result = engine.results().load(&chain.execution_id).await.unwrap();
        assert_eq!(result.status, ResultStatus::Success);

        let mut run = RunState::for_execution(engine.cache.clone(), "p", &chain.execution_id);
        run.load(LoadOptions::default()).await;
        assert_eq!(run.retry_count(), 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_is_deadlettered() {
        let engine = TestEngine::new();
        register_recorder(&engine, &["b"]);
        let failing = Arc::new(FlakyHandler::always());
        engine.registry.register_arc("tasks.a", failing.clone());

        let chain = engine
            .compiler
            .compile(CompileRequest::fresh("p", sample_config("p").with_max_retry(2)))
            .await
            .unwrap()
            .unwrap();
        engine.service.submit(chain.clone()).await.unwrap();
        engine.service.wait_idle().await;

        let outcomes = engine.service.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.is_completed()));
        match &outcomes[1].status {
            ChainStatus::Failed { handler: Some(Ok(value)), .. } => {
                assert_eq!(value["resubmitted"], json!(false));
            }
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(failing.call_count(), 2);

        let result = engine.results().load(&chain.execution_id).await.unwrap();
        assert_eq!(result.status, ResultStatus::Failed);
        assert_eq!(result.result, json!("Pipeline retried and failed 2 times."));
    }

    #[tokio::test]
    async fn test_failure_without_retry_stops() {
        let engine = TestEngine::new();
        engine.registry.register("tasks.a", FlakyHandler::always());
        let retry_spy = Arc::new(RecordingHandler::new());
        engine.registry.register_arc(RETRY_TASK_PATH, retry_spy.clone());

        let chain = engine
            .compiler
            .compile(CompileRequest::fresh("p", sample_config("p")).with_add_retry(false))
            .await
            .unwrap()
            .unwrap();
        let outcome = engine.service.run_chain(&chain).await;

        assert!(matches!(outcome.status, ChainStatus::Failed { step: 0, handler: None, .. }));
        assert_eq!(retry_spy.call_count(), 0);
    }

    #[tokio::test]
    async fn test_latest_config_runs_end_to_end() {
        let engine = TestEngine::new();
        let recorder = register_recorder(&engine, &["a", "b", "c"]);
        let configs = InMemoryConfigService::new();
        configs.publish(sample_config("fan-in"));
        configs.publish(fan_in_config("fan-in"));

        let chain = engine
            .compiler
            .compile_latest(&configs, "fan-in", Some("key".into()))
            .await
            .unwrap()
            .unwrap();
        let outcome = engine.service.run_chain(&chain).await;

        assert!(outcome.is_completed());
        assert_eq!(recorder.call_count(), 3);
        assert!(recorder.events().iter().all(|e| e.access_key() == Some("key")));
    }
}
