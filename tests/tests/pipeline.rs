mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use reqwest::{Client, StatusCode};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use volley::Runner;
    use volley_core::RunId;
    use volley_runtime::{
        router, ApiState, ChannelQueue, DeadLetter, MemoryStore, Message, Queue, ResultSink,
        RetryPolicy, RunExecutor, RunStore, SqliteStore, Stage, Submitter,
    };

    /// Every stage of the service, wired in-process with the API on an ephemeral port.
    struct Pipeline<S> {
        api: SocketAddr,
        intake: ChannelQueue,
        results: ChannelQueue,
        dead_letters: ChannelQueue,
        store: S,
        executors: Vec<JoinHandle<()>>,
        sinks: Vec<JoinHandle<()>>,
    }

    impl<S> Pipeline<S>
    where
        S: RunStore + Sync + Clone + 'static,
    {
        async fn start(store: S, executors: usize) -> Self {
            let intake = ChannelQueue::bounded("intake", 16);
            let results = ChannelQueue::bounded("results", 16);
            let dead_letters = ChannelQueue::bounded("dead-letters", 16);
            let runner = Runner::new().unwrap();
            let retry = RetryPolicy::new(3, Duration::from_millis(10));

            let executors = (0..executors)
                .map(|_| {
                    let executor = RunExecutor::new(
                        intake.clone(),
                        results.clone(),
                        dead_letters.clone(),
                        runner.clone(),
                        retry.clone(),
                    );
                    tokio::spawn(async move { executor.run().await })
                })
                .collect();

            let sink = ResultSink::new(
                results.clone(),
                dead_letters.clone(),
                store.clone(),
                retry.clone(),
            );
            let sinks = vec![tokio::spawn(async move { sink.run().await })];

            let state = ApiState::new(Submitter::new(intake.clone(), retry), store.clone());
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let api = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, router(Arc::new(state))).await });

            Self {
                api,
                intake,
                results,
                dead_letters,
                store,
                executors,
                sinks,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{path}", self.api)
        }

        /// Polls the API until the run has been persisted.
        async fn wait_for(&self, test_id: &str) -> Value {
            let client = Client::new();
            for _ in 0..100 {
                let res = client
                    .get(self.url(&format!("/load-test/test/{test_id}")))
                    .send()
                    .await
                    .unwrap();
                if res.status() == StatusCode::OK {
                    return res.json().await.unwrap();
                }
                assert_eq!(res.status(), StatusCode::NOT_FOUND);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            panic!("Run {test_id} was never persisted");
        }

        /// Closes the queues in pipeline order and waits for every consumer to drain.
        async fn drain(self) -> S {
            self.intake.close();
            for handle in self.executors {
                handle.await.unwrap();
            }
            self.results.close();
            for handle in self.sinks {
                handle.await.unwrap();
            }
            self.store
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(20_000)]
    async fn submitted_run_is_persisted() {
        let target = mock().await;
        let pipeline = Pipeline::start(MemoryStore::new(), 1).await;
        let client = Client::new();

        let res = client
            .post(pipeline.url("/load-test"))
            .json(&json!({
                "targetUrl": format!("http://{target}/delay/ms/5"),
                "numRequests": 6,
                "concurrency": 3,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let ack: Value = res.json().await.unwrap();
        let test_id = ack["testId"].as_str().unwrap().to_string();

        let record = pipeline.wait_for(&test_id).await;
        assert_eq!(record["testId"], json!(test_id));
        assert_eq!(record["requests"], json!(6));
        assert_eq!(record["concurrency"], json!(3));
        assert_eq!(record["result"].as_array().unwrap().len(), 6);
        assert_eq!(record["stats"]["successCount"], json!(6));
        assert_eq!(record["stats"]["failedCount"], json!(0));
        assert!(record["createdAt"].is_string());
        assert_eq!(hits(target).await, 6);

        let all: Value = client
            .get(pipeline.url("/load-test"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.as_array().unwrap().len(), 1);

        let store = pipeline.drain().await;
        assert!(store.get(&RunId::new(test_id)).await.unwrap().is_some());
    }

    #[tokio::test]
    #[ntest::timeout(20_000)]
    async fn invalid_submission_is_rejected() {
        let pipeline = Pipeline::start(MemoryStore::new(), 1).await;

        let res = Client::new()
            .post(pipeline.url("/load-test"))
            .json(&json!({ "targetUrl": "http://localhost/", "numRequests": 5 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("concurrency"));

        let store = pipeline.drain().await;
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(20_000)]
    async fn redelivered_run_is_persisted_once() {
        let target = mock().await;
        let pipeline = Pipeline::start(SqliteStore::in_memory().await.unwrap(), 2).await;

        let spec = spec(&format!("http://{target}/delay/ms/20"), 4, 2);
        let bytes = Message::new(&spec).to_bytes().unwrap();
        // The same intake message delivered twice, possibly to different executors.
        pipeline.intake.publish(bytes.clone()).await.unwrap();
        pipeline.intake.publish(bytes).await.unwrap();

        let record = pipeline.wait_for(spec.run_id.as_str()).await;
        assert_eq!(record["result"].as_array().unwrap().len(), 4);

        let store = pipeline.drain().await;
        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run_id(), &spec.run_id);
    }

    #[tokio::test]
    #[ntest::timeout(20_000)]
    async fn poison_message_is_dead_lettered() {
        let pipeline = Pipeline::start(MemoryStore::new(), 1).await;
        pipeline
            .intake
            .publish(b"{\"targetUrl\":42}".to_vec())
            .await
            .unwrap();

        let letter = Message::<DeadLetter>::from_bytes(
            &pipeline.dead_letters.consume().await.unwrap(),
        )
        .unwrap()
        .into_inner();
        assert_eq!(letter.stage, Stage::Intake);
        assert_eq!(letter.payload, "{\"targetUrl\":42}");

        let store = pipeline.drain().await;
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ntest::timeout(20_000)]
    async fn query_by_date() {
        let pipeline = Pipeline::start(MemoryStore::new(), 1).await;
        let spec = spec(&format!("http://{}/", refused_addr()), 2, 1);
        pipeline
            .intake
            .publish(Message::new(&spec).to_bytes().unwrap())
            .await
            .unwrap();
        let record = pipeline.wait_for(spec.run_id.as_str()).await;
        let created_at = record["createdAt"].as_str().unwrap().to_string();

        let client = Client::new();
        let found: Value = client
            .get(pipeline.url("/load-test/by-date"))
            .query(&[("startDate", created_at.as_str()), ("endDate", created_at.as_str())])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(found[0]["testId"], json!(spec.run_id.as_str()));

        let res = client
            .get(pipeline.url("/load-test/by-date?startDate=2024-01-01"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        pipeline.drain().await;
    }
}
