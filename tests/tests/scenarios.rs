mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use reqwest::Client;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::num::NonZeroUsize;
    use volley::prelude::*;
    use volley::ProbeOptions;

    #[tracing_test::traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn steady_target() {
        let addr = mock().await;
        let runner = Runner::new().unwrap();

        let result = runner
            .run(&spec(&format!("http://{addr}/delay/ms/100"), 10, 2))
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 10);
        assert_eq!(result.stats.success_count, 10);
        assert_eq!(result.stats.failed_count, 0);
        assert!(result.outcomes.iter().all(|o| o.elapsed_ms >= 100.));

        // Five rounds of ~100ms over two lanes.
        let rps = result.stats.requests_per_second;
        assert!(rps > 10. && rps <= 20.5, "rps was {rps}");
        assert!(result.stats.total_time.min >= 0.1);
        assert_eq!(hits(addr).await, 10);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn mixed_statuses() {
        let addr = mock().await;
        let result = Runner::new()
            .unwrap()
            .run(&spec(&format!("http://{addr}/cycle"), 5, 1))
            .await
            .unwrap();

        let codes: Vec<u16> = result.outcomes.iter().map(|o| o.status_code()).collect();
        assert_eq!(codes, mock_service::CYCLE);
        assert_eq!(result.stats.success_count, 3);
        assert_eq!(result.stats.failed_count, 2);
        assert_eq!(result.outcomes[1].classification, Classification::HttpError(500));
        assert_eq!(result.outcomes[4].classification, Classification::Success(204));
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn unreachable_target() {
        let addr = refused_addr();
        let result = Runner::new()
            .unwrap()
            .run(&spec(&format!("http://{addr}/"), 3, 1))
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 3);
        for outcome in &result.outcomes {
            assert!(matches!(
                outcome.classification,
                Classification::NetworkError(_)
            ));
            assert_eq!(outcome.status_code(), 0);
            assert_eq!(outcome.time_to_first_byte_ms, None);
        }
        assert_eq!(result.stats.success_count, 0);
        assert_eq!(result.stats.failed_count, 3);
        assert!(result.stats.requests_per_second.is_finite());
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn slow_target_times_out() {
        let addr = mock().await;
        let mut spec = spec(&format!("http://{addr}/delay/ms/200"), 4, 2);
        spec.timeout_ms = 50;

        let result = Runner::new().unwrap().run(&spec).await.unwrap();

        assert_eq!(result.outcomes.len(), 4);
        for outcome in &result.outcomes {
            assert_eq!(outcome.classification, Classification::Timeout);
            assert_eq!(outcome.status_code(), 408);
            assert!(outcome.elapsed_ms >= 50.);
            assert_eq!(outcome.time_to_last_byte_ms, None);
        }
        assert_eq!(result.stats.failed_count, 4);
    }

    #[tokio::test]
    async fn empty_dispatch() {
        let addr = mock().await;
        let spec = spec(&format!("http://{addr}/delay/ms/1"), 1, 4);
        let probe = HttpProbe::new(Client::new(), ProbeOptions::try_from(&spec).unwrap());

        let dispatch = Dispatcher::new(probe, NonZeroUsize::new(4).unwrap())
            .run(0)
            .await
            .unwrap();
        let stats = dispatch.stats();

        assert!(dispatch.outcomes.is_empty());
        assert_eq!(stats.success_count, 0);
        assert_eq!(stats.failed_count, 0);
        assert_eq!(stats.requests_per_second, 0.);
        assert_eq!(stats.total_time, Default::default());
        assert_eq!(hits(addr).await, 0);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn single_request_many_workers() {
        let addr = mock().await;
        let result = Runner::new()
            .unwrap()
            .run(&spec(&format!("http://{addr}/delay/ms/1"), 1, 10))
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].sequence, 1);
        assert_eq!(hits(addr).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(20_000)]
    async fn every_sequence_exactly_once() {
        let addr = mock().await;
        let result = Runner::new()
            .unwrap()
            .run(&spec(&format!("http://{addr}/delay/ms/2"), 200, 16))
            .await
            .unwrap();

        let sequences: Vec<u64> = result.outcomes.iter().map(|o| o.sequence).collect();
        assert_eq!(sequences, (1..=200).collect::<Vec<_>>());
        assert_eq!(
            result.stats.success_count + result.stats.failed_count,
            200
        );
        assert_eq!(hits(addr).await, 200);
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn method_payload_and_headers() {
        let addr = mock().await;

        let mut echo = spec(&format!("http://{addr}/echo"), 2, 1);
        echo.method = "POST".to_string();
        echo.payload = Some(json!({ "hello": "world" }));
        let result = Runner::new().unwrap().run(&echo).await.unwrap();
        assert_eq!(result.stats.success_count, 2);

        let mut keyed = spec(&format!("http://{addr}/header/x-api-key"), 1, 1);
        let result = Runner::new().unwrap().run(&keyed).await.unwrap();
        assert_eq!(result.outcomes[0].classification, Classification::HttpError(400));

        keyed.headers = Some(BTreeMap::from([(
            "x-api-key".to_string(),
            "secret".to_string(),
        )]));
        let result = Runner::new().unwrap().run(&keyed).await.unwrap();
        assert_eq!(result.outcomes[0].classification, Classification::Success(200));
    }
}
