#[cfg(test)]
mod tests {
    use flowsig::streaming::{
        from_iter, from_stream, into_stream, range, MapProcessor, Publisher,
    };
    use flowsig::testing::TestSubscriber;
    use flowsig::FlowError;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_round_trip_through_stream() -> anyhow::Result<()> {
        let publisher = from_stream(|| into_stream(&range(0, 1_000), 16));
        let probe = TestSubscriber::new(0).request_on_next(1);
        publisher.subscribe(probe.clone());
        probe.request(1);

        assert!(probe.await_terminal_async(Duration::from_secs(5)).await);
        assert_eq!(probe.items(), (0..1_000).collect::<Vec<_>>());
        assert_eq!(probe.completions(), 1);
        probe.assert_no_violations();
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_of_mapped_publisher() -> anyhow::Result<()> {
        let upper = Arc::new(MapProcessor::new(|s: &'static str| s.to_uppercase()));
        from_iter(vec!["push", "pull"]).subscribe(upper.clone());

        let items: Vec<String> = into_stream(upper.as_ref(), 1)
            .map(|item| item.map_err(anyhow::Error::from))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<anyhow::Result<_>>()?;
        assert_eq!(items, vec!["PUSH", "PULL"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_error_ends_publisher() {
        let publisher = from_stream(|| {
            futures::stream::iter(vec![Ok(1u8), Err(FlowError::msg("socket closed")), Ok(2)])
        });
        let probe = TestSubscriber::new(10);
        publisher.subscribe(probe.clone());

        assert!(probe.await_terminal_async(Duration::from_secs(2)).await);
        assert_eq!(probe.items(), vec![1]);
        assert!(probe.error().is_some());
        probe.assert_no_violations();
    }

    #[tokio::test]
    async fn test_slow_consumer_bounds_source() {
        let publisher = from_stream(|| futures::stream::iter((0..100u32).map(Ok)));
        let probe = TestSubscriber::new(5);
        publisher.subscribe(probe.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.item_count(), 5);
        assert!(!probe.is_terminated());

        probe.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.item_count(), 5);
        probe.assert_no_violations();
    }
}
