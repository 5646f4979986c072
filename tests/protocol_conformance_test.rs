#[cfg(test)]
mod tests {
    use flowsig::streaming::{
        create, empty, failed, from_iter, range, Emitter, MapProcessor, Publisher,
        PublishProcessor, Subscriber, Subscription, UNBOUNDED,
    };
    use flowsig::testing::TestSubscriber;
    use flowsig::FlowError;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_request_one_delivers_exactly_one() {
        let probe = TestSubscriber::new(1);
        range(0, 100).subscribe(probe.clone());

        assert_eq!(probe.items(), vec![0]);
        assert!(!probe.is_terminated());
        thread::sleep(Duration::from_millis(10));
        assert_eq!(probe.item_count(), 1);

        probe.request(2);
        assert_eq!(probe.items(), vec![0, 1, 2]);
        probe.assert_no_violations();
    }

    #[test]
    fn test_zero_request_is_illegal() {
        let probe = TestSubscriber::<u64>::new(0);
        range(0, 10).subscribe(probe.clone());
        probe.request(0);

        assert!(matches!(probe.error(), Some(FlowError::IllegalRequest(0))));
        assert!(probe.items().is_empty());
        probe.assert_no_violations();
    }

    #[test]
    fn test_negative_request_is_illegal() {
        let probe = TestSubscriber::<u64>::new(0);
        range(0, 10).subscribe(probe.clone());
        probe.request(-5);

        assert!(matches!(probe.error(), Some(FlowError::IllegalRequest(-5))));
        assert!(probe.items().is_empty());
        assert_eq!(probe.completions(), 0);
    }

    #[test]
    fn test_illegal_request_from_on_subscribe() {
        let probe = TestSubscriber::<u64>::new(-1);
        range(0, 10).subscribe(probe.clone());
        assert!(probe.error().is_some_and(|e| e.is_illegal_request()));
        probe.assert_no_violations();
    }

    #[test]
    fn test_cancel_then_request_is_silent() {
        let probe = TestSubscriber::<u64>::new(0);
        range(0, 10).subscribe(probe.clone());
        probe.cancel();
        probe.request(5);

        assert!(probe.items().is_empty());
        assert!(!probe.is_terminated());
        probe.assert_no_violations();
    }

    #[test]
    fn test_cancel_twice_is_noop() {
        let probe = TestSubscriber::<u64>::new(2);
        range(0, 10).subscribe(probe.clone());
        probe.cancel();
        probe.cancel();
        probe.request(3);
        assert_eq!(probe.items(), vec![0, 1]);
    }

    #[test]
    fn test_empty_and_failed_publishers() {
        let done = TestSubscriber::<u8>::new(0);
        empty().subscribe(done.clone());
        assert_eq!(done.completions(), 1);
        done.assert_no_violations();

        let broken = TestSubscriber::<u8>::new(0);
        failed(FlowError::msg("no source")).subscribe(broken.clone());
        assert!(broken.error().is_some());
        assert!(broken.items().is_empty());
        broken.assert_no_violations();
    }

    #[test]
    fn test_exhausted_source_completes_without_extra_demand() {
        let probe = TestSubscriber::new(3);
        from_iter(vec!["a", "b", "c"]).subscribe(probe.clone());
        assert_eq!(probe.items(), vec!["a", "b", "c"]);
        assert_eq!(probe.completions(), 1);
        probe.assert_no_violations();
    }

    #[test]
    fn test_unbounded_demand_saturates() {
        let probe = TestSubscriber::new(UNBOUNDED);
        range(0, 50).subscribe(probe.clone());
        probe.request(UNBOUNDED);
        probe.request(1);
        assert_eq!(probe.item_count(), 50);
        assert_eq!(probe.completions(), 1);
        probe.assert_no_violations();
    }

    #[test]
    fn test_request_from_on_next_does_not_recurse() {
        let probe = TestSubscriber::new(1).request_on_next(1);
        range(0, 10_000).subscribe(probe.clone());
        assert_eq!(probe.item_count(), 10_000);
        assert_eq!(probe.completions(), 1);
        probe.assert_no_violations();
    }

    /// Cancels its subscription once `stop_after` items have arrived.
    struct CancelAfter {
        stop_after: usize,
        seen: AtomicUsize,
        subscription: Mutex<Option<Arc<dyn Subscription>>>,
    }

    impl CancelAfter {
        fn new(stop_after: usize) -> Arc<Self> {
            Arc::new(Self {
                stop_after,
                seen: AtomicUsize::new(0),
                subscription: Mutex::new(None),
            })
        }
    }

    impl Subscriber<u64> for CancelAfter {
        fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
            *self.subscription.lock().unwrap() = Some(subscription.clone());
            subscription.request(UNBOUNDED);
        }

        fn on_next(&self, _item: u64) {
            let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if seen == self.stop_after {
                let subscription = self.subscription.lock().unwrap().clone();
                if let Some(subscription) = subscription {
                    subscription.cancel();
                }
            }
        }

        fn on_error(&self, error: FlowError) {
            panic!("unexpected error: {error}");
        }

        fn on_complete(&self) {
            panic!("cancelled subscription completed");
        }
    }

    #[test]
    fn test_cancel_from_on_next_stops_unbounded_range() {
        let subscriber = CancelAfter::new(10);
        range(0, 1_000_000).subscribe(subscriber.clone());
        assert_eq!(subscriber.seen.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_cancel_from_on_next_stops_emitter() {
        let subscriber = CancelAfter::new(3);
        let publisher = create(move |emitter: Emitter<u64>| {
            for i in 0..100 {
                emitter.emit(i);
            }
            emitter.complete();
        });
        publisher.subscribe(subscriber.clone());
        assert_eq!(subscriber.seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_concurrent_requests_never_overlap_delivery() {
        flowsig::logging::init();
        let probe = TestSubscriber::<u64>::new(0);
        range(0, 4_000).subscribe(probe.clone());

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let probe = probe.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        probe.request(1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(probe.await_terminal(Duration::from_secs(5)));
        assert_eq!(probe.items(), (0..4_000).collect::<Vec<_>>());
        probe.assert_no_violations();
    }

    #[test]
    fn test_concurrent_emitters_respect_demand() {
        flowsig::logging::init();
        let (tx, rx) = std::sync::mpsc::channel();
        let publisher = create(move |emitter: Emitter<u32>| {
            let _ = tx.send(emitter);
        });
        let probe = TestSubscriber::<u32>::new(0);
        publisher.subscribe(probe.clone());
        let emitter = rx.recv().unwrap();

        let producers: Vec<_> = (0..4u32)
            .map(|p| {
                let emitter = emitter.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        emitter.emit(p * 1000 + i);
                    }
                })
            })
            .collect();
        let consumer = {
            let probe = probe.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    probe.request(10);
                    thread::yield_now();
                }
            })
        };
        for producer in producers {
            producer.join().unwrap();
        }
        consumer.join().unwrap();
        emitter.complete();

        assert!(probe.await_terminal(Duration::from_secs(5)));
        assert_eq!(probe.item_count(), 200);
        probe.assert_no_violations();
    }

    #[test]
    fn test_processor_chain_keeps_order_and_demand() {
        let doubled = Arc::new(MapProcessor::new(|n: u64| n * 2));
        let shared = Arc::new(PublishProcessor::<u64>::new());
        let a = TestSubscriber::new(UNBOUNDED);
        let b = TestSubscriber::new(UNBOUNDED);
        shared.subscribe(a.clone());
        shared.subscribe(b.clone());
        doubled.subscribe(shared.clone());
        range(0, 300).subscribe(doubled.clone());

        let expected: Vec<u64> = (0..300).map(|n| n * 2).collect();
        assert_eq!(a.items(), expected);
        assert_eq!(b.items(), expected);
        assert_eq!(a.completions(), 1);
        a.assert_no_violations();
        b.assert_no_violations();
    }

    proptest! {
        #[test]
        fn prop_never_more_than_requested(
            total in 0u64..200,
            requests in prop::collection::vec(1i64..20, 0..30),
        ) {
            let probe = TestSubscriber::<u64>::new(0);
            range(0, total).subscribe(probe.clone());

            let mut requested: i64 = 0;
            for n in requests {
                probe.request(n);
                requested += n;
                let delivered = probe.item_count() as i64;
                prop_assert!(delivered <= requested);
                prop_assert_eq!(delivered, requested.min(total as i64));
            }
            prop_assert!(probe.violations().is_empty());
            prop_assert!(probe.completions() <= 1);
            if requested > 0 && (requested as u64) >= total {
                prop_assert_eq!(probe.completions(), 1);
            }
        }
    }
}
