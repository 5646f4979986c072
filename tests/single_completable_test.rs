#[cfg(test)]
mod tests {
    use flowsig::completable::{self, Completable, CompletableEmitter, CompletableSubject};
    use flowsig::single::{self, Single, SingleEmitter, SingleSubject};
    use flowsig::testing::{TestCompletableSubscriber, TestSingleSubscriber};
    use flowsig::{Cancellable, CancellationHandle, FlowConfig, FlowError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_failed_single_signals_subscribe_then_error() {
        let probe = TestSingleSubscriber::<String>::new();
        single::failed(FlowError::msg("lookup failed")).subscribe(probe.clone());

        assert_eq!(probe.subscribe_count(), 1);
        assert!(probe.values().is_empty());
        assert!(matches!(probe.error(), Some(FlowError::Source(_))));
        probe.assert_no_violations();
    }

    #[test]
    fn test_racing_producers_deliver_one_result() {
        for _ in 0..100 {
            let (tx, rx) = std::sync::mpsc::channel();
            let source = single::create(move |emitter: SingleEmitter<usize>| {
                let _ = tx.send(emitter);
            });
            let probe = TestSingleSubscriber::new();
            source.subscribe(probe.clone());
            let emitter = rx.recv().unwrap();

            let racers: Vec<_> = (0..4)
                .map(|i| {
                    let emitter = emitter.clone();
                    thread::spawn(move || {
                        if i % 2 == 0 {
                            emitter.success(i);
                        } else {
                            emitter.error(FlowError::msg("racer"));
                        }
                    })
                })
                .collect();
            for racer in racers {
                racer.join().unwrap();
            }

            let results = probe.values().len() + usize::from(probe.error().is_some());
            assert_eq!(results, 1);
            probe.assert_no_violations();
        }
    }

    #[test]
    fn test_dispose_before_result_suppresses_it() {
        let (tx, rx) = std::sync::mpsc::channel();
        let source = single::create(move |emitter: SingleEmitter<u8>| {
            let _ = tx.send(emitter);
        });
        let probe = TestSingleSubscriber::new();
        source.subscribe(probe.clone());
        let emitter = rx.recv().unwrap();

        probe.cancel();
        probe.cancel();
        assert!(emitter.is_cancelled());
        assert!(!emitter.success(1));
        assert!(!probe.is_terminated());
        probe.assert_no_violations();
    }

    #[test]
    fn test_dispose_runs_release_hooks_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let source = completable::create(move |emitter: CompletableEmitter| {
            let counter = counter.clone();
            emitter.on_cancel(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        let probe = TestCompletableSubscriber::new();
        source.subscribe(probe.clone());
        probe.cancel();
        probe.cancel();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subject_chain() {
        let lengths = Arc::new(SingleSubject::map(|s: String| s.len()));
        let done = Arc::new(CompletableSubject::new());
        completable::from_single::<_, usize>(lengths.clone()).subscribe(done.clone());

        let length_probe = TestSingleSubscriber::new();
        let done_probe = TestCompletableSubscriber::new();
        lengths.subscribe(length_probe.clone());
        done.subscribe(done_probe.clone());

        single::just(String::from("signal")).subscribe(lengths.clone());

        assert_eq!(length_probe.values(), vec![6]);
        assert_eq!(done_probe.completions(), 1);
        length_probe.assert_no_violations();
        done_probe.assert_no_violations();
    }

    #[test]
    fn test_handle_state() {
        let handle = CancellationHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_from_config() {
        let config = FlowConfig::from_toml_str("timeout_ms = 25").unwrap();
        let deadline = config.timeout().unwrap();

        let slow = single::from_future(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, FlowError>(0u8)
        });
        let probe = TestSingleSubscriber::new();
        single::timeout(slow, deadline).subscribe(probe.clone());
        assert!(probe.await_terminal_async(Duration::from_secs(2)).await);
        assert!(matches!(probe.error(), Some(FlowError::Timeout(d)) if d == deadline));
        probe.assert_no_violations();
    }

    #[tokio::test]
    async fn test_completable_from_future_error() {
        let probe = TestCompletableSubscriber::new();
        completable::from_future(|| async { Err(FlowError::msg("flush failed")) })
            .subscribe(probe.clone());
        assert!(probe.await_terminal_async(Duration::from_secs(2)).await);
        assert_eq!(probe.completions(), 0);
        assert!(probe.error().is_some());
        probe.assert_no_violations();
    }

    #[tokio::test]
    async fn test_completable_timeout_not_triggered() {
        let probe = TestCompletableSubscriber::new();
        completable::timeout(completable::complete(), Duration::from_millis(20))
            .subscribe(probe.clone());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(probe.completions(), 1);
        assert!(probe.error().is_none());
        probe.assert_no_violations();
    }
}
