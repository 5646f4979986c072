use crate::error::FlowError;
use crate::single::{relay_for, Forward, MapFn, Single, SingleSubscriber};
use std::sync::Arc;

/// Transforms the value of an upstream `Single`, subscribing to it once per
/// downstream subscriber.
pub struct MapSingle<S, T, R> {
    source: S,
    map: MapFn<T, R>,
}

pub fn map<S, T, R, F>(source: S, f: F) -> MapSingle<S, T, R>
where
    S: Single<T>,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    MapSingle {
        source,
        map: Arc::new(move |value| Ok(f(value))),
    }
}

/// Like [`map`], but a failed conversion becomes the downstream error.
pub fn try_map<S, T, R, F>(source: S, f: F) -> MapSingle<S, T, R>
where
    S: Single<T>,
    F: Fn(T) -> Result<R, FlowError> + Send + Sync + 'static,
{
    MapSingle {
        source,
        map: Arc::new(f),
    }
}

impl<S, T, R> Single<R> for MapSingle<S, T, R>
where
    S: Single<T>,
    T: Send + 'static,
    R: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn SingleSubscriber<R>>) {
        let relay = relay_for(subscriber.clone());
        subscriber.on_subscribe(relay.handle());
        if relay.is_cancelled() {
            return;
        }
        self.source.subscribe(Forward::new(relay, self.map.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::single::{failed, just};
    use crate::testing::TestSingleSubscriber;

    #[test]
    fn test_map_value() {
        let probe = TestSingleSubscriber::new();
        map(just(20u32), |n: u32| n + 1).subscribe(probe.clone());
        assert_eq!(probe.values(), vec![21]);
        probe.assert_no_violations();
    }

    #[test]
    fn test_error_passes_through_unmapped() {
        let probe = TestSingleSubscriber::<String>::new();
        map(failed::<u32>(FlowError::msg("upstream")), |n: u32| n.to_string())
            .subscribe(probe.clone());
        assert!(probe.error().is_some());
        assert!(probe.values().is_empty());
    }

    #[test]
    fn test_try_map_failure() {
        let probe = TestSingleSubscriber::<u8>::new();
        try_map(just(300u32), |n: u32| {
            u8::try_from(n).map_err(FlowError::from_source)
        })
        .subscribe(probe.clone());
        assert!(matches!(probe.error(), Some(FlowError::Source(_))));
    }
}
