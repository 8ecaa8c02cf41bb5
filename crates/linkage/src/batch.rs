//! Concurrent dispatch of independent statements.

use asupersync::Outcome;
use futures::stream::{self, StreamExt};
use linkage_core::Error;

/// Drive every future to completion, at most `max_in_flight` at a time
/// (0 = all at once).
///
/// Results come back in input order.
pub(crate) async fn dispatch<F, T>(futures: Vec<F>, max_in_flight: usize) -> Vec<Outcome<T, Error>>
where
    F: Future<Output = Outcome<T, Error>>,
{
    if max_in_flight == 0 || max_in_flight >= futures.len() {
        futures::future::join_all(futures).await
    } else {
        stream::iter(futures)
            .buffered(max_in_flight)
            .collect()
            .await
    }
}

/// Collect the successes, or the first failure once everything has finished.
///
/// Nothing is rolled back: statements that succeeded before the failure stay
/// applied.
pub(crate) fn settle<T>(results: Vec<Outcome<T, Error>>) -> Outcome<Vec<T>, Error> {
    let total = results.len();
    let mut values = Vec::with_capacity(total);
    let mut failure: Option<Outcome<Vec<T>, Error>> = None;
    for result in results {
        match result {
            Outcome::Ok(v) => values.push(v),
            Outcome::Err(e) => {
                failure.get_or_insert(Outcome::Err(e));
            }
            Outcome::Cancelled(r) => {
                failure.get_or_insert(Outcome::Cancelled(r));
            }
            Outcome::Panicked(p) => {
                failure.get_or_insert(Outcome::Panicked(p));
            }
        }
    }
    match failure {
        None => Outcome::Ok(values),
        Some(failure) => {
            tracing::debug!(
                succeeded = values.len(),
                total,
                "Batch finished with a failure"
            );
            failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;

    #[test]
    fn settle_reports_first_failure() {
        let results = vec![
            Outcome::Ok(1_u64),
            Outcome::Err(Error::Custom("first".into())),
            Outcome::Err(Error::Custom("second".into())),
        ];
        match settle(results) {
            Outcome::Err(Error::Custom(msg)) => assert_eq!(msg, "first"),
            other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
        }
    }

    #[test]
    fn dispatch_bounded_and_unbounded_run_everything() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        rt.block_on(async {
            for limit in [0, 1, 2, 10] {
                let futures: Vec<_> = (1..=5_u64)
                    .map(|i| async move { Outcome::<u64, Error>::Ok(i) })
                    .collect();
                let values = match settle(dispatch(futures, limit).await) {
                    Outcome::Ok(v) => v,
                    other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
                };
                assert_eq!(values, [1, 2, 3, 4, 5], "limit {limit}");
            }
        });
    }
}
