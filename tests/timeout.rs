//! Deterministic timeout behavior for `Query::async_with_timeout`, driven
//! through a `DataSource` and the public `run` entry point. Uses paused
//! tokio time (`tokio_test::assert_elapsed!`) so the test asserts on
//! elapsed virtual time rather than racing a real sleep.

use fetch_core::{run, DataSource, ErrorKind, Fetch, Query};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_elapsed;

struct SlowSource {
    delay: Duration,
    timeout: Duration,
}

impl DataSource for SlowSource {
    type Id = i32;
    type Value = i32;

    fn name(&self) -> &str {
        "slow"
    }

    fn fetch_one(&self, id: i32) -> Query<Option<i32>> {
        let delay = self.delay;
        Query::async_with_timeout(
            async move {
                tokio::time::sleep(delay).await;
                Ok(Some(id))
            },
            Some(self.timeout),
        )
    }
}

#[tokio::test(start_paused = true)]
async fn a_query_that_outlives_its_timeout_fails_promptly() {
    let start = tokio::time::Instant::now();
    let source = Arc::new(SlowSource {
        delay: Duration::from_secs(10),
        timeout: Duration::from_millis(50),
    });
    let result = run(Fetch::one(1, source)).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unhandled);
    // virtual time advanced only to the timeout, not the full 10s sleep
    assert_elapsed!(start, Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn a_query_that_resolves_before_its_timeout_succeeds() {
    let source = Arc::new(SlowSource {
        delay: Duration::from_millis(10),
        timeout: Duration::from_secs(1),
    });
    let value = run(Fetch::one(9, source)).await.unwrap();
    assert_eq!(value, 9);
}
