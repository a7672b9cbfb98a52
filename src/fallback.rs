//! Ordered fallback over named strategies.
//!
//! Several parts of the pipeline try a list of approaches until one works:
//! image acquisition (direct fetch, proxy, raster re-encode, ...) and slide
//! capture (vector renderer, raster renderer). Both go through
//! [`first_success`] / [`first_success_blocking`], which run the strategies in
//! order, stop at the first `Ok`, and hand back every failure otherwise.

use std::fmt;
use std::future::Future;
use tracing::debug;

/// One failed strategy and its error.
#[derive(Debug)]
pub struct Attempt<S, E> {
    pub strategy: S,
    pub error: E,
}

/// Every attempt of a cascade that produced no result, in order.
#[derive(Debug)]
pub struct AllFailed<S, E> {
    pub attempts: Vec<Attempt<S, E>>,
}

impl<S, E> AllFailed<S, E> {
    pub fn last_error(&self) -> Option<&E> {
        self.attempts.last().map(|a| &a.error)
    }
}

impl<S: fmt::Display, E: fmt::Display> fmt::Display for AllFailed<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no strategies to try");
        }
        let parts: Vec<String> = self
            .attempts
            .iter()
            .map(|a| format!("{}: {}", a.strategy, a.error))
            .collect();
        write!(f, "all strategies failed ({})", parts.join("; "))
    }
}

impl<S, E> std::error::Error for AllFailed<S, E>
where
    S: fmt::Debug + fmt::Display,
    E: fmt::Debug + fmt::Display,
{
}

/// Run `run` for each strategy in order until one succeeds.
///
/// Returns the winning strategy with its value, or every failure.
pub async fn first_success<S, T, E, F, Fut>(
    strategies: impl IntoIterator<Item = S>,
    mut run: F,
) -> Result<(S, T), AllFailed<S, E>>
where
    S: Clone + fmt::Display,
    E: fmt::Display,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = Vec::new();
    for strategy in strategies {
        match run(strategy.clone()).await {
            Ok(value) => {
                debug!(%strategy, failed_before = attempts.len(), "strategy succeeded");
                return Ok((strategy, value));
            }
            Err(error) => {
                debug!(%strategy, %error, "strategy failed");
                attempts.push(Attempt { strategy, error });
            }
        }
    }
    Err(AllFailed { attempts })
}

/// Synchronous [`first_success`].
pub fn first_success_blocking<S, T, E, F>(
    strategies: impl IntoIterator<Item = S>,
    mut run: F,
) -> Result<(S, T), AllFailed<S, E>>
where
    S: Clone + fmt::Display,
    E: fmt::Display,
    F: FnMut(&S) -> Result<T, E>,
{
    let mut attempts = Vec::new();
    for strategy in strategies {
        match run(&strategy) {
            Ok(value) => {
                debug!(%strategy, failed_before = attempts.len(), "strategy succeeded");
                return Ok((strategy, value));
            }
            Err(error) => {
                debug!(%strategy, %error, "strategy failed");
                attempts.push(Attempt { strategy, error });
            }
        }
    }
    Err(AllFailed { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_at_first_success() {
        let mut tried = Vec::new();
        let result = first_success(["a", "b", "c"], |s| {
            tried.push(s);
            async move {
                if s == "b" {
                    Ok(42)
                } else {
                    Err(format!("{s} broke"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, ("b", 42));
        assert_eq!(tried, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn collects_all_failures_in_order() {
        let err = first_success(["x", "y"], |s| async move { Err::<(), _>(format!("{s} down")) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts.len(), 2);
        assert_eq!(err.attempts[0].strategy, "x");
        assert_eq!(err.last_error().unwrap(), "y down");
        assert_eq!(
            err.to_string(),
            "all strategies failed (x: x down; y: y down)"
        );
    }

    #[tokio::test]
    async fn empty_strategy_list_fails() {
        let err = first_success(Vec::<&str>::new(), |_| async { Ok::<_, String>(()) })
            .await
            .unwrap_err();
        assert!(err.attempts.is_empty());
        assert_eq!(err.to_string(), "no strategies to try");
    }

    #[test]
    fn blocking_variant_matches() {
        let result = first_success_blocking([1, 2, 3], |n| {
            if *n >= 2 { Ok(n * 10) } else { Err("too small") }
        });
        assert_eq!(result.unwrap(), (2, 20));
    }
}
