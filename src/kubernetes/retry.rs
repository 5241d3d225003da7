// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Polling with an interval, a timeout and a distinction between minor and severe errors.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

/// Outcome of a single polling attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The condition is met, stop polling
    Done(T),
    /// Not there yet, try again after the interval
    Minor(E),
    /// Give up immediately
    Severe(E),
}

/// Why polling stopped without success
#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    /// The timeout elapsed; carries the last minor error, if any
    Timeout(Option<E>),
    Severe(E),
}

/// Call `f` every `interval` until it reports `Done`, a severe error, or `timeout` elapses.
/// The first attempt happens immediately.
pub async fn until_timeout<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let deadline = Instant::now() + timeout;
    let mut last_error = None;

    loop {
        match tokio::time::timeout_at(deadline, f()).await {
            Ok(Attempt::Done(value)) => return Ok(value),
            Ok(Attempt::Severe(e)) => return Err(RetryError::Severe(e)),
            Ok(Attempt::Minor(e)) => last_error = Some(e),
            Err(_) => return Err(RetryError::Timeout(last_error)),
        }

        if Instant::now() + interval >= deadline {
            sleep_until(deadline).await;
            return Err(RetryError::Timeout(last_error));
        }

        sleep(interval).await;
    }
}

/// A minor error until `count` exceeds `threshold` attempts, severe afterwards
pub fn minor_or_severe<T, E>(count: u32, threshold: u32, err: E) -> Attempt<T, E> {
    if count > threshold {
        Attempt::Severe(err)
    } else {
        Attempt::Minor(err)
    }
}

/// Number of attempts at `interval` that fit into `threshold`
pub fn attempts_within(threshold: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return u32::MAX;
    }
    (threshold.as_nanos() / interval.as_nanos()).min(u32::MAX as u128) as u32
}
