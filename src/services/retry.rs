use log::warn;
use std::fmt::Display;
use std::thread;
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 3;
pub const WEATHER_RETRY_STEP: Duration = Duration::from_secs(3);
pub const IMAGE_RETRY_STEP: Duration = Duration::from_secs(2);

/// Fixed attempt budget with linear backoff: the wait after attempt `n` is `n * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl RetryPolicy {
    pub const fn linear(step: Duration) -> Self {
        RetryPolicy {
            attempts: MAX_ATTEMPTS,
            step,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }

    /// Run `op` until it succeeds, `give_up` says the error is final, or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E: Display>(
        &self,
        what: &str,
        mut op: impl FnMut(u32) -> Result<T, E>,
        give_up: impl Fn(&E) -> bool,
    ) -> Result<T, E> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts || give_up(&e) => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{}: attempt {}/{} failed: {}; retrying in {}s",
                        what,
                        attempt,
                        attempts,
                        e,
                        delay.as_secs_f32()
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
