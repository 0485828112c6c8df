use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A counting semaphore with a bounded wait, used in place of the platform
/// semaphore handles the reference implementation pools per instance.
///
/// `try_wait(Duration::ZERO)` is a non-blocking poll; any other duration
/// blocks up to that long for a post to arrive.
pub struct Semaphore {
    count: Mutex<u32>,
    cvar: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cvar: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cvar.notify_one();
    }

    /// Drops any pending posts, as if the semaphore had just been created.
    pub fn reset(&self) {
        *self.count.lock().unwrap() = 0;
    }

    pub fn try_wait(&self, timeout: Duration) -> bool {
        let count = self.count.lock().unwrap();
        let (mut count, result) = self
            .cvar
            .wait_timeout_while(count, timeout, |c| *c == 0)
            .unwrap();

        if *count == 0 {
            debug_assert!(result.timed_out());
            return false;
        }

        *count -= 1;
        true
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_then_wait_succeeds_immediately() {
        let sem = Semaphore::new();
        sem.post();
        assert!(sem.try_wait(Duration::ZERO));
    }

    #[test]
    fn wait_without_post_times_out() {
        let sem = Semaphore::new();
        assert!(!sem.try_wait(Duration::from_millis(5)));
    }

    #[test]
    fn reset_drops_pending_posts() {
        let sem = Semaphore::new();
        sem.post();
        sem.post();
        sem.reset();
        assert!(!sem.try_wait(Duration::ZERO));
    }
}
