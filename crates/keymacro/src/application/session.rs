//! Worker-thread plumbing shared by the recording and playback sessions.
//!
//! # How does stopping work? (for beginners)
//!
//! Each session runs on its own OS thread.  Rust has no way to "kill" a
//! thread from the outside, so stopping is cooperative:
//!
//! 1. The manager flips a shared [`CancelToken`] (an `Arc<AtomicBool>`).
//! 2. It *unparks* the worker thread.  If the worker is sleeping inside
//!    [`CancelToken::sleep`] (waiting out a long recorded delay, say), it
//!    wakes immediately, sees the flag, and returns.
//! 3. The manager joins the thread, so by the time `stop` returns the worker
//!    has released every device and file it held.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

/// Which of the two manager-owned sessions a worker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    Recording,
    Playing,
}

impl SessionRole {
    /// Name given to the worker thread.
    pub fn thread_name(self) -> &'static str {
        match self {
            SessionRole::Recording => "keymacro-recorder",
            SessionRole::Playing => "keymacro-player",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Recording => f.write_str("recording"),
            SessionRole::Playing => f.write_str("playback"),
        }
    }
}

/// A cooperative cancellation flag shared between a session and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Requests cancellation.  Threads blocked in [`sleep`](Self::sleep)
    /// notice it on their next wake-up; pair with `Thread::unpark` to wake
    /// them at once.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Sleeps the current thread for `duration` unless cancelled first.
    ///
    /// Returns `true` when the full duration elapsed and `false` when
    /// cancellation cut it short.  Spurious wake-ups re-park until the
    /// deadline.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

/// An owned, running session worker.
pub struct SessionHandle {
    id: Uuid,
    role: SessionRole,
    token: CancelToken,
    thread: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawns `body` on a fresh named thread, handing it the session's token.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the thread cannot be created.
    pub fn spawn<F>(role: SessionRole, id: Uuid, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let thread = thread::Builder::new()
            .name(role.thread_name().to_string())
            .spawn(move || body(worker_token))?;
        Ok(Self {
            id,
            role,
            token,
            thread,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Whether the worker has returned (normally, with an error, or by panic).
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Cancels the worker, wakes it if it is sleeping, and waits for it.
    pub fn stop(self) {
        self.token.cancel();
        self.thread.thread().unpark();
        self.join();
    }

    /// Waits for a worker that is finishing on its own.
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!(session = %self.id, "{} worker panicked", self.role);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_sleep_runs_full_duration_when_not_cancelled() {
        // Arrange
        let token = CancelToken::new();

        // Act
        let started = Instant::now();
        let completed = token.sleep(Duration::from_millis(30));

        // Assert
        assert!(completed);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleep_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let started = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_zero_sleep_completes() {
        assert!(CancelToken::new().sleep(Duration::ZERO));
    }

    #[test]
    fn test_stop_interrupts_long_sleep() {
        // Arrange
        let woke_early = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&woke_early);
        let handle = SessionHandle::spawn(SessionRole::Playing, Uuid::new_v4(), move |token| {
            let completed = token.sleep(Duration::from_secs(30));
            flag.store(!completed, Ordering::SeqCst);
        })
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        // Act
        let started = Instant::now();
        handle.stop();

        // Assert
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(woke_early.load(Ordering::SeqCst));
    }

    #[test]
    fn test_spawned_thread_carries_role_name() {
        // Arrange
        let name = Arc::new(std::sync::Mutex::new(None));
        let seen = Arc::clone(&name);

        // Act
        let handle = SessionHandle::spawn(SessionRole::Recording, Uuid::new_v4(), move |_| {
            *seen.lock().unwrap() = thread::current().name().map(str::to_string);
        })
        .unwrap();
        handle.join();

        // Assert
        assert_eq!(name.lock().unwrap().as_deref(), Some("keymacro-recorder"));
    }

    #[test]
    fn test_is_finished_after_body_returns() {
        // Arrange
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handle = SessionHandle::spawn(SessionRole::Playing, Uuid::new_v4(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // Act
        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        // Assert
        assert!(handle.is_finished());
        handle.join();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_worker_is_joined_without_propagating() {
        let handle = SessionHandle::spawn(SessionRole::Recording, Uuid::new_v4(), |_| {
            panic!("worker blew up");
        })
        .unwrap();
        handle.stop();
    }

    #[test]
    fn test_role_display_names() {
        assert_eq!(SessionRole::Recording.to_string(), "recording");
        assert_eq!(SessionRole::Playing.to_string(), "playback");
    }
}
