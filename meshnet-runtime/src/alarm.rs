use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Callback = Box<dyn FnMut() + Send + 'static>;

struct State {
    deadline: Option<Instant>,
    callback: Option<Callback>,
    stopped: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// A reschedulable, single-shot timer.
///
/// Each `Alarm` owns one background thread that parks on a condition
/// variable until either its deadline elapses (the callback runs once and
/// the alarm goes idle again) or it is rescheduled or dropped. Rescheduling
/// replaces the pending deadline rather than queuing a second firing.
pub struct Alarm {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Alarm {
    pub fn new() -> Alarm {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                deadline: None,
                callback: None,
                stopped: false,
            }),
            condvar: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let thread = thread::spawn(move || run(worker_shared));

        Alarm {
            shared,
            thread: Some(thread),
        }
    }

    /// Arm the alarm to invoke `callback` after `delay`, replacing any
    /// pending firing.
    pub fn schedule<F>(&self, delay: Duration, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule_at(Instant::now() + delay, callback);
    }

    /// Arm the alarm to invoke `callback` at the absolute `deadline`,
    /// replacing any pending firing.
    pub fn schedule_at<F>(&self, deadline: Instant, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut state = self.lock();
        state.deadline = Some(deadline);
        state.callback = Some(Box::new(callback));
        drop(state);
        self.shared.condvar.notify_all();
    }

    /// Clear any pending firing without running its callback.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.deadline = None;
        state.callback = None;
        drop(state);
        self.shared.condvar.notify_all();
    }

    /// Stop the background thread and wait for it to exit, without running
    /// any pending callback. `Drop` does the same thing implicitly; this is
    /// for a caller that wants to observe the join explicitly (e.g. tests).
    pub fn join(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        {
            let mut state = self.lock();
            state.stopped = true;
        }
        self.shared.condvar.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .expect("meshnet-runtime: alarm mutex poisoned")
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl Default for Alarm {
    fn default() -> Alarm {
        Alarm::new()
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let mut state = shared
            .state
            .lock()
            .expect("meshnet-runtime: alarm mutex poisoned");

        loop {
            if state.stopped {
                return;
            }
            match state.deadline {
                None => {
                    state = shared
                        .condvar
                        .wait(state)
                        .expect("meshnet-runtime: alarm mutex poisoned");
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (guard, _) = shared
                        .condvar
                        .wait_timeout(state, deadline - now)
                        .expect("meshnet-runtime: alarm mutex poisoned");
                    state = guard;
                }
            }
        }

        let mut callback = state.callback.take();
        state.deadline = None;
        drop(state);

        if let Some(callback) = &mut callback {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn positive_fires_after_delay() {
        let alarm = Alarm::new();
        let (tx, rx) = mpsc::channel();
        alarm.schedule(Duration::from_millis(20), move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn positive_reschedule_replaces_pending_firing() {
        let alarm = Alarm::new();
        let (tx, rx) = mpsc::channel::<u32>();

        let tx1 = tx.clone();
        alarm.schedule(Duration::from_millis(500), move || {
            let _ = tx1.send(1);
        });

        let tx2 = tx.clone();
        alarm.schedule(Duration::from_millis(20), move || {
            let _ = tx2.send(2);
        });

        let fired = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(fired, 2);
        assert!(rx.recv_timeout(Duration::from_millis(600)).is_err());
    }

    #[test]
    fn positive_cancel_prevents_firing() {
        let alarm = Alarm::new();
        let (tx, rx) = mpsc::channel::<()>();
        alarm.schedule(Duration::from_millis(30), move || {
            let _ = tx.send(());
        });
        alarm.cancel();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn positive_schedule_at_fires_at_absolute_deadline() {
        let alarm = Alarm::new();
        let (tx, rx) = mpsc::channel();
        alarm.schedule_at(Instant::now() + Duration::from_millis(20), move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn positive_join_stops_background_thread_without_firing() {
        let alarm = Alarm::new();
        let (tx, rx) = mpsc::channel::<()>();
        alarm.schedule(Duration::from_millis(200), move || {
            let _ = tx.send(());
        });
        alarm.join();
        assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());
    }
}
