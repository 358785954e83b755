//! A dedicated thread for one-off native setup work.
//!
//! Probe contexts and their hidden drawables must be created away from the
//! application's UI thread, and on some toolkits all of them have to come
//! from the same thread. A [`BootstrapThread`] is a long lived worker that
//! runs submitted closures one at a time and hands the result back to the
//! submitting thread.

use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A long lived worker thread executing submitted closures in order.
#[derive(Debug)]
pub(crate) struct BootstrapThread {
    sender: Mutex<Option<Sender<Job>>>,
    joiner: Mutex<Option<JoinHandle<()>>>,
}

impl BootstrapThread {
    /// Spawn the worker. The `name` shows up in thread listings and panic
    /// messages.
    pub(crate) fn spawn(name: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let joiner = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .expect("failed to spawn bootstrap thread");

        Self { sender: Mutex::new(Some(sender)), joiner: Mutex::new(Some(joiner)) }
    }

    /// Run `job` on the worker thread, blocking until it finished.
    ///
    /// # Panics
    ///
    /// Panics when the worker died, which only happens when a previous job
    /// panicked.
    pub(crate) fn execute<T, F>(&self, job: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_sender, result_receiver) = mpsc::channel();
        {
            let sender = self.sender.lock().unwrap();
            let sender = sender.as_ref().expect("bootstrap thread already shut down");
            sender
                .send(Box::new(move || {
                    // The receiver may be gone when the submitter panicked
                    // while waiting.
                    let _ = result_sender.send(job());
                }))
                .expect("bootstrap thread died");
        }
        result_receiver.recv().expect("bootstrap thread died")
    }
}

impl Drop for BootstrapThread {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        drop(self.sender.lock().unwrap().take());
        if let Some(joiner) = self.joiner.lock().unwrap().take() {
            let _ = joiner.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn jobs_run_on_one_persistent_thread() {
        let bootstrap = BootstrapThread::spawn("test bootstrap");
        let first = bootstrap.execute(|| thread::current().id());
        let second = bootstrap.execute(|| thread::current().id());
        assert_eq!(first, second);
        assert_ne!(first, thread::current().id());
    }

    #[test]
    fn results_come_back_to_the_submitter() {
        let bootstrap = BootstrapThread::spawn("test bootstrap");
        let doubled: Vec<_> = (0..32).map(|n| bootstrap.execute(move || n * 2)).collect();
        assert_eq!(doubled, (0..32).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_submitters_are_serialized() {
        let bootstrap = Arc::new(BootstrapThread::spawn("test bootstrap"));
        let counter = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let bootstrap = bootstrap.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        let counter = counter.clone();
                        bootstrap.execute(move || {
                            let seen = counter.load(Ordering::Relaxed);
                            counter.store(seen + 1, Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn drop_joins_the_worker() {
        let bootstrap = BootstrapThread::spawn("test bootstrap");
        bootstrap.execute(|| ());
        drop(bootstrap);
    }
}
