use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs independent producers on their own tasks and merges what they emit
/// into one stream. Result order across producers is unspecified.
#[derive(Debug, Clone)]
pub struct Executor {
    workers: usize,
}

impl Executor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(workers)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn one task per producer and fan their output into a [`Merged`].
    ///
    /// Producers are drained lazily: each value is computed only once the
    /// previous one has been handed to the merge channel. Every producer
    /// checks for cancellation before each send.
    pub fn fan_in<P>(&self, cancel: &CancellationToken, producers: Vec<P>) -> Merged
    where
        P: Iterator<Item = bool> + Send + 'static,
    {
        let token = cancel.child_token();
        let (tx, rx) = mpsc::channel(self.workers);
        let mut tasks = JoinSet::new();

        for producer in producers {
            let tx = tx.clone();
            let token = token.clone();
            tasks.spawn(async move {
                for value in producer {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        sent = tx.send(value) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }

        // The channel closes once the last producer finishes.
        drop(tx);

        Merged {
            rx,
            tasks,
            cancel: token,
            remaining: None,
        }
    }
}

/// Merged output of a fan-in.
///
/// Dropping it (or exhausting it) cancels every producer that is still
/// running.
pub struct Merged {
    rx: mpsc::Receiver<bool>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    remaining: Option<usize>,
}

impl Merged {
    /// Yield at most `n` results, then stop the producers.
    pub fn take(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    /// `None` once every producer is done, the take limit is reached, or the
    /// governing token is cancelled. Calling it again after that keeps
    /// returning `None`.
    pub async fn next(&mut self) -> Option<bool> {
        if self.remaining == Some(0) {
            self.stop();
            return None;
        }

        let value = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            value = self.rx.recv() => value,
        };

        match value {
            Some(found) => {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                Some(found)
            }
            None => {
                self.stop();
                None
            }
        }
    }

    /// Cancel the producers and wait until every one of them has exited.
    /// Returns how many tasks were joined.
    pub async fn shutdown(mut self) -> usize {
        self.stop();
        let mut joined = 0;
        while self.tasks.join_next().await.is_some() {
            joined += 1;
        }
        joined
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }
}

impl Drop for Merged {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
