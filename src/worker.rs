use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::capture::{FrameRequest, FrameResponse};
use crate::detection::Detector;
use crate::runtime::AppEvent;

/// Background thread that performs frame requests one at a time and posts
/// each completion back onto the event loop
pub struct FrameWorker {
    tx: Option<Sender<FrameRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl FrameWorker {
    pub fn spawn<D: Detector>(detector: D, events: Sender<AppEvent>) -> Self {
        let (tx, rx) = mpsc::channel::<FrameRequest>();

        let handle = thread::spawn(move || {
            while let Ok(request) = rx.recv() {
                let generation = request.generation;
                let outcome = detector.detect(request.jpeg);
                debug!(generation, ok = outcome.is_ok(), "frame request finished");

                // the annotated image is decoded here, before the loop sees the completion
                let response = FrameResponse::new(generation, outcome);
                if events.send(AppEvent::Frame(response)).is_err() {
                    break;
                }
            }
            info!("frame worker exiting");
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queue a request. Returns false if the worker has gone away.
    pub fn submit(&self, request: FrameRequest) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok())
    }

    /// Close the queue and wait for the in-flight request to finish
    pub fn join(mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        // closing the channel ends the thread once the current request returns;
        // the thread is not joined, so exit never waits on a slow server
        self.tx.take();
    }
}
