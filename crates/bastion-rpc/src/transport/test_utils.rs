//! Test helpers for the transport module.

use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use super::ConnectionHandler;

/// Counts connections and keeps each one open for `hold`.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
    hold: Duration,
}

impl CountingHandler {
    pub(crate) fn new(hold: Duration) -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
            hold,
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: TcpStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.hold);
    }
}
