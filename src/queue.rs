use {
    crossbeam_channel::{Receiver, Sender},
    std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
    },
};

/// Capacity of the queue between producers and the background writer.
pub(crate) const QUEUE_CAPACITY: usize = 1024;

/// Name of the thread that drains the queue.
pub(crate) const WRITER_THREAD_NAME: &str = "rollfile-writer";

/// Bounded FIFO of formatted lines waiting for the background writer.
///
/// Producers block while the queue is full. Once the queue is closed to new
/// writes every enqueue is silently dropped. Lines enqueued from the writer
/// thread itself are dropped too, since it cannot wait on its own queue.
pub(crate) struct WriteQueue {
    sender: Sender<String>,
    closed: AtomicBool,
}

impl WriteQueue {
    /// Create a queue and the receiving end for its only consumer.
    pub(crate) fn new() -> (Self, Receiver<String>) {
        let (sender, receiver) = crossbeam_channel::bounded(QUEUE_CAPACITY);
        (
            WriteQueue {
                sender,
                closed: AtomicBool::new(false),
            },
            receiver,
        )
    }

    pub(crate) fn enqueue(&self, line: String) {
        if self.is_closed() || on_writer_thread() {
            return;
        }
        // Fails only once the consumer is gone; the line is dropped.
        let _ = self.sender.send(line);
    }

    /// Stop accepting lines. Lines already queued stay queued.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn on_writer_thread() -> bool {
    thread::current().name() == Some(WRITER_THREAD_NAME)
}
