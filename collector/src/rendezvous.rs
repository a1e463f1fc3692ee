//! One-shot handoff of a value from one task to another within a single scrape.
//!
//! The sender is consumed by either [`deliver`](RendezvousSender::deliver) or
//! [`close`](RendezvousSender::close), so it can resolve at most once, and dropping it unresolved closes the
//! rendezvous. The receiver is consumed by [`recv`](RendezvousReceiver::recv). A waiting receiver therefore
//! always wakes up, either with the value or with `None`.

use tokio::sync::oneshot;

pub fn channel<T>() -> (RendezvousSender<T>, RendezvousReceiver<T>) {
    let (sender, receiver) = oneshot::channel();
    (RendezvousSender { sender }, RendezvousReceiver { receiver })
}

#[derive(Debug)]
pub struct RendezvousSender<T> {
    sender: oneshot::Sender<T>,
}

impl<T> RendezvousSender<T> {
    /// Hands `value` over. Returns `false` if the receiver is already gone.
    pub fn deliver(self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }

    /// Signals that no value will come.
    pub fn close(self) {
        drop(self.sender);
    }
}

#[derive(Debug)]
pub struct RendezvousReceiver<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> RendezvousReceiver<T> {
    /// Waits for the value; `None` once the sender closed without delivering.
    pub async fn recv(self) -> Option<T> {
        self.receiver.await.ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_once() {
        let (sender, receiver) = channel();
        let waiting = tokio::spawn(receiver.recv());

        assert!(sender.deliver(vec!["d1"]));
        assert_eq!(waiting.await.unwrap(), Some(vec!["d1"]));
    }

    #[tokio::test]
    async fn close_wakes_the_receiver_with_nothing() {
        let (sender, receiver) = channel::<u32>();
        let waiting = tokio::spawn(receiver.recv());

        tokio::time::sleep(Duration::from_millis(10)).await;
        sender.close();

        assert_eq!(waiting.await.unwrap(), None);
    }

    #[tokio::test]
    async fn dropping_the_sender_closes() {
        let (sender, receiver) = channel::<u32>();
        drop(sender);
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn delivering_to_a_dropped_receiver_is_reported() {
        let (sender, receiver) = channel();
        drop(receiver);
        assert!(!sender.deliver(1));
    }
}
