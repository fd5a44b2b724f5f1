use std::fmt::Debug;

use zetta_shared::{
    crossbeam_channel::{self, Receiver, Sender},
    log::warn,
    parking_lot::Mutex,
};

/// List of channels that receive a copy of every published event.
pub(crate) struct Observers<E> {
    senders: Mutex<Vec<Sender<E>>>,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone + Debug> Observers<E> {
    pub fn observe(&self) -> Receiver<E> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.senders.lock().push(sender);
        receiver
    }

    /// Sends the event to all observers and removes the channels that are no longer active.
    pub fn publish(&self, event: E) {
        let mut senders = self.senders.lock();
        let mut outdated_channels = Vec::new();
        for (index, sender) in senders.iter().enumerate() {
            if let Err(err) = sender.send(event.clone()) {
                warn!("Failed to send {event:?}: \"{err}\". Channel will be removed.");
                outdated_channels.push(index);
            }
        }
        for index in outdated_channels.into_iter().rev() {
            senders.remove(index);
        }
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_all_observers() {
        let observers = Observers::default();
        let first = observers.observe();
        let second = observers.observe();
        observers.publish(7);
        assert_eq!(first.try_recv(), Ok(7));
        assert_eq!(second.try_recv(), Ok(7));
    }

    #[test]
    fn dropped_receivers_are_removed() {
        let observers = Observers::default();
        drop(observers.observe());
        let receiver = observers.observe();
        observers.publish("event");
        assert_eq!(observers.len(), 1);
        assert_eq!(receiver.try_recv(), Ok("event"));
    }
}
