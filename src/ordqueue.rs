use crate::error::*;
use crossbeam_channel::{Receiver, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Sending half. Clone it for every producer thread.
pub struct OrdQueue<T> {
    sender: Sender<ReverseTuple<T>>,
}

impl<T> Clone for OrdQueue<T> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

/// Yields items sorted by their index, starting at 0
pub struct OrdQueueIter<T> {
    receiver: Receiver<ReverseTuple<T>>,
    next_index: usize,
    receive_buffer: BinaryHeap<ReverseTuple<T>>,
}

pub fn new<T>(depth: usize) -> (OrdQueue<T>, OrdQueueIter<T>) {
    let (sender, receiver) = crossbeam_channel::bounded(depth);
    (OrdQueue { sender }, OrdQueueIter {
        receiver,
        next_index: 0,
        receive_buffer: BinaryHeap::new(),
    })
}

impl<T: Send + 'static> OrdQueue<T> {
    /// Blocks when the queue is full. Fails once the receiving side is gone.
    pub fn push(&self, index: usize, item: T) -> CatResult<()> {
        self.sender.send(ReverseTuple(index, item))
            .map_err(|_| Error::EncodeFailure("frame queue closed".into()))
    }
}

impl<T> Iterator for OrdQueueIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.receive_buffer.peek().map(|i| i.0) != Some(self.next_index) {
            match self.receiver.recv() {
                Ok(item) => self.receive_buffer.push(item),
                // all senders dropped, and the next index will never arrive
                Err(_) => return None,
            }
        }

        let item = self.receive_buffer.pop()?;
        self.next_index += 1;
        Some(item.1)
    }
}

struct ReverseTuple<T>(usize, T);
impl<T> PartialEq for ReverseTuple<T> {
    fn eq(&self, o: &Self) -> bool { o.0.eq(&self.0) }
}
impl<T> Eq for ReverseTuple<T> {}
impl<T> PartialOrd for ReverseTuple<T> {
    fn partial_cmp(&self, o: &Self) -> Option<Ordering> { Some(self.cmp(o)) }
}
impl<T> Ord for ReverseTuple<T> {
    fn cmp(&self, o: &Self) -> Ordering { o.0.cmp(&self.0) }
}

#[test]
fn yields_in_index_order() {
    let (queue, iter) = new(8);
    for &i in &[3, 1, 0, 4, 2] {
        queue.push(i, i * 10).unwrap();
    }
    drop(queue);
    assert_eq!(iter.collect::<Vec<_>>(), vec![0, 10, 20, 30, 40]);
}

#[test]
fn stops_at_missing_index() {
    let (queue, iter) = new(8);
    queue.push(0, 'a').unwrap();
    queue.push(2, 'c').unwrap();
    drop(queue);
    assert_eq!(iter.collect::<String>(), "a");
}

#[test]
fn producers_on_threads() {
    let (queue, iter) = new(2);
    let handles: Vec<_> = (0..3).map(|t| {
        let queue = queue.clone();
        std::thread::spawn(move || {
            for i in (t..30).step_by(3) {
                queue.push(i, i).unwrap();
            }
        })
    }).collect();
    drop(queue);
    let items: Vec<usize> = iter.collect();
    assert_eq!(items, (0..30).collect::<Vec<_>>());
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn push_fails_without_receiver() {
    let (queue, iter) = new::<u8>(1);
    drop(iter);
    assert!(queue.push(0, 1).is_err());
}
