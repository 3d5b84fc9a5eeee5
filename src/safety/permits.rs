/// Concurrency cap for in-flight executions
///
/// A fixed pool of tokens lives in a bounded channel. Taking a token admits
/// one execution; dropping the [`Permit`] puts it back.
use crate::config::types::{CoderunError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

#[derive(Debug, Clone)]
pub struct ExecutionPermits {
    capacity: usize,
    give_back: Sender<()>,
    take: Receiver<()>,
}

impl ExecutionPermits {
    pub fn new(capacity: usize) -> Self {
        let (give_back, take) = bounded(capacity);
        for _ in 0..capacity {
            // Channel capacity equals the token count, this cannot block.
            let _ = give_back.try_send(());
        }
        Self {
            capacity,
            give_back,
            take,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.take.len()
    }

    /// Block until a slot frees up
    pub fn acquire(&self) -> Result<Permit> {
        self.take
            .recv()
            .map_err(|_| CoderunError::Process("execution permit pool closed".to_string()))?;
        Ok(Permit {
            give_back: self.give_back.clone(),
        })
    }
}

/// One admitted execution
#[derive(Debug)]
pub struct Permit {
    give_back: Sender<()>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.give_back.try_send(());
    }
}
