//! Warm supply of bootstrapped, empty emulator instances. Bootstrap is the
//! dominant latency of a cold write; a steady-state pool of size `N`
//! amortizes it to zero under load `<= N`.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::warn;

use crate::common::Result;
use crate::runtime::{Emulator, EmulatorFactory};

pub struct InstancePool {
    ready_tx: Sender<Box<dyn Emulator>>,
    ready_rx: Receiver<Box<dyn Emulator>>,
    factory: Arc<dyn EmulatorFactory>,
}

impl InstancePool {
    /// Create a pool that keeps `capacity` instances warm. The initial fill
    /// runs on background threads; early `take()` calls simply fall back to
    /// synchronous bootstrap until the queue catches up.
    pub fn new(factory: Arc<dyn EmulatorFactory>, capacity: usize) -> Self {
        let (ready_tx, ready_rx) = bounded(capacity.max(1));
        let pool = Self {
            ready_tx,
            ready_rx,
            factory,
        };
        for _ in 0..capacity {
            pool.replenish();
        }
        pool
    }

    /// Hand out one bootstrapped instance. Fast path is a non-blocking pop
    /// from the queue, scheduling exactly one replacement bootstrap. An empty
    /// queue falls back to bootstrapping on the caller, eating the full cost
    /// on this one request instead of queueing behind it.
    pub fn take(&self) -> Result<Box<dyn Emulator>> {
        match self.ready_rx.try_recv() {
            Ok(emu) => {
                self.replenish();
                Ok(emu)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                warn!("instance pool drained; bootstrapping synchronously");
                self.factory.bootstrap()
            }
        }
    }

    /// Number of instances currently warm.
    pub fn len(&self) -> usize {
        self.ready_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready_rx.is_empty()
    }

    /// Fire-and-forget background bootstrap of one replacement. A failure
    /// leaves the slot empty (the next `take()` falls back to synchronous
    /// bootstrap) and is only reported to telemetry.
    fn replenish(&self) {
        let factory = self.factory.clone();
        let ready_tx = self.ready_tx.clone();
        thread::spawn(move || match factory.bootstrap() {
            // a full queue should not happen (one taken per one produced),
            // but dropping the extra instance is always safe
            Ok(emu) => {
                let _ = ready_tx.try_send(emu);
            }
            Err(e) => warn!("background emulator bootstrap failed: {}", e),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::runtime::MemChainFactory;

    struct CountingFactory {
        inner: MemChainFactory,
        bootstraps: AtomicUsize,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                inner: MemChainFactory,
                bootstraps: AtomicUsize::new(0),
            }
        }
    }

    impl EmulatorFactory for CountingFactory {
        fn bootstrap(&self) -> Result<Box<dyn Emulator>> {
            self.bootstraps.fetch_add(1, Ordering::SeqCst);
            self.inner.bootstrap()
        }
    }

    fn wait_for(pool: &InstancePool, len: usize) {
        for _ in 0..500 {
            if pool.len() >= len {
                return
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("pool never refilled to {}", len);
    }

    #[test]
    fn test_take_replenishes_to_capacity() {
        let factory = Arc::new(CountingFactory::new());
        let pool = InstancePool::new(factory.clone(), 3);
        wait_for(&pool, 3);
        for _ in 0..5 {
            let _ = pool.take().unwrap();
        }
        wait_for(&pool, 3);
        // 3 initial + one replacement per warm take; drained takes bootstrap
        // inline and schedule nothing
        assert!(factory.bootstraps.load(Ordering::SeqCst) >= 8);
    }

    #[test]
    fn test_drained_pool_falls_back_synchronously() {
        let factory = Arc::new(CountingFactory::new());
        let pool = InstancePool::new(factory, 0);
        // capacity zero can never have a warm instance ready
        let emu = pool.take().unwrap();
        assert_eq!(emu.latest_block_height(), 0);
    }
}
