use super::{Batch, BatchBuilder, BuildStatus};
use crate::common::*;
use futures::stream::{self, Stream};
use std::{
    mem,
    ops::{Deref, DerefMut},
};

/// How often an idle producer checks the stop flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs a [BatchBuilder] on a dedicated thread and hands out completed
/// batches.
///
/// The batch slots circulate between a free queue and a ready queue. The
/// producer blocks when every slot is waiting to be consumed. A received
/// batch goes back to the free queue when its [BatchGuard] is dropped.
#[derive(Debug)]
pub struct Prefetcher {
    ready_rx: flume::Receiver<Result<Batch>>,
    free_tx: flume::Sender<Batch>,
    stop: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Prefetcher {
    pub fn spawn(builder: BatchBuilder, slots: Vec<Batch>) -> Result<Self> {
        ensure!(!slots.is_empty(), "at least one batch slot is required");
        let num_slots = slots.len();

        let (ready_tx, ready_rx) = flume::bounded(num_slots);
        let (free_tx, free_rx) = flume::bounded(num_slots);
        slots.into_iter().try_for_each(|batch| {
            free_tx
                .send(batch)
                .map_err(|_| format_err!("failed to queue the batch slot"))
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = thread::Builder::new()
            .name("image-data-prefetch".into())
            .spawn({
                let stop = stop.clone();
                move || prefetch_worker(builder, free_rx, ready_tx, stop)
            })
            .context("failed to spawn the prefetch worker")?;
        info!("prefetching with {} batch slots", num_slots);

        Ok(Self {
            ready_rx,
            free_tx,
            stop,
            worker: Some(worker),
        })
    }

    /// Block until the next batch is ready.
    pub fn recv(&self) -> Result<BatchGuard> {
        let result = self.ready_rx.recv().map_err(|_| worker_stopped())?;
        self.guard(result)
    }

    /// Wait for the next batch asynchronously.
    pub async fn recv_async(&self) -> Result<BatchGuard> {
        let result = self
            .ready_rx
            .recv_async()
            .await
            .map_err(|_| worker_stopped())?;
        self.guard(result)
    }

    /// Turn the prefetcher into a stream of batches that ends after the
    /// first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<BatchGuard>> + Send {
        stream::unfold(Some(self), |state| async move {
            let prefetcher = state?;
            let result = prefetcher.recv_async().await;
            match result {
                Ok(batch) => Some((Ok(batch), Some(prefetcher))),
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Ask the producer to stop and wait for it to finish its current record.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn guard(&self, result: Result<Batch>) -> Result<BatchGuard> {
        let batch = result.context("the prefetch worker failed")?;
        Ok(BatchGuard {
            batch: Some(batch),
            free_tx: self.free_tx.clone(),
        })
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| format_err!("the prefetch worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("{:#}", err);
        }
    }
}

fn worker_stopped() -> Error {
    format_err!("the prefetch worker has stopped")
}

fn prefetch_worker(
    mut builder: BatchBuilder,
    free_rx: flume::Receiver<Batch>,
    ready_tx: flume::Sender<Result<Batch>>,
    stop: Arc<AtomicBool>,
) {
    debug!("prefetch worker started");

    while !stop.load(Ordering::SeqCst) {
        let mut batch = match free_rx.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(batch) => batch,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };

        match builder.build(&mut batch, &stop) {
            Ok(BuildStatus::Complete) => {
                if ready_tx.send(Ok(batch)).is_err() {
                    break;
                }
            }
            Ok(BuildStatus::Cancelled) => break,
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                break;
            }
        }
    }

    debug!("prefetch worker stopped");
}

/// A batch lent to the consumer. Dropping it returns the batch slot to the
/// producer, so tensors that must outlive the guard have to be copied.
#[derive(Debug)]
pub struct BatchGuard {
    batch: Option<Batch>,
    free_tx: flume::Sender<Batch>,
}

impl Deref for BatchGuard {
    type Target = Batch;

    fn deref(&self) -> &Self::Target {
        self.batch.as_ref().expect("the batch is only taken on drop")
    }
}

impl DerefMut for BatchGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.batch.as_mut().expect("the batch is only taken on drop")
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if let Some(batch) = mem::take(&mut self.batch) {
            // the producer may be gone already
            let _ = self.free_tx.send(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        batch::BatchBuilderInit,
        config::TransformConfig,
        dataset::EpochIterator,
        processor::{DataTransformer, LabelEncoder},
        testing::{numbered_records, FakeLoader},
    };
    use futures::TryStreamExt as _;

    fn prefetcher(loader: FakeLoader, num_records: usize, num_slots: usize) -> Prefetcher {
        let mut iter = EpochIterator::new(numbered_records(num_records), false, 0);
        iter.initialize(0).unwrap();

        let builder = BatchBuilderInit {
            iter,
            loader: Box::new(loader),
            transform: Box::new(DataTransformer::new(&TransformConfig::default(), 0)),
            encoder: LabelEncoder::new(LabelLayout::Single, -1.0).unwrap(),
            root_folder: PathBuf::new(),
            resize: None,
            is_color: true,
            batch_size: NonZeroUsize::new(2).unwrap(),
            max_consecutive_failures: None,
            pending: None,
        }
        .build()
        .unwrap();
        let slots = (0..num_slots)
            .map(|_| Batch::new(2, [3, 4, 4], 1))
            .collect();

        Prefetcher::spawn(builder, slots).unwrap()
    }

    fn labels(batch: &Batch) -> Vec<f32> {
        Vec::<f32>::from(&batch.labels.flatten(0, -1))
    }

    #[test]
    fn ordered_batches_test() {
        let prefetcher = prefetcher(FakeLoader::new(4, 4), 3, 2);

        let received: Vec<_> = (0..4)
            .map(|_| {
                let batch = prefetcher.recv().unwrap();
                (batch.step, labels(&batch))
            })
            .collect();

        assert_eq!(
            received,
            vec![
                (0, vec![0.0, 1.0]),
                (1, vec![2.0, 0.0]),
                (2, vec![1.0, 2.0]),
                (3, vec![0.0, 1.0]),
            ]
        );
        prefetcher.stop().unwrap();
    }

    #[test]
    fn held_slots_block_producer_test() {
        let loader = FakeLoader::new(4, 4);
        let num_loads = loader.num_loads.clone();
        let prefetcher = prefetcher(loader, 100, 2);

        let first = prefetcher.recv().unwrap();
        let second = prefetcher.recv().unwrap();
        thread::sleep(Duration::from_millis(200));
        // both slots are held, nothing more is loaded
        assert_eq!(num_loads.load(Ordering::SeqCst), 4);

        drop(first);
        let third = prefetcher.recv().unwrap();
        assert_eq!(third.step, 2);

        drop((second, third));
        prefetcher.stop().unwrap();
    }

    #[test]
    fn worker_error_is_delivered_test() {
        let loader = FakeLoader::new(4, 4).unreadable(["000.jpg", "001.jpg"]);
        let prefetcher = prefetcher(loader, 2, 2);

        assert!(prefetcher.recv().is_err());
        let err = prefetcher.recv().unwrap_err();
        assert!(format!("{}", err).contains("stopped"));
    }

    #[test]
    fn stop_while_slots_held_test() {
        let prefetcher = prefetcher(FakeLoader::new(4, 4), 4, 1);
        let batch = prefetcher.recv().unwrap();
        prefetcher.stop().unwrap();
        // returning a slot after shutdown is harmless
        drop(batch);
    }

    #[tokio::test]
    async fn async_stream_test() {
        use futures::StreamExt as _;

        let prefetcher = prefetcher(FakeLoader::new(4, 4), 5, 3);
        let steps: Vec<_> = prefetcher
            .into_stream()
            .take(6)
            .map_ok(|batch| batch.step)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(steps, vec![0, 1, 2, 3, 4, 5]);
    }
}
