//! Background optimization loop of a trainer.
use super::base::StopSignal;
use crate::{Dataset, TrainerRole};
use anyhow::Result;
use log::{error, info};
use std::{
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::Duration,
};
use tandem_core::record::RecordSummary;

/// A trainer shared by its worker and its training task.
///
/// Every optimization step holds the lock, so readers never see a partial
/// update.
pub type SharedTrainer = Arc<Mutex<Box<dyn TrainerRole>>>;

/// Builds the dataset a task trains on.
pub type DatasetBuilder = Box<dyn FnOnce() -> Result<Box<dyn Dataset>> + Send>;

/// A running training task.
pub struct TrainingTask {
    stop: StopSignal,
    thread: Option<JoinHandle<()>>,
}

impl TrainingTask {
    /// Spawns the task.
    ///
    /// The task builds its dataset, polls every `poll_interval` until the
    /// dataset is good to learn, then runs optimization steps storing their
    /// records into `stats` until stopped or until a step fails.
    pub fn spawn(
        name: String,
        trainer: SharedTrainer,
        dataset: DatasetBuilder,
        poll_interval: Duration,
        stats: Arc<Mutex<RecordSummary>>,
    ) -> Self {
        let stop = StopSignal::new();
        let thread = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                if let Err(e) = run(&name, trainer, dataset, poll_interval, stats, stop) {
                    error!("{}: training failed: {}", name, e);
                }
                info!("{}: training task exits", name);
            })
        };

        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Returns `true` if the task has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Raises the stop signal and waits for the task.
    pub fn stop_and_join(&mut self) {
        self.stop.raise();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Training task panicked");
            }
        }
    }
}

impl Drop for TrainingTask {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run(
    name: &str,
    trainer: SharedTrainer,
    dataset: DatasetBuilder,
    poll_interval: Duration,
    stats: Arc<Mutex<RecordSummary>>,
    stop: StopSignal,
) -> Result<()> {
    let mut dataset = dataset()?;

    while !dataset.good_to_learn() {
        if stop.is_raised() {
            return Ok(());
        }
        std::thread::sleep(poll_interval);
    }
    info!("{}: starts learning", name);

    while !stop.is_raised() {
        let record = {
            let mut trainer = trainer
                .lock()
                .map_err(|_| anyhow::anyhow!("trainer lock poisoned"))?;
            trainer.train_record(dataset.as_mut())?
        };
        stats
            .lock()
            .map_err(|_| anyhow::anyhow!("stats lock poisoned"))?
            .store(record);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Weights;
    use tandem_core::record::Record;
    use test_log::test;

    struct Ready;

    impl Dataset for Ready {
        fn good_to_learn(&self) -> bool {
            true
        }
    }

    /// Reports a loss of `1 / step` and fails after `limit` steps.
    struct Decaying {
        step: usize,
        limit: usize,
    }

    impl TrainerRole for Decaying {
        fn get_weights(&self) -> Weights {
            Weights::new()
        }

        fn set_weights(&mut self, _weights: Weights) -> Result<()> {
            Ok(())
        }

        fn train_record(&mut self, _dataset: &mut dyn Dataset) -> Result<Record> {
            if self.step == self.limit {
                anyhow::bail!("done");
            }
            self.step += 1;
            Ok(Record::from_scalar("loss", 1.0 / self.step as f32))
        }

        fn train_step(&self) -> usize {
            self.step
        }
    }

    #[test]
    fn test_stats_are_folded_while_training() -> Result<()> {
        let trainer: SharedTrainer = Arc::new(Mutex::new(Box::new(Decaying { step: 0, limit: 1000 })));
        let stats = Arc::new(Mutex::new(RecordSummary::new()));
        let dataset: DatasetBuilder = Box::new(|| Ok(Box::new(Ready) as Box<dyn Dataset>));

        let task = TrainingTask::spawn(
            "trainer".to_string(),
            trainer,
            dataset,
            Duration::from_millis(1),
            stats.clone(),
        );
        while !task.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }

        let record = stats.lock().unwrap().aggregate();
        assert_eq!(record.len(), 3);
        assert_eq!(record.get_scalar("loss_min")?, 1.0 / 1000.0);
        assert_eq!(record.get_scalar("loss_max")?, 1.0);
        assert!(record.get_scalar("loss_mean")? < 0.01);
        assert!(stats.lock().unwrap().is_empty());
        Ok(())
    }
}
