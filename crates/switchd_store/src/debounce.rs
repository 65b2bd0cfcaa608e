//!Debounced persistence for dimming levels. A UI slider can emit many
//!updates per second; writing each one through would hammer the settings
//!file, so updates sit in a pending map until a quiet period passes, then
//!each channel gets at most one durable write of its final value.

use crate::SharedStore;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

///Quiet period after the last update before the flush.
pub const QUIET_PERIOD: Duration = Duration::from_secs(1);

const QUEUE: usize = 32;

pub struct DimmingWriter {
    join_handle: JoinHandle<()>,
    tx: mpsc::Sender<(String, i64)>,
}

impl DimmingWriter {
    pub fn spawn(store: SharedStore) -> Self {
        let (tx, mut rx) = mpsc::channel::<(String, i64)>(QUEUE);

        let join_handle = tokio::spawn(async move {
            let mut pending: HashMap<String, i64> = HashMap::new();
            let mut deadline: Option<Instant> = None;
            loop {
                tokio::select! {
                    update = rx.recv() => match update {
                        Some((key, value)) => {
                            pending.insert(key, value);
                            //every update refreshes the single shared timer
                            deadline = Some(Instant::now() + QUIET_PERIOD);
                        }
                        None => {
                            //all handles dropped: flush whatever is pending
                            //before exiting
                            flush(&store, &mut pending);
                            break;
                        }
                    },
                    () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        flush(&store, &mut pending);
                        deadline = None;
                    }
                }
            }
            debug!("dimming writer shutting down");
        });

        DimmingWriter { join_handle, tx }
    }

    ///Queue a dimming change for the given settings key. Does not write
    ///through; the value lands in the store after the quiet period.
    pub async fn record(&self, key: &str, value: i64) -> bool {
        self.tx.send((key.to_string(), value)).await.is_ok()
    }

    ///Flush any pending values synchronously and stop the writer. Called
    ///on process shutdown so no dimming change is lost.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(err) = self.join_handle.await {
            warn!("dimming writer task failed: {}", err);
        }
    }
}

fn flush(store: &SharedStore, pending: &mut HashMap<String, i64>) {
    if pending.is_empty() {
        return;
    }
    let mut store = store.lock().expect("settings store lock");
    for (key, value) in pending.drain() {
        //skip channels whose persisted value already matches
        if store.get_int(&key) == Some(value) {
            continue;
        }
        if !store.set_int(&key, value) {
            warn!("dimming value {} for {} was refused by the store", value, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SettingValue, SettingsStore};
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    fn store_with(key: &str) -> SharedStore {
        let mut store = SettingsStore::in_memory();
        store.register(key, SettingValue::Int(0), Some(0), Some(100));
        Arc::new(Mutex::new(store))
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_updates_coalesce_to_one_write() {
        let store = store_with("dimming_pwm_1");
        let writer = DimmingWriter::spawn(store.clone());

        assert!(writer.record("dimming_pwm_1", 10).await);
        sleep(Duration::from_millis(300)).await;
        assert!(writer.record("dimming_pwm_1", 20).await);
        sleep(Duration::from_millis(300)).await;
        assert!(writer.record("dimming_pwm_1", 30).await);

        //quiet period has not elapsed since the last update
        sleep(Duration::from_millis(900)).await;
        assert_eq!(store.lock().unwrap().get_int("dimming_pwm_1"), Some(0));

        sleep(Duration::from_millis(200)).await;
        let store = store.lock().unwrap();
        assert_eq!(store.get_int("dimming_pwm_1"), Some(30));
        assert_eq!(store.write_count(), 1);

        writer.join_handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn separate_channels_flush_independently() {
        let store = store_with("dimming_pwm_1");
        store
            .lock()
            .unwrap()
            .register("dimming_pwm_2", SettingValue::Int(0), Some(0), Some(100));
        let writer = DimmingWriter::spawn(store.clone());

        assert!(writer.record("dimming_pwm_1", 40).await);
        assert!(writer.record("dimming_pwm_2", 60).await);
        sleep(Duration::from_millis(1100)).await;

        let guard = store.lock().unwrap();
        assert_eq!(guard.get_int("dimming_pwm_1"), Some(40));
        assert_eq!(guard.get_int("dimming_pwm_2"), Some(60));
        assert_eq!(guard.write_count(), 2);
        drop(guard);

        writer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_values() {
        let store = store_with("dimming_pwm_1");
        let writer = DimmingWriter::spawn(store.clone());

        assert!(writer.record("dimming_pwm_1", 77).await);
        //well inside the quiet period
        sleep(Duration::from_millis(100)).await;
        writer.shutdown().await;

        assert_eq!(store.lock().unwrap().get_int("dimming_pwm_1"), Some(77));
        assert_eq!(store.lock().unwrap().write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_value_is_not_rewritten() {
        let store = store_with("dimming_pwm_1");
        let writer = DimmingWriter::spawn(store.clone());

        assert!(writer.record("dimming_pwm_1", 0).await);
        sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.lock().unwrap().write_count(), 0);
        writer.shutdown().await;
    }
}
