//! Run control
//!
//! The operations behind the command line: start, update, stop, status,
//! health and reset of the single process-wide run. Input validation and
//! the start conflicts live here so the pipeline components can assume a
//! well-formed [`RunState`].

mod error;

pub use error::{ControlError, ControlResult};

use crate::state::{RunState, RunStatePatch, StateStore};
use chrono::Utc;
use log::info;

#[derive(Debug, Clone)]
pub struct RunControl {
    store: StateStore,
}

impl RunControl {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Begin a run of `target_units` jobs per `window_minutes`
    ///
    /// Refused while a run is active or while jobs of the previous run are
    /// still unprocessed. Counters restart from zero; job ids keep growing.
    pub async fn start(&self, target_units: u64, window_minutes: f64) -> ControlResult<RunState> {
        validate_rate(target_units, window_minutes)?;

        if let Some(current) = self.store.try_get_state().await? {
            if current.running {
                return Err(ControlError::AlreadyRunning);
            }
            if current.in_flight() > 0 {
                return Err(ControlError::JobsInFlight {
                    in_flight: current.in_flight(),
                });
            }
        }

        let state = RunState {
            running: true,
            target_units,
            window_minutes,
            enqueued: 0,
            processed: 0,
            started_at: Some(Utc::now()),
        };
        self.store.set_state(&state).await?;
        self.store.publish_progress().await;
        info!(
            "Run started: {} units over {} minute(s)",
            target_units, window_minutes
        );
        Ok(state)
    }

    /// Change the rate of the active run, keeping its counters
    pub async fn update(&self, target_units: u64, window_minutes: f64) -> ControlResult<RunState> {
        validate_rate(target_units, window_minutes)?;

        let current = self.store.try_get_state().await?.unwrap_or_default();
        if !current.running {
            return Err(ControlError::NotRunning);
        }

        let state = self
            .store
            .patch_state(&RunStatePatch::rate(target_units, window_minutes))
            .await?;
        self.store.publish_progress().await;
        info!(
            "Run updated: {} units over {} minute(s)",
            target_units, window_minutes
        );
        Ok(state)
    }

    /// Halt admission; queued jobs are still consumed and counted
    pub async fn stop(&self) -> ControlResult<RunState> {
        let current = self.store.try_get_state().await?.unwrap_or_default();
        if !current.running {
            return Err(ControlError::NotRunning);
        }

        let state = self.store.patch_state(&RunStatePatch::running(false)).await?;
        self.store.publish_progress().await;
        info!(
            "Run stopped: {} enqueued, {} processed",
            state.enqueued, state.processed
        );
        Ok(state)
    }

    pub async fn status(&self) -> RunState {
        self.store.get_state().await
    }

    /// Whether the state store answers
    pub async fn health(&self) -> bool {
        self.store.is_connected().await
    }

    /// Forget the run configuration and zero the counters
    pub async fn reset(&self) -> ControlResult<()> {
        self.store.reset().await?;
        self.store.publish_progress().await;
        Ok(())
    }
}

fn validate_rate(target_units: u64, window_minutes: f64) -> ControlResult<()> {
    if target_units == 0 {
        return Err(ControlError::InvalidArgument {
            field: "targetUnits",
            message: "targetUnits must be greater than 0".to_string(),
        });
    }
    if !window_minutes.is_finite() || window_minutes <= 0.0 {
        return Err(ControlError::InvalidArgument {
            field: "windowMinutes",
            message: format!(
                "windowMinutes must be a positive number, got {}",
                window_minutes
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryStateBackend, StoreSettings};
    use std::sync::Arc;

    fn control() -> (RunControl, StateStore, Arc<MemoryStateBackend>) {
        let backend = Arc::new(MemoryStateBackend::new());
        let store = StateStore::new(backend.clone(), StoreSettings::default());
        (RunControl::new(store.clone()), store, backend)
    }

    #[tokio::test]
    async fn test_start_sets_running_state_with_zero_counters() {
        let (control, store, _) = control();

        let state = control.start(100, 1.0).await.unwrap();

        assert!(state.running);
        assert!(state.started_at.is_some());
        let stored = store.get_state().await;
        assert_eq!(stored, state);
        assert_eq!(stored.rate_per_minute(), Some(100.0));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_rates() {
        let (control, store, _) = control();

        assert!(matches!(
            control.start(0, 1.0).await,
            Err(ControlError::InvalidArgument { field: "targetUnits", .. })
        ));
        for window in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                control.start(10, window).await,
                Err(ControlError::InvalidArgument { field: "windowMinutes", .. })
            ));
        }
        assert!(!store.get_state().await.running);
    }

    #[tokio::test]
    async fn test_second_start_conflicts() {
        let (control, _, _) = control();
        control.start(10, 1.0).await.unwrap();

        assert!(matches!(
            control.start(20, 1.0).await,
            Err(ControlError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_start_refused_while_previous_jobs_in_flight() {
        let (control, store, _) = control();
        control.start(10, 1.0).await.unwrap();
        store.increment_enqueued().await.unwrap();
        store.increment_enqueued().await.unwrap();
        store.increment_processed().await.unwrap();
        control.stop().await.unwrap();

        assert!(matches!(
            control.start(10, 1.0).await,
            Err(ControlError::JobsInFlight { in_flight: 1 })
        ));

        store.increment_processed().await.unwrap();
        let restarted = control.start(10, 1.0).await.unwrap();
        assert_eq!((restarted.enqueued, restarted.processed), (0, 0));
    }

    #[tokio::test]
    async fn test_update_keeps_counters_and_requires_active_run() {
        let (control, store, _) = control();
        assert!(matches!(
            control.update(50, 2.0).await,
            Err(ControlError::NotRunning)
        ));

        control.start(10, 1.0).await.unwrap();
        store.increment_enqueued().await.unwrap();
        let updated = control.update(50, 2.0).await.unwrap();

        assert!(updated.running);
        assert_eq!(updated.target_units, 50);
        assert_eq!(updated.window_minutes, 2.0);
        assert_eq!(updated.enqueued, 1);
    }

    #[tokio::test]
    async fn test_stop_preserves_counters() {
        let (control, store, _) = control();
        control.start(10, 1.0).await.unwrap();
        store.increment_enqueued().await.unwrap();

        let stopped = control.stop().await.unwrap();

        assert!(!stopped.running);
        assert_eq!(stopped.enqueued, 1);
        assert_eq!(stopped.target_units, 10);
    }

    #[tokio::test]
    async fn test_stop_without_active_run_is_refused() {
        let (control, store, _) = control();
        assert!(matches!(control.stop().await, Err(ControlError::NotRunning)));
        assert!(store.try_get_state().await.unwrap().is_none());

        control.start(10, 1.0).await.unwrap();
        control.stop().await.unwrap();
        assert!(matches!(control.stop().await, Err(ControlError::NotRunning)));
    }

    #[tokio::test]
    async fn test_health_and_status_follow_store_availability() {
        let (control, _, backend) = control();
        control.start(10, 1.0).await.unwrap();
        assert!(control.health().await);

        backend.set_available(false);

        assert!(!control.health().await);
        assert!(!control.status().await.running);
        assert!(matches!(
            control.start(10, 1.0).await,
            Err(ControlError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_run() {
        let (control, store, _) = control();
        control.start(10, 1.0).await.unwrap();
        store.increment_enqueued().await.unwrap();

        control.reset().await.unwrap();

        assert_eq!(store.try_get_state().await.unwrap(), None);
        assert_eq!(control.status().await, RunState::default());
    }
}
