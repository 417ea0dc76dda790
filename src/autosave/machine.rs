use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Observable autosave state of one document.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Everything an observer of the coordinator gets to see.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SaveSnapshot {
    pub status: SaveStatus,
    pub last_saved: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveEvent {
    EditNotified,
    TimerFired,
    SaveNow,
    SaveSucceeded { at: DateTime<Utc> },
    SaveFailed { reason: String },
    SetEnabled(bool),
}

/// Side effects requested by [`AutosaveMachine::handle`]. The driver applies
/// them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// (Re)start the debounce timer, replacing any armed one.
    ArmTimer,
    CancelTimer,
    /// Serialize the current document and persist it.
    StartSave,
}

/// Debounce and single-flight bookkeeping, free of clocks and I/O.
#[derive(Debug, Clone)]
pub struct AutosaveMachine {
    status: SaveStatus,
    in_flight: bool,
    pending: bool,
    enabled: bool,
    last_saved: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Default for AutosaveMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AutosaveMachine {
    pub fn new() -> Self {
        Self {
            status: SaveStatus::Idle,
            in_flight: false,
            pending: false,
            enabled: true,
            last_saved: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn snapshot(&self) -> SaveSnapshot {
        SaveSnapshot {
            status: self.status,
            last_saved: self.last_saved,
            last_error: self.last_error.clone(),
        }
    }

    pub fn handle(&mut self, event: AutosaveEvent) -> Vec<Effect> {
        debug!(?event, status = ?self.status, in_flight = self.in_flight, pending = self.pending, "Autosave event.");
        match event {
            AutosaveEvent::EditNotified => {
                if self.enabled {
                    vec![Effect::ArmTimer]
                } else {
                    Vec::new()
                }
            }
            AutosaveEvent::TimerFired => self.attempt_save(),
            AutosaveEvent::SaveNow => {
                let mut effects = vec![Effect::CancelTimer];
                effects.extend(self.attempt_save());
                effects
            }
            AutosaveEvent::SaveSucceeded { at } => {
                self.status = SaveStatus::Saved;
                self.last_saved = Some(at);
                self.last_error = None;
                self.finish_save()
            }
            AutosaveEvent::SaveFailed { reason } => {
                self.status = SaveStatus::Error;
                self.last_error = Some(reason);
                self.finish_save()
            }
            AutosaveEvent::SetEnabled(enabled) => {
                self.enabled = enabled;
                if enabled {
                    Vec::new()
                } else {
                    vec![Effect::CancelTimer]
                }
            }
        }
    }

    fn attempt_save(&mut self) -> Vec<Effect> {
        if self.in_flight {
            self.pending = true;
            return Vec::new();
        }
        self.in_flight = true;
        self.status = SaveStatus::Saving;
        vec![Effect::StartSave]
    }

    fn finish_save(&mut self) -> Vec<Effect> {
        self.in_flight = false;
        if self.pending {
            self.pending = false;
            self.attempt_save()
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded() -> AutosaveEvent {
        AutosaveEvent::SaveSucceeded { at: Utc::now() }
    }

    #[test]
    fn test_edits_only_arm_the_timer() {
        let mut machine = AutosaveMachine::new();
        assert_eq!(machine.handle(AutosaveEvent::EditNotified), vec![Effect::ArmTimer]);
        assert_eq!(machine.handle(AutosaveEvent::EditNotified), vec![Effect::ArmTimer]);
        assert_eq!(machine.status(), SaveStatus::Idle);
        assert!(!machine.is_in_flight());
    }

    #[test]
    fn test_timer_starts_save_and_success_records_time() {
        let mut machine = AutosaveMachine::new();
        assert_eq!(machine.handle(AutosaveEvent::TimerFired), vec![Effect::StartSave]);
        assert_eq!(machine.status(), SaveStatus::Saving);
        assert!(machine.is_in_flight());

        let at = Utc::now();
        assert!(machine.handle(AutosaveEvent::SaveSucceeded { at }).is_empty());
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.status, SaveStatus::Saved);
        assert_eq!(snapshot.last_saved, Some(at));
        assert!(!machine.is_in_flight());
    }

    #[test]
    fn test_save_while_in_flight_is_deferred_once() {
        let mut machine = AutosaveMachine::new();
        machine.handle(AutosaveEvent::SaveNow);

        assert_eq!(machine.handle(AutosaveEvent::TimerFired), Vec::new());
        assert_eq!(machine.handle(AutosaveEvent::SaveNow), vec![Effect::CancelTimer]);
        assert!(machine.is_pending());

        assert_eq!(machine.handle(succeeded()), vec![Effect::StartSave]);
        assert!(machine.is_in_flight());
        assert!(!machine.is_pending());
        assert_eq!(machine.status(), SaveStatus::Saving);

        assert!(machine.handle(succeeded()).is_empty());
        assert_eq!(machine.status(), SaveStatus::Saved);
    }

    #[test]
    fn test_failure_does_not_retry() {
        let mut machine = AutosaveMachine::new();
        machine.handle(AutosaveEvent::TimerFired);
        let effects = machine.handle(AutosaveEvent::SaveFailed {
            reason: "disk full".to_owned(),
        });
        assert!(effects.is_empty());
        assert_eq!(machine.status(), SaveStatus::Error);
        assert_eq!(machine.snapshot().last_error.as_deref(), Some("disk full"));

        assert_eq!(
            machine.handle(AutosaveEvent::SaveNow),
            vec![Effect::CancelTimer, Effect::StartSave]
        );
        machine.handle(succeeded());
        assert_eq!(machine.snapshot().last_error, None);
    }

    #[test]
    fn test_failure_with_pending_still_resaves() {
        let mut machine = AutosaveMachine::new();
        machine.handle(AutosaveEvent::TimerFired);
        machine.handle(AutosaveEvent::TimerFired);
        let effects = machine.handle(AutosaveEvent::SaveFailed {
            reason: "boom".to_owned(),
        });
        assert_eq!(effects, vec![Effect::StartSave]);
        assert_eq!(machine.status(), SaveStatus::Saving);
    }

    #[test]
    fn test_disabling_cancels_timer_and_ignores_edits() {
        let mut machine = AutosaveMachine::new();
        machine.handle(AutosaveEvent::EditNotified);
        assert_eq!(machine.handle(AutosaveEvent::SetEnabled(false)), vec![Effect::CancelTimer]);
        assert!(machine.handle(AutosaveEvent::EditNotified).is_empty());

        // Manual saves still go through.
        assert_eq!(
            machine.handle(AutosaveEvent::SaveNow),
            vec![Effect::CancelTimer, Effect::StartSave]
        );

        assert!(machine.handle(AutosaveEvent::SetEnabled(true)).is_empty());
        assert_eq!(machine.handle(AutosaveEvent::EditNotified), vec![Effect::ArmTimer]);
    }

    #[test]
    fn test_disabling_does_not_abort_in_flight_save() {
        let mut machine = AutosaveMachine::new();
        machine.handle(AutosaveEvent::SaveNow);
        machine.handle(AutosaveEvent::SetEnabled(false));
        assert!(machine.is_in_flight());
        assert_eq!(machine.status(), SaveStatus::Saving);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(AutosaveMachine::new().snapshot()).unwrap();
        assert_eq!(json["status"], "idle");
        assert!(json["last_saved"].is_null());
    }
}
