use std::collections::HashMap;
use vigil_common::types::AlertKind;

/// Identifies one evaluation stream: `(agent_id, config_id, alert_type)`.
pub type StateKey = (String, String, AlertKind);

/// Per-stream evaluation state. Not persisted; rebuilt from live samples
/// after a restart.
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    /// When the threshold was first breached (ms); 0 = not breached.
    pub start_time: i64,
    pub is_firing: bool,
    /// Id of the record created when this stream last fired.
    pub last_record_id: String,
    pub value: f64,
    pub last_check_time: i64,
    pub threshold: f64,
    pub duration_secs: i64,
}

/// What a sample did to its evaluation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The threshold has been breached for at least the configured duration
    /// and the stream was not already firing.
    Fire { value: f64, threshold: f64 },
    /// The value dropped below threshold while the stream was firing.
    Resolve { value: f64 },
}

/// The duration-hysteresis threshold evaluator.
///
/// A breach only fires after the value has stayed at or above threshold for
/// `duration_secs`; a single below-threshold sample resets the accumulator,
/// so a cleared stream must re-earn the full duration before firing again.
#[derive(Debug, Default)]
pub struct ThresholdEvaluator {
    states: HashMap<StateKey, AlertState>,
}

impl ThresholdEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample into the stream and reports the resulting
    /// transition, if any.
    ///
    /// A `Fire` transition leaves the stream *not yet* marked firing: the
    /// caller persists the alert record first and then acknowledges with
    /// [`mark_fired`](Self::mark_fired). If persistence fails the next
    /// over-threshold sample fires again. A `Resolve` transition clears the
    /// firing flag immediately.
    pub fn observe(
        &mut self,
        agent_id: &str,
        config_id: &str,
        kind: AlertKind,
        value: f64,
        threshold: f64,
        duration_secs: i64,
        now_ms: i64,
    ) -> Option<Transition> {
        let key = (agent_id.to_string(), config_id.to_string(), kind);
        let state = self.states.entry(key).or_default();

        state.value = value;
        state.last_check_time = now_ms;
        state.threshold = threshold;
        state.duration_secs = duration_secs;

        if value >= threshold {
            if state.start_time == 0 {
                state.start_time = now_ms;
            }
            let elapsed_secs = (now_ms - state.start_time) / 1000;
            if elapsed_secs >= duration_secs && !state.is_firing {
                return Some(Transition::Fire { value, threshold });
            }
            None
        } else {
            let was_firing = state.is_firing;
            state.start_time = 0;
            if was_firing {
                state.is_firing = false;
                state.last_record_id.clear();
                return Some(Transition::Resolve { value });
            }
            None
        }
    }

    /// Acknowledges that the record for a `Fire` transition was persisted.
    pub fn mark_fired(&mut self, agent_id: &str, config_id: &str, kind: AlertKind, record_id: &str) {
        let key = (agent_id.to_string(), config_id.to_string(), kind);
        if let Some(state) = self.states.get_mut(&key) {
            state.is_firing = true;
            state.last_record_id = record_id.to_string();
        }
    }

    /// Drops every stream belonging to a deleted config.
    pub fn purge_config(&mut self, config_id: &str) {
        self.states.retain(|(_, cfg, _), _| cfg != config_id);
    }

    pub fn state(&self, agent_id: &str, config_id: &str, kind: AlertKind) -> Option<&AlertState> {
        self.states
            .get(&(agent_id.to_string(), config_id.to_string(), kind))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
