//! Notifications emitted by controllers, and the context in which they run.

use crate::light::LightColor;
use crate::{DetectorSet, LightSet};
use serde::{Deserialize, Serialize};

/// A notification emitted by a TrafCOD controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// A variable was created; timer values are in seconds.
    VariableCreated {
        controller: String,
        name: String,
        stream: Option<u8>,
        initial_value: f64,
    },
    /// The controller started a tick.
    ControllerEvaluating { controller: String },
    /// A non-fatal problem.
    ControllerWarning { controller: String, message: String },
    /// A traced variable was assigned.
    TracedVariableUpdated {
        controller: String,
        variable: String,
        stream: Option<u8>,
        old_value: i32,
        new_value: i32,
        cause: String,
    },
    /// An output variable was switched on.
    TrafficLightChanged {
        controller: String,
        stream: Option<u8>,
        color: LightColor,
    },
    /// A conflict group marker was switched on.
    ConflictGroupChanged {
        controller: String,
        previous: Vec<u8>,
        current: Vec<u8>,
    },
}

/// An event with the time at which it was emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// The time in 0.1 s.
    pub time: u64,
    #[serde(flatten)]
    pub event: ControllerEvent,
}

/// Receives the events of controllers.
pub trait Listener {
    fn notify(&mut self, time: u64, event: ControllerEvent);
}

impl<F: FnMut(u64, ControllerEvent)> Listener for F {
    fn notify(&mut self, time: u64, event: ControllerEvent) {
        self(time, event)
    }
}

/// A listener that records every event.
///
/// The log is unbounded; events stay in memory until they are taken.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<TimedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Default::default()
    }

    /// Gets the recorded events.
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Removes and returns the recorded events.
    pub fn take(&mut self) -> Vec<TimedEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Listener for EventLog {
    fn notify(&mut self, time: u64, event: ControllerEvent) {
        self.events.push(TimedEvent { time, event });
    }
}

/// The environment of a controller during one callback.
pub struct Host<'a> {
    /// The traffic lights that outputs drive.
    pub lights: &'a mut LightSet,
    /// The sensors that detector variables are bound to.
    pub detectors: &'a DetectorSet,
    /// Receives the emitted events.
    pub listener: &'a mut dyn Listener,
    /// The current time in 0.1 s.
    pub time: u64,
}

impl Host<'_> {
    /// Emits an event at the current time.
    pub fn emit(&mut self, event: ControllerEvent) {
        self.listener.notify(self.time, event);
    }
}

/// A request to switch tracing on or off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceRequest {
    /// Trace one variable.
    Variable {
        name: String,
        stream: Option<u8>,
        trace: bool,
    },
    /// Trace all variables of a stream, or all variables without a stream.
    Stream { stream: Option<u8>, trace: bool },
}
