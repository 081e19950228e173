//! An interpreter for TrafCOD traffic control programs.
//!
//! A TrafCOD program is a list of rules over boolean, timer and detector variables.
//! Once per tick the [TrafCod] controller counts its timers down and evaluates the
//! rules until no variable changes any more, driving traffic lights and emitting
//! [ControllerEvent]s along the way.

pub use config::ControllerConfig;
pub use controller::{Evaluation, TrafCod};
pub use detector::Detector;
pub use error::{Error, EvalError, Location, ParseError, Result, SetupError};
pub use events::{ControllerEvent, EventLog, Host, Listener, TimedEvent, TraceRequest};
pub use ident::{format_identifier, Identifier};
pub use light::{LightColor, TrafficLight};
pub use program::{Program, TRAFCOD_VERSION};
pub use rule::{Rule, RuleKind, RulePrinter, Token};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use variable::{Flags, Variable, VariableTable};

mod config;
mod controller;
mod detector;
mod error;
mod eval;
mod events;
mod ident;
mod light;
mod parser;
mod program;
mod rule;
mod simulation;
mod util;
mod variable;

new_key_type! {
    /// Unique ID of a [Variable].
    pub struct VariableId;
    /// Unique ID of a [TrafficLight].
    pub struct TrafficLightId;
    /// Unique ID of a [Detector].
    pub struct DetectorId;
    /// Unique ID of a [TrafCod] controller in a [Simulation].
    pub struct ControllerId;
}

/// The traffic lights of a host.
pub type LightSet = SlotMap<TrafficLightId, TrafficLight>;
/// The vehicle sensors of a host.
pub type DetectorSet = SlotMap<DetectorId, Detector>;
