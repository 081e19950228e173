use crate::config::ControllerConfig;
use crate::error::{Error, Result, SetupError};
use crate::eval::evaluate;
use crate::events::{ControllerEvent, Host, TraceRequest};
use crate::ident::format_identifier;
use crate::program::Program;
use crate::rule::RuleKind;
use crate::variable::{Flags, Variable, VariableTable};
use crate::{DetectorId, TrafficLightId, VariableId};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use std::collections::HashMap;

/// A TrafCOD traffic light controller.
pub struct TrafCod {
    /// The controller id; also the prefix of the ids of its traffic lights.
    id: String,
    /// The program being executed.
    program: Program,
    config: ControllerConfig,
    /// The streams of the conflict group that was switched on last.
    current_conflict_group: Vec<u8>,
    /// The outcome of the most recent tick.
    last_evaluation: Option<Evaluation>,
    /// Whether the outputs and detectors have been bound.
    bound: bool,
}

/// The outcome of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// The number of passes over the rules.
    pub passes: usize,
    /// Whether the last pass changed nothing.
    pub settled: bool,
}

/// The reason a variable is assigned, reported to tracers.
#[derive(Clone, Copy, Debug)]
enum Cause {
    Rule(usize),
    Init,
    Detector(bool),
}

impl TrafCod {
    /// Creates a controller that runs the given program.
    ///
    /// Variables marked with `%init` are initialized and a [ControllerEvent::VariableCreated]
    /// event is emitted for every variable.
    pub fn new(
        id: impl Into<String>,
        program: Program,
        config: ControllerConfig,
        host: &mut Host,
    ) -> Self {
        let mut controller = Self {
            id: id.into(),
            program,
            config,
            current_conflict_group: vec![],
            last_evaluation: None,
            bound: false,
        };
        controller.initialize(host);
        controller
    }

    fn initialize(&mut self, host: &mut Host) {
        let ids = self.program.variables.ids().to_vec();
        for id in ids {
            let var = &self.program.variables[id];
            if var.flags().contains(Flags::INITED) {
                let value = match var.is_timer() {
                    true => var.timer_max(),
                    false => 1,
                };
                self.set_value(id, value, Cause::Init, host);
            }
            let var = &self.program.variables[id];
            let mut initial_value = var.value() as f64;
            if var.is_timer() {
                initial_value /= 10.0;
            }
            host.emit(ControllerEvent::VariableCreated {
                controller: self.id.clone(),
                name: var.name().to_string(),
                stream: var.stream(),
                initial_value,
            });
        }
    }

    /// Gets the id of the controller.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the program being executed.
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn variables(&self) -> &VariableTable {
        &self.program.variables
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Gets the variable with the given name and stream.
    pub fn variable(&self, name: &str, stream: Option<u8>) -> Option<&Variable> {
        let id = self.program.variables.lookup(name, stream)?;
        self.program.variables.get(id)
    }

    /// Gets the value of the variable with the given name and stream.
    pub fn value(&self, name: &str, stream: Option<u8>) -> Option<i32> {
        self.variable(name, stream).map(Variable::value)
    }

    /// Gets the flags of the variable with the given name and stream.
    pub fn flags(&self, name: &str, stream: Option<u8>) -> Option<Flags> {
        self.variable(name, stream).map(Variable::flags)
    }

    pub fn structure_number(&self) -> Option<i32> {
        self.program.structure_number
    }

    pub fn conflict_groups(&self) -> &[Vec<u8>] {
        &self.program.conflict_groups
    }

    /// Gets the streams of the conflict group that was switched on last.
    pub fn current_conflict_group(&self) -> &[u8] {
        &self.current_conflict_group
    }

    /// Gets the outcome of the most recent tick.
    pub fn last_evaluation(&self) -> Option<Evaluation> {
        self.last_evaluation
    }

    /// Checks the program for suspicious variables and binds the outputs to the traffic
    /// lights and the detector variables to the sensors of the host.
    ///
    /// Traffic lights are matched on their id with the controller id and any trailing
    /// `.<n>` removed, so output `G08` of controller `TC1` drives `TC1.08.1` and `TC1.08.2`.
    pub fn check_consistency(&mut self, host: &mut Host) -> Result<()> {
        let mut warnings = vec![];
        for (_, var) in self.program.variables.iter() {
            if var.ref_count() == 0 && !var.is_output() && !is_reserved_name(var.name()) {
                warnings.push(format!("{} is never referenced", var));
            }
            if !var.is_detector() {
                if !var.flags().contains(Flags::HAS_START_RULE) {
                    warnings.push(format!("{} has no start rule", var));
                }
                if !var.flags().contains(Flags::HAS_END_RULE) && !var.is_timer() {
                    warnings.push(format!("{} has no end rule", var));
                }
            }
        }
        for message in warnings {
            warn!("{}: {}", self.id, message);
            host.emit(ControllerEvent::ControllerWarning {
                controller: self.id.clone(),
                message,
            });
        }

        if self.bound {
            return Ok(());
        }

        let mut streams: HashMap<String, Vec<TrafficLightId>> = HashMap::new();
        for (light_id, light) in host.lights.iter() {
            streams
                .entry(light.stream_key(&self.id))
                .or_default()
                .push(light_id);
        }

        let groups = self.program.conflict_groups.len();
        for id in self.program.variables.ids().to_vec() {
            let var = &mut self.program.variables[id];
            if let Some(rank) = var.conflict_group_rank() {
                if rank >= groups {
                    return Err(SetupError::ConflictGroupRank {
                        name: var.to_string(),
                        rank,
                        groups,
                    }
                    .into());
                }
            }
            if let Some(color) = var.color() {
                let stream = var
                    .stream()
                    .ok_or_else(|| SetupError::OutputWithoutStream(var.to_string()))?;
                let key = format!("{:02}", stream);
                let lights = match streams.get(&key) {
                    Some(lights) if !lights.is_empty() => lights,
                    _ => return Err(SetupError::NoTrafficLight(key).into()),
                };
                for light_id in lights {
                    var.add_light(*light_id);
                    if var.value() != 0 {
                        host.lights[*light_id].set_color(color, host.time);
                    }
                }
                info!("{}: output {} drives {} traffic light(s)", self.id, var, lights.len());
            } else if var.is_detector() {
                let sensor = var
                    .sensor_id()
                    .ok_or_else(|| SetupError::NoDetector(var.to_string()))?;
                let detector = host
                    .detectors
                    .iter()
                    .find(|(_, detector)| detector.id() == sensor)
                    .map(|(detector_id, _)| detector_id)
                    .ok_or(SetupError::NoDetector(sensor))?;
                var.bind_detector(detector);
                info!("{}: detector {} bound", self.id, var);
            }
        }
        self.bound = true;
        Ok(())
    }

    /// Runs one tick: counts the timers down and evaluates the rules until no variable
    /// changes any more, or the maximum number of passes is reached.
    pub fn evaluate(&mut self, host: &mut Host) -> Result<Evaluation> {
        host.emit(ControllerEvent::ControllerEvaluating {
            controller: self.id.clone(),
        });
        self.decrement_timers(host.time);

        let mut evaluation = Evaluation {
            passes: 0,
            settled: false,
        };
        while evaluation.passes < self.config.max_loop_count {
            evaluation.passes += 1;
            let changes = self.evaluate_once(host)?;
            self.reset_timer_flags();
            if changes == 0 {
                evaluation.settled = true;
                break;
            }
        }
        debug!(
            "{}: evaluated the rules {} time(s) at t={}",
            self.id, evaluation.passes, host.time
        );

        if !evaluation.settled {
            let oscillating = self
                .program
                .variables
                .with_flags(Flags::CHANGED)
                .map(|id| self.program.variables[id].to_string())
                .join(" ");
            let message = format!(
                "Control program did not settle to a final state in {} iterations; oscillating variables: {}",
                evaluation.passes, oscillating
            );
            warn!("{}: {}", self.id, message);
            host.emit(ControllerEvent::ControllerWarning {
                controller: self.id.clone(),
                message,
            });
        }
        self.reset_detector_flags();
        self.last_evaluation = Some(evaluation);
        Ok(evaluation)
    }

    fn decrement_timers(&mut self, time: u64) {
        for var in self.program.variables.values_mut() {
            if var.is_timer() && var.decrement_timer(time) && var.is_traced() {
                trace!("Timer {} expired", var);
            }
        }
    }

    /// Clears the START, END and CHANGED flags of the timers, which rule evaluation does not do.
    fn reset_timer_flags(&mut self) {
        for var in self.program.variables.values_mut() {
            if var.is_timer() {
                var.clear_flag(Flags::START | Flags::END | Flags::CHANGED);
            }
        }
    }

    /// Clears the START and END flags of the detectors, which no rule assigns. A sensor
    /// change is visible to the rules for the whole of the next tick.
    fn reset_detector_flags(&mut self) {
        for var in self.program.variables.values_mut() {
            if var.is_detector() {
                var.clear_flag(Flags::START | Flags::END);
            }
        }
    }

    /// Evaluates every rule once, returning the number of rules that started or ended
    /// their destination.
    fn evaluate_once(&mut self, host: &mut Host) -> Result<usize> {
        for var in self.program.variables.values_mut() {
            var.clear_flag(Flags::CHANGED);
        }
        let mut changes = 0;
        for index in 0..self.program.rules.len() {
            if self.evaluate_rule(index, host)? {
                changes += 1;
            }
        }
        Ok(changes)
    }

    fn evaluate_rule(&mut self, index: usize, host: &mut Host) -> Result<bool> {
        let rule = &self.program.rules[index];
        let (kind, destination) = (rule.kind, rule.destination);

        let var = &mut self.program.variables[destination];
        if var.is_timer() {
            if var.flags().contains(Flags::TIMER_EXPIRED) {
                var.clear_flag(Flags::TIMER_EXPIRED);
                var.set_flag(Flags::END);
            } else if var.flags().intersects(Flags::START | Flags::END) {
                var.clear_flag(Flags::START | Flags::END);
                var.set_flag(Flags::CHANGED);
            }
        } else {
            match kind {
                RuleKind::Start => var.clear_flag(Flags::START),
                RuleKind::End => var.clear_flag(Flags::END),
                _ => var.clear_flag(Flags::START | Flags::END),
            }
        }

        let current = var.value();
        let unchangeable = match kind {
            RuleKind::Start | RuleKind::InitTimer => current != 0,
            RuleKind::End => current == 0,
            _ => false,
        };
        if unchangeable {
            return Ok(false);
        }

        let rule = &self.program.rules[index];
        let mut result =
            evaluate(&rule.tokens, &self.program.variables).map_err(|err| Error::Eval {
                kind: err,
                rule: rule.display(&self.program.variables, false).to_string(),
            })?;
        if kind == RuleKind::End {
            result = match result {
                0 => current,
                _ => 0,
            };
        }

        let var = &mut self.program.variables[destination];
        if result != 0 && current == 0 {
            var.set_flag(Flags::START);
        } else if result == 0 && current != 0 {
            var.set_flag(Flags::END);
        }

        if var.is_timer() {
            if result != 0 && kind != RuleKind::End {
                let value = var.timer_max().max(1);
                return Ok(self.set_value(destination, value, Cause::Rule(index), host));
            }
            if result == 0 && kind == RuleKind::End && current != 0 {
                return Ok(self.set_value(destination, 0, Cause::Rule(index), host));
            }
            return Ok(false);
        }

        if result == current {
            return Ok(false);
        }
        let changed = self.set_value(destination, result, Cause::Rule(index), host);
        let var = &self.program.variables[destination];
        if result != 0 {
            if let Some(color) = var.color() {
                host.emit(ControllerEvent::TrafficLightChanged {
                    controller: self.id.clone(),
                    stream: var.stream(),
                    color,
                });
            }
            if let Some(rank) = var.conflict_group_rank() {
                let group = self
                    .program
                    .conflict_groups
                    .get(rank)
                    .cloned()
                    .unwrap_or_default();
                let previous = std::mem::replace(&mut self.current_conflict_group, group.clone());
                debug!("{}: conflict group {:?} -> {:?}", self.id, previous, group);
                host.emit(ControllerEvent::ConflictGroupChanged {
                    controller: self.id.clone(),
                    previous,
                    current: group,
                });
            }
        }
        Ok(changed)
    }

    /// Assigns a value to a variable, driving its traffic lights and reporting it to
    /// tracers. Returns true if the variable started or ended.
    fn set_value(&mut self, id: VariableId, value: i32, cause: Cause, host: &mut Host) -> bool {
        let var = &self.program.variables[id];
        let old_value = var.value();
        let cause = var.is_traced().then(|| self.cause_text(id, cause));

        let var = &mut self.program.variables[id];
        let result = var.set_value(value, host.time);
        if old_value != value && value != 0 {
            if let Some(color) = var.color() {
                for light_id in var.lights() {
                    if let Some(light) = host.lights.get_mut(*light_id) {
                        light.set_color(color, host.time);
                    }
                }
            }
        }

        if let Some(cause) = cause {
            let var = &self.program.variables[id];
            trace!("{}: {} {} -> {} due to {}", self.id, var, old_value, value, cause);
            host.emit(ControllerEvent::TracedVariableUpdated {
                controller: self.id.clone(),
                variable: var.to_string(),
                stream: var.stream(),
                old_value,
                new_value: value,
                cause,
            });
        }
        result
    }

    fn cause_text(&self, id: VariableId, cause: Cause) -> String {
        let var = &self.program.variables[id];
        match cause {
            Cause::Rule(index) => self.program.rules[index]
                .display(&self.program.variables, true)
                .to_string(),
            Cause::Init if var.is_timer() => "Timer initialization rule".into(),
            Cause::Init => "Variable initialization rule".into(),
            Cause::Detector(occupied) => format!(
                "Detector {} becoming {}",
                var.sensor_id().unwrap_or_else(|| var.to_string()),
                if occupied { "occupied" } else { "unoccupied" }
            ),
        }
    }

    /// Sets the detector variable driven by the sensor with the given id, e.g. `D081`.
    pub fn update_detector(
        &mut self,
        sensor_id: &str,
        occupied: bool,
        host: &mut Host,
    ) -> Result<()> {
        let id = self
            .program
            .variables
            .detector(sensor_id)
            .ok_or_else(|| SetupError::UnknownDetector(sensor_id.to_string()))?;
        self.set_value(id, occupied as i32, Cause::Detector(occupied), host);
        Ok(())
    }

    /// Handles an occupancy change of a sensor of the host.
    ///
    /// Returns false if no detector variable is bound to the sensor.
    pub fn detector_changed(
        &mut self,
        detector: DetectorId,
        occupied: bool,
        host: &mut Host,
    ) -> bool {
        let id = self
            .program
            .variables
            .iter()
            .find(|(_, var)| var.detector() == Some(detector))
            .map(|(id, _)| id);
        match id {
            Some(id) => {
                self.set_value(id, occupied as i32, Cause::Detector(occupied), host);
                true
            }
            None => false,
        }
    }

    /// Switches tracing of one variable on or off.
    pub fn trace_variable(&mut self, name: &str, stream: Option<u8>, trace: bool) -> Result<()> {
        let id = self
            .program
            .variables
            .lookup(name, stream)
            .ok_or_else(|| SetupError::UnknownVariable(format_identifier(name, stream, false)))?;
        set_traced(&mut self.program.variables[id], trace);
        Ok(())
    }

    /// Switches tracing of all variables of a stream on or off; `None` selects the
    /// variables that have no stream.
    pub fn trace_stream(&mut self, stream: Option<u8>, trace: bool) {
        for var in self.program.variables.values_mut() {
            if var.stream() == stream {
                set_traced(var, trace);
            }
        }
    }

    /// Handles a request to switch tracing on or off.
    pub fn handle_trace_request(&mut self, request: &TraceRequest) -> Result<()> {
        match request {
            TraceRequest::Variable {
                name,
                stream,
                trace,
            } => self.trace_variable(name, *stream, *trace),
            TraceRequest::Stream { stream, trace } => {
                self.trace_stream(*stream, *trace);
                Ok(())
            }
        }
    }
}

fn set_traced(var: &mut Variable, trace: bool) {
    match trace {
        true => var.set_flag(Flags::TRACED),
        false => var.clear_flag(Flags::TRACED),
    }
}

/// Returns true for names of the form `RA?`, which need not be referenced.
fn is_reserved_name(name: &str) -> bool {
    name.len() == 3 && name.starts_with("RA")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::EventLog;
    use crate::{DetectorSet, LightSet};

    fn controller(rules: &str, log: &mut EventLog) -> TrafCod {
        let program = Program::parse(&format!("# trafcod-version=100\n{}", rules)).unwrap();
        let mut lights = LightSet::default();
        let detectors = DetectorSet::default();
        let mut host = Host {
            lights: &mut lights,
            detectors: &detectors,
            listener: log,
            time: 0,
        };
        TrafCod::new("TC1", program, ControllerConfig::default(), &mut host)
    }

    #[test]
    fn reserved_names() {
        assert!(is_reserved_name("RAA"));
        assert!(!is_reserved_name("RA"));
        assert!(!is_reserved_name("RBA"));
    }

    #[test]
    fn initial_values() {
        let mut log = EventLog::new();
        let tc = controller("%time TA01 25\n%init TA01\n%init B\nB=TA01\n", &mut log);
        assert_eq!(tc.value("TA", Some(1)), Some(25));
        assert_eq!(tc.value("B", None), Some(1));
        let initial: Vec<_> = log
            .events()
            .iter()
            .filter_map(|event| match &event.event {
                ControllerEvent::VariableCreated { initial_value, .. } => Some(*initial_value),
                _ => None,
            })
            .collect();
        assert_eq!(initial, [2.5, 1.0]);
    }

    #[test]
    fn cause_texts() {
        let mut log = EventLog::new();
        let tc = controller("%time TA 10\nA=D081\n", &mut log);
        let ta = tc.program.variables.lookup("TA", None).unwrap();
        let det = tc.program.variables.detector("D081").unwrap();
        assert_eq!(tc.cause_text(ta, Cause::Init), "Timer initialization rule");
        assert_eq!(
            tc.cause_text(det, Cause::Detector(false)),
            "Detector D081 becoming unoccupied"
        );
        assert_eq!(tc.cause_text(det, Cause::Rule(0)), "A<0>=D081<0>");
    }

    #[test]
    fn unknown_detector() {
        let mut log = EventLog::new();
        let mut tc = controller("A=D081\n", &mut log);
        let mut lights = LightSet::default();
        let detectors = DetectorSet::default();
        let mut host = Host {
            lights: &mut lights,
            detectors: &detectors,
            listener: &mut log,
            time: 0,
        };
        assert!(matches!(
            tc.update_detector("D082", true, &mut host),
            Err(Error::Setup(SetupError::UnknownDetector(_)))
        ));
        assert!(tc.update_detector("D081", true, &mut host).is_ok());
        assert_eq!(tc.value("D1", Some(8)), Some(1));
    }
}
