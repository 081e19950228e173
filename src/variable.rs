use crate::error::{Location, ParseError};
use crate::ident::{format_identifier, is_detector_name};
use crate::light::LightColor;
use crate::{DetectorId, TrafficLightId};
use bitflags::bitflags;
use smallvec::SmallVec;
use std::fmt;

pub use table::VariableTable;

mod table;

/// Letters that distinguish the conflict group markers `MRA`, `MRB`, ...
/// Their position in this sequence is the rank of the conflict group.
const ROW_LETTERS: &str = "ABCDXYZUVW";

bitflags! {
    /// State and classification flags of a variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u16 {
        /// The variable has just become active.
        const START          = 1 << 0;
        /// The variable has just become inactive.
        const END            = 1 << 1;
        /// The value of the variable has just changed.
        const CHANGED        = 1 << 2;
        /// The timer has just expired.
        const TIMER_EXPIRED  = 1 << 3;
        const IS_TIMER       = 1 << 4;
        const IS_DETECTOR    = 1 << 5;
        const HAS_START_RULE = 1 << 6;
        const HAS_END_RULE   = 1 << 7;
        const IS_OUTPUT      = 1 << 8;
        /// The variable must be initialized to 1 (or its timer maximum) at startup.
        const INITED         = 1 << 9;
        /// All updates of the variable are reported.
        const TRACED         = 1 << 10;
        /// The variable identifies the active conflict group.
        const CONFLICT_GROUP = 1 << 11;
    }
}

/// A TrafCOD variable, timer, or detector.
#[derive(Clone, Debug)]
pub struct Variable {
    /// The name, without the stream number.
    name: String,
    /// The traffic stream.
    stream: Option<u8>,
    /// The current value; the remaining time in 0.1 s for timers.
    value: i32,
    flags: Flags,
    /// The initial value of a timer in 0.1 s.
    timer_max: i32,
    /// Time of the last update in 0.1 s.
    update_time: u64,
    /// The color shown by the bound traffic lights while this output is active.
    color: Option<LightColor>,
    /// The traffic lights driven by this output.
    lights: SmallVec<[TrafficLightId; 2]>,
    /// The sensor driving this detector.
    detector: Option<DetectorId>,
    /// The number of rules that refer to this variable.
    ref_count: usize,
    /// The rule that starts this variable.
    start_source: Option<Location>,
    /// The rule that ends this variable.
    end_source: Option<Location>,
}

/// Selects how a variable is printed in identifier form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) enum IdStyle {
    #[default]
    Plain,
    Negated,
    InitTimer,
    ReinitTimer,
}

impl Variable {
    /// Creates a new variable; the kind of variable follows from its name and stream.
    pub(crate) fn new(name: &str, stream: Option<u8>) -> Self {
        let name = name.to_ascii_uppercase();
        let mut flags = Flags::empty();
        if Self::is_timer_name(&name) {
            flags |= Flags::IS_TIMER;
        }
        if is_detector_name(&name) {
            flags |= Flags::IS_DETECTOR;
        }
        if stream.is_none() && Self::conflict_group_letter(&name).is_some() {
            flags |= Flags::CONFLICT_GROUP;
        }
        Self {
            name,
            stream,
            value: 0,
            flags,
            timer_max: 0,
            update_time: 0,
            color: None,
            lights: SmallVec::new(),
            detector: None,
            ref_count: 0,
            start_source: None,
            end_source: None,
        }
    }

    /// Returns true if variables with this name are timers.
    pub(crate) fn is_timer_name(name: &str) -> bool {
        name.starts_with('T')
    }

    fn conflict_group_letter(name: &str) -> Option<usize> {
        match name.as_bytes() {
            [b'M', b'R', letter] => ROW_LETTERS.find(*letter as char),
            _ => None,
        }
    }

    /// Gets the name of the variable, without the stream number.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the traffic stream of the variable.
    pub fn stream(&self) -> Option<u8> {
        self.stream
    }

    /// Gets the current value.
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Gets the flags.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub(crate) fn set_flag(&mut self, flag: Flags) {
        self.flags |= flag;
    }

    pub(crate) fn clear_flag(&mut self, flag: Flags) {
        self.flags &= !flag;
    }

    pub fn is_timer(&self) -> bool {
        self.flags.contains(Flags::IS_TIMER)
    }

    pub fn is_detector(&self) -> bool {
        self.flags.contains(Flags::IS_DETECTOR)
    }

    pub fn is_output(&self) -> bool {
        self.flags.contains(Flags::IS_OUTPUT)
    }

    pub fn is_traced(&self) -> bool {
        self.flags.contains(Flags::TRACED)
    }

    /// Gets the maximum (initial) value of a timer in 0.1 s.
    pub fn timer_max(&self) -> i32 {
        self.timer_max
    }

    /// Gets the time of the last value change in 0.1 s.
    pub fn update_time(&self) -> u64 {
        self.update_time
    }

    /// Gets the color of an output variable.
    pub fn color(&self) -> Option<LightColor> {
        self.color
    }

    /// Gets the traffic lights driven by an output variable.
    pub fn lights(&self) -> &[TrafficLightId] {
        &self.lights
    }

    /// Gets the sensor bound to a detector variable.
    pub fn detector(&self) -> Option<DetectorId> {
        self.detector
    }

    /// Gets the number of rules that refer to this variable.
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn start_source(&self) -> Option<Location> {
        self.start_source
    }

    pub fn end_source(&self) -> Option<Location> {
        self.end_source
    }

    /// Gets the rank of the conflict group identified by this variable.
    pub fn conflict_group_rank(&self) -> Option<usize> {
        if !self.flags.contains(Flags::CONFLICT_GROUP) {
            return None;
        }
        Self::conflict_group_letter(&self.name)
    }

    /// Gets the id of the sensor that drives this detector, e.g. `D011`.
    pub fn sensor_id(&self) -> Option<String> {
        match (self.is_detector(), self.stream) {
            (true, Some(stream)) => Some(format!("D{:02}{}", stream, &self.name[1..])),
            _ => None,
        }
    }

    pub(crate) fn increment_ref_count(&mut self) {
        self.ref_count += 1;
    }

    /// Sets the maximum value of a timer in 0.1 s.
    pub(crate) fn set_timer_max(&mut self, value: i32) -> Result<(), ParseError> {
        if !self.is_timer() {
            return Err(ParseError::NotATimer(self.to_string()));
        }
        self.timer_max = value;
        Ok(())
    }

    /// Makes this variable an output with the given color.
    pub(crate) fn set_output(&mut self, color: LightColor) -> Result<(), ParseError> {
        if self.color.is_some() {
            return Err(ParseError::AlreadyOutput(self.to_string()));
        }
        self.color = Some(color);
        self.flags |= Flags::IS_OUTPUT;
        Ok(())
    }

    pub(crate) fn add_light(&mut self, light: TrafficLightId) {
        if !self.lights.contains(&light) {
            self.lights.push(light);
        }
    }

    pub(crate) fn bind_detector(&mut self, detector: DetectorId) {
        self.detector = Some(detector);
    }

    /// Records the rule that starts this variable.
    pub(crate) fn set_start_source(&mut self, location: Location) -> Result<(), ParseError> {
        if let Some(first) = self.start_source {
            return Err(ParseError::ConflictingRules {
                first,
                second: location,
            });
        }
        self.start_source = Some(location);
        self.flags |= Flags::HAS_START_RULE;
        Ok(())
    }

    /// Records the rule that ends this variable.
    pub(crate) fn set_end_source(&mut self, location: Location) -> Result<(), ParseError> {
        if let Some(first) = self.end_source {
            return Err(ParseError::ConflictingRules {
                first,
                second: location,
            });
        }
        self.end_source = Some(location);
        self.flags |= Flags::HAS_END_RULE;
        Ok(())
    }

    /// Updates the value and the START, END and CHANGED flags.
    ///
    /// Returns true if the variable started or ended. START and END exclude each
    /// other. A running timer that is re-armed only gets the CHANGED flag.
    pub(crate) fn set_value(&mut self, value: i32, time: u64) -> bool {
        let mut result = false;
        if self.value != value {
            self.update_time = time;
            self.flags |= Flags::CHANGED;
            if value == 0 {
                self.flags.remove(Flags::START);
                self.flags |= Flags::END;
                result = true;
            } else if !self.is_timer() || self.value == 0 {
                self.flags.remove(Flags::END);
                self.flags |= Flags::START;
                result = true;
            }
        }
        self.value = value;
        result
    }

    /// Counts a running timer down by one tick.
    ///
    /// Returns true if the timer expired due to this call.
    pub(crate) fn decrement_timer(&mut self, time: u64) -> bool {
        if self.value <= 0 {
            return false;
        }
        self.value -= 1;
        if self.value == 0 {
            self.flags |= Flags::CHANGED | Flags::END;
            self.update_time = time;
            return true;
        }
        false
    }

    /// Formats the variable in identifier form.
    pub(crate) fn id_string(&self, style: IdStyle) -> String {
        let prefix = match style {
            IdStyle::InitTimer if self.is_timer() => "I",
            IdStyle::ReinitTimer if self.is_timer() => "RI",
            _ => "",
        };
        let negated = style == IdStyle::Negated;
        format!(
            "{}{}",
            prefix,
            format_identifier(&self.name, self.stream, negated)
        )
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id_string(IdStyle::Plain))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classification() {
        assert!(Variable::new("TG", Some(1)).is_timer());
        assert!(Variable::new("D1", Some(1)).is_detector());
        assert!(!Variable::new("DA", Some(1)).is_detector());
        assert_eq!(Variable::new("MRA", None).conflict_group_rank(), Some(0));
        assert_eq!(Variable::new("MRX", None).conflict_group_rank(), Some(4));
        assert_eq!(Variable::new("MRA", Some(2)).conflict_group_rank(), None);
        assert_eq!(Variable::new("MRQ", None).conflict_group_rank(), None);
    }

    #[test]
    fn set_value_flags() {
        let mut var = Variable::new("A", None);
        assert!(var.set_value(1, 5));
        assert!(var.flags().contains(Flags::START | Flags::CHANGED));
        assert_eq!(var.update_time(), 5);

        var.clear_flag(Flags::START | Flags::CHANGED);
        assert!(!var.set_value(1, 6));
        assert_eq!(var.flags(), Flags::empty());
        assert_eq!(var.update_time(), 5);

        assert!(var.set_value(0, 7));
        assert!(var.flags().contains(Flags::END | Flags::CHANGED));
        assert!(!var.flags().contains(Flags::START));
    }

    #[test]
    fn start_and_end_exclude_each_other() {
        let mut det = Variable::new("D1", Some(1));
        det.set_value(1, 1);
        det.set_value(0, 2);
        assert!(det.flags().contains(Flags::END));
        assert!(!det.flags().contains(Flags::START));
        det.set_value(1, 3);
        assert!(det.flags().contains(Flags::START));
        assert!(!det.flags().contains(Flags::END));
    }

    #[test]
    fn rearming_timer_is_not_a_start() {
        let mut timer = Variable::new("TA", None);
        assert!(timer.set_value(30, 0));
        timer.clear_flag(Flags::START | Flags::CHANGED);
        assert!(!timer.set_value(20, 1));
        assert_eq!(timer.flags(), Flags::IS_TIMER | Flags::CHANGED);
    }

    #[test]
    fn timer_countdown() {
        let mut timer = Variable::new("TA", None);
        timer.set_value(2, 0);
        timer.clear_flag(Flags::START | Flags::CHANGED);
        assert!(!timer.decrement_timer(1));
        assert_eq!(timer.value(), 1);
        assert!(timer.decrement_timer(2));
        assert_eq!(timer.value(), 0);
        assert!(timer.flags().contains(Flags::END | Flags::CHANGED));
        assert!(!timer.decrement_timer(3));
        assert_eq!(timer.value(), 0);
    }

    #[test]
    fn rule_sources() {
        let mut var = Variable::new("A", None);
        var.set_start_source(Location { line: 3 }).unwrap();
        assert_eq!(
            var.set_start_source(Location { line: 7 }),
            Err(ParseError::ConflictingRules {
                first: Location { line: 3 },
                second: Location { line: 7 }
            })
        );
        var.set_end_source(Location { line: 4 }).unwrap();
        assert!(var.flags().contains(Flags::HAS_START_RULE | Flags::HAS_END_RULE));
    }

    #[test]
    fn timer_max_requires_timer() {
        let mut var = Variable::new("A", Some(1));
        assert_eq!(
            var.set_timer_max(30),
            Err(ParseError::NotATimer("A01".into()))
        );
    }

    #[test]
    fn identifiers() {
        let timer = Variable::new("TG", Some(2));
        assert_eq!(timer.id_string(IdStyle::InitTimer), "ITG02");
        assert_eq!(timer.id_string(IdStyle::ReinitTimer), "RITG02");
        let det = Variable::new("D3", Some(12));
        assert_eq!(det.to_string(), "D123");
        assert_eq!(det.sensor_id().as_deref(), Some("D123"));
        assert_eq!(det.id_string(IdStyle::Negated), "D123N");
    }
}
