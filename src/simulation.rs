use crate::config::ControllerConfig;
use crate::controller::TrafCod;
use crate::detector::Detector;
use crate::error::{Result, SetupError};
use crate::events::{EventLog, Host, TimedEvent, TraceRequest};
use crate::light::TrafficLight;
use crate::program::Program;
use crate::{ControllerId, DetectorId, DetectorSet, LightSet, TrafficLightId};
use log::warn;
use slotmap::SlotMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A minimal discrete time host for TrafCOD controllers.
///
/// Time advances in steps of 0.1 s. Each controller has its consistency check run at
/// the time it is added, and is evaluated once per evaluation interval after that.
#[derive(Default)]
pub struct Simulation {
    /// The traffic lights.
    lights: LightSet,
    /// The vehicle sensors.
    detectors: DetectorSet,
    /// The controllers.
    controllers: SlotMap<ControllerId, TrafCod>,
    /// The pending controller callbacks.
    queue: BinaryHeap<Reverse<Scheduled>>,
    /// The events emitted by the controllers.
    events: EventLog,
    /// The current time in 0.1 s.
    time: u64,
    /// The next sequence number.
    seq: usize,
}

/// A controller callback scheduled at a point in time.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug)]
struct Scheduled {
    time: u64,
    /// Orders callbacks scheduled at the same time.
    seq: usize,
    controller: ControllerId,
    action: Action,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Action {
    CheckConsistency,
    Evaluate,
}

impl Simulation {
    /// Creates a new simulation.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a traffic light to the simulation.
    pub fn add_traffic_light(&mut self, light: TrafficLight) -> TrafficLightId {
        self.lights.insert(light)
    }

    /// Adds a vehicle sensor to the simulation.
    pub fn add_detector(&mut self, detector: Detector) -> DetectorId {
        self.detectors.insert(detector)
    }

    /// Adds a controller that runs the given program.
    ///
    /// Traffic lights and detectors must be added first; they are bound to the program
    /// by the consistency check, which runs during the next step.
    pub fn add_controller(
        &mut self,
        id: &str,
        program: Program,
        config: ControllerConfig,
    ) -> ControllerId {
        let mut host = Host {
            lights: &mut self.lights,
            detectors: &self.detectors,
            listener: &mut self.events,
            time: self.time,
        };
        let controller = TrafCod::new(id, program, config, &mut host);
        let interval = controller.config().evaluation_interval.max(1);
        let controller_id = self.controllers.insert(controller);
        self.schedule(self.time, controller_id, Action::CheckConsistency);
        self.schedule(self.time + interval, controller_id, Action::Evaluate);
        controller_id
    }

    /// Removes a controller; it will not be evaluated any more.
    pub fn remove_controller(&mut self, id: ControllerId) -> Option<TrafCod> {
        self.controllers.remove(id)
    }

    /// Sets the occupancy of a sensor and passes the change on to the controllers.
    pub fn set_detector(&mut self, id: DetectorId, occupied: bool) -> Result<()> {
        let detector = self
            .detectors
            .get_mut(id)
            .ok_or_else(|| SetupError::UnknownDetector(format!("{:?}", id)))?;
        if !detector.set_occupied(occupied) {
            return Ok(());
        }
        for controller in self.controllers.values_mut() {
            let mut host = Host {
                lights: &mut self.lights,
                detectors: &self.detectors,
                listener: &mut self.events,
                time: self.time,
            };
            controller.detector_changed(id, occupied, &mut host);
        }
        Ok(())
    }

    /// Switches tracing of controller variables on or off.
    pub fn trace(&mut self, id: ControllerId, request: &TraceRequest) -> Result<()> {
        self.controllers
            .get_mut(id)
            .ok_or_else(|| SetupError::UnknownController(format!("{:?}", id)))?
            .handle_trace_request(request)
    }

    /// Advances the simulation by 0.1 s and runs the controller callbacks that are due.
    ///
    /// A controller that fails has its pending callbacks dropped and is not evaluated
    /// again. The other due callbacks still run, and the first error is returned.
    pub fn step(&mut self) -> Result<()> {
        self.time += 1;
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.time > self.time {
                break;
            }
            if let Some(Reverse(item)) = self.queue.pop() {
                due.push(item);
            }
        }

        let mut failed: Vec<ControllerId> = Vec::new();
        let mut first_error = None;
        for item in due {
            if failed.contains(&item.controller) {
                continue;
            }
            let Some(controller) = self.controllers.get_mut(item.controller) else {
                continue;
            };
            let mut host = Host {
                lights: &mut self.lights,
                detectors: &self.detectors,
                listener: &mut self.events,
                time: item.time,
            };
            let result = match item.action {
                Action::CheckConsistency => controller.check_consistency(&mut host),
                Action::Evaluate => controller.evaluate(&mut host).map(|_| ()),
            };
            match result {
                Ok(()) if item.action == Action::Evaluate => {
                    let interval = controller.config().evaluation_interval.max(1);
                    self.schedule(item.time + interval, item.controller, Action::Evaluate);
                }
                Ok(()) => {}
                Err(err) => {
                    warn!("{}: stopped: {}", controller.id(), err);
                    failed.push(item.controller);
                    first_error.get_or_insert(err);
                }
            }
        }
        if !failed.is_empty() {
            self.queue
                .retain(|Reverse(item)| !failed.contains(&item.controller));
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Advances the simulation by the given number of steps.
    pub fn run(&mut self, steps: usize) -> Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    fn schedule(&mut self, time: u64, controller: ControllerId, action: Action) {
        self.queue.push(Reverse(Scheduled {
            time,
            seq: self.seq,
            controller,
            action,
        }));
        self.seq += 1;
    }

    /// Gets the current time in 0.1 s.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// Gets the current time in seconds.
    pub fn time_secs(&self) -> f64 {
        self.time as f64 / 10.0
    }

    /// Gets the controller with the given id.
    pub fn controller(&self, id: ControllerId) -> Option<&TrafCod> {
        self.controllers.get(id)
    }

    pub fn controller_mut(&mut self, id: ControllerId) -> Option<&mut TrafCod> {
        self.controllers.get_mut(id)
    }

    /// Gets a reference to the traffic light with the given id.
    pub fn get_light(&self, id: TrafficLightId) -> &TrafficLight {
        &self.lights[id]
    }

    /// Returns an iterator over all the traffic lights in the simulation.
    pub fn iter_lights(&self) -> impl Iterator<Item = (TrafficLightId, &TrafficLight)> {
        self.lights.iter()
    }

    /// Finds the sensor with the given id, e.g. `D081`.
    pub fn find_detector(&self, id: &str) -> Option<DetectorId> {
        self.detectors
            .iter()
            .find(|(_, detector)| detector.id() == id)
            .map(|(detector_id, _)| detector_id)
    }

    /// Gets the events emitted so far.
    ///
    /// Events are kept until [`Simulation::take_events`] is called, so a long run should
    /// take them regularly.
    pub fn events(&self) -> &[TimedEvent] {
        self.events.events()
    }

    /// Removes and returns the events emitted so far.
    pub fn take_events(&mut self) -> Vec<TimedEvent> {
        self.events.take()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use crate::events::ControllerEvent;
    use crate::light::LightColor;

    const PROGRAM: &str = "# trafcod-version=100\n%init G01 1\n%export G01 G\nA=G01\n";

    fn evaluations(sim: &Simulation, id: &str) -> usize {
        sim.events()
            .iter()
            .filter(|event| {
                matches!(&event.event,
                    ControllerEvent::ControllerEvaluating { controller } if controller == id)
            })
            .count()
    }

    #[test]
    fn failing_controller_is_dropped() {
        let mut sim = Simulation::new();
        let light = sim.add_traffic_light(TrafficLight::new("TC1.01.1"));
        let program: Program = PROGRAM.parse().unwrap();
        sim.add_controller("BAD", program.clone(), ControllerConfig::default());
        sim.add_controller("TC1", program, ControllerConfig::default());

        assert!(matches!(
            sim.step(),
            Err(Error::Setup(SetupError::NoTrafficLight(stream))) if stream == "01"
        ));
        // The controller added after the failing one still ran
        assert_eq!(evaluations(&sim, "TC1"), 1);
        assert_eq!(sim.get_light(light).color(), Some(LightColor::Green));

        sim.run(20).unwrap();
        assert_eq!(evaluations(&sim, "TC1"), 21);
        assert_eq!(evaluations(&sim, "BAD"), 0);
    }

    #[test]
    fn events_are_kept_until_taken() {
        let mut sim = Simulation::new();
        sim.add_traffic_light(TrafficLight::new("TC1.01.1"));
        sim.add_controller("TC1", PROGRAM.parse().unwrap(), ControllerConfig::default());
        sim.run(10).unwrap();
        assert_eq!(evaluations(&sim, "TC1"), 10);

        let taken = sim.take_events();
        assert!(!taken.is_empty());
        assert!(sim.events().is_empty());
        sim.step().unwrap();
        assert_eq!(evaluations(&sim, "TC1"), 1);
    }
}
