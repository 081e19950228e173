/// A vehicle presence sensor.
#[derive(Clone, Debug)]
pub struct Detector {
    /// The sensor id, `D` followed by the stream and the sub number, e.g. `D081`.
    id: String,
    /// Whether a vehicle currently occupies the sensor.
    occupied: bool,
}

impl Detector {
    /// Creates a new, unoccupied detector.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            occupied: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn occupied(&self) -> bool {
        self.occupied
    }

    /// Sets the occupancy. Returns true if it changed.
    pub(crate) fn set_occupied(&mut self, occupied: bool) -> bool {
        let changed = self.occupied != occupied;
        self.occupied = occupied;
        changed
    }
}
