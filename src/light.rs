use serde::{Deserialize, Serialize};

/// A traffic light head driven by the output variables of a controller.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The light's id, e.g. `TC1.08.1`.
    id: String,
    /// The current color; `None` until a controller sets it.
    color: Option<LightColor>,
    /// The time at which the light switched to its current color, in 0.1 s.
    since: u64,
    /// The number of times the color was pushed to this light.
    changes: usize,
}

/// The color of a traffic light.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, Deserialize)]
pub enum LightColor {
    Red,
    Yellow,
    Green,
}

impl LightColor {
    /// Gets the color from its one letter code, `R`, `Y` or `G`.
    pub fn from_code(code: char) -> Option<Self> {
        match code.to_ascii_uppercase() {
            'R' => Some(Self::Red),
            'Y' => Some(Self::Yellow),
            'G' => Some(Self::Green),
            _ => None,
        }
    }

    /// Gets the one letter code of the color.
    pub fn code(&self) -> char {
        match self {
            Self::Red => 'R',
            Self::Yellow => 'Y',
            Self::Green => 'G',
        }
    }
}

impl TrafficLight {
    /// Creates a new traffic light with no color.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            color: None,
            since: 0,
            changes: 0,
        }
    }

    /// Gets the id of the light.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Gets the current color.
    pub fn color(&self) -> Option<LightColor> {
        self.color
    }

    /// Gets the time at which the light switched to its current color, in 0.1 s.
    ///
    /// Pushing the color the light already shows does not move this time.
    pub fn since(&self) -> u64 {
        self.since
    }

    /// Gets the number of times a color was pushed to the light.
    pub fn changes(&self) -> usize {
        self.changes
    }

    /// Sets the color of the light.
    pub fn set_color(&mut self, color: LightColor, time: u64) {
        if self.color != Some(color) {
            self.since = time;
        }
        self.color = Some(color);
        self.changes += 1;
    }

    /// Gets the stream of this light, given the id of its controller.
    ///
    /// The controller id and a trailing `.<n>` suffix are stripped from the light's id,
    /// so `TC1.08.1` of controller `TC1` is stream `08`.
    pub fn stream_key(&self, controller_id: &str) -> String {
        let mut key = self.id.as_str();
        if let Some(rest) = key.strip_prefix(controller_id) {
            key = rest.strip_prefix('.').unwrap_or(rest);
        }
        if let Some(pos) = key.rfind('.') {
            if key.len() - pos == 2 {
                key = &key[..pos];
            }
        }
        key.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn color_codes() {
        assert_eq!(LightColor::from_code('g'), Some(LightColor::Green));
        assert_eq!(LightColor::from_code('X'), None);
        assert_eq!(LightColor::Yellow.code(), 'Y');
    }

    #[test]
    fn stream_keys() {
        assert_eq!(TrafficLight::new("TC1.08.1").stream_key("TC1"), "08");
        assert_eq!(TrafficLight::new("TC108.1").stream_key("TC1"), "08");
        assert_eq!(TrafficLight::new("08").stream_key("TC1"), "08");
        assert_eq!(TrafficLight::new("X.11.2").stream_key("TC1"), "X.11");
    }

    #[test]
    fn every_push_is_counted() {
        let mut light = TrafficLight::new("TC1.01.1");
        light.set_color(LightColor::Green, 3);
        light.set_color(LightColor::Green, 5);
        assert_eq!(light.changes(), 2);
        assert_eq!(light.since(), 3);
        light.set_color(LightColor::Red, 9);
        assert_eq!(light.since(), 9);
    }
}
