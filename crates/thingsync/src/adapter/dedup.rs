use std::collections::HashSet;

/// Locations already acted upon during one pairing session.
///
/// A fresh set is created for every session so a device can be found again
/// the next time pairing starts.
#[derive(Debug, Default)]
pub struct SeenLocations {
    locations: HashSet<String>,
}

impl SeenLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `location`, returning whether it had already been recorded.
    pub fn seen(&mut self, location: &str) -> bool {
        if self.locations.contains(location) {
            return true;
        }
        self.locations.insert(location.to_string());
        false
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
