use crate::cue::CueAddress;

/// Suppresses a cue identical to the one dispatched just before it.
///
/// The gate records a cue when it admits it, before the relay is contacted,
/// so a failed send is never retried by repeating the slide.
#[derive(Debug, Default)]
pub struct DedupGate {
    last: Option<CueAddress>,
}

impl DedupGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `cue` should be dispatched.
    pub fn admit(&mut self, cue: &CueAddress) -> bool {
        if self.last.as_ref() == Some(cue) {
            return false;
        }
        self.last = Some(cue.clone());
        true
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&CueAddress> {
        self.last.as_ref()
    }
}
