//! Cue addresses carried in slide labels.
//!
//! A slide fires a lighting cue when its label contains `Lights <list>;<cue>`,
//! e.g. `Lights 3;12` for cue 12 of cue list 3. Anything else is a plain slide.

use std::sync::LazyLock;

use regex::Regex;

use propresenter_client::Slide;

static CUE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Lights ([0-9]+);([0-9]+)").expect("cue label pattern"));

/// A lighting cue: cue number within a cue list. Both stay strings so
/// leading zeros reach the desk untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CueAddress {
    pub cue_list: String,
    pub cue_number: String,
}

impl CueAddress {
    pub fn new(cue_list: impl Into<String>, cue_number: impl Into<String>) -> Self {
        Self {
            cue_list: cue_list.into(),
            cue_number: cue_number.into(),
        }
    }

    /// Extract the cue from a slide label. `None` means the slide has no cue.
    pub fn from_label(label: &str) -> Option<Self> {
        let captures = CUE_LABEL.captures(label)?;
        Some(Self::new(&captures[1], &captures[2]))
    }
}

impl std::fmt::Display for CueAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{};{}", self.cue_list, self.cue_number)
    }
}

/// Result of looking up the slide at a controller slide index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CueLookup {
    /// The index does not exist in the cached slide sequence
    OutOfRange,
    /// The slide exists but its label names no cue
    NoCue,
    Cue(CueAddress),
}

/// Total lookup of `slides[index]` followed by label extraction.
pub fn cue_at(slides: &[Slide], index: usize) -> CueLookup {
    match slides.get(index) {
        None => CueLookup::OutOfRange,
        Some(slide) => match CueAddress::from_label(&slide.label) {
            Some(cue) => CueLookup::Cue(cue),
            None => CueLookup::NoCue,
        },
    }
}
