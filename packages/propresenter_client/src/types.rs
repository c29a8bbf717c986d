use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Payload of `/v1/presentation/active`. `presentation` is null between shows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivePresentationResponse {
    #[serde(default)]
    pub presentation: Option<ActivePresentation>,
}

/// Payload of `/v1/presentation/slide_index`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlideIndexResponse {
    #[serde(default)]
    pub presentation_index: Option<SlideIndexEvent>,
}

/// The slide the controller is currently showing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideIndexEvent {
    /// Position in the presentation's slides, counted across all groups
    pub index: usize,
    pub presentation_id: PresentationId,
}

/// Identifies a loaded presentation. Only `uuid` is meaningful for equality
/// across the two streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationId {
    pub uuid: String,
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub index: i64,
}

impl PresentationId {
    pub fn same_presentation(&self, other: &PresentationId) -> bool {
        self.uuid == other.uuid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePresentation {
    pub id: PresentationId,
    pub groups: Vec<Group>,
    #[serde(default, deserialize_with = "lenient")]
    pub has_timeline: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub presentation_path: String,
    #[serde(default, deserialize_with = "lenient")]
    pub destination: String,
}

impl ActivePresentation {
    /// All slides in controller order: group by group, then slide by slide.
    pub fn slides(&self) -> impl Iterator<Item = &Slide> {
        self.groups.iter().flat_map(|group| group.slides.iter())
    }

    pub fn slide_count(&self) -> usize {
        self.groups.iter().map(|group| group.slides.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub color: Color,
    #[serde(default, deserialize_with = "null_as_default")]
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    #[serde(default, deserialize_with = "lenient")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub notes: String,
    #[serde(default, deserialize_with = "lenient")]
    pub text: String,
    /// Operator-facing label; the only field that carries cue information
    #[serde(default, deserialize_with = "lenient")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient")]
    pub color: Color,
    #[serde(default, deserialize_with = "lenient")]
    pub size: Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Color {
    #[serde(deserialize_with = "lenient")]
    pub red: f64,
    #[serde(deserialize_with = "lenient")]
    pub green: f64,
    #[serde(deserialize_with = "lenient")]
    pub blue: f64,
    #[serde(deserialize_with = "lenient")]
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Size {
    #[serde(deserialize_with = "lenient")]
    pub width: f64,
    #[serde(deserialize_with = "lenient")]
    pub height: f64,
}

/// Reads a descriptive field. Null, or a value of the wrong type, becomes
/// `T::default()` instead of failing the whole presentation.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Null reads as `T::default()`; any other value must still fit `T`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
