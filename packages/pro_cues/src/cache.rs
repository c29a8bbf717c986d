use propresenter_client::{ActivePresentation, PresentationId, Slide};
use tracing::{debug, info};

/// Last-known active presentation together with its flattened slides.
///
/// Both halves are replaced in one assignment, so identity and slides always
/// come from the same controller message.
#[derive(Debug, Default)]
pub struct PresentationCache {
    current: Option<CachedPresentation>,
}

#[derive(Debug)]
pub struct CachedPresentation {
    pub presentation: ActivePresentation,
    /// Every group's slides, in group order then slide order
    pub slides: Vec<Slide>,
}

impl CachedPresentation {
    fn new(presentation: ActivePresentation) -> Self {
        let slides = presentation.slides().cloned().collect();
        Self {
            presentation,
            slides,
        }
    }
}

impl PresentationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, presentation: ActivePresentation) {
        let changed = self
            .current_id()
            .is_none_or(|id| !id.same_presentation(&presentation.id));
        let next = CachedPresentation::new(presentation);

        if changed {
            info!(
                uuid = %next.presentation.id.uuid,
                slides = next.presentation.slide_count(),
                "Active presentation: {}",
                next.presentation.id.name
            );
        } else {
            debug!(
                uuid = %next.presentation.id.uuid,
                slides = next.presentation.slide_count(),
                "Active presentation updated"
            );
        }

        self.current = Some(next);
    }

    pub fn snapshot(&self) -> Option<&CachedPresentation> {
        self.current.as_ref()
    }

    pub fn current_presentation(&self) -> Option<&ActivePresentation> {
        self.snapshot().map(|c| &c.presentation)
    }

    pub fn current_id(&self) -> Option<&PresentationId> {
        self.current_presentation().map(|p| &p.id)
    }

    /// Empty until the first presentation arrives.
    pub fn current_slides(&self) -> &[Slide] {
        self.snapshot().map_or(&[], |c| c.slides.as_slice())
    }

    /// Whether `id` names the cached presentation. False when nothing is cached.
    pub fn matches(&self, id: &PresentationId) -> bool {
        self.current_id()
            .is_some_and(|current| current.same_presentation(id))
    }
}
