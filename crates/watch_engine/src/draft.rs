use async_trait::async_trait;
use watch_core::{render_bullets, ChangeSegment, DraftError, Target, DRAFT_MAX_CHARS};

/// Produces the human-readable message for a detected change.
#[async_trait]
pub trait Drafter: Send + Sync {
    /// `segments` is never empty and is already ranked and capped.
    async fn draft(&self, segments: &[ChangeSegment], target: &Target)
        -> Result<String, DraftError>;
}

/// Deterministic drafter that renders ranked segments as a bullet list.
#[derive(Debug, Clone)]
pub struct BulletDrafter {
    max_chars: usize,
}

impl BulletDrafter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for BulletDrafter {
    fn default() -> Self {
        Self::new(DRAFT_MAX_CHARS)
    }
}

#[async_trait]
impl Drafter for BulletDrafter {
    async fn draft(
        &self,
        segments: &[ChangeSegment],
        target: &Target,
    ) -> Result<String, DraftError> {
        if segments.is_empty() {
            return Err(DraftError::new("nothing to draft"));
        }
        Ok(render_bullets(target, segments, self.max_chars))
    }
}
