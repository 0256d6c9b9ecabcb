//! Page-watch core: data model, normalization, fingerprints, diffing and the
//! pure per-target cycle state machine.
mod decode;
mod diff;
mod draft;
mod effect;
mod fingerprint;
mod msg;
mod normalize;
mod state;
mod types;
mod update;

pub use decode::{decode_body, media_type, DecodeError, DecodedText};
pub use diff::{bounded_excerpt, split_blocks, DiffEngine, DEFAULT_KEYWORDS};
pub use draft::{clamp_draft, recommended_actions, render_bullets, select_for_draft};
pub use effect::Effect;
pub use fingerprint::{fingerprint, Fingerprint, FingerprintParseError};
pub use msg::Msg;
pub use normalize::{
    validate_selector, MalformedInputError, NoiseFilter, Normalizer, DEFAULT_NOISE_PATTERNS,
};
pub use state::{CycleSettings, CycleState, FirstSightPolicy, Phase};
pub use types::{
    ChangeKind, ChangeSegment, ConflictError, CycleError, CycleOutcome, CycleStatus,
    DeliveryAck, DraftError, ErrorKind, FetchError, FetchFailure, FetchedPage, NotifyError,
    NotifyFailure, Significance, Snapshot, SnapshotSummary, StoreError, Target, Tone,
    DRAFT_MAX_CHARS, MAX_EXCERPT_CHARS, MAX_RELEVANCE,
};
pub use update::update;
