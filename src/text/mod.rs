//! Pure text cleanup for pasted content: normalization, chat header removal
//! and segmentation into separately sent messages.

pub mod metadata;
pub mod normalize;
pub mod segment;

pub use metadata::remove_whatsapp_metadata;
pub use normalize::{needs_normalization, normalization_stats, normalize, NormalizationStats};
pub use segment::{split_text, Separator};
