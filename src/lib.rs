pub use pano_core as core;
pub use pano_photo as photo;
