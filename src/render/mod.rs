pub mod custom_masks;
pub mod geometry;
pub mod reproject;
pub mod stage;
