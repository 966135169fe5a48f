pub mod blur;
pub mod distance;
pub mod masks;
