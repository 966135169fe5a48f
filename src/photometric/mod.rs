pub mod gain;
pub mod histogram;
pub mod lut;
pub mod ransac;
