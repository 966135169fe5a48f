pub mod linear;
pub mod seam;
pub mod strategy;
