pub mod card;
pub mod faceswap;
pub mod job;
