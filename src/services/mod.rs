pub mod dispatch;
pub mod faceswap;
pub mod generation;
pub mod jobs;
pub mod queue;
pub mod retention;
pub mod scryfall;
pub mod store;
