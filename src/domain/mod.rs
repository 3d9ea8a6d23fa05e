pub mod event;
pub mod player;
pub mod tag;

pub use event::*;
pub use player::*;
pub use tag::*;
