pub mod chat;
pub mod error;
pub mod presence;
pub mod roster;
pub mod router;
pub mod traits;
pub mod unimplemented;

pub use router::FrameRouter;
pub use traits::FrameHandler;
