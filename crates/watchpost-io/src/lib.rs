//! watchpost-io: camera polling, frame annotation, image stores and alerts.
//!
//! Everything that touches the network or the filesystem lives here so the
//! surveillance loop can be driven by fakes in tests.

pub mod alert;
pub mod camera;
pub mod frame;
pub mod store;

#[cfg(test)]
mod test_server;

pub use alert::{AlertSink, NullAlert, TelegramAlert};
pub use camera::{CameraError, FrameSource, HttpCamera};
pub use frame::{Annotator, Frame, FrameError};
pub use store::{GalleryStore, IntruderStore, StoreError};
