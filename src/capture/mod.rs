//! Frame capture: devices, the latest-wins slot and the `FrameSource` seam.

pub mod device;
pub mod frame;
pub mod slot;
pub mod source;
pub mod still_image;
pub mod synthetic;

pub use device::{CaptureDevice, DeviceFrameSource};
pub use frame::Frame;
pub use slot::{FrameGuard, LatestFrame};
pub use source::{FrameSource, MockFrameSource};
pub use still_image::{StillImageDevice, load_image_frame};
pub use synthetic::SyntheticDevice;
