//! Lumen Vision
//!
//! Candle and `image` backed implementations of the training capabilities:
//! - `ImagePipeline`: image probe and per-architecture input transform
//! - `VisionModelFactory`: AlexNet, ResNet-50 and VGG-16 from torchvision weights
//! - `CandleClassifier`: cross-entropy loss and Adam updates

pub mod arch;
pub mod classifier;
pub mod error;
pub mod factory;
pub mod networks;
pub mod transform;

pub use arch::{all_specs, spec_for, ArchitectureSpec};
pub use classifier::CandleClassifier;
pub use error::{VisionError, VisionResult};
pub use factory::{load_pretrained, resolve_device, VisionModelFactory};
pub use networks::Network;
pub use transform::{ImagePipeline, InputPolicy};
