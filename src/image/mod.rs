pub mod filter;
pub mod resample;
pub mod transform;
pub mod volume;

pub use transform::RigidTransform3;
pub use volume::{BinaryMask, BinaryPlane, ChannelStack, MaskStack, Plane, Volume};
