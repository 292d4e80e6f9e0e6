//! 动画数据
//!
//! `Posture` 是一帧的每骨骼旋转/平移；`Motion` 是加载器产出的帧序列。

mod motion;
mod posture;

pub use motion::{Motion, MotionEditBuffer};
pub use posture::{rotate_zyx, Posture};
