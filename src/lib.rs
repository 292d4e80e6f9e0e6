//! Motion Engine
//!
//! 角色动画与软体模拟的数值核心：
//!
//! - `physics`: 粒子存储、时间积分器、球/布料接触响应
//! - `skeleton`: 骨骼层级、正向运动学、雅可比 IK 求解器
//! - `animation`: 骨骼使用的姿态与动作
//!
//! 骨架/动作文件加载和渲染由调用方负责；所有入口都显式传参，不依赖全局状态。

pub mod animation;
pub mod physics;
pub mod skeleton;

use thiserror::Error;

pub use animation::{Motion, MotionEditBuffer, Posture};
pub use physics::{
    CollisionResolver, ContactParams, ForceEvaluator, Integrator, IntegratorKind, ParticleWorld,
    Particles, PhysicsConfig, Spheres,
};
pub use skeleton::{
    forward_kinematics, inverse_kinematics, Bone, BoneDesc, DofFlags, IkChain, IkReport, IkSolver,
    IkSolverConfig, Skeleton, SkeletonBuilder,
};

/// 引擎错误类型
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bone index {index} out of range (skeleton has {count} bones)")]
    BoneOutOfRange { index: usize, count: usize },

    #[error("posture has {actual} entries but the skeleton has {expected} bones")]
    PostureSizeMismatch { expected: usize, actual: usize },

    #[error("invalid skeleton: {0}")]
    InvalidSkeleton(String),

    /// `start` 与 `end` 在根骨骼之下相交，经根骨骼的链会收集错误的关节
    #[error("IK chain {start} -> {end} diverges at bone {common_ancestor}, not at the root")]
    DivergentChain {
        start: usize,
        end: usize,
        common_ancestor: usize,
    },

    #[error("IK chain walk from bone {from} never reached bone {to} or the root")]
    BrokenChain { from: usize, to: usize },

    #[error("linear solver failed: {0}")]
    Solver(&'static str),

    #[error("frame {frame} out of range (motion has {count} frames)")]
    FrameOutOfRange { frame: usize, count: usize },

    #[error("motion has no frames")]
    EmptyMotion,
}

/// 引擎结果类型
pub type Result<T> = std::result::Result<T, EngineError>;
