//! 骨骼系统
//!
//! - `Bone`: 骨骼树节点，含自由度与正向运动学结果
//! - `Skeleton`: 按索引存放骨骼，由 `SkeletonBuilder` 构建
//! - `forward_kinematics`: 姿态 → 每个骨骼的世界起点/终点/旋转
//! - `IkSolver`: 骨骼链上的阻尼最小二乘雅可比 IK

mod bone;
mod ik_solver;
mod kinematics;
#[allow(clippy::module_inception)]
mod skeleton;

pub use bone::{Bone, DofFlags, RotationLimits};
pub use ik_solver::{
    damped_least_squares, inverse_kinematics, jacobian, least_squares, IkChain, IkReport, IkSolver,
    IkSolverConfig,
};
pub use kinematics::forward_kinematics;
pub use skeleton::{Ancestors, BoneDesc, Skeleton, SkeletonBuilder, DEFAULT_SCALE, ROOT};
