//! 粒子模拟配置
//!
//! 所有参数扁平化。直接修改这里的默认值，或显式构造后传给
//! [`ParticleWorld::new`](super::ParticleWorld::new)。

use nalgebra::Vector3;

use super::integrator::IntegratorKind;

/// 模拟配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    // ========== 步进 ==========
    /// 固定步长（秒），默认 0.001
    pub delta_time: f32,
    /// 积分格式，默认显式欧拉
    pub integrator: IntegratorKind,
    /// 每次 `step_simulation` 最多执行的固定步数，默认 5
    pub max_substep_count: u32,

    // ========== 外力 ==========
    /// 均匀重力加速度，默认 (0, -9.8, 0)
    pub gravity: Vector3<f32>,

    // ========== 球 ==========
    /// 球密度（质量 = 密度 · r³），默认 1000.0
    pub sphere_density: f32,
    /// 球-球恢复系数，默认 0.8
    pub sphere_restitution: f32,
    /// 球-球摩擦系数，默认 0.03
    pub sphere_friction: f32,

    // ========== 布料 ==========
    /// 球-布料恢复系数，默认 0.0
    pub cloth_restitution: f32,
    /// 球-布料摩擦系数，默认 0.05
    pub cloth_friction: f32,

    // ========== 接触 ==========
    /// 每次接触修正的穿透比例，默认 0.15
    pub correction_factor: f32,
    /// 每步之后的粒子速度上限，默认不限制
    pub max_linear_velocity: Option<f32>,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            // ====== 步进 ======
            // 显式格式在硬布料上远不到 1e-2 就会发散，步长保持小值
            delta_time: 0.001,
            integrator: IntegratorKind::ExplicitEuler,
            max_substep_count: 5,

            // ====== 外力 ======
            gravity: Vector3::new(0.0, -9.8, 0.0),

            // ====== 球 ======
            sphere_density: 1000.0,
            sphere_restitution: 0.8,
            sphere_friction: 0.03,

            // ====== 布料 ======
            // 布料完全吸收冲击
            cloth_restitution: 0.0,
            cloth_friction: 0.05,

            // ====== 接触 ======
            correction_factor: 0.15,
            max_linear_velocity: None,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

impl PhysicsConfig {
    /// 默认参数，只替换积分格式
    pub fn with_integrator(integrator: IntegratorKind) -> Self {
        Self {
            integrator,
            ..Self::default()
        }
    }
}
