//! 粒子物理
//!
//! - `Particles`: 列式粒子组
//! - `Integrator`: 四种时间积分格式
//! - `CollisionResolver`: 暴力两两遍历的球-球 / 球-布料接触响应
//! - `ParticleWorld`: 固定步长模拟循环

pub mod collision;
pub mod config;
pub mod integrator;
pub mod particle_world;
pub mod particles;
pub mod spheres;

pub use collision::{CollisionResolver, ContactParams};
pub use config::PhysicsConfig;
pub use integrator::{
    ExplicitEuler, ForceEvaluator, HoldAcceleration, ImplicitEuler, Integrator, IntegratorKind,
    MidpointEuler, RungeKuttaFourth,
};
pub use particle_world::{Gravity, ParticleWorld, StepStats};
pub use particles::{ParticleState, Particles};
pub use spheres::Spheres;
