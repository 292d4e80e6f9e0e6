//! 粒子世界
//!
//! 持有球、可选的布料粒子组、积分器和接触求解器。一个固定步：
//!
//! ```text
//! 积分（每阶段回调受力）→ 刷新受力 → 碰撞
//! ```
//!
//! 碰撞摩擦在刷新受力之后写入加速度，作用于下一步的积分。

use nalgebra::Vector3;

use super::collision::CollisionResolver;
use super::config::PhysicsConfig;
use super::integrator::{ForceEvaluator, Integrator};
use super::particles::Particles;
use super::spheres::Spheres;

/// 均匀重力：清零加速度后给每个有质量的粒子加上 `g`
#[derive(Clone, Copy, Debug)]
pub struct Gravity(pub Vector3<f32>);

impl ForceEvaluator for Gravity {
    fn evaluate(&mut self, particles: &mut [&mut Particles]) {
        for set in particles.iter_mut() {
            set.clear_acceleration();
            set.add_uniform_acceleration(self.0);
        }
    }
}

/// 一个固定步内的接触数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// 球-球接触数
    pub sphere_contacts: usize,
    /// 球-布料接触数
    pub cloth_contacts: usize,
}

/// 粒子世界
pub struct ParticleWorld {
    /// 配置
    config: PhysicsConfig,
    /// 积分器
    integrator: Box<dyn Integrator>,
    /// 接触求解器
    resolver: CollisionResolver,
    /// 球
    spheres: Spheres,
    /// 布料粒子（可选）
    cloth: Option<Particles>,
    /// 尚未模拟的时间，跨 `step_simulation` 调用累积
    accumulator: f32,
    /// 已模拟时间
    time: f32,
    /// 当前状态的加速度是否已计算过
    primed: bool,
}

impl ParticleWorld {
    /// 按配置创建空世界
    pub fn new(config: PhysicsConfig) -> Self {
        let integrator = config.integrator.build(config.delta_time);
        let resolver = CollisionResolver::from_config(&config);

        if config.debug_log {
            log::info!(
                "[ParticleWorld] created: integrator={:?}, dt={}, gravity={:?}",
                config.integrator,
                config.delta_time,
                config.gravity
            );
        }

        Self {
            spheres: Spheres::new(config.sphere_density),
            cloth: None,
            integrator,
            resolver,
            config,
            accumulator: 0.0,
            time: 0.0,
            primed: false,
        }
    }

    /// 添加静止的球，返回索引
    pub fn add_sphere(&mut self, position: Vector3<f32>, radius: f32) -> usize {
        self.primed = false;
        self.spheres.add_sphere(position, radius)
    }

    /// 安装（或替换）布料粒子组
    pub fn set_cloth(&mut self, cloth: Particles) {
        log::info!("[ParticleWorld] cloth installed: {} particles", cloth.len());
        self.primed = false;
        self.cloth = Some(cloth);
    }

    // ========================================
    // 步进
    // ========================================

    /// 只受重力的一个固定步
    pub fn step(&mut self) -> StepStats {
        let mut gravity = Gravity(self.config.gravity);
        self.step_with(&mut gravity)
    }

    /// 使用调用方受力模型的一个固定步
    pub fn step_with(&mut self, forces: &mut dyn ForceEvaluator) -> StepStats {
        {
            let mut sets: Vec<&mut Particles> = vec![self.spheres.particles_mut()];
            if let Some(cloth) = self.cloth.as_mut() {
                sets.push(cloth);
            }

            if !self.primed {
                forces.evaluate(&mut sets);
                self.primed = true;
            }
            self.integrator.integrate(&mut sets, forces);
            forces.evaluate(&mut sets);
        }

        let sphere_contacts = self.resolver.collide_spheres(&mut self.spheres);
        let cloth_contacts = match self.cloth.as_mut() {
            Some(cloth) => self.resolver.collide_sphere_cloth(&mut self.spheres, cloth),
            None => 0,
        };

        if let Some(max_speed) = self.config.max_linear_velocity {
            clamp_speed(self.spheres.particles_mut(), max_speed);
            if let Some(cloth) = self.cloth.as_mut() {
                clamp_speed(cloth, max_speed);
            }
        }

        self.time += self.integrator.delta_time();

        let stats = StepStats {
            sphere_contacts,
            cloth_contacts,
        };
        if self.config.debug_log {
            log::debug!("[ParticleWorld] t={:.4} {:?}", self.time, stats);
        }
        stats
    }

    /// 以固定步推进 `elapsed` 秒
    ///
    /// 最多执行 `max_substep_count` 步，超出的时间直接丢弃而不累积，
    /// 长时间卡顿后不会连锁追帧。返回实际步数。
    pub fn step_simulation(&mut self, elapsed: f32) -> u32 {
        let dt = self.integrator.delta_time();
        self.accumulator += elapsed;

        let mut steps = 0;
        while self.accumulator >= dt && steps < self.config.max_substep_count {
            self.step();
            self.accumulator -= dt;
            steps += 1;
        }

        if self.accumulator >= dt {
            log::warn!(
                "[ParticleWorld] dropping {:.4}s of simulation after {} substeps",
                self.accumulator,
                steps
            );
            self.accumulator = 0.0;
        }
        steps
    }

    /// 停止所有运动并重置时钟，位置保持不变
    pub fn reset(&mut self) {
        for set in std::iter::once(self.spheres.particles_mut()).chain(self.cloth.as_mut()) {
            set.velocities_mut().fill(0.0);
            set.clear_acceleration();
        }
        self.accumulator = 0.0;
        self.time = 0.0;
        self.primed = false;
    }

    // ========================================
    // 访问
    // ========================================

    /// 球
    #[inline]
    pub fn spheres(&self) -> &Spheres {
        &self.spheres
    }

    #[inline]
    pub fn spheres_mut(&mut self) -> &mut Spheres {
        &mut self.spheres
    }

    /// 布料粒子
    #[inline]
    pub fn cloth(&self) -> Option<&Particles> {
        self.cloth.as_ref()
    }

    #[inline]
    pub fn cloth_mut(&mut self) -> Option<&mut Particles> {
        self.cloth.as_mut()
    }

    /// 配置
    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// 已模拟时间（秒）
    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }
}

/// 把超过 `max_speed` 的速度按比例缩回
fn clamp_speed(particles: &mut Particles, max_speed: f32) {
    let max_sq = max_speed * max_speed;
    let count = particles.len();
    for mut column in particles.velocities_mut().column_iter_mut().take(count) {
        let speed_sq = column.norm_squared();
        if speed_sq > max_sq {
            column *= max_speed / speed_sq.sqrt();
        }
    }
}
