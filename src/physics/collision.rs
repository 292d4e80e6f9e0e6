//! 接触检测与响应
//!
//! 球-球、球-布料粒子两种接触，暴力两两遍历（无粗检测阶段）。
//! 每对接触依次处理：
//!
//! 1. 沿法线的冲量，由恢复系数控制（0 完全非弹性，1 完全弹性），切向速度不变；
//! 2. 沿法线的部分位置修正；
//! 3. 类库仑摩擦，写入加速度。
//!
//! 质量按原值使用：质量为 0 的粒子不改变对方速度，两个都为 0 时会除零。

use nalgebra::Vector3;

use super::config::PhysicsConfig;
use super::particles::Particles;
use super::spheres::Spheres;

/// 材质接触参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactParams {
    /// 恢复系数，范围 [0, 1]
    pub restitution: f32,
    /// 摩擦系数
    pub friction: f32,
}

impl ContactParams {
    /// 创建接触参数
    pub fn new(restitution: f32, friction: f32) -> Self {
        Self { restitution, friction }
    }
}

/// 单个粒子状态的副本，在处理一次接触期间从粒子组中取出
#[derive(Clone, Copy, Debug)]
struct ContactBody {
    position: Vector3<f32>,
    velocity: Vector3<f32>,
    acceleration: Vector3<f32>,
    mass: f32,
    inverse_mass: f32,
}

impl ContactBody {
    fn load(particles: &Particles, i: usize) -> Self {
        Self {
            position: particles.position(i),
            velocity: particles.velocity(i),
            acceleration: particles.acceleration(i),
            mass: particles.mass(i),
            inverse_mass: particles.inverse_mass(i),
        }
    }

    fn store(&self, particles: &mut Particles, i: usize) {
        particles.set_position(i, self.position);
        particles.set_velocity(i, self.velocity);
        particles.set_acceleration(i, self.acceleration);
    }
}

#[inline]
fn unit_or_zero(v: Vector3<f32>) -> Vector3<f32> {
    v.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// 接触法线（由 `b` 指向 `a`）与中心距离
#[inline]
fn contact_frame(a: &ContactBody, b: &ContactBody) -> (Vector3<f32>, f32) {
    let offset = a.position - b.position;
    (unit_or_zero(offset), offset.norm())
}

/// 两者沿法线相互靠近
#[inline]
fn is_closing(a: &ContactBody, b: &ContactBody, normal: &Vector3<f32>) -> bool {
    (a.velocity - b.velocity).dot(normal) < 0.0
}

/// 两两接触求解器
#[derive(Clone, Copy, Debug)]
pub struct CollisionResolver {
    /// 球-球
    pub sphere: ContactParams,
    /// 球-布料粒子
    pub cloth: ContactParams,
    /// 每次处理推出的穿透比例
    pub correction_factor: f32,
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self::from_config(&PhysicsConfig::default())
    }
}

impl CollisionResolver {
    /// 创建求解器
    pub fn new(sphere: ContactParams, cloth: ContactParams, correction_factor: f32) -> Self {
        Self {
            sphere,
            cloth,
            correction_factor,
        }
    }

    /// 从模拟配置读取接触参数
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self::new(
            ContactParams::new(config.sphere_restitution, config.sphere_friction),
            ContactParams::new(config.cloth_restitution, config.cloth_friction),
            config.correction_factor,
        )
    }

    /// 处理所有重叠且相互靠近的球对 `(i, j)`，`j > i`。
    /// 返回处理的接触数。
    pub fn collide_spheres(&self, spheres: &mut Spheres) -> usize {
        let count = spheres.len();
        let mut contacts = 0;

        for i in 0..count {
            for j in (i + 1)..count {
                let radius_sum = spheres.radius(i) + spheres.radius(j);
                let particles = spheres.particles_mut();
                let mut a = ContactBody::load(particles, i);
                let mut b = ContactBody::load(particles, j);

                let (normal, distance) = contact_frame(&a, &b);
                if distance < radius_sum && is_closing(&a, &b, &normal) {
                    self.resolve(&mut a, &mut b, normal, radius_sum - distance, self.sphere);
                    a.store(particles, i);
                    b.store(particles, j);
                    contacts += 1;
                }
            }
        }

        if contacts > 0 {
            log::trace!("sphere-sphere pass resolved {} contacts", contacts);
        }
        contacts
    }

    /// 处理每个球与每个布料粒子。布料粒子视为点，
    /// 距离小于球半径即接触。返回处理的接触数。
    pub fn collide_sphere_cloth(&self, spheres: &mut Spheres, cloth: &mut Particles) -> usize {
        let count = spheres.len();
        let mut contacts = 0;

        for i in 0..count {
            let radius = spheres.radius(i);
            for j in 0..cloth.len() {
                let particles = spheres.particles_mut();
                let mut a = ContactBody::load(particles, i);
                let mut b = ContactBody::load(cloth, j);

                let (normal, distance) = contact_frame(&a, &b);
                if distance < radius && is_closing(&a, &b, &normal) {
                    self.resolve(&mut a, &mut b, normal, radius - distance, self.cloth);
                    a.store(particles, i);
                    b.store(cloth, j);
                    contacts += 1;
                }
            }
        }

        if contacts > 0 {
            log::trace!("sphere-cloth pass resolved {} contacts", contacts);
        }
        contacts
    }

    /// 单次接触的冲量、位置修正与摩擦
    fn resolve(
        &self,
        a: &mut ContactBody,
        b: &mut ContactBody,
        normal: Vector3<f32>,
        penetration: f32,
        params: ContactParams,
    ) {
        let e = params.restitution;

        let normal_a = normal * a.velocity.dot(&normal);
        let normal_b = normal * b.velocity.dot(&normal);
        let tangent_a = a.velocity - normal_a;
        let tangent_b = b.velocity - normal_b;

        // 沿法线的二体碰撞
        let total_mass = a.mass + b.mass;
        let shared = normal_a * a.mass + normal_b * b.mass;
        let after_a = (shared + (normal_b - normal_a) * (b.mass * e)) / total_mass;
        let after_b = (shared + (normal_a - normal_b) * (a.mass * e)) / total_mass;
        a.velocity = after_a + tangent_a;
        b.velocity = after_b + tangent_b;

        let correction = normal * (penetration * self.correction_factor);
        a.position += correction;
        b.position -= correction;

        // 摩擦与冲量前的切向运动方向相反，大小按受力的法向分量缩放
        let friction_a = unit_or_zero(tangent_a)
            * (-params.friction * -normal.dot(&(a.acceleration * a.mass)));
        let friction_b = unit_or_zero(tangent_b)
            * (-params.friction * -normal.dot(&(b.acceleration * b.mass)));
        a.acceleration += friction_a * a.inverse_mass;
        b.acceleration += friction_b * b.inverse_mass;
    }
}
