//! 时间积分器
//!
//! 四种格式共用一个约定：把每组粒子推进一个 `delta_time`，
//! 某阶段需要中间状态的加速度时回调模拟循环重新计算。
//!
//! ```text
//! 显式欧拉   v' = v + h·a(x, v)          x' = x + h·v'
//! 隐式欧拉   预测 (x + h·v, v + h·a)，然后
//!            v' = v + h·a(pred)          x' = x + h·v'
//! 中点欧拉   暂存 (x + h/2·v, v + h/2·a)，然后
//!            v' = v + h·a(mid)           x' = x + h·v
//! RK4        四个阶段的 k = (h·a, h·v)，权重 1/6 2/6 2/6 1/6
//! ```
//!
//! 积分器不校验 `delta_time`，非正或 NaN 步长直接参与运算。

use nalgebra::Matrix3xX;

use super::particles::{ParticleState, Particles};

// ============================================================================
// 受力回调
// ============================================================================

/// 按当前暂存的位置/速度重新计算加速度
///
/// 在积分阶段之间同步调用。可以写入传入粒子组中任意粒子的加速度，
/// 但不能增删粒子，也不能重入积分器。
pub trait ForceEvaluator {
    /// 重新计算并写入加速度
    fn evaluate(&mut self, particles: &mut [&mut Particles]);
}

impl<F> ForceEvaluator for F
where
    F: FnMut(&mut [&mut Particles]),
{
    #[inline]
    fn evaluate(&mut self, particles: &mut [&mut Particles]) {
        self(particles)
    }
}

/// 不修改加速度的回调（恒定加速度场景）
#[derive(Clone, Copy, Debug, Default)]
pub struct HoldAcceleration;

impl ForceEvaluator for HoldAcceleration {
    #[inline]
    fn evaluate(&mut self, _particles: &mut [&mut Particles]) {}
}

// ============================================================================
// 积分器接口
// ============================================================================

/// 积分格式选择
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IntegratorKind {
    /// 显式（辛）欧拉，不回调
    #[default]
    ExplicitEuler,
    /// 预测-校正式隐式欧拉，回调 1 次
    ImplicitEuler,
    /// 中点欧拉，回调 1 次
    MidpointEuler,
    /// 四阶龙格-库塔，回调 3 次
    RungeKuttaFourth,
}

impl IntegratorKind {
    /// 全部格式
    pub const ALL: [IntegratorKind; 4] = [
        IntegratorKind::ExplicitEuler,
        IntegratorKind::ImplicitEuler,
        IntegratorKind::MidpointEuler,
        IntegratorKind::RungeKuttaFourth,
    ];

    /// 按步长构建对应积分器
    pub fn build(self, delta_time: f32) -> Box<dyn Integrator> {
        match self {
            IntegratorKind::ExplicitEuler => Box::new(ExplicitEuler::new(delta_time)),
            IntegratorKind::ImplicitEuler => Box::new(ImplicitEuler::new(delta_time)),
            IntegratorKind::MidpointEuler => Box::new(MidpointEuler::new(delta_time)),
            IntegratorKind::RungeKuttaFourth => Box::new(RungeKuttaFourth::new(delta_time)),
        }
    }

    /// 每次 `integrate` 调用受力回调的次数
    pub fn evaluations_per_step(self) -> usize {
        match self {
            IntegratorKind::ExplicitEuler => 0,
            IntegratorKind::ImplicitEuler | IntegratorKind::MidpointEuler => 1,
            IntegratorKind::RungeKuttaFourth => 3,
        }
    }
}

/// 时间步进格式
pub trait Integrator {
    /// 把每组粒子推进一步，原地修改位置/速度
    fn integrate(&self, particles: &mut [&mut Particles], step: &mut dyn ForceEvaluator);

    /// 步长
    fn delta_time(&self) -> f32;

    /// 格式类型
    fn kind(&self) -> IntegratorKind;
}

fn save_states(particles: &[&mut Particles]) -> Vec<ParticleState> {
    particles.iter().map(|p| p.state()).collect()
}

// ============================================================================
// 显式（辛）欧拉
// ============================================================================

/// 显式欧拉：`v += h·a; x += h·v`，位置使用更新后的速度
#[derive(Clone, Copy, Debug)]
pub struct ExplicitEuler {
    delta_time: f32,
}

impl ExplicitEuler {
    /// 创建积分器
    pub fn new(delta_time: f32) -> Self {
        Self { delta_time }
    }
}

impl Integrator for ExplicitEuler {
    fn integrate(&self, particles: &mut [&mut Particles], _step: &mut dyn ForceEvaluator) {
        // 位置使用更新后的速度
        for p in particles.iter_mut() {
            p.advance_velocity(self.delta_time);
            p.advance_position(self.delta_time);
        }
    }

    fn delta_time(&self) -> f32 {
        self.delta_time
    }

    fn kind(&self) -> IntegratorKind {
        IntegratorKind::ExplicitEuler
    }
}

// ============================================================================
// 隐式欧拉（预测-校正）
// ============================================================================

/// 先显式预测一步，用预测状态的加速度修正速度，再由新速度推进位置
#[derive(Clone, Copy, Debug)]
pub struct ImplicitEuler {
    delta_time: f32,
}

impl ImplicitEuler {
    /// 创建积分器
    pub fn new(delta_time: f32) -> Self {
        Self { delta_time }
    }
}

impl Integrator for ImplicitEuler {
    fn integrate(&self, particles: &mut [&mut Particles], step: &mut dyn ForceEvaluator) {
        let dt = self.delta_time;
        let origin = save_states(particles);

        // 预测：两项更新都基于起点状态
        for p in particles.iter_mut() {
            let dx = p.velocities() * dt;
            p.advance_velocity(dt);
            *p.positions_mut() += dx;
        }

        step.evaluate(particles);

        for (p, o) in particles.iter_mut().zip(&origin) {
            let velocity = &o.velocity + p.accelerations() * dt;
            let position = &o.position + &velocity * dt;
            *p.velocities_mut() = velocity;
            *p.positions_mut() = position;
        }
    }

    fn delta_time(&self) -> f32 {
        self.delta_time
    }

    fn kind(&self) -> IntegratorKind {
        IntegratorKind::ImplicitEuler
    }
}

// ============================================================================
// 中点欧拉
// ============================================================================

/// 半步求中点加速度；速度用中点加速度，位置用起点速度
#[derive(Clone, Copy, Debug)]
pub struct MidpointEuler {
    delta_time: f32,
}

impl MidpointEuler {
    /// 创建积分器
    pub fn new(delta_time: f32) -> Self {
        Self { delta_time }
    }
}

impl Integrator for MidpointEuler {
    fn integrate(&self, particles: &mut [&mut Particles], step: &mut dyn ForceEvaluator) {
        let dt = self.delta_time;
        let half = 0.5 * dt;
        let origin = save_states(particles);

        for p in particles.iter_mut() {
            let dx = p.velocities() * half;
            p.advance_velocity(half);
            *p.positions_mut() += dx;
        }

        step.evaluate(particles);

        // 位置用起点速度推进，而不是中点速度
        for (p, o) in particles.iter_mut().zip(&origin) {
            let velocity = &o.velocity + p.accelerations() * dt;
            let position = &o.position + &o.velocity * dt;
            *p.velocities_mut() = velocity;
            *p.positions_mut() = position;
        }
    }

    fn delta_time(&self) -> f32 {
        self.delta_time
    }

    fn kind(&self) -> IntegratorKind {
        IntegratorKind::MidpointEuler
    }
}

// ============================================================================
// 四阶龙格-库塔
// ============================================================================

/// RK4 的一个阶段：在暂存状态上采样的 `h·a` 与 `h·v`
#[derive(Clone, Debug)]
struct Stage {
    /// `h·a`
    acceleration: Matrix3xX<f32>,
    /// `h·v`
    velocity: Matrix3xX<f32>,
}

impl Stage {
    fn sample(p: &Particles, dt: f32) -> Self {
        Self {
            acceleration: p.accelerations() * dt,
            velocity: p.velocities() * dt,
        }
    }
}

/// 经典 RK4，权重 1/6 2/6 2/6 1/6
#[derive(Clone, Copy, Debug)]
pub struct RungeKuttaFourth {
    delta_time: f32,
}

impl RungeKuttaFourth {
    /// 创建积分器
    pub fn new(delta_time: f32) -> Self {
        Self { delta_time }
    }

    /// 以刚采样的加速度与速度暂存 `origin + fraction·h·(a, v)`。
    /// 两者都必须在覆盖前读取。
    fn stage(p: &mut Particles, origin: &ParticleState, dt: f32, fraction: f32) {
        let position = &origin.position + p.velocities() * (dt * fraction);
        let velocity = &origin.velocity + p.accelerations() * (dt * fraction);
        *p.velocities_mut() = velocity;
        *p.positions_mut() = position;
    }
}

impl Integrator for RungeKuttaFourth {
    fn integrate(&self, particles: &mut [&mut Particles], step: &mut dyn ForceEvaluator) {
        let dt = self.delta_time;
        let origin = save_states(particles);

        // k1 取自起点状态，然后暂存第一个半步
        let mut k1 = Vec::with_capacity(particles.len());
        for (p, o) in particles.iter_mut().zip(&origin) {
            k1.push(Stage::sample(p, dt));
            Self::stage(p, o, dt, 0.5);
        }
        step.evaluate(particles);

        let mut k2 = Vec::with_capacity(particles.len());
        for (p, o) in particles.iter_mut().zip(&origin) {
            k2.push(Stage::sample(p, dt));
            Self::stage(p, o, dt, 0.5);
        }
        step.evaluate(particles);

        let mut k3 = Vec::with_capacity(particles.len());
        for (p, o) in particles.iter_mut().zip(&origin) {
            k3.push(Stage::sample(p, dt));
            Self::stage(p, o, dt, 1.0);
        }
        step.evaluate(particles);

        for (i, (p, o)) in particles.iter_mut().zip(&origin).enumerate() {
            let k4 = Stage::sample(p, dt);
            let dv = (&k1[i].acceleration
                + &k2[i].acceleration * 2.0
                + &k3[i].acceleration * 2.0
                + &k4.acceleration)
                / 6.0;
            let dx = (&k1[i].velocity + &k2[i].velocity * 2.0 + &k3[i].velocity * 2.0 + &k4.velocity)
                / 6.0;
            *p.velocities_mut() = &o.velocity + dv;
            *p.positions_mut() = &o.position + dx;
        }
    }

    fn delta_time(&self) -> f32 {
        self.delta_time
    }

    fn kind(&self) -> IntegratorKind {
        IntegratorKind::RungeKuttaFourth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn falling_particle(acceleration: Vector3<f32>) -> Particles {
        let mut particles = Particles::new(1);
        particles.push(Vector3::zeros(), Vector3::zeros(), 1.0);
        particles.set_acceleration(0, acceleration);
        particles
    }

    /// 单位频率谐振子：a = -x
    fn spring(particles: &mut [&mut Particles]) {
        for p in particles.iter_mut() {
            let a = -p.positions().clone();
            *p.accelerations_mut() = a;
        }
    }

    fn run(kind: IntegratorKind, particles: &mut Particles, dt: f32, steps: usize) {
        let integrator = kind.build(dt);
        let mut hold = HoldAcceleration;
        for _ in 0..steps {
            integrator.integrate(&mut [&mut *particles], &mut hold);
        }
    }

    /// 积分到 `duration` 后相对 `x(t) = cos t` 的位置误差
    fn oscillator_error(kind: IntegratorKind, dt: f32, duration: f32) -> f32 {
        let mut particles = Particles::new(1);
        particles.push(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros(), 1.0);
        particles.set_acceleration(0, Vector3::new(-1.0, 0.0, 0.0));
        let integrator = kind.build(dt);
        let steps = (duration / dt).round() as usize;
        let mut force = spring;
        for _ in 0..steps {
            integrator.integrate(&mut [&mut particles], &mut force);
            spring(&mut [&mut particles]);
        }
        (particles.position(0).x - duration.cos()).abs()
    }

    #[test]
    fn test_explicit_euler_recurrence() {
        let a = Vector3::new(0.0, -9.8, 0.0);
        let dt = 0.01;
        let n = 50;
        let mut particles = falling_particle(a);
        run(IntegratorKind::ExplicitEuler, &mut particles, dt, n);

        // 辛欧拉递推：v_k = k·dt·a，x_n = Σ dt·v_k
        let mut v = Vector3::zeros();
        let mut x = Vector3::zeros();
        for _ in 0..n {
            v += a * dt;
            x += v * dt;
        }
        assert_relative_eq!(particles.velocity(0).y, (n as f32) * dt * a.y, epsilon = 1e-4);
        assert_relative_eq!(particles.velocity(0).y, v.y, epsilon = 1e-6);
        assert_relative_eq!(particles.position(0).y, x.y, epsilon = 1e-6);
    }

    #[test]
    fn test_callback_counts() {
        for kind in IntegratorKind::ALL {
            let mut particles = falling_particle(Vector3::new(0.0, -1.0, 0.0));
            let integrator = kind.build(0.1);
            let mut calls = 0usize;
            let mut counter = |_: &mut [&mut Particles]| calls += 1;
            integrator.integrate(&mut [&mut particles], &mut counter);
            assert_eq!(calls, kind.evaluations_per_step(), "{:?}", kind);
            assert_eq!(integrator.kind(), kind);
        }
    }

    #[test]
    fn test_constant_acceleration_converges() {
        let a = Vector3::new(0.0, -9.8, 0.0);
        let t = 1.0_f32;
        let exact = 0.5 * a.y * t * t;

        for kind in IntegratorKind::ALL {
            let mut coarse = falling_particle(a);
            run(kind, &mut coarse, 0.01, 100);
            let mut fine = falling_particle(a);
            run(kind, &mut fine, 0.001, 1000);

            let coarse_error = (coarse.position(0).y - exact).abs();
            let fine_error = (fine.position(0).y - exact).abs();
            assert!(fine_error <= coarse_error + 1e-4, "{:?}", kind);
            assert!(fine_error < 0.01, "{:?}: {}", kind, fine_error);
            assert_relative_eq!(fine.velocity(0).y, a.y * t, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_rk4_exact_for_constant_acceleration() {
        let a = Vector3::new(1.0, -9.8, 0.5);
        let mut particles = falling_particle(a);
        particles.set_velocity(0, Vector3::new(2.0, 0.0, 0.0));
        run(IntegratorKind::RungeKuttaFourth, &mut particles, 0.1, 1);

        assert_relative_eq!(particles.position(0).x, 0.2 + 0.005, epsilon = 1e-6);
        assert_relative_eq!(particles.position(0).y, -0.049, epsilon = 1e-6);
        assert_relative_eq!(particles.velocity(0).y, -0.98, epsilon = 1e-6);
    }

    #[test]
    fn test_midpoint_uses_origin_velocity_for_position() {
        let mut particles = falling_particle(Vector3::new(0.0, -10.0, 0.0));
        particles.set_velocity(0, Vector3::new(1.0, 0.0, 0.0));
        run(IntegratorKind::MidpointEuler, &mut particles, 0.5, 1);

        assert_relative_eq!(particles.position(0).x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(particles.position(0).y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(particles.velocity(0).y, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_implicit_euler_uses_predicted_acceleration() {
        let mut particles = Particles::new(1);
        particles.push(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros(), 1.0);
        particles.set_acceleration(0, Vector3::new(-1.0, 0.0, 0.0));
        let integrator = ImplicitEuler::new(0.5);
        let mut force = spring;
        integrator.integrate(&mut [&mut particles], &mut force);

        // 预测 x = 1（v0 = 0），所以 a(pred) = -1
        assert_relative_eq!(particles.velocity(0).x, -0.5, epsilon = 1e-6);
        assert_relative_eq!(particles.position(0).x, 0.75, epsilon = 1e-6);
    }

    #[test]
    fn test_rk4_higher_order_than_euler() {
        let euler_coarse = oscillator_error(IntegratorKind::ExplicitEuler, 0.02, 1.0);
        let euler_fine = oscillator_error(IntegratorKind::ExplicitEuler, 0.01, 1.0);
        let rk4_coarse = oscillator_error(IntegratorKind::RungeKuttaFourth, 0.02, 1.0);

        assert!(euler_fine < euler_coarse);
        assert!(rk4_coarse < euler_fine * 0.05, "rk4 {} euler {}", rk4_coarse, euler_fine);
    }

    #[test]
    fn test_rk4_fourth_order_on_oscillator() {
        // 步长减半，误差约缩小 2^4 = 16 倍
        let coarse = oscillator_error(IntegratorKind::RungeKuttaFourth, 0.4, 2.0);
        let fine = oscillator_error(IntegratorKind::RungeKuttaFourth, 0.2, 2.0);
        let ratio = coarse / fine;
        assert!(ratio > 10.0, "error ratio {} ({} -> {})", ratio, coarse, fine);
        assert!(coarse < 1e-3, "{}", coarse);
    }

    #[test]
    fn test_rk4_stage_position_uses_sampled_velocity() {
        // 从 x = 1, v = 0 以 h = 1 对 a = -x 走一步：
        // k1 = (-1, 0), k2 = (-1, -0.5), k3 = (-0.75, -0.5), k4 = (-0.5, -0.75)
        let mut particles = Particles::new(1);
        particles.push(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros(), 1.0);
        particles.set_acceleration(0, Vector3::new(-1.0, 0.0, 0.0));
        let mut force = spring;
        RungeKuttaFourth::new(1.0).integrate(&mut [&mut particles], &mut force);

        assert_relative_eq!(particles.velocity(0).x, -5.0 / 6.0, epsilon = 1e-6);
        assert_relative_eq!(particles.position(0).x, 1.0 - 2.75 / 6.0, epsilon = 1e-6);
    }

    #[test]
    fn test_integrates_every_set() {
        let mut a = falling_particle(Vector3::new(0.0, -1.0, 0.0));
        let mut b = falling_particle(Vector3::new(0.0, -1.0, 0.0));
        let integrator = RungeKuttaFourth::new(0.1);
        integrator.integrate(&mut [&mut a, &mut b], &mut HoldAcceleration);
        assert_eq!(a.position(0), b.position(0));
        assert!(b.velocity(0).y < 0.0);
    }
}
