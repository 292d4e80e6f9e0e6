//! 粒子存储
//!
//! 结构数组（SoA）布局：每个属性是一个列主序矩阵，每列一个粒子，
//! 整组更新即一条矩阵表达式。

use nalgebra::{DVector, Matrix3xX, Vector3};

/// 粒子组位置/速度快照（积分器阶段的起点）
#[derive(Clone, Debug)]
pub struct ParticleState {
    /// 位置（每列一个粒子）
    pub position: Matrix3xX<f32>,
    /// 速度（每列一个粒子）
    pub velocity: Matrix3xX<f32>,
}

/// 列式粒子组
///
/// 存储共 `capacity` 列，只有前 `len` 列有效。`len` 之后的槽位保持为零
/// （质量与逆质量均为 0），对整块存储做运算时它们不会改变。
#[derive(Clone, Debug)]
pub struct Particles {
    /// 位置
    position: Matrix3xX<f32>,
    /// 速度
    velocity: Matrix3xX<f32>,
    /// 加速度（由力回调写入）
    acceleration: Matrix3xX<f32>,
    /// 质量
    mass: DVector<f32>,
    /// 逆质量，质量为 0 时为 0
    inverse_mass: DVector<f32>,
    /// 有效粒子数
    len: usize,
}

impl Particles {
    /// 创建空粒子组，预留 `capacity` 个槽位
    pub fn new(capacity: usize) -> Self {
        Self {
            position: Matrix3xX::zeros(capacity),
            velocity: Matrix3xX::zeros(capacity),
            acceleration: Matrix3xX::zeros(capacity),
            mass: DVector::zeros(capacity),
            inverse_mass: DVector::zeros(capacity),
            len: 0,
        }
    }

    /// 创建 `count` 个静止于原点、质量相同的粒子
    pub fn with_uniform_mass(count: usize, mass: f32) -> Self {
        let mut particles = Self::new(count);
        for _ in 0..count {
            particles.push(Vector3::zeros(), Vector3::zeros(), mass);
        }
        particles
    }

    /// 有效粒子数
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否没有有效粒子
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 存储列数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.position.ncols()
    }

    /// 调整存储到 `capacity` 列，不会缩到 `len` 以下
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(self.len);
        self.position.resize_horizontally_mut(capacity, 0.0);
        self.velocity.resize_horizontally_mut(capacity, 0.0);
        self.acceleration.resize_horizontally_mut(capacity, 0.0);
        self.mass.resize_vertically_mut(capacity, 0.0);
        self.inverse_mass.resize_vertically_mut(capacity, 0.0);
    }

    /// 追加粒子，存储满时容量翻倍。返回新粒子索引
    pub fn push(&mut self, position: Vector3<f32>, velocity: Vector3<f32>, mass: f32) -> usize {
        if self.len == self.capacity() {
            self.resize((self.capacity() * 2).max(1));
        }
        let index = self.len;
        self.len += 1;
        self.position.set_column(index, &position);
        self.velocity.set_column(index, &velocity);
        self.acceleration.set_column(index, &Vector3::zeros());
        self.set_mass(index, mass);
        index
    }

    // ========================================
    // 单粒子访问
    // ========================================

    /// 第 `i` 个粒子的位置
    #[inline]
    pub fn position(&self, i: usize) -> Vector3<f32> {
        self.position.column(i).into_owned()
    }

    /// 第 `i` 个粒子的速度
    #[inline]
    pub fn velocity(&self, i: usize) -> Vector3<f32> {
        self.velocity.column(i).into_owned()
    }

    /// 第 `i` 个粒子的加速度
    #[inline]
    pub fn acceleration(&self, i: usize) -> Vector3<f32> {
        self.acceleration.column(i).into_owned()
    }

    /// 质量
    #[inline]
    pub fn mass(&self, i: usize) -> f32 {
        self.mass[i]
    }

    /// 逆质量
    #[inline]
    pub fn inverse_mass(&self, i: usize) -> f32 {
        self.inverse_mass[i]
    }

    #[inline]
    pub fn set_position(&mut self, i: usize, position: Vector3<f32>) {
        self.position.set_column(i, &position);
    }

    #[inline]
    pub fn set_velocity(&mut self, i: usize, velocity: Vector3<f32>) {
        self.velocity.set_column(i, &velocity);
    }

    #[inline]
    pub fn set_acceleration(&mut self, i: usize, acceleration: Vector3<f32>) {
        self.acceleration.set_column(i, &acceleration);
    }

    /// 设置质量；质量为 0 的粒子不受力影响（逆质量为 0）
    pub fn set_mass(&mut self, i: usize, mass: f32) {
        self.mass[i] = mass;
        self.inverse_mass[i] = if mass == 0.0 { 0.0 } else { 1.0 / mass };
    }

    // ========================================
    // 整组访问（包含 `len` 之后的空槽位）
    // ========================================

    /// 全部位置
    #[inline]
    pub fn positions(&self) -> &Matrix3xX<f32> {
        &self.position
    }

    #[inline]
    pub fn positions_mut(&mut self) -> &mut Matrix3xX<f32> {
        &mut self.position
    }

    /// 全部速度
    #[inline]
    pub fn velocities(&self) -> &Matrix3xX<f32> {
        &self.velocity
    }

    #[inline]
    pub fn velocities_mut(&mut self) -> &mut Matrix3xX<f32> {
        &mut self.velocity
    }

    /// 全部加速度
    #[inline]
    pub fn accelerations(&self) -> &Matrix3xX<f32> {
        &self.acceleration
    }

    #[inline]
    pub fn accelerations_mut(&mut self) -> &mut Matrix3xX<f32> {
        &mut self.acceleration
    }

    /// 全部质量
    #[inline]
    pub fn masses(&self) -> &DVector<f32> {
        &self.mass
    }

    #[inline]
    pub fn inverse_masses(&self) -> &DVector<f32> {
        &self.inverse_mass
    }

    // ========================================
    // 批量运算
    // ========================================

    /// 全体粒子 `v += dt · a`
    #[inline]
    pub fn advance_velocity(&mut self, dt: f32) {
        self.velocity += &self.acceleration * dt;
    }

    /// 全体粒子 `x += dt · v`
    #[inline]
    pub fn advance_position(&mut self, dt: f32) {
        self.position += &self.velocity * dt;
    }

    /// 清零加速度（一次受力计算的开头）
    pub fn clear_acceleration(&mut self) {
        self.acceleration.fill(0.0);
    }

    /// 给每个质量非零的有效粒子加上同一加速度（如重力）
    pub fn add_uniform_acceleration(&mut self, acceleration: Vector3<f32>) {
        for i in 0..self.len {
            if self.inverse_mass[i] != 0.0 {
                let mut column = self.acceleration.column_mut(i);
                column += acceleration;
            }
        }
    }

    /// 保存位置/速度快照
    pub fn state(&self) -> ParticleState {
        ParticleState {
            position: self.position.clone(),
            velocity: self.velocity.clone(),
        }
    }

    /// 恢复 [`Particles::state`] 保存的快照
    pub fn restore(&mut self, state: &ParticleState) {
        self.position.copy_from(&state.position);
        self.velocity.copy_from(&state.velocity);
    }

    /// 有效粒子的总动能
    pub fn kinetic_energy(&self) -> f32 {
        (0..self.len)
            .map(|i| 0.5 * self.mass[i] * self.velocity.column(i).norm_squared())
            .sum()
    }

    /// 有效粒子的总动量
    pub fn momentum(&self) -> Vector3<f32> {
        (0..self.len).fold(Vector3::zeros(), |acc, i| {
            acc + self.velocity.column(i) * self.mass[i]
        })
    }
}

impl Default for Particles {
    fn default() -> Self {
        Self::new(0)
    }
}
