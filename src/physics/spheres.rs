//! 刚性球
//!
//! 一组粒子加一个平行的半径数组。质量由半径决定：`mass = density · r³`。

use nalgebra::Vector3;

use super::particles::Particles;

/// 球集合
#[derive(Clone, Debug)]
pub struct Spheres {
    /// 球心粒子
    particles: Particles,
    /// 半径，与粒子一一对应
    radius: Vec<f32>,
    /// 密度
    density: f32,
}

impl Spheres {
    /// 创建空集合
    pub fn new(density: f32) -> Self {
        Self::with_capacity(density, 1)
    }

    /// 创建空集合并预留 `capacity` 个球
    pub fn with_capacity(density: f32, capacity: usize) -> Self {
        Self {
            particles: Particles::new(capacity),
            radius: Vec::with_capacity(capacity),
            density,
        }
    }

    /// 添加一个静止的球，存储满时翻倍。返回索引
    pub fn add_sphere(&mut self, position: Vector3<f32>, radius: f32) -> usize {
        let mass = self.density * radius * radius * radius;
        let index = self.particles.push(position, Vector3::zeros(), mass);
        self.radius.push(radius);
        index
    }

    /// 球数
    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// 第 `i` 个球的半径
    #[inline]
    pub fn radius(&self, i: usize) -> f32 {
        self.radius[i]
    }

    /// 密度
    #[inline]
    pub fn density(&self) -> f32 {
        self.density
    }

    /// 球心粒子
    #[inline]
    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    #[inline]
    pub fn particles_mut(&mut self) -> &mut Particles {
        &mut self.particles
    }
}
