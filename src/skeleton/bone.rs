//! 骨骼节点
//!
//! 静态拓扑（父子关系、局部方向、轴、父到子旋转偏移、自由度、角度限制）
//! 加上正向运动学写入的世界空间结果。

use bitflags::bitflags;
use glam::{Quat, Vec3};

// ============================================================================
// 自由度
// ============================================================================

bitflags! {
    /// 骨骼自由度掩码（局部轴）
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DofFlags: u8 {
        /// 绕 X 轴旋转
        const ROTATE_X = 1 << 0;
        /// 绕 Y 轴旋转
        const ROTATE_Y = 1 << 1;
        /// 绕 Z 轴旋转
        const ROTATE_Z = 1 << 2;
        /// 沿 X 轴平移
        const TRANSLATE_X = 1 << 3;
        /// 沿 Y 轴平移
        const TRANSLATE_Y = 1 << 4;
        /// 沿 Z 轴平移
        const TRANSLATE_Z = 1 << 5;

        /// 全部旋转轴
        const ROTATION = Self::ROTATE_X.bits() | Self::ROTATE_Y.bits() | Self::ROTATE_Z.bits();
        /// 全部平移轴
        const TRANSLATION = Self::TRANSLATE_X.bits() | Self::TRANSLATE_Y.bits() | Self::TRANSLATE_Z.bits();
    }
}

impl DofFlags {
    /// 按 x、y、z 顺序排列的旋转标志
    pub const ROTATION_AXES: [DofFlags; 3] =
        [DofFlags::ROTATE_X, DofFlags::ROTATE_Y, DofFlags::ROTATE_Z];

    /// 独立轴数量（旋转加平移）
    #[inline]
    pub fn count(self) -> u32 {
        self.bits().count_ones()
    }
}

// ============================================================================
// 角度限制
// ============================================================================

/// 各轴欧拉角范围（弧度）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotationLimits {
    /// 下限
    pub min: Vec3,
    /// 上限
    pub max: Vec3,
}

impl Default for RotationLimits {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        }
    }
}

impl RotationLimits {
    /// 创建角度限制
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// 只限制 `dof` 中包含的轴，其余轴原样返回
    pub fn clamp(&self, euler: Vec3, dof: DofFlags) -> Vec3 {
        let mut out = euler;
        for (axis, flag) in DofFlags::ROTATION_AXES.iter().enumerate() {
            if dof.contains(*flag) {
                out[axis] = euler[axis].clamp(self.min[axis], self.max[axis]);
            }
        }
        out
    }
}

// ============================================================================
// 骨骼
// ============================================================================

/// 骨骼树中的一节
///
/// `index` 同时是骨骼在 [`Skeleton::bones`](super::Skeleton::bones) 中的位置；
/// 根骨骼位于 0，没有父骨骼。
#[derive(Clone, Debug)]
pub struct Bone {
    // ========================================
    // 静态数据
    // ========================================
    /// 骨骼名称
    pub name: String,

    /// 骨骼索引
    pub(crate) index: usize,

    /// 父骨骼索引
    pub(crate) parent: Option<usize>,

    /// 子骨骼，按添加顺序
    pub(crate) children: Vec<usize>,

    /// 从骨骼起点指向终点的单位方向（局部坐标系）
    pub direction: Vec3,

    /// 骨骼长度（已乘骨架缩放）
    pub length: f32,

    /// 局部坐标系相对角色全局坐标系的朝向
    pub axis: Quat,

    /// 从父骨骼局部坐标系到本骨骼局部坐标系的旋转
    pub rotation_parent_current: Quat,

    /// 自由度
    pub dof: DofFlags,

    /// 角度限制（IK 可选启用）
    pub limits: RotationLimits,

    // ========================================
    // 正向运动学结果
    // ========================================
    /// 世界空间起点
    pub start_position: Vec3,

    /// 世界空间终点
    pub end_position: Vec3,

    /// 世界空间朝向
    pub rotation: Quat,
}

impl Bone {
    /// 创建未连接的骨骼
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: 0,
            parent: None,
            children: Vec::new(),
            direction: Vec3::ZERO,
            length: 0.0,
            axis: Quat::IDENTITY,
            rotation_parent_current: Quat::IDENTITY,
            dof: DofFlags::empty(),
            limits: RotationLimits::default(),
            start_position: Vec3::ZERO,
            end_position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    // ========================================
    // 访问器
    // ========================================

    /// 骨骼索引
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// 父骨骼索引，根骨骼为 `None`
    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// 子骨骼索引
    #[inline]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// 是否为根骨骼
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// 是否没有子骨骼
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// 局部坐标系下的骨骼向量
    #[inline]
    pub fn offset(&self) -> Vec3 {
        self.direction * self.length
    }

    /// 是否具有某个自由度
    #[inline]
    pub fn has_dof(&self, flag: DofFlags) -> bool {
        self.dof.contains(flag)
    }

    /// 是否可旋转
    #[inline]
    pub fn is_rotatable(&self) -> bool {
        self.dof.intersects(DofFlags::ROTATION)
    }

    /// 是否可平移
    #[inline]
    pub fn is_movable(&self) -> bool {
        self.dof.intersects(DofFlags::TRANSLATION)
    }

    /// 清除正向运动学结果
    pub fn reset_pose(&mut self) {
        self.start_position = Vec3::ZERO;
        self.end_position = Vec3::ZERO;
        self.rotation = Quat::IDENTITY;
    }
}

impl Default for Bone {
    fn default() -> Self {
        Self::new(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dof_flags() {
        let dof = DofFlags::ROTATE_X | DofFlags::ROTATE_Z | DofFlags::TRANSLATE_Y;
        assert_eq!(dof.count(), 3);
        assert!(dof.intersects(DofFlags::ROTATION));
        assert!(!dof.contains(DofFlags::ROTATION));
        assert_eq!((DofFlags::ROTATION | DofFlags::TRANSLATION).count(), 6);
    }

    #[test]
    fn test_limits_clamp_only_dof_axes() {
        let limits = RotationLimits::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let clamped = limits.clamp(Vec3::new(2.0, -3.0, 0.5), DofFlags::ROTATE_X);
        assert_eq!(clamped, Vec3::new(1.0, -3.0, 0.5));
    }

    #[test]
    fn test_bone_accessors() {
        let mut bone = Bone::new("humerus");
        bone.direction = Vec3::X;
        bone.length = 0.5;
        bone.dof = DofFlags::ROTATE_Y;
        assert!(bone.is_root());
        assert!(bone.is_leaf());
        assert!(bone.is_rotatable());
        assert!(!bone.is_movable());
        assert_eq!(bone.offset(), Vec3::new(0.5, 0.0, 0.0));
    }
}
