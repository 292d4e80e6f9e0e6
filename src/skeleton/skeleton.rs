//! 骨架
//!
//! 骨骼存放在一个 `Vec` 中，索引即位置。层级关系用索引表示
//! （父 `Option<usize>`，子 `Vec<usize>`），根骨骼固定为索引 0。

use glam::{Quat, Vec3};

use super::bone::{Bone, DofFlags, RotationLimits};
use crate::animation::rotate_zyx;
use crate::{EngineError, Result};

/// 根骨骼索引
pub const ROOT: usize = 0;

/// 骨骼长度默认缩放（动作加载器也用它缩放根平移）
pub const DEFAULT_SCALE: f32 = 0.2;

// ============================================================================
// 骨架
// ============================================================================

/// 已校验的骨骼树
#[derive(Clone, Debug)]
pub struct Skeleton {
    /// 骨骼，索引即位置
    bones: Vec<Bone>,
    /// 长度缩放
    scale: f32,
    /// 可动骨骼数
    movable_bones: usize,
}

impl Skeleton {
    /// 骨骼数
    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    /// 是否没有骨骼
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// 长度缩放
    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// 根骨骼加上所有至少有一个自由度的骨骼
    #[inline]
    pub fn movable_bone_count(&self) -> usize {
        self.movable_bones
    }

    /// 根骨骼
    #[inline]
    pub fn root(&self) -> &Bone {
        &self.bones[ROOT]
    }

    /// 全部骨骼
    #[inline]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// 可变视图；切片无法改变骨骼数
    #[inline]
    pub fn bones_mut(&mut self) -> &mut [Bone] {
        &mut self.bones
    }

    /// 按索引取骨骼
    pub fn bone(&self, index: usize) -> Result<&Bone> {
        self.check_index(index)?;
        Ok(&self.bones[index])
    }

    /// 按索引取可变骨骼
    pub fn bone_mut(&mut self, index: usize) -> Result<&mut Bone> {
        self.check_index(index)?;
        Ok(&mut self.bones[index])
    }

    /// 按名称查找骨骼
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// 按名称查找骨骼索引
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.bone_by_name(name).map(Bone::index)
    }

    /// 索引越界时返回 `BoneOutOfRange`
    #[inline]
    pub fn check_index(&self, index: usize) -> Result<()> {
        if index < self.bones.len() {
            Ok(())
        } else {
            Err(EngineError::BoneOutOfRange {
                index,
                count: self.bones.len(),
            })
        }
    }

    // ========================================
    // 层级查询
    // ========================================

    /// 从 `bone` 开始依次向上直到根骨骼
    pub fn ancestors(&self, bone: usize) -> Ancestors<'_> {
        Ancestors {
            bones: &self.bones,
            next: Some(bone),
            remaining: self.bones.len(),
        }
    }

    /// `ancestor` 是 `bone` 本身或位于其父链上
    pub fn is_ancestor_or_self(&self, ancestor: usize, bone: usize) -> bool {
        self.ancestors(bone).any(|b| b == ancestor)
    }

    /// 两条父链共有的最深骨骼
    pub fn common_ancestor(&self, a: usize, b: usize) -> Result<usize> {
        self.check_index(a)?;
        self.check_index(b)?;
        let chain_a: Vec<usize> = self.ancestors(a).collect();
        self.ancestors(b)
            .find(|bone| chain_a.contains(bone))
            .ok_or(EngineError::BrokenChain { from: b, to: a })
    }

    /// 清除所有骨骼的正向运动学结果
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.reset_pose();
        }
    }
}

/// 沿父链向上遍历，步数不超过骨骼数
pub struct Ancestors<'a> {
    bones: &'a [Bone],
    next: Option<usize>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.next?;
        let bone = self.bones.get(current)?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.next = bone.parent;
        Some(current)
    }
}

// ============================================================================
// 构建器
// ============================================================================

/// 骨骼描述（骨架加载器的输出）
#[derive(Clone, Debug)]
pub struct BoneDesc {
    /// 骨骼名称
    pub name: String,
    /// 指向子骨骼的方向（角色全局坐标系）
    pub direction: Vec3,
    /// 未缩放的长度
    pub length: f32,
    /// 局部轴，欧拉角（度，`Rz·Ry·Rx`）
    pub axis_degrees: Vec3,
    /// 自由度
    pub dof: DofFlags,
    /// 角度限制（弧度）
    pub limits: RotationLimits,
}

impl BoneDesc {
    /// 创建无自由度、轴为零的描述
    pub fn new(name: impl Into<String>, direction: Vec3, length: f32) -> Self {
        Self {
            name: name.into(),
            direction,
            length,
            axis_degrees: Vec3::ZERO,
            dof: DofFlags::empty(),
            limits: RotationLimits::default(),
        }
    }

    /// 设置局部轴（度）
    pub fn with_axis(mut self, axis_degrees: Vec3) -> Self {
        self.axis_degrees = axis_degrees;
        self
    }

    /// 设置自由度
    pub fn with_dof(mut self, dof: DofFlags) -> Self {
        self.dof = dof;
        self
    }

    /// 设置角度限制
    pub fn with_limits(mut self, limits: RotationLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// 构建并校验 [`Skeleton`]
///
/// 索引 0 为根骨骼，由构建器创建并带全部六个自由度。
/// 用 [`add_bone`](Self::add_bone) 添加骨骼，用 [`connect`](Self::connect)
/// 连接；子骨骼保持连接顺序。
#[derive(Clone, Debug)]
pub struct SkeletonBuilder {
    /// 骨骼描述，索引即骨骼索引
    descs: Vec<BoneDesc>,
    /// 父子连接
    links: Vec<(usize, usize)>,
    /// 长度缩放
    scale: f32,
}

impl Default for SkeletonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SkeletonBuilder {
    /// 创建只含根骨骼的构建器
    pub fn new() -> Self {
        let root = BoneDesc::new("root", Vec3::ZERO, 0.0)
            .with_dof(DofFlags::ROTATION | DofFlags::TRANSLATION);
        Self {
            descs: vec![root],
            links: Vec::new(),
            scale: DEFAULT_SCALE,
        }
    }

    /// 设置长度缩放，默认 [`DEFAULT_SCALE`]
    pub fn scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// 根骨骼局部轴（欧拉角，度）
    pub fn root_axis(mut self, axis_degrees: Vec3) -> Self {
        self.descs[ROOT].axis_degrees = axis_degrees;
        self
    }

    /// 添加骨骼，返回索引
    pub fn add_bone(&mut self, desc: BoneDesc) -> usize {
        self.descs.push(desc);
        self.descs.len() - 1
    }

    /// 连接父子骨骼
    pub fn connect(&mut self, parent: usize, child: usize) -> &mut Self {
        self.links.push((parent, child));
        self
    }

    /// 校验层级并生成骨架
    ///
    /// 方向转换到各骨骼局部坐标系，计算父到子旋转，长度乘以缩放。
    pub fn build(&self) -> Result<Skeleton> {
        let count = self.descs.len();
        let mut bones: Vec<Bone> = self
            .descs
            .iter()
            .enumerate()
            .map(|(index, desc)| {
                let mut bone = Bone::new(desc.name.clone());
                bone.index = index;
                bone.direction = desc.direction;
                bone.length = desc.length * self.scale;
                bone.axis = rotate_zyx(desc.axis_degrees * (std::f32::consts::PI / 180.0));
                bone.dof = desc.dof;
                bone.limits = desc.limits;
                bone
            })
            .collect();

        // 层级
        for &(parent, child) in &self.links {
            for index in [parent, child] {
                if index >= count {
                    return Err(EngineError::BoneOutOfRange { index, count });
                }
            }
            if child == ROOT {
                return Err(EngineError::InvalidSkeleton(format!(
                    "root cannot be a child of '{}'",
                    bones[parent].name
                )));
            }
            if parent == child {
                return Err(EngineError::InvalidSkeleton(format!(
                    "bone '{}' linked to itself",
                    bones[child].name
                )));
            }
            if let Some(existing) = bones[child].parent {
                return Err(EngineError::InvalidSkeleton(format!(
                    "bone '{}' has two parents ('{}' and '{}')",
                    bones[child].name, bones[existing].name, bones[parent].name
                )));
            }
            bones[child].parent = Some(parent);
            bones[parent].children.push(child);
        }

        // 每个骨骼都必须能到达根骨骼
        for bone in &bones[1..] {
            let mut cursor = bone.parent;
            let mut steps = 0;
            loop {
                match cursor {
                    Some(ROOT) => break,
                    Some(_) if steps >= count => {
                        return Err(EngineError::InvalidSkeleton(format!(
                            "cycle through bone '{}'",
                            bone.name
                        )));
                    }
                    Some(index) => {
                        cursor = bones[index].parent;
                        steps += 1;
                    }
                    None => {
                        return Err(EngineError::InvalidSkeleton(format!(
                            "bone '{}' is not connected to the root",
                            bone.name
                        )));
                    }
                }
            }
        }

        // 方向转换到骨骼局部坐标系
        for bone in &mut bones[1..] {
            bone.direction = bone.axis.inverse() * bone.direction;
        }

        // 父到子的坐标系偏移
        bones[ROOT].rotation_parent_current = bones[ROOT].axis;
        for index in 1..count {
            if let Some(parent) = bones[index].parent {
                let parent_axis: Quat = bones[parent].axis;
                bones[index].rotation_parent_current = parent_axis.inverse() * bones[index].axis;
            }
        }

        let movable_bones = 1 + bones[1..].iter().filter(|b| !b.dof.is_empty()).count();

        log::info!(
            "[Skeleton] built: {} bones, {} movable, scale={}",
            count,
            movable_bones,
            self.scale
        );

        Ok(Skeleton {
            bones,
            scale: self.scale,
            movable_bones,
        })
    }
}
