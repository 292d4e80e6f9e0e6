//! 姿态
//!
//! 一帧的骨骼姿态：每个骨骼的旋转、平移以及生成旋转的欧拉角。
//! 构造时按骨骼数分配，之后不再改变大小。

use glam::{Quat, Vec3};

use crate::{EngineError, Result};

/// 欧拉角（弧度）转 `Rz(z) · Ry(y) · Rx(x)`
#[inline]
pub fn rotate_zyx(euler: Vec3) -> Quat {
    Quat::from_rotation_z(euler.z) * Quat::from_rotation_y(euler.y) * Quat::from_rotation_x(euler.x)
}

/// 单帧姿态
#[derive(Clone, Debug, PartialEq)]
pub struct Posture {
    /// 欧拉角（弧度），IK 的积分变量
    euler_angles: Vec<Vec3>,
    /// 旋转
    rotations: Vec<Quat>,
    /// 平移
    translations: Vec<Vec3>,
}

impl Posture {
    /// 单位旋转、零平移
    pub fn new(size: usize) -> Self {
        Self {
            euler_angles: vec![Vec3::ZERO; size],
            rotations: vec![Quat::IDENTITY; size],
            translations: vec![Vec3::ZERO; size],
        }
    }

    /// 由欧拉角（弧度）生成旋转
    pub fn from_euler_angles(euler_angles: Vec<Vec3>, translations: Vec<Vec3>) -> Result<Self> {
        if euler_angles.len() != translations.len() {
            return Err(EngineError::PostureSizeMismatch {
                expected: euler_angles.len(),
                actual: translations.len(),
            });
        }
        let rotations = euler_angles.iter().copied().map(rotate_zyx).collect();
        Ok(Self {
            euler_angles,
            rotations,
            translations,
        })
    }

    /// 骨骼数
    #[inline]
    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }

    /// `bone >= len()` 时返回 `BoneOutOfRange`
    pub fn check_bone(&self, bone: usize) -> Result<()> {
        if bone < self.len() {
            Ok(())
        } else {
            Err(EngineError::BoneOutOfRange {
                index: bone,
                count: self.len(),
            })
        }
    }

    // ========================================
    // 单骨骼访问
    //
    // 直接索引的访问器在 `bone >= len()` 时 panic；FK/IK 会事先校验姿态大小。
    // `try_*` 设置器返回 `BoneOutOfRange`。
    // ========================================

    /// 旋转
    #[inline]
    pub fn rotation(&self, bone: usize) -> Quat {
        self.rotations[bone]
    }

    /// 平移
    #[inline]
    pub fn translation(&self, bone: usize) -> Vec3 {
        self.translations[bone]
    }

    /// 欧拉角
    #[inline]
    pub fn euler(&self, bone: usize) -> Vec3 {
        self.euler_angles[bone]
    }

    /// 直接设置旋转，欧拉角保持不变
    #[inline]
    pub fn set_rotation(&mut self, bone: usize, rotation: Quat) {
        self.rotations[bone] = rotation;
    }

    /// 设置平移
    #[inline]
    pub fn set_translation(&mut self, bone: usize, translation: Vec3) {
        self.translations[bone] = translation;
    }

    /// 设置欧拉角并重建旋转
    #[inline]
    pub fn set_euler(&mut self, bone: usize, euler: Vec3) {
        self.euler_angles[bone] = euler;
        self.rotations[bone] = rotate_zyx(euler);
    }

    /// 带越界检查的 [`set_euler`](Self::set_euler)
    pub fn try_set_euler(&mut self, bone: usize, euler: Vec3) -> Result<()> {
        self.check_bone(bone)?;
        self.set_euler(bone, euler);
        Ok(())
    }

    /// 带越界检查的 [`set_translation`](Self::set_translation)
    pub fn try_set_translation(&mut self, bone: usize, translation: Vec3) -> Result<()> {
        self.check_bone(bone)?;
        self.set_translation(bone, translation);
        Ok(())
    }

    // ========================================
    // 整体访问
    // ========================================

    /// 全部旋转
    #[inline]
    pub fn rotations(&self) -> &[Quat] {
        &self.rotations
    }

    #[inline]
    pub fn translations(&self) -> &[Vec3] {
        &self.translations
    }

    #[inline]
    pub fn euler_angles(&self) -> &[Vec3] {
        &self.euler_angles
    }

    #[inline]
    pub fn translations_mut(&mut self) -> &mut [Vec3] {
        &mut self.translations
    }

    /// 混合两个姿态：平移和欧拉角线性插值，旋转球面插值
    pub fn interpolate(from: &Posture, to: &Posture, ratio: f32) -> Result<Posture> {
        if from.len() != to.len() {
            return Err(EngineError::PostureSizeMismatch {
                expected: from.len(),
                actual: to.len(),
            });
        }
        let lerp = |a: &[Vec3], b: &[Vec3]| -> Vec<Vec3> {
            a.iter().zip(b).map(|(a, b)| a.lerp(*b, ratio)).collect()
        };
        Ok(Posture {
            euler_angles: lerp(&from.euler_angles, &to.euler_angles),
            rotations: from
                .rotations
                .iter()
                .zip(&to.rotations)
                .map(|(a, b)| a.slerp(*b, ratio))
                .collect(),
            translations: lerp(&from.translations, &to.translations),
        })
    }
}
