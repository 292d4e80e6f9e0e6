//! 正向运动学
//!
//! 从起始骨骼广度优先遍历。每个骨骼的世界旋转是自身的
//! `rotation_parent_current · R` 依次左乘各祖先的同类项（根在最左），
//! 每个骨骼单独重新计算乘积。

use std::collections::{HashSet, VecDeque};

use glam::Quat;

use super::skeleton::Skeleton;
use crate::animation::Posture;
use crate::{EngineError, Result};

/// 单个骨骼在姿态下的 `rotation_parent_current · R`
#[inline]
fn local_rotation(skeleton: &Skeleton, posture: &Posture, bone: usize) -> Quat {
    skeleton.bones()[bone].rotation_parent_current * posture.rotation(bone)
}

/// `bone` 父坐标系的世界旋转：所有祖先局部项的乘积（根骨骼为单位旋转）
pub(crate) fn parent_frame(skeleton: &Skeleton, posture: &Posture, bone: usize) -> Quat {
    let mut frame = Quat::IDENTITY;
    for ancestor in skeleton.ancestors(bone).skip(1) {
        frame = local_rotation(skeleton, posture, ancestor) * frame;
    }
    frame
}

/// 姿态大小必须等于骨骼数
pub(crate) fn check_posture(skeleton: &Skeleton, posture: &Posture) -> Result<()> {
    if posture.len() != skeleton.len() {
        return Err(EngineError::PostureSizeMismatch {
            expected: skeleton.len(),
            actual: posture.len(),
        });
    }
    Ok(())
}

/// 写入 `root` 及其下所有骨骼的 `start_position`、`end_position` 和 `rotation`。
///
/// 骨架根骨骼取 `start = end = translation[root]`，旋转不变。
/// 其他起始骨骼接在父骨骼当前的 `end_position` 上，可以单独刷新一棵子树。
pub fn forward_kinematics(skeleton: &mut Skeleton, posture: &Posture, root: usize) -> Result<()> {
    skeleton.check_index(root)?;
    check_posture(skeleton, posture)?;

    let mut visited = HashSet::with_capacity(skeleton.len());
    let mut queue = VecDeque::with_capacity(skeleton.len());
    visited.insert(root);
    queue.push_back(root);

    while let Some(index) = queue.pop_front() {
        let parent = skeleton.bones()[index].parent();

        match parent {
            None => {
                let bone = &mut skeleton.bones_mut()[index];
                bone.start_position = posture.translation(index);
                bone.end_position = posture.translation(index);
            }
            Some(parent) => {
                let start = skeleton.bones()[parent].end_position;

                let mut rotation = local_rotation(skeleton, posture, index);
                for ancestor in skeleton.ancestors(parent) {
                    rotation = local_rotation(skeleton, posture, ancestor) * rotation;
                }

                let bone = &mut skeleton.bones_mut()[index];
                let offset = bone.offset() + posture.translation(index);
                bone.start_position = start;
                bone.end_position = rotation * offset + start;
                bone.rotation = rotation;
            }
        }

        for &child in skeleton.bones()[index].children() {
            if visited.insert(child) {
                queue.push_back(child);
            }
        }
    }

    Ok(())
}
