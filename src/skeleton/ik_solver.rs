//! 雅可比 IK 求解器
//!
//! 对骨骼链的旋转自由度做不动点迭代：
//!
//! 1. 从骨架根骨骼做正向运动学；
//! 2. 末端与目标距离小于 `epsilon` 时停止；
//! 3. 构建 3×3n 雅可比矩阵，每个（骨骼, 局部轴）一列；
//! 4. `dθ = Jᵀ(JJᵀ + λ²I)⁻¹ · (target − end)`（阻尼最小二乘；`λ = 0` 时为
//!    普通伪逆 `J⁺`），把 `step · dθ` 累加到欧拉角，再按 `Rz·Ry·Rx` 重建旋转。
//!
//! 阻尼让 `dθ` 在奇异姿态附近保持有界，例如完全伸直的骨骼链，
//! 目标够不到时骨骼链正会被拉到这里。
//!
//! 迭代次数用完不算错误：姿态保留最后一次更新，由报告说明未收敛。

use glam::{Quat, Vec3};
use nalgebra::{DMatrix, DVector};

use super::kinematics::{check_posture, forward_kinematics, parent_frame};
use super::skeleton::{Skeleton, ROOT};
use crate::animation::Posture;
use crate::skeleton::DofFlags;
use crate::{EngineError, Result};

// ============================================================================
// 配置
// ============================================================================

/// IK 求解配置
#[derive(Clone, Debug, PartialEq)]
pub struct IkSolverConfig {
    /// 最大迭代次数，默认 10000
    pub max_iterations: u32,
    /// 收敛距离，默认 1e-3
    pub epsilon: f32,
    /// 每次迭代应用的 `dθ` 比例，默认 1e-3
    pub step: f32,
    /// 最小二乘阻尼系数 λ，默认 0.1
    /// 为 0 时改用无阻尼伪逆
    pub damping: f32,
    /// 无阻尼伪逆中不大于此值的奇异值视为 0，默认 1e-6
    pub pseudo_inverse_epsilon: f32,
    /// 每次更新后把欧拉角限制在骨骼角度范围内，默认 false
    pub enforce_limits: bool,
}

impl Default for IkSolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            epsilon: 1e-3,
            step: 1e-3,
            damping: 0.1,
            pseudo_inverse_epsilon: 1e-6,
            enforce_limits: false,
        }
    }
}

// ============================================================================
// IK 链
// ============================================================================

/// 一次求解所移动的有序骨骼，末端骨骼在前
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IkChain {
    /// 链上骨骼
    bones: Vec<usize>,
    /// 末端骨骼
    end: usize,
}

impl IkChain {
    /// 收集 `start` 与 `end` 之间的骨骼。
    ///
    /// `start` 是 `end` 本身或其祖先时，链为 `end` 向上直到 `start`。
    /// 否则从 `end` 走到根骨骼，再接上 `start` 向上直到根（不含根）；
    /// 只有两者在根骨骼相交时才接受这条路径，在更深处相交返回
    /// [`EngineError::DivergentChain`]。
    pub fn build(skeleton: &Skeleton, start: usize, end: usize) -> Result<Self> {
        skeleton.check_index(start)?;
        skeleton.check_index(end)?;

        let stop = skeleton.bones()[start].parent();
        let mut bones = Vec::new();
        let mut cursor = Some(end);
        while cursor != stop {
            let Some(index) = cursor else {
                break;
            };
            if bones.len() >= skeleton.len() {
                return Err(EngineError::BrokenChain { from: end, to: start });
            }
            bones.push(index);
            cursor = skeleton.bones()[index].parent();
        }

        if bones.contains(&start) {
            return Ok(Self { bones, end });
        }

        let common_ancestor = skeleton.common_ancestor(start, end)?;
        if common_ancestor != ROOT {
            return Err(EngineError::DivergentChain {
                start,
                end,
                common_ancestor,
            });
        }

        // 从 `end` 出发的遍历可能停在 `start` 的父骨骼，没到根
        bones.clear();
        bones.extend(skeleton.ancestors(end));
        bones.extend(skeleton.ancestors(start).take_while(|&b| b != ROOT));
        Ok(Self { bones, end })
    }

    /// 链上骨骼，末端在前
    #[inline]
    pub fn bones(&self) -> &[usize] {
        &self.bones
    }

    /// 末端骨骼
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// 骨骼数
    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }
}

// ============================================================================
// 线性代数
// ============================================================================

/// 用 Moore–Penrose 伪逆（SVD）求使 `‖J·x − rhs‖` 最小的最小范数 `x`
pub fn least_squares(jacobian: &DMatrix<f32>, rhs: Vec3, epsilon: f32) -> Result<DVector<f32>> {
    let inverse = jacobian
        .clone()
        .pseudo_inverse(epsilon)
        .map_err(EngineError::Solver)?;
    Ok(inverse * DVector::from_column_slice(&[rhs.x, rhs.y, rhs.z]))
}

/// 阻尼最小二乘 `Jᵀ(JJᵀ + λ²I)⁻¹ · rhs`
///
/// 每个奇异方向按 `σ / (σ² + λ²)` 缩放而不是 `1 / σ`，
/// 步长不会超过 `‖rhs‖ / 2λ`。
pub fn damped_least_squares(jacobian: &DMatrix<f32>, rhs: Vec3, damping: f32) -> Result<DVector<f32>> {
    let rhs = DVector::from_column_slice(&[rhs.x, rhs.y, rhs.z]);
    let transpose = jacobian.transpose();
    let normal = jacobian * &transpose + DMatrix::<f32>::identity(3, 3) * (damping * damping);
    let cholesky = normal
        .cholesky()
        .ok_or(EngineError::Solver("damped normal matrix is not positive definite"))?;
    Ok(transpose * cholesky.solve(&rhs))
}

/// `bone` 的欧拉自由度在 `posture` 下的世界空间旋转轴
///
/// 设 `W = F·Rz·Ry·Rx`（F 为关节坐标系），θx 的增量绕 `F·Rz·Ry·x̂` 旋转，
/// θy 绕 `F·Rz·ŷ`，θz 绕 `F·ẑ`。
fn joint_axes(skeleton: &Skeleton, posture: &Posture, bone: usize) -> [Vec3; 3] {
    let frame = parent_frame(skeleton, posture, bone) * skeleton.bones()[bone].rotation_parent_current;
    let euler = posture.euler(bone);
    let rz = Quat::from_rotation_z(euler.z);
    let ry = Quat::from_rotation_y(euler.y);
    [frame * rz * ry * Vec3::X, frame * rz * Vec3::Y, frame * Vec3::Z]
}

/// 链末端位置的 3×3n 雅可比矩阵；没有自由度的轴对应列保持为 0
pub fn jacobian(skeleton: &Skeleton, posture: &Posture, chain: &IkChain) -> DMatrix<f32> {
    let effector = skeleton.bones()[chain.end].end_position;
    let mut jacobian = DMatrix::zeros(3, 3 * chain.len());

    for (j, &index) in chain.bones.iter().enumerate() {
        let bone = &skeleton.bones()[index];
        let lever = effector - bone.start_position;
        let axes = joint_axes(skeleton, posture, index);

        for (k, flag) in DofFlags::ROTATION_AXES.iter().enumerate() {
            if bone.has_dof(*flag) {
                let column = axes[k].cross(lever);
                jacobian.set_column(3 * j + k, &nalgebra::Vector3::new(column.x, column.y, column.z));
            }
        }
    }
    jacobian
}

// ============================================================================
// 求解器
// ============================================================================

/// 一次求解的结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkReport {
    /// 已应用的更新次数
    pub iterations: u32,
    /// 最终末端到目标的距离
    pub residual: f32,
    /// 是否在迭代上限内收敛
    pub converged: bool,
}

/// IK 求解器
#[derive(Clone, Debug, Default)]
pub struct IkSolver {
    /// 求解配置
    pub config: IkSolverConfig,
}

impl IkSolver {
    /// 创建 IK 求解器
    pub fn new(config: IkSolverConfig) -> Self {
        Self { config }
    }

    /// 修改 `posture` 中链 `start..end` 的欧拉角（及旋转），
    /// 把 `end` 的终点移向 `target`。
    ///
    /// 返回时骨骼的世界空间字段与姿态一致。
    pub fn solve(
        &self,
        skeleton: &mut Skeleton,
        target: Vec3,
        start: usize,
        end: usize,
        posture: &mut Posture,
    ) -> Result<IkReport> {
        check_posture(skeleton, posture)?;
        let chain = IkChain::build(skeleton, start, end)?;
        let config = &self.config;

        let mut iterations = 0;
        let mut converged = false;
        while iterations < config.max_iterations {
            forward_kinematics(skeleton, posture, ROOT)?;
            let residual = target - skeleton.bones()[end].end_position;
            if residual.length() < config.epsilon {
                converged = true;
                break;
            }

            let jacobian = jacobian(skeleton, posture, &chain);
            let delta = if config.damping > 0.0 {
                damped_least_squares(&jacobian, residual, config.damping)?
            } else {
                least_squares(&jacobian, residual, config.pseudo_inverse_epsilon)?
            };

            for (j, &index) in chain.bones.iter().enumerate() {
                let bone = &skeleton.bones()[index];
                let mut euler = posture.euler(index);
                for (k, flag) in DofFlags::ROTATION_AXES.iter().enumerate() {
                    if bone.has_dof(*flag) {
                        euler[k] += config.step * delta[3 * j + k];
                    }
                }
                if config.enforce_limits {
                    euler = bone.limits.clamp(euler, bone.dof);
                }
                posture.set_euler(index, euler);
            }
            iterations += 1;
        }

        if !converged {
            forward_kinematics(skeleton, posture, ROOT)?;
        }
        let residual = (target - skeleton.bones()[end].end_position).length();

        log::debug!(
            "[IK] chain {:?}: {} iterations, residual {:.6}, converged={}",
            chain.bones,
            iterations,
            residual,
            converged
        );

        Ok(IkReport {
            iterations,
            residual,
            converged,
        })
    }
}

/// 使用默认配置求解
pub fn inverse_kinematics(
    skeleton: &mut Skeleton,
    target: Vec3,
    start: usize,
    end: usize,
    posture: &mut Posture,
) -> Result<IkReport> {
    IkSolver::default().solve(skeleton, target, start, end, posture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::rotate_zyx;
    use crate::skeleton::{BoneDesc, RotationLimits, SkeletonBuilder};
    use approx::assert_relative_eq;

    /// root ─ upper ─ lower，均为沿 +x 的单位长度，绕 z 旋转
    fn planar_arm(lower_dof: DofFlags) -> Skeleton {
        let mut builder = SkeletonBuilder::new().scale(1.0);
        let upper = builder.add_bone(BoneDesc::new("upper", Vec3::X, 1.0).with_dof(DofFlags::ROTATE_Z));
        let lower = builder.add_bone(BoneDesc::new("lower", Vec3::X, 1.0).with_dof(lower_dof));
        builder.connect(ROOT, upper).connect(upper, lower);
        builder.build().unwrap()
    }

    /// root ─ a ─ b
    ///        └── c
    /// root ─ d
    fn branching() -> Skeleton {
        let mut builder = SkeletonBuilder::new().scale(1.0);
        let a = builder.add_bone(BoneDesc::new("a", Vec3::Y, 1.0).with_dof(DofFlags::ROTATION));
        let b = builder.add_bone(BoneDesc::new("b", Vec3::X, 1.0).with_dof(DofFlags::ROTATION));
        let c = builder.add_bone(BoneDesc::new("c", -Vec3::X, 1.0).with_dof(DofFlags::ROTATION));
        let d = builder.add_bone(BoneDesc::new("d", -Vec3::Y, 1.0).with_dof(DofFlags::ROTATION));
        builder.connect(ROOT, a).connect(a, b).connect(a, c).connect(ROOT, d);
        builder.build().unwrap()
    }

    #[test]
    fn test_chain_along_ancestry() {
        let skeleton = branching();
        assert_eq!(IkChain::build(&skeleton, 1, 2).unwrap().bones(), &[2, 1]);
        assert_eq!(IkChain::build(&skeleton, 2, 2).unwrap().bones(), &[2]);
        assert_eq!(IkChain::build(&skeleton, ROOT, 3).unwrap().bones(), &[3, 1, 0]);
    }

    #[test]
    fn test_chain_routes_through_root() {
        let skeleton = branching();
        let chain = IkChain::build(&skeleton, 4, 2).unwrap();
        assert_eq!(chain.bones(), &[2, 1, 0, 4]);
        assert_eq!(chain.end(), 2);
    }

    #[test]
    fn test_divergent_chain_fails_fast() {
        let skeleton = branching();
        assert!(matches!(
            IkChain::build(&skeleton, 3, 2),
            Err(EngineError::DivergentChain {
                start: 3,
                end: 2,
                common_ancestor: 1
            })
        ));
        assert!(matches!(
            IkChain::build(&skeleton, 9, 2),
            Err(EngineError::BoneOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn test_jacobian_columns() {
        let mut skeleton = planar_arm(DofFlags::empty());
        let posture = Posture::new(skeleton.len());
        forward_kinematics(&mut skeleton, &posture, ROOT).unwrap();

        let chain = IkChain::build(&skeleton, 1, 2).unwrap();
        let j = jacobian(&skeleton, &posture, &chain);
        assert_eq!(j.shape(), (3, 6));

        // 链为 [lower, upper]；upper 绕 z：ẑ × (2, 0, 0)
        assert_eq!(j[(1, 5)], 2.0);
        // lower 全部列与 upper 的 x/y 列都被屏蔽
        for column in [0, 1, 2, 3, 4] {
            assert!(j.column(column).iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn test_least_squares_minimum_norm() {
        let mut j = DMatrix::zeros(3, 2);
        j[(1, 0)] = 2.0;
        j[(1, 1)] = 1.0;
        let x = least_squares(&j, Vec3::new(0.0, 1.0, 0.0), 1e-6).unwrap();
        assert_relative_eq!(x[0], 0.4, epsilon = 1e-5);
        assert_relative_eq!(x[1], 0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_damped_least_squares_bounded() {
        let mut j = DMatrix::zeros(3, 2);
        j[(1, 0)] = 2.0;
        j[(1, 1)] = 1.0;
        // JJᵀ = diag(0, 5, 0)；零行由 λ² 补足
        let x = damped_least_squares(&j, Vec3::new(0.0, 1.0, 0.0), 0.1).unwrap();
        assert_relative_eq!(x[0], 2.0 / 5.01, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0 / 5.01, epsilon = 1e-6);

        // 接近奇异：无阻尼步长爆炸，有阻尼则不会
        let mut j = DMatrix::zeros(3, 1);
        j[(0, 0)] = 1e-4;
        let rhs = Vec3::new(1.0, 0.0, 0.0);
        let plain = least_squares(&j, rhs, 1e-6).unwrap();
        let damped = damped_least_squares(&j, rhs, 0.1).unwrap();
        assert!(plain[0] > 9_000.0);
        assert!(damped[0].abs() <= 1.0 / 0.2 + 1e-4);
    }

    #[test]
    fn test_planar_arm_reaches_target() {
        let mut skeleton = planar_arm(DofFlags::ROTATE_Z);
        let mut posture = Posture::new(skeleton.len());
        posture.set_euler(2, Vec3::new(0.0, 0.0, 0.6));

        let solver = IkSolver::new(IkSolverConfig {
            step: 0.01,
            ..IkSolverConfig::default()
        });
        let target = Vec3::new(1.0, 1.0, 0.0);
        let report = solver.solve(&mut skeleton, target, 1, 2, &mut posture).unwrap();

        assert!(report.converged);
        assert!(report.residual < 1e-3);
        assert!(report.iterations < solver.config.max_iterations);
        assert!((skeleton.bones()[2].end_position - target).length() < 1e-3);

        // 只有 z 改变，旋转与欧拉角一致
        let euler = posture.euler(1);
        assert_eq!((euler.x, euler.y), (0.0, 0.0));
        assert!(posture.rotation(1).abs_diff_eq(rotate_zyx(euler), 1e-6));
        assert_eq!(posture.euler(ROOT), Vec3::ZERO);
    }

    #[test]
    fn test_unreachable_target_points_chain_at_it() {
        // 刚性两节手臂：只有 upper 关节转动
        let mut skeleton = planar_arm(DofFlags::empty());
        let mut posture = Posture::new(skeleton.len());
        let solver = IkSolver::default();
        let target = Vec3::new(0.0, 5.0, 0.0);

        let report = solver.solve(&mut skeleton, target, 1, 2, &mut posture).unwrap();

        assert!(!report.converged);
        assert_eq!(report.iterations, solver.config.max_iterations);
        assert!(report.residual.is_finite());
        assert!(report.residual >= 3.0 - 1e-4);

        let end = skeleton.bones()[2].end_position;
        assert!(end.is_finite());
        assert!(end.y > 1.99);
        assert!(end.x.abs() < 0.05);
    }

    #[test]
    fn test_unreachable_target_extends_bent_arm() {
        // 两个关节都能转动；lower 初始弯曲
        let mut skeleton = planar_arm(DofFlags::ROTATE_Z);
        let mut posture = Posture::new(skeleton.len());
        posture.set_euler(2, Vec3::new(0.0, 0.0, 0.6));
        let target = Vec3::new(0.0, 5.0, 0.0);

        let report = inverse_kinematics(&mut skeleton, target, 1, 2, &mut posture).unwrap();

        assert!(!report.converged);
        assert_relative_eq!(report.residual, 3.0, epsilon = 1e-3);
        let end = skeleton.bones()[2].end_position;
        assert!(end.is_finite());
        assert!((end - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-2, "{:?}", end);
        // 伸直，而不是缠绕折叠
        assert_relative_eq!(posture.euler(1).z, std::f32::consts::FRAC_PI_2, epsilon = 1e-2);
        assert!(posture.euler(2).z.abs() < 1e-2, "{:?}", posture.euler(2));
    }

    #[test]
    fn test_already_at_target() {
        let mut skeleton = planar_arm(DofFlags::ROTATE_Z);
        let mut posture = Posture::new(skeleton.len());
        let report = inverse_kinematics(&mut skeleton, Vec3::new(2.0, 0.0, 0.0), 1, 2, &mut posture).unwrap();
        assert!(report.converged);
        assert_eq!(report.iterations, 0);
        assert_eq!(posture.euler(1), Vec3::ZERO);
    }

    #[test]
    fn test_limits_hold_when_enforced() {
        let mut builder = SkeletonBuilder::new().scale(1.0);
        let upper = builder.add_bone(
            BoneDesc::new("upper", Vec3::X, 1.0)
                .with_dof(DofFlags::ROTATE_Z)
                .with_limits(RotationLimits::new(Vec3::splat(-0.2), Vec3::splat(0.2))),
        );
        builder.connect(ROOT, upper);
        let mut skeleton = builder.build().unwrap();
        let mut posture = Posture::new(skeleton.len());

        let solver = IkSolver::new(IkSolverConfig {
            step: 0.05,
            max_iterations: 500,
            enforce_limits: true,
            ..IkSolverConfig::default()
        });
        let report = solver
            .solve(&mut skeleton, Vec3::new(0.0, 1.0, 0.0), 1, 1, &mut posture)
            .unwrap();

        assert!(!report.converged);
        assert_relative_eq!(posture.euler(1).z, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_short_posture() {
        let mut skeleton = planar_arm(DofFlags::ROTATE_Z);
        let mut posture = Posture::new(2);
        assert!(matches!(
            IkSolver::default().solve(&mut skeleton, Vec3::ZERO, 1, 2, &mut posture),
            Err(EngineError::PostureSizeMismatch { .. })
        ));
    }
}
