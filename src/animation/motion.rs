//! 动作
//!
//! 按帧排列的姿态，以及其上的编辑工具：时间扭曲、带原始备份的 IK 编辑缓冲。

use super::posture::Posture;
use crate::{EngineError, Result};

/// 动作（姿态序列）
#[derive(Clone, Debug, PartialEq)]
pub struct Motion {
    /// 每帧一个姿态
    postures: Vec<Posture>,
}

impl Motion {
    /// 创建动作，所有姿态骨骼数必须相同
    pub fn new(postures: Vec<Posture>) -> Result<Self> {
        if let Some(first) = postures.first() {
            let expected = first.len();
            if let Some(bad) = postures.iter().find(|p| p.len() != expected) {
                return Err(EngineError::PostureSizeMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(Self { postures })
    }

    /// 帧数
    #[inline]
    pub fn len(&self) -> usize {
        self.postures.len()
    }

    /// 是否没有帧
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.postures.is_empty()
    }

    /// 每个姿态的骨骼数（空动作为 0）
    pub fn bone_count(&self) -> usize {
        self.postures.first().map_or(0, Posture::len)
    }

    /// 第 `frame` 帧姿态
    pub fn posture(&self, frame: usize) -> Result<&Posture> {
        let count = self.postures.len();
        self.postures
            .get(frame)
            .ok_or(EngineError::FrameOutOfRange { frame, count })
    }

    /// 第 `frame` 帧可变姿态
    pub fn posture_mut(&mut self, frame: usize) -> Result<&mut Posture> {
        let count = self.postures.len();
        self.postures
            .get_mut(frame)
            .ok_or(EngineError::FrameOutOfRange { frame, count })
    }

    /// 全部姿态
    #[inline]
    pub fn postures(&self) -> &[Posture] {
        &self.postures
    }

    /// 小数帧位置上的姿态，由相邻两帧插值
    pub fn sample(&self, position: f32) -> Result<Posture> {
        let last = self.postures.len().checked_sub(1).ok_or(EngineError::EmptyMotion)?;
        let position = position.clamp(0.0, last as f32);
        let low = (position.floor() as usize).min(last);
        let high = (low + 1).min(last);
        Posture::interpolate(&self.postures[low], &self.postures[high], position - low as f32)
    }

    /// 重新计时，使 `old_keyframe` 的姿态在 `new_keyframe` 播放。
    ///
    /// `new_keyframe` 之前的输出帧均匀采样 `[0, old_keyframe]`，
    /// 之后的帧采样 `[old_keyframe, len - 1]`。最后一帧原样复制，帧数不变。
    pub fn time_warp(&self, old_keyframe: usize, new_keyframe: usize) -> Result<Motion> {
        let count = self.postures.len();
        if count == 0 {
            return Err(EngineError::EmptyMotion);
        }
        for frame in [old_keyframe, new_keyframe] {
            if frame >= count {
                return Err(EngineError::FrameOutOfRange { frame, count });
            }
        }

        let last = count - 1;
        let old = old_keyframe as f32;
        let new = new_keyframe as f32;

        let mut postures = Vec::with_capacity(count);
        for i in 0..last {
            let position = if i < new_keyframe {
                old * i as f32 / new
            } else {
                old + (last as f32 - old) * (i as f32 - new) / (last as f32 - new)
            };
            postures.push(self.sample(position)?);
        }
        postures.push(self.postures[last].clone());

        log::debug!(
            "[Motion] time warp {} -> {} over {} frames",
            old_keyframe,
            new_keyframe,
            count
        );
        Ok(Motion { postures })
    }
}

/// 交互编辑（IK）用的动作工作副本，保留未编辑的备份供 [`reset`](Self::reset)
#[derive(Clone, Debug)]
pub struct MotionEditBuffer {
    /// 未编辑的备份
    original: Motion,
    /// 工作副本
    working: Motion,
}

impl MotionEditBuffer {
    /// 以动作创建缓冲，备份与工作副本相同
    pub fn new(motion: Motion) -> Self {
        Self {
            working: motion.clone(),
            original: motion,
        }
    }

    /// 未编辑的备份
    #[inline]
    pub fn original(&self) -> &Motion {
        &self.original
    }

    /// 工作副本
    #[inline]
    pub fn working(&self) -> &Motion {
        &self.working
    }

    /// 可原地编辑的工作姿态
    pub fn posture_mut(&mut self, frame: usize) -> Result<&mut Posture> {
        self.working.posture_mut(frame)
    }

    /// 工作副本是否与备份不同
    pub fn is_modified(&self) -> bool {
        self.working != self.original
    }

    /// 丢弃所有编辑
    pub fn reset(&mut self) {
        self.working.clone_from(&self.original);
    }
}
