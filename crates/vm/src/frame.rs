//! 物理帧接口模块
//!
//! 帧分配器本体由内核提供并注册，位于子系统之外；
//! 这里只定义消费接口 [`FrameOps`] 和单帧所有权的 RAII 封装
//! [`FrameTracker`]。
//!
//! ## RAII：自动回收
//!
//! [`FrameTracker`] 在 `Drop` 时把帧归还给分配器。
//! 页表项持有 FrameTracker，因此"页表项存在即帧被独占持有"这一不变式
//! 由所有权系统直接保证，失败路径上的回滚也随之自动完成。

use crate::address::{Ppn, UsizeConvert};
use core::sync::atomic::{AtomicUsize, Ordering};

/// 外部物理帧分配器的消费接口
///
/// 分配必须是非阻塞的：缺失异常处理路径在持锁、关中断的临界区内
/// 调用它，失败时立即返回 None 而不是等待。
pub trait FrameOps: Send + Sync {
    /// 分配 count 个连续物理帧，返回起始物理页号
    ///
    /// zeroed 为真时帧内容被清零。失败返回 None。
    fn alloc_frames(&self, count: usize, zeroed: bool) -> Option<usize>;

    /// 释放从 ppn 开始的 count 个物理帧
    fn free_frames(&self, ppn: usize, count: usize);
}

static FRAME_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static FRAME_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册帧分配器实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_frame_ops(ops: &'static dyn FrameOps) {
    let ptr = ops as *const dyn FrameOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn FrameOps, (usize, usize)>(ptr) };
    FRAME_OPS_DATA.store(data, Ordering::Release);
    FRAME_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的帧分配器实现
///
/// # Panics
/// 如果尚未调用 [`register_frame_ops`] 注册实现，则 panic
#[inline]
pub fn frame_ops() -> &'static dyn FrameOps {
    let data = FRAME_OPS_DATA.load(Ordering::Acquire);
    let vtable = FRAME_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vm: FrameOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn FrameOps>((data, vtable)) }
}

/// 物理帧跟踪器。
/// 实现了 RAII 模式：当此结构体被 drop 时，它所管理的物理页帧会被自动归还。
#[derive(Debug)]
pub struct FrameTracker(Ppn);

impl FrameTracker {
    /// 获取此帧跟踪器所管理的物理页号 (Ppn)。
    pub fn ppn(&self) -> Ppn {
        self.0
    }
}

impl Drop for FrameTracker {
    /// 自动归还物理页帧。
    fn drop(&mut self) {
        frame_ops().free_frames(self.0.as_usize(), 1);
    }
}

/// 分配一个物理帧。
///
/// # 参数
///
/// * `zeroed` - 为真时帧内容被清零
///
/// # 返回
///
/// 如果分配成功，返回 `Some(FrameTracker)`；否则返回 `None`。
pub fn alloc_frame(zeroed: bool) -> Option<FrameTracker> {
    frame_ops()
        .alloc_frames(1, zeroed)
        .map(|ppn| FrameTracker(Ppn::from_usize(ppn)))
}
