//! 架构相关虚拟内存操作 trait 定义和注册

use bitflags::bitflags;
use core::sync::atomic::{AtomicUsize, Ordering};

bitflags! {
    /// 硬件 TLB 条目 entry_lo 中的标志位（MIPS 风格）
    ///
    /// 物理帧基址与标志位或在一起构成 entry_lo。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TlbFlags: usize {
        /// 有效位：该翻译可被硬件使用
        const VALID = 1 << 9;
        /// 脏位：该页可写
        const DIRTY = 1 << 10;
    }
}

/// 架构相关虚拟内存操作
///
/// 此 trait 抽象了架构特定的 TLB 操作和物理内存访问。
/// 内核需要为具体架构实现此 trait。
pub trait ArchVmOps: Send + Sync {
    /// 向一个随机选择的 TLB 槽位写入一条翻译
    ///
    /// entry_hi 为虚拟页基址，entry_lo 为物理帧基址与 [`TlbFlags`] 的组合。
    /// 被覆盖的槽位无需任何软件记录：页表始终是权威来源，
    /// 之后的缺失异常会重新装入被驱逐的翻译。
    fn tlb_write_random(&self, entry_hi: usize, entry_lo: usize);

    /// 使本地处理器的所有 TLB 槽位失效
    fn tlb_invalidate_all(&self);

    /// 将物理地址转换为内核可访问的虚拟地址（直接映射区域）
    ///
    /// 用于访问物理帧的内容（清零、复制）。
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchVmOps) {
    let ptr = ops as *const dyn ArchVmOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ArchVmOps, (usize, usize)>(ptr) };
    ARCH_OPS_DATA.store(data, Ordering::Release);
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的架构操作实现
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`] 注册实现，则 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchVmOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vm: ArchVmOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchVmOps>((data, vtable)) }
}
