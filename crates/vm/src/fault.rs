//! TLB 缺失异常处理
//!
//! 硬件陷入以 (异常类别, 出错地址) 调用 [`handle_fault`]。
//! 处理器自身没有任何持久状态，完全在当前地址空间上操作：
//! 查页表，首次访问时经区域表核准后按需分配物理帧并写入表项，
//! 最后向一个随机硬件 TLB 槽位编程一条翻译。
//!
//! 页表始终是权威来源，TLB 条目可随时被静默驱逐，
//! 之后的缺失异常会重新装入。

use crate::addr_space::AddressSpace;
use crate::address::{UsizeConvert, Vaddr};
use crate::arch_ops::{TlbFlags, arch_ops};
use crate::error::{VmError, VmResult};
use crate::frame::alloc_frame;
use crate::region::RegionPerm;
use crate::vm_config;

/// 异常类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// 读缺失
    Read,
    /// 写缺失
    Write,
    /// 只读违例（硬件报告向脏位未置位的页写入）
    ReadOnly,
}

impl FaultKind {
    /// 由陷入分发器传来的原始异常码构造异常类别
    ///
    /// 无法识别的异常码返回 [`VmError::BadFaultKind`]。
    pub fn from_code(code: usize) -> VmResult<Self> {
        match code {
            0 => Ok(FaultKind::Read),
            1 => Ok(FaultKind::Write),
            2 => Ok(FaultKind::ReadOnly),
            _ => Err(VmError::BadFaultKind),
        }
    }
}

/// 处理一次 TLB 缺失异常
///
/// `space` 为当前进程的地址空间；没有当前进程时传入 None，
/// 一律报告 [`VmError::InvalidAddress`]。
///
/// 成功时恰好装入一条有效翻译并正常返回；失败时不装入任何翻译，
/// 错误交由陷入分发器投递信号或终止出错线程。
pub fn handle_fault(
    space: Option<&mut AddressSpace>,
    kind: FaultKind,
    addr: Vaddr,
) -> VmResult<()> {
    // 地址 0 和内核/用户分界之上的地址直接拒绝，不改动任何状态
    if addr.as_usize() == 0 || addr.as_usize() >= vm_config().user_space_top() {
        return Err(VmError::InvalidAddress);
    }
    let Some(space) = space else {
        return Err(VmError::InvalidAddress);
    };

    match kind {
        FaultKind::Read | FaultKind::Write => {}
        FaultKind::ReadOnly => {
            // 权限检查在本处理器的软件路径上完成，装入的 TLB 条目
            // 在硬件层面从不以只读方式存在；出现只读违例说明
            // 翻译状态已经不一致，绝不能静默放行
            log::error!(
                "vm: spurious read-only fault at {:#x}",
                addr.as_usize()
            );
            return Err(VmError::InvalidAddress);
        }
    }

    let AddressSpace {
        regions,
        page_table,
        loading,
        fault_lock,
    } = space;

    // 查表、分配、编程 TLB 是一个不可分割的临界区：
    // 持锁同时关本地中断，任何出口都先离开临界区再返回
    let _section = fault_lock.lock();

    let (paddr, perm) = match page_table.search(addr) {
        Some(entry) => (entry.paddr(), entry.perm()),
        None => {
            // 首次访问：未映射的内存绝不自动扩展
            let perm = regions.perms_at(addr).ok_or(VmError::InvalidAddress)?;
            let frame = alloc_frame(true).ok_or(VmError::OutOfMemory)?;
            let entry = page_table.insert(frame, addr, perm)?;
            (entry.paddr(), entry.perm())
        }
    };

    let mut flags = TlbFlags::empty();
    if !perm.is_empty() {
        flags |= TlbFlags::VALID;
    }
    // 加载窗口期间放行对名义上只读区域的写入
    if perm.contains(RegionPerm::WRITE) || *loading {
        flags |= TlbFlags::DIRTY;
    }

    let entry_hi = addr.align_down_to_page().as_usize();
    let entry_lo = paddr.as_usize() | flags.bits();
    arch_ops().tlb_write_random(entry_hi, entry_lo);

    Ok(())
}

/// 多处理器 TLB shootdown
///
/// 本配置下明确不支持向其他处理器传播失效。
///
/// # Panics
/// 一旦被调用即为致命错误。
pub fn tlb_shootdown() -> ! {
    panic!("vm: TLB shootdown is unsupported in this configuration");
}
