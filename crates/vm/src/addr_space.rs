//! 地址空间生命周期管理
//!
//! 一个 [`AddressSpace`] 代表一个进程的虚拟内存：
//! 区域表、稀疏二级页表和一个瞬态的"加载中"标志
//! （加载窗口期间允许向名义上只读的区域写入以填充可执行映像）。
//!
//! 所有状态都由地址空间值本身持有，没有任何全局页表状态；
//! 页表可达的每个物理帧都被该地址空间独占持有，销毁即 Drop，
//! 区域、物理帧和二级表随所有权一起释放。

use crate::address::{UsizeConvert, Vaddr};
use crate::arch_ops::arch_ops;
use crate::error::VmResult;
use crate::page_table::PageTable;
use crate::region::{RegionPerm, RegionTable};
use crate::vm_config;
use sync::{IntrGuard, RawSpinLock};

/// 一个进程的地址空间
#[derive(Debug)]
pub struct AddressSpace {
    /// 区域表（升序、不相交）
    pub(crate) regions: RegionTable,
    /// 稀疏二级页表
    pub(crate) page_table: PageTable,
    /// 加载窗口标志：为真时放行对只读区域的写入
    pub(crate) loading: bool,
    /// 缺页处理路径的临界区锁（持锁同时关本地中断）
    pub(crate) fault_lock: RawSpinLock,
}

impl AddressSpace {
    /// 创建一个新的空地址空间
    ///
    /// 没有任何区域，页表为空，加载标志清除。
    /// 控制结构分配失败时返回 [`crate::VmError::OutOfMemory`]。
    pub fn new() -> VmResult<Self> {
        Ok(AddressSpace {
            regions: RegionTable::new(),
            page_table: PageTable::new()?,
            loading: false,
            fault_lock: RawSpinLock::new(),
        })
    }

    /// 复制地址空间（进程 fork）
    ///
    /// 按序登记源地址空间的每个区域，原样复制加载标志，
    /// 再复制整张页表（每个驻留页一个新帧，内容逐字节复制）。
    /// 整个操作是原子的：途中任何分配失败都会连同半成品一起
    /// 释放已分配的资源并返回 [`crate::VmError::OutOfMemory`]，
    /// 绝不向调用者交出半成品地址空间。
    pub fn try_clone(&self) -> VmResult<Self> {
        let mut new = AddressSpace::new()?;
        for region in self.regions.iter() {
            new.regions
                .define(region.start(), region.size(), region.perm())?;
        }
        new.loading = self.loading;
        new.page_table = self.page_table.dup()?;
        Ok(new)
    }

    /// 声明一个虚拟内存区域
    ///
    /// 由加载器在建立段、或栈初始化代码在保留栈空间时调用。
    /// 对齐和冲突语义见 [`RegionTable::define`]。
    pub fn define_region(
        &mut self,
        vaddr: Vaddr,
        size: usize,
        readable: bool,
        writable: bool,
        executable: bool,
    ) -> VmResult<()> {
        self.regions
            .define(vaddr, size, RegionPerm::from_rwx(readable, writable, executable))
    }

    /// 在用户地址空间顶端保留固定大小的栈区域
    ///
    /// 区域权限为读写，返回初始用户栈指针（区域顶端）。
    pub fn define_stack(&mut self) -> VmResult<Vaddr> {
        let top = vm_config().user_space_top();
        let size = vm_config().user_stack_size();
        self.regions.define(
            Vaddr::from_usize(top - size),
            size,
            RegionPerm::READ | RegionPerm::WRITE,
        )?;
        Ok(Vaddr::from_usize(top))
    }

    /// 进入加载窗口
    ///
    /// 置位加载标志后整体刷新本地 TLB：已解析翻译的权限语义
    /// 跨越这次转换发生了变化，旧条目一律不可信。
    pub fn prepare_load(&mut self) {
        self.loading = true;
        self.flush_local_tlb();
    }

    /// 结束加载窗口
    ///
    /// 清除加载标志并整体刷新本地 TLB，理由同 [`Self::prepare_load`]。
    pub fn complete_load(&mut self) {
        self.loading = false;
        self.flush_local_tlb();
    }

    /// 加载窗口是否打开
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// 切换为当前地址空间时调用
    ///
    /// 无条件使本地处理器的所有 TLB 槽位失效。
    pub fn activate(&self) {
        self.flush_local_tlb();
    }

    /// 不再是当前地址空间时调用
    ///
    /// 与 [`Self::activate`] 一样整体刷新：上下文切换的两个方向上，
    /// 残留的旧条目都是不安全的。
    pub fn deactivate(&self) {
        self.flush_local_tlb();
    }

    /// 区域表
    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// 页表
    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// 关中断整体刷新本地 TLB
    fn flush_local_tlb(&self) {
        let _guard = IntrGuard::new();
        arch_ops().tlb_invalidate_all();
    }
}
