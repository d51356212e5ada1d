//! 稀疏二级页表
//!
//! 虚拟地址的高位选择页目录槽位，中间位选择二级表内槽位，
//! 低位是页内偏移，与翻译无关。只有被访问过的页才有表项；
//! 表项缺失表示"从未发生过缺页"，而不是"未映射"
//! （未映射与否由区域表裁决）。
//!
//! ## 所有权
//!
//! 每个表项独占持有其物理帧（[`FrameTracker`]）。
//! 销毁页表即 Drop：先释放所有表项的物理帧，再释放所有二级表，
//! 目录最终为空。失败路径上的回滚同样由 Drop 完成。

use crate::address::{LEVEL_BITS, PAGE_BITS, PAGE_SIZE, Paddr, TABLE_LEN, UsizeConvert, Vaddr};
use crate::arch_ops::arch_ops;
use crate::error::{VmError, VmResult};
use crate::frame::{FrameTracker, alloc_frame};
use crate::region::RegionPerm;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// 二级表：固定长度的表项槽位数组
type Leaf = Box<[Option<PageEntry>]>;

/// 页表项：物理帧与声明时的权限快照
#[derive(Debug)]
pub struct PageEntry {
    frame: FrameTracker,
    perm: RegionPerm,
}

impl PageEntry {
    /// 物理帧基址
    pub fn paddr(&self) -> Paddr {
        self.frame.ppn().start_addr()
    }

    /// 权限快照
    pub fn perm(&self) -> RegionPerm {
        self.perm
    }
}

/// 稀疏二级页表
#[derive(Debug)]
pub struct PageTable {
    /// 页目录：每个槽位懒分配一张二级表
    dir: Vec<Option<Leaf>>,
}

impl PageTable {
    /// 创建一张空页表
    ///
    /// 目录本身分配失败时返回 [`VmError::OutOfMemory`]。
    pub fn new() -> VmResult<Self> {
        let mut dir = Vec::new();
        dir.try_reserve_exact(TABLE_LEN)
            .map_err(|_| VmError::OutOfMemory)?;
        dir.resize_with(TABLE_LEN, || None);
        Ok(PageTable { dir })
    }

    /// 计算目录索引和二级表索引
    ///
    /// 目录索引超出表长的地址（不在二级格式覆盖的范围内）返回 None。
    fn indices(vaddr: Vaddr) -> Option<(usize, usize)> {
        let dir = vaddr.as_usize() >> (PAGE_BITS + LEVEL_BITS);
        if dir >= TABLE_LEN {
            return None;
        }
        let slot = (vaddr.as_usize() >> PAGE_BITS) & (TABLE_LEN - 1);
        Some((dir, slot))
    }

    /// 由目录索引和二级表索引还原页基址
    fn slot_base(dir: usize, slot: usize) -> Vaddr {
        Vaddr::from_usize(((dir << LEVEL_BITS) | slot) << PAGE_BITS)
    }

    /// 查找包含给定虚拟地址的页的表项
    ///
    /// 目录槽位未分配或二级表槽位为空时返回 None（缺失）。
    pub fn search(&self, vaddr: Vaddr) -> Option<&PageEntry> {
        let (dir, slot) = Self::indices(vaddr)?;
        self.dir[dir].as_ref()?[slot].as_ref()
    }

    /// 为包含给定虚拟地址的页写入表项
    ///
    /// 二级表不存在时先懒分配并清空一张；二级表分配失败时
    /// 整个操作原子地失败：返回 [`VmError::OutOfMemory`]，
    /// 页表不变，传入的帧随参数 Drop 归还分配器。
    pub fn insert(
        &mut self,
        frame: FrameTracker,
        vaddr: Vaddr,
        perm: RegionPerm,
    ) -> VmResult<&PageEntry> {
        let (dir, slot) = Self::indices(vaddr).ok_or(VmError::InvalidAddress)?;
        let leaf = match &mut self.dir[dir] {
            Some(leaf) => leaf,
            vacant => {
                let mut table = Vec::new();
                table
                    .try_reserve_exact(TABLE_LEN)
                    .map_err(|_| VmError::OutOfMemory)?;
                table.resize_with(TABLE_LEN, || None);
                vacant.insert(table.into_boxed_slice())
            }
        };
        Ok(leaf[slot].insert(PageEntry { frame, perm }))
    }

    /// 复制整张页表（进程 fork）
    ///
    /// 逐槽位扫描所有存在的表项，为每一项分配一个新物理帧，
    /// 按字节复制帧内容，并以相同权限写入新表。任何一步分配失败
    /// 都原子地失败：半成品页表连同其已分配的帧和二级表一起被
    /// Drop 释放，返回 [`VmError::OutOfMemory`]。
    pub fn dup(&self) -> VmResult<PageTable> {
        let mut new = PageTable::new()?;
        for (dir, leaf) in self.dir.iter().enumerate() {
            let Some(leaf) = leaf else { continue };
            for (slot, entry) in leaf.iter().enumerate() {
                let Some(entry) = entry else { continue };
                let frame = alloc_frame(false).ok_or(VmError::OutOfMemory)?;
                copy_frame(frame.ppn().start_addr(), entry.paddr());
                new.insert(frame, Self::slot_base(dir, slot), entry.perm())?;
            }
        }
        Ok(new)
    }

    /// 当前持有表项的页数
    pub fn resident_pages(&self) -> usize {
        self.dir
            .iter()
            .flatten()
            .map(|leaf| leaf.iter().flatten().count())
            .sum()
    }
}

/// 将 src 帧的全部内容按字节复制到 dst 帧
fn copy_frame(dst: Paddr, src: Paddr) {
    let arch = arch_ops();
    let dst_va = arch.paddr_to_vaddr(dst.as_usize()) as *mut u8;
    let src_va = arch.paddr_to_vaddr(src.as_usize()) as *const u8;
    // SAFETY: 两个帧都被本子系统独占持有，且大小均为一页
    unsafe { core::ptr::copy_nonoverlapping(src_va, dst_va, PAGE_SIZE) };
}
