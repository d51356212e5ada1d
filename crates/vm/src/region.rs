//! 虚拟内存区域表
//!
//! 每个地址空间持有一张按起始地址升序排列、两两不相交的区域表。
//! 区域由加载器或栈初始化代码声明，创建后不再修改
//! （加载窗口期间对只读区域的写放行在异常处理路径上处理，
//! 不改动区域本身），随地址空间一起销毁。
//!
//! 有序向量替代了链表：插入时沿序检查不相交性为线性时间，
//! 查询语义与全表扫描完全一致。

use crate::address::{PAGE_SIZE, UsizeConvert, Vaddr};
use crate::error::{VmError, VmResult};
use crate::vm_config;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 区域访问权限
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionPerm: u8 {
        /// 可读
        const READ = 1 << 0;
        /// 可写
        const WRITE = 1 << 1;
        /// 可执行
        const EXEC = 1 << 2;
    }
}

impl RegionPerm {
    /// 由三个布尔标志构造权限集合
    pub fn from_rwx(readable: bool, writable: bool, executable: bool) -> Self {
        let mut perm = RegionPerm::empty();
        if readable {
            perm |= RegionPerm::READ;
        }
        if writable {
            perm |= RegionPerm::WRITE;
        }
        if executable {
            perm |= RegionPerm::EXEC;
        }
        perm
    }
}

/// 一个页对齐的虚拟地址区间 `[start, start+size)` 及其权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    start: Vaddr,
    size: usize,
    perm: RegionPerm,
}

impl Region {
    /// 区间起始地址（页对齐）
    pub fn start(&self) -> Vaddr {
        self.start
    }

    /// 区间长度（页对齐）
    pub fn size(&self) -> usize {
        self.size
    }

    /// 区间结束地址（不含）
    pub fn end(&self) -> Vaddr {
        Vaddr::from_usize(self.start.as_usize() + self.size)
    }

    /// 区域权限
    pub fn perm(&self) -> RegionPerm {
        self.perm
    }

    /// 地址是否落在此区间内
    pub fn contains(&self, addr: Vaddr) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// 按起始地址升序、两两不相交的区域表
#[derive(Debug, Default)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    /// 创建一张空的区域表
    pub fn new() -> Self {
        RegionTable {
            regions: Vec::new(),
        }
    }

    /// 声明一个新区域并检测重叠
    ///
    /// 起始地址向下、结束地址向上对齐到页边界后插入有序位置。
    /// 与已有区域相交时返回 [`VmError::RegionConflict`]，表保持不变；
    /// 区间为空、溢出或越过用户地址空间上界时返回相应错误。
    pub fn define(&mut self, start: Vaddr, size: usize, perm: RegionPerm) -> VmResult<()> {
        // 对齐：先把页内偏移并入长度，再分别对齐起始地址和长度
        let offset = start.page_offset();
        let start = start.align_down_to_page();
        let size = size.checked_add(offset).ok_or(VmError::InvalidAddress)?;
        let size = size
            .checked_add(PAGE_SIZE - 1)
            .ok_or(VmError::InvalidAddress)?
            & !(PAGE_SIZE - 1);
        if size == 0 {
            // 空区间不占据任何页，也不可能与任何区域冲突
            return Ok(());
        }
        let end = start
            .as_usize()
            .checked_add(size)
            .ok_or(VmError::InvalidAddress)?;
        if end > vm_config().user_space_top() {
            return Err(VmError::InvalidAddress);
        }

        // 有序插入位置：第一个结束地址在 start 之后的区域
        let pos = self
            .regions
            .partition_point(|r| r.end().as_usize() <= start.as_usize());
        if let Some(next) = self.regions.get(pos) {
            if end > next.start().as_usize() {
                return Err(VmError::RegionConflict);
            }
        }

        self.regions
            .try_reserve(1)
            .map_err(|_| VmError::OutOfMemory)?;
        self.regions.insert(pos, Region { start, size, perm });
        Ok(())
    }

    /// 查询包含给定地址的区域的权限集合
    ///
    /// 线性查找有序表；没有区域包含该地址时返回 None（未映射）。
    pub fn perms_at(&self, addr: Vaddr) -> Option<RegionPerm> {
        self.regions.iter().find(|r| r.contains(addr)).map(Region::perm)
    }

    /// 遍历所有区域（升序）
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// 区域数量
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// 区域表是否为空
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
