//! 地址与页码抽象
//!
//! 此模块提供物理/虚拟地址和页码的新类型封装，
//! 以及二级页表使用的固定页几何常量。
//!
//! # 类型
//!
//! - [`Paddr`] - 物理地址
//! - [`Vaddr`] - 虚拟地址
//! - [`Ppn`] - 物理页码（Physical Page Number）
//! - [`Vpn`] - 虚拟页码（Virtual Page Number）
//! - [`UsizeConvert`] - 在类型和 usize 之间进行转换

/// 页内偏移位数
pub const PAGE_BITS: usize = 12;
/// 页大小（字节），与物理帧同粒度
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;
/// 二级页表每一级索引的位数
pub const LEVEL_BITS: usize = 10;
/// 页目录/二级页表的槽位数量
pub const TABLE_LEN: usize = 1 << LEVEL_BITS;

/// 在类型和 usize 之间进行转换的 Trait
pub trait UsizeConvert {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

/// `impl_usize_newtype!` 宏
/// ---------------------
/// 为基于 usize 的新类型实现 `UsizeConvert`。
macro_rules! impl_usize_newtype {
    ($($type:ty),+) => {
        $(
            impl UsizeConvert for $type {
                fn as_usize(&self) -> usize {
                    self.0
                }

                fn from_usize(value: usize) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Paddr(pub usize);

/// 虚拟地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vaddr(pub usize);

/// 物理页码
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Ppn(pub usize);

/// 虚拟页码
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Vpn(pub usize);

impl_usize_newtype!(Paddr, Vaddr, Ppn, Vpn);

/// `impl_addr_ops!` 宏
/// ---------------------
/// 为地址类型实现页对齐相关操作。
macro_rules! impl_addr_ops {
    ($($type:ty),+) => {
        $(
            impl $type {
                /// 向下对齐到页边界
                pub fn align_down_to_page(self) -> Self {
                    Self(self.0 & !(PAGE_SIZE - 1))
                }

                /// 向上对齐到页边界
                pub fn align_up_to_page(self) -> Self {
                    Self((self.0 + PAGE_SIZE - 1) & !(PAGE_SIZE - 1))
                }

                /// 页内偏移
                pub fn page_offset(self) -> usize {
                    self.0 & (PAGE_SIZE - 1)
                }

                /// 是否页对齐
                pub fn is_page_aligned(self) -> bool {
                    self.page_offset() == 0
                }
            }
        )+
    };
}

impl_addr_ops!(Paddr, Vaddr);

/// `impl_page_num_ops!` 宏
/// ---------------------
/// 为页码类型实现与关联地址类型之间的转换。
macro_rules! impl_page_num_ops {
    ($($type:ty => $addr_type:ty),+) => {
        $(
            impl $type {
                /// 将地址转换为页码（向下取整，即包含该地址的页）
                pub fn from_addr_floor(addr: $addr_type) -> Self {
                    Self(addr.as_usize() >> PAGE_BITS)
                }

                /// 将地址转换为页码（向上取整；地址未对齐时指向下一页）
                pub fn from_addr_ceil(addr: $addr_type) -> Self {
                    Self(addr.align_up_to_page().as_usize() >> PAGE_BITS)
                }

                /// 该页码对应的起始地址
                pub fn start_addr(self) -> $addr_type {
                    <$addr_type>::from_usize(self.0 << PAGE_BITS)
                }

                /// 该页码对应的结束地址（即下一页的起始地址，不包含在页内）
                pub fn end_addr(self) -> $addr_type {
                    <$addr_type>::from_usize((self.0 + 1) << PAGE_BITS)
                }
            }
        )+
    };
}

impl_page_num_ops!(Ppn => Paddr, Vpn => Vaddr);
