//! 虚拟内存子系统
//!
//! 提供进程地址空间管理、按需分页的稀疏二级页表和 TLB 缺失异常处理。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与外部协作者解耦：
//! - [`ArchVmOps`]: TLB 写入/失效、物理地址访问
//! - [`FrameOps`]: 物理帧的分配与释放（帧分配器本体在子系统之外）
//! - [`VmConfig`]: 地址空间布局常量
//!
//! 使用前必须调用 [`register_arch_ops`]、[`register_frame_ops`] 和
//! [`register_config`] 注册实现。

#![no_std]

extern crate alloc;

mod arch_ops;
mod config;
mod error;
mod frame;

pub mod addr_space;
pub mod address;
pub mod fault;
pub mod page_table;
pub mod region;

pub use arch_ops::{ArchVmOps, TlbFlags, arch_ops, register_arch_ops};
pub use config::{VmConfig, register_config, vm_config};
pub use error::{VmError, VmResult};
pub use frame::{FrameOps, FrameTracker, alloc_frame, frame_ops, register_frame_ops};

// Re-export 常用类型
pub use addr_space::AddressSpace;
pub use address::{Paddr, Ppn, UsizeConvert, Vaddr, Vpn};
pub use fault::{FaultKind, handle_fault, tlb_shootdown};
pub use page_table::{PageEntry, PageTable};
pub use region::{Region, RegionPerm, RegionTable};

#[cfg(test)]
mod tests;
