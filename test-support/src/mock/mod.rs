//! Mock 实现模块
//!
//! 注意：这里不依赖 `vm` 或 `sync` crate（避免循环依赖）。
//! 各 crate 在 `cfg(test)` 下为这些类型实现自己的 trait
//! （例如 `vm::ArchVmOps` / `vm::FrameOps` / `sync::ArchOps`）。

mod intr;
mod vm;

pub use intr::{MockIntrCtrl, MOCK_INTR_CTRL};
pub use vm::{MockFrameAlloc, MockTlb, MockVmConfig, MOCK_FRAME_ALLOC, MOCK_TLB, MOCK_VM_CONFIG};
